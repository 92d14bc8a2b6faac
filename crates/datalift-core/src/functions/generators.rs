//! Built-in row generators.

use serde::Deserialize;

use datalift_types::{EtlError, Value};

use super::{FunctionRegistry, RowGenerator};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_generator("split_column_to_rows", |params| {
        let config: SplitConfig = parse_params("split_column_to_rows", params)?;
        Ok(Box::new(SplitColumnToRows {
            separator: config.separator,
            row_limit: config.row_limit,
            items: None,
            index: 0,
        }))
    });
    registry.register_generator("columns_to_rows", |params| {
        let config: ColumnsToRowsConfig = parse_params("columns_to_rows", params)?;
        Ok(Box::new(ColumnsToRows {
            columns: config.columns,
            index: 0,
        }))
    });
    registry.register_generator("generate_sequence", |params| {
        let config: SequenceConfig = parse_params("generate_sequence", params)?;
        if config.step == 0 {
            return Err(EtlError::contract("generate_sequence: step must be non-zero"));
        }
        Ok(Box::new(GenerateSequence {
            start: config.start,
            end: config.end,
            step: config.step,
            current: None,
        }))
    });
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    id: &str,
    params: &serde_json::Value,
) -> Result<T, EtlError> {
    let params = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params)
        .map_err(|e| EtlError::contract(format!("{id}: invalid parameters: {e}")))
}

#[derive(Deserialize)]
struct SplitConfig {
    separator: String,
    #[serde(default)]
    row_limit: Option<usize>,
}

/// Splits the input text on a separator and yields one field per row, up
/// to an optional row cap.
struct SplitColumnToRows {
    separator: String,
    row_limit: Option<usize>,
    items: Option<Vec<String>>,
    index: usize,
}

impl RowGenerator for SplitColumnToRows {
    fn reset(&mut self) {
        self.items = None;
        self.index = 0;
    }

    fn next(&mut self, inputs: &[Value]) -> Result<Option<Vec<Value>>, EtlError> {
        if self.items.is_none() {
            let text = inputs.first().unwrap_or(&Value::Null).to_display_string();
            self.items = Some(
                text.split(self.separator.as_str())
                    .map(str::to_string)
                    .collect(),
            );
        }
        let Some(items) = self.items.as_ref() else {
            return Ok(None);
        };

        let cap = self.row_limit.unwrap_or(usize::MAX).min(items.len());
        if self.index >= cap {
            return Ok(None);
        }
        let value = Value::String(items[self.index].clone());
        self.index += 1;
        Ok(Some(vec![value]))
    }
}

#[derive(Deserialize)]
struct ColumnsToRowsConfig {
    columns: Vec<String>,
}

/// Pivots a set of columns into (column name, value) rows, one per input
/// column.
struct ColumnsToRows {
    columns: Vec<String>,
    index: usize,
}

impl RowGenerator for ColumnsToRows {
    fn reset(&mut self) {
        self.index = 0;
    }

    fn next(&mut self, inputs: &[Value]) -> Result<Option<Vec<Value>>, EtlError> {
        if self.index >= self.columns.len() || self.index >= inputs.len() {
            return Ok(None);
        }
        let row = vec![
            Value::String(self.columns[self.index].clone()),
            inputs[self.index].clone(),
        ];
        self.index += 1;
        Ok(Some(row))
    }
}

#[derive(Deserialize)]
struct SequenceConfig {
    start: i64,
    end: i64,
    step: i64,
}

/// Yields an arithmetic integer sequence, independent of the input row.
struct GenerateSequence {
    start: i64,
    end: i64,
    step: i64,
    current: Option<i64>,
}

impl RowGenerator for GenerateSequence {
    fn reset(&mut self) {
        self.current = None;
    }

    fn next(&mut self, _inputs: &[Value]) -> Result<Option<Vec<Value>>, EtlError> {
        let next = match self.current {
            None => self.start,
            Some(current) => current.saturating_add(self.step),
        };
        let in_range = if self.step > 0 {
            next <= self.end
        } else {
            next >= self.end
        };
        if !in_range {
            return Ok(None);
        }
        self.current = Some(next);
        Ok(Some(vec![Value::Int64(next)]))
    }
}
