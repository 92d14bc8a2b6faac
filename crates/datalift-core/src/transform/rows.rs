//! Stacked row-generator fan-out stage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use datalift_types::{EtlError, Row, SelectQuery, Sort, Sorts, Table, Value};

use crate::functions::GeneratorMapping;

use super::{check_cancelled, BoxedTransform, StageCounters, Transform};

/// A source column carried into the output under a (possibly renamed)
/// target column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnPair {
    pub source: String,
    pub target: String,
}

impl ColumnPair {
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            target: name,
        }
    }
}

/// Expands each upstream row into zero or more output rows using stacked,
/// independently-stateful generators.
///
/// Generator index 0 is the outermost (slowest varying); the last index is
/// the innermost (fastest varying). An outer generator only advances once
/// its inner neighbour's sequence has exhausted, so two generators
/// producing n1 and n2 items fan one upstream row out into n1 × n2 rows.
///
/// When grouping is configured the upstream must already be ordered by the
/// group columns; this is declared through `required_sort_fields` and not
/// enforced here — a planner inserts a sort stage when needed.
pub struct TransformRows {
    upstream: BoxedTransform,
    group_columns: Vec<ColumnPair>,
    generators: Vec<GeneratorMapping>,
    pass_through: bool,
    schema: Table,
    open: bool,
    /// Per generator: whether its current sequence still has rows pending.
    sequence_active: Vec<bool>,
    /// Re-armed on every new upstream row so each generator starts a fresh
    /// sequence.
    first_record: bool,
    source_row: Option<Row>,
    /// Reused output buffer; outer-generator outputs persist across inner
    /// iterations.
    output_buffer: Row,
    /// (source ordinal, output ordinal) for group columns.
    group_map: Vec<(usize, usize)>,
    /// Per generator: input ordinals into the source row.
    generator_inputs: Vec<Vec<usize>>,
    /// Per generator: output ordinals into the output row.
    generator_outputs: Vec<Vec<usize>>,
    /// (source ordinal, output ordinal) for pass-through columns.
    pass_through_map: Vec<(usize, usize)>,
    counters: StageCounters,
}

impl TransformRows {
    pub fn new(
        upstream: BoxedTransform,
        group_columns: Vec<ColumnPair>,
        generators: Vec<GeneratorMapping>,
        pass_through: bool,
    ) -> Self {
        Self {
            upstream,
            group_columns,
            generators,
            pass_through,
            schema: Table::empty("rows"),
            open: false,
            sequence_active: Vec::new(),
            first_record: true,
            source_row: None,
            output_buffer: Row::new(),
            group_map: Vec::new(),
            generator_inputs: Vec::new(),
            generator_outputs: Vec::new(),
            pass_through_map: Vec::new(),
            counters: StageCounters::default(),
        }
    }

    fn initialize_schema(&mut self) -> Result<(), EtlError> {
        let source_schema = self.upstream.schema();
        let mut table = Table::empty("rows");

        self.group_map = Vec::with_capacity(self.group_columns.len());
        for pair in &self.group_columns {
            let source_ordinal = source_schema.ordinal_of(&pair.source).ok_or_else(|| {
                EtlError::contract(format!(
                    "group column {} not found in source schema",
                    pair.source
                ))
            })?;
            let mut column = source_schema.column(source_ordinal).clone();
            column.name = pair.target.clone();
            self.group_map.push((source_ordinal, table.len()));
            table.add_column(column)?;
        }

        self.generator_inputs = Vec::with_capacity(self.generators.len());
        self.generator_outputs = Vec::with_capacity(self.generators.len());
        for mapping in &self.generators {
            self.generator_inputs
                .push(source_schema.ordinals_of(&mapping.input_columns)?);
            let mut outputs = Vec::with_capacity(mapping.output_columns.len());
            for column in &mapping.output_columns {
                outputs.push(table.len());
                table.add_column(column.clone())?;
            }
            self.generator_outputs.push(outputs);
        }

        self.pass_through_map = Vec::new();
        if self.pass_through {
            for (source_ordinal, column) in source_schema.columns().iter().enumerate() {
                if table.ordinal_of(&column.name).is_some() {
                    continue;
                }
                self.pass_through_map.push((source_ordinal, table.len()));
                table.add_column(column.clone())?;
            }
        }

        self.schema = table;
        Ok(())
    }

    /// Run the generator cascade against the current source row. Returns
    /// whether the outermost generator still has rows in its sequence.
    fn run_generators(&mut self, source: &Row) -> Result<bool, EtlError> {
        let mut more_rows = true;

        // innermost first; an outer generator only advances once its inner
        // neighbour's sequence has exhausted
        for index in (0..self.generators.len()).rev() {
            more_rows = true;
            let inputs: Vec<Value> = self.generator_inputs[index]
                .iter()
                .map(|&ordinal| source[ordinal].clone())
                .collect();

            let generator = &mut self.generators[index];
            if self.first_record {
                generator.generator.reset();
            }

            let mut step = generator
                .generator
                .next(&inputs)
                .map_err(|e| e.at_stage("rows"))?;
            if step.is_none() {
                // sequence exhausted: reset and re-invoke once to begin a
                // fresh sequence, and let the next-outer generator advance
                generator.generator.reset();
                step = generator
                    .generator
                    .next(&inputs)
                    .map_err(|e| e.at_stage("rows"))?;
                more_rows = false;
            }
            self.sequence_active[index] = step.is_some();

            if let Some(values) = step {
                let ordinals = &self.generator_outputs[index];
                if values.len() != ordinals.len() {
                    return Err(EtlError::contract(format!(
                        "generator {} produced {} values for {} output columns",
                        self.generators[index].name,
                        values.len(),
                        ordinals.len()
                    ))
                    .at_stage("rows"));
                }
                for (&ordinal, value) in ordinals.iter().zip(values) {
                    self.output_buffer[ordinal] = value;
                }
            }

            if more_rows && !self.first_record {
                break;
            }
        }

        self.first_record = false;
        Ok(more_rows)
    }
}

#[async_trait]
impl Transform for TransformRows {
    fn name(&self) -> &'static str {
        "rows"
    }

    fn schema(&self) -> &Table {
        &self.schema
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(
        &mut self,
        audit_key: u64,
        query: Option<SelectQuery>,
        cancel: &CancellationToken,
    ) -> Result<bool, EtlError> {
        if self.open {
            return Err(EtlError::contract("rows transform is already open"));
        }
        if self.generators.is_empty() {
            return Err(EtlError::contract(
                "rows transform needs at least one generator",
            ));
        }
        let opened = self.upstream.open(audit_key, query, cancel).await?;
        if !opened {
            return Ok(false);
        }
        self.initialize_schema()?;
        self.sequence_active = vec![false; self.generators.len()];
        self.first_record = true;
        self.source_row = None;
        self.output_buffer = vec![Value::Null; self.schema.len()];
        self.open = true;
        tracing::debug!(
            audit_key,
            generators = self.generators.len(),
            grouped = !self.group_columns.is_empty(),
            "rows transform open"
        );
        Ok(true)
    }

    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Row>, EtlError> {
        if !self.open {
            return Err(EtlError::contract("rows transform read before open"));
        }
        check_cancelled(cancel)?;

        // a fresh upstream row is only pulled once the outermost
        // generator's sequence has exhausted
        if !self.sequence_active[0] {
            match self.upstream.read(cancel).await? {
                Some(row) => {
                    self.counters.rows_read += 1;
                    self.source_row = Some(row);
                    self.first_record = true;
                }
                None => return Ok(None),
            }
        }

        loop {
            check_cancelled(cancel)?;
            let source = self
                .source_row
                .clone()
                .ok_or_else(|| EtlError::contract("rows transform lost its source row"))?;

            for &(source_ordinal, output_ordinal) in &self.group_map {
                self.output_buffer[output_ordinal] = source[source_ordinal].clone();
            }

            let more_rows = self.run_generators(&source)?;

            for &(source_ordinal, output_ordinal) in &self.pass_through_map {
                self.output_buffer[output_ordinal] = source[source_ordinal].clone();
            }

            if more_rows {
                self.counters.rows_passed += 1;
                return Ok(Some(self.output_buffer.clone()));
            }

            // every generator's sequence has exhausted: pull the next
            // upstream row and re-arm the cascade
            match self.upstream.read(cancel).await? {
                Some(row) => {
                    self.counters.rows_read += 1;
                    self.source_row = Some(row);
                    self.first_record = true;
                }
                None => return Ok(None),
            }
        }
    }

    fn reset(&mut self) -> Result<(), EtlError> {
        self.upstream.reset()?;
        for mapping in &mut self.generators {
            mapping.generator.reset();
        }
        self.sequence_active = vec![false; self.generators.len()];
        self.first_record = true;
        self.source_row = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EtlError> {
        self.open = false;
        self.source_row = None;
        self.upstream.close().await
    }

    fn requires_sort(&self) -> bool {
        !self.group_columns.is_empty()
    }

    fn prefers_sort(&self) -> bool {
        true
    }

    fn required_sort_fields(&self) -> Sorts {
        self.group_columns
            .iter()
            .map(|pair| Sort::ascending(pair.source.clone()))
            .collect()
    }

    fn sort_fields(&self) -> Sorts {
        self.group_columns
            .iter()
            .map(|pair| Sort::ascending(pair.target.clone()))
            .collect()
    }

    fn counters(&self) -> StageCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::reader_memory::ReaderMemory;
    use datalift_types::{Column, DataType};

    fn generator_mapping(
        function: &str,
        inputs: &[&str],
        outputs: Vec<Column>,
        params: serde_json::Value,
    ) -> GeneratorMapping {
        let generator = FunctionRegistry::with_builtins()
            .build_generator(function, &params)
            .expect("build generator");
        GeneratorMapping {
            name: function.to_string(),
            input_columns: inputs.iter().map(|c| c.to_string()).collect(),
            output_columns: outputs,
            generator,
        }
    }

    async fn collect(transform: &mut TransformRows) -> Vec<Row> {
        let cancel = CancellationToken::new();
        let mut rows = Vec::new();
        while let Some(row) = transform.read(&cancel).await.expect("read") {
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_csv_split_with_row_cap() {
        let table = Table::new(
            "test",
            vec![Column::new("csv_field", DataType::String)],
        )
        .expect("schema");
        let rows = vec![vec![Value::from("a,b,c,d,e")]];
        let source = ReaderMemory::new(table, rows);

        let mapping = generator_mapping(
            "split_column_to_rows",
            &["csv_field"],
            vec![Column::new("value", DataType::String)],
            serde_json::json!({"separator": ",", "row_limit": 4}),
        );
        let mut transform = TransformRows::new(Box::new(source), vec![], vec![mapping], false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        let values: Vec<_> = output.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c"),
                Value::from("d"),
            ]
        );
    }

    #[tokio::test]
    async fn test_column_pivot() {
        let table = Table::new(
            "test",
            vec![
                Column::new("col0", DataType::String),
                Column::new("col1", DataType::String),
                Column::new("col2", DataType::String),
                Column::new("col3", DataType::String),
            ],
        )
        .expect("schema");
        let rows = vec![vec![
            Value::from("a"),
            Value::from("b"),
            Value::from("c"),
            Value::from("d"),
        ]];
        let source = ReaderMemory::new(table, rows);

        let mapping = generator_mapping(
            "columns_to_rows",
            &["col0", "col1", "col2", "col3"],
            vec![
                Column::new("column", DataType::String),
                Column::new("value", DataType::String),
            ],
            serde_json::json!({"columns": ["col0", "col1", "col2", "col3"]}),
        );
        let mut transform = TransformRows::new(Box::new(source), vec![], vec![mapping], false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 4);
        for (index, row) in output.iter().enumerate() {
            assert_eq!(row[0], Value::from(format!("col{index}").as_str()));
        }
        assert_eq!(output[2][1], Value::from("c"));
    }

    #[tokio::test]
    async fn test_stacked_generators_fan_out() {
        let table = Table::new(
            "test",
            vec![Column::new("id", DataType::Int32)],
        )
        .expect("schema");
        let rows = vec![vec![Value::Int32(7)]];
        let source = ReaderMemory::new(table, rows);

        let outer = generator_mapping(
            "generate_sequence",
            &[],
            vec![Column::new("outer", DataType::Int64)],
            serde_json::json!({"start": 1, "end": 2, "step": 1}),
        );
        let inner = generator_mapping(
            "generate_sequence",
            &[],
            vec![Column::new("inner", DataType::Int64)],
            serde_json::json!({"start": 10, "end": 12, "step": 1}),
        );
        let mut transform =
            TransformRows::new(Box::new(source), vec![], vec![outer, inner], true);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        // 2 outer × 3 inner = 6 rows
        assert_eq!(output.len(), 6);
        let pairs: Vec<(Value, Value)> = output
            .iter()
            .map(|r| (r[0].clone(), r[1].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Value::Int64(1), Value::Int64(10)),
                (Value::Int64(1), Value::Int64(11)),
                (Value::Int64(1), Value::Int64(12)),
                (Value::Int64(2), Value::Int64(10)),
                (Value::Int64(2), Value::Int64(11)),
                (Value::Int64(2), Value::Int64(12)),
            ]
        );
        // the pass-through column carries the triggering row's value into
        // every generated row
        let id_ordinal = transform.schema().ordinal_of("id").expect("id");
        assert!(output.iter().all(|r| r[id_ordinal] == Value::Int32(7)));
    }

    #[tokio::test]
    async fn test_multiple_source_rows_restart_cascade() {
        let table = Table::new(
            "test",
            vec![Column::new("csv_field", DataType::String)],
        )
        .expect("schema");
        let rows = vec![vec![Value::from("a,b")], vec![Value::from("x,y")]];
        let source = ReaderMemory::new(table, rows);

        let mapping = generator_mapping(
            "split_column_to_rows",
            &["csv_field"],
            vec![Column::new("value", DataType::String)],
            serde_json::json!({"separator": ","}),
        );
        let mut transform = TransformRows::new(Box::new(source), vec![], vec![mapping], false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        let values: Vec<_> = output.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("x"),
                Value::from("y"),
            ]
        );
    }

    #[tokio::test]
    async fn test_grouped_columns_held_constant() {
        let table = Table::new(
            "test",
            vec![
                Column::new("region", DataType::String),
                Column::new("csv_field", DataType::String),
            ],
        )
        .expect("schema");
        let rows = vec![
            vec![Value::from("east"), Value::from("a,b")],
            vec![Value::from("west"), Value::from("c")],
        ];
        let source = ReaderMemory::new(table, rows);

        let mapping = generator_mapping(
            "split_column_to_rows",
            &["csv_field"],
            vec![Column::new("value", DataType::String)],
            serde_json::json!({"separator": ","}),
        );
        let mut transform = TransformRows::new(
            Box::new(source),
            vec![ColumnPair::same("region")],
            vec![mapping],
            false,
        );
        assert!(transform.requires_sort());
        assert_eq!(
            transform.required_sort_fields(),
            vec![Sort::ascending("region")]
        );

        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        let pairs: Vec<(Value, Value)> = output
            .iter()
            .map(|r| (r[0].clone(), r[1].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Value::from("east"), Value::from("a")),
                (Value::from("east"), Value::from("b")),
                (Value::from("west"), Value::from("c")),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_generators_is_contract_violation() {
        let table = Table::new("test", vec![Column::new("x", DataType::String)])
            .expect("schema");
        let source = ReaderMemory::new(table, vec![]);
        let mut transform = TransformRows::new(Box::new(source), vec![], vec![], false);
        let cancel = CancellationToken::new();
        let err = transform.open(1, None, &cancel).await.expect_err("must fail");
        assert!(matches!(err, EtlError::Contract(_)));
    }

    #[tokio::test]
    async fn test_empty_source_yields_nothing() {
        let table = Table::new(
            "test",
            vec![Column::new("csv_field", DataType::String)],
        )
        .expect("schema");
        let source = ReaderMemory::new(table, vec![]);
        let mapping = generator_mapping(
            "split_column_to_rows",
            &["csv_field"],
            vec![Column::new("value", DataType::String)],
            serde_json::json!({"separator": ","}),
        );
        let mut transform = TransformRows::new(Box::new(source), vec![], vec![mapping], false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));
        assert!(transform.read(&cancel).await.expect("read").is_none());
    }
}
