//! Per-row validation/clean/reject/discard/abend stage.

use std::mem;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use datalift_types::{
    parse_value, Column, DeltaType, EtlError, InvalidAction, Row, SelectQuery, Table, Value,
};

use crate::functions::{RuleOutcome, ValidationMapping};

use super::{check_cancelled, BoxedTransform, StageCounters, Transform};

pub const STATUS_PASSED: &str = "passed";
pub const STATUS_CLEANED: &str = "cleaned";
pub const STATUS_REJECTED: &str = "rejected";
pub const STATUS_REJECTED_CLEANED: &str = "rejected-cleaned";

pub const OPERATION_CREATE: &str = "C";
pub const OPERATION_REJECT: &str = "R";

/// Single-slot lookahead for the one case that emits two rows: a
/// reject-clean produces the pass row now and the reject row on the very
/// next read call.
enum Lookahead {
    Idle,
    PendingSecondRow(Row),
}

enum Emission {
    Emit(Row),
    EmitWithPending { now: Row, next: Row },
    Skip,
}

/// Applies a list of validation/cleaning mappings to every row and
/// classifies its fate.
///
/// The output row is shaped `[operation, …source columns…, reject_reason,
/// validation_status]`; any of those bookkeeping columns already present
/// upstream are reused rather than added again.
pub struct TransformValidation {
    upstream: BoxedTransform,
    mappings: Vec<ValidationMapping>,
    validate_data_types: bool,
    schema: Table,
    open: bool,
    operation_ordinal: usize,
    reject_reason_ordinal: usize,
    validation_status_ordinal: usize,
    /// Source ordinal → output ordinal.
    source_map: Vec<usize>,
    /// Per mapping: input ordinals into the source row.
    mapping_inputs: Vec<Vec<usize>>,
    /// Per mapping: output ordinals into the output row, for cleaners.
    mapping_outputs: Vec<Vec<usize>>,
    lookahead: Lookahead,
    counters: StageCounters,
}

impl TransformValidation {
    pub fn new(
        upstream: BoxedTransform,
        mappings: Vec<ValidationMapping>,
        validate_data_types: bool,
    ) -> Self {
        Self {
            upstream,
            mappings,
            validate_data_types,
            schema: Table::empty("validate"),
            open: false,
            operation_ordinal: 0,
            reject_reason_ordinal: 0,
            validation_status_ordinal: 0,
            source_map: Vec::new(),
            mapping_inputs: Vec::new(),
            mapping_outputs: Vec::new(),
            lookahead: Lookahead::Idle,
            counters: StageCounters::default(),
        }
    }

    fn initialize_schema(&mut self) -> Result<(), EtlError> {
        let source_schema = self.upstream.schema();
        let mut table = Table::empty("validate");

        // the operation column leads, unless the source already carries one
        if source_schema.ordinal_of_delta(DeltaType::Operation).is_none() {
            table.add_column(Column::for_delta("operation", DeltaType::Operation))?;
        }
        for column in source_schema.columns() {
            table.add_column(column.clone())?;
        }
        table.ensure_delta_column("reject_reason", DeltaType::RejectReason)?;
        table.ensure_delta_column("validation_status", DeltaType::ValidationStatus)?;

        self.operation_ordinal = table
            .ordinal_of_delta(DeltaType::Operation)
            .ok_or_else(|| EtlError::contract("validation schema lost its operation column"))?;
        self.reject_reason_ordinal = table
            .ordinal_of_delta(DeltaType::RejectReason)
            .ok_or_else(|| EtlError::contract("validation schema lost its reject reason column"))?;
        self.validation_status_ordinal = table
            .ordinal_of_delta(DeltaType::ValidationStatus)
            .ok_or_else(|| EtlError::contract("validation schema lost its status column"))?;

        self.source_map = source_schema
            .columns()
            .iter()
            .map(|column| {
                table.ordinal_of(&column.name).ok_or_else(|| {
                    EtlError::contract(format!("source column {} missing from output", column.name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.mapping_inputs = self
            .mappings
            .iter()
            .map(|mapping| source_schema.ordinals_of(&mapping.input_columns))
            .collect::<Result<Vec<_>, _>>()?;
        self.mapping_outputs = self
            .mappings
            .iter()
            .map(|mapping| table.ordinals_of(&mapping.output_columns))
            .collect::<Result<Vec<_>, _>>()?;

        self.schema = table;
        Ok(())
    }

    fn make_reject_row(&self, original: &Row) -> Row {
        let mut reject = original.clone();
        reject[self.operation_ordinal] = Value::String(OPERATION_REJECT.to_string());
        reject
    }

    fn process_row(&mut self, source: Row) -> Result<Emission, EtlError> {
        let column_count = self.schema.len();
        let mut pass_row = vec![Value::Null; column_count];
        for (source_ordinal, value) in source.iter().enumerate() {
            pass_row[self.source_map[source_ordinal]] = value.clone();
        }
        if pass_row[self.operation_ordinal].is_null() {
            pass_row[self.operation_ordinal] = Value::String(OPERATION_CREATE.to_string());
        }

        // snapshot of the untouched values; reject rows are built from this
        // so cleaning never leaks into them
        let original_row = pass_row.clone();

        let mut final_action = InvalidAction::Pass;
        let mut reject_reason = String::new();
        let mut reject_row: Option<Row> = None;
        let mut pending_cleans: Vec<(usize, Value)> = Vec::new();

        for index in 0..self.mappings.len() {
            let inputs: Vec<Value> = self.mapping_inputs[index]
                .iter()
                .map(|&ordinal| source[ordinal].clone())
                .collect();

            let (outcome, action, described) = {
                let mapping = &mut self.mappings[index];
                let outcome = mapping
                    .rule
                    .evaluate(&inputs)
                    .map_err(|e| e.at_stage("validation"))?;
                let described = format!(
                    "{}({})",
                    mapping.name,
                    mapping.input_columns.join(", ")
                );
                (outcome, mapping.invalid_action, described)
            };

            let RuleOutcome::Fail {
                reason,
                clean_values,
            } = outcome
            else {
                continue;
            };

            let described = format!("{described} failed: {reason}");

            if action == InvalidAction::Abend {
                return Err(EtlError::abend(described));
            }

            append_reason(&mut reject_reason, &described);
            final_action = final_action.max(action);

            if action.rejects() && reject_row.is_none() {
                reject_row = Some(self.make_reject_row(&original_row));
            }
            for (&ordinal, value) in self.mapping_outputs[index].iter().zip(clean_values) {
                pending_cleans.push((ordinal, value));
            }
        }

        if final_action.cleans() {
            for (ordinal, value) in pending_cleans {
                pass_row[ordinal] = value;
            }
        }

        if self.validate_data_types {
            for ordinal in 0..column_count {
                let column = self.schema.column(ordinal);
                if !matches!(
                    column.delta_type,
                    DeltaType::TrackingField | DeltaType::NonTrackingField
                ) {
                    continue;
                }

                if pass_row[ordinal].is_null() {
                    if !column.allow_null {
                        if reject_row.is_none() {
                            reject_row = Some(self.make_reject_row(&original_row));
                        }
                        append_reason(
                            &mut reject_reason,
                            &format!("column {}: null into non-nullable column", column.name),
                        );
                        final_action = final_action.max(InvalidAction::Reject);
                    }
                    continue;
                }

                match parse_value(column.data_type, column.rank, &pass_row[ordinal]) {
                    Ok(parsed) => {
                        let over_length = column.data_type.is_string()
                            && column.max_length.is_some_and(|max| {
                                matches!(&parsed, Value::String(s) if s.chars().count() > max as usize)
                            });
                        pass_row[ordinal] = parsed;
                        if over_length {
                            if reject_row.is_none() {
                                reject_row = Some(self.make_reject_row(&original_row));
                            }
                            append_reason(
                                &mut reject_reason,
                                &format!(
                                    "column {}: value exceeds the maximum length of {}",
                                    column.name,
                                    column.max_length.unwrap_or_default()
                                ),
                            );
                            final_action = final_action.max(InvalidAction::Reject);
                        }
                    }
                    Err(error) => {
                        if reject_row.is_none() {
                            reject_row = Some(self.make_reject_row(&original_row));
                        }
                        append_reason(
                            &mut reject_reason,
                            &format!("column {}: {error}", column.name),
                        );
                        final_action = final_action.max(InvalidAction::Reject);
                    }
                }
            }
        }

        match final_action {
            InvalidAction::Pass => {
                pass_row[self.validation_status_ordinal] = Value::String(STATUS_PASSED.into());
                self.counters.rows_passed += 1;
                Ok(Emission::Emit(pass_row))
            }
            InvalidAction::Clean => {
                pass_row[self.validation_status_ordinal] = Value::String(STATUS_CLEANED.into());
                self.counters.rows_cleaned += 1;
                Ok(Emission::Emit(pass_row))
            }
            InvalidAction::RejectClean => {
                let mut reject = reject_row.ok_or_else(|| {
                    EtlError::contract("reject-clean resolved without a reject row")
                })?;
                pass_row[self.validation_status_ordinal] =
                    Value::String(STATUS_REJECTED_CLEANED.into());
                reject[self.validation_status_ordinal] =
                    Value::String(STATUS_REJECTED_CLEANED.into());
                reject[self.reject_reason_ordinal] = Value::String(reject_reason);
                self.counters.rows_cleaned += 1;
                self.counters.rows_rejected += 1;
                Ok(Emission::EmitWithPending {
                    now: pass_row,
                    next: reject,
                })
            }
            InvalidAction::Reject => {
                let mut reject = reject_row
                    .ok_or_else(|| EtlError::contract("reject resolved without a reject row"))?;
                reject[self.validation_status_ordinal] = Value::String(STATUS_REJECTED.into());
                reject[self.reject_reason_ordinal] = Value::String(reject_reason);
                self.counters.rows_rejected += 1;
                tracing::debug!(reason = %reject[self.reject_reason_ordinal].to_display_string(), "row rejected");
                Ok(Emission::Emit(reject))
            }
            InvalidAction::Discard => {
                self.counters.rows_discarded += 1;
                Ok(Emission::Skip)
            }
            InvalidAction::Abend => Err(EtlError::contract(
                "abend action must terminate inside the mapping loop",
            )),
        }
    }
}

fn append_reason(buffer: &mut String, reason: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(reason);
}

#[async_trait]
impl Transform for TransformValidation {
    fn name(&self) -> &'static str {
        "validation"
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
            return Err(EtlError::contract("validation transform is already open"));
        }
        let opened = self.upstream.open(audit_key, query, cancel).await?;
        if !opened {
            return Ok(false);
        }
        self.initialize_schema()?;
        self.lookahead = Lookahead::Idle;
        self.open = true;
        tracing::debug!(
            audit_key,
            mappings = self.mappings.len(),
            validate_data_types = self.validate_data_types,
            "validation transform open"
        );
        Ok(true)
    }

    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Row>, EtlError> {
        if !self.open {
            return Err(EtlError::contract("validation transform read before open"));
        }
        check_cancelled(cancel)?;

        // the second row of a reject-clean is returned before anything else
        if let Lookahead::PendingSecondRow(row) =
            mem::replace(&mut self.lookahead, Lookahead::Idle)
        {
            return Ok(Some(row));
        }

        while let Some(source) = self.upstream.read(cancel).await? {
            check_cancelled(cancel)?;
            self.counters.rows_read += 1;
            match self.process_row(source)? {
                Emission::Emit(row) => return Ok(Some(row)),
                Emission::EmitWithPending { now, next } => {
                    self.lookahead = Lookahead::PendingSecondRow(next);
                    return Ok(Some(now));
                }
                Emission::Skip => continue,
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<(), EtlError> {
        self.upstream.reset()?;
        self.lookahead = Lookahead::Idle;
        for mapping in &mut self.mappings {
            mapping.rule.reset();
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EtlError> {
        self.open = false;
        self.lookahead = Lookahead::Idle;
        self.upstream.close().await
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
    use datalift_types::DataType;

    fn source_table() -> Table {
        Table::new(
            "people",
            vec![
                Column::new("email", DataType::String),
                Column::new("age", DataType::Int32),
            ],
        )
        .expect("schema")
    }

    fn mapping(
        function: &str,
        action: InvalidAction,
        columns: &[&str],
        params: serde_json::Value,
    ) -> ValidationMapping {
        let rule = FunctionRegistry::with_builtins()
            .build_validation(function, &params)
            .expect("build rule");
        ValidationMapping::new(
            function,
            action,
            columns.iter().map(|c| c.to_string()).collect(),
            rule,
        )
    }

    fn validation(
        rows: Vec<Row>,
        mappings: Vec<ValidationMapping>,
        validate_data_types: bool,
    ) -> TransformValidation {
        TransformValidation::new(
            Box::new(ReaderMemory::new(source_table(), rows)),
            mappings,
            validate_data_types,
        )
    }

    async fn collect(transform: &mut TransformValidation) -> Vec<Row> {
        let cancel = CancellationToken::new();
        let mut rows = Vec::new();
        while let Some(row) = transform.read(&cancel).await.expect("read") {
            rows.push(row);
        }
        rows
    }

    fn status(transform: &TransformValidation, row: &Row) -> String {
        row[transform.validation_status_ordinal].to_display_string()
    }

    fn operation(transform: &TransformValidation, row: &Row) -> String {
        row[transform.operation_ordinal].to_display_string()
    }

    #[tokio::test]
    async fn test_schema_adds_bookkeeping_columns() {
        let mut transform = validation(vec![], vec![], true);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let schema = transform.schema();
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.ordinal_of_delta(DeltaType::Operation), Some(0));
        assert_eq!(schema.ordinal_of("email"), Some(1));
        assert_eq!(schema.ordinal_of("age"), Some(2));
        assert!(schema.ordinal_of_delta(DeltaType::RejectReason).is_some());
        assert!(schema
            .ordinal_of_delta(DeltaType::ValidationStatus)
            .is_some());
    }

    #[tokio::test]
    async fn test_pass_row_gets_create_operation_and_status() {
        let rows = vec![vec![Value::from("a@b.com"), Value::Int32(30)]];
        let mut transform = validation(rows, vec![], true);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        assert_eq!(operation(&transform, &output[0]), "C");
        assert_eq!(status(&transform, &output[0]), "passed");
    }

    #[tokio::test]
    async fn test_reject_emits_single_reject_row() {
        let rows = vec![vec![Value::Null, Value::Int32(30)]];
        let mappings = vec![mapping(
            "not_null",
            InvalidAction::Reject,
            &["email"],
            serde_json::json!({}),
        )];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        assert_eq!(operation(&transform, &output[0]), "R");
        assert_eq!(status(&transform, &output[0]), "rejected");
        let reason = output[0][transform.reject_reason_ordinal].to_display_string();
        assert!(reason.contains("not_null(email) failed"));
        assert_eq!(transform.counters().rows_rejected, 1);
    }

    #[tokio::test]
    async fn test_clean_overwrites_only_target_column() {
        let rows = vec![vec![Value::from("a@b.com"), Value::Null]];
        let mappings = vec![mapping(
            "default_value",
            InvalidAction::Clean,
            &["age"],
            serde_json::json!({"value": {"int32": 18}}),
        )];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        let age_ordinal = transform.schema().ordinal_of("age").expect("age");
        let email_ordinal = transform.schema().ordinal_of("email").expect("email");
        assert_eq!(output[0][age_ordinal], Value::Int32(18));
        assert_eq!(output[0][email_ordinal], Value::from("a@b.com"));
        assert_eq!(status(&transform, &output[0]), "cleaned");
    }

    #[tokio::test]
    async fn test_reject_clean_emits_two_rows_across_two_reads() {
        let rows = vec![vec![Value::from("a@b.com"), Value::Null]];
        let mappings = vec![mapping(
            "default_value",
            InvalidAction::RejectClean,
            &["age"],
            serde_json::json!({"value": {"int32": 18}}),
        )];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let age_ordinal = transform.schema().ordinal_of("age").expect("age");

        let pass = transform
            .read(&cancel)
            .await
            .expect("read")
            .expect("pass row");
        assert_eq!(operation(&transform, &pass), "C");
        assert_eq!(status(&transform, &pass), "rejected-cleaned");
        assert_eq!(pass[age_ordinal], Value::Int32(18));

        let reject = transform
            .read(&cancel)
            .await
            .expect("read")
            .expect("reject row");
        assert_eq!(operation(&transform, &reject), "R");
        assert_eq!(status(&transform, &reject), "rejected-cleaned");
        // the reject row keeps the pre-clean original value
        assert_eq!(reject[age_ordinal], Value::Null);

        assert!(transform.read(&cancel).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_discard_emits_nothing_for_row() {
        let rows = vec![
            vec![Value::Null, Value::Int32(1)],
            vec![Value::from("keep@x.com"), Value::Int32(2)],
        ];
        let mappings = vec![mapping(
            "not_null",
            InvalidAction::Discard,
            &["email"],
            serde_json::json!({}),
        )];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        let email_ordinal = transform.schema().ordinal_of("email").expect("email");
        assert_eq!(output[0][email_ordinal], Value::from("keep@x.com"));
        assert_eq!(transform.counters().rows_discarded, 1);
    }

    #[tokio::test]
    async fn test_abend_halts_before_further_rows() {
        let rows = vec![
            vec![Value::Null, Value::Int32(1)],
            vec![Value::from("never@read.com"), Value::Int32(2)],
        ];
        let mappings = vec![mapping(
            "not_null",
            InvalidAction::Abend,
            &["email"],
            serde_json::json!({}),
        )];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let err = transform.read(&cancel).await.expect_err("must abend");
        assert!(matches!(err, EtlError::Abend(_)));
        // only the abending row was pulled from upstream
        assert_eq!(transform.counters().rows_read, 1);
    }

    #[tokio::test]
    async fn test_highest_action_wins() {
        let rows = vec![vec![Value::Null, Value::Null]];
        let mappings = vec![
            mapping(
                "default_value",
                InvalidAction::Clean,
                &["age"],
                serde_json::json!({"value": {"int32": 0}}),
            ),
            mapping(
                "not_null",
                InvalidAction::Reject,
                &["email"],
                serde_json::json!({}),
            ),
        ];
        let mut transform = validation(rows, mappings, false);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        assert_eq!(status(&transform, &output[0]), "rejected");
        let reason = output[0][transform.reject_reason_ordinal].to_display_string();
        assert!(reason.contains("default_value"));
        assert!(reason.contains("not_null"));
    }

    #[tokio::test]
    async fn test_datatype_validation_rejects_bad_parse() {
        let rows = vec![vec![Value::from("a@b.com"), Value::from("not-a-number")]];
        let mut transform = validation(rows, vec![], true);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        assert_eq!(status(&transform, &output[0]), "rejected");
        let reason = output[0][transform.reject_reason_ordinal].to_display_string();
        assert!(reason.contains("column age"));
    }

    #[tokio::test]
    async fn test_datatype_validation_parses_into_canonical_type() {
        let rows = vec![vec![Value::from("a@b.com"), Value::from("42")]];
        let mut transform = validation(rows, vec![], true);
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        let age_ordinal = transform.schema().ordinal_of("age").expect("age");
        assert_eq!(output[0][age_ordinal], Value::Int32(42));
        assert_eq!(status(&transform, &output[0]), "passed");
    }

    #[tokio::test]
    async fn test_null_into_non_nullable_rejects() {
        let table = Table::new(
            "people",
            vec![
                Column::new("email", DataType::String).not_null(),
                Column::new("age", DataType::Int32),
            ],
        )
        .expect("schema");
        let rows = vec![vec![Value::Null, Value::Int32(5)]];
        let mut transform = TransformValidation::new(
            Box::new(ReaderMemory::new(table, rows)),
            vec![],
            true,
        );
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(output.len(), 1);
        assert_eq!(status(&transform, &output[0]), "rejected");
        let reason = output[0][transform.reject_reason_ordinal].to_display_string();
        assert!(reason.contains("null into non-nullable"));
    }

    #[tokio::test]
    async fn test_max_length_overflow_rejects() {
        let table = Table::new(
            "people",
            vec![
                Column::new("email", DataType::String).with_max_length(5),
                Column::new("age", DataType::Int32),
            ],
        )
        .expect("schema");
        let rows = vec![vec![Value::from("toolong@example.com"), Value::Int32(5)]];
        let mut transform = TransformValidation::new(
            Box::new(ReaderMemory::new(table, rows)),
            vec![],
            true,
        );
        let cancel = CancellationToken::new();
        assert!(transform.open(1, None, &cancel).await.expect("open"));

        let output = collect(&mut transform).await;
        assert_eq!(status(&transform, &output[0]), "rejected");
        let reason = output[0][transform.reject_reason_ordinal].to_display_string();
        assert!(reason.contains("maximum length"));
    }
}
