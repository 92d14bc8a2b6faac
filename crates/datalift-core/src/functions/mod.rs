//! Mapping functions and their registry.
//!
//! Validation rules, cleaners, and row generators form a closed set of
//! callables registered in a table keyed by a stable identifier. The
//! registry is built once at process start and passed by reference into
//! the pipeline builder; there is no ambient global state and no runtime
//! discovery.

pub mod generators;
pub mod validations;

use std::collections::HashMap;

use datalift_types::{Column, EtlError, InvalidAction, Value};

/// Result of evaluating a validation rule against one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Pass,
    Fail {
        /// Human-readable failure reason, appended to the reject text.
        reason: String,
        /// Replacement values for the mapping's output columns, applied
        /// only when the mapping's action cleans. Empty for plain
        /// validations.
        clean_values: Vec<Value>,
    },
}

impl RuleOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
            clean_values: Vec::new(),
        }
    }

    pub fn fail_with_clean(reason: impl Into<String>, clean_values: Vec<Value>) -> Self {
        Self::Fail {
            reason: reason.into(),
            clean_values,
        }
    }
}

/// A validation or cleaning callable.
pub trait ValidationRule: Send {
    /// Clear any per-run state. Called when the owning transform resets.
    fn reset(&mut self) {}

    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError>;
}

/// A row-generation callable with sequence state.
///
/// `next` yields one fixed-arity value set per call while the sequence has
/// rows, then `None` once it is exhausted. After a `reset` the next call
/// starts a fresh sequence from the supplied inputs.
pub trait RowGenerator: Send {
    fn reset(&mut self);

    fn next(&mut self, inputs: &[Value]) -> Result<Option<Vec<Value>>, EtlError>;
}

/// A validation rule bound to pipeline columns.
pub struct ValidationMapping {
    pub name: String,
    pub invalid_action: InvalidAction,
    /// Columns read from the source row, in rule-argument order.
    pub input_columns: Vec<String>,
    /// Columns overwritten in the pass row when the action cleans.
    pub output_columns: Vec<String>,
    pub rule: Box<dyn ValidationRule>,
}

impl ValidationMapping {
    pub fn new(
        name: impl Into<String>,
        invalid_action: InvalidAction,
        input_columns: Vec<String>,
        rule: Box<dyn ValidationRule>,
    ) -> Self {
        let input_columns_clone = input_columns.clone();
        Self {
            name: name.into(),
            invalid_action,
            input_columns,
            output_columns: input_columns_clone,
            rule,
        }
    }

    pub fn with_output_columns(mut self, output_columns: Vec<String>) -> Self {
        self.output_columns = output_columns;
        self
    }
}

/// A row generator bound to pipeline columns.
pub struct GeneratorMapping {
    pub name: String,
    /// Columns read from the triggering source row, in argument order.
    pub input_columns: Vec<String>,
    /// Output columns this generator contributes to the stage schema.
    pub output_columns: Vec<Column>,
    pub generator: Box<dyn RowGenerator>,
}

type ValidationFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn ValidationRule>, EtlError> + Send + Sync>;
type GeneratorFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn RowGenerator>, EtlError> + Send + Sync>;

/// Explicit function table keyed by stable identifiers.
#[derive(Default)]
pub struct FunctionRegistry {
    validations: HashMap<String, ValidationFactory>,
    generators: HashMap<String, GeneratorFactory>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in rule and generator set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        validations::register(&mut registry);
        generators::register(&mut registry);
        registry
    }

    pub fn register_validation<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn ValidationRule>, EtlError>
            + Send
            + Sync
            + 'static,
    {
        self.validations.insert(id.into(), Box::new(factory));
    }

    pub fn register_generator<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn RowGenerator>, EtlError>
            + Send
            + Sync
            + 'static,
    {
        self.generators.insert(id.into(), Box::new(factory));
    }

    pub fn build_validation(
        &self,
        id: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn ValidationRule>, EtlError> {
        let factory = self
            .validations
            .get(id)
            .ok_or_else(|| EtlError::contract(format!("no validation function registered as '{id}'")))?;
        factory(params)
    }

    pub fn build_generator(
        &self,
        id: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn RowGenerator>, EtlError> {
        let factory = self
            .generators
            .get(id)
            .ok_or_else(|| EtlError::contract(format!("no row generator registered as '{id}'")))?;
        factory(params)
    }

    pub fn validation_ids(&self) -> Vec<&str> {
        self.validations.keys().map(String::as_str).collect()
    }

    pub fn generator_ids(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry
            .build_validation("not_null", &serde_json::json!({}))
            .is_ok());
        assert!(registry
            .build_validation("max_length", &serde_json::json!({"max": 10}))
            .is_ok());
        assert!(registry
            .build_validation("pattern_match", &serde_json::json!({"pattern": "^a$"}))
            .is_ok());
        assert!(registry
            .build_validation("range", &serde_json::json!({"min": 0.0}))
            .is_ok());
        assert!(registry
            .build_validation("trim", &serde_json::json!({}))
            .is_ok());
        assert!(registry
            .build_validation(
                "default_value",
                &serde_json::json!({"value": {"int32": 1}})
            )
            .is_ok());
        assert!(registry
            .build_generator(
                "split_column_to_rows",
                &serde_json::json!({"separator": ","})
            )
            .is_ok());
        assert!(registry
            .build_generator(
                "columns_to_rows",
                &serde_json::json!({"columns": ["a", "b"]})
            )
            .is_ok());
        assert!(registry
            .build_generator(
                "generate_sequence",
                &serde_json::json!({"start": 1, "end": 3, "step": 1})
            )
            .is_ok());
    }

    #[test]
    fn test_unknown_id_is_contract_violation() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry
            .build_validation("nope", &serde_json::json!({}))
            .err()
            .expect("must fail");
        assert!(matches!(err, EtlError::Contract(_)));
    }

    #[test]
    fn test_custom_registration() {
        struct AlwaysFail;
        impl ValidationRule for AlwaysFail {
            fn evaluate(&mut self, _inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
                Ok(RuleOutcome::fail("always fails"))
            }
        }

        let mut registry = FunctionRegistry::new();
        registry.register_validation("always_fail", |_| Ok(Box::new(AlwaysFail)));
        let mut rule = registry
            .build_validation("always_fail", &serde_json::Value::Null)
            .expect("build");
        assert_eq!(
            rule.evaluate(&[]).expect("evaluate"),
            RuleOutcome::fail("always fails")
        );
    }
}
