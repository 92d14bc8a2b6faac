//! Built-in validation and cleaning rules.

use regex::Regex;
use serde::Deserialize;

use datalift_types::{EtlError, Value};

use super::{FunctionRegistry, RuleOutcome, ValidationRule};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_validation("not_null", |_| Ok(Box::new(NotNull)));
    registry.register_validation("max_length", |params| {
        let config: MaxLengthConfig = parse_params("max_length", params)?;
        Ok(Box::new(MaxLength { max: config.max }))
    });
    registry.register_validation("pattern_match", |params| {
        let config: PatternConfig = parse_params("pattern_match", params)?;
        let regex = Regex::new(&config.pattern).map_err(|e| {
            EtlError::contract(format!("pattern_match: invalid pattern '{}': {e}", config.pattern))
        })?;
        Ok(Box::new(PatternMatch {
            pattern: config.pattern,
            regex,
        }))
    });
    registry.register_validation("range", |params| {
        let config: RangeConfig = parse_params("range", params)?;
        Ok(Box::new(Range {
            min: config.min,
            max: config.max,
        }))
    });
    registry.register_validation("default_value", |params| {
        let config: DefaultValueConfig = parse_params("default_value", params)?;
        Ok(Box::new(DefaultValue {
            value: config.value,
        }))
    });
    registry.register_validation("trim", |_| Ok(Box::new(Trim)));
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

fn first(inputs: &[Value]) -> &Value {
    inputs.first().unwrap_or(&Value::Null)
}

/// Fails when the value is null.
struct NotNull;

impl ValidationRule for NotNull {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        if first(inputs).is_null() {
            Ok(RuleOutcome::fail("value is null"))
        } else {
            Ok(RuleOutcome::Pass)
        }
    }
}

#[derive(Deserialize)]
struct MaxLengthConfig {
    max: usize,
}

/// Fails when the rendered text exceeds the maximum length. Nulls pass;
/// null handling belongs to `not_null`.
struct MaxLength {
    max: usize,
}

impl ValidationRule for MaxLength {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        let value = first(inputs);
        if value.is_null() {
            return Ok(RuleOutcome::Pass);
        }
        let length = value.to_display_string().chars().count();
        if length > self.max {
            Ok(RuleOutcome::fail(format!(
                "length {length} exceeds maximum of {}",
                self.max
            )))
        } else {
            Ok(RuleOutcome::Pass)
        }
    }
}

#[derive(Deserialize)]
struct PatternConfig {
    pattern: String,
}

/// Fails when the value is null, not text, or does not match the pattern.
struct PatternMatch {
    pattern: String,
    regex: Regex,
}

impl ValidationRule for PatternMatch {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        match first(inputs) {
            Value::Null => Ok(RuleOutcome::fail("value is null")),
            Value::String(text) => {
                if self.regex.is_match(text) {
                    Ok(RuleOutcome::Pass)
                } else {
                    Ok(RuleOutcome::fail(format!(
                        "value '{text}' does not match pattern '{}'",
                        self.pattern
                    )))
                }
            }
            other => Ok(RuleOutcome::fail(format!(
                "value is {} not text",
                other.type_name()
            ))),
        }
    }
}

#[derive(Deserialize)]
struct RangeConfig {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Fails when the numeric value falls outside the configured bounds.
struct Range {
    min: Option<f64>,
    max: Option<f64>,
}

impl ValidationRule for Range {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        let value = first(inputs);
        if value.is_null() {
            return Ok(RuleOutcome::fail("value is null"));
        }
        let Some(number) = value.as_f64() else {
            return Ok(RuleOutcome::fail(format!(
                "value is {} not numeric",
                value.type_name()
            )));
        };
        if !number.is_finite() {
            return Ok(RuleOutcome::fail("value is a non-finite number"));
        }
        if self.min.is_some_and(|lower| number < lower)
            || self.max.is_some_and(|upper| number > upper)
        {
            return Ok(RuleOutcome::fail(format!(
                "value {number} outside bounds [{:?}, {:?}]",
                self.min, self.max
            )));
        }
        Ok(RuleOutcome::Pass)
    }
}

#[derive(Deserialize)]
struct DefaultValueConfig {
    value: Value,
}

/// Cleaner: replaces a null value with the configured default.
struct DefaultValue {
    value: Value,
}

impl ValidationRule for DefaultValue {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        if first(inputs).is_null() {
            Ok(RuleOutcome::fail_with_clean(
                "value is null, default applied",
                vec![self.value.clone()],
            ))
        } else {
            Ok(RuleOutcome::Pass)
        }
    }
}

/// Cleaner: strips surrounding whitespace from text values.
struct Trim;

impl ValidationRule for Trim {
    fn evaluate(&mut self, inputs: &[Value]) -> Result<RuleOutcome, EtlError> {
        match first(inputs) {
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.len() == text.len() {
                    Ok(RuleOutcome::Pass)
                } else {
                    Ok(RuleOutcome::fail_with_clean(
                        "value has surrounding whitespace",
                        vec![Value::String(trimmed.to_string())],
                    ))
                }
            }
            _ => Ok(RuleOutcome::Pass),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(id: &str, params: serde_json::Value) -> Box<dyn ValidationRule> {
        FunctionRegistry::with_builtins()
            .build_validation(id, &params)
            .expect("build rule")
    }

    #[test]
    fn test_not_null() {
        let mut rule = build("not_null", serde_json::json!({}));
        assert_eq!(rule.evaluate(&[Value::Null]).expect("eval"), RuleOutcome::fail("value is null"));
        assert_eq!(
            rule.evaluate(&[Value::Int32(1)]).expect("eval"),
            RuleOutcome::Pass
        );
    }

    #[test]
    fn test_max_length_counts_chars() {
        let mut rule = build("max_length", serde_json::json!({"max": 3}));
        assert_eq!(
            rule.evaluate(&[Value::from("abc")]).expect("eval"),
            RuleOutcome::Pass
        );
        assert!(matches!(
            rule.evaluate(&[Value::from("abcd")]).expect("eval"),
            RuleOutcome::Fail { .. }
        ));
        // nulls are not this rule's concern
        assert_eq!(rule.evaluate(&[Value::Null]).expect("eval"), RuleOutcome::Pass);
    }

    #[test]
    fn test_pattern_match() {
        let mut rule = build("pattern_match", serde_json::json!({"pattern": "^.+@.+$"}));
        assert_eq!(
            rule.evaluate(&[Value::from("a@b.com")]).expect("eval"),
            RuleOutcome::Pass
        );
        assert!(matches!(
            rule.evaluate(&[Value::from("nope")]).expect("eval"),
            RuleOutcome::Fail { .. }
        ));
        assert!(matches!(
            rule.evaluate(&[Value::Int32(5)]).expect("eval"),
            RuleOutcome::Fail { .. }
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_build() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry
            .build_validation("pattern_match", &serde_json::json!({"pattern": "("}))
            .is_err());
    }

    #[test]
    fn test_range_bounds() {
        let mut rule = build("range", serde_json::json!({"min": 0.0, "max": 100.0}));
        assert_eq!(
            rule.evaluate(&[Value::Int32(50)]).expect("eval"),
            RuleOutcome::Pass
        );
        assert_eq!(
            rule.evaluate(&[Value::Int32(100)]).expect("eval"),
            RuleOutcome::Pass
        );
        assert!(matches!(
            rule.evaluate(&[Value::Int32(101)]).expect("eval"),
            RuleOutcome::Fail { .. }
        ));
        assert!(matches!(
            rule.evaluate(&[Value::Float64(f64::NAN)]).expect("eval"),
            RuleOutcome::Fail { .. }
        ));
    }

    #[test]
    fn test_default_value_cleans_nulls() {
        let mut rule = build("default_value", serde_json::json!({"value": {"int32": 0}}));
        let outcome = rule.evaluate(&[Value::Null]).expect("eval");
        assert_eq!(
            outcome,
            RuleOutcome::fail_with_clean("value is null, default applied", vec![Value::Int32(0)])
        );
        assert_eq!(
            rule.evaluate(&[Value::Int32(9)]).expect("eval"),
            RuleOutcome::Pass
        );
    }

    #[test]
    fn test_trim_cleans_whitespace() {
        let mut rule = build("trim", serde_json::json!({}));
        let outcome = rule.evaluate(&[Value::from("  padded  ")]).expect("eval");
        assert_eq!(
            outcome,
            RuleOutcome::fail_with_clean(
                "value has surrounding whitespace",
                vec![Value::from("padded")]
            )
        );
        assert_eq!(
            rule.evaluate(&[Value::from("clean")]).expect("eval"),
            RuleOutcome::Pass
        );
    }
}
