//! Typed error model for the transform engine.

use thiserror::Error;

use crate::data_type::DataType;

/// Engine-wide error taxonomy.
///
/// `Contract` and `Abend` are always fatal. `RowValue` failures are
/// recoverable only inside the validation transform, where they become
/// reject rows; raised anywhere else they abort the pipeline. The engine
/// never retries `Connection` errors itself; retry policy belongs to the
/// orchestrator driving the pipeline.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Caller bug: an API was used outside its documented lifecycle.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Failure reported by an underlying connection (I/O, timeout,
    /// backend rejection).
    #[error("connection failure: {0}")]
    Connection(String),

    /// A single value failed a type/null/length rule.
    #[error("column {column}: {message}")]
    RowValue { column: String, message: String },

    /// A value could not be converted to the requested canonical type.
    #[error("cannot convert to {target}: {message}")]
    Convert { target: DataType, message: String },

    /// A validation rule classified as abend fired. Never downgraded.
    #[error("validation abend: {0}")]
    Abend(String),

    /// A stage-internal error, wrapped with the stage identity.
    #[error("{stage} transform failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<EtlError>,
    },

    /// Cooperative cancellation was observed between row productions.
    #[error("operation cancelled")]
    Cancelled,
}

impl EtlError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn row_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RowValue {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn convert(target: DataType, message: impl Into<String>) -> Self {
        Self::Convert {
            target,
            message: message.into(),
        }
    }

    pub fn abend(message: impl Into<String>) -> Self {
        Self::Abend(message.into())
    }

    /// Wrap with the identity of the stage where the error surfaced.
    /// Abend and cancellation pass through unwrapped so their handling
    /// stays uniform across the pipeline.
    pub fn at_stage(self, stage: impl Into<String>) -> Self {
        match self {
            Self::Abend(_) | Self::Cancelled => self,
            other => Self::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// True for errors a validation layer may turn into reject rows.
    pub fn is_row_value(&self) -> bool {
        matches!(self, Self::RowValue { .. } | Self::Convert { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_source() {
        let err = EtlError::contract("already open").at_stage("sort");
        let text = err.to_string();
        assert!(text.contains("sort transform failed"));
        match err {
            EtlError::Stage { stage, source } => {
                assert_eq!(stage, "sort");
                assert!(matches!(*source, EtlError::Contract(_)));
            }
            other => panic!("expected stage error, got {other:?}"),
        }
    }

    #[test]
    fn test_abend_never_wrapped() {
        let err = EtlError::abend("rule fired").at_stage("validation");
        assert!(matches!(err, EtlError::Abend(_)));
    }

    #[test]
    fn test_cancelled_never_wrapped() {
        let err = EtlError::Cancelled.at_stage("rows");
        assert!(matches!(err, EtlError::Cancelled));
    }

    #[test]
    fn test_row_value_classification() {
        assert!(EtlError::row_value("age", "bad").is_row_value());
        assert!(!EtlError::contract("nope").is_row_value());
    }
}
