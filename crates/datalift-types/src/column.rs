//! Column descriptor and pipeline role tags.

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::value::Value;

/// The function a column performs in the pipeline, independent of its type.
///
/// Role tags are mutually informative: an `Ignore` column is never
/// type-validated, and the `Operation` column records per-row C/U/D/R/T
/// semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    AutoIncrement,
    NaturalKey,
    TrackingField,
    NonTrackingField,
    Ignore,
    CreateDate,
    UpdateDate,
    CreateAuditKey,
    UpdateAuditKey,
    ValidFromDate,
    ValidToDate,
    IsCurrentField,
    Version,
    /// Per-row operation flag: 'C' create, 'U' update, 'D' delete,
    /// 'R' reject, 'T' truncate.
    Operation,
    RejectReason,
    ValidationStatus,
}

impl DeltaType {
    /// Default canonical type for generated columns of this role.
    pub fn default_data_type(&self) -> DataType {
        match self {
            Self::AutoIncrement | Self::CreateAuditKey | Self::UpdateAuditKey => DataType::UInt64,
            Self::CreateDate | Self::UpdateDate | Self::ValidFromDate | Self::ValidToDate => {
                DataType::DateTime
            }
            Self::IsCurrentField => DataType::Boolean,
            Self::Version => DataType::Int32,
            _ => DataType::String,
        }
    }

    /// Source data columns, as opposed to generated/bookkeeping columns.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::NaturalKey | Self::TrackingField | Self::NonTrackingField
        )
    }
}

/// Logical field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Array nesting depth; 0 = scalar.
    pub rank: u8,
    pub delta_type: DeltaType,
    pub allow_null: bool,
    pub max_length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub default_value: Option<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            rank: 0,
            delta_type: DeltaType::TrackingField,
            allow_null: true,
            max_length: None,
            precision: None,
            scale: None,
            default_value: None,
        }
    }

    /// A generated column for the given role, typed by the role's default.
    pub fn for_delta(name: impl Into<String>, delta_type: DeltaType) -> Self {
        Self {
            name: name.into(),
            data_type: delta_type.default_data_type(),
            rank: 0,
            delta_type,
            allow_null: true,
            max_length: None,
            precision: None,
            scale: None,
            default_value: None,
        }
    }

    pub fn with_delta(mut self, delta_type: DeltaType) -> Self {
        self.delta_type = delta_type;
        self
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0
    }
}
