//! Tagged canonical value.
//!
//! A row is a `Vec<Value>` aligned 1:1 with its table's columns. Arrays are
//! an explicit variant rather than a rank overload on the scalar types, so a
//! slot always carries exactly one shape.

use std::cmp::Ordering;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data_type::DataType;

/// A row of canonical values, owned by the transform that produced it.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Exact numeric carried as normalized text, no native binary form.
    Decimal { value: String, scale: i32 },
    String(String),
    Binary(Vec<u8>),
    Guid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Json(serde_json::Value),
    Xml(String),
    /// Well-known-binary geometry payload.
    Geometry(Vec<u8>),
    /// Nested record-set carried as structured JSON.
    Node(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The canonical type of a non-null scalar, or `None` for nulls and
    /// arrays (whose element type lives on the column).
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null | Value::Array(_) => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int8(_) => Some(DataType::Int8),
            Value::UInt8(_) => Some(DataType::UInt8),
            Value::Int16(_) => Some(DataType::Int16),
            Value::UInt16(_) => Some(DataType::UInt16),
            Value::Int32(_) => Some(DataType::Int32),
            Value::UInt32(_) => Some(DataType::UInt32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::UInt64(_) => Some(DataType::UInt64),
            Value::Float32(_) => Some(DataType::Float32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Decimal { .. } => Some(DataType::Decimal),
            Value::String(_) => Some(DataType::String),
            Value::Binary(_) => Some(DataType::Binary),
            Value::Guid(_) => Some(DataType::Guid),
            Value::Date(_) => Some(DataType::Date),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Time(_) => Some(DataType::Time),
            Value::Json(_) => Some(DataType::Json),
            Value::Xml(_) => Some(DataType::Xml),
            Value::Geometry(_) => Some(DataType::Geometry),
            Value::Node(_) => Some(DataType::Node),
        }
    }

    /// Short variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Boolean(_) => "boolean",
            Value::Int8(_) => "int8",
            Value::UInt8(_) => "uint8",
            Value::Int16(_) => "int16",
            Value::UInt16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::UInt32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Decimal { .. } => "decimal",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Guid(_) => "guid",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
            Value::Xml(_) => "xml",
            Value::Geometry(_) => "geometry",
            Value::Node(_) => "node",
        }
    }

    /// Exact integer view across the integer family plus booleans.
    pub(crate) fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Boolean(b) => Some(i128::from(*b)),
            Value::Int8(n) => Some(i128::from(*n)),
            Value::UInt8(n) => Some(i128::from(*n)),
            Value::Int16(n) => Some(i128::from(*n)),
            Value::UInt16(n) => Some(i128::from(*n)),
            Value::Int32(n) => Some(i128::from(*n)),
            Value::UInt32(n) => Some(i128::from(*n)),
            Value::Int64(n) => Some(i128::from(*n)),
            Value::UInt64(n) => Some(i128::from(*n)),
            _ => None,
        }
    }

    /// Numeric magnitude view covering integers, floats and decimals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(f) => Some(f64::from(*f)),
            Value::Float64(f) => Some(*f),
            Value::Decimal { value, .. } => value.parse::<f64>().ok(),
            other => other.as_i128().map(|n| n as f64),
        }
    }

    /// Render the value as display text. This is the representation used
    /// when a backend can only store a string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Int8(n) => n.to_string(),
            Value::UInt8(n) => n.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::UInt16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::UInt32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::UInt64(n) => n.to_string(),
            Value::Float32(f) => f.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::Decimal { value, .. } => value.clone(),
            Value::String(s) => s.clone(),
            Value::Binary(bytes) | Value::Geometry(bytes) => {
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
            Value::Guid(id) => id.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Json(v) | Value::Node(v) => v.to_string(),
            Value::Xml(s) => s.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect()).to_string()
            }
        }
    }

    /// Structural JSON representation, used when downgrading arrays and
    /// nodes for backends without native support.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int8(n) => serde_json::Value::from(*n),
            Value::UInt8(n) => serde_json::Value::from(*n),
            Value::Int16(n) => serde_json::Value::from(*n),
            Value::UInt16(n) => serde_json::Value::from(*n),
            Value::Int32(n) => serde_json::Value::from(*n),
            Value::UInt32(n) => serde_json::Value::from(*n),
            Value::Int64(n) => serde_json::Value::from(*n),
            Value::UInt64(n) => serde_json::Value::from(*n),
            Value::Float32(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            // exact text survives the json round trip as a string
            Value::Decimal { value, .. } => serde_json::Value::String(value.clone()),
            Value::Json(v) | Value::Node(v) => v.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            other => serde_json::Value::String(other.to_display_string()),
        }
    }

    /// Lift a JSON value into the closest canonical value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt64(u)
                } else {
                    Value::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            object @ serde_json::Value::Object(_) => Value::Json(object.clone()),
        }
    }

    /// Total order used by sort keys and filter evaluation. Nulls sort
    /// first; numeric values compare across variants by magnitude; values
    /// of unrelated types fall back to their display text.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Xml(a), Value::Xml(b)) => a.cmp(b),
            (Value::Guid(a), Value::Guid(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Geometry(a), Value::Geometry(b)) => a.cmp(b),
            // exact integer comparison first: f64 loses precision past 2^53
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => OrderedFloat(x).cmp(&OrderedFloat(y)),
                    _ => a.to_display_string().cmp(&b.to_display_string()),
                },
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}
