//! Canonical type enumeration and value parsing.
//!
//! `parse_value` is the single source of truth for coercing an arbitrary
//! [`Value`] into a given canonical type. Transforms and connectors should
//! use it instead of hand-rolling match blocks.

use std::fmt;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EtlError;
use crate::value::Value;

/// Logical, backend-independent column type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Decimal,
    String,
    /// Unbounded text. Parsed identically to `String`; connectors may map it
    /// to a different native type.
    Text,
    Binary,
    Guid,
    Date,
    DateTime,
    Time,
    Json,
    Xml,
    /// Well-known-binary geometry payload.
    Geometry,
    /// A nested record-set, carried as structured JSON.
    Node,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Guid => "guid",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Geometry => "geometry",
            Self::Node => "node",
        };
        f.write_str(name)
    }
}

impl DataType {
    /// True for the integer and floating families (decimal excluded; it is
    /// carried as exact text).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Float32
                | Self::Float64
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String | Self::Text)
    }
}

/// Coerce `value` into canonical type `ty` at array depth `rank`.
///
/// Nulls pass through untyped. A rank above zero expects an array value, a
/// JSON value holding an array, or a string containing a JSON array.
pub fn parse_value(ty: DataType, rank: u8, value: &Value) -> Result<Value, EtlError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if rank > 0 {
        return parse_array(ty, rank, value);
    }

    match ty {
        DataType::Boolean => parse_boolean(value),
        DataType::Int8 => parse_integer(ty, value, i8::MIN as i128, i8::MAX as i128),
        DataType::UInt8 => parse_integer(ty, value, 0, u8::MAX as i128),
        DataType::Int16 => parse_integer(ty, value, i16::MIN as i128, i16::MAX as i128),
        DataType::UInt16 => parse_integer(ty, value, 0, u16::MAX as i128),
        DataType::Int32 => parse_integer(ty, value, i32::MIN as i128, i32::MAX as i128),
        DataType::UInt32 => parse_integer(ty, value, 0, u32::MAX as i128),
        DataType::Int64 => parse_integer(ty, value, i64::MIN as i128, i64::MAX as i128),
        DataType::UInt64 => parse_integer(ty, value, 0, u64::MAX as i128),
        DataType::Float32 => parse_float(value).map(|f| Value::Float32(f as f32)),
        DataType::Float64 => parse_float(value).map(Value::Float64),
        DataType::Decimal => parse_decimal(value),
        DataType::String | DataType::Text => Ok(Value::String(value.to_display_string())),
        DataType::Binary => parse_binary(value).map(Value::Binary),
        DataType::Guid => parse_guid(value),
        DataType::Date => parse_date(value),
        DataType::DateTime => parse_datetime(value),
        DataType::Time => parse_time(value),
        DataType::Json => parse_json(value),
        DataType::Xml => parse_xml(value),
        DataType::Geometry => parse_binary(value).map(Value::Geometry),
        DataType::Node => parse_node(value),
    }
}

fn parse_array(ty: DataType, rank: u8, value: &Value) -> Result<Value, EtlError> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::Json(serde_json::Value::Array(items)) => {
            items.iter().map(Value::from_json).collect()
        }
        Value::String(text) => {
            let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                EtlError::convert(ty, format!("string is not a json array: {e}"))
            })?;
            match parsed {
                serde_json::Value::Array(items) => items.iter().map(Value::from_json).collect(),
                _ => {
                    return Err(EtlError::convert(
                        ty,
                        "string did not contain a json array".to_string(),
                    ))
                }
            }
        }
        other => {
            return Err(EtlError::convert(
                ty,
                format!("expected array value, found {}", other.type_name()),
            ))
        }
    };

    let parsed = items
        .iter()
        .map(|item| parse_value(ty, rank - 1, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(parsed))
}

fn parse_boolean(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Boolean(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Boolean(false)),
            other => Err(EtlError::convert(
                DataType::Boolean,
                format!("unrecognised boolean text '{other}'"),
            )),
        },
        other => match other.as_i128() {
            Some(0) => Ok(Value::Boolean(false)),
            Some(1) => Ok(Value::Boolean(true)),
            Some(n) => Err(EtlError::convert(
                DataType::Boolean,
                format!("integer {n} is not 0 or 1"),
            )),
            None => Err(EtlError::convert(
                DataType::Boolean,
                format!("cannot read boolean from {}", other.type_name()),
            )),
        },
    }
}

fn parse_integer(ty: DataType, value: &Value, min: i128, max: i128) -> Result<Value, EtlError> {
    let n = match value.as_i128() {
        Some(n) => n,
        None => match value {
            Value::String(s) | Value::Decimal { value: s, .. } => {
                let trimmed = s.trim();
                trimmed.parse::<i128>().or_else(|_| {
                    // accept integral floating text such as "42.0"
                    trimmed
                        .parse::<f64>()
                        .map_err(|e| e.to_string())
                        .and_then(|f| {
                            if f.fract() == 0.0 {
                                Ok(f as i128)
                            } else {
                                Err(format!("'{trimmed}' has a fractional part"))
                            }
                        })
                        .map_err(|msg| EtlError::convert(ty, msg))
                })?
            }
            Value::Float32(f) => integral_i128(ty, f64::from(*f))?,
            Value::Float64(f) => integral_i128(ty, *f)?,
            Value::Boolean(b) => i128::from(*b),
            other => {
                return Err(EtlError::convert(
                    ty,
                    format!("cannot read integer from {}", other.type_name()),
                ))
            }
        },
    };

    if n < min || n > max {
        return Err(EtlError::convert(ty, format!("value {n} is out of range")));
    }

    Ok(match ty {
        DataType::Int8 => Value::Int8(n as i8),
        DataType::UInt8 => Value::UInt8(n as u8),
        DataType::Int16 => Value::Int16(n as i16),
        DataType::UInt16 => Value::UInt16(n as u16),
        DataType::Int32 => Value::Int32(n as i32),
        DataType::UInt32 => Value::UInt32(n as u32),
        DataType::Int64 => Value::Int64(n as i64),
        DataType::UInt64 => Value::UInt64(n as u64),
        _ => unreachable!("parse_integer called for non-integer type"),
    })
}

fn integral_i128(ty: DataType, f: f64) -> Result<i128, EtlError> {
    if f.fract() == 0.0 && f.is_finite() {
        Ok(f as i128)
    } else {
        Err(EtlError::convert(
            ty,
            format!("float {f} is not an integral value"),
        ))
    }
}

fn parse_float(value: &Value) -> Result<f64, EtlError> {
    if let Some(n) = value.as_f64() {
        return Ok(n);
    }
    match value {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| EtlError::convert(DataType::Float64, e.to_string())),
        other => Err(EtlError::convert(
            DataType::Float64,
            format!("cannot read float from {}", other.type_name()),
        )),
    }
}

fn parse_decimal(value: &Value) -> Result<Value, EtlError> {
    let text = match value {
        Value::Decimal { value, scale } => {
            return Ok(Value::Decimal {
                value: value.clone(),
                scale: *scale,
            })
        }
        Value::String(s) => s.trim().to_string(),
        Value::Float32(f) => f.to_string(),
        Value::Float64(f) => f.to_string(),
        other => match other.as_i128() {
            Some(n) => n.to_string(),
            None => {
                return Err(EtlError::convert(
                    DataType::Decimal,
                    format!("cannot read decimal from {}", other.type_name()),
                ))
            }
        },
    };

    text.parse::<f64>()
        .map_err(|e| EtlError::convert(DataType::Decimal, format!("'{text}': {e}")))?;
    let scale = text
        .split_once('.')
        .map(|(_, frac)| frac.len() as i32)
        .unwrap_or(0);
    Ok(Value::Decimal { value: text, scale })
}

fn parse_binary(value: &Value) -> Result<Vec<u8>, EtlError> {
    match value {
        Value::Binary(bytes) | Value::Geometry(bytes) => Ok(bytes.clone()),
        Value::String(text) => base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| EtlError::convert(DataType::Binary, format!("invalid base64: {e}"))),
        other => Err(EtlError::convert(
            DataType::Binary,
            format!("cannot read binary from {}", other.type_name()),
        )),
    }
}

fn parse_guid(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Guid(id) => Ok(Value::Guid(*id)),
        Value::String(s) => Uuid::parse_str(s.trim())
            .map(Value::Guid)
            .map_err(|e| EtlError::convert(DataType::Guid, e.to_string())),
        Value::Binary(bytes) => Uuid::from_slice(bytes)
            .map(Value::Guid)
            .map_err(|e| EtlError::convert(DataType::Guid, e.to_string())),
        other => Err(EtlError::convert(
            DataType::Guid,
            format!("cannot read guid from {}", other.type_name()),
        )),
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

fn parse_date(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Date(d) => Ok(Value::Date(*d)),
        Value::DateTime(dt) => Ok(Value::Date(dt.date())),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                return Ok(Value::Date(d));
            }
            for format in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                    return Ok(Value::Date(dt.date()));
                }
            }
            Err(EtlError::convert(
                DataType::Date,
                format!("unrecognised date text '{trimmed}'"),
            ))
        }
        other => Err(EtlError::convert(
            DataType::Date,
            format!("cannot read date from {}", other.type_name()),
        )),
    }
}

fn parse_datetime(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
        Value::Date(d) => Ok(Value::DateTime(
            d.and_hms_opt(0, 0, 0)
                .ok_or_else(|| EtlError::convert(DataType::DateTime, "invalid date"))?,
        )),
        Value::String(s) => {
            let trimmed = s.trim();
            for format in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                    return Ok(Value::DateTime(dt));
                }
            }
            if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                    return Ok(Value::DateTime(dt));
                }
            }
            Err(EtlError::convert(
                DataType::DateTime,
                format!("unrecognised datetime text '{trimmed}'"),
            ))
        }
        other => Err(EtlError::convert(
            DataType::DateTime,
            format!("cannot read datetime from {}", other.type_name()),
        )),
    }
}

fn parse_time(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Time(t) => Ok(Value::Time(*t)),
        Value::DateTime(dt) => Ok(Value::Time(dt.time())),
        Value::String(s) => {
            let trimmed = s.trim();
            NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map(Value::Time)
                .map_err(|e| EtlError::convert(DataType::Time, e.to_string()))
        }
        other => Err(EtlError::convert(
            DataType::Time,
            format!("cannot read time from {}", other.type_name()),
        )),
    }
}

fn parse_json(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Json(v) => Ok(Value::Json(v.clone())),
        Value::Node(v) => Ok(Value::Json(v.clone())),
        Value::String(s) => serde_json::from_str(s)
            .map(Value::Json)
            .map_err(|e| EtlError::convert(DataType::Json, e.to_string())),
        other => Ok(Value::Json(other.to_json())),
    }
}

fn parse_xml(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Xml(s) => Ok(Value::Xml(s.clone())),
        Value::String(s) => Ok(Value::Xml(s.clone())),
        other => Err(EtlError::convert(
            DataType::Xml,
            format!("cannot read xml from {}", other.type_name()),
        )),
    }
}

fn parse_node(value: &Value) -> Result<Value, EtlError> {
    match value {
        Value::Node(v) => Ok(Value::Node(v.clone())),
        Value::Json(v) => Ok(Value::Node(v.clone())),
        Value::String(s) => serde_json::from_str(s)
            .map(Value::Node)
            .map_err(|e| EtlError::convert(DataType::Node, e.to_string())),
        other => Err(EtlError::convert(
            DataType::Node,
            format!("cannot read node from {}", other.type_name()),
        )),
    }
}
