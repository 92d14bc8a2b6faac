//! Per-backend safe bounds for ordered canonical types.
//!
//! Used by range and incremental-load logic to pick sentinel values a
//! backend is guaranteed to store faithfully. Backends that cannot store
//! the full chrono range declare a `max_date_year` and get clamped dates.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use datalift_types::{DataType, EtlError, Value};

use crate::capabilities::Capabilities;

// widest exact decimal the engine guarantees across backends (96-bit
// mantissa, the narrowest native decimal among supported targets)
const DECIMAL_MAX: &str = "79228162514264337593543950335";
const DECIMAL_MIN: &str = "-79228162514264337593543950335";

/// Largest representable value of an ordered canonical type.
pub fn data_type_max_value(ty: DataType) -> Result<Value, EtlError> {
    let value = match ty {
        DataType::Boolean => Value::Boolean(true),
        DataType::Int8 => Value::Int8(i8::MAX),
        DataType::UInt8 => Value::UInt8(u8::MAX),
        DataType::Int16 => Value::Int16(i16::MAX),
        DataType::UInt16 => Value::UInt16(u16::MAX),
        DataType::Int32 => Value::Int32(i32::MAX),
        DataType::UInt32 => Value::UInt32(u32::MAX),
        DataType::Int64 => Value::Int64(i64::MAX),
        DataType::UInt64 => Value::UInt64(u64::MAX),
        DataType::Float32 => Value::Float32(f32::MAX),
        DataType::Float64 => Value::Float64(f64::MAX),
        DataType::Decimal => Value::Decimal {
            value: DECIMAL_MAX.to_string(),
            scale: 0,
        },
        DataType::Date => Value::Date(NaiveDate::MAX),
        DataType::DateTime => Value::DateTime(NaiveDateTime::MAX),
        DataType::Time => Value::Time(
            NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
                .ok_or_else(|| EtlError::convert(DataType::Time, "invalid time bound"))?,
        ),
        other => {
            return Err(EtlError::convert(
                other,
                "type has no ordered bounds".to_string(),
            ))
        }
    };
    Ok(value)
}

/// Smallest representable value of an ordered canonical type.
pub fn data_type_min_value(ty: DataType) -> Result<Value, EtlError> {
    let value = match ty {
        DataType::Boolean => Value::Boolean(false),
        DataType::Int8 => Value::Int8(i8::MIN),
        DataType::UInt8 => Value::UInt8(u8::MIN),
        DataType::Int16 => Value::Int16(i16::MIN),
        DataType::UInt16 => Value::UInt16(u16::MIN),
        DataType::Int32 => Value::Int32(i32::MIN),
        DataType::UInt32 => Value::UInt32(u32::MIN),
        DataType::Int64 => Value::Int64(i64::MIN),
        DataType::UInt64 => Value::UInt64(u64::MIN),
        DataType::Float32 => Value::Float32(f32::MIN),
        DataType::Float64 => Value::Float64(f64::MIN),
        DataType::Decimal => Value::Decimal {
            value: DECIMAL_MIN.to_string(),
            scale: 0,
        },
        DataType::Date => Value::Date(NaiveDate::MIN),
        DataType::DateTime => Value::DateTime(NaiveDateTime::MIN),
        DataType::Time => Value::Time(
            NaiveTime::from_hms_opt(0, 0, 0)
                .ok_or_else(|| EtlError::convert(DataType::Time, "invalid time bound"))?,
        ),
        other => {
            return Err(EtlError::convert(
                other,
                "type has no ordered bounds".to_string(),
            ))
        }
    };
    Ok(value)
}

/// Largest value this connection can store for `ty`, clamped to the
/// backend's declared date range.
pub fn connection_max_value(caps: &Capabilities, ty: DataType) -> Result<Value, EtlError> {
    let unclamped = data_type_max_value(ty)?;
    let Some(max_year) = caps.max_date_year else {
        return Ok(unclamped);
    };
    let clamped = match unclamped {
        Value::Date(_) => Value::Date(
            NaiveDate::from_ymd_opt(max_year, 12, 31)
                .ok_or_else(|| EtlError::convert(DataType::Date, "invalid clamp year"))?,
        ),
        Value::DateTime(_) => Value::DateTime(
            NaiveDate::from_ymd_opt(max_year, 12, 31)
                .and_then(|d| d.and_hms_opt(23, 59, 59))
                .ok_or_else(|| EtlError::convert(DataType::DateTime, "invalid clamp year"))?,
        ),
        other => other,
    };
    Ok(clamped)
}

/// Smallest value this connection can store for `ty`. Backends with a
/// clamped date range start at year 1.
pub fn connection_min_value(caps: &Capabilities, ty: DataType) -> Result<Value, EtlError> {
    let unclamped = data_type_min_value(ty)?;
    if caps.max_date_year.is_none() {
        return Ok(unclamped);
    }
    let clamped = match unclamped {
        Value::Date(_) => Value::Date(
            NaiveDate::from_ymd_opt(1, 1, 1)
                .ok_or_else(|| EtlError::convert(DataType::Date, "invalid clamp year"))?,
        ),
        Value::DateTime(_) => Value::DateTime(
            NaiveDate::from_ymd_opt(1, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| EtlError::convert(DataType::DateTime, "invalid clamp year"))?,
        ),
        other => other,
    };
    Ok(clamped)
}
