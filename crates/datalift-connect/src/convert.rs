//! Capability-driven write/read conversion.
//!
//! Downgrade rules are a table keyed by (canonical type, missing
//! capability) rather than a chain of conditionals, so the rule set stays
//! exhaustively testable. The round-trip law: for a fixed capability
//! vector, `convert_for_read(convert_for_write(x)) == x` under canonical
//! equality for every representable `x`.

use base64::Engine;
use datalift_types::{parse_value, Column, DataType, EtlError, Value};

use crate::capabilities::{Capabilities, CapabilityFlag};

/// Scalar downgrade rules: when the capability is absent, the canonical
/// type is stored as the fallback type.
const WRITE_FALLBACKS: &[(DataType, CapabilityFlag, DataType)] = &[
    (DataType::Binary, CapabilityFlag::Binary, DataType::String),
    (DataType::Boolean, CapabilityFlag::Boolean, DataType::Int32),
    (DataType::Json, CapabilityFlag::Json, DataType::String),
    (DataType::Xml, CapabilityFlag::Xml, DataType::String),
    (DataType::Guid, CapabilityFlag::Guid, DataType::String),
    (DataType::UInt16, CapabilityFlag::Unsigned, DataType::Int32),
    (DataType::UInt32, CapabilityFlag::Unsigned, DataType::Int64),
    (DataType::UInt64, CapabilityFlag::Unsigned, DataType::Int64),
    (DataType::Int8, CapabilityFlag::SignedByte, DataType::Int16),
    (DataType::UInt8, CapabilityFlag::Byte, DataType::Int16),
    (DataType::Time, CapabilityFlag::TimeOfDay, DataType::String),
];

/// The type actually sent to a backend for a column of `ty` at `rank`.
///
/// A rank above zero with no array support always takes the array
/// downgrade path, regardless of the scalar rule for `ty`.
pub fn write_type_for(caps: &Capabilities, ty: DataType, rank: u8) -> DataType {
    if rank > 0 && !caps.supports_arrays {
        return if caps.supports_json {
            DataType::Json
        } else {
            DataType::String
        };
    }

    match ty {
        // geometry and node pick the richest representation available
        DataType::Geometry if caps.supports_binary => DataType::Binary,
        DataType::Geometry => DataType::String,
        DataType::Node if caps.supports_json => DataType::Json,
        DataType::Node => DataType::String,
        _ => WRITE_FALLBACKS
            .iter()
            .find(|(rule_ty, flag, _)| *rule_ty == ty && !caps.supports(*flag))
            .map(|(_, _, fallback)| *fallback)
            .unwrap_or(ty),
    }
}

/// Convert a value to a representation the backend can store.
///
/// Pure: the same inputs always produce the same `(effective type,
/// effective value)` pair. A null into a non-nullable column is a contract
/// violation; a validation layer in front of the writer is the place to
/// catch it recoverably.
pub fn convert_for_write(
    caps: &Capabilities,
    name: &str,
    ty: DataType,
    rank: u8,
    allow_null: bool,
    value: &Value,
) -> Result<(DataType, Value), EtlError> {
    if value.is_null() {
        let effective = write_type_for(caps, ty, rank);
        if allow_null {
            return Ok((effective, Value::Null));
        }
        return Err(EtlError::contract(format!(
            "column {name} does not allow nulls and no value was supplied"
        )));
    }

    if rank > 0 && !caps.supports_arrays {
        let canonical = parse_value(ty, rank, value)?;
        let json = canonical.to_json();
        return if caps.supports_json {
            Ok((DataType::Json, Value::Json(json)))
        } else {
            Ok((DataType::String, Value::String(json.to_string())))
        };
    }

    match ty {
        DataType::Geometry if rank == 0 => {
            let Value::Geometry(bytes) = parse_value(ty, rank, value)? else {
                unreachable!("geometry parse yields geometry");
            };
            if caps.supports_binary {
                Ok((DataType::Binary, Value::Binary(bytes)))
            } else {
                Ok((
                    DataType::String,
                    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
                ))
            }
        }
        DataType::Node if rank == 0 => {
            let Value::Node(json) = parse_value(ty, rank, value)? else {
                unreachable!("node parse yields node");
            };
            if caps.supports_json {
                Ok((DataType::Json, Value::Json(json)))
            } else {
                Ok((DataType::String, Value::String(json.to_string())))
            }
        }
        _ => {
            let effective = write_type_for(caps, ty, rank);
            if effective == ty {
                // native support: normalize to the canonical shape only
                return Ok((ty, parse_value(ty, rank, value)?));
            }
            let canonical = parse_value(ty, rank, value)?;
            let downgraded = match (ty, effective) {
                (DataType::Boolean, DataType::Int32) if rank == 0 => {
                    let Value::Boolean(b) = canonical else {
                        unreachable!("boolean parse yields boolean");
                    };
                    Value::Int32(i32::from(b))
                }
                _ => parse_value(effective, rank, &canonical)?,
            };
            Ok((effective, downgraded))
        }
    }
}

/// Restore a stored value to its canonical form after a read.
///
/// When the capability vector indicates the value was stored in a
/// downgraded representation (string-encoded array, 0/1 boolean, textual
/// guid, …) it is re-parsed into the canonical type. Natively stored
/// scalars already in canonical shape pass through untouched.
pub fn convert_for_read(
    caps: &Capabilities,
    column: &Column,
    raw: &Value,
) -> Result<Value, EtlError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let stored_natively =
        write_type_for(caps, column.data_type, column.rank) == column.data_type;
    if stored_natively && column.rank == 0 && raw.data_type() == Some(column.data_type) {
        return Ok(raw.clone());
    }
    parse_value(column.data_type, column.rank, raw)
}
