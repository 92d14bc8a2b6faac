//! Per-backend capability vector.

use serde::{Deserialize, Serialize};

/// One storable-representation capability a backend may or may not have.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityFlag {
    Binary,
    Boolean,
    Json,
    Xml,
    Guid,
    Arrays,
    Unsigned,
    SignedByte,
    Byte,
    TimeOfDay,
    Transactions,
}

/// What a connection can store natively. Consulted by the conversion layer
/// to pick downgrade representations on write and restore them on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub supports_binary: bool,
    pub supports_boolean: bool,
    pub supports_json: bool,
    pub supports_xml: bool,
    pub supports_guid: bool,
    pub supports_arrays: bool,
    pub supports_unsigned: bool,
    pub supports_signed_byte: bool,
    pub supports_byte: bool,
    pub supports_time: bool,
    pub supports_transactions: bool,
    /// Latest calendar year the backend can store; dates beyond it are
    /// clamped by the bounds functions.
    pub max_date_year: Option<i32>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

impl Capabilities {
    /// A backend with native support for every canonical representation.
    pub fn full() -> Self {
        Self {
            supports_binary: true,
            supports_boolean: true,
            supports_json: true,
            supports_xml: true,
            supports_guid: true,
            supports_arrays: true,
            supports_unsigned: true,
            supports_signed_byte: true,
            supports_byte: true,
            supports_time: true,
            supports_transactions: true,
            max_date_year: None,
        }
    }

    /// A lowest-common-denominator backend: strings, signed integers and
    /// floats only, four-digit years. The worst case every conversion rule
    /// must survive.
    pub fn minimal() -> Self {
        Self {
            supports_binary: false,
            supports_boolean: false,
            supports_json: false,
            supports_xml: false,
            supports_guid: false,
            supports_arrays: false,
            supports_unsigned: false,
            supports_signed_byte: false,
            supports_byte: false,
            supports_time: false,
            supports_transactions: false,
            max_date_year: Some(9999),
        }
    }

    pub fn supports(&self, flag: CapabilityFlag) -> bool {
        match flag {
            CapabilityFlag::Binary => self.supports_binary,
            CapabilityFlag::Boolean => self.supports_boolean,
            CapabilityFlag::Json => self.supports_json,
            CapabilityFlag::Xml => self.supports_xml,
            CapabilityFlag::Guid => self.supports_guid,
            CapabilityFlag::Arrays => self.supports_arrays,
            CapabilityFlag::Unsigned => self.supports_unsigned,
            CapabilityFlag::SignedByte => self.supports_signed_byte,
            CapabilityFlag::Byte => self.supports_byte,
            CapabilityFlag::TimeOfDay => self.supports_time,
            CapabilityFlag::Transactions => self.supports_transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_supports_everything() {
        let caps = Capabilities::full();
        for flag in [
            CapabilityFlag::Binary,
            CapabilityFlag::Boolean,
            CapabilityFlag::Json,
            CapabilityFlag::Arrays,
            CapabilityFlag::Transactions,
        ] {
            assert!(caps.supports(flag));
        }
    }

    #[test]
    fn test_minimal_supports_nothing_extra() {
        let caps = Capabilities::minimal();
        assert!(!caps.supports(CapabilityFlag::Boolean));
        assert!(!caps.supports(CapabilityFlag::Arrays));
        assert_eq!(caps.max_date_year, Some(9999));
    }

    #[test]
    fn test_serde_defaults_to_full() {
        let caps: Capabilities = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(caps, Capabilities::full());
    }

    #[test]
    fn test_serde_partial_override() {
        let caps: Capabilities =
            serde_json::from_str(r#"{"supports_boolean": false}"#).expect("deserialize");
        assert!(!caps.supports_boolean);
        assert!(caps.supports_binary);
    }
}
