//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Typed sensor values and event notification flags."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use serde::Serialize;

/// Upper bound on raw sensor payloads; longer payloads are truncated on decode.
pub const RAW_VALUE_MAX_LEN: usize = 16;

/// Value type tag carried in sensor schemas and supplied with outbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed 32-bit integer.
    Int,
    /// 32-bit float, transmitted as a JSON double.
    Float,
    /// Boolean.
    Bool,
    /// Raw bytes, transmitted as base64.
    Raw,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 32-bit integer.
    Uint,
    /// Unsigned 64-bit integer.
    Uint64,
}

impl ValueType {
    /// Wire code used in the `valueType` schema field.
    pub const fn code(self) -> u8 {
        match self {
            ValueType::Int => 1,
            ValueType::Float => 2,
            ValueType::Bool => 3,
            ValueType::Raw => 4,
            ValueType::Int64 => 5,
            ValueType::Uint => 6,
            ValueType::Uint64 => 7,
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value_type: ValueType) -> Self {
        value_type.code()
    }
}

impl TryFrom<u8> for ValueType {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ValueType::Int),
            2 => Ok(ValueType::Float),
            3 => Ok(ValueType::Bool),
            4 => Ok(ValueType::Raw),
            5 => Ok(ValueType::Int64),
            6 => Ok(ValueType::Uint),
            7 => Ok(ValueType::Uint64),
            other => Err(other),
        }
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "bool" => Ok(ValueType::Bool),
            "raw" => Ok(ValueType::Raw),
            "int64" => Ok(ValueType::Int64),
            "uint" => Ok(ValueType::Uint),
            "uint64" => Ok(ValueType::Uint64),
            other => Err(format!("unknown value type: {}", other)),
        }
    }
}

/// A sensor reading or threshold. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 32-bit integer.
    Uint(u32),
    /// Unsigned 64-bit integer.
    Uint64(u64),
    /// Float from a 32-bit source.
    Float(f32),
    /// Boolean.
    Bool(bool),
    /// Raw bytes, at most [`RAW_VALUE_MAX_LEN`] after decoding.
    Raw(Vec<u8>),
}

impl TypedValue {
    /// Tag matching the active variant.
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Int(_) => ValueType::Int,
            TypedValue::Int64(_) => ValueType::Int64,
            TypedValue::Uint(_) => ValueType::Uint,
            TypedValue::Uint64(_) => ValueType::Uint64,
            TypedValue::Float(_) => ValueType::Float,
            TypedValue::Bool(_) => ValueType::Bool,
            TypedValue::Raw(_) => ValueType::Raw,
        }
    }

    /// Variant name used in error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            TypedValue::Int(_) => "int",
            TypedValue::Int64(_) => "int64",
            TypedValue::Uint(_) => "uint",
            TypedValue::Uint64(_) => "uint64",
            TypedValue::Float(_) => "float",
            TypedValue::Bool(_) => "bool",
            TypedValue::Raw(_) => "raw",
        }
    }

    /// Parse a textual value according to `value_type`. Raw values are read as hex.
    pub fn parse_as(value_type: ValueType, input: &str) -> Result<Self, String> {
        let input = input.trim();
        let parsed = match value_type {
            ValueType::Int => input.parse().map(TypedValue::Int).map_err(|e| e.to_string()),
            ValueType::Int64 => input.parse().map(TypedValue::Int64).map_err(|e| e.to_string()),
            ValueType::Uint => input.parse().map(TypedValue::Uint).map_err(|e| e.to_string()),
            ValueType::Uint64 => input
                .parse()
                .map(TypedValue::Uint64)
                .map_err(|e| e.to_string()),
            ValueType::Float => input.parse().map(TypedValue::Float).map_err(|e| e.to_string()),
            ValueType::Bool => input.parse().map(TypedValue::Bool).map_err(|e| e.to_string()),
            ValueType::Raw => hex::decode(input)
                .map(TypedValue::Raw)
                .map_err(|e| e.to_string()),
        };
        parsed.map_err(|err| format!("invalid {:?} value `{}`: {}", value_type, input, err))
    }
}

bitflags::bitflags! {
    /// Event notification policy of a configured sensor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u8 {
        /// Notify periodically every `timeSec` seconds.
        const TIME = 0x01;
        /// Notify when the value drops below the lower threshold.
        const LOWER_THRESHOLD = 0x02;
        /// Notify when the value rises above the upper threshold.
        const UPPER_THRESHOLD = 0x04;
        /// Notify on every change.
        const CHANGE = 0x08;
        /// The event policy could not be read; thresholds must be ignored and
        /// the sensor treated as not actively monitored.
        const UNREGISTERED = 0x10;
    }
}

impl Serialize for EventFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_codes_roundtrip() {
        for code in 1..=7u8 {
            let value_type = ValueType::try_from(code).expect("known code");
            assert_eq!(u8::from(value_type), code);
        }
        assert_eq!(ValueType::try_from(0), Err(0));
        assert_eq!(ValueType::try_from(8), Err(8));
    }

    #[test]
    fn typed_value_reports_its_tag() {
        assert_eq!(TypedValue::Bool(true).value_type(), ValueType::Bool);
        assert_eq!(TypedValue::Raw(vec![1]).value_type(), ValueType::Raw);
        assert_eq!(TypedValue::Uint64(9).value_type(), ValueType::Uint64);
    }

    #[test]
    fn parse_as_reads_text_per_type() {
        assert_eq!(
            TypedValue::parse_as(ValueType::Int, "-12"),
            Ok(TypedValue::Int(-12))
        );
        assert_eq!(
            TypedValue::parse_as(ValueType::Raw, "0aff"),
            Ok(TypedValue::Raw(vec![0x0a, 0xff]))
        );
        assert!(TypedValue::parse_as(ValueType::Uint, "-1").is_err());
        assert!(TypedValue::parse_as(ValueType::Raw, "abc").is_err());
    }

    #[test]
    fn raw_text_is_hex_in_either_case() {
        assert_eq!(
            TypedValue::parse_as(ValueType::Raw, " DEADbeef "),
            Ok(TypedValue::Raw(vec![0xde, 0xad, 0xbe, 0xef]))
        );
        assert_eq!(
            TypedValue::parse_as(ValueType::Raw, ""),
            Ok(TypedValue::Raw(Vec::new()))
        );
        assert!(TypedValue::parse_as(ValueType::Raw, "zz").is_err());
        assert!(TypedValue::parse_as(ValueType::Raw, "é1").is_err());
    }

    #[test]
    fn default_flags_are_empty() {
        let flags = EventFlags::default();
        assert!(flags.is_empty());
        assert_eq!((EventFlags::CHANGE | EventFlags::TIME).bits(), 0x09);
    }
}
