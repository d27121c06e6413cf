//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "JSON codec for every protocol message shape."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
//! Outbound builders produce complete JSON bodies or nothing at all. Inbound
//! decoding checks presence and JSON type of every field it reads; the only
//! tolerant path is the `event` object of a config entry, which degrades the
//! entry to [`EventFlags::UNREGISTERED`] instead of failing the message.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Number, Value as JsonValue};

use crate::errors::{DecodeError, EncodeError};
use crate::types::{
    ConfigEntry, DeviceSummary, EventPolicy, MessageBody, MessageKind, ProtocolMessage,
    SensorDatum, SensorSchema,
};
use crate::value::{EventFlags, TypedValue, ValueType, RAW_VALUE_MAX_LEN};

/// JSON field names used on the wire.
#[allow(missing_docs)]
pub mod fields {
    pub const DEVICE_ID: &str = "id";
    pub const DEVICE_NAME: &str = "name";
    pub const TOKEN: &str = "token";
    pub const ERROR: &str = "error";
    pub const DATA: &str = "data";
    pub const DEVICES: &str = "devices";
    pub const CONFIG: &str = "config";
    pub const SENSOR_ID: &str = "sensorId";
    pub const SENSOR_IDS: &str = "sensorIds";
    pub const VALUE: &str = "value";
    pub const SCHEMA: &str = "schema";
    pub const VALUE_TYPE: &str = "valueType";
    pub const UNIT: &str = "unit";
    pub const TYPE_ID: &str = "typeId";
    pub const SCHEMA_NAME: &str = "name";
    pub const EVENT: &str = "event";
    pub const CHANGE: &str = "change";
    pub const TIME_SEC: &str = "timeSec";
    pub const LOWER_THRESHOLD: &str = "lowerThreshold";
    pub const UPPER_THRESHOLD: &str = "upperThreshold";
}

type JsonObject = Map<String, JsonValue>;

fn non_empty(device_id: &str) -> Result<&str, EncodeError> {
    if device_id.is_empty() {
        return Err(EncodeError::EmptyDeviceId);
    }
    Ok(device_id)
}

/// `{"id": .., "name": ..}`
pub fn encode_register(device_id: &str, name: &str) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    Ok(json!({ "id": id, "name": name }).to_string())
}

/// `{"id": ..}`
pub fn encode_unregister(device_id: &str) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    Ok(json!({ "id": id }).to_string())
}

/// `{"id": .., "token": ..}`
pub fn encode_auth(device_id: &str, token: &str) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    Ok(json!({ "id": id, "token": token }).to_string())
}

/// Empty object sent with a device listing request.
pub fn encode_list_devices() -> String {
    JsonValue::Object(JsonObject::new()).to_string()
}

/// `{"id": .., "sensorIds": [..]}`
pub fn encode_request(device_id: &str, sensor_ids: &[u8]) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    Ok(json!({ "id": id, "sensorIds": sensor_ids }).to_string())
}

/// `{"id": .., "data": [{"sensorId": .., "value": ..}]}`
///
/// `len` bounds the number of raw bytes encoded and is ignored for scalar types.
pub fn encode_data(
    device_id: &str,
    sensor_id: u8,
    value_type: ValueType,
    value: &TypedValue,
    len: usize,
) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    let value = encode_value(value_type, value, len)?;
    Ok(json!({
        "id": id,
        "data": [{ "sensorId": sensor_id, "value": value }],
    })
    .to_string())
}

/// `{"id": .., "config": [{"sensorId": .., "schema": {..}, "event": {..}}]}`
pub fn encode_config(device_id: &str, config: &[ConfigEntry]) -> Result<String, EncodeError> {
    let id = non_empty(device_id)?;
    let entries = config
        .iter()
        .map(config_entry_to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "id": id, "config": entries }).to_string())
}

/// Encode a single value as directed by `value_type`.
pub fn encode_value(
    value_type: ValueType,
    value: &TypedValue,
    len: usize,
) -> Result<JsonValue, EncodeError> {
    let encoded = match (value_type, value) {
        (ValueType::Int, TypedValue::Int(v)) => json!(v),
        (ValueType::Int64, TypedValue::Int64(v)) => json!(v),
        (ValueType::Uint, TypedValue::Uint(v)) => json!(v),
        (ValueType::Uint64, TypedValue::Uint64(v)) => json!(v),
        (ValueType::Float, TypedValue::Float(v)) => {
            if !v.is_finite() {
                return Err(EncodeError::NonFiniteFloat);
            }
            json!(f64::from(*v))
        }
        (ValueType::Bool, TypedValue::Bool(v)) => json!(v),
        (ValueType::Raw, TypedValue::Raw(bytes)) => {
            let end = len.min(bytes.len());
            JsonValue::String(BASE64.encode(&bytes[..end]))
        }
        _ => {
            return Err(EncodeError::UnsupportedValueType {
                value_type,
                variant: value.variant_name(),
            })
        }
    };
    Ok(encoded)
}

fn encode_threshold(value_type: ValueType, value: &TypedValue) -> Result<JsonValue, EncodeError> {
    if value_type == ValueType::Raw {
        return Err(EncodeError::UnsupportedValueType {
            value_type,
            variant: value.variant_name(),
        });
    }
    encode_value(value_type, value, 0)
}

fn config_entry_to_json(entry: &ConfigEntry) -> Result<JsonValue, EncodeError> {
    let schema = &entry.schema;
    let mut object = JsonObject::new();
    object.insert(fields::SENSOR_ID.into(), json!(entry.sensor_id));
    object.insert(
        fields::SCHEMA.into(),
        json!({
            "typeId": schema.type_id,
            "unit": schema.unit,
            "valueType": schema.value_type.code(),
            "name": schema.name,
        }),
    );
    if !entry.event.is_unregistered() {
        object.insert(
            fields::EVENT.into(),
            event_to_json(&entry.event, schema.value_type)?,
        );
    }
    Ok(JsonValue::Object(object))
}

fn event_to_json(event: &EventPolicy, value_type: ValueType) -> Result<JsonValue, EncodeError> {
    let flags = event.flags;
    let mut object = JsonObject::new();
    object.insert(
        fields::CHANGE.into(),
        JsonValue::Bool(flags.contains(EventFlags::CHANGE)),
    );
    if flags.contains(EventFlags::TIME) {
        object.insert(fields::TIME_SEC.into(), json!(event.time_sec));
    }
    let thresholds = [
        (EventFlags::LOWER_THRESHOLD, fields::LOWER_THRESHOLD, &event.lower_threshold),
        (EventFlags::UPPER_THRESHOLD, fields::UPPER_THRESHOLD, &event.upper_threshold),
    ];
    for (flag, field, threshold) in thresholds {
        match (flags.contains(flag), threshold) {
            (true, Some(value)) => {
                object.insert(field.into(), encode_threshold(value_type, value)?);
            }
            (true, None) => return Err(EncodeError::MissingThreshold(field)),
            (false, _) => {}
        }
    }
    Ok(JsonValue::Object(object))
}

/// Decode an inbound body as a message of `kind`.
pub fn decode(kind: MessageKind, body: &str) -> Result<ProtocolMessage, DecodeError> {
    let root = parse_object(body)?;

    let device_id = if kind.carries_device_id() {
        let id = required_str(&root, fields::DEVICE_ID)?;
        if id.is_empty() {
            return Err(DecodeError::MalformedField(fields::DEVICE_ID));
        }
        Some(id.to_owned())
    } else {
        None
    };

    let error = match root.get(fields::ERROR) {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(message)) => Some(message.clone()),
        Some(_) => return Err(DecodeError::MalformedField(fields::ERROR)),
    };

    // Error replies carry no payload to validate.
    if error.is_some() {
        return Ok(ProtocolMessage {
            device_id,
            error,
            body: MessageBody::empty(kind),
        });
    }

    let body = match kind {
        MessageKind::Update => MessageBody::Update(decode_sensor_data(&root)?),
        MessageKind::Request => MessageBody::Request(decode_sensor_ids(&root)?),
        MessageKind::Register => MessageBody::Register {
            token: Some(required_str(&root, fields::TOKEN)?.to_owned()),
        },
        MessageKind::Unregister => MessageBody::Unregister,
        MessageKind::Auth => MessageBody::Auth,
        MessageKind::ConfigUpdate => MessageBody::ConfigUpdate,
        MessageKind::ListDevices => MessageBody::ListDevices(decode_devices(&root)?),
    };

    Ok(ProtocolMessage {
        device_id,
        error,
        body,
    })
}

/// Decode a standalone config array such as the `config` field of a device entry.
pub fn decode_config_list(body: &str) -> Result<Vec<ConfigEntry>, DecodeError> {
    let root: JsonValue =
        serde_json::from_str(body).map_err(|err| DecodeError::InvalidJson(err.to_string()))?;
    match root {
        JsonValue::Array(entries) => decode_config_entries(&entries),
        _ => Err(DecodeError::MalformedField(fields::CONFIG)),
    }
}

/// Decode a value field.
///
/// Without a hint the JSON type selects the variant: boolean, fractional
/// number (float), integer (int, widened to 64 bits when out of `i32` range)
/// or base64 string (raw, truncated to [`RAW_VALUE_MAX_LEN`]). With a hint the
/// JSON value must fit the hinted type.
pub fn decode_value(
    value: &JsonValue,
    hint: Option<ValueType>,
    field: &'static str,
) -> Result<TypedValue, DecodeError> {
    let malformed = || DecodeError::MalformedField(field);
    let Some(value_type) = hint else {
        return match value {
            JsonValue::Bool(b) => Ok(TypedValue::Bool(*b)),
            JsonValue::Number(n) => generic_number(n).ok_or_else(malformed),
            JsonValue::String(s) => decode_raw(s, field),
            _ => Err(malformed()),
        };
    };

    match (value_type, value) {
        (ValueType::Bool, JsonValue::Bool(b)) => Ok(TypedValue::Bool(*b)),
        (ValueType::Raw, JsonValue::String(s)) => decode_raw(s, field),
        (ValueType::Float, JsonValue::Number(n)) => n
            .as_f64()
            .map(|f| TypedValue::Float(f as f32))
            .ok_or_else(malformed),
        (ValueType::Int, JsonValue::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(TypedValue::Int)
            .ok_or_else(malformed),
        (ValueType::Int64, JsonValue::Number(n)) => {
            n.as_i64().map(TypedValue::Int64).ok_or_else(malformed)
        }
        (ValueType::Uint, JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(TypedValue::Uint)
            .ok_or_else(malformed),
        (ValueType::Uint64, JsonValue::Number(n)) => {
            n.as_u64().map(TypedValue::Uint64).ok_or_else(malformed)
        }
        _ => Err(malformed()),
    }
}

fn generic_number(n: &Number) -> Option<TypedValue> {
    if n.is_f64() {
        return n.as_f64().map(|f| TypedValue::Float(f as f32));
    }
    if let Some(v) = n.as_i64() {
        return Some(i32::try_from(v).map_or(TypedValue::Int64(v), TypedValue::Int));
    }
    n.as_u64().map(TypedValue::Uint64)
}

fn decode_raw(encoded: &str, field: &'static str) -> Result<TypedValue, DecodeError> {
    let mut bytes = BASE64
        .decode(encoded)
        .map_err(|_| DecodeError::InvalidBase64(field))?;
    bytes.truncate(RAW_VALUE_MAX_LEN);
    Ok(TypedValue::Raw(bytes))
}

fn parse_object(body: &str) -> Result<JsonObject, DecodeError> {
    match serde_json::from_str(body) {
        Ok(JsonValue::Object(object)) => Ok(object),
        Ok(_) => Err(DecodeError::InvalidJson("root is not an object".to_owned())),
        Err(err) => Err(DecodeError::InvalidJson(err.to_string())),
    }
}

fn required<'a>(object: &'a JsonObject, field: &'static str) -> Result<&'a JsonValue, DecodeError> {
    object.get(field).ok_or(DecodeError::MissingField(field))
}

fn required_str<'a>(object: &'a JsonObject, field: &'static str) -> Result<&'a str, DecodeError> {
    required(object, field)?
        .as_str()
        .ok_or(DecodeError::MalformedField(field))
}

fn required_array<'a>(
    object: &'a JsonObject,
    field: &'static str,
) -> Result<&'a Vec<JsonValue>, DecodeError> {
    required(object, field)?
        .as_array()
        .ok_or(DecodeError::MalformedField(field))
}

fn required_object<'a>(
    object: &'a JsonObject,
    field: &'static str,
) -> Result<&'a JsonObject, DecodeError> {
    required(object, field)?
        .as_object()
        .ok_or(DecodeError::MalformedField(field))
}

fn as_integer<T: TryFrom<u64>>(value: &JsonValue, field: &'static str) -> Result<T, DecodeError> {
    value
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or(DecodeError::MalformedField(field))
}

fn required_integer<T: TryFrom<u64>>(
    object: &JsonObject,
    field: &'static str,
) -> Result<T, DecodeError> {
    as_integer(required(object, field)?, field)
}

fn item_object<'a>(item: &'a JsonValue, field: &'static str) -> Result<&'a JsonObject, DecodeError> {
    item.as_object().ok_or(DecodeError::MalformedField(field))
}

fn decode_sensor_data(root: &JsonObject) -> Result<Vec<SensorDatum>, DecodeError> {
    required_array(root, fields::DATA)?
        .iter()
        .map(|item| -> Result<SensorDatum, DecodeError> {
            let item = item_object(item, fields::DATA)?;
            let sensor_id = required_integer(item, fields::SENSOR_ID)?;
            let value = decode_value(required(item, fields::VALUE)?, None, fields::VALUE)?;
            Ok(SensorDatum { sensor_id, value })
        })
        .collect()
}

fn decode_sensor_ids(root: &JsonObject) -> Result<Vec<u8>, DecodeError> {
    required_array(root, fields::SENSOR_IDS)?
        .iter()
        .map(|item| as_integer(item, fields::SENSOR_IDS))
        .collect()
}

/// Entries that fail to decode are skipped; the rest keep their order.
fn decode_devices(root: &JsonObject) -> Result<Vec<DeviceSummary>, DecodeError> {
    let devices = required_array(root, fields::DEVICES)?
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match decode_device(item) {
            Ok(device) => Some(device),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping malformed device entry");
                None
            }
        })
        .collect();
    Ok(devices)
}

fn decode_device(item: &JsonValue) -> Result<DeviceSummary, DecodeError> {
    let item = item_object(item, fields::DEVICES)?;
    let id = required_str(item, fields::DEVICE_ID)?.to_owned();
    let config = decode_config_entries(required_array(item, fields::CONFIG)?)?;
    let name = required_str(item, fields::DEVICE_NAME)?.to_owned();
    Ok(DeviceSummary { id, name, config })
}

fn decode_config_entries(entries: &[JsonValue]) -> Result<Vec<ConfigEntry>, DecodeError> {
    entries
        .iter()
        .map(|item| -> Result<ConfigEntry, DecodeError> {
            let item = item_object(item, fields::CONFIG)?;
            let sensor_id = required_integer(item, fields::SENSOR_ID)?;
            let schema = decode_schema(required_object(item, fields::SCHEMA)?)?;
            let event = decode_event(item, schema.value_type).unwrap_or_else(|| {
                tracing::debug!(sensor_id, "event policy missing or malformed; sensor unregistered");
                EventPolicy::unregistered()
            });
            Ok(ConfigEntry {
                sensor_id,
                schema,
                event,
            })
        })
        .collect()
}

fn decode_schema(schema: &JsonObject) -> Result<SensorSchema, DecodeError> {
    let code: u8 = required_integer(schema, fields::VALUE_TYPE)?;
    let value_type =
        ValueType::try_from(code).map_err(|_| DecodeError::MalformedField(fields::VALUE_TYPE))?;
    Ok(SensorSchema {
        value_type,
        unit: required_integer(schema, fields::UNIT)?,
        type_id: required_integer(schema, fields::TYPE_ID)?,
        name: required_str(schema, fields::SCHEMA_NAME)?.to_owned(),
    })
}

/// `None` when the event object is absent or any field in it is malformed.
fn decode_event(entry: &JsonObject, value_type: ValueType) -> Option<EventPolicy> {
    let event = entry.get(fields::EVENT)?.as_object()?;
    let mut policy = EventPolicy::default();

    if event.get(fields::CHANGE)?.as_bool()? {
        policy.flags |= EventFlags::CHANGE;
    }

    if let Some(time_sec) = event.get(fields::TIME_SEC) {
        policy.time_sec = as_integer(time_sec, fields::TIME_SEC).ok()?;
        policy.flags |= EventFlags::TIME;
    }

    if let Some(lower) = event.get(fields::LOWER_THRESHOLD) {
        policy.lower_threshold =
            Some(decode_value(lower, Some(value_type), fields::LOWER_THRESHOLD).ok()?);
        policy.flags |= EventFlags::LOWER_THRESHOLD;
    }

    if let Some(upper) = event.get(fields::UPPER_THRESHOLD) {
        policy.upper_threshold =
            Some(decode_value(upper, Some(value_type), fields::UPPER_THRESHOLD).ok()?);
        policy.flags |= EventFlags::UPPER_THRESHOLD;
    }

    Some(policy)
}
