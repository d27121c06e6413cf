//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Protocol message kinds and payload shapes."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use serde::Serialize;

use crate::value::{EventFlags, TypedValue, ValueType};

/// Kinds of inbound protocol messages, each bound to one routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Cloud pushes new sensor values to the device.
    Update,
    /// Cloud requests current sensor values.
    Request,
    /// Reply to a registration.
    Register,
    /// Reply to an unregistration.
    Unregister,
    /// Reply to an authentication request.
    Auth,
    /// Reply to a configuration update.
    ConfigUpdate,
    /// Reply to a device listing.
    ListDevices,
}

impl MessageKind {
    /// Number of kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in binding order.
    pub const ALL: [MessageKind; MessageKind::COUNT] = [
        MessageKind::Update,
        MessageKind::Request,
        MessageKind::Register,
        MessageKind::Unregister,
        MessageKind::Auth,
        MessageKind::ConfigUpdate,
        MessageKind::ListDevices,
    ];

    /// Stable index into [`MessageKind::ALL`].
    pub const fn index(self) -> usize {
        match self {
            MessageKind::Update => 0,
            MessageKind::Request => 1,
            MessageKind::Register => 2,
            MessageKind::Unregister => 3,
            MessageKind::Auth => 4,
            MessageKind::ConfigUpdate => 5,
            MessageKind::ListDevices => 6,
        }
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Update => "update",
            MessageKind::Request => "request",
            MessageKind::Register => "register",
            MessageKind::Unregister => "unregister",
            MessageKind::Auth => "auth",
            MessageKind::ConfigUpdate => "config_update",
            MessageKind::ListDevices => "list_devices",
        }
    }

    /// Whether decoded messages of this kind carry a device identifier.
    pub fn carries_device_id(&self) -> bool {
        !matches!(self, MessageKind::ListDevices)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sensor value pushed by the cloud.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDatum {
    /// Sensor identifier within the device.
    pub sensor_id: u8,
    /// Decoded value.
    pub value: TypedValue,
}

/// Static description of a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorSchema {
    /// Value type produced by the sensor.
    pub value_type: ValueType,
    /// Unit code.
    pub unit: u8,
    /// Sensor type identifier.
    pub type_id: u16,
    /// Human readable name.
    pub name: String,
}

/// When the device should report a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct EventPolicy {
    /// Active notification triggers.
    pub flags: EventFlags,
    /// Reporting interval, meaningful when [`EventFlags::TIME`] is set.
    pub time_sec: u32,
    /// Lower threshold, present when [`EventFlags::LOWER_THRESHOLD`] is set.
    pub lower_threshold: Option<TypedValue>,
    /// Upper threshold, present when [`EventFlags::UPPER_THRESHOLD`] is set.
    pub upper_threshold: Option<TypedValue>,
}

impl EventPolicy {
    /// Policy assigned when the `event` object is absent or malformed.
    pub fn unregistered() -> Self {
        Self {
            flags: EventFlags::UNREGISTERED,
            ..Self::default()
        }
    }

    /// True when the sensor must not be actively monitored.
    pub fn is_unregistered(&self) -> bool {
        self.flags.contains(EventFlags::UNREGISTERED)
    }
}

/// Configuration of one sensor: schema plus event policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEntry {
    /// Sensor identifier within the device.
    pub sensor_id: u8,
    /// Sensor schema.
    pub schema: SensorSchema,
    /// Event notification policy.
    pub event: EventPolicy,
}

/// A registered device as reported by a list reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    /// Device identifier; unique per device.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sensor configuration, possibly empty.
    pub config: Vec<ConfigEntry>,
}

/// Kind-specific payload of a decoded message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MessageBody {
    /// Sensor values, in wire order.
    Update(Vec<SensorDatum>),
    /// Requested sensor identifiers, in wire order.
    Request(Vec<u8>),
    /// Registration reply. `token` is `None` only on error replies.
    Register {
        /// Credential issued to the device.
        token: Option<String>,
    },
    /// Unregistration reply.
    Unregister,
    /// Authentication reply.
    Auth,
    /// Configuration update reply.
    ConfigUpdate,
    /// Device listing, in wire order.
    ListDevices(Vec<DeviceSummary>),
}

impl MessageBody {
    /// Body of an error reply: the payload shape of `kind` with nothing in it.
    pub fn empty(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Update => MessageBody::Update(Vec::new()),
            MessageKind::Request => MessageBody::Request(Vec::new()),
            MessageKind::Register => MessageBody::Register { token: None },
            MessageKind::Unregister => MessageBody::Unregister,
            MessageKind::Auth => MessageBody::Auth,
            MessageKind::ConfigUpdate => MessageBody::ConfigUpdate,
            MessageKind::ListDevices => MessageBody::ListDevices(Vec::new()),
        }
    }

    /// Kind this body belongs to.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Update(_) => MessageKind::Update,
            MessageBody::Request(_) => MessageKind::Request,
            MessageBody::Register { .. } => MessageKind::Register,
            MessageBody::Unregister => MessageKind::Unregister,
            MessageBody::Auth => MessageKind::Auth,
            MessageBody::ConfigUpdate => MessageKind::ConfigUpdate,
            MessageBody::ListDevices(_) => MessageKind::ListDevices,
        }
    }
}

/// A decoded inbound message, handed to exactly one handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolMessage {
    /// Device identifier; `None` only for device listings.
    pub device_id: Option<String>,
    /// Error reported by the cloud. An explicit JSON `null` decodes to `None`.
    pub error: Option<String>,
    /// Kind-specific payload.
    pub body: MessageBody,
}

impl ProtocolMessage {
    /// Kind of the message.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// True when the cloud reported an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
