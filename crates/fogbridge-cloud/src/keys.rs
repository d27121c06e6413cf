//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Binding-key derivation and transport addressing constants."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use crate::errors::SubscriptionError;
use crate::types::MessageKind;

/// Direct exchange carrying device commands and their replies.
pub const EXCHANGE_DEVICE: &str = "device";
/// Fanout exchange carrying published sensor data.
pub const EXCHANGE_DATA_SENT: &str = "data.sent";

/// Prefix of the per-device consumer queue.
pub const QUEUE_PREFIX: &str = "thingd-fogOut";

/// Header carrying the user token on every outbound message.
pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Correlation identifier attached to request/reply messages.
pub const DEFAULT_CORRELATION_ID: &str = "default-corrId";
/// Expiration applied to every outbound message.
pub const MESSAGE_EXPIRATION_MS: u64 = 2000;

/// Routing keys of outbound commands.
pub mod commands {
    /// Register a device.
    pub const REGISTER: &str = "device.register";
    /// Unregister a device.
    pub const UNREGISTER: &str = "device.unregister";
    /// Authenticate a device.
    pub const AUTH: &str = "device.auth";
    /// Send a device configuration.
    pub const SCHEMA_SENT: &str = "device.schema.sent";
    /// List registered devices.
    pub const LIST: &str = "device.list";
}

const DEVICE_PREFIX: &str = "device";
const DATA_UPDATE_POSTFIX: &str = "data.update";
const DATA_REQUEST_POSTFIX: &str = "data.request";
const REGISTERED: &str = "device.registered";
const UNREGISTERED: &str = "device.unregistered";
const SCHEMA_UPDATED: &str = "device.schema.updated";
const AUTH_REPLY_PREFIX: &str = "thingd-auth-reply";
const LIST_REPLY_PREFIX: &str = "thingd-list-reply";

/// Binding key on which messages of `kind` arrive for `device_id`.
pub fn binding_key(kind: MessageKind, device_id: &str) -> Result<String, SubscriptionError> {
    if device_id.is_empty() {
        return Err(SubscriptionError::EmptyDeviceId);
    }
    let key = match kind {
        MessageKind::Update => format!("{DEVICE_PREFIX}.{device_id}.{DATA_UPDATE_POSTFIX}"),
        MessageKind::Request => format!("{DEVICE_PREFIX}.{device_id}.{DATA_REQUEST_POSTFIX}"),
        MessageKind::Register => REGISTERED.to_owned(),
        MessageKind::Unregister => UNREGISTERED.to_owned(),
        MessageKind::Auth => format!("{AUTH_REPLY_PREFIX}-{device_id}"),
        MessageKind::ConfigUpdate => SCHEMA_UPDATED.to_owned(),
        MessageKind::ListDevices => format!("{LIST_REPLY_PREFIX}-{device_id}"),
    };
    Ok(key)
}

/// Name of the consumer queue declared for `device_id`.
pub fn queue_name(device_id: &str) -> String {
    format!("{QUEUE_PREFIX}-{device_id}")
}

/// Complete, immutable binding-key set for one device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingKeys {
    device_id: String,
    keys: [String; MessageKind::COUNT],
}

impl BindingKeys {
    /// Build every key for `device_id`, or none at all.
    pub fn build(device_id: &str) -> Result<Self, SubscriptionError> {
        if device_id.is_empty() {
            return Err(SubscriptionError::EmptyDeviceId);
        }
        let mut keys: [String; MessageKind::COUNT] = Default::default();
        for kind in MessageKind::ALL {
            keys[kind.index()] = binding_key(kind, device_id)?;
        }
        Ok(Self {
            device_id: device_id.to_owned(),
            keys,
        })
    }

    /// Identifier the set was built for.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Binding key of `kind`.
    pub fn get(&self, kind: MessageKind) -> &str {
        &self.keys[kind.index()]
    }

    /// Exact-match lookup of a routing key.
    pub fn resolve(&self, routing_key: &str) -> Option<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| self.keys[kind.index()] == routing_key)
    }

    /// Iterate `(kind, key)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (MessageKind, &str)> + '_ {
        MessageKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.get(kind)))
    }

    /// Consumer queue name for this device.
    pub fn queue_name(&self) -> String {
        queue_name(&self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_keys_embed_device_id() {
        assert_eq!(
            binding_key(MessageKind::Update, "dev1").unwrap(),
            "device.dev1.data.update"
        );
        assert_eq!(
            binding_key(MessageKind::Request, "dev1").unwrap(),
            "device.dev1.data.request"
        );
        assert_eq!(
            binding_key(MessageKind::Auth, "dev1").unwrap(),
            "thingd-auth-reply-dev1"
        );
        assert_eq!(
            binding_key(MessageKind::ListDevices, "dev1").unwrap(),
            "thingd-list-reply-dev1"
        );
    }

    #[test]
    fn fixed_keys_ignore_device_id() {
        for kind in [
            MessageKind::Register,
            MessageKind::Unregister,
            MessageKind::ConfigUpdate,
        ] {
            assert_eq!(
                binding_key(kind, "a").unwrap(),
                binding_key(kind, "another-device").unwrap()
            );
        }
        assert_eq!(
            binding_key(MessageKind::ConfigUpdate, "a").unwrap(),
            "device.schema.updated"
        );
    }

    #[test]
    fn empty_id_builds_nothing() {
        assert_eq!(
            BindingKeys::build(""),
            Err(SubscriptionError::EmptyDeviceId)
        );
        assert_eq!(
            binding_key(MessageKind::Register, ""),
            Err(SubscriptionError::EmptyDeviceId)
        );
    }

    #[test]
    fn resolve_roundtrips_every_kind() {
        let keys = BindingKeys::build("fbe64efa6c7f717e").unwrap();
        for kind in MessageKind::ALL {
            assert_eq!(keys.resolve(keys.get(kind)), Some(kind));
        }
        assert_eq!(keys.resolve("device.other.data.update"), None);
        assert_eq!(keys.resolve("device.fbe64efa6c7f717e"), None);
        assert_eq!(keys.iter().count(), MessageKind::COUNT);
        assert_eq!(keys.queue_name(), "thingd-fogOut-fbe64efa6c7f717e");
    }
}
