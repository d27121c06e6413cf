//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Routing-key resolution and per-delivery decode/dispatch."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use tracing::{debug, error, warn};

use crate::codec;
use crate::errors::DecodeError;
use crate::keys::BindingKeys;
use crate::transport::Delivery;
use crate::types::{MessageKind, ProtocolMessage};

/// Result of dispatching one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The routing key matches no active binding key; the handler was not called.
    Unknown,
    /// The body failed to decode; the handler was not called.
    DecodeFailed(DecodeError),
    /// The handler ran and decided whether the delivery is consumed.
    Handled {
        /// Kind of the decoded message.
        kind: MessageKind,
        /// Value returned by the handler.
        consumed: bool,
    },
}

impl DispatchOutcome {
    /// Acknowledgement decision handed to the broker client. Unknown keys and
    /// decode failures are always consumed so they are never redelivered.
    pub fn consumed(&self) -> bool {
        match self {
            DispatchOutcome::Unknown | DispatchOutcome::DecodeFailed(_) => true,
            DispatchOutcome::Handled { consumed, .. } => *consumed,
        }
    }
}

/// Maps inbound deliveries onto message kinds using one immutable key set.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    keys: BindingKeys,
}

impl Dispatcher {
    /// Dispatcher over `keys`.
    pub fn new(keys: BindingKeys) -> Self {
        Self { keys }
    }

    /// Key set in use.
    pub fn keys(&self) -> &BindingKeys {
        &self.keys
    }

    /// Exact-match resolution of a routing key.
    pub fn resolve(&self, routing_key: &str) -> Option<MessageKind> {
        self.keys.resolve(routing_key)
    }

    /// Resolve, decode and hand the message to `handler`.
    pub fn dispatch<F>(&self, delivery: &Delivery, handler: F) -> DispatchOutcome
    where
        F: FnOnce(&ProtocolMessage) -> bool,
    {
        let Some(kind) = self.resolve(&delivery.routing_key) else {
            warn!(
                device_id = self.keys.device_id(),
                routing_key = %delivery.routing_key,
                exchange = %delivery.exchange,
                "dropping delivery on unknown routing key"
            );
            return DispatchOutcome::Unknown;
        };

        let message = match codec::decode(kind, &delivery.body) {
            Ok(message) => message,
            Err(err) => {
                error!(
                    device_id = self.keys.device_id(),
                    routing_key = %delivery.routing_key,
                    kind = kind.as_str(),
                    error = %err,
                    "failed to decode delivery"
                );
                return DispatchOutcome::DecodeFailed(err);
            }
        };

        let consumed = handler(&message);
        debug!(
            device_id = self.keys.device_id(),
            routing_key = %delivery.routing_key,
            kind = kind.as_str(),
            error = message.error.as_deref(),
            consumed,
            "delivery handled"
        );
        DispatchOutcome::Handled { kind, consumed }
    }
}
