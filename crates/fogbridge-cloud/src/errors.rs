//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Error taxonomy for encoding, decoding, subscription and publishing."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use crate::value::ValueType;

/// Failure while building an outbound JSON body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The value variant does not match the requested value type, or no
    /// encoder exists for the combination (raw thresholds).
    #[error("unsupported value type {value_type:?} for {variant}")]
    UnsupportedValueType {
        /// Value type tag requested by the caller.
        value_type: ValueType,
        /// Variant name of the supplied value.
        variant: &'static str,
    },
    /// NaN and infinities have no JSON representation.
    #[error("float value is not finite")]
    NonFiniteFloat,
    /// A threshold flag is set but the policy carries no threshold value.
    #[error("event flag set for `{0}` but no threshold given")]
    MissingThreshold(&'static str),
    /// Outbound messages always carry a device identifier.
    #[error("device id must not be empty")]
    EmptyDeviceId,
}

/// Failure while decoding an inbound transport body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The body is not a JSON object.
    #[error("body is not a valid JSON object: {0}")]
    InvalidJson(String),
    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A field is present but has the wrong JSON type or an out-of-range value.
    #[error("malformed field `{0}`")]
    MalformedField(&'static str),
    /// A raw value field carried a string that is not valid base64.
    #[error("invalid base64 payload in `{0}`")]
    InvalidBase64(&'static str),
}

/// Failure while building the binding-key set or binding transport resources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// Binding keys cannot be derived from an empty identifier.
    #[error("device id must not be empty")]
    EmptyDeviceId,
    /// The broker client refused to declare, bind or consume.
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

/// Failure reported by a broker client implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Publishing the message failed.
    #[error("publish to `{exchange}` failed: {reason}")]
    Publish {
        /// Exchange the message was addressed to.
        exchange: String,
        /// Broker supplied reason.
        reason: String,
    },
    /// Declaring, binding, deleting or consuming a queue failed.
    #[error("queue `{queue}` operation failed: {reason}")]
    Queue {
        /// Queue name involved in the operation.
        queue: String,
        /// Broker supplied reason.
        reason: String,
    },
    /// The broker client is not connected.
    #[error("broker client `{0}` is not connected")]
    Disconnected(&'static str),
}

/// Caller-facing error returned by every cloud operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloudError {
    /// The outbound body could not be built; nothing was published.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Starting a read subscription failed; no subscription is active.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// The broker client failed to publish.
    #[error("cloud failure")]
    Publish(#[source] TransportError),
    /// A request/reply operation needs an active read subscription for its reply key.
    #[error("no active read subscription")]
    NotReading,
}

impl From<TransportError> for CloudError {
    fn from(err: TransportError) -> Self {
        CloudError::Publish(err)
    }
}
