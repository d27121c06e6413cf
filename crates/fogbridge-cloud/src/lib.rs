//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Device-to-cloud protocol core: model, codec, keys, dispatch and session."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod codec;
pub mod dispatch;
pub mod errors;
pub mod keys;
pub mod logging;
pub mod session;
pub mod transport;
pub mod types;
pub mod value;

/// Shared result type for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use errors::{CloudError, DecodeError, EncodeError, SubscriptionError, TransportError};
pub use keys::{binding_key, BindingKeys};
pub use logging::{log_inbound, log_outbound, MessageDirection, SessionMetricsExporter};
pub use session::{CloudSession, Handler, SessionMetrics, StopHandle};
pub use transport::{
    Acknowledgement, AddressingMode, BrokerClient, Delivery, InMemoryBroker, OutboundMessage,
};
pub use types::{
    ConfigEntry, DeviceSummary, EventPolicy, MessageBody, MessageKind, ProtocolMessage,
    SensorDatum, SensorSchema,
};
pub use value::{EventFlags, TypedValue, ValueType, RAW_VALUE_MAX_LEN};
