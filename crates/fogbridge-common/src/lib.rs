//! ---
//! fb_section: "01-core-functionality"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Shared configuration and tracing bootstrap."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
//! Configuration loading and logging bootstrap consumed by the fogbridge
//! binaries.

pub mod config;
pub mod logging;

pub use config::{BridgeConfig, BrokerConfig, DeviceConfig, LoadedBridgeConfig, LoggingConfig};
pub use logging::{init_tracing, LogFormat};
