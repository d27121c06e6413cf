//! ---
//! fb_section: "03-logging"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Structured logging sink with runtime log priority."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
#![warn(missing_docs)]

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, reload, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing as __tracing;

/// Errors raised while installing the logging sink.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Another global subscriber was installed first.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    /// The reloadable filter could not be updated.
    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Log priority accepted by [`set_log_priority`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogPriority {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Everything including debug output.
    Debug,
}

impl LogPriority {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogPriority::Error => "error",
            LogPriority::Warn => "warn",
            LogPriority::Info => "info",
            LogPriority::Debug => "debug",
        }
    }

    /// Filter matching this priority.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogPriority::Error => LevelFilter::ERROR,
            LogPriority::Warn => LevelFilter::WARN,
            LogPriority::Info => LevelFilter::INFO,
            LogPriority::Debug => LevelFilter::DEBUG,
        }
    }

    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => LogPriority::Error,
            1 => LogPriority::Warn,
            2 => LogPriority::Info,
            _ => LogPriority::Debug,
        }
    }
}

impl FromStr for LogPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogPriority::Error),
            "warn" => Ok(LogPriority::Warn),
            "info" => Ok(LogPriority::Info),
            "debug" => Ok(LogPriority::Debug),
            other => Err(format!("unknown log priority: {}", other)),
        }
    }
}

impl std::fmt::Display for LogPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static PRIORITY: AtomicU8 = AtomicU8::new(2);
static FILTER_HANDLE: OnceCell<reload::Handle<LevelFilter, Registry>> = OnceCell::new();

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Install a stderr subscriber whose level can be changed with [`set_log_priority`].
///
/// Calling it again after a successful install only updates the priority.
pub fn init_with_priority(priority: LogPriority) -> Result<(), LoggingError> {
    PRIORITY.store(priority.code(), Ordering::Relaxed);
    if let Some(handle) = FILTER_HANDLE.get() {
        handle.reload(priority.level_filter())?;
        return Ok(());
    }

    let (filter, handle) = reload::Layer::new(priority.level_filter());
    Registry::default()
        .with(filter)
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    let _ = FILTER_HANDLE.set(handle);
    Ok(())
}

/// Change the active log priority from its name.
///
/// Accepts `error`, `warn`, `info` and `debug`; anything else is ignored and
/// `false` is returned.
pub fn set_log_priority(priority: &str) -> bool {
    let Ok(priority) = priority.parse::<LogPriority>() else {
        tracing::debug!(requested = priority, "ignoring unknown log priority");
        return false;
    };
    PRIORITY.store(priority.code(), Ordering::Relaxed);
    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(err) = handle.reload(priority.level_filter()) {
            tracing::warn!(error = %err, "failed to apply log priority");
        }
    }
    true
}

/// Last priority applied through this crate.
pub fn current_priority() -> LogPriority {
    LogPriority::from_code(PRIORITY.load(Ordering::Relaxed))
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Device identifier associated with the log event.
    pub device: Option<&'a str>,
    /// Message kind being processed.
    pub kind: Option<&'a str>,
    /// Transport routing key.
    pub routing_key: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device identifier.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a message kind.
    pub fn with_kind(mut self, kind: &'a str) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Attach a routing key.
    pub fn with_routing_key(mut self, routing_key: &'a str) -> Self {
        self.routing_key = Some(routing_key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_names_parse() {
        for name in ["error", "warn", "info", "debug"] {
            let priority: LogPriority = name.parse().expect("known priority");
            assert_eq!(priority.as_str(), name);
        }
        assert!("verbose".parse::<LogPriority>().is_err());
        assert!("INFO".parse::<LogPriority>().is_err());
    }

    #[test]
    fn priority_codes_roundtrip() {
        for priority in [
            LogPriority::Error,
            LogPriority::Warn,
            LogPriority::Info,
            LogPriority::Debug,
        ] {
            assert_eq!(LogPriority::from_code(priority.code()), priority);
        }
    }

    #[test]
    fn level_filters_are_ordered() {
        assert!(LogPriority::Debug.level_filter() > LogPriority::Error.level_filter());
        assert_eq!(LogPriority::Warn.level_filter(), LevelFilter::WARN);
    }

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_device("fbe64efa6c7f717e")
            .with_kind("update");
        fb_info!(context = ctx.clone(), "device online");
        fb_debug!("debug message");
        fb_warn!(context = ctx.clone().with_routing_key("device.x"), "unknown key");
        fb_error!(context = ctx, "error code: {}", 42);
    }
}
