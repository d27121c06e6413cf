//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Structured message logging and Prometheus session metrics."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use prometheus::{IntCounter, Opts, Registry};
use tracing::debug;

use crate::transport::{Delivery, OutboundMessage};

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message handed to the broker client.
    Outbound,
    /// Message received from the broker client.
    Inbound,
}

/// Emit a structured log entry for an outbound message.
pub fn log_outbound(message: &OutboundMessage) {
    debug!(
        exchange = %message.exchange,
        routing_key = message.routing_key.as_deref(),
        reply_to = message.reply_to.as_deref(),
        mode = ?message.mode,
        bytes = message.body.len(),
        direction = ?MessageDirection::Outbound,
        "cloud activity"
    );
}

/// Emit a structured log entry for an inbound delivery.
pub fn log_inbound(delivery: &Delivery) {
    debug!(
        tag = delivery.tag,
        exchange = %delivery.exchange,
        routing_key = %delivery.routing_key,
        bytes = delivery.body.len(),
        direction = ?MessageDirection::Inbound,
        "cloud activity"
    );
}

/// Prometheus metric handles for session activity.
pub struct SessionMetricsExporter {
    published: IntCounter,
    publish_failures: IntCounter,
    received: IntCounter,
    handled: IntCounter,
    unknown: IntCounter,
    decode_failures: IntCounter,
}

impl SessionMetricsExporter {
    /// Register session metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            published: counter(
                "fogbridge_messages_published_total",
                "Messages handed to the broker client",
            )?,
            publish_failures: counter(
                "fogbridge_publish_failures_total",
                "Publishes rejected by the broker client",
            )?,
            received: counter(
                "fogbridge_deliveries_received_total",
                "Deliveries received from the broker client",
            )?,
            handled: counter(
                "fogbridge_deliveries_handled_total",
                "Deliveries decoded and passed to the handler",
            )?,
            unknown: counter(
                "fogbridge_deliveries_unknown_total",
                "Deliveries dropped on an unknown routing key",
            )?,
            decode_failures: counter(
                "fogbridge_decode_failures_total",
                "Deliveries dropped because the body failed to decode",
            )?,
        })
    }

    pub(crate) fn observe_published(&self) {
        self.published.inc();
    }

    pub(crate) fn observe_publish_failure(&self) {
        self.publish_failures.inc();
    }

    pub(crate) fn observe_received(&self) {
        self.received.inc();
    }

    pub(crate) fn observe_handled(&self) {
        self.handled.inc();
    }

    pub(crate) fn observe_unknown(&self) {
        self.unknown.inc();
    }

    pub(crate) fn observe_decode_failure(&self) {
        self.decode_failures.inc();
    }
}
