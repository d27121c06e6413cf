//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Broker client interface and in-memory broker."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::TransportError;

/// How an outbound message is addressed on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// Direct exchange, single consumer.
    Direct,
    /// Direct exchange with a reply expected on `reply_to`.
    DirectRpc,
    /// Fanout exchange; the routing key is ignored.
    Fanout,
}

/// A message handed to the broker client for publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    /// Addressing mode.
    pub mode: AddressingMode,
    /// Target exchange.
    pub exchange: String,
    /// Routing key; `None` for fanout publishing.
    pub routing_key: Option<String>,
    /// Expiration enforced by the broker.
    pub expiration_ms: u64,
    /// JSON body.
    pub body: String,
    /// Binding key the reply should be routed to.
    pub reply_to: Option<String>,
    /// Correlation identifier for request/reply.
    pub correlation_id: Option<String>,
    /// Message headers.
    pub headers: BTreeMap<String, String>,
}

/// A message delivered by the broker client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Broker assigned delivery tag, used for acknowledgement.
    pub tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Raw body.
    pub body: String,
}

/// Narrow interface to the publish/subscribe transport.
///
/// Connection lifecycle, reconnection and delivery guarantees belong to the
/// implementation; the cloud session only declares, binds, consumes, publishes
/// and acknowledges through it.
pub trait BrokerClient: Send + Sync {
    /// Publish a message.
    fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError>;
    /// Declare a consumer queue.
    fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;
    /// Bind a queue to `exchange` with `routing_key`.
    fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str)
        -> Result<(), TransportError>;
    /// Delete a queue and every pending delivery on it. Deleting an unknown queue is a no-op.
    fn delete_queue(&self, queue: &str) -> Result<(), TransportError>;
    /// Start consuming from a declared queue.
    fn consume(&self, queue: &str) -> Result<(), TransportError>;
    /// Next delivery for the active consumer, if any.
    fn next_delivery(&self) -> Option<Delivery>;
    /// Acknowledge (`consumed == true`) or reject a delivery.
    fn ack(&self, delivery: &Delivery, consumed: bool);
    /// Stop the active consumer. Idempotent.
    fn stop_consuming(&self);
    /// Human-readable client name for logging.
    fn name(&self) -> &'static str;
}

/// Acknowledgement recorded by [`InMemoryBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Delivery tag.
    pub tag: u64,
    /// Whether the delivery was consumed.
    pub consumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    exchange: String,
    routing_key: String,
}

#[derive(Default)]
struct BrokerState {
    published: Vec<OutboundMessage>,
    queues: BTreeMap<String, Vec<Binding>>,
    consuming: Option<String>,
    pending: VecDeque<(String, Delivery)>,
    acks: Vec<Acknowledgement>,
    next_tag: u64,
    fail_publish: bool,
    fail_declare: bool,
    fail_bind_key: Option<String>,
}

impl BrokerState {
    fn enqueue(&mut self, queue: String, exchange: &str, routing_key: &str, body: &str) -> u64 {
        self.next_tag += 1;
        let tag = self.next_tag;
        self.pending.push_back((
            queue,
            Delivery {
                tag,
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                body: body.to_owned(),
            },
        ));
        tag
    }
}

/// In-process broker that records every interaction. Clones share state, so a
/// test can keep a handle while a session owns another.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a message to the active consumer queue when one of its bindings
    /// matches exactly. Returns the delivery tag, or `None` when unroutable.
    pub fn inject(&self, exchange: &str, routing_key: &str, body: &str) -> Option<u64> {
        let mut guard = self.state.lock();
        let queue = guard.consuming.clone()?;
        let bound = guard.queues.get(&queue).is_some_and(|bindings| {
            bindings
                .iter()
                .any(|b| b.exchange == exchange && b.routing_key == routing_key)
        });
        if !bound {
            return None;
        }
        Some(guard.enqueue(queue, exchange, routing_key, body))
    }

    /// Deliver a message to the active consumer regardless of bindings.
    pub fn inject_unrouted(&self, exchange: &str, routing_key: &str, body: &str) -> Option<u64> {
        let mut guard = self.state.lock();
        let queue = guard.consuming.clone()?;
        Some(guard.enqueue(queue, exchange, routing_key, body))
    }

    /// Every message published so far.
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.state.lock().published.clone()
    }

    /// Drain the published messages.
    pub fn take_published(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.state.lock().published)
    }

    /// Every acknowledgement issued so far.
    pub fn acknowledgements(&self) -> Vec<Acknowledgement> {
        self.state.lock().acks.clone()
    }

    /// Declared queue names.
    pub fn queues(&self) -> Vec<String> {
        self.state.lock().queues.keys().cloned().collect()
    }

    /// `(exchange, routing_key)` bindings of `queue`.
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|bindings| {
                bindings
                    .iter()
                    .map(|b| (b.exchange.clone(), b.routing_key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Queue currently consumed, if any.
    pub fn consuming(&self) -> Option<String> {
        self.state.lock().consuming.clone()
    }

    /// Number of deliveries waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Make every subsequent publish fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    /// Make every subsequent queue declaration fail.
    pub fn set_fail_declare(&self, fail: bool) {
        self.state.lock().fail_declare = fail;
    }

    /// Make binding with `routing_key` fail.
    pub fn fail_bind_for(&self, routing_key: Option<&str>) {
        self.state.lock().fail_bind_key = routing_key.map(str::to_owned);
    }
}

impl BrokerClient for InMemoryBroker {
    fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut guard = self.state.lock();
        if guard.fail_publish {
            return Err(TransportError::Publish {
                exchange: message.exchange.clone(),
                reason: "publish rejected".to_owned(),
            });
        }
        guard.published.push(message.clone());
        Ok(())
    }

    fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut guard = self.state.lock();
        if guard.fail_declare {
            return Err(TransportError::Queue {
                queue: queue.to_owned(),
                reason: "declare rejected".to_owned(),
            });
        }
        guard.queues.entry(queue.to_owned()).or_default();
        Ok(())
    }

    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        let mut guard = self.state.lock();
        if guard.fail_bind_key.as_deref() == Some(routing_key) {
            return Err(TransportError::Queue {
                queue: queue.to_owned(),
                reason: format!("bind to `{}` rejected", routing_key),
            });
        }
        let bindings = guard
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::Queue {
                queue: queue.to_owned(),
                reason: "queue not declared".to_owned(),
            })?;
        let binding = Binding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        };
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    fn delete_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut guard = self.state.lock();
        guard.queues.remove(queue);
        guard.pending.retain(|(name, _)| name != queue);
        if guard.consuming.as_deref() == Some(queue) {
            guard.consuming = None;
        }
        Ok(())
    }

    fn consume(&self, queue: &str) -> Result<(), TransportError> {
        let mut guard = self.state.lock();
        if !guard.queues.contains_key(queue) {
            return Err(TransportError::Queue {
                queue: queue.to_owned(),
                reason: "queue not declared".to_owned(),
            });
        }
        guard.consuming = Some(queue.to_owned());
        Ok(())
    }

    fn next_delivery(&self) -> Option<Delivery> {
        let mut guard = self.state.lock();
        let queue = guard.consuming.clone()?;
        let position = guard.pending.iter().position(|(name, _)| *name == queue)?;
        guard.pending.remove(position).map(|(_, delivery)| delivery)
    }

    fn ack(&self, delivery: &Delivery, consumed: bool) {
        self.state.lock().acks.push(Acknowledgement {
            tag: delivery.tag,
            consumed,
        });
    }

    fn stop_consuming(&self) {
        self.state.lock().consuming = None;
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> OutboundMessage {
        OutboundMessage {
            mode: AddressingMode::Direct,
            exchange: "device".into(),
            routing_key: Some("device.register".into()),
            expiration_ms: 2000,
            body: body.into(),
            reply_to: None,
            correlation_id: None,
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn publish_records_messages() {
        let broker = InMemoryBroker::new();
        broker.publish(&message("{}")).expect("publish succeeds");
        assert_eq!(broker.published().len(), 1);
        assert_eq!(broker.take_published().len(), 1);
        assert!(broker.published().is_empty());
    }

    #[test]
    fn injected_failure_rejects_publish() {
        let broker = InMemoryBroker::new();
        broker.set_fail_publish(true);
        assert!(matches!(
            broker.publish(&message("{}")),
            Err(TransportError::Publish { .. })
        ));
        assert!(broker.published().is_empty());
    }

    #[test]
    fn only_bound_keys_reach_the_consumer() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").unwrap();
        broker.bind_queue("q", "device", "a.b").unwrap();
        broker.consume("q").unwrap();

        assert!(broker.inject("device", "a.b", "{}").is_some());
        assert!(broker.inject("device", "a.c", "{}").is_none());
        assert!(broker.inject_unrouted("device", "a.c", "{}").is_some());

        let first = broker.next_delivery().expect("delivery");
        assert_eq!(first.routing_key, "a.b");
        broker.ack(&first, true);
        assert_eq!(
            broker.acknowledgements(),
            vec![Acknowledgement {
                tag: first.tag,
                consumed: true
            }]
        );
    }

    #[test]
    fn deleting_a_queue_drops_pending_deliveries() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").unwrap();
        broker.bind_queue("q", "device", "k").unwrap();
        broker.consume("q").unwrap();
        broker.inject("device", "k", "{}").unwrap();

        broker.delete_queue("q").unwrap();
        assert_eq!(broker.pending(), 0);
        assert!(broker.consuming().is_none());
        assert!(broker.next_delivery().is_none());
    }

    #[test]
    fn binding_requires_declared_queue() {
        let broker = InMemoryBroker::new();
        assert!(broker.bind_queue("missing", "device", "k").is_err());
        assert!(broker.consume("missing").is_err());
    }
}
