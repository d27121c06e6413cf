//! ---
//! fb_section: "02-cloud-protocol"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Cloud session: read subscription lifecycle and outbound operations."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
//! A [`CloudSession`] owns the broker client, the active binding-key set and
//! the application handler. Outbound operations encode a body and publish it;
//! inbound deliveries are resolved, decoded and handed to the handler, whose
//! return value decides the acknowledgement.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::errors::{CloudError, SubscriptionError};
use crate::keys::{self, commands, BindingKeys};
use crate::logging::{log_inbound, log_outbound, SessionMetricsExporter};
use crate::transport::{AddressingMode, BrokerClient, Delivery, OutboundMessage};
use crate::types::{ConfigEntry, MessageKind, ProtocolMessage};
use crate::value::{TypedValue, ValueType};

/// Application callback: receives each decoded message together with the
/// application context and returns whether the delivery is consumed.
pub type Handler<C> = Box<dyn FnMut(&ProtocolMessage, &mut C) -> bool>;

/// Snapshot of session counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    /// Messages handed to the broker client.
    pub published: u64,
    /// Publishes rejected by the broker client.
    pub publish_failures: u64,
    /// Deliveries received.
    pub received: u64,
    /// Deliveries decoded and passed to the handler.
    pub handled: u64,
    /// Deliveries on routing keys outside the active key set.
    pub unknown: u64,
    /// Deliveries whose body failed to decode.
    pub decode_failures: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    handled: AtomicU64,
    unknown: AtomicU64,
    decode_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionMetrics {
        SessionMetrics {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadRequest {
    Stop,
    Restart(String),
}

/// Requests teardown or rebuild of the read subscription. Safe to trigger
/// from inside a handler; the request is applied once the handler has
/// returned. The latest request wins.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    pending: Arc<Mutex<Option<ReadRequest>>>,
}

impl StopHandle {
    /// Request that reading stops.
    pub fn stop(&self) {
        *self.pending.lock() = Some(ReadRequest::Stop);
    }

    /// Request that reading continues for `device_id` with the same handler
    /// and context. The old key set and queue are torn down first.
    pub fn restart(&self, device_id: impl Into<String>) {
        *self.pending.lock() = Some(ReadRequest::Restart(device_id.into()));
    }

    /// True while a stop or restart request is pending.
    pub fn is_requested(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn take(&self) -> Option<ReadRequest> {
        self.pending.lock().take()
    }
}

struct Subscription<C> {
    dispatcher: Dispatcher,
    queue: String,
    handler: Handler<C>,
    context: C,
}

/// Device-to-cloud session over a [`BrokerClient`].
pub struct CloudSession<B: BrokerClient, C> {
    broker: B,
    user_token: Option<String>,
    subscription: Option<Subscription<C>>,
    stop: StopHandle,
    counters: Counters,
    exporter: Option<SessionMetricsExporter>,
    failed_restart: Option<(CloudError, C)>,
}

impl<B: BrokerClient, C> CloudSession<B, C> {
    /// Session over `broker` with no active subscription.
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            user_token: None,
            subscription: None,
            stop: StopHandle::default(),
            counters: Counters::default(),
            exporter: None,
            failed_restart: None,
        }
    }

    /// Attach the user token sent in the `Authorization` header.
    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    /// Mirror session counters into Prometheus.
    pub fn with_metrics(mut self, exporter: SessionMetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Broker client.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Mutable broker client.
    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    /// Handle that stops or restarts reading, usable from inside the handler.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Key set of the active subscription.
    pub fn active_keys(&self) -> Option<&BindingKeys> {
        self.subscription.as_ref().map(|sub| sub.dispatcher.keys())
    }

    /// True while a read subscription is active.
    pub fn is_reading(&self) -> bool {
        self.subscription.is_some()
    }

    /// Application context of the active subscription.
    pub fn context(&self) -> Option<&C> {
        self.subscription.as_ref().map(|sub| &sub.context)
    }

    /// Mutable application context of the active subscription.
    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.subscription.as_mut().map(|sub| &mut sub.context)
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> SessionMetrics {
        self.counters.snapshot()
    }

    /// Subscribe to every inbound kind for `device_id`.
    ///
    /// Any existing subscription is torn down first. On failure nothing stays
    /// declared or consumed and the session is not reading.
    pub fn start_reading<F>(
        &mut self,
        device_id: &str,
        handler: F,
        context: C,
    ) -> Result<(), CloudError>
    where
        F: FnMut(&ProtocolMessage, &mut C) -> bool + 'static,
    {
        self.stop.take();
        self.subscribe(device_id, Box::new(handler), context)
            .map_err(|(err, _)| err)
    }

    fn subscribe(
        &mut self,
        device_id: &str,
        handler: Handler<C>,
        context: C,
    ) -> Result<(), (CloudError, C)> {
        self.teardown();

        let keys = match BindingKeys::build(device_id) {
            Ok(keys) => keys,
            Err(err) => return Err((err.into(), context)),
        };
        let queue = keys.queue_name();
        if let Err(err) = self.bind_all(&queue, &keys) {
            warn!(device_id, queue = %queue, error = %err, "read subscription failed");
            if let Err(cleanup) = self.broker.delete_queue(&queue) {
                warn!(queue = %queue, error = %cleanup, "failed to remove partial subscription");
            }
            return Err((err.into(), context));
        }

        info!(device_id, queue = %queue, broker = self.broker.name(), "reading started");
        self.subscription = Some(Subscription {
            dispatcher: Dispatcher::new(keys),
            queue,
            handler,
            context,
        });
        Ok(())
    }

    fn bind_all(&self, queue: &str, binding_keys: &BindingKeys) -> Result<(), SubscriptionError> {
        self.broker.declare_queue(queue)?;
        for (kind, key) in binding_keys.iter() {
            self.broker.bind_queue(queue, keys::EXCHANGE_DEVICE, key)?;
            debug!(queue, kind = kind.as_str(), routing_key = key, "queue bound");
        }
        self.broker.consume(queue)?;
        Ok(())
    }

    /// Stop reading and return the application context. Idempotent.
    pub fn stop_reading(&mut self) -> Option<C> {
        self.stop.take();
        self.teardown().map(|(_, context)| context)
    }

    /// Error and context of a restart requested from a handler that could
    /// not subscribe. The session is not reading afterwards.
    pub fn take_failed_restart(&mut self) -> Option<(CloudError, C)> {
        self.failed_restart.take()
    }

    fn teardown(&mut self) -> Option<(Handler<C>, C)> {
        let subscription = self.subscription.take()?;
        self.broker.stop_consuming();
        if let Err(err) = self.broker.delete_queue(&subscription.queue) {
            warn!(queue = %subscription.queue, error = %err, "failed to delete queue");
        }
        info!(
            device_id = subscription.dispatcher.keys().device_id(),
            queue = %subscription.queue,
            "reading stopped"
        );
        Some((subscription.handler, subscription.context))
    }

    fn apply_pending_request(&mut self) {
        match self.stop.take() {
            None => {}
            Some(ReadRequest::Stop) => {
                self.teardown();
            }
            Some(ReadRequest::Restart(device_id)) => {
                let Some((handler, context)) = self.teardown() else {
                    warn!(device_id = %device_id, "restart requested without active subscription");
                    return;
                };
                if let Err((err, context)) = self.subscribe(&device_id, handler, context) {
                    error!(device_id = %device_id, error = %err, "restart from handler failed");
                    self.failed_restart = Some((err, context));
                }
            }
        }
    }

    /// Dispatch one delivery and return the acknowledgement decision.
    ///
    /// A stop or restart requested by the handler takes effect before this
    /// returns.
    pub fn handle_delivery(&mut self, delivery: &Delivery) -> bool {
        let consumed = self.dispatch_one(delivery);
        self.apply_pending_request();
        consumed
    }

    /// Pull pending deliveries from the broker client, dispatch and
    /// acknowledge each. Returns the number processed.
    pub fn poll(&mut self) -> usize {
        self.apply_pending_request();
        let mut processed = 0;
        while self.is_reading() {
            let Some(delivery) = self.broker.next_delivery() else {
                break;
            };
            let consumed = self.dispatch_one(&delivery);
            self.broker.ack(&delivery, consumed);
            processed += 1;
            self.apply_pending_request();
        }
        processed
    }

    fn dispatch_one(&mut self, delivery: &Delivery) -> bool {
        log_inbound(delivery);
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.observe_received();
        }

        let outcome = match self.subscription.as_mut() {
            Some(Subscription {
                dispatcher,
                handler,
                context,
                ..
            }) => dispatcher.dispatch(delivery, |message| handler(message, context)),
            None => {
                warn!(routing_key = %delivery.routing_key, "delivery without active subscription");
                DispatchOutcome::Unknown
            }
        };

        match &outcome {
            DispatchOutcome::Unknown => {
                self.counters.unknown.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_unknown();
                }
            }
            DispatchOutcome::DecodeFailed(_) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_decode_failure();
                }
            }
            DispatchOutcome::Handled { .. } => {
                self.counters.handled.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_handled();
                }
            }
        }
        outcome.consumed()
    }

    /// Register `device_id` under `name`. The reply arrives as a `Register` event.
    pub fn register_device(&self, device_id: &str, name: &str) -> Result<(), CloudError> {
        let body = codec::encode_register(device_id, name)?;
        self.send(AddressingMode::Direct, commands::REGISTER, body, None)
    }

    /// Unregister `device_id`. The reply arrives as an `Unregister` event.
    pub fn unregister_device(&self, device_id: &str) -> Result<(), CloudError> {
        let body = codec::encode_unregister(device_id)?;
        self.send(AddressingMode::Direct, commands::UNREGISTER, body, None)
    }

    /// Authenticate `device_id` with `token`. The reply arrives as an `Auth`
    /// event on the active subscription.
    pub fn auth_device(&self, device_id: &str, token: &str) -> Result<(), CloudError> {
        let reply_to = self.reply_key(MessageKind::Auth)?;
        let body = codec::encode_auth(device_id, token)?;
        self.send(AddressingMode::DirectRpc, commands::AUTH, body, Some(reply_to))
    }

    /// Send the sensor configuration of `device_id`.
    pub fn update_config(&self, device_id: &str, config: &[ConfigEntry]) -> Result<(), CloudError> {
        let body = codec::encode_config(device_id, config)?;
        self.send(AddressingMode::Direct, commands::SCHEMA_SENT, body, None)
    }

    /// Request the device listing. The reply arrives as a `ListDevices` event
    /// on the active subscription.
    pub fn list_devices(&self) -> Result<(), CloudError> {
        let reply_to = self.reply_key(MessageKind::ListDevices)?;
        let body = codec::encode_list_devices();
        self.send(AddressingMode::DirectRpc, commands::LIST, body, Some(reply_to))
    }

    /// Publish one sensor value on the fanout data exchange.
    pub fn publish_data(
        &self,
        device_id: &str,
        sensor_id: u8,
        value_type: ValueType,
        value: &TypedValue,
        len: usize,
    ) -> Result<(), CloudError> {
        let body = codec::encode_data(device_id, sensor_id, value_type, value, len)?;
        let message = self.envelope(AddressingMode::Fanout, keys::EXCHANGE_DATA_SENT, None, body, None);
        self.publish(message)
    }

    fn reply_key(&self, kind: MessageKind) -> Result<String, CloudError> {
        self.active_keys()
            .map(|keys| keys.get(kind).to_owned())
            .ok_or(CloudError::NotReading)
    }

    fn send(
        &self,
        mode: AddressingMode,
        routing_key: &str,
        body: String,
        reply_to: Option<String>,
    ) -> Result<(), CloudError> {
        let message = self.envelope(mode, keys::EXCHANGE_DEVICE, Some(routing_key), body, reply_to);
        self.publish(message)
    }

    fn envelope(
        &self,
        mode: AddressingMode,
        exchange: &str,
        routing_key: Option<&str>,
        body: String,
        reply_to: Option<String>,
    ) -> OutboundMessage {
        let mut headers = BTreeMap::new();
        if let Some(token) = &self.user_token {
            headers.insert(keys::AUTHORIZATION_HEADER.to_owned(), token.clone());
        }
        let correlation_id = (mode == AddressingMode::DirectRpc)
            .then(|| keys::DEFAULT_CORRELATION_ID.to_owned());
        OutboundMessage {
            mode,
            exchange: exchange.to_owned(),
            routing_key: routing_key.map(str::to_owned),
            expiration_ms: keys::MESSAGE_EXPIRATION_MS,
            body,
            reply_to,
            correlation_id,
            headers,
        }
    }

    fn publish(&self, message: OutboundMessage) -> Result<(), CloudError> {
        log_outbound(&message);
        match self.broker.publish(&message) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_published();
                }
                Ok(())
            }
            Err(err) => {
                error!(
                    broker = self.broker.name(),
                    exchange = %message.exchange,
                    routing_key = message.routing_key.as_deref(),
                    error = %err,
                    "publish failed"
                );
                self.counters.publish_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_publish_failure();
                }
                Err(CloudError::Publish(err))
            }
        }
    }
}

impl<B: BrokerClient, C> Drop for CloudSession<B, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
