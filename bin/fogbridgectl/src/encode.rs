//! ---
//! fb_section: "05-external-interfaces"
//! fb_subsection: "binary"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Encode outbound operations against an in-memory broker."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use fogbridge_cloud::{
    CloudSession, ConfigEntry, EventFlags, EventPolicy, InMemoryBroker, OutboundMessage,
    SensorSchema, TypedValue, ValueType,
};
use fogbridge_logging::{fb_info, LogContext};
use serde_json::{json, Value as JsonValue};

use crate::Settings;

/// Outbound operations.
#[derive(Debug, Subcommand)]
pub enum EncodeCommand {
    /// Register a device.
    Register {
        #[arg(long)]
        device: Option<String>,
        /// Display name; defaults to the configured name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Unregister a device.
    Unregister {
        #[arg(long)]
        device: Option<String>,
    },
    /// Authenticate a device.
    Auth {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        token: String,
    },
    /// Send the configuration of one sensor.
    Config(ConfigArgs),
    /// Request the device listing.
    List {
        #[arg(long)]
        device: Option<String>,
    },
    /// Publish one sensor value.
    Publish(PublishArgs),
}

/// Options describing a single sensor configuration entry.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub device: Option<String>,
    #[arg(long)]
    pub sensor: u8,
    /// int, float, bool, raw, int64, uint or uint64.
    #[arg(long, value_name = "TYPE")]
    pub value_type: ValueType,
    #[arg(long, default_value_t = 0)]
    pub unit: u8,
    #[arg(long, default_value_t = 0)]
    pub type_id: u16,
    #[arg(long)]
    pub name: String,
    /// Notify on every change.
    #[arg(long)]
    pub change: bool,
    /// Notify every N seconds.
    #[arg(long, value_name = "SECONDS")]
    pub time_sec: Option<u32>,
    #[arg(long)]
    pub lower: Option<String>,
    #[arg(long)]
    pub upper: Option<String>,
}

/// Options for publishing one value.
#[derive(Debug, Args)]
pub struct PublishArgs {
    #[arg(long)]
    pub device: Option<String>,
    #[arg(long)]
    pub sensor: u8,
    /// int, float, bool, raw, int64, uint or uint64.
    #[arg(long, value_name = "TYPE")]
    pub value_type: ValueType,
    /// Value text; raw values are hex.
    #[arg(long)]
    pub value: String,
    /// Raw bytes to encode; defaults to the whole value.
    #[arg(long)]
    pub len: Option<usize>,
}

impl ConfigArgs {
    fn entry(&self) -> Result<ConfigEntry> {
        let threshold = |text: &Option<String>| -> Result<Option<TypedValue>> {
            text.as_deref()
                .map(|t| TypedValue::parse_as(self.value_type, t).map_err(|err| anyhow!(err)))
                .transpose()
        };

        let mut event = EventPolicy::default();
        if self.change {
            event.flags |= EventFlags::CHANGE;
        }
        if let Some(time_sec) = self.time_sec {
            event.flags |= EventFlags::TIME;
            event.time_sec = time_sec;
        }
        event.lower_threshold = threshold(&self.lower).context("invalid --lower")?;
        if event.lower_threshold.is_some() {
            event.flags |= EventFlags::LOWER_THRESHOLD;
        }
        event.upper_threshold = threshold(&self.upper).context("invalid --upper")?;
        if event.upper_threshold.is_some() {
            event.flags |= EventFlags::UPPER_THRESHOLD;
        }

        Ok(ConfigEntry {
            sensor_id: self.sensor,
            schema: SensorSchema {
                value_type: self.value_type,
                unit: self.unit,
                type_id: self.type_id,
                name: self.name.clone(),
            },
            event,
        })
    }
}

/// Run the operation and print every published envelope as one JSON line.
pub fn run(settings: &Settings, command: EncodeCommand) -> Result<()> {
    let broker = InMemoryBroker::new();
    let mut session: CloudSession<InMemoryBroker, ()> = CloudSession::new(broker.clone());
    if let Some(token) = settings.user_token() {
        session = session.with_user_token(token);
    }

    match &command {
        EncodeCommand::Register { device, name } => {
            let device_id = settings.device_id(device.as_deref())?;
            let name = name
                .clone()
                .or_else(|| settings.config.as_ref().map(|c| c.device.name.clone()))
                .ok_or_else(|| anyhow!("no device name: pass --name or --config"))?;
            session.register_device(&device_id, &name)?;
        }
        EncodeCommand::Unregister { device } => {
            session.unregister_device(&settings.device_id(device.as_deref())?)?;
        }
        EncodeCommand::Auth { device, token } => {
            let device_id = settings.device_id(device.as_deref())?;
            session.start_reading(&device_id, |_, _| true, ())?;
            session.auth_device(&device_id, token)?;
        }
        EncodeCommand::Config(args) => {
            let device_id = settings.device_id(args.device.as_deref())?;
            session.update_config(&device_id, &[args.entry()?])?;
        }
        EncodeCommand::List { device } => {
            let device_id = settings.device_id(device.as_deref())?;
            session.start_reading(&device_id, |_, _| true, ())?;
            session.list_devices()?;
        }
        EncodeCommand::Publish(args) => {
            let device_id = settings.device_id(args.device.as_deref())?;
            let value = TypedValue::parse_as(args.value_type, &args.value)
                .map_err(|err| anyhow!(err))
                .context("invalid --value")?;
            let len = match (&value, args.len) {
                (_, Some(len)) => len,
                (TypedValue::Raw(bytes), None) => bytes.len(),
                _ => 0,
            };
            session.publish_data(&device_id, args.sensor, args.value_type, &value, len)?;
        }
    }

    for message in broker.take_published() {
        let mut log_ctx = LogContext::new();
        if let Some(routing_key) = &message.routing_key {
            log_ctx = log_ctx.with_routing_key(routing_key);
        }
        fb_info!(context = log_ctx, "encoded envelope for `{}`", message.exchange);
        println!("{}", envelope_json(&message)?);
    }
    Ok(())
}

fn envelope_json(message: &OutboundMessage) -> Result<JsonValue> {
    let body: JsonValue =
        serde_json::from_str(&message.body).context("published body is not JSON")?;
    Ok(json!({
        "mode": message.mode,
        "exchange": message.exchange,
        "routing_key": message.routing_key,
        "reply_to": message.reply_to,
        "correlation_id": message.correlation_id,
        "expiration_ms": message.expiration_ms,
        "headers": message.headers,
        "body": body,
    }))
}
