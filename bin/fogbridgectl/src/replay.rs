//! ---
//! fb_section: "05-external-interfaces"
//! fb_subsection: "binary"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Replay recorded inbound deliveries through a cloud session."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use fogbridge_cloud::keys::EXCHANGE_DEVICE;
use fogbridge_cloud::{CloudSession, InMemoryBroker, ProtocolMessage, SessionMetricsExporter};
use fogbridge_logging::{fb_debug, fb_error, fb_info, LogContext};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::Settings;

/// Options for the `replay` command.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Device identifier; defaults to the configured device.
    #[arg(long)]
    pub device: Option<String>,
    /// NDJSON file, one `{"routing_key", "body", "exchange"?}` object per line.
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,
    /// Handler answer for decoded messages; `--reject` leaves them unconsumed.
    #[arg(long)]
    pub reject: bool,
    /// Print the Prometheus exposition of the session counters at the end.
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    routing_key: String,
    body: JsonValue,
    #[serde(default = "default_exchange")]
    exchange: String,
}

fn default_exchange() -> String {
    EXCHANGE_DEVICE.to_owned()
}

impl ReplayRecord {
    /// String bodies are sent verbatim so malformed payloads can be replayed.
    fn body_text(&self) -> String {
        match &self.body {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Deliver every record, printing one JSON line per delivery and a summary.
pub fn run(settings: &Settings, args: ReplayArgs) -> Result<()> {
    let device_id = settings.device_id(args.device.as_deref())?;
    let contents = fs::read_to_string(&args.file)
        .with_context(|| format!("unable to read {}", args.file.display()))?;

    let registry = Registry::new();
    let broker = InMemoryBroker::new();
    let mut session = CloudSession::new(broker.clone());
    if args.metrics {
        session = session.with_metrics(SessionMetricsExporter::register(&registry)?);
    }

    let accept = !args.reject;
    session.start_reading(
        &device_id,
        move |message, inbox: &mut Vec<ProtocolMessage>| {
            inbox.push(message.clone());
            accept
        },
        Vec::new(),
    )?;

    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                fb_error!(
                    context = LogContext::new().with_device(&device_id),
                    "line {}: {}",
                    line_no,
                    err
                );
                return Err(err).with_context(|| format!("invalid record on line {}", line_no));
            }
        };
        let log_ctx = LogContext::new()
            .with_device(&device_id)
            .with_routing_key(&record.routing_key);
        fb_debug!(context = log_ctx.clone(), "replaying line {}", line_no);

        let tag = broker
            .inject_unrouted(&record.exchange, &record.routing_key, &record.body_text())
            .ok_or_else(|| anyhow!("session stopped consuming before line {}", line_no))?;
        session.poll();

        let consumed = broker
            .acknowledgements()
            .iter()
            .find(|ack| ack.tag == tag)
            .map(|ack| ack.consumed);
        let event = session
            .context_mut()
            .and_then(|inbox| inbox.drain(..).next());
        if let Some(message) = &event {
            fb_debug!(
                context = log_ctx.with_kind(message.kind().as_str()),
                "line {} decoded",
                line_no
            );
        }
        println!(
            "{}",
            json!({
                "line": line_no,
                "routing_key": record.routing_key,
                "consumed": consumed,
                "event": event,
            })
        );
    }

    let summary = session.metrics();
    fb_info!(
        context = LogContext::new().with_device(&device_id),
        "replayed {} deliveries, {} handled",
        summary.received,
        summary.handled
    );
    println!("{}", json!({ "summary": summary }));

    if args.metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        print!("{}", String::from_utf8(buffer)?);
    }
    Ok(())
}
