//! ---
//! fb_section: "05-external-interfaces"
//! fb_subsection: "binary"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Binding-key table of a device."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use anyhow::Result;
use clap::Args;
use fogbridge_cloud::keys::{self, commands};
use fogbridge_cloud::BindingKeys;

use crate::Settings;

/// Options for the `keys` command.
#[derive(Debug, Args)]
pub struct KeysArgs {
    /// Device identifier; defaults to the configured device.
    #[arg(long)]
    pub device: Option<String>,
    /// Also list the outbound command keys.
    #[arg(long)]
    pub commands: bool,
}

/// Print one `kind key` line per inbound kind, then the queue name.
pub fn run(settings: &Settings, args: KeysArgs) -> Result<()> {
    let device_id = settings.device_id(args.device.as_deref())?;
    let binding_keys = BindingKeys::build(&device_id)?;
    for (kind, key) in binding_keys.iter() {
        println!("{:<14} {}", kind.as_str(), key);
    }
    println!("{:<14} {}", "queue", binding_keys.queue_name());

    if args.commands {
        for (name, key) in [
            ("register", commands::REGISTER),
            ("unregister", commands::UNREGISTER),
            ("auth", commands::AUTH),
            ("schema", commands::SCHEMA_SENT),
            ("list", commands::LIST),
        ] {
            println!("{:<14} {} -> {}", name, keys::EXCHANGE_DEVICE, key);
        }
        println!("{:<14} {} (fanout)", "data", keys::EXCHANGE_DATA_SENT);
    }
    Ok(())
}
