//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{Endpoint, ForwarderConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Effective configuration for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    #[serde(flatten)]
    config: &'a ForwarderConfig,
    endpoint: EndpointInfo,
}

#[derive(Serialize)]
struct EndpointInfo {
    failover: bool,
    addresses: Vec<String>,
    example_destination: String,
    content_type: &'static str,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.toml {
        println!("{}", ConfigLoader::to_toml(&config)?);
    } else if args.json {
        let info = build_config_info(&config)?;
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config)?;
    }

    Ok(())
}

fn build_config_info(config: &ForwarderConfig) -> Result<ConfigInfo<'_>> {
    let endpoint = Endpoint::parse(&config.connection.uri)?;
    Ok(ConfigInfo {
        config,
        endpoint: EndpointInfo {
            failover: endpoint.is_failover(),
            addresses: endpoint.addresses().iter().map(|a| a.to_string()).collect(),
            example_destination: format!("{}.<source>", config.publish.topic_prefix),
            content_type: config.publish.format.content_type(),
        },
    })
}

fn print_config_info(config: &ForwarderConfig) -> Result<()> {
    let endpoint = Endpoint::parse(&config.connection.uri)?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Log Forwarder Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🔌 Connection");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ URI: {}", config.connection.uri);
    println!("   ├─ Client id prefix: {}", config.connection.client_id_prefix);
    println!(
        "   └─ Addresses ({}{})",
        endpoint.addresses().len(),
        if endpoint.is_failover() { ", failover" } else { "" }
    );
    for (i, address) in endpoint.addresses().iter().enumerate() {
        let prefix = if i == endpoint.addresses().len() - 1 {
            "└─"
        } else {
            "├─"
        };
        println!("      {} {}", prefix, address);
    }

    let publish = &config.publish;
    println!("\n📨 Publish");
    println!("   ├─ Destination: {}.<source>", publish.topic_prefix);
    println!(
        "   ├─ Format: {:?} ({})",
        publish.format,
        publish.format.content_type()
    );
    println!("   └─ Send timeout: {} ms", publish.send_timeout_ms);

    let dispatch = &config.dispatch;
    println!("\n⚙️  Dispatch");
    match dispatch.max_in_flight() {
        Some(limit) => println!("   ├─ Max in flight: {}", limit),
        None => println!("   ├─ Max in flight: unbounded"),
    }
    println!("   ├─ Drain timeout: {} ms", dispatch.drain_timeout_ms);
    println!("   └─ Batch size: {} events", dispatch.buffer_size);

    println!();
    Ok(())
}
