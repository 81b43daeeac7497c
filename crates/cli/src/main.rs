//! Alert node entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Wire observability**: install the `tracing` subscriber before anything
//!    else runs, and keep its guard alive until shutdown.
//! 2. **Load configuration**: build the node's [`ConfigGraph`] from its YAML
//!    file. An invalid graph is fatal: the node never starts with one.
//! 3. **Construct infrastructure**: a [`LineTransport`] over stdin and the
//!    default [`LoggingProcessor`], injected into an [`AlertConsumer`].
//! 4. **Bind and consume**: register every routing key, then block in the
//!    consumption loop until the transport shuts down.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use listener::{
    generated_name, AlertConsumer, ConsumerConfig, LineTransport, DEFAULT_BINDING,
    DEFAULT_EXCHANGE,
};
use node_domain::{ConfigGraph, LoggingProcessor};
use tokio::io::BufReader;
use tracing::{error, info};

use crate::telemetry::LogFormat;

/// Default parser: first routing-key segment is the endpoint name.
const DEFAULT_PARSER: &str = r"(?P<endpoint>[^.]+)(\..*)?";

/// Consume alerts for one instrument node.
#[derive(Debug, Parser)]
#[command(name = "alert-node", version, about)]
struct Args {
    /// Node configuration file (YAML).
    #[arg(short, long, env = "ALERT_NODE_CONFIG")]
    config: PathBuf,

    /// Exchange to bind routing keys on.
    #[arg(long, env = "ALERT_NODE_EXCHANGE", default_value = DEFAULT_EXCHANGE)]
    exchange: String,

    /// Binding pattern; repeat for several.
    #[arg(short, long = "key", default_values_t = [DEFAULT_BINDING.to_string()])]
    keys: Vec<String>,

    /// Regular expression applied to every routing key.
    #[arg(long, env = "ALERT_NODE_PARSER", default_value = DEFAULT_PARSER)]
    parser: String,

    /// Consumer name; derived from the node name when omitted.
    #[arg(long)]
    name: Option<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "ALERT_NODE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = telemetry::init(&args.log_level, args.log_format)?;

    let graph = ConfigGraph::from_path(&args.config)
        .with_context(|| format!("invalid node configuration {}", args.config.display()))?;
    info!(
        node = %graph.node_name(),
        broker = %graph.broker(),
        instruments = graph.instrument_count(),
        "node configuration loaded"
    );

    let name = args
        .name
        .unwrap_or_else(|| generated_name(&format!("{}-alerts", graph.node_name())));
    let config = ConsumerConfig::new(args.parser)
        .with_exchange(args.exchange)
        .with_keys(args.keys)
        .with_name(name);

    let transport = Arc::new(LineTransport::new(BufReader::new(tokio::io::stdin())));
    let consumer = AlertConsumer::configure(config, transport, Arc::new(LoggingProcessor))
        .context("invalid consumer configuration")?;

    if !consumer.bind_keys().await {
        error!(consumer = %consumer.name(), "not every routing key could be bound");
        bail!("failed to bind routing keys on '{}'", consumer.exchange());
    }

    consumer.start().await?;
    info!("shutdown complete");
    Ok(())
}
