//! SDR Transceiver Bridge Main Application
//!
//! Entry point for the burst transceiver: binds the baseband-core
//! channels, creates the radio device and runs the control channel
//! handler, which brings up the service loops on POWERON.

mod config;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use config::TrxConfig;
use interfaces::channels::ChannelSet;
use interfaces::radio::RadioDevice;
use interfaces::zmq_radio::{ZmqRadio, ZmqRadioConfig};
use scheduler::control::{ControlConfig, ControlHandler};
use scheduler::notifier::ClockNotifier;
use scheduler::queue::TxPriorityQueue;
use scheduler::state::{shutdown_channel, trigger_shutdown, SharedState};

/// SDR burst transceiver bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the local base port
    #[arg(long)]
    base_port: Option<u16>,

    /// Override the baseband core base port
    #[arg(long)]
    peer_base_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting SDR transceiver bridge");

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            TrxConfig::from_toml_file(path)?
        }
        None => TrxConfig::default(),
    };
    if let Some(port) = args.base_port {
        config.channels.base_port = port;
    }
    if let Some(port) = args.peer_base_port {
        config.channels.peer_base_port = port;
    }

    let local_base: SocketAddr = format!(
        "{}:{}",
        config.channels.bind_addr, config.channels.base_port
    )
    .parse()?;
    let peer_base: SocketAddr = format!(
        "{}:{}",
        config.channels.peer_addr, config.channels.peer_base_port
    )
    .parse()?;

    info!("Channel configuration:");
    info!("  local base: {}", local_base);
    info!("  peer base:  {}", peer_base);

    let channels = ChannelSet::bind(local_base, peer_base).await?;

    let radio_config = ZmqRadioConfig {
        tx_address: config.radio.tx_address.clone(),
        rx_address: config.radio.rx_address.clone(),
        slot_duration: std::time::Duration::from_micros(config.radio.slot_duration_us),
        underrun_grace_slots: config.radio.underrun_grace_slots,
    };
    let radio: Arc<dyn RadioDevice> = Arc::new(ZmqRadio::new(radio_config)?);

    let shared = SharedState::new();
    let queue = Arc::new(TxPriorityQueue::new());
    let notifier = ClockNotifier::new(Arc::new(channels.clock), shared.clone());
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let handler = ControlHandler::new(
        radio,
        Arc::new(channels.control),
        Arc::new(channels.data),
        Arc::clone(&queue),
        shared,
        notifier,
        ControlConfig {
            latency: config.latency.to_latency_config(),
            clock_interval_frames: config.latency.clock_interval_frames,
        },
        shutdown_rx,
    );
    let control_task = tokio::spawn(handler.run());

    info!("Transceiver idle, waiting for POWERON");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    trigger_shutdown(&shutdown_tx);
    queue.clear().await;
    if let Err(e) = control_task.await? {
        error!("control handler exited with error: {}", e);
    }

    info!("Transceiver stopped");
    Ok(())
}
