// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Monitor Presence - Presence Reconciliation Engine
//!
//! Listens to a fleet of Bluetooth monitor scanners over MQTT and keeps
//! home/away state for every known device and for the household.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use monitor_presence::{
    bus::{MemoryBus, MessageBus, MqttBus},
    entities::{spawn_state_mirror, EntityStore, MemoryEntityStore},
    hardware::{HardwareControl, SshHardwareControl},
    Config, Engine, MonitorSimulator, VERSION,
};

/// Monitor Presence - Presence Reconciliation Engine
#[derive(Parser, Debug)]
#[command(name = "monitor-presence")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Reconciles Bluetooth monitor scanner reports into home/away presence")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated scanners on an in-memory bus
    #[arg(long)]
    demo: bool,

    /// MQTT broker address
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Root topic the monitor scanners publish under
    #[arg(long)]
    monitor_topic: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Monitor Presence v{} - Presence Reconciliation Engine", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(broker) = args.mqtt_broker {
        config.mqtt.broker = broker;
    }
    if let Some(topic) = args.monitor_topic {
        config.presence.monitor_topic = topic;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(mut config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let mut mqtt = None;
    let bus: Arc<dyn MessageBus> = if config.demo_mode {
        Arc::new(MemoryBus::default())
    } else {
        info!("Connecting to MQTT broker {}:{}", config.mqtt.broker, config.mqtt.port);
        let client = Arc::new(MqttBus::connect(&config.mqtt));
        mqtt = Some(client.clone());
        client
    };

    let mut tasks = Vec::new();
    if config.demo_mode {
        let simulator = MonitorSimulator::demo(&config.presence.monitor_topic);
        if config.known_devices.is_empty() {
            config.known_devices = simulator
                .devices()
                .iter()
                .map(|d| format!("{} {}", d.mac, d.name))
                .collect();
        }
        // the engine has to subscribe before the scanners announce themselves
        let bus = bus.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match simulator.spawn(bus, shutdown).await {
                Ok(handle) => {
                    let _ = handle.await;
                }
                Err(e) => warn!("Scanner simulator failed to start: {}", e),
            }
        }));
        info!("Scanner simulator enabled");
    }

    let store: Arc<dyn EntityStore> = Arc::new(MemoryEntityStore::new());
    let hardware: Arc<dyn HardwareControl> = Arc::new(SshHardwareControl::new(
        config.remote_monitors.clone(),
        Duration::from_secs(10),
    ));

    let engine = Engine::new(&config, bus.clone(), store.clone(), hardware)?;
    tasks.push(spawn_state_mirror(
        store,
        bus,
        engine.names().clone(),
        engine.topics().clone(),
        shutdown_tx.subscribe(),
    ));
    info!("Core engine initialized");

    let engine_task = tokio::spawn(engine.run(shutdown_tx.subscribe()));

    info!("Monitor Presence running");
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());

    engine_task.await??;
    for task in tasks {
        let _ = task.await;
    }
    if let Some(client) = mqtt {
        if let Err(e) = client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
        }
    }

    info!("Monitor Presence shutdown complete");

    Ok(())
}
