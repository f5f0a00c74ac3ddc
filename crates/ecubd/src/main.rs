//! ecubd - ECU bridge daemon
//!
//! Bridges a scooter's motor controller (CAN) to the vehicle's KV+PubSub
//! store: decodes status frames into the `engine-ecu` hash, supervises
//! regenerative braking against battery temperature and vehicle readiness,
//! and runs the fault reporting pipeline.
//!
//! Without the `socketcan` feature the daemon runs against a mock bus,
//! which is enough to exercise the IPC surface during development.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ecub_bridge::{BatteryMonitor, Bridge, IpcSubscriptions, KersSupervisor, StatusWriter};
use ecub_can::CanBus;
use ecub_core::{KvStore, MemoryKvStore};
use ecub_ecu::{EcuAdapter, EcuVariant};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "ecubd", version, about = "ECU bridge daemon for the engine CAN bus")]
struct Args {
    /// Log level (0=NONE, 1=ERROR, 2=WARN, 3=INFO, 4=DEBUG)
    #[arg(long, default_value_t = 3)]
    log: u8,

    /// Store server address
    #[arg(long = "redis_server", default_value = "127.0.0.1")]
    redis_server: String,

    /// Store server port
    #[arg(long = "redis_port", default_value_t = 6379)]
    redis_port: u16,

    /// CAN device name
    #[arg(long = "can_device", default_value = "can0")]
    can_device: String,

    /// ECU type (bosch or votol)
    #[arg(long = "ecu_type", default_value = "bosch")]
    ecu_type: String,
}

fn level_filter(log: u8) -> Result<LevelFilter> {
    Ok(match log {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        other => bail!("invalid log level {other} (must be 0..=4)"),
    })
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn open_can_bus(device: &str) -> Result<Arc<dyn CanBus>> {
    let bus = ecub_can::socketcan::SocketCanBus::open(device)
        .with_context(|| format!("failed to open CAN device {device}"))?;
    Ok(Arc::new(bus))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn open_can_bus(device: &str) -> Result<Arc<dyn CanBus>> {
    warn!(device, "SocketCAN support not compiled in, using mock CAN bus");
    Ok(Arc::new(ecub_can::mock::MockCanBus::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = level_filter(args.log)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let variant: EcuVariant = args
        .ecu_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        ecu_type = variant.as_str(),
        "ecubd starting"
    );

    // The store binding is external to this build; the in-process store
    // keeps the daemon runnable without one.
    warn!(
        server = %args.redis_server,
        port = args.redis_port,
        "no external store binding compiled in, using in-process store"
    );
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

    let bus = open_can_bus(&args.can_device)?;

    let battery = Arc::new(BatteryMonitor::new());
    let writer = Arc::new(StatusWriter::new(kv.clone()));
    let ecu = Arc::new(EcuAdapter::new(variant, bus.clone()));
    let kers = KersSupervisor::new(writer.clone(), ecu.clone());
    let bridge = Bridge::new(ecu.clone(), writer, kers.clone(), kv.clone());

    bridge.write_default_state().await;

    let subscriptions =
        IpcSubscriptions::start(kv.clone(), battery, kers, ecu.clone()).await;

    bridge.start(bus);
    bridge.start_health_task();

    info!("ecubd running");
    wait_for_shutdown().await?;
    info!("shutting down");

    subscriptions.shutdown();
    bridge.shutdown();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
