//! Inbound collaborator subscriptions
//!
//! One long-lived task per subscription: the vehicle channel, one channel
//! per battery pack, and the boost side-channel. Notifications are bare;
//! the current values are re-read from the corresponding hash.
//!
//! A closed subscription stream means the client connection is gone; that
//! is escalated to process termination so a supervisor restarts the
//! service with a fresh connection.

use std::sync::Arc;

use ecub_core::{
    BatteryPackState, BatteryTemperatureState, IpcError, KvStore, VehicleReadiness, BATTERY_COUNT,
};
use ecub_ecu::EcuAdapter;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::battery::BatteryMonitor;
use crate::kers::KersSupervisor;

const VEHICLE_KEY: &str = "vehicle";
const VEHICLE_CHANNEL: &str = "vehicle";
const BOOST_CHANNEL: &str = "engine-ecu settings boost";

/// Handles to the running subscription tasks.
pub struct IpcSubscriptions {
    handles: SyncMutex<Vec<JoinHandle<()>>>,
}

impl IpcSubscriptions {
    /// Read the initial vehicle and battery states, then start the
    /// subscription tasks.
    pub async fn start(
        kv: Arc<dyn KvStore>,
        battery: Arc<BatteryMonitor>,
        kers: Arc<KersSupervisor>,
        ecu: Arc<EcuAdapter>,
    ) -> Self {
        read_initial_states(&kv, &battery, &kers).await;

        let mut handles = Vec::new();

        {
            let rx = kv.subscribe(VEHICLE_CHANNEL);
            let kv = kv.clone();
            let kers = kers.clone();
            handles.push(tokio::spawn(async move {
                vehicle_loop(rx, kv, kers).await;
            }));
        }

        for index in 0..BATTERY_COUNT {
            let rx = kv.subscribe(&battery_channel(index));
            let kv = kv.clone();
            let battery = battery.clone();
            let kers = kers.clone();
            handles.push(tokio::spawn(async move {
                battery_loop(index, rx, kv, battery, kers).await;
            }));
        }

        {
            let rx = kv.subscribe(BOOST_CHANNEL);
            handles.push(tokio::spawn(async move {
                boost_loop(rx, ecu).await;
            }));
        }

        Self {
            handles: SyncMutex::new(handles),
        }
    }

    /// Stop all subscription tasks. Safe to call more than once.
    pub fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for IpcSubscriptions {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn battery_channel(index: usize) -> String {
    format!("battery:{index}")
}

async fn read_initial_states(
    kv: &Arc<dyn KvStore>,
    battery: &Arc<BatteryMonitor>,
    kers: &Arc<KersSupervisor>,
) {
    match kv.hget(VEHICLE_KEY, "state").await {
        Ok(Some(state)) => {
            info!(state, "initial vehicle state");
            kers.on_vehicle_state(VehicleReadiness::from_label(&state))
                .await;
        }
        Ok(None) => {}
        Err(e) => error!(?e, "failed to read initial vehicle state"),
    }

    for index in 0..BATTERY_COUNT {
        match read_battery_pack(kv, index).await {
            Ok(state) => battery.update(index, state),
            Err(e) => error!(?e, index, "failed to read initial battery state"),
        }
    }
    kers.on_battery(battery.active_thermal()).await;
}

async fn read_battery_pack(
    kv: &Arc<dyn KvStore>,
    index: usize,
) -> Result<BatteryPackState, IpcError> {
    let key = battery_channel(index);
    let active = kv.hget(&key, "state").await?;
    let thermal = kv.hget(&key, "temperature-state").await?;
    Ok(BatteryPackState {
        active: active.as_deref() == Some("active"),
        thermal: thermal
            .as_deref()
            .map(BatteryTemperatureState::from_label)
            .unwrap_or_default(),
    })
}

async fn vehicle_loop(
    mut rx: broadcast::Receiver<String>,
    kv: Arc<dyn KvStore>,
    kers: Arc<KersSupervisor>,
) {
    debug!("vehicle subscription handler started");
    loop {
        match rx.recv().await {
            Ok(_) => {
                let state = match kv.hget(VEHICLE_KEY, "state").await {
                    Ok(Some(state)) => state,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(?e, "failed to read vehicle state");
                        continue;
                    }
                };
                info!(state, "vehicle state changed");
                kers.on_vehicle_state(VehicleReadiness::from_label(&state))
                    .await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "vehicle subscription lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                error!("vehicle subscription closed, terminating for restart");
                std::process::exit(1);
            }
        }
    }
}

async fn battery_loop(
    index: usize,
    mut rx: broadcast::Receiver<String>,
    kv: Arc<dyn KvStore>,
    battery: Arc<BatteryMonitor>,
    kers: Arc<KersSupervisor>,
) {
    debug!(index, "battery subscription handler started");
    loop {
        match rx.recv().await {
            Ok(_) => {
                match read_battery_pack(&kv, index).await {
                    Ok(state) => battery.update(index, state),
                    Err(e) => {
                        error!(?e, index, "failed to read battery state");
                        continue;
                    }
                }
                kers.on_battery(battery.active_thermal()).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, index, "battery subscription lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                error!(index, "battery subscription closed, terminating for restart");
                std::process::exit(1);
            }
        }
    }
}

async fn boost_loop(mut rx: broadcast::Receiver<String>, ecu: Arc<EcuAdapter>) {
    debug!("boost subscription handler started");
    loop {
        match rx.recv().await {
            Ok(payload) => {
                let enable = payload == "on";
                info!(enable, "boost setting changed");
                ecu.set_boost_enabled(enable);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "boost subscription lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                error!("boost subscription closed, terminating for restart");
                std::process::exit(1);
            }
        }
    }
}
