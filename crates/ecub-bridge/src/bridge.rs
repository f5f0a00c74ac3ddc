//! Top-level coordinator
//!
//! Owns the frame ingress: every received frame goes through the active
//! driver, the resulting snapshot is pushed to the collaborator as status
//! groups, and the fault pipeline and KERS supervisor are fed from it.

use std::sync::Arc;
use std::time::Duration;

use ecub_can::{CanBus, CanFrame};
use ecub_core::KvStore;
use ecub_ecu::{EcuAdapter, EcuSnapshot};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::faults::{FaultTracker, TimerAction, FORCE_CLEAR_DELAY, UPDATE_REQUEST_DELAY};
use crate::kers::KersSupervisor;
use crate::status::{Status1, Status2, Status3, Status4, Status5, StatusWriter};

const HEALTH_PERIOD: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

struct BridgeState {
    last_speed: u16,
    faults: FaultTracker,
    last_reported_kers: Option<bool>,
}

pub struct Bridge {
    ecu: Arc<EcuAdapter>,
    writer: Arc<StatusWriter>,
    kers: Arc<KersSupervisor>,
    kv: Arc<dyn KvStore>,
    state: Mutex<BridgeState>,
    update_timer: SyncMutex<Option<JoinHandle<()>>>,
    clear_timer: SyncMutex<Option<JoinHandle<()>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(
        ecu: Arc<EcuAdapter>,
        writer: Arc<StatusWriter>,
        kers: Arc<KersSupervisor>,
        kv: Arc<dyn KvStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ecu,
            writer,
            kers,
            kv: kv.clone(),
            state: Mutex::new(BridgeState {
                last_speed: 0,
                faults: FaultTracker::new(kv),
                last_reported_kers: None,
            }),
            update_timer: SyncMutex::new(None),
            clear_timer: SyncMutex::new(None),
            tasks: SyncMutex::new(Vec::new()),
        })
    }

    /// Write zeroed status groups so observers never read values left over
    /// from a previous run.
    pub async fn write_default_state(&self) {
        let results = [
            self.writer.send_status1(&Status1::default()).await,
            self.writer.send_status2(&Status2::default()).await,
            self.writer.send_status3(&Status3::default()).await,
            self.writer.send_status4(&Status4::default()).await,
        ];
        for result in results {
            if let Err(e) = result {
                error!(?e, "failed to write default state");
            }
        }
        info!("default state written");
    }

    /// Start consuming frames from the bus.
    pub fn start(self: &Arc<Self>, bus: Arc<dyn CanBus>) {
        let bridge = Arc::clone(self);
        let mut frames = bus.frames();
        let handle = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => bridge.on_frame(&frame).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "CAN ingress lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("CAN frame channel closed");
                        break;
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Periodically verify the collaborator is reachable. Failures are
    /// logged, never fatal.
    pub fn start_health_task(self: &Arc<Self>) {
        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEALTH_PERIOD).await;
                match tokio::time::timeout(HEALTH_TIMEOUT, bridge.kv.ping()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(?e, "store health check failed"),
                    Err(_) => warn!("store health check timed out"),
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Process one received frame end to end.
    pub async fn on_frame(self: &Arc<Self>, frame: &CanFrame) {
        self.ecu.handle_frame(frame);
        let snap = self.ecu.snapshot();

        let kers_changed;
        {
            let mut state = self.state.lock().await;
            self.push_status(&mut state, &snap).await;
            let action = state.faults.update(&snap.active_faults).await;
            kers_changed = state.last_reported_kers != Some(snap.kers_enabled);
            state.last_reported_kers = Some(snap.kers_enabled);
            drop(state);
            self.apply_timer_action(action);
        }

        self.kers.on_vehicle_stopped(snap.stopped()).await;
        if kers_changed {
            self.kers.on_ecu_kers_reported(snap.kers_enabled).await;
        }
    }

    async fn push_status(&self, state: &mut BridgeState, snap: &EcuSnapshot) {
        if snap.speed_kph != state.last_speed {
            match self.writer.send_status1(&Status1::from_snapshot(snap)).await {
                Ok(()) => state.last_speed = snap.speed_kph,
                Err(e) => error!(?e, "failed to send status1"),
            }
        }

        if let Err(e) = self.writer.send_status2(&Status2::from_snapshot(snap)).await {
            error!(?e, "failed to send status2");
        }
        if let Err(e) = self
            .writer
            .send_status3(&Status3 {
                odometer_m: snap.odometer_m,
            })
            .await
        {
            error!(?e, "failed to send status3");
        }
        if let Err(e) = self
            .writer
            .send_status4(&Status4 {
                kers_on: snap.kers_enabled,
                boost_on: snap.boost_enabled,
            })
            .await
        {
            error!(?e, "failed to send status4");
        }
        if let Err(e) = self
            .writer
            .send_status5(&Status5 {
                gear: snap.gear,
                firmware_version: snap.firmware_version,
            })
            .await
        {
            error!(?e, "failed to send status5");
        }
    }

    fn apply_timer_action(self: &Arc<Self>, action: TimerAction) {
        match action {
            TimerAction::None => {}
            TimerAction::StartBoth => {
                self.arm_update_timer();
                self.arm_clear_timer();
            }
            TimerAction::RefreshUpdate => self.arm_update_timer(),
            TimerAction::StopBoth => self.stop_fault_timers(),
        }
    }

    fn arm_update_timer(self: &Arc<Self>) {
        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(UPDATE_REQUEST_DELAY).await;
            debug!("fault still latched, requesting status retransmit");
            if let Err(e) = bridge.ecu.request_status_update().await {
                error!(?e, "failed to request status update");
            }
        });
        if let Some(old) = self.update_timer.lock().replace(handle) {
            old.abort();
        }
    }

    fn arm_clear_timer(self: &Arc<Self>) {
        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(FORCE_CLEAR_DELAY).await;
            warn!("fault updates ceased, force-clearing active faults");
            bridge.ecu.clear_faults();
            {
                let mut state = bridge.state.lock().await;
                state.faults.force_clear().await;
            }
            if let Some(handle) = bridge.update_timer.lock().take() {
                handle.abort();
            }
            // This task's own handle is just dropped.
            bridge.clear_timer.lock().take();
        });
        if let Some(old) = self.clear_timer.lock().replace(handle) {
            old.abort();
        }
    }

    fn stop_fault_timers(&self) {
        if let Some(handle) = self.update_timer.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.clear_timer.lock().take() {
            handle.abort();
        }
    }

    /// Stop every task owned by the coordinator. Safe to call more than
    /// once.
    pub fn shutdown(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.stop_fault_timers();
        self.kers.shutdown();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
