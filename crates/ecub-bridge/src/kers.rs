//! KERS supervision
//!
//! Event-driven state machine deciding whether regenerative braking may be
//! engaged. Inputs are the active pack's thermal state, the vehicle
//! readiness, and whether the vehicle is stopped; the single output is the
//! driver's KERS command.
//!
//! The state lock is held across the whole evaluation, including the
//! outbound reason-off publish and bus command, so those never interleave
//! between events. Collaborators must not call back into this type.

use std::sync::Arc;
use std::time::Duration;

use ecub_core::{BatteryTemperatureState, KersReason, VehicleReadiness};
use ecub_ecu::EcuAdapter;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::status::StatusWriter;

/// Wait after "ready to drive" before the first KERS command; the
/// controller ignores commands sent while it is still powering up.
const ENGINE_ON_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug)]
struct KersState {
    thermal: BatteryTemperatureState,
    reason: KersReason,
    stopped: bool,
    readiness: VehicleReadiness,
    /// True once the engine-on delay has elapsed for the current Ready
    /// period. Commands are held back until then.
    engine_confirmed: bool,
}

impl Default for KersState {
    fn default() -> Self {
        Self {
            thermal: BatteryTemperatureState::Unknown,
            reason: KersReason::None,
            stopped: true,
            readiness: VehicleReadiness::NotReady,
            engine_confirmed: false,
        }
    }
}

pub struct KersSupervisor {
    state: Mutex<KersState>,
    writer: Arc<StatusWriter>,
    ecu: Arc<EcuAdapter>,
    engine_on_timer: SyncMutex<Option<JoinHandle<()>>>,
}

impl KersSupervisor {
    pub fn new(writer: Arc<StatusWriter>, ecu: Arc<EcuAdapter>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(KersState::default()),
            writer,
            ecu,
            engine_on_timer: SyncMutex::new(None),
        })
    }

    /// Active pack thermal state changed (or was re-read).
    pub async fn on_battery(&self, thermal: BatteryTemperatureState) {
        let mut state = self.state.lock().await;
        if state.thermal == thermal {
            return;
        }
        state.thermal = thermal;
        info!(thermal = thermal.as_str(), "battery temperature-state updated");
        self.evaluate(&mut state).await;
    }

    /// Vehicle readiness notification from the vehicle hash.
    pub async fn on_vehicle_state(self: &Arc<Self>, readiness: VehicleReadiness) {
        let mut state = self.state.lock().await;
        let changed = state.readiness != readiness;
        state.readiness = readiness;

        match readiness {
            VehicleReadiness::NotReady => {
                state.engine_confirmed = false;
                self.cancel_engine_on_timer();
            }
            VehicleReadiness::Ready if changed => {
                info!(
                    delay_ms = ENGINE_ON_DELAY.as_millis() as u64,
                    "ready to drive, awaiting engine on"
                );
                state.engine_confirmed = false;
                self.cancel_engine_on_timer();
                self.arm_engine_on_timer();
            }
            // A repeated Ready leaves a pending arm running.
            VehicleReadiness::Ready => {}
        }

        self.evaluate(&mut state).await;
    }

    /// Stopped/moving transition derived from the normalized speed.
    pub async fn on_vehicle_stopped(&self, stopped: bool) {
        let mut state = self.state.lock().await;
        if state.stopped == stopped {
            return;
        }
        state.stopped = stopped;
        if stopped {
            debug!("vehicle stopped, updating KERS");
            self.evaluate(&mut state).await;
        }
    }

    /// The controller reported its KERS mode over the bus. If it claims to
    /// be regenerating while the current reason says it must not, push the
    /// decision again.
    pub async fn on_ecu_kers_reported(&self, active: bool) {
        let mut state = self.state.lock().await;
        if active && state.reason != KersReason::None {
            info!(
                reason = state.reason.as_str(),
                "controller KERS active despite hold-off, updating"
            );
            self.evaluate(&mut state).await;
        }
    }

    async fn evaluate(&self, state: &mut KersState) {
        let Some(reason) = KersReason::from_thermal(state.thermal) else {
            debug!("battery thermal state unknown, nothing to decide");
            return;
        };
        state.reason = reason;

        if let Err(e) = self.writer.send_kers_reason_off(reason).await {
            error!(?e, "failed to send KERS reason");
        }

        // Never change KERS while the vehicle is moving.
        if !state.stopped {
            debug!("vehicle moving, leaving KERS as is");
            return;
        }

        if state.readiness == VehicleReadiness::Ready && state.engine_confirmed {
            let enable = reason == KersReason::None;
            debug!(enable, reason = reason.as_str(), "commanding controller KERS");
            if let Err(e) = self.ecu.set_kers_enabled(enable).await {
                error!(?e, "failed to set KERS");
            }
        } else {
            debug!("engine not on yet, not commanding KERS");
        }
    }

    fn arm_engine_on_timer(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ENGINE_ON_DELAY).await;
            let mut state = supervisor.state.lock().await;
            info!("engine on, updating KERS");
            state.engine_confirmed = true;
            supervisor.evaluate(&mut state).await;
        });

        if let Some(old) = self.engine_on_timer.lock().replace(handle) {
            old.abort();
        }
    }

    fn cancel_engine_on_timer(&self) {
        if let Some(handle) = self.engine_on_timer.lock().take() {
            handle.abort();
        }
    }

    /// Stop the engine-on timer. Safe to call more than once.
    pub fn shutdown(&self) {
        self.cancel_engine_on_timer();
    }
}

impl Drop for KersSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.engine_on_timer.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecub_can::mock::MockCanBus;
    use ecub_core::MemoryKvStore;
    use ecub_ecu::EcuVariant;

    struct Fixture {
        kers: Arc<KersSupervisor>,
        bus: Arc<MockCanBus>,
        kv: Arc<MemoryKvStore>,
    }

    fn fixture() -> Fixture {
        let kv = Arc::new(MemoryKvStore::new());
        let bus = Arc::new(MockCanBus::new());
        let writer = Arc::new(StatusWriter::new(kv.clone()));
        let ecu = Arc::new(EcuAdapter::new(EcuVariant::Bosch, bus.clone()));
        let kers = KersSupervisor::new(writer, ecu);
        Fixture { kers, bus, kv }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_transition_commands_kers_only_after_the_delay() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Ideal).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;

        tokio::time::advance(Duration::from_millis(1499)).await;
        settle().await;
        assert!(f.bus.sent().is_empty(), "commanded before the delay elapsed");

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;

        let sent = f.bus.sent();
        assert_eq!(sent.len(), 2, "expected setpoint + control");
        assert_eq!(sent[0].id, 0x4E2);
        assert_eq!(sent[1].id, 0x4E0);
        assert_eq!(sent[1].data(), &[0x05]);

        // No further commands without new events.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(f.bus.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_commands_while_moving() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Ideal).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        f.bus.take_sent();

        f.kers.on_vehicle_stopped(false).await;
        f.kers.on_battery(BatteryTemperatureState::Hot).await;
        f.kers.on_battery(BatteryTemperatureState::Cold).await;
        settle().await;

        assert!(f.bus.sent().is_empty());

        // Stopping applies the most recent decision.
        f.kers.on_vehicle_stopped(true).await;
        settle().await;
        let sent = f.bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data(), &[0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_battery_holds_kers_off() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Ideal).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        f.bus.take_sent();

        f.kers.on_battery(BatteryTemperatureState::Cold).await;

        assert_eq!(
            f.kv.hash_field("engine-ecu", "kers-reason-off").unwrap(),
            "cold"
        );
        let sent = f.bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, 0x4E0);
        assert_eq!(sent[0].data(), &[0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_thermal_state_decides_nothing() {
        let f = fixture();
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        assert!(f.bus.sent().is_empty());
        assert_eq!(f.kv.hash_field("engine-ecu", "kers-reason-off"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_ready_does_not_postpone_the_pending_arm() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Ideal).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;

        tokio::time::advance(Duration::from_millis(501)).await;
        settle().await;
        assert_eq!(f.bus.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_cancels_the_pending_arm() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Ideal).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;
        f.kers.on_vehicle_state(VehicleReadiness::NotReady).await;

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(f.bus.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bus_reported_kers_against_holdoff_reasserts_disable() {
        let f = fixture();
        f.kers.on_battery(BatteryTemperatureState::Cold).await;
        f.kers.on_vehicle_state(VehicleReadiness::Ready).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        f.bus.take_sent();

        f.kers.on_ecu_kers_reported(true).await;

        let sent = f.bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data(), &[0x01]);
    }
}
