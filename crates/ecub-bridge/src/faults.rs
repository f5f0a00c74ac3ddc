//! Fault reporting pipeline
//!
//! Mirrors the controller's active fault set into the collaborator: a set of
//! numeric codes, a bounded event stream, and a notification channel. The
//! per-episode timer pair is decided here and driven by the coordinator:
//! the update-request timer keeps asking a latched controller for fresh
//! status, the force-clear timer catches a controller that cleared silently.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ecub_core::{Fault, IpcError, KvStore};
use tracing::{info, warn};

const FAULT_SET_KEY: &str = "engine-ecu:fault";
const FAULT_STREAM: &str = "events:faults";
const FAULT_STREAM_MAXLEN: usize = 1000;
const FAULT_CHANNEL: &str = "engine-ecu";
const FAULT_GROUP: &str = "engine-ecu";

/// Ask the controller to retransmit status this long after the last fault
/// observation. Refreshed while the fault persists.
pub(crate) const UPDATE_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Drop a fault episode this long after it began, regardless of updates.
pub(crate) const FORCE_CLEAR_DELAY: Duration = Duration::from_secs(5);

/// What the recovery timers should do after a fault-set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerAction {
    None,
    StartBoth,
    StopBoth,
    RefreshUpdate,
}

/// Timer decision for a transition of the has-fault flag.
pub(crate) fn timer_transition(had_fault: bool, has_fault: bool) -> TimerAction {
    match (had_fault, has_fault) {
        (false, false) => TimerAction::None,
        (false, true) => TimerAction::StartBoth,
        (true, false) => TimerAction::StopBoth,
        (true, true) => TimerAction::RefreshUpdate,
    }
}

/// Tracks the published fault set and emits the per-transition records.
pub(crate) struct FaultTracker {
    kv: Arc<dyn KvStore>,
    active: BTreeSet<Fault>,
}

impl FaultTracker {
    pub(crate) fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            active: BTreeSet::new(),
        }
    }

    /// Reconcile the published state with the controller's current fault
    /// set and return what the recovery timers should do.
    pub(crate) async fn update(&mut self, current: &BTreeSet<Fault>) -> TimerAction {
        let action = timer_transition(!self.active.is_empty(), !current.is_empty());

        let mut changed = false;
        for fault in current.difference(&self.active) {
            changed = true;
            info!(
                code = fault.code(),
                description = fault.description(),
                severity = ?fault.severity(),
                "fault set"
            );
            if let Err(e) = self.report_set(*fault).await {
                warn!(?e, "failed to report fault set");
            }
        }
        for fault in self.active.difference(current) {
            changed = true;
            info!(code = fault.code(), "fault cleared");
            if let Err(e) = self.report_cleared(*fault).await {
                warn!(?e, "failed to report fault clear");
            }
        }

        if changed {
            self.active = current.clone();
            if let Err(e) = self.kv.publish(FAULT_CHANNEL, "fault").await {
                warn!(?e, "failed to publish fault notification");
            }
        }

        action
    }

    /// Drop every active fault, emitting the same records a controller-side
    /// clear would.
    pub(crate) async fn force_clear(&mut self) -> TimerAction {
        self.update(&BTreeSet::new()).await
    }

    async fn report_set(&self, fault: Fault) -> Result<(), IpcError> {
        self.kv
            .sadd(FAULT_SET_KEY, &fault.code().to_string())
            .await?;
        self.kv
            .xadd(
                FAULT_STREAM,
                FAULT_STREAM_MAXLEN,
                &[
                    ("group", FAULT_GROUP.to_string()),
                    ("code", fault.code().to_string()),
                    ("description", fault.description().to_string()),
                ],
            )
            .await
    }

    async fn report_cleared(&self, fault: Fault) -> Result<(), IpcError> {
        self.kv
            .srem(FAULT_SET_KEY, &fault.code().to_string())
            .await?;
        self.kv
            .xadd(
                FAULT_STREAM,
                FAULT_STREAM_MAXLEN,
                &[
                    ("group", FAULT_GROUP.to_string()),
                    ("code", (-i64::from(fault.code())).to_string()),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecub_core::MemoryKvStore;

    fn entry_field(entry: &[(String, String)], field: &str) -> Option<String> {
        entry
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn transition_table() {
        assert_eq!(timer_transition(false, false), TimerAction::None);
        assert_eq!(timer_transition(false, true), TimerAction::StartBoth);
        assert_eq!(timer_transition(true, false), TimerAction::StopBoth);
        assert_eq!(timer_transition(true, true), TimerAction::RefreshUpdate);
    }

    #[tokio::test]
    async fn setting_a_fault_publishes_set_stream_and_notification() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut tracker = FaultTracker::new(kv.clone());

        let faults = BTreeSet::from([Fault::MotorShortCircuit]);
        let action = tracker.update(&faults).await;

        assert_eq!(action, TimerAction::StartBoth);
        assert_eq!(kv.set_members("engine-ecu:fault"), vec!["3".to_string()]);

        let entries = kv.stream_entries("events:faults");
        assert_eq!(entries.len(), 1);
        assert_eq!(entry_field(&entries[0], "group").unwrap(), "engine-ecu");
        assert_eq!(entry_field(&entries[0], "code").unwrap(), "3");
        assert_eq!(
            entry_field(&entries[0], "description").unwrap(),
            "Motor short-circuit"
        );
        assert_eq!(
            kv.published(),
            vec![("engine-ecu".to_string(), "fault".to_string())]
        );
    }

    #[tokio::test]
    async fn clearing_negates_the_code() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut tracker = FaultTracker::new(kv.clone());

        tracker
            .update(&BTreeSet::from([Fault::MotorShortCircuit]))
            .await;
        let action = tracker.update(&BTreeSet::new()).await;

        assert_eq!(action, TimerAction::StopBoth);
        assert!(kv.set_members("engine-ecu:fault").is_empty());

        let entries = kv.stream_entries("events:faults");
        assert_eq!(entries.len(), 2);
        assert_eq!(entry_field(&entries[1], "code").unwrap(), "-3");
        assert_eq!(entry_field(&entries[1], "description"), None);
        assert_eq!(kv.published().len(), 2);
    }

    #[tokio::test]
    async fn unchanged_fault_set_refreshes_without_records() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut tracker = FaultTracker::new(kv.clone());

        let faults = BTreeSet::from([Fault::OverTemperature]);
        tracker.update(&faults).await;
        let action = tracker.update(&faults).await;

        assert_eq!(action, TimerAction::RefreshUpdate);
        assert_eq!(kv.stream_entries("events:faults").len(), 1);
        assert_eq!(kv.published().len(), 1);
    }

    #[tokio::test]
    async fn fault_swap_records_both_edges() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut tracker = FaultTracker::new(kv.clone());

        tracker.update(&BTreeSet::from([Fault::MotorStalled])).await;
        tracker
            .update(&BTreeSet::from([Fault::HallSensorAbnormal]))
            .await;

        assert_eq!(kv.set_members("engine-ecu:fault"), vec!["5".to_string()]);
        let entries = kv.stream_entries("events:faults");
        assert_eq!(entries.len(), 3);
        assert_eq!(entry_field(&entries[1], "code").unwrap(), "5");
        assert_eq!(entry_field(&entries[2], "code").unwrap(), "-4");
    }
}
