//! Mock CAN bus for testing

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{CanBus, CanBusError, CanFrame};

/// Mock bus that records published frames and lets tests inject received
/// frames.
pub struct MockCanBus {
    sent: Mutex<Vec<CanFrame>>,
    incoming_tx: broadcast::Sender<CanFrame>,
    fail_publish: AtomicBool,
}

impl Default for MockCanBus {
    fn default() -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            sent: Mutex::new(Vec::new()),
            incoming_tx,
            fail_publish: AtomicBool::new(false),
        }
    }
}

impl MockCanBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a frame arriving from the bus.
    pub fn inject(&self, frame: CanFrame) {
        let _ = self.incoming_tx.send(frame);
    }

    /// Frames published so far, oldest first.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.sent.lock().clone()
    }

    /// Drain the published-frame log.
    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Make subsequent publishes fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CanBus for MockCanBus {
    async fn publish(&self, frame: CanFrame) -> Result<(), CanBusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(CanBusError::Send("mock failure".to_string()));
        }
        tracing::debug!(id = format!("0x{:X}", frame.id), len = frame.len, "mock bus: frame sent");
        self.sent.lock().push(frame);
        Ok(())
    }

    fn frames(&self) -> broadcast::Receiver<CanFrame> {
        self.incoming_tx.subscribe()
    }
}
