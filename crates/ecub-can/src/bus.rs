//! Frame source/sink trait

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{CanBusError, CanFrame};

/// Transport-agnostic CAN bus.
///
/// Implementations fan received frames out over a broadcast channel; frames
/// arrive in bus order on every receiver.
#[async_trait]
pub trait CanBus: Send + Sync {
    /// Send a frame on the bus.
    async fn publish(&self, frame: CanFrame) -> Result<(), CanBusError>;

    /// Subscribe to received frames.
    fn frames(&self) -> broadcast::Receiver<CanFrame>;
}
