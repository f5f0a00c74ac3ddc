//! KV + pub/sub collaborator contract
//!
//! The bridge publishes its state into a key-value store with hashes, sets
//! and bounded streams, and exchanges notifications over pub/sub channels.
//! The reference deployment binds this to a Redis-compatible store; the
//! bridge itself only ever sees this trait.

mod memory;

pub use memory::MemoryKvStore;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::IpcError;

/// Abstract KV + pub/sub collaborator.
///
/// Subscriptions are broadcast receivers carrying the raw message payload;
/// a receiver observing `RecvError::Closed` means the backing client
/// connection is gone.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set one or more fields of a hash key.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), IpcError>;

    /// Read a single field of a hash key. `None` when key or field is absent.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, IpcError>;

    /// Publish a payload on a channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), IpcError>;

    /// Subscribe to a channel.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;

    /// Append an entry to a stream, trimming it to at most `maxlen` entries.
    async fn xadd(
        &self,
        stream: &str,
        maxlen: usize,
        fields: &[(&str, String)],
    ) -> Result<(), IpcError>;

    /// Add a member to a set.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), IpcError>;

    /// Remove a member from a set.
    async fn srem(&self, key: &str, member: &str) -> Result<(), IpcError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), IpcError>;
}
