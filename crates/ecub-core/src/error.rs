//! Common error types for collaborator bindings

use thiserror::Error;

/// Errors surfaced by the KV+PubSub collaborator
#[derive(Debug, Error, Clone)]
pub enum IpcError {
    /// The underlying client connection is gone. On the read path this is
    /// escalated to process termination so a supervisor restarts the service.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("store error: {0}")]
    Store(String),

    #[error("operation timed out")]
    Timeout,
}
