//! CAN transport errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CanBusError {
    #[error("failed to open CAN device: {0}")]
    Open(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("bus closed")]
    Closed,
}
