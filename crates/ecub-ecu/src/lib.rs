//! ecub-ecu - Motor controller protocol drivers
//!
//! Decodes the vendor-specific CAN status frames of the two supported motor
//! controllers into a normalized vehicle-state model, and encodes control
//! frames for the variant that supports them. The two variants are a closed
//! set, so dispatch is a tagged enum rather than a trait object.

mod adapter;
mod bosch;
mod power;
mod speed;
mod state;
mod votol;

pub use adapter::{EcuAdapter, EcuVariant};
pub use bosch::BoschEcu;
pub use state::EcuSnapshot;
pub use votol::VotolEcu;

use thiserror::Error;

/// Errors surfaced by driver commands.
#[derive(Debug, Error)]
pub enum EcuError {
    #[error("CAN publish failed: {0}")]
    Bus(#[from] ecub_can::CanBusError),
}
