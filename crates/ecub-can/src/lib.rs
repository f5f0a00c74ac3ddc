//! ecub-can - CAN frame transport for the ECU bridge
//!
//! This crate provides the frame value type, the `CanBus` trait used by the
//! protocol drivers, a mock bus for testing, and a raw SocketCAN adapter
//! (Linux only, behind the `socketcan` feature).

mod bus;
mod error;
mod frame;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use bus::CanBus;
pub use error::CanBusError;
pub use frame::{CanFrame, CAN_MAX_DATA};
