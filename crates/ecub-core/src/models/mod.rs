//! Shared data model for the ECU bridge

mod battery;
mod fault;
mod vehicle;

pub use battery::{BatteryPackState, BatteryTemperatureState, BATTERY_COUNT};
pub use fault::{Fault, FaultSeverity};
pub use vehicle::{KersReason, VehicleReadiness};
