//! ecub-bridge - Supervision and IPC layer of the ECU bridge
//!
//! Sits between the protocol drivers and the KV+PubSub collaborator: fans
//! decoded controller state out as status records, supervises regenerative
//! braking against battery temperature and vehicle readiness, and runs the
//! fault recovery pipeline.

mod battery;
mod bridge;
mod faults;
mod ipc_rx;
mod kers;
mod status;

pub use battery::BatteryMonitor;
pub use bridge::Bridge;
pub use ipc_rx::IpcSubscriptions;
pub use kers::KersSupervisor;
pub use status::{Status1, Status2, Status3, Status4, Status5, StatusWriter};
