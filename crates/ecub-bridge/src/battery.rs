//! Battery pack aggregation

use ecub_core::{BatteryPackState, BatteryTemperatureState, BATTERY_COUNT};
use parking_lot::RwLock;
use tracing::warn;

/// Holds the per-pack state and derives the thermal state of the active
/// pack.
#[derive(Default)]
pub struct BatteryMonitor {
    packs: RwLock<[BatteryPackState; BATTERY_COUNT]>,
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one pack's state. Out-of-range indices are dropped.
    pub fn update(&self, index: usize, state: BatteryPackState) {
        if index >= BATTERY_COUNT {
            warn!(index, packs = BATTERY_COUNT, "invalid battery index");
            return;
        }
        self.packs.write()[index] = state;
    }

    /// Thermal state of the single active pack.
    ///
    /// With no pack active, or more than one, there is no trustworthy
    /// answer; ambiguity reads as Unknown rather than a guess.
    pub fn active_thermal(&self) -> BatteryTemperatureState {
        let packs = self.packs.read();
        let mut active = packs.iter().filter(|p| p.active);
        match (active.next(), active.next()) {
            (Some(pack), None) => pack.thermal,
            _ => BatteryTemperatureState::Unknown,
        }
    }
}
