//! Battery pack state model

use serde::{Deserialize, Serialize};

/// Number of battery packs in the vehicle.
pub const BATTERY_COUNT: usize = 2;

/// Thermal state of a battery pack, as reported over IPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryTemperatureState {
    #[default]
    Unknown,
    Cold,
    Hot,
    Ideal,
}

impl BatteryTemperatureState {
    /// Parse the `temperature-state` hash field. Anything unrecognized is
    /// Unknown.
    pub fn from_label(label: &str) -> Self {
        match label {
            "cold" => BatteryTemperatureState::Cold,
            "hot" => BatteryTemperatureState::Hot,
            "ideal" => BatteryTemperatureState::Ideal,
            _ => BatteryTemperatureState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatteryTemperatureState::Unknown => "unknown",
            BatteryTemperatureState::Cold => "cold",
            BatteryTemperatureState::Hot => "hot",
            BatteryTemperatureState::Ideal => "ideal",
        }
    }
}

/// Snapshot of a single battery pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryPackState {
    pub active: bool,
    pub thermal: BatteryTemperatureState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for state in [
            BatteryTemperatureState::Cold,
            BatteryTemperatureState::Hot,
            BatteryTemperatureState::Ideal,
        ] {
            assert_eq!(BatteryTemperatureState::from_label(state.as_str()), state);
        }
    }

    #[test]
    fn unrecognized_label_is_unknown() {
        assert_eq!(
            BatteryTemperatureState::from_label("lukewarm"),
            BatteryTemperatureState::Unknown
        );
        assert_eq!(
            BatteryTemperatureState::from_label(""),
            BatteryTemperatureState::Unknown
        );
    }
}
