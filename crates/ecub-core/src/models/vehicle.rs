//! Vehicle readiness and KERS gating reasons

use serde::{Deserialize, Serialize};

use super::BatteryTemperatureState;

/// Whether the vehicle reports itself ready to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleReadiness {
    #[default]
    NotReady,
    Ready,
}

impl VehicleReadiness {
    /// Parse the `state` field of the vehicle hash. Only the literal
    /// `ready-to-drive` maps to Ready.
    pub fn from_label(label: &str) -> Self {
        if label == "ready-to-drive" {
            VehicleReadiness::Ready
        } else {
            VehicleReadiness::NotReady
        }
    }
}

/// Why regenerative braking is (or is not) held off.
///
/// `None` means KERS may engage; it corresponds to an ideal battery thermal
/// state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KersReason {
    #[default]
    None,
    Cold,
    Hot,
}

impl KersReason {
    /// Derive the hold-off reason from the active pack's thermal state.
    /// An unknown thermal state yields no decision at all.
    pub fn from_thermal(thermal: BatteryTemperatureState) -> Option<KersReason> {
        match thermal {
            BatteryTemperatureState::Cold => Some(KersReason::Cold),
            BatteryTemperatureState::Hot => Some(KersReason::Hot),
            BatteryTemperatureState::Ideal => Some(KersReason::None),
            BatteryTemperatureState::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KersReason::None => "none",
            KersReason::Cold => "cold",
            KersReason::Hot => "hot",
        }
    }
}
