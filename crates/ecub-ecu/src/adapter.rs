//! Variant dispatch

use std::str::FromStr;
use std::sync::Arc;

use ecub_can::{CanBus, CanFrame};
use serde::{Deserialize, Serialize};

use crate::state::EcuSnapshot;
use crate::{BoschEcu, EcuError, VotolEcu};

/// Supported motor controller variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcuVariant {
    Bosch,
    Votol,
}

impl EcuVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            EcuVariant::Bosch => "bosch",
            EcuVariant::Votol => "votol",
        }
    }
}

impl FromStr for EcuVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bosch" => Ok(EcuVariant::Bosch),
            "votol" => Ok(EcuVariant::Votol),
            other => Err(format!("unknown ECU type '{other}' (must be 'bosch' or 'votol')")),
        }
    }
}

/// The active protocol driver. Variants form a closed set.
pub enum EcuAdapter {
    Bosch(BoschEcu),
    Votol(VotolEcu),
}

impl EcuAdapter {
    pub fn new(variant: EcuVariant, bus: Arc<dyn CanBus>) -> Self {
        match variant {
            EcuVariant::Bosch => EcuAdapter::Bosch(BoschEcu::new(bus)),
            EcuVariant::Votol => EcuAdapter::Votol(VotolEcu::new()),
        }
    }

    pub fn variant(&self) -> EcuVariant {
        match self {
            EcuAdapter::Bosch(_) => EcuVariant::Bosch,
            EcuAdapter::Votol(_) => EcuVariant::Votol,
        }
    }

    /// Route a received frame to the active driver.
    pub fn handle_frame(&self, frame: &CanFrame) {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.handle_frame(frame),
            EcuAdapter::Votol(ecu) => ecu.handle_frame(frame),
        }
    }

    pub async fn set_kers_enabled(&self, enable: bool) -> Result<(), EcuError> {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.set_kers_enabled(enable).await,
            EcuAdapter::Votol(ecu) => ecu.set_kers_enabled(enable),
        }
    }

    pub fn set_boost_enabled(&self, enable: bool) {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.set_boost_enabled(enable),
            EcuAdapter::Votol(ecu) => ecu.set_boost_enabled(enable),
        }
    }

    pub async fn request_status_update(&self) -> Result<(), EcuError> {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.request_status_update().await,
            EcuAdapter::Votol(ecu) => ecu.request_status_update(),
        }
    }

    pub fn is_stale(&self) -> bool {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.is_stale(),
            EcuAdapter::Votol(ecu) => ecu.is_stale(),
        }
    }

    pub fn snapshot(&self) -> EcuSnapshot {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.snapshot(),
            EcuAdapter::Votol(ecu) => ecu.snapshot(),
        }
    }

    /// Drop all active faults from the local view, keeping the rest of the
    /// state intact.
    pub fn clear_faults(&self) {
        match self {
            EcuAdapter::Bosch(ecu) => ecu.clear_faults(),
            EcuAdapter::Votol(ecu) => ecu.clear_faults(),
        }
    }
}
