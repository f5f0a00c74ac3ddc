//! Normalized controller state

use std::collections::BTreeSet;
use std::time::Instant;

use ecub_core::Fault;
use serde::Serialize;

use crate::power::EnergyIntegrator;
use crate::speed::SpeedFilter;

/// Mutable driver state, guarded by the driver's lock. Every decoder takes
/// the write side for the span of one frame so observers always see a
/// consistent view.
#[derive(Debug, Default)]
pub(crate) struct EcuState {
    pub voltage_mv: i32,
    pub current_ma: i32,
    pub rpm: u16,
    pub speed_kph: u16,
    pub raw_speed: u16,
    pub temperature_c: i8,
    pub odometer_m: u32,
    pub gear: u8,
    pub firmware_version: u32,
    pub throttle_on: bool,
    pub kers_enabled: bool,
    pub boost_enabled: bool,
    pub active_faults: BTreeSet<Fault>,
    pub speed_filter: SpeedFilter,
    pub energy: EnergyIntegrator,
    pub last_frame: Option<Instant>,
}

impl EcuState {
    pub(crate) fn snapshot(&self) -> EcuSnapshot {
        EcuSnapshot {
            voltage_mv: self.voltage_mv,
            current_ma: self.current_ma,
            rpm: self.rpm,
            speed_kph: self.speed_kph,
            raw_speed: self.raw_speed,
            temperature_c: self.temperature_c,
            odometer_m: self.odometer_m,
            gear: self.gear,
            firmware_version: self.firmware_version,
            throttle_on: self.throttle_on,
            kers_enabled: self.kers_enabled,
            boost_enabled: self.boost_enabled,
            active_faults: self.active_faults.clone(),
            power_mw: self.energy.power_mw,
            energy_consumed_mwh: self.energy.consumed_mwh,
            energy_recovered_mwh: self.energy.recovered_mwh,
        }
    }
}

/// Consistent point-in-time view of the controller, taken under a single
/// lock acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EcuSnapshot {
    pub voltage_mv: i32,
    pub current_ma: i32,
    pub rpm: u16,
    pub speed_kph: u16,
    pub raw_speed: u16,
    pub temperature_c: i8,
    pub odometer_m: u32,
    /// 0 when the variant does not report gears.
    pub gear: u8,
    /// 0 when the variant does not report a firmware version.
    pub firmware_version: u32,
    pub throttle_on: bool,
    pub kers_enabled: bool,
    pub boost_enabled: bool,
    pub active_faults: BTreeSet<Fault>,
    pub power_mw: i64,
    pub energy_consumed_mwh: u64,
    pub energy_recovered_mwh: u64,
}

impl EcuSnapshot {
    pub fn stopped(&self) -> bool {
        self.speed_kph == 0
    }

    pub fn has_fault(&self) -> bool {
        !self.active_faults.is_empty()
    }

    /// First active fault in code order, if any. This is what the `fault:code`
    /// status field carries.
    pub fn primary_fault(&self) -> Option<Fault> {
        self.active_faults.iter().next().copied()
    }
}
