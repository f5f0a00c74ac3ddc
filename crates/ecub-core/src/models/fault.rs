//! Unified motor-controller fault taxonomy
//!
//! Both supported controller variants report faults in their own encoding:
//! Bosch as a single integer code, Votol as a bitmap. Everything downstream
//! of the drivers works on this unified enum, so the mapping tables live
//! here next to the severity/description catalog.

use serde::{Deserialize, Serialize};

/// A motor-controller fault, normalized across controller variants.
///
/// Discriminants are the wire-visible fault codes published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Fault {
    BatteryOverVoltage = 1,
    BatteryUnderVoltage = 2,
    MotorShortCircuit = 3,
    MotorStalled = 4,
    HallSensorAbnormal = 5,
    MosfetCheckError = 6,
    MotorOpenCircuit = 7,
    Reserved8 = 8,
    Reserved9 = 9,
    PowerOnSelfCheckError = 10,
    OverTemperature = 11,
    ThrottleAbnormal = 12,
    MotorTemperatureProtection = 13,
    ThrottleActiveAtPowerUp = 14,
    BrakingActive = 15,
    Internal15vAbnormal = 16,
}

/// Fault severity, as exposed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultSeverity {
    Warning,
    Critical,
}

impl Fault {
    /// The numeric code published to the KV store and the fault stream.
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn description(self) -> &'static str {
        match self {
            Fault::BatteryOverVoltage => "Battery over-voltage",
            Fault::BatteryUnderVoltage => "Battery under-voltage",
            Fault::MotorShortCircuit => "Motor short-circuit",
            Fault::MotorStalled => "Motor stalled",
            Fault::HallSensorAbnormal => "Hall sensor abnormal",
            Fault::MosfetCheckError => "MOSFET check error",
            Fault::MotorOpenCircuit => "Motor open-circuit",
            Fault::Reserved8 | Fault::Reserved9 => "Reserved",
            Fault::PowerOnSelfCheckError => "Power-on self-check error",
            Fault::OverTemperature => "Over-temperature",
            Fault::ThrottleAbnormal => "Throttle abnormal",
            Fault::MotorTemperatureProtection => "Motor temperature protection",
            Fault::ThrottleActiveAtPowerUp => "Throttle active at power up",
            Fault::BrakingActive => "Braking active",
            Fault::Internal15vAbnormal => "Internal 15V abnormal",
        }
    }

    pub fn severity(self) -> FaultSeverity {
        match self {
            Fault::ThrottleActiveAtPowerUp | Fault::MotorTemperatureProtection => {
                FaultSeverity::Warning
            }
            _ => FaultSeverity::Critical,
        }
    }

    /// Map a Bosch fault code. Unknown codes carry no unified fault.
    pub fn from_bosch_code(code: u32) -> Option<Fault> {
        match code {
            0x01 => Some(Fault::BatteryOverVoltage),
            0x02 => Some(Fault::BatteryUnderVoltage),
            0x03 => Some(Fault::MotorShortCircuit),
            0x04 => Some(Fault::MotorStalled),
            0x05 => Some(Fault::HallSensorAbnormal),
            0x06 => Some(Fault::MosfetCheckError),
            0x07 => Some(Fault::MotorOpenCircuit),
            0x0A => Some(Fault::PowerOnSelfCheckError),
            0x0B => Some(Fault::OverTemperature),
            0x0C => Some(Fault::ThrottleAbnormal),
            0x0D => Some(Fault::MotorTemperatureProtection),
            0x0E => Some(Fault::ThrottleActiveAtPowerUp),
            0x10 => Some(Fault::Internal15vAbnormal),
            _ => None,
        }
    }

    /// Map a single Votol fault bit (`1 << n`). Unknown bits carry no
    /// unified fault.
    pub fn from_votol_bit(bit: u32) -> Option<Fault> {
        match bit {
            0x01 => Some(Fault::MotorStalled),
            0x02 => Some(Fault::HallSensorAbnormal),
            0x04 => Some(Fault::ThrottleAbnormal),
            0x08 => Some(Fault::PowerOnSelfCheckError),
            0x10 => Some(Fault::BrakingActive),
            0x20 => Some(Fault::OverTemperature),
            0x40 => Some(Fault::Internal15vAbnormal),
            _ => None,
        }
    }
}
