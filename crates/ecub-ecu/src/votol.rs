//! Votol motor controller driver
//!
//! Frames carry 29-bit extended identifiers and little-endian fields. The
//! controller accepts no commands from us; speed is derived from RPM since
//! the display frame is not observed in practice.

use std::time::Instant;

use ecub_can::CanFrame;
use ecub_core::Fault;
use parking_lot::RwLock;
use tracing::warn;

use crate::state::{EcuSnapshot, EcuState};
use crate::EcuError;

const CONTROLLER_DISPLAY_FRAME_ID: u32 = 0x9026_1022;
const CONTROLLER_STATUS_FRAME_ID: u32 = 0x9026_1023;
const DISPLAY_CONTROLLER_FRAME_ID: u32 = 0x9026_105A;

/// Conversion from motor RPM to km/h for this drivetrain.
const RPM_TO_SPEED: f64 = 0.078_374_4;

#[derive(Default)]
pub struct VotolEcu {
    state: RwLock<EcuState>,
}

impl VotolEcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one received frame. Unrecognized identifiers are ignored;
    /// short frames are logged and leave the state untouched.
    pub fn handle_frame(&self, frame: &CanFrame) {
        let mut state = self.state.write();
        match frame.id {
            CONTROLLER_DISPLAY_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_controller_display(&mut state, frame);
            }
            CONTROLLER_STATUS_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_controller_status(&mut state, frame);
            }
            DISPLAY_CONTROLLER_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_display_controller(&mut state, frame);
            }
            _ => {}
        }
    }

    /// This controller has no KERS control path; only the local view is
    /// updated.
    pub fn set_kers_enabled(&self, enable: bool) -> Result<(), EcuError> {
        self.state.write().kers_enabled = enable;
        Ok(())
    }

    pub fn set_boost_enabled(&self, enable: bool) {
        self.state.write().boost_enabled = enable;
    }

    /// No retransmit request exists on this controller.
    pub fn request_status_update(&self) -> Result<(), EcuError> {
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        false
    }

    pub fn snapshot(&self) -> EcuSnapshot {
        self.state.read().snapshot()
    }

    pub fn clear_faults(&self) {
        self.state.write().active_faults.clear();
    }
}

fn parse_controller_display(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 8 {
        warn!(len = data.len(), "short controller-display frame");
        return;
    }

    state.rpm = u16::from_le_bytes([data[2], data[3]]);
    state.voltage_mv = i32::from(u16::from_le_bytes([data[4], data[5]])) * 100;
    state.current_ma = i32::from(i16::from_le_bytes([data[6], data[7]])) * 100;
    state.speed_kph = (f64::from(state.rpm) * RPM_TO_SPEED) as u16;
    state.energy.power_mw = i64::from(state.voltage_mv) * i64::from(state.current_ma) / 1000;
}

fn parse_controller_status(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 8 {
        warn!(len = data.len(), "short controller-status frame");
        return;
    }

    state.temperature_c = data[0] as i8;

    let bitmap = u32::from(data[6]);
    state.active_faults.clear();
    for bit in 0..8 {
        if bitmap & (1 << bit) != 0 {
            if let Some(fault) = Fault::from_votol_bit(1 << bit) {
                state.active_faults.insert(fault);
            }
        }
    }
}

fn parse_display_controller(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 8 {
        warn!(len = data.len(), "short display-controller frame");
        return;
    }

    state.raw_speed = u16::from(data[5]);
    state.odometer_m = u32::from(u16::from_le_bytes([data[0], data[1]])) * 1000;
}
