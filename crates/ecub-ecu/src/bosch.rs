//! Bosch motor controller driver
//!
//! Status frames use 11-bit identifiers and big-endian fields. This is the
//! only variant with a control path: KERS is enabled by sending a regen
//! setpoint frame followed by a control-bit frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ecub_can::{CanBus, CanFrame};
use ecub_core::Fault;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::state::{EcuSnapshot, EcuState};
use crate::EcuError;

const STATUS1_FRAME_ID: u32 = 0x7E0;
const STATUS2_FRAME_ID: u32 = 0x7E1;
const STATUS3_FRAME_ID: u32 = 0x7E2;
const STATUS4_FRAME_ID: u32 = 0x7E3;
const GEAR_FRAME_ID: u32 = 0x7E4;
const EBS_STATUS_FRAME_ID: u32 = 0x7E5;
const STATUS5_FRAME_ID: u32 = 0x7E8;

const CONTROL_FRAME_ID: u32 = 0x4E0;
const EBS_SET_FRAME_ID: u32 = 0x4E2;
const STATUS_REQUEST_FRAME_ID: u32 = 0x4EF;

/// Regen setpoint sent ahead of enabling KERS.
const KERS_VOLTAGE_MV: u16 = 56_000;
const KERS_CURRENT_MA: u16 = 10_000;

/// Gear-mode bit of the control frame; always driven high on this platform.
const GEAR_MODE_ENABLE: bool = true;

/// Odometer calibration applied to the raw 0.1 km readout.
const ODOMETER_CALIBRATION: f64 = 1.07;

/// The controller reports fault code 15 while the parking brake is engaged;
/// it does not indicate a real fault.
const PARK_BRAKE_SPURIOUS_FAULT: u32 = 15;

/// No frame for this long means the controller is off or unreachable.
const STALE_AFTER: Duration = Duration::from_secs(2);

pub struct BoschEcu {
    bus: Arc<dyn CanBus>,
    state: RwLock<EcuState>,
}

impl BoschEcu {
    pub fn new(bus: Arc<dyn CanBus>) -> Self {
        Self {
            bus,
            state: RwLock::new(EcuState::default()),
        }
    }

    /// Decode one received frame. Unrecognized identifiers are ignored;
    /// short frames are logged and leave the state untouched.
    pub fn handle_frame(&self, frame: &CanFrame) {
        let mut state = self.state.write();
        match frame.id {
            STATUS1_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_status1(&mut state, frame);
            }
            STATUS2_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_status2(&mut state, frame);
            }
            STATUS3_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_status3(&mut state, frame);
            }
            STATUS4_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_status4(&mut state, frame);
            }
            GEAR_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_gear(&mut state, frame);
            }
            EBS_STATUS_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_ebs_status(frame);
            }
            STATUS5_FRAME_ID => {
                state.last_frame = Some(Instant::now());
                parse_status5(&mut state, frame);
            }
            _ => {}
        }
    }

    /// Enable or disable regenerative braking.
    ///
    /// Enabling sends the regen voltage/current setpoint first, then the
    /// control bits; the state records the new mode only once both frames
    /// are out.
    pub async fn set_kers_enabled(&self, enable: bool) -> Result<(), EcuError> {
        let boost = self.state.read().boost_enabled;
        debug!(kers = enable, boost, gear = GEAR_MODE_ENABLE, "setting controller KERS");

        if enable {
            let mut setpoint = [0u8; 4];
            setpoint[0..2].copy_from_slice(&KERS_VOLTAGE_MV.to_be_bytes());
            setpoint[2..4].copy_from_slice(&KERS_CURRENT_MA.to_be_bytes());
            self.bus
                .publish(CanFrame::new(EBS_SET_FRAME_ID, &setpoint))
                .await?;
        }

        let control = u8::from(GEAR_MODE_ENABLE) | (u8::from(boost) << 1) | (u8::from(enable) << 2);
        self.bus
            .publish(CanFrame::new(CONTROL_FRAME_ID, &[control]))
            .await?;

        self.state.write().kers_enabled = enable;
        Ok(())
    }

    /// Record the boost mode for the next control frame. No frame is sent
    /// on its own.
    pub fn set_boost_enabled(&self, enable: bool) {
        self.state.write().boost_enabled = enable;
    }

    /// Ask the controller to retransmit all status frames.
    pub async fn request_status_update(&self) -> Result<(), EcuError> {
        self.bus
            .publish(CanFrame::new(STATUS_REQUEST_FRAME_ID, &[]))
            .await?;
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.state
            .read()
            .last_frame
            .map_or(true, |t| t.elapsed() > STALE_AFTER)
    }

    pub fn snapshot(&self) -> EcuSnapshot {
        self.state.read().snapshot()
    }

    pub fn clear_faults(&self) {
        self.state.write().active_faults.clear();
    }
}

fn parse_status1(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 8 {
        warn!(len = data.len(), "short status1 frame");
        return;
    }

    state.voltage_mv = i32::from(u16::from_be_bytes([data[0], data[1]])) * 10;
    state.current_ma = i32::from(i16::from_be_bytes([data[2], data[3]])) * 10;
    state.rpm = u16::from_be_bytes([data[4], data[5]]);
    state.raw_speed = u16::from(data[6]);
    state.speed_kph = state.speed_filter.calibrated(state.raw_speed);
    state.throttle_on = data[7] & 0x01 != 0;

    state
        .energy
        .update(state.voltage_mv, state.current_ma, Instant::now());
}

fn parse_status2(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 6 {
        warn!(len = data.len(), "short status2 frame");
        return;
    }

    state.temperature_c = data[0] as i8;

    let mut code = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    if code == PARK_BRAKE_SPURIOUS_FAULT {
        code = 0;
    }

    state.active_faults.clear();
    if let Some(fault) = Fault::from_bosch_code(code) {
        state.active_faults.insert(fault);
    }
}

fn parse_status3(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 4 {
        warn!(len = data.len(), "short status3 frame");
        return;
    }

    // Raw odometer is in 0.1 km steps.
    let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    state.odometer_m = (f64::from(raw) * ODOMETER_CALIBRATION * 100.0) as u32;
}

fn parse_status4(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.is_empty() {
        warn!("short status4 frame");
        return;
    }

    state.kers_enabled = data[0] & 0x40 != 0;
}

fn parse_gear(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.is_empty() {
        warn!("short gear frame");
        return;
    }

    state.gear = data[0];
}

fn parse_ebs_status(frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 4 {
        warn!(len = data.len(), "short EBS status frame");
        return;
    }

    // Observational only.
    let regen_voltage_mv = i32::from(u16::from_be_bytes([data[0], data[1]])) * 10;
    let regen_current_ma = i32::from(i16::from_be_bytes([data[2], data[3]])) * 10;
    debug!(regen_voltage_mv, regen_current_ma, "EBS status");
}

fn parse_status5(state: &mut EcuState, frame: &CanFrame) {
    let data = frame.data();
    if data.len() < 4 {
        warn!(len = data.len(), "short status5 frame");
        return;
    }

    state.firmware_version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecub_can::mock::MockCanBus;

    fn test_ecu() -> (BoschEcu, Arc<MockCanBus>) {
        let bus = Arc::new(MockCanBus::new());
        (BoschEcu::new(bus.clone()), bus)
    }

    fn status1_payload(
        voltage_mv: u16,
        current_ma: i16,
        rpm: u16,
        raw_speed: u8,
        throttle_on: bool,
    ) -> [u8; 8] {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&(voltage_mv / 10).to_be_bytes());
        data[2..4].copy_from_slice(&(current_ma / 10).to_be_bytes());
        data[4..6].copy_from_slice(&rpm.to_be_bytes());
        data[6] = raw_speed;
        data[7] = u8::from(throttle_on);
        data
    }

    #[test]
    fn status1_round_trip() {
        let payload = status1_payload(48_000, 5_000, 3_000, 45, true);
        assert_eq!(payload, [0x12, 0xC0, 0x01, 0xF4, 0x0B, 0xB8, 0x2D, 0x01]);

        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(STATUS1_FRAME_ID, &payload));

        let snap = ecu.snapshot();
        assert_eq!(snap.voltage_mv, 48_000);
        assert_eq!(snap.current_ma, 5_000);
        assert_eq!(snap.rpm, 3_000);
        assert_eq!(snap.raw_speed, 45);
        assert!(snap.throttle_on);
        // 45 * 1.03 * 1.155556, truncated
        assert_eq!(snap.speed_kph, 53);
    }

    #[test]
    fn status1_negative_current_is_regen() {
        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(
            STATUS1_FRAME_ID,
            &status1_payload(48_000, -2_000, 0, 0, false),
        ));

        assert_eq!(ecu.snapshot().current_ma, -2_000);
    }

    #[test]
    fn status1_short_frame_is_ignored() {
        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(STATUS1_FRAME_ID, &[0x12, 0xC0, 0x01, 0xF4]));

        assert_eq!(ecu.snapshot().voltage_mv, 0);
    }

    #[test]
    fn status2_reports_temperature_and_fault() {
        let (ecu, _bus) = test_ecu();
        let mut data = [0u8; 6];
        data[0] = 45;
        data[2..6].copy_from_slice(&3u32.to_be_bytes());
        ecu.handle_frame(&CanFrame::new(STATUS2_FRAME_ID, &data));

        let snap = ecu.snapshot();
        assert_eq!(snap.temperature_c, 45);
        assert!(snap.active_faults.contains(&Fault::MotorShortCircuit));
    }

    #[test]
    fn status2_negative_temperature() {
        let (ecu, _bus) = test_ecu();
        let mut data = [0u8; 6];
        data[0] = (-10i8) as u8;
        ecu.handle_frame(&CanFrame::new(STATUS2_FRAME_ID, &data));

        assert_eq!(ecu.snapshot().temperature_c, -10);
    }

    #[test]
    fn park_brake_fault_is_filtered() {
        let (ecu, _bus) = test_ecu();
        let mut data = [0u8; 6];
        data[2..6].copy_from_slice(&15u32.to_be_bytes());
        ecu.handle_frame(&CanFrame::new(STATUS2_FRAME_ID, &data));

        assert!(ecu.snapshot().active_faults.is_empty());
    }

    #[test]
    fn clearing_the_fault_word_clears_the_set() {
        let (ecu, _bus) = test_ecu();
        let mut data = [0u8; 6];
        data[2..6].copy_from_slice(&3u32.to_be_bytes());
        ecu.handle_frame(&CanFrame::new(STATUS2_FRAME_ID, &data));
        assert!(ecu.snapshot().has_fault());

        data[2..6].copy_from_slice(&0u32.to_be_bytes());
        ecu.handle_frame(&CanFrame::new(STATUS2_FRAME_ID, &data));
        assert!(!ecu.snapshot().has_fault());
    }

    #[test]
    fn odometer_calibration() {
        let (ecu, _bus) = test_ecu();
        // 1000 raw = 100 km
        ecu.handle_frame(&CanFrame::new(STATUS3_FRAME_ID, &1000u32.to_be_bytes()));

        assert_eq!(ecu.snapshot().odometer_m, 107_000);
    }

    #[test]
    fn status4_mirrors_bus_reported_kers() {
        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(STATUS4_FRAME_ID, &[0x40]));
        assert!(ecu.snapshot().kers_enabled);

        ecu.handle_frame(&CanFrame::new(STATUS4_FRAME_ID, &[0x00]));
        assert!(!ecu.snapshot().kers_enabled);
    }

    #[test]
    fn gear_and_firmware_are_decoded() {
        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(GEAR_FRAME_ID, &[2]));
        ecu.handle_frame(&CanFrame::new(STATUS5_FRAME_ID, &0xDEADBEEFu32.to_be_bytes()));

        let snap = ecu.snapshot();
        assert_eq!(snap.gear, 2);
        assert_eq!(snap.firmware_version, 0xDEAD_BEEF);
    }

    #[test]
    fn unknown_frame_is_ignored() {
        let (ecu, _bus) = test_ecu();
        ecu.handle_frame(&CanFrame::new(0x123, &[0u8; 8]));

        assert_eq!(ecu.snapshot(), EcuSnapshot::default());
        assert!(ecu.is_stale());
    }

    #[test]
    fn recognized_frame_refreshes_staleness() {
        let (ecu, _bus) = test_ecu();
        assert!(ecu.is_stale());

        ecu.handle_frame(&CanFrame::new(STATUS4_FRAME_ID, &[0x00]));
        assert!(!ecu.is_stale());
    }

    #[tokio::test]
    async fn enabling_kers_sends_setpoint_then_control() {
        let (ecu, bus) = test_ecu();
        ecu.set_kers_enabled(true).await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, EBS_SET_FRAME_ID);
        assert_eq!(sent[0].data(), &[0xDA, 0xC0, 0x27, 0x10]);
        assert_eq!(sent[1].id, CONTROL_FRAME_ID);
        assert_eq!(sent[1].data(), &[0x05]);
        assert!(ecu.snapshot().kers_enabled);
    }

    #[tokio::test]
    async fn disabling_kers_sends_only_the_control_frame() {
        let (ecu, bus) = test_ecu();
        ecu.set_kers_enabled(false).await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, CONTROL_FRAME_ID);
        assert_eq!(sent[0].data(), &[0x01]);
    }

    #[tokio::test]
    async fn boost_mode_sets_the_control_bit() {
        let (ecu, bus) = test_ecu();
        ecu.set_boost_enabled(true);
        ecu.set_kers_enabled(true).await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent[1].data(), &[0x07]);
    }

    #[tokio::test]
    async fn publish_failure_leaves_kers_state_unchanged() {
        let (ecu, bus) = test_ecu();
        bus.set_failing(true);

        assert!(ecu.set_kers_enabled(true).await.is_err());
        assert!(!ecu.snapshot().kers_enabled);
    }

    #[tokio::test]
    async fn status_request_is_an_empty_frame() {
        let (ecu, bus) = test_ecu();
        ecu.request_status_update().await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, STATUS_REQUEST_FRAME_ID);
        assert_eq!(sent[0].len, 0);
    }
}
