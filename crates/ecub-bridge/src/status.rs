//! Status record writer
//!
//! Pushes the five status field groups of the `engine-ecu` hash, paired
//! with their notification channels.

use std::sync::Arc;

use ecub_core::{IpcError, KersReason, KvStore};
use ecub_ecu::EcuSnapshot;

const ENGINE_KEY: &str = "engine-ecu";

fn on_off(v: bool) -> String {
    if v { "on" } else { "off" }.to_string()
}

/// Motor and speed group.
#[derive(Debug, Clone, Default)]
pub struct Status1 {
    pub voltage_mv: i32,
    pub current_ma: i32,
    pub rpm: u16,
    pub speed_kph: u16,
    pub raw_speed: u16,
    pub throttle_on: bool,
    pub power_mw: i64,
    pub energy_consumed_mwh: u64,
    pub energy_recovered_mwh: u64,
}

/// Temperature and fault group.
#[derive(Debug, Clone, Default)]
pub struct Status2 {
    pub temperature_c: i8,
    pub fault_code: u32,
    pub fault_description: &'static str,
}

/// Odometer group.
#[derive(Debug, Clone, Default)]
pub struct Status3 {
    pub odometer_m: u32,
}

/// KERS/boost group.
#[derive(Debug, Clone, Default)]
pub struct Status4 {
    pub kers_on: bool,
    pub boost_on: bool,
}

/// Gear and firmware group.
#[derive(Debug, Clone, Default)]
pub struct Status5 {
    pub gear: u8,
    pub firmware_version: u32,
}

impl Status1 {
    pub fn from_snapshot(snap: &EcuSnapshot) -> Self {
        Self {
            voltage_mv: snap.voltage_mv,
            current_ma: snap.current_ma,
            rpm: snap.rpm,
            speed_kph: snap.speed_kph,
            raw_speed: snap.raw_speed,
            throttle_on: snap.throttle_on,
            power_mw: snap.power_mw,
            energy_consumed_mwh: snap.energy_consumed_mwh,
            energy_recovered_mwh: snap.energy_recovered_mwh,
        }
    }
}

impl Status2 {
    pub fn from_snapshot(snap: &EcuSnapshot) -> Self {
        let (fault_code, fault_description) = match snap.primary_fault() {
            Some(fault) => (fault.code(), fault.description()),
            None => (0, ""),
        };
        Self {
            temperature_c: snap.temperature_c,
            fault_code,
            fault_description,
        }
    }
}

/// Writes status groups into the collaborator's `engine-ecu` hash.
pub struct StatusWriter {
    kv: Arc<dyn KvStore>,
}

impl StatusWriter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn send_status1(&self, status: &Status1) -> Result<(), IpcError> {
        self.kv
            .hset(
                ENGINE_KEY,
                &[
                    ("motor:voltage", status.voltage_mv.to_string()),
                    ("motor:current", status.current_ma.to_string()),
                    ("rpm", status.rpm.to_string()),
                    ("speed", status.speed_kph.to_string()),
                    ("raw-speed", status.raw_speed.to_string()),
                    ("throttle", on_off(status.throttle_on)),
                    ("power", status.power_mw.to_string()),
                    ("energy:consumed", status.energy_consumed_mwh.to_string()),
                    ("energy:recovered", status.energy_recovered_mwh.to_string()),
                ],
            )
            .await?;
        self.kv.publish("engine-ecu throttle", "").await
    }

    pub async fn send_status2(&self, status: &Status2) -> Result<(), IpcError> {
        self.kv
            .hset(
                ENGINE_KEY,
                &[
                    ("temperature", status.temperature_c.to_string()),
                    ("fault:code", status.fault_code.to_string()),
                    ("fault:description", status.fault_description.to_string()),
                ],
            )
            .await
    }

    pub async fn send_status3(&self, status: &Status3) -> Result<(), IpcError> {
        self.kv
            .hset(ENGINE_KEY, &[("odometer", status.odometer_m.to_string())])
            .await?;
        self.kv.publish("engine-ecu odometer", "").await
    }

    pub async fn send_status4(&self, status: &Status4) -> Result<(), IpcError> {
        self.kv
            .hset(
                ENGINE_KEY,
                &[
                    ("kers", on_off(status.kers_on)),
                    ("boost", on_off(status.boost_on)),
                ],
            )
            .await?;
        self.kv.publish("engine-ecu kers", "").await
    }

    /// Gear always; the firmware version only when the controller has
    /// reported one, so a power-on zero never overwrites a valid value.
    pub async fn send_status5(&self, status: &Status5) -> Result<(), IpcError> {
        if status.firmware_version != 0 {
            self.kv
                .hset(
                    ENGINE_KEY,
                    &[
                        ("gear", status.gear.to_string()),
                        ("fw-version", format!("{:08X}", status.firmware_version)),
                    ],
                )
                .await
        } else {
            self.kv
                .hset(ENGINE_KEY, &[("gear", status.gear.to_string())])
                .await
        }
    }

    pub async fn send_kers_reason_off(&self, reason: KersReason) -> Result<(), IpcError> {
        self.kv
            .hset(ENGINE_KEY, &[("kers-reason-off", reason.as_str().to_string())])
            .await?;
        self.kv.publish("engine-ecu kers-reason-off", "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecub_core::MemoryKvStore;

    fn writer() -> (StatusWriter, Arc<MemoryKvStore>) {
        let kv = Arc::new(MemoryKvStore::new());
        (StatusWriter::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn status1_fields_and_notification() {
        let (writer, kv) = writer();
        writer
            .send_status1(&Status1 {
                voltage_mv: 48_000,
                current_ma: -2_000,
                rpm: 3_000,
                speed_kph: 53,
                raw_speed: 45,
                throttle_on: true,
                power_mw: -96_000,
                energy_consumed_mwh: 12,
                energy_recovered_mwh: 3,
            })
            .await
            .unwrap();

        assert_eq!(kv.hash_field("engine-ecu", "motor:voltage").unwrap(), "48000");
        assert_eq!(kv.hash_field("engine-ecu", "motor:current").unwrap(), "-2000");
        assert_eq!(kv.hash_field("engine-ecu", "speed").unwrap(), "53");
        assert_eq!(kv.hash_field("engine-ecu", "raw-speed").unwrap(), "45");
        assert_eq!(kv.hash_field("engine-ecu", "throttle").unwrap(), "on");
        assert_eq!(kv.hash_field("engine-ecu", "power").unwrap(), "-96000");
        assert_eq!(kv.hash_field("engine-ecu", "energy:consumed").unwrap(), "12");
        assert_eq!(kv.hash_field("engine-ecu", "energy:recovered").unwrap(), "3");
        assert_eq!(
            kv.published(),
            vec![("engine-ecu throttle".to_string(), String::new())]
        );
    }

    #[tokio::test]
    async fn status2_empty_description_without_fault() {
        let (writer, kv) = writer();
        writer
            .send_status2(&Status2 {
                temperature_c: -7,
                fault_code: 0,
                fault_description: "",
            })
            .await
            .unwrap();

        assert_eq!(kv.hash_field("engine-ecu", "temperature").unwrap(), "-7");
        assert_eq!(kv.hash_field("engine-ecu", "fault:code").unwrap(), "0");
        assert_eq!(kv.hash_field("engine-ecu", "fault:description").unwrap(), "");
    }

    #[tokio::test]
    async fn status4_uses_on_off_labels() {
        let (writer, kv) = writer();
        writer
            .send_status4(&Status4 {
                kers_on: true,
                boost_on: false,
            })
            .await
            .unwrap();

        assert_eq!(kv.hash_field("engine-ecu", "kers").unwrap(), "on");
        assert_eq!(kv.hash_field("engine-ecu", "boost").unwrap(), "off");
        assert_eq!(
            kv.published(),
            vec![("engine-ecu kers".to_string(), String::new())]
        );
    }

    #[tokio::test]
    async fn zero_firmware_version_is_omitted() {
        let (writer, kv) = writer();
        writer
            .send_status5(&Status5 {
                gear: 2,
                firmware_version: 0,
            })
            .await
            .unwrap();

        assert_eq!(kv.hash_field("engine-ecu", "gear").unwrap(), "2");
        assert_eq!(kv.hash_field("engine-ecu", "fw-version"), None);

        writer
            .send_status5(&Status5 {
                gear: 2,
                firmware_version: 0xDEAD_BEEF,
            })
            .await
            .unwrap();
        assert_eq!(kv.hash_field("engine-ecu", "fw-version").unwrap(), "DEADBEEF");
    }

    #[tokio::test]
    async fn kers_reason_off_pairs_hash_and_channel() {
        let (writer, kv) = writer();
        writer.send_kers_reason_off(KersReason::Cold).await.unwrap();

        assert_eq!(kv.hash_field("engine-ecu", "kers-reason-off").unwrap(), "cold");
        assert_eq!(
            kv.published(),
            vec![("engine-ecu kers-reason-off".to_string(), String::new())]
        );
    }
}
