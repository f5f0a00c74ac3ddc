//! Electrical power and energy accounting

use std::time::{Duration, Instant};

/// Gaps longer than this mean the controller was off; integrating across
/// them would book phantom energy.
const DEFAULT_DT_CEILING: Duration = Duration::from_secs(2);

/// Integrates instantaneous power into consumed/recovered energy counters.
///
/// Negative current is regen; its energy lands in the recovered counter.
/// Both counters only ever grow.
#[derive(Debug)]
pub(crate) struct EnergyIntegrator {
    last_update: Option<Instant>,
    dt_ceiling: Duration,
    pub(crate) power_mw: i64,
    pub(crate) consumed_mwh: u64,
    pub(crate) recovered_mwh: u64,
}

impl Default for EnergyIntegrator {
    fn default() -> Self {
        Self::new(DEFAULT_DT_CEILING)
    }
}

impl EnergyIntegrator {
    pub(crate) fn new(dt_ceiling: Duration) -> Self {
        Self {
            last_update: None,
            dt_ceiling,
            power_mw: 0,
            consumed_mwh: 0,
            recovered_mwh: 0,
        }
    }

    /// Account for one power sample taken at `now`.
    pub(crate) fn update(&mut self, voltage_mv: i32, current_ma: i32, now: Instant) {
        self.power_mw = i64::from(voltage_mv) * i64::from(current_ma) / 1000;

        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return;
        };

        let dt = now.saturating_duration_since(last);
        self.last_update = Some(now);
        if dt > self.dt_ceiling {
            return;
        }

        let delta_mwh = self.power_mw as f64 * dt.as_secs_f64() / 3600.0;
        if delta_mwh >= 0.0 {
            self.consumed_mwh += delta_mwh as u64;
        } else {
            self.recovered_mwh += (-delta_mwh) as u64;
        }
    }
}
