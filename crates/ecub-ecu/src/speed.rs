//! Speed sample filtering and calibration

/// Averaging window over raw speed samples.
const WINDOW: usize = 3;

/// Wheel circumference correction applied on top of the raw readout.
const WHEEL_CALIBRATION: f64 = 1.03;

/// Tolerance adjustment matching the factory display.
const SPEED_TOLERANCE: f64 = 1.155556;

/// Fixed-window moving average over raw speed samples.
///
/// A zero sample means the vehicle is at rest; the window is cleared so a
/// later start is not dragged down by pre-stop samples.
#[derive(Debug, Default)]
pub(crate) struct SpeedFilter {
    data: [u16; WINDOW],
    head: usize,
    count: usize,
    sum: u32,
}

impl SpeedFilter {
    pub(crate) fn reset(&mut self) {
        *self = SpeedFilter::default();
    }

    /// Feed one raw sample, returning the windowed average. Zero resets the
    /// window and returns 0.
    pub(crate) fn sample(&mut self, raw: u16) -> f64 {
        if raw == 0 {
            self.reset();
            return 0.0;
        }

        let evicted = if self.count >= WINDOW {
            self.data[self.head]
        } else {
            self.count += 1;
            0
        };

        self.data[self.head] = raw;
        self.sum = self.sum - u32::from(evicted) + u32::from(raw);
        self.head = (self.head + 1) % WINDOW;

        f64::from(self.sum) / self.count as f64
    }

    /// Averaged and calibrated speed in km/h. Truncation, not rounding,
    /// matches the factory display.
    pub(crate) fn calibrated(&mut self, raw: u16) -> u16 {
        (self.sample(raw) * WHEEL_CALIBRATION * SPEED_TOLERANCE) as u16
    }
}
