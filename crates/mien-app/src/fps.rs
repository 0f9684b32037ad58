use std::time::Instant;

/// Wall-clock frame rate estimate, sampled once per loop iteration.
pub struct FpsMeter {
    last: Instant,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Reciprocal of the time since the previous tick. A zero delta yields 0.0.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        let delta = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        if delta > 0.0 {
            1.0 / delta
        } else {
            0.0
        }
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tick_measures_delta() {
        let start = Instant::now();
        let mut meter = FpsMeter { last: start };
        let fps = meter.tick_at(start + Duration::from_millis(100));
        assert!((fps - 10.0).abs() < 1e-6, "fps = {fps}");
    }

    #[test]
    fn test_zero_delta_yields_zero() {
        let start = Instant::now();
        let mut meter = FpsMeter { last: start };
        assert_eq!(meter.tick_at(start), 0.0);
    }

    #[test]
    fn test_consecutive_ticks() {
        let start = Instant::now();
        let mut meter = FpsMeter { last: start };
        meter.tick_at(start + Duration::from_millis(100));
        let fps = meter.tick_at(start + Duration::from_millis(150));
        assert!((fps - 20.0).abs() < 1e-6, "fps = {fps}");
    }
}
