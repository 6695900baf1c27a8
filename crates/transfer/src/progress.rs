use std::time::Instant;

/// Completion percentage of `done` out of `total`, clamped to `[0, 100]`.
///
/// Returns 0 when `total` is 0.
pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Seconds needed to move `remaining` bytes at `bytes_per_second`.
///
/// Returns `None` if the speed is not positive or nothing remains.
pub fn eta_seconds(remaining: u64, bytes_per_second: f64) -> Option<f64> {
    if bytes_per_second <= 0.0 || remaining == 0 {
        return None;
    }
    Some(remaining as f64 / bytes_per_second)
}

// ---------------------------------------------------------------------------
// SpeedSampler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Sample {
    bytes: u64,
    at: Instant,
}

/// Computes transfer speed from the byte delta between two ticks.
#[derive(Debug, Clone, Default)]
pub struct SpeedSampler {
    last: Option<Sample>,
    speed: f64,
}

impl SpeedSampler {
    /// Creates a sampler whose baseline is `bytes` at `at`.
    pub fn starting_at(bytes: u64, at: Instant) -> Self {
        Self {
            last: Some(Sample { bytes, at }),
            speed: 0.0,
        }
    }

    /// Records `bytes` observed at `at` and returns the speed in bytes/second
    /// since the previous sample.
    ///
    /// A sample taken at the same instant as the previous one keeps the last
    /// computed speed.
    pub fn sample(&mut self, bytes: u64, at: Instant) -> f64 {
        let Some(prev) = self.last else {
            self.last = Some(Sample { bytes, at });
            return self.speed;
        };

        let elapsed = at.saturating_duration_since(prev.at);
        if elapsed.is_zero() {
            return self.speed;
        }

        let delta = bytes.saturating_sub(prev.bytes);
        self.speed = delta as f64 / elapsed.as_secs_f64();
        self.last = Some(Sample { bytes, at });
        self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn percent_handles_edges() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(25, 100), 25.0);
        assert_eq!(percent(150, 100), 100.0);
    }

    #[test]
    fn eta_requires_speed() {
        assert_eq!(eta_seconds(1000, 0.0), None);
        assert_eq!(eta_seconds(0, 10.0), None);
        assert_eq!(eta_seconds(800, 100.0), Some(8.0));
    }

    #[test]
    fn first_sample_without_baseline_is_zero() {
        let mut sampler = SpeedSampler::default();
        let t0 = Instant::now();
        assert_eq!(sampler.sample(500, t0), 0.0);
        assert_eq!(sampler.sample(1500, t0 + Duration::from_secs(2)), 500.0);
    }

    #[test]
    fn speed_uses_delta_between_ticks() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::starting_at(0, t0);
        assert_eq!(sampler.sample(4000, t0 + Duration::from_secs(2)), 2000.0);
        assert_eq!(sampler.sample(5000, t0 + Duration::from_secs(4)), 500.0);
    }

    #[test]
    fn same_instant_keeps_last_speed() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::starting_at(0, t0);
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(sampler.sample(100, t1), 100.0);
        assert_eq!(sampler.sample(900, t1), 100.0);
    }

    #[test]
    fn stalled_transfer_reports_zero() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::starting_at(100, t0);
        assert_eq!(sampler.sample(100, t0 + Duration::from_secs(2)), 0.0);
    }
}
