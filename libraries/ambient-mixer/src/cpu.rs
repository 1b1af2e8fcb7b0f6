//! Audio tick load estimate
//!
//! The tick records how long each block took against the real-time budget of
//! that block; the host samples the accumulated ratio periodically and gets a
//! smoothed percentage.

use crate::types::clamp_unit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tick-side load accounting, shared with the sampler
#[derive(Debug, Default)]
pub struct LoadMeter {
    busy_nanos: AtomicU64,
    budget_nanos: AtomicU64,
    overruns: AtomicU64,
}

impl LoadMeter {
    /// Create an empty meter
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed block (tick side, lock-free)
    #[inline]
    pub fn record(&self, frames: usize, sample_rate: u32, elapsed: Duration) {
        if frames == 0 || sample_rate == 0 {
            return;
        }

        let budget = frames as u64 * 1_000_000_000 / u64::from(sample_rate);
        let busy = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);

        self.busy_nanos.fetch_add(busy, Ordering::Relaxed);
        self.budget_nanos.fetch_add(budget, Ordering::Relaxed);
        if busy > budget {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take and reset the accumulated (busy, budget) pair
    pub fn take(&self) -> (u64, u64) {
        let busy = self.busy_nanos.swap(0, Ordering::Relaxed);
        let budget = self.budget_nanos.swap(0, Ordering::Relaxed);
        (busy, budget)
    }

    /// Blocks that took longer than their real-time budget
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Smoothed CPU percentage for the host UI
///
/// `sample` never fails: with no new data it returns the last value.
#[derive(Debug)]
pub struct CpuSampler {
    meter: Arc<LoadMeter>,
    smoothing: f32,
    value: f32,
    primed: bool,
}

impl CpuSampler {
    /// Create a sampler over `meter`
    ///
    /// `smoothing` is the weight of a new sample (0 < a <= 1); 1 disables
    /// smoothing.
    pub fn new(meter: Arc<LoadMeter>, smoothing: f32) -> Self {
        let smoothing = if smoothing.is_finite() && smoothing > 0.0 {
            smoothing.min(1.0)
        } else {
            1.0
        };

        Self {
            meter,
            smoothing,
            value: 0.0,
            primed: false,
        }
    }

    /// Take a sample and return the smoothed percentage in `[0, 100]`
    pub fn sample(&mut self) -> f32 {
        let (busy, budget) = self.meter.take();
        if budget == 0 {
            return self.value;
        }

        let raw = clamp_unit((busy as f64 / budget as f64) as f32) * 100.0;
        self.value = if self.primed {
            self.value + self.smoothing * (raw - self.value)
        } else {
            self.primed = true;
            raw
        };
        self.value = self.value.clamp(0.0, 100.0);
        self.value
    }

    /// Last returned value
    pub fn last(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_returns_last_value() {
        let meter = Arc::new(LoadMeter::new());
        let mut sampler = CpuSampler::new(Arc::clone(&meter), 0.5);
        assert_eq!(sampler.sample(), 0.0);

        meter.record(480, 48_000, Duration::from_millis(5));
        let first = sampler.sample();
        assert!((first - 50.0).abs() < 0.01);
        assert_eq!(sampler.sample(), first);
    }

    #[test]
    fn test_smoothing_moves_towards_new_load() {
        let meter = Arc::new(LoadMeter::new());
        let mut sampler = CpuSampler::new(Arc::clone(&meter), 0.5);

        meter.record(1000, 1000, Duration::from_millis(200));
        assert!((sampler.sample() - 20.0).abs() < 0.01);

        meter.record(1000, 1000, Duration::from_millis(600));
        assert!((sampler.sample() - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_overrun_is_clamped_and_counted() {
        let meter = Arc::new(LoadMeter::new());
        let mut sampler = CpuSampler::new(Arc::clone(&meter), 1.0);

        meter.record(100, 1000, Duration::from_millis(500));
        assert_eq!(sampler.sample(), 100.0);
        assert_eq!(meter.overruns(), 1);
    }

    #[test]
    fn test_invalid_smoothing_disables_smoothing() {
        let meter = Arc::new(LoadMeter::new());
        let mut sampler = CpuSampler::new(Arc::clone(&meter), f32::NAN);

        meter.record(1000, 1000, Duration::from_millis(100));
        sampler.sample();
        meter.record(1000, 1000, Duration::from_millis(300));
        assert!((sampler.sample() - 30.0).abs() < 0.01);
        assert!((sampler.last() - 30.0).abs() < 0.01);
    }
}
