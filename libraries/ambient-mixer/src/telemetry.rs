//! Values the tick publishes for the control side to read
//!
//! Lock-free: the tick stores, the host loads, nobody waits.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-track loop position, published once per block
#[derive(Debug)]
pub struct LoopTelemetry {
    /// f64 bit patterns; NaN means "no value"
    remaining: Vec<AtomicU64>,
    clock: AtomicU64,
}

impl LoopTelemetry {
    /// One slot per track, all empty
    pub fn new(slots: usize) -> Self {
        Self {
            remaining: (0..slots).map(|_| AtomicU64::new(f64::NAN.to_bits())).collect(),
            clock: AtomicU64::new(0),
        }
    }

    /// Publish a slot's remaining loop time (tick side)
    #[inline]
    pub fn publish(&self, slot: usize, remaining_secs: Option<f64>) {
        if let Some(cell) = self.remaining.get(slot) {
            let bits = remaining_secs.unwrap_or(f64::NAN).to_bits();
            cell.store(bits, Ordering::Release);
        }
    }

    /// Read a slot's remaining loop time
    pub fn remaining(&self, slot: usize) -> Option<f64> {
        let value = f64::from_bits(self.remaining.get(slot)?.load(Ordering::Acquire));
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    /// Publish the tick clock in frames
    #[inline]
    pub fn set_clock(&self, frames: u64) {
        self.clock.store(frames, Ordering::Release);
    }

    /// Frames rendered so far
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Empty every slot
    pub fn clear(&self) {
        for cell in &self.remaining {
            cell.store(f64::NAN.to_bits(), Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_clear() {
        let telemetry = LoopTelemetry::new(2);
        assert_eq!(telemetry.remaining(0), None);

        telemetry.publish(1, Some(1.25));
        assert_eq!(telemetry.remaining(1), Some(1.25));

        telemetry.publish(1, None);
        assert_eq!(telemetry.remaining(1), None);

        telemetry.publish(0, Some(0.5));
        telemetry.clear();
        assert_eq!(telemetry.remaining(0), None);
        assert_eq!(telemetry.remaining(7), None);
    }
}
