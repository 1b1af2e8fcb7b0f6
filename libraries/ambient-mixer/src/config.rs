//! Engine configuration

use crate::bus::MAX_CROSSFADE_SECS;
use crate::crossfade::FadeCurve;
use crate::types::clamp_unit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
///
/// Deserializable so hosts can load it from a config file; every field has a
/// default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mixer sample rate in Hz (replaced by the device rate on desktop)
    pub sample_rate: u32,

    /// Frames per scheduling tick
    pub block_frames: usize,

    /// Initial master volume (0.0-1.0)
    pub master_volume: f32,

    /// Initial crossfade duration in seconds
    pub crossfade_secs: f32,

    /// Ramp shape for enable/disable transitions
    pub fade_curve: FadeCurve,

    /// Exponential smoothing factor for CPU samples (0 < a <= 1)
    pub cpu_smoothing: f32,

    /// Upper bound on how long `dispose` waits for the tick to acknowledge
    pub dispose_timeout_ms: u64,

    /// Start with the tick suspended until `resume_if_suspended`
    pub start_suspended: bool,

    /// Capacity of the tick -> host event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_frames: 512,
            master_volume: 0.8,
            crossfade_secs: 0.8,
            fade_curve: FadeCurve::Linear,
            cpu_smoothing: 0.3,
            dispose_timeout_ms: 250,
            start_suspended: false,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Copy with every value forced into its valid range
    pub fn sanitized(&self) -> Self {
        let cpu_smoothing = if self.cpu_smoothing.is_finite() && self.cpu_smoothing > 0.0 {
            self.cpu_smoothing.min(1.0)
        } else {
            Self::default().cpu_smoothing
        };

        let crossfade_secs = if self.crossfade_secs.is_finite() {
            self.crossfade_secs.clamp(0.0, MAX_CROSSFADE_SECS)
        } else {
            0.0
        };

        Self {
            sample_rate: self.sample_rate.clamp(8_000, 384_000),
            block_frames: self.block_frames.clamp(16, 8192),
            master_volume: clamp_unit(self.master_volume),
            crossfade_secs,
            fade_curve: self.fade_curve,
            cpu_smoothing,
            dispose_timeout_ms: self.dispose_timeout_ms.min(5_000),
            start_suspended: self.start_suspended,
            event_capacity: self.event_capacity.max(1),
        }
    }

    /// Dispose timeout as a `Duration`
    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }
}
