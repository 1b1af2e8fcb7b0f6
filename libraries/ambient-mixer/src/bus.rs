//! Master bus: master volume, crossfade duration and the final gain law

use crate::backend::AudioBackend;
use crate::crossfade::FadeCurve;
use crate::types::clamp_unit;

/// Longest accepted crossfade in seconds
pub const MAX_CROSSFADE_SECS: f32 = 10.0;

/// Master bus
///
/// Every voice's output level is `master × track volume × ramp gain`,
/// clamped to `[0, 1]`. Master changes apply on the next frame without a
/// ramp; the crossfade duration only affects ramps started afterwards.
#[derive(Debug, Clone)]
pub struct MasterBus {
    master_volume: f32,
    crossfade_secs: f32,
    curve: FadeCurve,
}

impl MasterBus {
    /// Create a bus, clamping both values
    pub fn new(master_volume: f32, crossfade_secs: f32, curve: FadeCurve) -> Self {
        let mut bus = Self {
            master_volume: 0.0,
            crossfade_secs: 0.0,
            curve,
        };
        bus.set_master(master_volume);
        bus.set_crossfade(crossfade_secs);
        bus
    }

    /// Set master volume (clamped to 0.0-1.0)
    pub fn set_master(&mut self, volume: f32) {
        self.master_volume = clamp_unit(volume);
    }

    /// Current master volume
    pub fn master(&self) -> f32 {
        self.master_volume
    }

    /// Set crossfade duration (clamped to 0-10 s; NaN means no ramp)
    pub fn set_crossfade(&mut self, secs: f32) {
        self.crossfade_secs = if secs.is_nan() {
            0.0
        } else {
            secs.clamp(0.0, MAX_CROSSFADE_SECS)
        };
    }

    /// Current crossfade duration in seconds
    pub fn crossfade_secs(&self) -> f32 {
        self.crossfade_secs
    }

    /// Ramp shape for new ramps
    pub fn curve(&self) -> FadeCurve {
        self.curve
    }

    /// Change the ramp shape for new ramps
    pub fn set_curve(&mut self, curve: FadeCurve) {
        self.curve = curve;
    }

    /// Final output gain of one voice
    #[inline]
    pub fn effective_gain(&self, track_volume: f32, fade_gain: f32) -> f32 {
        clamp_unit(self.master_volume * clamp_unit(track_volume) * clamp_unit(fade_gain))
    }

    /// Length in frames of a ramp started now on `backend`
    pub fn ramp_frames(&self, sample_rate: u32, backend: &dyn AudioBackend) -> u64 {
        let secs = backend.ramp_seconds(self.crossfade_secs).max(0.0);
        (f64::from(secs) * f64::from(sample_rate)).round() as u64
    }
}

impl Default for MasterBus {
    fn default() -> Self {
        Self::new(0.8, 0.8, FadeCurve::Linear)
    }
}
