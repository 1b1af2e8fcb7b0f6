//! Per-voice gain ramps for click-free enable/disable
//!
//! Each voice owns one [`CrossfadeScheduler`]. A ramp interpolates from the
//! gain the voice has *right now* to a target, so a toggle that arrives while
//! another ramp is running retargets in place instead of jumping:
//!
//! ```text
//!   gain
//!   1.0 ┤        ╭──╮ disable arrives mid-ramp
//!       │      ╭─╯  ╰─╮
//!       │    ╭─╯      ╰─╮
//!   0.0 ┼────╯          ╰────
//!        enable
//! ```
//!
//! Time is measured in frames on the mixer clock.

use crate::types::clamp_unit;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Ramp shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Linear in time
    #[default]
    Linear,

    /// Equal power: sine on the way up, cosine on the way down
    ///
    /// Keeps perceived loudness steady when one layer fades in while another
    /// fades out.
    EqualPower,
}

impl FadeCurve {
    /// Interpolation weight at a normalized ramp position
    ///
    /// # Arguments
    /// * `position` - Normalized position in the ramp (0.0 to 1.0)
    /// * `rising` - Whether the ramp moves towards a higher gain
    ///
    /// # Returns
    /// Weight in `[0, 1]`; 0 at the start of the ramp, 1 at the end
    #[inline]
    pub fn weight(&self, position: f32, rising: bool) -> f32 {
        let p = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => p,
            FadeCurve::EqualPower => {
                if rising {
                    (p * FRAC_PI_2).sin()
                } else {
                    1.0 - (p * FRAC_PI_2).cos()
                }
            }
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::EqualPower => "Equal Power",
        }
    }
}

/// Ramp state of one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadePhase {
    /// Holding a constant gain
    #[default]
    Idle,

    /// Moving towards a higher gain
    RampingIn,

    /// Moving towards a lower gain
    RampingOut,
}

/// How a ramp ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCompletion {
    /// Settled at a non-zero gain
    FadedIn,

    /// Settled at zero; the voice may be stopped physically
    FadedOut,
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    start_frame: u64,
    duration_frames: u64,
    start_gain: f32,
    target_gain: f32,
    curve: FadeCurve,
}

impl Ramp {
    #[inline]
    fn end_frame(&self) -> u64 {
        self.start_frame + self.duration_frames
    }

    #[inline]
    fn value_at(&self, now: u64) -> f32 {
        if now >= self.end_frame() {
            return self.target_gain;
        }

        let elapsed = now.saturating_sub(self.start_frame);
        let position = elapsed as f32 / self.duration_frames as f32;
        let rising = self.target_gain > self.start_gain;
        let weight = self.curve.weight(position, rising);

        self.start_gain + (self.target_gain - self.start_gain) * weight
    }
}

/// Gain-ramp state machine for one voice
///
/// `Idle -> RampingIn/RampingOut -> Idle`. Only one ramp exists at a time;
/// [`retarget`](Self::retarget) replaces it, starting from the instantaneous
/// gain. The duration is captured when a ramp starts, so later crossfade
/// changes never stretch a ramp already in flight.
#[derive(Debug, Clone)]
pub struct CrossfadeScheduler {
    phase: FadePhase,
    /// Gain while idle
    gain: f32,
    ramp: Option<Ramp>,
}

impl CrossfadeScheduler {
    /// Create an idle scheduler at zero gain
    pub fn new() -> Self {
        Self {
            phase: FadePhase::Idle,
            gain: 0.0,
            ramp: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> FadePhase {
        self.phase
    }

    /// Whether a ramp is in flight
    pub fn is_ramping(&self) -> bool {
        self.phase != FadePhase::Idle
    }

    /// Target gain of the ramp in flight, or the held gain
    pub fn target(&self) -> f32 {
        match self.ramp {
            Some(ramp) if self.is_ramping() => ramp.target_gain,
            _ => self.gain,
        }
    }

    /// Duration of the ramp in flight, in frames
    pub fn ramp_duration_frames(&self) -> Option<u64> {
        match self.ramp {
            Some(ramp) if self.is_ramping() => Some(ramp.duration_frames),
            _ => None,
        }
    }

    /// Instantaneous gain at `now`
    #[inline]
    pub fn gain_at(&self, now: u64) -> f32 {
        match (self.phase, self.ramp) {
            (FadePhase::Idle, _) | (_, None) => self.gain,
            (_, Some(ramp)) => ramp.value_at(now),
        }
    }

    /// Start a ramp from the current gain towards `target`
    ///
    /// A zero duration steps immediately. Returns the completion when the
    /// scheduler settled on the spot.
    pub fn retarget(
        &mut self,
        now: u64,
        target: f32,
        duration_frames: u64,
        curve: FadeCurve,
    ) -> Option<FadeCompletion> {
        let current = self.gain_at(now);
        let target = clamp_unit(target);

        if duration_frames == 0 || (current - target).abs() <= f32::EPSILON {
            return Some(self.settle(target));
        }

        self.ramp = Some(Ramp {
            start_frame: now,
            duration_frames,
            start_gain: current,
            target_gain: target,
            curve,
        });
        self.phase = if target > current {
            FadePhase::RampingIn
        } else {
            FadePhase::RampingOut
        };

        None
    }

    /// Advance to `now`; returns the completion if the ramp ended
    #[inline]
    pub fn advance(&mut self, now: u64) -> Option<FadeCompletion> {
        if self.phase == FadePhase::Idle {
            return None;
        }

        let ramp = self.ramp?;
        if now >= ramp.end_frame() {
            Some(self.settle(ramp.target_gain))
        } else {
            None
        }
    }

    /// Drop any ramp and hold `gain`
    pub fn reset(&mut self, gain: f32) {
        self.settle(clamp_unit(gain));
    }

    fn settle(&mut self, gain: f32) -> FadeCompletion {
        self.gain = gain;
        self.ramp = None;
        self.phase = FadePhase::Idle;

        if gain <= 0.0 {
            FadeCompletion::FadedOut
        } else {
            FadeCompletion::FadedIn
        }
    }
}

impl Default for CrossfadeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_weight() {
        let curve = FadeCurve::Linear;
        assert!((curve.weight(0.0, true) - 0.0).abs() < 0.001);
        assert!((curve.weight(0.5, true) - 0.5).abs() < 0.001);
        assert!((curve.weight(1.0, false) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_equal_power_keeps_power_constant() {
        let curve = FadeCurve::EqualPower;

        // Fade-in gain and fade-out gain from 1.0 at the same position
        let rising = curve.weight(0.5, true);
        let falling = 1.0 - curve.weight(0.5, false);

        let sum_of_squares = rising * rising + falling * falling;
        assert!(
            (sum_of_squares - 1.0).abs() < 0.01,
            "Equal power: sum of squares = {}, expected ~1.0",
            sum_of_squares
        );
    }

    #[test]
    fn test_ramp_in_is_linear_in_time() {
        let mut fade = CrossfadeScheduler::new();
        assert!(fade.retarget(0, 1.0, 100, FadeCurve::Linear).is_none());
        assert_eq!(fade.phase(), FadePhase::RampingIn);

        assert!((fade.gain_at(25) - 0.25).abs() < 0.001);
        assert!((fade.gain_at(50) - 0.5).abs() < 0.001);
        assert!(fade.advance(99).is_none());
        assert_eq!(fade.advance(100), Some(FadeCompletion::FadedIn));
        assert_eq!(fade.phase(), FadePhase::Idle);
        assert_eq!(fade.gain_at(1000), 1.0);
    }

    #[test]
    fn test_zero_duration_steps_immediately() {
        let mut fade = CrossfadeScheduler::new();
        assert_eq!(
            fade.retarget(10, 1.0, 0, FadeCurve::Linear),
            Some(FadeCompletion::FadedIn)
        );
        assert_eq!(fade.gain_at(10), 1.0);

        assert_eq!(
            fade.retarget(11, 0.0, 0, FadeCurve::Linear),
            Some(FadeCompletion::FadedOut)
        );
        assert_eq!(fade.gain_at(11), 0.0);
    }

    #[test]
    fn test_retarget_starts_from_current_gain() {
        let mut fade = CrossfadeScheduler::new();
        fade.retarget(0, 1.0, 100, FadeCurve::Linear);

        let before = fade.gain_at(40);
        fade.retarget(40, 0.0, 100, FadeCurve::Linear);
        let after = fade.gain_at(40);

        assert!((before - after).abs() < 1e-6, "retarget must not jump");
        assert_eq!(fade.phase(), FadePhase::RampingOut);

        // 0.4 -> 0.0 over 100 frames
        assert!((fade.gain_at(90) - 0.2).abs() < 0.001);
        assert_eq!(fade.advance(140), Some(FadeCompletion::FadedOut));
        assert_eq!(fade.gain_at(140), 0.0);
    }

    #[test]
    fn test_in_flight_duration_is_fixed() {
        let mut fade = CrossfadeScheduler::new();
        fade.retarget(0, 1.0, 200, FadeCurve::Linear);
        assert_eq!(fade.ramp_duration_frames(), Some(200));
        assert_eq!(fade.target(), 1.0);
    }

    #[test]
    fn test_retarget_to_same_gain_is_idle() {
        let mut fade = CrossfadeScheduler::new();
        fade.reset(1.0);
        assert_eq!(
            fade.retarget(5, 1.0, 100, FadeCurve::EqualPower),
            Some(FadeCompletion::FadedIn)
        );
        assert!(!fade.is_ramping());
    }

    #[test]
    fn test_curve_display_names() {
        assert_eq!(FadeCurve::Linear.display_name(), "Linear");
        assert_eq!(FadeCurve::EqualPower.display_name(), "Equal Power");
    }
}
