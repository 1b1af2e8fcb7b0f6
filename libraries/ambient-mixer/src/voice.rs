//! Per-track playback voice
//!
//! A voice plays one decoded loop forever while enabled. The next iteration
//! is queued `lookahead` frames before the current one ends, and starts on
//! exactly the frame the previous one ends on, so consecutive iterations
//! never leave a gap.
//!
//! Voices live on the audio tick only; the control side reaches them through
//! commands.

use crate::buffer::DecodedBuffer;
use crate::bus::MasterBus;
use crate::crossfade::{CrossfadeScheduler, FadeCompletion, FadeCurve};
use crate::types::{clamp_unit, TrackRuntimeState};
use std::sync::Arc;

/// What an enable/disable directive did to a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTransition {
    /// Playback started at position 0
    Started,
    /// A fading-out voice was caught and is ramping back in
    Resumed,
    /// Ramp towards silence started
    RampingOut,
    /// Stopped on the spot (zero-length ramp)
    Stopped,
    /// Enabled flag recorded, but there is no buffer to play
    Inert,
    /// Nothing to do
    Unchanged,
}

/// Loop iteration queued ahead of the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledIteration {
    /// 1-based iteration number of the queued loop
    pub iteration: u64,
    /// Clock frame the iteration starts on
    pub start_frame: u64,
}

/// Side effects of rendering one block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Loop boundaries crossed
    pub wraps: u32,
    /// Voice reached zero gain while disabled and was stopped
    pub stopped: bool,
}

#[derive(Debug, Clone)]
struct LoopSource {
    /// Frame within the current iteration
    cursor: usize,
    playing: bool,
    /// Clock frame the current iteration started on
    iteration_start: u64,
    next_iteration: Option<u64>,
    iterations: u64,
    last_gap_frames: u64,
    max_gap_frames: u64,
}

impl LoopSource {
    fn start(now: u64) -> Self {
        Self {
            cursor: 0,
            playing: true,
            iteration_start: now,
            next_iteration: None,
            iterations: 1,
            last_gap_frames: 0,
            max_gap_frames: 0,
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.playing = false;
        self.next_iteration = None;
    }
}

/// One track's playback unit
#[derive(Debug)]
pub struct TrackVoice {
    id: Arc<str>,
    enabled: bool,
    volume: f32,
    fade: CrossfadeScheduler,
    buffer: Option<Arc<DecodedBuffer>>,
    source: Option<LoopSource>,
    releases_source: bool,
}

impl TrackVoice {
    /// Create a silent, disabled voice
    ///
    /// `releases_source` selects what stopping does: drop the source (graph)
    /// or keep it paused and rewound (player element).
    pub fn new(id: Arc<str>, volume: f32, releases_source: bool) -> Self {
        Self {
            id,
            enabled: false,
            volume: clamp_unit(volume),
            fade: CrossfadeScheduler::new(),
            buffer: None,
            source: None,
            releases_source,
        }
    }

    /// Track id
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// Requested enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Track volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Whether a source is physically producing frames
    pub fn is_playing(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.playing)
    }

    /// Ramp state
    pub fn fade(&self) -> &CrossfadeScheduler {
        &self.fade
    }

    /// Decoded buffer, if installed
    pub fn buffer(&self) -> Option<&Arc<DecodedBuffer>> {
        self.buffer.as_ref()
    }

    /// Change the track volume (instant, never ramped)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_unit(volume);
    }

    /// Enable or disable with a gain ramp of `ramp_frames`
    pub fn set_enabled(
        &mut self,
        now: u64,
        enabled: bool,
        ramp_frames: u64,
        curve: FadeCurve,
    ) -> VoiceTransition {
        if enabled {
            self.enable(now, ramp_frames, curve)
        } else {
            self.disable(now, ramp_frames, curve)
        }
    }

    /// Apply enabled + volume as one directive
    ///
    /// The enabled flag only triggers a transition when it differs from the
    /// current one.
    pub fn set_state(
        &mut self,
        now: u64,
        enabled: bool,
        volume: f32,
        ramp_frames: u64,
        curve: FadeCurve,
    ) -> VoiceTransition {
        self.set_volume(volume);
        if enabled == self.enabled {
            return VoiceTransition::Unchanged;
        }
        self.set_enabled(now, enabled, ramp_frames, curve)
    }

    fn enable(&mut self, now: u64, ramp_frames: u64, curve: FadeCurve) -> VoiceTransition {
        let was_enabled = self.enabled;
        self.enabled = true;

        if self.buffer.is_none() {
            return VoiceTransition::Inert;
        }

        let transition = if self.is_playing() {
            if was_enabled {
                return VoiceTransition::Unchanged;
            }
            VoiceTransition::Resumed
        } else {
            self.fade.reset(0.0);
            self.source = Some(LoopSource::start(now));
            VoiceTransition::Started
        };

        self.fade.retarget(now, 1.0, ramp_frames, curve);
        transition
    }

    fn disable(&mut self, now: u64, ramp_frames: u64, curve: FadeCurve) -> VoiceTransition {
        self.enabled = false;

        if !self.is_playing() {
            self.fade.reset(0.0);
            return VoiceTransition::Unchanged;
        }

        match self.fade.retarget(now, 0.0, ramp_frames, curve) {
            Some(FadeCompletion::FadedOut) => {
                self.stop_source();
                VoiceTransition::Stopped
            }
            _ => VoiceTransition::RampingOut,
        }
    }

    /// Install or replace the decoded buffer
    ///
    /// Returns the buffer that was replaced. An enabled voice that had nothing
    /// to play starts now with a ramp-in; a playing voice keeps its position,
    /// wrapped into the new length.
    pub fn install_buffer(
        &mut self,
        now: u64,
        buffer: Arc<DecodedBuffer>,
        ramp_frames: u64,
        curve: FadeCurve,
    ) -> (Option<Arc<DecodedBuffer>>, VoiceTransition) {
        let frames = buffer.frames().max(1);
        let previous = self.buffer.replace(buffer);

        if let Some(source) = self.source.as_mut() {
            source.cursor %= frames;
            source.next_iteration = None;
        }

        let transition = if self.enabled && !self.is_playing() {
            self.fade.reset(0.0);
            self.source = Some(LoopSource::start(now));
            self.fade.retarget(now, 1.0, ramp_frames, curve);
            VoiceTransition::Started
        } else {
            VoiceTransition::Unchanged
        };

        (previous, transition)
    }

    /// Drop the buffer after a failed reload
    ///
    /// The enabled flag survives, so the voice starts again with a fade-in
    /// once a later load installs a buffer.
    pub fn clear_buffer(&mut self) -> (Option<Arc<DecodedBuffer>>, VoiceTransition) {
        let was_playing = self.is_playing();
        self.fade.reset(0.0);
        self.source = None;
        let transition = if was_playing {
            VoiceTransition::Stopped
        } else {
            VoiceTransition::Unchanged
        };
        (self.buffer.take(), transition)
    }

    /// Give up the buffer (engine shutdown)
    pub fn release_buffer(&mut self) -> Option<Arc<DecodedBuffer>> {
        self.stop_now();
        self.source = None;
        self.buffer.take()
    }

    /// Queue the next loop iteration if the boundary is within `lookahead`
    ///
    /// A lookahead of zero means the backend loops natively and nothing is
    /// queued.
    pub fn schedule_next_iteration(&mut self, now: u64, lookahead: u64) -> Option<ScheduledIteration> {
        if lookahead == 0 {
            return None;
        }

        let frames = self.buffer.as_ref()?.frames() as u64;
        let source = self.source.as_mut().filter(|s| s.playing)?;
        if source.next_iteration.is_some() || frames == 0 {
            return None;
        }

        let boundary = now + (frames - source.cursor as u64);
        if boundary - now > lookahead {
            return None;
        }

        source.next_iteration = Some(boundary);
        Some(ScheduledIteration {
            iteration: source.iterations + 1,
            start_frame: boundary,
        })
    }

    /// Mix `out.len() / 2` stereo frames into `out`, starting at clock `now`
    #[inline]
    pub fn render(&mut self, out: &mut [f32], now: u64, bus: &MasterBus) -> RenderReport {
        let mut report = RenderReport::default();

        let Some(buffer) = self.buffer.as_ref() else {
            return report;
        };
        let Some(source) = self.source.as_mut().filter(|s| s.playing) else {
            return report;
        };
        let frames = buffer.frames();

        for (i, frame) in out.chunks_exact_mut(2).enumerate() {
            let t = now + i as u64;
            let gain = bus.effective_gain(self.volume, self.fade.gain_at(t));
            let (l, r) = buffer.frame(source.cursor);
            frame[0] += l * gain;
            frame[1] += r * gain;

            source.cursor += 1;
            if source.cursor >= frames {
                let end = t + 1;
                let start = source.next_iteration.take().unwrap_or(end);
                let gap = start.saturating_sub(end);
                source.cursor = 0;
                source.iteration_start = start;
                source.iterations += 1;
                source.last_gap_frames = gap;
                source.max_gap_frames = source.max_gap_frames.max(gap);
                report.wraps += 1;
            }

            if let Some(FadeCompletion::FadedOut) = self.fade.advance(t + 1) {
                if !self.enabled {
                    report.stopped = true;
                    break;
                }
            }
        }

        if report.stopped {
            self.stop_source();
        }
        report
    }

    /// Hard stop without a ramp
    pub fn stop_now(&mut self) {
        self.enabled = false;
        self.fade.reset(0.0);
        self.stop_source();
    }

    fn stop_source(&mut self) {
        if self.releases_source {
            self.source = None;
        } else if let Some(source) = self.source.as_mut() {
            source.rewind();
        }
    }

    /// Seconds until the current iteration ends, in `[0, D)`
    ///
    /// `None` when disabled, undecoded, or not playing.
    pub fn loop_time_remaining(&self) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let buffer = self.buffer.as_ref()?;
        let source = self.source.as_ref().filter(|s| s.playing)?;
        let frames = buffer.frames();
        let remaining = frames.saturating_sub(source.cursor % frames + 1);
        Some(remaining as f64 / f64::from(buffer.sample_rate()))
    }

    /// Loop iterations started since playback began
    pub fn iterations(&self) -> u64 {
        self.source.as_ref().map_or(0, |s| s.iterations)
    }

    /// Largest gap between consecutive iterations, in frames
    pub fn max_loop_gap_frames(&self) -> u64 {
        self.source.as_ref().map_or(0, |s| s.max_gap_frames)
    }

    /// Clock frame the current iteration started on
    pub fn iteration_start(&self) -> Option<u64> {
        self.source.as_ref().map(|s| s.iteration_start)
    }

    /// Snapshot for diagnostics
    pub fn runtime_state(&self, now: u64) -> TrackRuntimeState {
        TrackRuntimeState {
            id: self.id.to_string(),
            enabled: self.enabled,
            volume: self.volume,
            fade_gain: self.fade.gain_at(now),
            cursor_frames: self.source.as_ref().map_or(0, |s| s.cursor),
            loop_duration: self.buffer.as_ref().map(|b| b.duration_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossfade::FadePhase;

    fn buffer(frames: usize) -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::from_fn(frames, 100, |_| (1.0, 1.0)))
    }

    fn voice_with_buffer(frames: usize) -> TrackVoice {
        let mut voice = TrackVoice::new(Arc::from("rain"), 1.0, true);
        voice.install_buffer(0, buffer(frames), 0, FadeCurve::Linear);
        voice
    }

    fn render(voice: &mut TrackVoice, now: u64, frames: usize, bus: &MasterBus) -> (Vec<f32>, RenderReport) {
        let mut out = vec![0.0; frames * 2];
        let report = voice.render(&mut out, now, bus);
        (out, report)
    }

    #[test]
    fn test_enable_without_buffer_is_inert() {
        let mut voice = TrackVoice::new(Arc::from("fire"), 0.8, true);
        assert_eq!(voice.set_enabled(0, true, 10, FadeCurve::Linear), VoiceTransition::Inert);
        assert!(voice.is_enabled());
        assert!(!voice.is_playing());

        let (out, _) = render(&mut voice, 0, 8, &MasterBus::new(1.0, 0.0, FadeCurve::Linear));
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(voice.loop_time_remaining(), None);
    }

    #[test]
    fn test_buffer_install_starts_enabled_voice() {
        let mut voice = TrackVoice::new(Arc::from("fire"), 0.8, true);
        voice.set_enabled(0, true, 10, FadeCurve::Linear);

        let (old, transition) = voice.install_buffer(5, buffer(50), 10, FadeCurve::Linear);
        assert!(old.is_none());
        assert_eq!(transition, VoiceTransition::Started);
        assert!(voice.is_playing());
        assert_eq!(voice.fade().phase(), FadePhase::RampingIn);
    }

    #[test]
    fn test_cleared_voice_is_silent_until_next_install() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(100);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);

        let (old, transition) = voice.clear_buffer();
        assert_eq!(old.map(|b| b.frames()), Some(100));
        assert_eq!(transition, VoiceTransition::Stopped);
        assert!(voice.is_enabled());

        let (out, _) = render(&mut voice, 0, 8, &bus);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(voice.loop_time_remaining(), None);

        let (_, transition) = voice.install_buffer(8, buffer(20), 0, FadeCurve::Linear);
        assert_eq!(transition, VoiceTransition::Started);
        assert_eq!(voice.loop_time_remaining(), Some(0.19));
    }

    #[test]
    fn test_ramp_out_stops_only_at_zero_gain() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(1000);

        assert_eq!(voice.set_enabled(0, true, 0, FadeCurve::Linear), VoiceTransition::Started);
        render(&mut voice, 0, 10, &bus);

        assert_eq!(voice.set_enabled(10, false, 20, FadeCurve::Linear), VoiceTransition::RampingOut);
        let (out, report) = render(&mut voice, 10, 10, &bus);
        assert!(!report.stopped);
        assert!(voice.is_playing());
        assert!(out[0] > 0.9 && out[18] > 0.0);

        let (_, report) = render(&mut voice, 20, 20, &bus);
        assert!(report.stopped);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_zero_ramp_disable_stops_immediately() {
        let mut voice = voice_with_buffer(100);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);
        assert_eq!(voice.set_enabled(1, false, 0, FadeCurve::Linear), VoiceTransition::Stopped);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_reenable_mid_fade_resumes_position() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(1000);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);
        render(&mut voice, 0, 30, &bus);

        voice.set_enabled(30, false, 100, FadeCurve::Linear);
        render(&mut voice, 30, 10, &bus);
        let cursor = voice.runtime_state(40).cursor_frames;

        assert_eq!(voice.set_enabled(40, true, 100, FadeCurve::Linear), VoiceTransition::Resumed);
        assert_eq!(voice.runtime_state(40).cursor_frames, cursor);
        assert!((voice.fade().gain_at(40) - 0.9).abs() < 1e-3);
    }

    #[test]
    fn test_element_voice_rewinds_instead_of_releasing() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = TrackVoice::new(Arc::from("wind"), 1.0, false);
        voice.install_buffer(0, buffer(100), 0, FadeCurve::Linear);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);
        render(&mut voice, 0, 40, &bus);

        voice.set_enabled(40, false, 0, FadeCurve::Linear);
        let state = voice.runtime_state(40);
        assert_eq!(state.cursor_frames, 0);
        assert!(voice.iteration_start().is_some());
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_schedule_next_iteration_within_lookahead() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(100);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);

        assert!(voice.schedule_next_iteration(0, 32).is_none());
        render(&mut voice, 0, 80, &bus);

        let scheduled = voice.schedule_next_iteration(80, 32).expect("queued");
        assert_eq!(scheduled.start_frame, 100);
        assert_eq!(scheduled.iteration, 2);
        assert!(voice.schedule_next_iteration(80, 32).is_none());

        let (_, report) = render(&mut voice, 80, 40, &bus);
        assert_eq!(report.wraps, 1);
        assert_eq!(voice.iteration_start(), Some(100));
        assert_eq!(voice.max_loop_gap_frames(), 0);
    }

    #[test]
    fn test_loop_time_remaining_range() {
        let bus = MasterBus::new(1.0, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(100);
        assert_eq!(voice.loop_time_remaining(), None);

        voice.set_enabled(0, true, 0, FadeCurve::Linear);
        assert_eq!(voice.loop_time_remaining(), Some(0.99));

        render(&mut voice, 0, 99, &bus);
        assert_eq!(voice.loop_time_remaining(), Some(0.0));

        render(&mut voice, 99, 1, &bus);
        assert_eq!(voice.loop_time_remaining(), Some(0.99));
    }

    #[test]
    fn test_volume_change_is_instant() {
        let bus = MasterBus::new(0.5, 0.0, FadeCurve::Linear);
        let mut voice = voice_with_buffer(100);
        voice.set_enabled(0, true, 0, FadeCurve::Linear);
        voice.set_volume(0.4);

        let (out, _) = render(&mut voice, 0, 1, &bus);
        assert!((out[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_set_state_transitions_once() {
        let mut voice = voice_with_buffer(100);
        assert_eq!(
            voice.set_state(0, true, 0.6, 50, FadeCurve::Linear),
            VoiceTransition::Started
        );
        assert_eq!(
            voice.set_state(10, true, 0.3, 50, FadeCurve::Linear),
            VoiceTransition::Unchanged
        );
        assert_eq!(voice.volume(), 0.3);
        assert_eq!(voice.fade().ramp_duration_frames(), Some(50));
    }
}
