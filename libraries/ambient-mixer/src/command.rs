//! Messages between the control side and the audio tick

use crate::buffer::DecodedBuffer;
use crate::crossfade::FadeCurve;
use crate::preset::TransitionPlan;
use std::sync::Arc;

/// Control -> tick
///
/// Track ids are resolved to slots on the control side; the tick never looks
/// up strings.
#[derive(Debug)]
pub enum MixerCommand {
    /// Master volume, applied instantly
    SetMasterVolume(f32),

    /// Crossfade for ramps started from now on
    SetCrossfade(f32),

    /// Ramp shape for ramps started from now on
    SetFadeCurve(FadeCurve),

    /// Enabled + volume for one track
    SetTrackState {
        /// Voice slot
        slot: usize,
        /// Target enabled flag
        enabled: bool,
        /// Target volume
        volume: f32,
    },

    /// Enable or disable one track
    SetTrackEnabled {
        /// Voice slot
        slot: usize,
        /// Target enabled flag
        enabled: bool,
    },

    /// Volume of one track, applied instantly
    SetTrackVolume {
        /// Voice slot
        slot: usize,
        /// Target volume
        volume: f32,
    },

    /// Whole preset or batch, applied within one block
    ApplyTransition(TransitionPlan),

    /// Ramp every voice to silence
    StopAll,

    /// Freshly decoded buffer for a slot
    InstallBuffer {
        /// Voice slot
        slot: usize,
        /// Decoded loop
        buffer: Arc<DecodedBuffer>,
    },

    /// Silence a slot whose reload failed
    ClearBuffer {
        /// Voice slot
        slot: usize,
    },

    /// Leave the suspended state
    Resume,

    /// Stop everything, release buffers, go silent
    Shutdown,
}

/// Tick -> control notifications
///
/// Sent with `try_send`; when the host does not drain them they are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// A voice began producing frames
    VoiceStarted {
        /// Track id
        id: Arc<str>,
    },

    /// A voice finished its ramp-out and stopped
    VoiceStopped {
        /// Track id
        id: Arc<str>,
    },

    /// Next loop iteration queued ahead of the boundary
    LoopScheduled {
        /// Track id
        id: Arc<str>,
        /// Iteration number being queued
        iteration: u64,
        /// Clock frame it starts on
        start_frame: u64,
    },

    /// A decoded buffer reached the voice
    BufferInstalled {
        /// Track id
        id: Arc<str>,
    },

    /// Tick shut down; no more events follow
    Disposed,
}

/// Allocations the tick hands back so they are freed on the control side
#[derive(Debug)]
pub(crate) enum Retired {
    /// Buffer replaced, cleared or released at shutdown
    Buffer(Arc<DecodedBuffer>),
    /// Preset plan after its directives were applied
    Plan(TransitionPlan),
}
