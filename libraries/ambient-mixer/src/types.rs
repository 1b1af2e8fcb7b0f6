//! Core types shared between the control side and the audio tick

use serde::{Deserialize, Serialize};

/// Clamp a linear gain or volume to `[0, 1]`
///
/// NaN maps to silence so a bad value from the host can never produce noise.
#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Static description of one ambient layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Unique, stable key ("rain", "fire", ...)
    pub id: String,

    /// Display name
    pub name: String,

    /// Source file name inside the loops directory
    pub file_name: String,

    /// Volume used when no saved state exists (0.0-1.0)
    pub default_volume: f32,

    /// Hotkey digit that toggles this track
    pub hotkey: Option<u8>,
}

impl TrackDescriptor {
    /// Create a descriptor whose source file is `<id>.wav`
    pub fn new(id: impl Into<String>, name: impl Into<String>, default_volume: f32) -> Self {
        let id = id.into();
        Self {
            file_name: format!("{id}.wav"),
            id,
            name: name.into(),
            default_volume: clamp_unit(default_volume),
            hotkey: None,
        }
    }

    /// Assign a hotkey digit
    pub fn with_hotkey(mut self, digit: u8) -> Self {
        self.hotkey = Some(digit);
        self
    }
}

/// The five stock layers
pub fn default_tracks() -> Vec<TrackDescriptor> {
    vec![
        TrackDescriptor::new("rain", "Rain", 0.9).with_hotkey(1),
        TrackDescriptor::new("fire", "Fire", 0.8).with_hotkey(2),
        TrackDescriptor::new("wind", "Wind", 0.8).with_hotkey(3),
        TrackDescriptor::new("cafe", "Cafe", 0.7).with_hotkey(4),
        TrackDescriptor::new("bird", "Birds", 0.7).with_hotkey(5),
    ]
}

/// Host-facing state of one track (what presets store)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// Track id
    pub id: String,

    /// Whether the layer should be audible
    pub enabled: bool,

    /// Track volume (0.0-1.0)
    pub volume: f32,
}

impl TrackState {
    /// Create a track state, clamping the volume
    pub fn new(id: impl Into<String>, enabled: bool, volume: f32) -> Self {
        Self {
            id: id.into(),
            enabled,
            volume: clamp_unit(volume),
        }
    }
}

/// Tick-side view of one track, including derived values
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRuntimeState {
    /// Track id
    pub id: String,

    /// Requested enabled flag
    pub enabled: bool,

    /// Track volume (0.0-1.0)
    pub volume: f32,

    /// Current ramp gain (0.0-1.0), before volume and master
    pub fade_gain: f32,

    /// Playback cursor in frames within the current loop iteration
    pub cursor_frames: usize,

    /// Loop duration in seconds, once the buffer is decoded
    pub loop_duration: Option<f64>,
}

/// Named snapshot of the mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Name, unique within a preset bank
    pub name: String,

    /// Master volume (0.0-1.0)
    pub master_volume: f32,

    /// Crossfade duration in seconds
    pub crossfade_secs: f32,

    /// Per-track enabled + volume, in catalog order
    pub tracks: Vec<TrackState>,
}

/// Aggregate mixer state as requested by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerState {
    /// Master volume (0.0-1.0)
    pub master_volume: f32,

    /// Crossfade duration in seconds
    pub crossfade_secs: f32,

    /// One entry per configured track, in catalog order
    pub tracks: Vec<TrackState>,
}

impl MixerState {
    /// Initial state: every track disabled at its default volume
    pub fn initial(descriptors: &[TrackDescriptor], master_volume: f32, crossfade_secs: f32) -> Self {
        Self {
            master_volume: clamp_unit(master_volume),
            crossfade_secs: crossfade_secs.max(0.0),
            tracks: descriptors
                .iter()
                .map(|d| TrackState::new(d.id.clone(), false, d.default_volume))
                .collect(),
        }
    }

    /// Look up a track
    pub fn track(&self, id: &str) -> Option<&TrackState> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Look up a track mutably
    pub fn track_mut(&mut self, id: &str) -> Option<&mut TrackState> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Ids of all enabled tracks
    pub fn enabled_ids(&self) -> Vec<String> {
        self.tracks
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Capture this state as a named preset
    pub fn to_preset(&self, name: impl Into<String>) -> Preset {
        Preset {
            name: name.into(),
            master_volume: self.master_volume,
            crossfade_secs: self.crossfade_secs,
            tracks: self.tracks.clone(),
        }
    }
}
