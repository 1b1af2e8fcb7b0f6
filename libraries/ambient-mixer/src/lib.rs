//! Real-time ambient sound mixing engine
//!
//! Blends independently looping ambient layers (rain, fire, wind, ...) with
//! per-layer and master gain, crossfaded enable/disable, and atomic preset
//! recall. Platform-agnostic: audio devices and codecs plug in through
//! [`BackendProbe`] and [`SourceDecoder`].
//!
//! # Architecture
//!
//! - [`AmbientEngine`]: control side, called by the host
//! - [`MixerProcessor`]: audio tick, the only writer of voice state
//! - [`TrackVoice`]: one looping layer with its [`CrossfadeScheduler`]
//! - [`MasterBus`]: `master × volume × ramp` gain law
//! - [`BackendSelector`]: one-time choice between [`GraphBackend`] and the
//!   ramp-less [`ElementBackend`]
//! - [`PresetApplier`]: precomputed, single-command preset transitions
//! - [`CpuSampler`]: smoothed tick load
//!
//! # Example
//!
//! ```
//! use ambient_mixer::{
//!     default_tracks, AmbientEngine, AudioSource, BackendSelector, DecodedBuffer,
//!     EngineConfig, FixedProbe, GraphCapabilities, Result, SourceDecoder,
//! };
//! use std::sync::Arc;
//!
//! struct Silence;
//!
//! impl SourceDecoder for Silence {
//!     fn decode(&self, _: &AudioSource, rate: u32) -> Result<DecodedBuffer> {
//!         Ok(DecodedBuffer::from_fn(rate as usize, rate, |_| (0.0, 0.0)))
//!     }
//! }
//!
//! let backend = BackendSelector::select(&FixedProbe::available(GraphCapabilities {
//!     device: "offline".into(),
//!     sample_rate: 48_000,
//!     channels: 2,
//! }));
//! let (mut engine, mut processor) =
//!     AmbientEngine::new(default_tracks(), backend, Arc::new(Silence), EngineConfig::default());
//!
//! let outcome = engine.load_buffer("rain", &AudioSource::Path("rain.wav".into()));
//! assert!(outcome.is_loaded());
//!
//! engine.set_track_enabled("rain", true);
//! let mut out = vec![0.0f32; 1024];
//! processor.process(&mut out, 2);
//!
//! assert!(engine.get_loop_time_remaining("rain").is_some());
//! engine.dispose();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod buffer;
mod bus;
mod command;
mod config;
mod cpu;
mod crossfade;
mod engine;
mod error;
mod loader;
mod mixer;
mod preset;
mod telemetry;
mod types;
mod voice;

pub use backend::{
    AudioBackend, BackendKind, BackendProbe, BackendSelector, ElementBackend, FixedProbe,
    GraphBackend, GraphCapabilities,
};
pub use buffer::{AudioSource, BufferAvailability, BufferStore, DecodedBuffer, LoadOutcome, SourceDecoder};
pub use bus::{MasterBus, MAX_CROSSFADE_SECS};
pub use command::{MixerCommand, MixerEvent};
pub use config::EngineConfig;
pub use cpu::{CpuSampler, LoadMeter};
pub use crossfade::{CrossfadeScheduler, FadeCompletion, FadeCurve, FadePhase};
pub use engine::AmbientEngine;
pub use error::{MixerError, Result};
pub use loader::{BufferLoader, LoadRequest, LoadResult};
pub use mixer::MixerProcessor;
pub use preset::{PresetApplier, PresetBank, SaveOutcome, TrackDirective, TransitionPlan};
pub use telemetry::LoopTelemetry;
pub use types::{
    clamp_unit, default_tracks, MixerState, Preset, TrackDescriptor, TrackRuntimeState, TrackState,
};
pub use voice::{RenderReport, ScheduledIteration, TrackVoice, VoiceTransition};
