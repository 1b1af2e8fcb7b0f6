//! Desktop audio for the ambiently mixer
//!
//! Plugs CPAL output and Symphonia decoding into [`ambient_mixer`].
//!
//! # Features
//!
//! - Default output device discovery ([`CpalProbe`]), selecting the graph
//!   backend at the device rate or the ramp-less fallback
//! - Whole-file decoding of WAV, FLAC, OGG, MP3, AAC ([`SymphoniaDecoder`]),
//!   folded to stereo and resampled to the mixer rate
//! - A dedicated audio thread owning the stream ([`DesktopOutput`])
//!
//! # Example
//!
//! ```no_run
//! use ambient_audio_desktop::DesktopMixer;
//! use ambient_mixer::{default_tracks, AudioSource, EngineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut mixer = DesktopMixer::open(default_tracks(), EngineConfig::default())?;
//!
//! let engine = mixer.engine_mut();
//! engine.load_buffer("rain", &AudioSource::Path("loops/rain.ogg".into()));
//! engine.set_track_enabled("rain", true);
//!
//! mixer.resume_if_suspended()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! mixer.dispose();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod error;
mod mixer;
mod output;
mod probe;

pub use decoder::{resample_stereo, SymphoniaDecoder};
pub use error::{AudioError, Result};
pub use mixer::{BackendPreference, DesktopMixer};
pub use output::DesktopOutput;
pub use probe::{CpalProbe, OutputTarget};
