//! Decoded loop buffers and the per-track buffer cache

use crate::error::{MixerError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Fully decoded loop, interleaved stereo f32
///
/// Only complete buffers are ever constructed; voices never see a partial
/// decode.
#[derive(Clone, PartialEq)]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Build from interleaved samples with any channel count
    ///
    /// Mono is duplicated to both sides; channels beyond two are folded into
    /// left/right by averaging odd and even channels.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channels.max(1));
        let frames = samples.len() / channels;
        let mut stereo = Vec::with_capacity(frames * 2);

        for frame in samples.chunks_exact(channels) {
            let (left, right) = match channels {
                1 => (frame[0], frame[0]),
                2 => (frame[0], frame[1]),
                _ => {
                    let (mut l, mut r, mut nl, mut nr) = (0.0, 0.0, 0.0f32, 0.0f32);
                    for (i, s) in frame.iter().enumerate() {
                        if i % 2 == 0 {
                            l += s;
                            nl += 1.0;
                        } else {
                            r += s;
                            nr += 1.0;
                        }
                    }
                    (l / nl, r / nr.max(1.0))
                }
            };
            stereo.push(left);
            stereo.push(right);
        }

        Self {
            samples: stereo,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Build a stereo buffer from a per-frame generator
    pub fn from_fn(frames: usize, sample_rate: u32, mut f: impl FnMut(usize) -> (f32, f32)) -> Self {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let (l, r) = f(i);
            samples.push(l);
            samples.push(r);
        }
        Self {
            samples,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Number of stereo frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Whether the buffer holds no audio
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Loop duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Left/right sample pair at `frame`
    #[inline]
    pub fn frame(&self, frame: usize) -> (f32, f32) {
        let i = frame * 2;
        (self.samples[i], self.samples[i + 1])
    }
}

impl fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Where a track's audio comes from
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// File on disk
    Path(PathBuf),

    /// Encoded bytes already in memory
    Bytes {
        /// Encoded file contents
        data: Arc<[u8]>,
        /// Format hint ("wav", "ogg", ...)
        extension: Option<String>,
    },
}

impl AudioSource {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Path(path) => path.display().to_string(),
            AudioSource::Bytes { data, extension } => format!(
                "<{} bytes{}>",
                data.len(),
                extension.as_deref().map(|e| format!(" .{e}")).unwrap_or_default()
            ),
        }
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        AudioSource::Path(path)
    }
}

/// Turns an encoded source into a complete buffer
///
/// Implementations run on the host or a loader thread, never on the tick.
pub trait SourceDecoder: Send + Sync {
    /// Decode the whole source, converting to `target_sample_rate`
    fn decode(&self, source: &AudioSource, target_sample_rate: u32) -> Result<DecodedBuffer>;
}

/// Result of loading one track's buffer
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Buffer decoded and cached
    Loaded {
        /// Track id
        id: String,
        /// Loop duration in seconds
        duration_secs: f64,
    },

    /// Decode failed; the track stays silent
    Failed {
        /// Track id
        id: String,
        /// Why decoding failed
        reason: String,
    },
}

impl LoadOutcome {
    /// Track id
    pub fn id(&self) -> &str {
        match self {
            LoadOutcome::Loaded { id, .. } | LoadOutcome::Failed { id, .. } => id,
        }
    }

    /// Whether the buffer is usable
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// Whether a track can make sound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferAvailability {
    /// No load attempted yet
    Pending,

    /// Decoded and cached
    Ready,

    /// Last decode failed
    Unavailable(String),
}

#[derive(Debug, Clone)]
enum BufferEntry {
    Ready(Arc<DecodedBuffer>),
    Unavailable(String),
}

/// Decoded buffer cache keyed by track id
#[derive(Debug, Default)]
pub struct BufferStore {
    entries: HashMap<String, BufferEntry>,
}

impl BufferStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `source` synchronously and record the result
    pub fn load(
        &mut self,
        id: &str,
        decoder: &dyn SourceDecoder,
        source: &AudioSource,
        target_sample_rate: u32,
    ) -> LoadOutcome {
        let decoded = decoder.decode(source, target_sample_rate);
        self.insert_decoded(id, decoded)
    }

    /// Record a finished decode
    ///
    /// A success replaces whatever was cached. A failure marks the id
    /// unavailable and drops any earlier buffer.
    pub fn insert_decoded(&mut self, id: &str, decoded: Result<DecodedBuffer>) -> LoadOutcome {
        let decoded = decoded.and_then(|buffer| {
            if buffer.is_empty() {
                Err(MixerError::Decode("source contains no audio frames".into()))
            } else {
                Ok(buffer)
            }
        });

        match decoded {
            Ok(buffer) => {
                let duration_secs = buffer.duration_secs();
                info!(id, frames = buffer.frames(), duration_secs, "Buffer decoded");
                self.entries
                    .insert(id.to_string(), BufferEntry::Ready(Arc::new(buffer)));
                LoadOutcome::Loaded {
                    id: id.to_string(),
                    duration_secs,
                }
            }
            Err(err) => {
                let failure = MixerError::DecodeFailure {
                    id: id.to_string(),
                    reason: err.to_string(),
                };
                warn!(error = %failure, "Track will stay silent");

                self.entries
                    .insert(id.to_string(), BufferEntry::Unavailable(err.to_string()));
                LoadOutcome::Failed {
                    id: id.to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Cached buffer, if decoded
    pub fn buffer(&self, id: &str) -> Option<Arc<DecodedBuffer>> {
        match self.entries.get(id) {
            Some(BufferEntry::Ready(buffer)) => Some(Arc::clone(buffer)),
            _ => None,
        }
    }

    /// Availability of a track's buffer
    pub fn availability(&self, id: &str) -> BufferAvailability {
        match self.entries.get(id) {
            None => BufferAvailability::Pending,
            Some(BufferEntry::Ready(_)) => BufferAvailability::Ready,
            Some(BufferEntry::Unavailable(reason)) => BufferAvailability::Unavailable(reason.clone()),
        }
    }

    /// Number of decoded buffers
    pub fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, BufferEntry::Ready(_)))
            .count()
    }

    /// Release every cached buffer
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedDecoder {
        frames: usize,
        fail: bool,
    }

    impl SourceDecoder for ScriptedDecoder {
        fn decode(&self, _source: &AudioSource, rate: u32) -> Result<DecodedBuffer> {
            if self.fail {
                Err(MixerError::Decode("corrupt header".into()))
            } else {
                Ok(DecodedBuffer::from_fn(self.frames, rate, |_| (0.5, -0.5)))
            }
        }
    }

    fn source() -> AudioSource {
        AudioSource::Path(PathBuf::from("/loops/rain.wav"))
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let buffer = DecodedBuffer::from_interleaved(&[0.1, 0.2, 0.3], 1, 100);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.frame(1), (0.2, 0.2));
        assert!((buffer.duration_secs() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn multichannel_is_folded_to_stereo() {
        let buffer = DecodedBuffer::from_interleaved(&[1.0, 0.0, 0.0, 1.0], 4, 100);
        assert_eq!(buffer.frames(), 1);
        assert_eq!(buffer.frame(0), (0.5, 0.5));
    }

    #[test]
    fn load_caches_and_replaces() {
        let mut store = BufferStore::new();
        assert_eq!(store.availability("rain"), BufferAvailability::Pending);

        let outcome = store.load("rain", &ScriptedDecoder { frames: 100, fail: false }, &source(), 100);
        assert!(outcome.is_loaded());
        assert_eq!(store.buffer("rain").map(|b| b.frames()), Some(100));

        store.load("rain", &ScriptedDecoder { frames: 50, fail: false }, &source(), 100);
        assert_eq!(store.buffer("rain").map(|b| b.frames()), Some(50));
        assert_eq!(store.ready_count(), 1);
    }

    #[test]
    fn failure_marks_unavailable() {
        let mut store = BufferStore::new();
        let outcome = store.load("fire", &ScriptedDecoder { frames: 0, fail: true }, &source(), 100);

        assert!(!outcome.is_loaded());
        assert_eq!(outcome.id(), "fire");
        assert!(matches!(
            store.availability("fire"),
            BufferAvailability::Unavailable(_)
        ));
        assert!(store.buffer("fire").is_none());
    }

    #[test]
    fn failed_reload_drops_earlier_buffer() {
        let mut store = BufferStore::new();
        store.load("wind", &ScriptedDecoder { frames: 10, fail: false }, &source(), 100);
        let outcome = store.load("wind", &ScriptedDecoder { frames: 0, fail: true }, &source(), 100);

        assert!(!outcome.is_loaded());
        assert!(matches!(
            store.availability("wind"),
            BufferAvailability::Unavailable(_)
        ));
        assert!(store.buffer("wind").is_none());

        store.load("wind", &ScriptedDecoder { frames: 20, fail: false }, &source(), 100);
        assert_eq!(store.availability("wind"), BufferAvailability::Ready);
    }

    #[test]
    fn empty_decode_is_a_failure() {
        let mut store = BufferStore::new();
        let outcome = store.load("cafe", &ScriptedDecoder { frames: 0, fail: false }, &source(), 100);
        assert!(!outcome.is_loaded());
        assert!(store.buffer("cafe").is_none());
    }

    #[test]
    fn clear_releases_everything() {
        let mut store = BufferStore::new();
        store.load("rain", &ScriptedDecoder { frames: 10, fail: false }, &source(), 100);
        store.clear();
        assert_eq!(store.availability("rain"), BufferAvailability::Pending);
    }

    #[test]
    fn describe_sources() {
        let bytes = AudioSource::Bytes {
            data: Arc::from(vec![0u8; 4]),
            extension: Some("wav".into()),
        };
        assert_eq!(bytes.describe(), "<4 bytes .wav>");
        assert!(source().describe().ends_with("rain.wav"));
    }
}
