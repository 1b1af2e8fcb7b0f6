//! Playback backend selection
//!
//! Two backends exist:
//! - [`GraphBackend`]: real-time graph with per-voice gain ramps and
//!   look-ahead loop scheduling.
//! - [`ElementBackend`]: one repeating player per track whose volume is set
//!   directly to `master × track volume`. No ramps; enable/disable is an
//!   instant step. This is the documented degradation when no graph can be
//!   built.
//!
//! The choice is made once by [`BackendSelector::select`] and never revisited
//! for the lifetime of an engine.

use crate::error::{MixerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Which backend an engine runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Real-time audio graph
    Graph,

    /// Repeating player elements (fallback)
    Element,
}

impl BackendKind {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Graph => "Audio graph",
            Self::Element => "Player elements",
        }
    }

    /// Detailed description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Graph => "Per-voice gain ramps with look-ahead loop scheduling",
            Self::Element => "Direct volume, instant on/off (no crossfade)",
        }
    }
}

/// Capabilities a backend exposes to the mixer
///
/// The mixer asks these questions instead of probing for individual
/// operations at call time.
pub trait AudioBackend: Send + fmt::Debug {
    /// Backend identity
    fn kind(&self) -> BackendKind;

    /// Ramp length actually used for a requested crossfade duration
    fn ramp_seconds(&self, requested: f32) -> f32;

    /// How far ahead of a loop boundary the next iteration is queued
    ///
    /// Zero means the backend loops natively (the player wraps on its own).
    fn loop_lookahead_frames(&self, block_frames: usize) -> u64;

    /// Whether a stopped voice gives its playback source back
    ///
    /// Graph sources are one-shot and are rebuilt on the next start; player
    /// elements are kept and rewound.
    fn releases_source_on_stop(&self) -> bool;
}

/// What the graph probe found on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCapabilities {
    /// Output device name
    pub device: String,

    /// Device sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,
}

/// Real-time graph backend
#[derive(Debug, Clone, Default)]
pub struct GraphBackend {
    capabilities: Option<GraphCapabilities>,
}

impl GraphBackend {
    /// Create a graph backend for a probed device
    pub fn new(capabilities: GraphCapabilities) -> Self {
        Self {
            capabilities: Some(capabilities),
        }
    }

    /// Probed device, if any (offline graphs have none)
    pub fn capabilities(&self) -> Option<&GraphCapabilities> {
        self.capabilities.as_ref()
    }
}

impl AudioBackend for GraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn ramp_seconds(&self, requested: f32) -> f32 {
        requested.max(0.0)
    }

    fn loop_lookahead_frames(&self, block_frames: usize) -> u64 {
        // Two ticks: the next iteration is always queued a full tick early
        2 * block_frames.max(1) as u64
    }

    fn releases_source_on_stop(&self) -> bool {
        true
    }
}

/// Fallback backend: repeating player elements
#[derive(Debug, Clone, Default)]
pub struct ElementBackend {
    reason: Option<String>,
}

impl ElementBackend {
    /// Create the fallback backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the fallback backend, remembering why the graph was refused
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    /// Why the graph backend was not used
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl AudioBackend for ElementBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Element
    }

    fn ramp_seconds(&self, _requested: f32) -> f32 {
        0.0
    }

    fn loop_lookahead_frames(&self, _block_frames: usize) -> u64 {
        0
    }

    fn releases_source_on_stop(&self) -> bool {
        false
    }
}

/// Checks whether a real-time graph can be built
pub trait BackendProbe {
    /// Returns the graph capabilities, or [`MixerError::BackendUnavailable`]
    fn probe(&self) -> Result<GraphCapabilities>;
}

/// Probe with a fixed answer
///
/// Used for offline rendering, tests, and hosts that force the fallback.
#[derive(Debug, Clone)]
pub struct FixedProbe {
    answer: std::result::Result<GraphCapabilities, String>,
}

impl FixedProbe {
    /// A probe that always finds a graph
    pub fn available(capabilities: GraphCapabilities) -> Self {
        Self {
            answer: Ok(capabilities),
        }
    }

    /// A probe that always refuses
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            answer: Err(reason.into()),
        }
    }
}

impl BackendProbe for FixedProbe {
    fn probe(&self) -> Result<GraphCapabilities> {
        self.answer
            .clone()
            .map_err(MixerError::BackendUnavailable)
    }
}

/// One-time backend selection
pub struct BackendSelector;

impl BackendSelector {
    /// Probe once and pick a backend
    ///
    /// A refused probe is not an error: the element backend is returned.
    pub fn select(probe: &dyn BackendProbe) -> Box<dyn AudioBackend> {
        match probe.probe() {
            Ok(capabilities) => {
                info!(
                    device = %capabilities.device,
                    sample_rate = capabilities.sample_rate,
                    channels = capabilities.channels,
                    "Using audio graph backend"
                );
                Box::new(GraphBackend::new(capabilities))
            }
            Err(err) => {
                warn!(error = %err, "Audio graph unavailable, falling back to player elements (no crossfade)");
                Box::new(ElementBackend::because(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> GraphCapabilities {
        GraphCapabilities {
            device: "Test Device".to_string(),
            sample_rate: 48_000,
            channels: 2,
        }
    }

    #[test]
    fn test_select_graph_when_device_answers() {
        let backend = BackendSelector::select(&FixedProbe::available(caps()));
        assert_eq!(backend.kind(), BackendKind::Graph);
        assert_eq!(backend.ramp_seconds(1.25), 1.25);
        assert!(backend.loop_lookahead_frames(512) >= 512);
    }

    #[test]
    fn test_select_element_without_device() {
        let backend = BackendSelector::select(&FixedProbe::unavailable("no device"));
        assert_eq!(backend.kind(), BackendKind::Element);
        assert_eq!(backend.ramp_seconds(3.0), 0.0);
        assert_eq!(backend.loop_lookahead_frames(512), 0);
        assert!(!backend.releases_source_on_stop());
    }

    #[test]
    fn test_backend_names() {
        assert!(!BackendKind::Graph.name().is_empty());
        assert!(!BackendKind::Element.description().is_empty());
        assert_ne!(BackendKind::Graph.name(), BackendKind::Element.name());
    }

    #[test]
    fn test_element_backend_keeps_reason() {
        let backend = ElementBackend::because("exclusive mode");
        assert_eq!(backend.reason(), Some("exclusive mode"));
        assert_eq!(ElementBackend::new().reason(), None);
    }

    #[test]
    fn test_graph_backend_ramps_never_negative() {
        let backend = GraphBackend::new(caps());
        assert_eq!(backend.ramp_seconds(-1.0), 0.0);
        assert_eq!(backend.capabilities().map(|c| c.channels), Some(2));
    }
}
