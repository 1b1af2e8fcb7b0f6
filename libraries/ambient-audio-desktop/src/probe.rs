//! Output device discovery
//!
//! The probe runs once at startup. A usable default output device means the
//! engine gets the graph backend at the device's native rate; anything else
//! selects the ramp-less fallback.

use crate::error::{AudioError, Result};
use crate::output::supports_format;
use ambient_mixer::{BackendProbe, GraphCapabilities, MixerError};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SupportedStreamConfig};
use tracing::debug;

/// A device and the configuration the output stream will use
pub struct OutputTarget {
    /// Output device
    pub device: Device,
    /// Device's default output configuration
    pub config: SupportedStreamConfig,
    /// Human-readable device name
    pub name: String,
}

impl std::fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputTarget")
            .field("name", &self.name)
            .field("sample_rate", &self.config.sample_rate())
            .field("channels", &self.config.channels())
            .field("sample_format", &self.config.sample_format())
            .finish()
    }
}

/// Probes the default host's default output device
#[derive(Debug)]
pub struct CpalProbe {
    target: std::result::Result<OutputTarget, String>,
}

impl CpalProbe {
    /// Query the default output device and its default configuration
    pub fn default_output() -> Self {
        let target = Self::open_default().map_err(|e| e.to_string());
        if let Err(reason) = &target {
            debug!(reason = %reason, "No usable output device");
        }
        Self { target }
    }

    fn open_default() -> Result<OutputTarget> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::DeviceNotFound)?;

        let config = device.default_output_config()?;
        if config.channels() == 0 {
            return Err(AudioError::UnsupportedFormat("Device has no output channels".into()));
        }
        if !supports_format(config.sample_format()) {
            return Err(AudioError::UnsupportedFormat(format!(
                "Output sample format {:?}",
                config.sample_format()
            )));
        }

        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());

        Ok(OutputTarget {
            device,
            config,
            name,
        })
    }

    /// Device sample rate, when a device was found
    pub fn sample_rate(&self) -> Option<u32> {
        self.target.as_ref().ok().map(|t| t.config.sample_rate())
    }

    /// Why no device is available, if none is
    pub fn failure(&self) -> Option<&str> {
        self.target.as_ref().err().map(String::as_str)
    }

    /// Hand over the device for the output stream
    pub fn into_target(self) -> Option<OutputTarget> {
        self.target.ok()
    }
}

impl BackendProbe for CpalProbe {
    fn probe(&self) -> ambient_mixer::Result<GraphCapabilities> {
        match &self.target {
            Ok(target) => Ok(GraphCapabilities {
                device: target.name.clone(),
                sample_rate: target.config.sample_rate(),
                channels: target.config.channels(),
            }),
            Err(reason) => Err(MixerError::BackendUnavailable(reason.clone())),
        }
    }
}
