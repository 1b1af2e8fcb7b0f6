/// Application configuration
use crate::error::{CliError, Result};
use ambient_mixer::{default_tracks, EngineConfig, PresetBank, TrackDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Directory holding one loop file per track
    #[serde(default = "default_loops_dir")]
    pub loops_dir: PathBuf,

    /// Track catalog (the five stock layers when omitted)
    #[serde(default = "default_tracks")]
    pub tracks: Vec<TrackDescriptor>,

    /// Presets available at startup
    #[serde(default)]
    pub presets: PresetBank,

    /// Skip the audio graph and use the ramp-less fallback
    #[serde(default)]
    pub force_fallback: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            loops_dir: default_loops_dir(),
            tracks: default_tracks(),
            presets: PresetBank::default(),
            force_fallback: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// `path` defaults to `ambiently.toml` in the working directory; a missing
    /// file is not an error. `AMBIENTLY_`-prefixed variables override the file,
    /// with `__` between nesting levels (`AMBIENTLY_ENGINE__MASTER_VOLUME=0.5`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        let config_path = path.map_or_else(|| PathBuf::from("ambiently.toml"), Path::to_path_buf);
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        } else if path.is_some() {
            return Err(CliError::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        // Override with environment variables (prefixed with AMBIENTLY_)
        settings = settings.add_source(
            config::Environment::with_prefix("AMBIENTLY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(CliError::Config("At least one track is required".into()));
        }

        let mut ids = HashSet::new();
        let mut hotkeys = HashSet::new();
        for track in &self.tracks {
            if track.id.trim().is_empty() {
                return Err(CliError::Config("Track id must not be empty".into()));
            }
            if !ids.insert(track.id.as_str()) {
                return Err(CliError::Config(format!("Duplicate track id '{}'", track.id)));
            }
            if let Some(key) = track.hotkey {
                if key > 9 {
                    return Err(CliError::Config(format!(
                        "Hotkey for '{}' must be a digit, got {}",
                        track.id, key
                    )));
                }
                if !hotkeys.insert(key) {
                    return Err(CliError::Config(format!("Hotkey {key} assigned twice")));
                }
            }
        }

        Ok(())
    }

    /// Loop file for a track
    pub fn loop_path(&self, track: &TrackDescriptor) -> PathBuf {
        self.loops_dir.join(&track.file_name)
    }
}

fn default_loops_dir() -> PathBuf {
    PathBuf::from("./loops")
}
