/// Interactive session: maps commands onto the engine
use crate::command::{Command, Target, HELP};
use ambient_mixer::{AmbientEngine, BufferAvailability, PresetBank, SaveOutcome};
use std::fmt::Write as _;

/// What the host loop should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Print this and keep going
    Text(String),
    /// Start the output device, then keep going
    Resume,
    Quit,
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

/// Preset bank plus the name of the preset last applied
#[derive(Debug, Default)]
pub struct Session {
    bank: PresetBank,
    current: Option<String>,
}

impl Session {
    pub fn new(bank: PresetBank) -> Self {
        Self {
            bank,
            current: None,
        }
    }

    pub fn bank(&self) -> &PresetBank {
        &self.bank
    }

    /// Name of the preset last loaded or saved
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn execute(&mut self, engine: &mut AmbientEngine, command: Command) -> Reply {
        match command {
            Command::Toggle(target) => {
                let (label, result) = match target {
                    Target::Id(id) => {
                        let result = engine.toggle_track(&id);
                        (id, result)
                    }
                    Target::Hotkey(digit) => (format!("key {digit}"), engine.toggle_hotkey(digit)),
                };
                match result {
                    Some(true) => Reply::text(format!("{label}: on")),
                    Some(false) => Reply::text(format!("{label}: off")),
                    None => Reply::text(format!("No track for {label}")),
                }
            }
            Command::On(id) | Command::Off(id) if !has_track(engine, &id) => {
                Reply::text(format!("Unknown track '{id}'"))
            }
            Command::On(id) => {
                engine.set_track_enabled(&id, true);
                Reply::text(format!("{id}: on"))
            }
            Command::Off(id) => {
                engine.set_track_enabled(&id, false);
                Reply::text(format!("{id}: off"))
            }
            Command::Volume { id, .. } if !has_track(engine, &id) => {
                Reply::text(format!("Unknown track '{id}'"))
            }
            Command::Volume { id, volume } => {
                engine.set_track_volume(&id, volume);
                let applied = engine.state().track(&id).map_or(0.0, |t| t.volume);
                Reply::text(format!("{id}: volume {applied:.2}"))
            }
            Command::Master(volume) => {
                engine.set_master_volume(volume);
                Reply::text(format!("master {:.2}", engine.state().master_volume))
            }
            Command::Fade(secs) => {
                engine.set_crossfade(secs);
                Reply::text(format!("crossfade {:.2}s", engine.state().crossfade_secs))
            }
            Command::Curve(curve) => {
                engine.set_fade_curve(curve);
                Reply::text(format!("curve {curve:?}"))
            }
            Command::All => {
                let was_playing = !engine.state().enabled_ids().is_empty();
                if engine.toggle_all() {
                    Reply::text("Restored paused tracks")
                } else if was_playing {
                    Reply::text("Paused")
                } else {
                    Reply::text("Nothing to restore")
                }
            }
            Command::Stop => {
                engine.stop_all();
                Reply::text("Stopped")
            }
            Command::Save { name, overwrite } => {
                match self.bank.save(&name, &engine.state(), overwrite) {
                    SaveOutcome::Created => {
                        self.current = Some(name.clone());
                        Reply::text(format!("Saved '{name}'"))
                    }
                    SaveOutcome::Overwritten => {
                        self.current = Some(name.clone());
                        Reply::text(format!("Overwrote '{name}'"))
                    }
                    SaveOutcome::NameTaken => Reply::text(format!(
                        "'{name}' exists; use 'save {name} !' to overwrite"
                    )),
                }
            }
            Command::Load(name) => match self.bank.get(&name).cloned() {
                Some(preset) => self.apply(engine, &preset),
                None => Reply::text(format!("No preset '{name}'")),
            },
            Command::Next => match self.bank.next_after(self.current.as_deref()).cloned() {
                Some(preset) => self.apply(engine, &preset),
                None => Reply::text("No presets"),
            },
            Command::Delete(name) => {
                if self.bank.delete(&name) {
                    if self.current.as_deref() == Some(name.as_str()) {
                        self.current = None;
                    }
                    Reply::text(format!("Deleted '{name}'"))
                } else {
                    Reply::text(format!("No preset '{name}'"))
                }
            }
            Command::Presets => {
                if self.bank.is_empty() {
                    return Reply::text("No presets");
                }
                let lines: Vec<String> = self
                    .bank
                    .names()
                    .into_iter()
                    .map(|name| {
                        let marker = if self.current.as_deref() == Some(name) { "*" } else { " " };
                        format!("{marker} {name}")
                    })
                    .collect();
                Reply::text(lines.join("\n"))
            }
            Command::Status => Reply::Text(status(engine)),
            Command::Dump => match serde_json::to_string_pretty(
                &engine.snapshot_preset(self.current.as_deref().unwrap_or("current")),
            ) {
                Ok(json) => Reply::Text(json),
                Err(e) => Reply::text(format!("Cannot serialize state: {e}")),
            },
            Command::Resume => Reply::Resume,
            Command::Help => Reply::text(HELP),
            Command::Quit => Reply::Quit,
        }
    }

    fn apply(&mut self, engine: &mut AmbientEngine, preset: &ambient_mixer::Preset) -> Reply {
        let ignored = engine.apply_preset(preset);
        self.current = Some(preset.name.clone());

        if ignored.is_empty() {
            Reply::text(format!("Loaded '{}'", preset.name))
        } else {
            Reply::text(format!(
                "Loaded '{}' (ignored unknown tracks: {})",
                preset.name,
                ignored.join(", ")
            ))
        }
    }
}

fn has_track(engine: &AmbientEngine, id: &str) -> bool {
    engine.descriptors().iter().any(|d| d.id == id)
}

/// Human-readable mixer summary
pub fn status(engine: &mut AmbientEngine) -> String {
    let cpu = engine.get_cpu_usage();
    let state = engine.state();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} | master {:.2} | crossfade {:.2}s | cpu {:.1}%",
        engine.backend_kind().name(),
        state.master_volume,
        state.crossfade_secs,
        cpu
    );

    for (descriptor, track) in engine.descriptors().iter().zip(&state.tracks) {
        let key = descriptor
            .hotkey
            .map_or_else(|| " ".to_string(), |k| k.to_string());
        let availability = match engine.availability(&descriptor.id) {
            BufferAvailability::Ready => "ready".to_string(),
            BufferAvailability::Pending => "loading".to_string(),
            BufferAvailability::Unavailable(reason) => format!("unavailable: {reason}"),
        };
        let remaining = engine
            .get_loop_time_remaining(&descriptor.id)
            .map(|s| format!(" | loop {s:.1}s left"))
            .unwrap_or_default();

        let _ = writeln!(
            out,
            "[{key}] {:<8} {:<3} {:.2} ({availability}){remaining}",
            descriptor.name,
            if track.enabled { "on" } else { "off" },
            track.volume,
        );
    }

    out.trim_end().to_string()
}
