//! Preset application and the named preset bank
//!
//! [`PresetApplier::plan`] turns a target preset into a [`TransitionPlan`]
//! outside the tick. The plan travels to the tick as a single command, so the
//! master change and every track directive land in the same block and no
//! observer can see a half-applied preset.

use crate::bus::MAX_CROSSFADE_SECS;
use crate::types::{clamp_unit, MixerState, Preset, TrackState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Target for one track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDirective {
    /// Voice slot (catalog index)
    pub slot: usize,
    /// Track id
    pub id: String,
    /// Target enabled flag
    pub enabled: bool,
    /// Target volume (0.0-1.0)
    pub volume: f32,
}

/// Complete, precomputed transition to a target mix
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    /// Master volume, applied before any track directive
    pub master_volume: f32,
    /// Crossfade for the ramps this plan starts
    pub crossfade_secs: f32,
    /// At most one directive per track
    pub directives: Vec<TrackDirective>,
    /// Preset entries naming tracks the engine does not know
    pub ignored: Vec<String>,
}

impl TransitionPlan {
    /// The mixer state after this plan has been applied to `state`
    pub fn apply_to(&self, state: &MixerState) -> MixerState {
        let mut next = state.clone();
        next.master_volume = self.master_volume;
        next.crossfade_secs = self.crossfade_secs;
        for directive in &self.directives {
            if let Some(track) = next.tracks.get_mut(directive.slot) {
                track.enabled = directive.enabled;
                track.volume = directive.volume;
            }
        }
        next
    }

    /// Whether the plan changes no track
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Computes atomic transitions
pub struct PresetApplier;

impl PresetApplier {
    /// Plan the transition from `current` to `preset`
    ///
    /// Tracks the preset does not mention are left unchanged. Entries for
    /// unknown ids are collected in [`TransitionPlan::ignored`]. If an id
    /// appears twice, the first entry wins.
    pub fn plan(current: &MixerState, preset: &Preset) -> TransitionPlan {
        let mut plan = Self::plan_tracks(current, &preset.tracks);
        plan.master_volume = clamp_unit(preset.master_volume);
        plan.crossfade_secs = if preset.crossfade_secs.is_finite() {
            preset.crossfade_secs.clamp(0.0, MAX_CROSSFADE_SECS)
        } else {
            0.0
        };
        plan
    }

    /// Plan a batch of track states, keeping master and crossfade
    pub fn plan_tracks(current: &MixerState, tracks: &[TrackState]) -> TransitionPlan {
        let mut seen = HashSet::new();
        let mut directives = Vec::with_capacity(tracks.len());
        let mut ignored = Vec::new();

        for entry in tracks {
            let Some(slot) = current.tracks.iter().position(|t| t.id == entry.id) else {
                warn!(id = %entry.id, "Preset references unknown track, ignoring entry");
                ignored.push(entry.id.clone());
                continue;
            };
            if !seen.insert(slot) {
                continue;
            }

            directives.push(TrackDirective {
                slot,
                id: entry.id.clone(),
                enabled: entry.enabled,
                volume: clamp_unit(entry.volume),
            });
        }

        directives.sort_by_key(|d| d.slot);

        TransitionPlan {
            master_volume: current.master_volume,
            crossfade_secs: current.crossfade_secs,
            directives,
            ignored,
        }
    }
}

/// Result of saving into a [`PresetBank`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New name
    Created,
    /// Existing preset replaced
    Overwritten,
    /// Name exists and overwrite was not requested; bank unchanged
    NameTaken,
}

/// Named presets in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetBank {
    presets: Vec<Preset>,
}

impl PresetBank {
    /// Create an empty bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Save `state` under `name`
    pub fn save(&mut self, name: &str, state: &MixerState, overwrite: bool) -> SaveOutcome {
        let name = name.trim();
        let preset = state.to_preset(name);

        match self.presets.iter_mut().find(|p| p.name == name) {
            Some(_) if !overwrite => SaveOutcome::NameTaken,
            Some(existing) => {
                *existing = preset;
                SaveOutcome::Overwritten
            }
            None => {
                self.presets.push(preset);
                SaveOutcome::Created
            }
        }
    }

    /// Look up a preset
    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// Remove a preset; returns whether it existed
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.name != name);
        self.presets.len() != before
    }

    /// Preset names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }

    /// Preset after `current`, wrapping around
    ///
    /// With no current (or an unknown one) the first preset is returned.
    pub fn next_after(&self, current: Option<&str>) -> Option<&Preset> {
        let index = current
            .and_then(|name| self.presets.iter().position(|p| p.name == name))
            .map_or(0, |i| (i + 1) % self.presets.len());
        self.presets.get(index)
    }

    /// Number of presets
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether the bank is empty
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_tracks;

    fn state() -> MixerState {
        let mut state = MixerState::initial(&default_tracks(), 0.8, 0.8);
        state.track_mut("fire").unwrap().enabled = true;
        state.track_mut("fire").unwrap().volume = 0.5;
        state
    }

    #[test]
    fn test_plan_sets_master_first_and_leaves_absent_tracks() {
        let preset = Preset {
            name: "Storm".into(),
            master_volume: 0.5,
            crossfade_secs: 1.0,
            tracks: vec![TrackState::new("rain", true, 0.7), TrackState::new("fire", false, 0.5)],
        };

        let plan = PresetApplier::plan(&state(), &preset);
        assert_eq!(plan.master_volume, 0.5);
        assert_eq!(plan.crossfade_secs, 1.0);
        assert_eq!(plan.directives.len(), 2);
        assert_eq!(plan.directives[0].id, "rain");
        assert_eq!(plan.directives[1].slot, 1);

        let next = plan.apply_to(&state());
        assert!(next.track("rain").unwrap().enabled);
        assert!(!next.track("fire").unwrap().enabled);
        assert_eq!(next.track("wind"), state().track("wind"));
    }

    #[test]
    fn test_unknown_and_duplicate_entries() {
        let tracks = vec![
            TrackState::new("thunder", true, 1.0),
            TrackState::new("wind", true, 0.2),
            TrackState::new("wind", false, 0.9),
        ];

        let plan = PresetApplier::plan_tracks(&state(), &tracks);
        assert_eq!(plan.ignored, vec!["thunder".to_string()]);
        assert_eq!(plan.directives.len(), 1);
        assert!(plan.directives[0].enabled);
        assert_eq!(plan.directives[0].volume, 0.2);
        assert_eq!(plan.master_volume, 0.8);
    }

    #[test]
    fn test_plan_clamps_values() {
        let preset = Preset {
            name: "Loud".into(),
            master_volume: 4.0,
            crossfade_secs: f32::INFINITY,
            tracks: vec![TrackState {
                id: "bird".into(),
                enabled: true,
                volume: -1.0,
            }],
        };
        let plan = PresetApplier::plan(&state(), &preset);
        assert_eq!(plan.master_volume, 1.0);
        assert_eq!(plan.crossfade_secs, 0.0);
        assert_eq!(plan.directives[0].volume, 0.0);
    }

    #[test]
    fn test_bank_save_overwrite_and_clash() {
        let mut bank = PresetBank::new();
        assert_eq!(bank.save("Focus", &state(), false), SaveOutcome::Created);

        let mut changed = state();
        changed.master_volume = 0.1;
        assert_eq!(bank.save("Focus", &changed, false), SaveOutcome::NameTaken);
        assert_eq!(bank.get("Focus").unwrap().master_volume, 0.8);

        assert_eq!(bank.save("Focus", &changed, true), SaveOutcome::Overwritten);
        assert_eq!(bank.get("Focus").unwrap().master_volume, 0.1);
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn test_bank_cycles_and_deletes() {
        let mut bank = PresetBank::new();
        assert!(bank.next_after(None).is_none());

        bank.save("A", &state(), false);
        bank.save("B", &state(), false);
        bank.save("C", &state(), false);

        assert_eq!(bank.next_after(None).unwrap().name, "A");
        assert_eq!(bank.next_after(Some("A")).unwrap().name, "B");
        assert_eq!(bank.next_after(Some("C")).unwrap().name, "A");
        assert_eq!(bank.next_after(Some("gone")).unwrap().name, "A");

        assert!(bank.delete("B"));
        assert!(!bank.delete("B"));
        assert_eq!(bank.names(), vec!["A", "C"]);
    }

    #[test]
    fn test_bank_serializes_as_list() {
        let mut bank = PresetBank::new();
        bank.save("Night", &state(), false);
        let json = serde_json::to_string(&bank).unwrap();
        assert!(json.starts_with('['));
        let back: PresetBank = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bank);
    }
}
