//! Control-side engine surface
//!
//! [`AmbientEngine`] is what the host talks to. It keeps a mirror of the
//! requested [`MixerState`], owns the [`BufferStore`] and turns every call
//! into [`MixerCommand`]s for the [`MixerProcessor`]. Nothing here touches
//! voice state directly.

use crate::backend::{AudioBackend, BackendKind};
use crate::buffer::{AudioSource, BufferAvailability, BufferStore, LoadOutcome, SourceDecoder};
use crate::bus::{MasterBus, MAX_CROSSFADE_SECS};
use crate::command::{MixerCommand, MixerEvent, Retired};
use crate::config::EngineConfig;
use crate::cpu::{CpuSampler, LoadMeter};
use crate::crossfade::FadeCurve;
use crate::error::MixerError;
use crate::loader::BufferLoader;
use crate::mixer::{MixerProcessor, TickLinks};
use crate::preset::{PresetApplier, TransitionPlan};
use crate::telemetry::LoopTelemetry;
use crate::types::{clamp_unit, MixerState, Preset, TrackDescriptor, TrackState};
use crate::voice::TrackVoice;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Control-side half of the mixing engine
pub struct AmbientEngine {
    descriptors: Vec<TrackDescriptor>,
    slots: HashMap<String, usize>,
    state: MixerState,
    store: BufferStore,
    decoder: Arc<dyn SourceDecoder>,
    loader: Option<BufferLoader>,
    backend_kind: BackendKind,
    config: EngineConfig,
    commands: Sender<MixerCommand>,
    events: Receiver<MixerEvent>,
    retired: Receiver<Retired>,
    ack: Receiver<()>,
    telemetry: Arc<LoopTelemetry>,
    cpu: CpuSampler,
    disposed: Arc<AtomicBool>,
    /// Tracks switched off by the last `toggle_all`
    paused: Vec<String>,
}

impl AmbientEngine {
    /// Build the engine and its tick
    ///
    /// Duplicate descriptor ids are dropped (first wins). Every track starts
    /// disabled at its default volume.
    pub fn new(
        descriptors: Vec<TrackDescriptor>,
        backend: Box<dyn AudioBackend>,
        decoder: Arc<dyn SourceDecoder>,
        config: EngineConfig,
    ) -> (Self, MixerProcessor) {
        let config = config.sanitized();

        let mut slots = HashMap::new();
        let mut unique = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if slots.contains_key(&descriptor.id) {
                warn!(id = %descriptor.id, "Duplicate track id, ignoring descriptor");
                continue;
            }
            slots.insert(descriptor.id.clone(), unique.len());
            unique.push(descriptor);
        }

        let state = MixerState::initial(&unique, config.master_volume, config.crossfade_secs);
        let releases = backend.releases_source_on_stop();
        let voices = unique
            .iter()
            .map(|d| TrackVoice::new(Arc::from(d.id.as_str()), d.default_volume, releases))
            .collect();

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(config.event_capacity);
        let (retired_tx, retired_rx) = bounded(unique.len() * 2 + 8);
        let (ack_tx, ack_rx) = bounded(1);
        let telemetry = Arc::new(LoopTelemetry::new(unique.len()));
        let meter = Arc::new(LoadMeter::new());
        let disposed = Arc::new(AtomicBool::new(false));

        let backend_kind = backend.kind();
        info!(
            backend = backend_kind.name(),
            tracks = unique.len(),
            sample_rate = config.sample_rate,
            block_frames = config.block_frames,
            "Ambient engine created"
        );
        if backend_kind == BackendKind::Element {
            info!("Crossfades are instantaneous on this backend");
        }

        let processor = MixerProcessor::new(
            voices,
            MasterBus::new(config.master_volume, config.crossfade_secs, config.fade_curve),
            backend,
            config.sample_rate,
            config.block_frames,
            config.start_suspended,
            TickLinks {
                commands: command_rx,
                events: event_tx,
                retired: retired_tx,
                ack: ack_tx,
                telemetry: Arc::clone(&telemetry),
                meter: Arc::clone(&meter),
                disposed: Arc::clone(&disposed),
            },
        );

        let engine = Self {
            descriptors: unique,
            slots,
            state,
            store: BufferStore::new(),
            decoder,
            loader: None,
            backend_kind,
            cpu: CpuSampler::new(meter, config.cpu_smoothing),
            config,
            commands: command_tx,
            events: event_rx,
            retired: retired_rx,
            ack: ack_rx,
            telemetry,
            disposed,
            paused: Vec::new(),
        };

        (engine, processor)
    }

    // ===== Buffers =====

    /// Decode a track's source on this thread and hand it to the voice
    ///
    /// Failure is reported in the outcome, never raised.
    pub fn load_buffer(&mut self, id: &str, source: &AudioSource) -> LoadOutcome {
        self.collect_retired();

        if !self.slots.contains_key(id) {
            let reason = MixerError::UnknownTrack(id.to_string()).to_string();
            warn!(id, "Cannot load buffer for unknown track");
            return LoadOutcome::Failed {
                id: id.to_string(),
                reason,
            };
        }

        let outcome = self
            .store
            .load(id, self.decoder.as_ref(), source, self.config.sample_rate);
        self.route(&outcome);
        outcome
    }

    /// Queue a decode on the background loader
    ///
    /// Returns false for unknown ids or when the loader cannot take the
    /// request. Finished decodes are picked up by [`poll_loads`](Self::poll_loads).
    pub fn request_load(&mut self, id: &str, source: AudioSource) -> bool {
        if !self.slots.contains_key(id) {
            warn!(id, "Cannot load buffer for unknown track");
            return false;
        }

        if self.loader.is_none() {
            match BufferLoader::new(Arc::clone(&self.decoder), self.config.sample_rate) {
                Ok(loader) => self.loader = Some(loader),
                Err(e) => {
                    warn!(error = %e, "Failed to start buffer loader");
                    return false;
                }
            }
        }

        let Some(loader) = self.loader.as_ref() else {
            return false;
        };
        match loader.request(id, source) {
            Ok(()) => true,
            Err(e) => {
                warn!(id, error = %e, "Load request rejected");
                false
            }
        }
    }

    /// Apply finished background decodes
    pub fn poll_loads(&mut self) -> Vec<LoadOutcome> {
        self.collect_retired();

        let mut finished = Vec::new();
        if let Some(loader) = self.loader.as_ref() {
            while let Some(result) = loader.poll_ready() {
                finished.push(result);
            }
        }

        let mut outcomes = Vec::with_capacity(finished.len());
        for result in finished {
            let outcome = self.store.insert_decoded(&result.id, result.result);
            self.route(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Whether background decodes are queued, running, or not yet polled
    pub fn is_loading(&self) -> bool {
        self.loader.as_ref().is_some_and(BufferLoader::is_loading)
    }

    /// Buffer availability for a track
    pub fn availability(&self, id: &str) -> BufferAvailability {
        self.store.availability(id)
    }

    /// Hand the store's verdict on a track to its voice
    fn route(&self, outcome: &LoadOutcome) {
        let Some(&slot) = self.slots.get(outcome.id()) else {
            return;
        };
        match self.store.buffer(outcome.id()) {
            Some(buffer) => self.send(MixerCommand::InstallBuffer { slot, buffer }),
            None => self.send(MixerCommand::ClearBuffer { slot }),
        }
        // The published position belongs to the previous buffer
        self.telemetry.publish(slot, None);
    }

    // ===== Master bus =====

    /// Set master volume (clamped), applied instantly
    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = clamp_unit(volume);
        self.state.master_volume = volume;
        self.send(MixerCommand::SetMasterVolume(volume));
    }

    /// Set crossfade duration for ramps started from now on
    pub fn set_crossfade(&mut self, secs: f32) {
        let secs = if secs.is_finite() {
            secs.clamp(0.0, MAX_CROSSFADE_SECS)
        } else {
            0.0
        };
        self.state.crossfade_secs = secs;
        self.send(MixerCommand::SetCrossfade(secs));
    }

    /// Set the ramp shape for ramps started from now on
    pub fn set_fade_curve(&mut self, curve: FadeCurve) {
        self.config.fade_curve = curve;
        self.send(MixerCommand::SetFadeCurve(curve));
    }

    // ===== Tracks =====

    /// Set one track's volume (clamped), applied instantly
    pub fn set_track_volume(&mut self, id: &str, volume: f32) {
        let Some(slot) = self.slot(id) else { return };
        let volume = clamp_unit(volume);
        self.state.tracks[slot].volume = volume;
        self.send(MixerCommand::SetTrackVolume { slot, volume });
    }

    /// Enable or disable one track with a crossfade
    pub fn set_track_enabled(&mut self, id: &str, enabled: bool) {
        let Some(slot) = self.slot(id) else { return };
        self.state.tracks[slot].enabled = enabled;
        self.send(MixerCommand::SetTrackEnabled { slot, enabled });
    }

    /// Set enabled and volume as one directive
    pub fn set_track_state(&mut self, id: &str, enabled: bool, volume: f32) {
        let Some(slot) = self.slot(id) else { return };
        let volume = clamp_unit(volume);
        self.state.tracks[slot] = TrackState::new(id, enabled, volume);
        self.send(MixerCommand::SetTrackState {
            slot,
            enabled,
            volume,
        });
    }

    /// Flip one track; returns the new enabled flag
    pub fn toggle_track(&mut self, id: &str) -> Option<bool> {
        let slot = self.slot(id)?;
        let enabled = !self.state.tracks[slot].enabled;
        self.set_track_enabled(id, enabled);
        Some(enabled)
    }

    /// Flip the track bound to a hotkey digit
    pub fn toggle_hotkey(&mut self, digit: u8) -> Option<bool> {
        let id = self
            .descriptors
            .iter()
            .find(|d| d.hotkey == Some(digit))
            .map(|d| d.id.clone())?;
        self.toggle_track(&id)
    }

    // ===== Batches =====

    /// Apply a batch of track states atomically
    ///
    /// Returns the ids that were ignored because no such track exists.
    pub fn apply_state(&mut self, tracks: &[TrackState]) -> Vec<String> {
        let plan = PresetApplier::plan_tracks(&self.state, tracks);
        self.deliver(plan)
    }

    /// Apply a preset atomically: master and crossfade first, then at most one
    /// directive per track
    ///
    /// Returns the ids that were ignored because no such track exists.
    pub fn apply_preset(&mut self, preset: &Preset) -> Vec<String> {
        let plan = PresetApplier::plan(&self.state, preset);
        info!(
            preset = %preset.name,
            tracks = plan.directives.len(),
            ignored = plan.ignored.len(),
            "Applying preset"
        );
        self.deliver(plan)
    }

    fn deliver(&mut self, mut plan: TransitionPlan) -> Vec<String> {
        self.collect_retired();
        let ignored = std::mem::take(&mut plan.ignored);
        self.state = plan.apply_to(&self.state);
        self.send(MixerCommand::ApplyTransition(plan));
        ignored
    }

    /// Pause everything that plays, or bring back what was paused
    ///
    /// Returns true if tracks were brought back.
    pub fn toggle_all(&mut self) -> bool {
        let enabled = self.state.enabled_ids();

        let (ids, enable) = if enabled.is_empty() {
            (std::mem::take(&mut self.paused), true)
        } else {
            self.paused.clone_from(&enabled);
            (enabled, false)
        };

        if ids.is_empty() {
            return false;
        }

        let tracks: Vec<_> = ids
            .iter()
            .filter_map(|id| self.state.track(id))
            .map(|t| TrackState::new(t.id.clone(), enable, t.volume))
            .collect();
        self.apply_state(&tracks);
        enable
    }

    /// Ramp every track to silence and forget any paused set
    pub fn stop_all(&mut self) {
        self.paused.clear();
        for track in &mut self.state.tracks {
            track.enabled = false;
        }
        self.send(MixerCommand::StopAll);
    }

    // ===== Read-only values =====

    /// Seconds until the track's current loop iteration ends
    ///
    /// `None` exactly when the track is disabled or has no decoded buffer.
    pub fn get_loop_time_remaining(&self, id: &str) -> Option<f64> {
        let slot = *self.slots.get(id)?;
        if !self.state.tracks[slot].enabled {
            return None;
        }
        let buffer = self.store.buffer(id)?;

        // Not rendered yet, the voice starts at frame 0. A value published
        // for a replaced buffer can exceed the new length, hence the cap.
        let longest = buffer.frames().saturating_sub(1) as f64 / f64::from(buffer.sample_rate());
        let remaining = self.telemetry.remaining(slot).unwrap_or(longest);
        Some(remaining.min(longest))
    }

    /// Smoothed tick load in percent
    pub fn get_cpu_usage(&mut self) -> f32 {
        self.cpu.sample()
    }

    /// Leave the suspended state (idempotent)
    pub fn resume_if_suspended(&self) {
        self.send(MixerCommand::Resume);
    }

    /// Next tick notification, if any
    pub fn try_recv_event(&self) -> Option<MixerEvent> {
        self.collect_retired();
        self.events.try_recv().ok()
    }

    /// The requested mixer state
    pub fn state(&self) -> MixerState {
        self.state.clone()
    }

    /// Capture the requested state as a named preset
    pub fn snapshot_preset(&self, name: &str) -> Preset {
        self.state.to_preset(name)
    }

    /// Configured tracks in catalog order
    pub fn descriptors(&self) -> &[TrackDescriptor] {
        &self.descriptors
    }

    /// Backend chosen at construction
    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    /// Mixer sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Frames the tick has rendered
    pub fn clock(&self) -> u64 {
        self.telemetry.clock()
    }

    // ===== Shutdown =====

    /// Stop every voice and release all buffers
    ///
    /// Waits up to `dispose_timeout_ms` for the tick to acknowledge. A decode
    /// still running on the loader finishes in the background and its result
    /// is discarded.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(loader) = self.loader.take() {
            loader.shutdown();
        }

        self.send(MixerCommand::Shutdown);
        match self.ack.recv_timeout(self.config.dispose_timeout()) {
            Ok(()) => debug!("Tick acknowledged shutdown"),
            Err(_) => debug!("Tick did not acknowledge shutdown in time; it stops on its next call"),
        }

        self.store.clear();
        self.collect_retired();
        info!("Ambient engine disposed");
    }

    fn slot(&self, id: &str) -> Option<usize> {
        let slot = self.slots.get(id).copied();
        if slot.is_none() {
            warn!(id, "Unknown track");
        }
        slot
    }

    fn send(&self, command: MixerCommand) {
        if self.commands.send(command).is_err() {
            debug!("Mixer tick is gone, dropping command");
        }
    }

    /// Free what the tick handed back, here rather than on the audio thread
    fn collect_retired(&self) {
        while let Ok(retired) = self.retired.try_recv() {
            match retired {
                Retired::Buffer(buffer) => debug!(frames = buffer.frames(), "Released buffer"),
                Retired::Plan(plan) => drop(plan),
            }
        }
    }
}

impl Drop for AmbientEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendSelector, FixedProbe, GraphCapabilities};
    use crate::buffer::DecodedBuffer;
    use crate::types::default_tracks;

    struct Silence;

    impl SourceDecoder for Silence {
        fn decode(&self, _source: &AudioSource, rate: u32) -> crate::error::Result<DecodedBuffer> {
            Ok(DecodedBuffer::from_fn(rate as usize, rate, |_| (0.0, 0.0)))
        }
    }

    fn engine() -> (AmbientEngine, MixerProcessor) {
        let backend = BackendSelector::select(&FixedProbe::available(GraphCapabilities {
            device: "Test Device".into(),
            sample_rate: 1_000,
            channels: 2,
        }));
        let config = EngineConfig {
            sample_rate: 1_000,
            block_frames: 64,
            dispose_timeout_ms: 0,
            ..Default::default()
        };
        AmbientEngine::new(default_tracks(), backend, Arc::new(Silence), config)
    }

    #[test]
    fn test_tick_hands_preset_plan_back() {
        let (mut engine, mut processor) = engine();
        let mut preset = engine.snapshot_preset("Focus");
        preset.tracks[0].enabled = true;

        engine.apply_preset(&preset);
        assert!(engine.retired.is_empty());

        processor.tick(64);
        assert!(matches!(engine.retired.try_recv(), Ok(Retired::Plan(_))));
    }

    #[test]
    fn test_tick_hands_replaced_buffer_back() {
        let (mut engine, mut processor) = engine();
        let source = AudioSource::Path("rain.wav".into());

        engine.load_buffer("rain", &source);
        processor.tick(64);
        assert!(engine.retired.is_empty());

        // The second load collects nothing yet; the swap happens on the tick
        engine.load_buffer("rain", &source);
        processor.tick(64);
        assert!(matches!(
            engine.retired.try_recv(),
            Ok(Retired::Buffer(buffer)) if buffer.frames() == 1_000
        ));
    }
}
