//! Audio tick: the only writer of voice gain and cursor state
//!
//! ```text
//!  Control thread                      Audio thread
//!  ──────────────                      ────────────
//!  AmbientEngine ── MixerCommand ──>  MixerProcessor::process()
//!        ^                                  │ drain commands
//!        │                                  │ schedule loop iterations
//!        │                                  │ render voices through MasterBus
//!        │<── MixerEvent (try_send) ────────│
//!        │<── retired buffers ──────────────│
//!        │<── LoopTelemetry / LoadMeter ────│ (atomics)
//! ```
//!
//! Commands are drained at the start of every call, so everything sent in
//! one batch (a whole preset, for example) takes effect on the same frame.

use crate::backend::{AudioBackend, BackendKind};
use crate::buffer::DecodedBuffer;
use crate::bus::MasterBus;
use crate::command::{MixerCommand, MixerEvent, Retired};
use crate::crossfade::FadeCurve;
use crate::cpu::LoadMeter;
use crate::telemetry::LoopTelemetry;
use crate::types::TrackRuntimeState;
use crate::voice::{TrackVoice, VoiceTransition};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Channel ends and shared state owned by the tick
pub(crate) struct TickLinks {
    pub commands: Receiver<MixerCommand>,
    pub events: Sender<MixerEvent>,
    pub retired: Sender<Retired>,
    pub ack: Sender<()>,
    pub telemetry: Arc<LoopTelemetry>,
    pub meter: Arc<LoadMeter>,
    pub disposed: Arc<AtomicBool>,
}

/// Tick-side half of the engine
///
/// Drive it either from an audio callback with [`process`](Self::process) or
/// from a host-owned clock with [`tick`](Self::tick).
pub struct MixerProcessor {
    voices: Vec<TrackVoice>,
    bus: MasterBus,
    backend: Box<dyn AudioBackend>,
    sample_rate: u32,
    block_frames: usize,
    clock: u64,
    scratch: Vec<f32>,
    suspended: bool,
    shut_down: bool,
    links: TickLinks,
}

impl MixerProcessor {
    pub(crate) fn new(
        voices: Vec<TrackVoice>,
        bus: MasterBus,
        backend: Box<dyn AudioBackend>,
        sample_rate: u32,
        block_frames: usize,
        suspended: bool,
        links: TickLinks,
    ) -> Self {
        Self {
            voices,
            bus,
            backend,
            sample_rate,
            block_frames,
            clock: 0,
            scratch: vec![0.0; block_frames * 2],
            suspended,
            shut_down: false,
            links,
        }
    }

    /// Fill an interleaved output buffer (audio callback)
    ///
    /// Mono outputs get the average of left and right; channels beyond two
    /// stay silent.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            self.drain_commands();
            return;
        }

        let frames = out.len() / channels;
        self.run(frames, |offset, block| {
            let dst = &mut out[offset * channels..(offset + block.len() / 2) * channels];
            for (frame, src) in dst.chunks_exact_mut(channels).zip(block.chunks_exact(2)) {
                if channels == 1 {
                    frame[0] = (src[0] + src[1]) * 0.5;
                } else {
                    frame[0] = src[0];
                    frame[1] = src[1];
                }
            }
        });
    }

    /// Advance `frames` without producing output (host-owned clock)
    pub fn tick(&mut self, frames: usize) {
        self.run(frames, |_, _| {});
    }

    /// Render `frames` in blocks, handing each stereo block to `sink`
    pub fn render_with(&mut self, frames: usize, sink: impl FnMut(usize, &[f32])) {
        self.run(frames, sink);
    }

    fn run(&mut self, frames: usize, mut sink: impl FnMut(usize, &[f32])) {
        let started = Instant::now();
        self.drain_commands();
        if self.shut_down || self.suspended {
            return;
        }

        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(self.block_frames);
            self.render_block(n);
            sink(done, &self.scratch[..n * 2]);
            done += n;
        }

        self.links.meter.record(frames, self.sample_rate, started.elapsed());
    }

    fn render_block(&mut self, frames: usize) {
        let block = &mut self.scratch[..frames * 2];
        block.fill(0.0);

        let lookahead = self.backend.loop_lookahead_frames(self.block_frames);
        let now = self.clock;

        for voice in &mut self.voices {
            if let Some(next) = voice.schedule_next_iteration(now, lookahead) {
                emit(
                    &self.links.events,
                    MixerEvent::LoopScheduled {
                        id: Arc::clone(voice.id()),
                        iteration: next.iteration,
                        start_frame: next.start_frame,
                    },
                );
            }

            let report = voice.render(block, now, &self.bus);
            if report.stopped {
                emit(
                    &self.links.events,
                    MixerEvent::VoiceStopped {
                        id: Arc::clone(voice.id()),
                    },
                );
            }
        }

        self.clock += frames as u64;
        self.publish();
    }

    fn publish(&self) {
        for (slot, voice) in self.voices.iter().enumerate() {
            self.links.telemetry.publish(slot, voice.loop_time_remaining());
        }
        self.links.telemetry.set_clock(self.clock);
    }

    fn drain_commands(&mut self) {
        loop {
            match self.links.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown();
                    break;
                }
            }
        }

        if !self.shut_down && self.links.disposed.load(Ordering::Acquire) {
            self.shutdown();
        }
    }

    fn apply(&mut self, command: MixerCommand) {
        if self.shut_down {
            match command {
                MixerCommand::InstallBuffer { buffer, .. } => self.retire(buffer),
                MixerCommand::ApplyTransition(plan) => self.hand_back(Retired::Plan(plan)),
                _ => {}
            }
            return;
        }

        match command {
            MixerCommand::SetMasterVolume(volume) => self.bus.set_master(volume),
            MixerCommand::SetCrossfade(secs) => self.bus.set_crossfade(secs),
            MixerCommand::SetFadeCurve(curve) => self.bus.set_curve(curve),
            MixerCommand::SetTrackState {
                slot,
                enabled,
                volume,
            } => self.set_track_state(slot, enabled, volume),
            MixerCommand::SetTrackEnabled { slot, enabled } => {
                let (ramp, curve) = self.ramp();
                let now = self.clock;
                if let Some(voice) = self.voices.get_mut(slot) {
                    let transition = voice.set_enabled(now, enabled, ramp, curve);
                    self.report(slot, transition);
                }
            }
            MixerCommand::SetTrackVolume { slot, volume } => {
                if let Some(voice) = self.voices.get_mut(slot) {
                    voice.set_volume(volume);
                }
            }
            MixerCommand::ApplyTransition(plan) => {
                self.bus.set_master(plan.master_volume);
                self.bus.set_crossfade(plan.crossfade_secs);
                for directive in &plan.directives {
                    self.set_track_state(directive.slot, directive.enabled, directive.volume);
                }
                self.hand_back(Retired::Plan(plan));
            }
            MixerCommand::StopAll => {
                let (ramp, curve) = self.ramp();
                let now = self.clock;
                for slot in 0..self.voices.len() {
                    let transition = self.voices[slot].set_enabled(now, false, ramp, curve);
                    self.report(slot, transition);
                }
            }
            MixerCommand::InstallBuffer { slot, buffer } => {
                let (ramp, curve) = self.ramp();
                let now = self.clock;
                let Some(voice) = self.voices.get_mut(slot) else {
                    self.retire(buffer);
                    return;
                };
                let (previous, transition) = voice.install_buffer(now, buffer, ramp, curve);
                emit(
                    &self.links.events,
                    MixerEvent::BufferInstalled {
                        id: Arc::clone(voice.id()),
                    },
                );
                if let Some(previous) = previous {
                    self.retire(previous);
                }
                self.report(slot, transition);
            }
            MixerCommand::ClearBuffer { slot } => {
                let Some(voice) = self.voices.get_mut(slot) else {
                    return;
                };
                let (previous, transition) = voice.clear_buffer();
                if let Some(previous) = previous {
                    self.retire(previous);
                }
                self.links.telemetry.publish(slot, None);
                self.report(slot, transition);
            }
            MixerCommand::Resume => self.suspended = false,
            MixerCommand::Shutdown => self.shutdown(),
        }
    }

    fn set_track_state(&mut self, slot: usize, enabled: bool, volume: f32) {
        let (ramp, curve) = self.ramp();
        let now = self.clock;
        if let Some(voice) = self.voices.get_mut(slot) {
            let transition = voice.set_state(now, enabled, volume, ramp, curve);
            self.report(slot, transition);
        }
    }

    fn ramp(&self) -> (u64, FadeCurve) {
        (
            self.bus.ramp_frames(self.sample_rate, self.backend.as_ref()),
            self.bus.curve(),
        )
    }

    fn report(&self, slot: usize, transition: VoiceTransition) {
        let Some(voice) = self.voices.get(slot) else {
            return;
        };
        let event = match transition {
            VoiceTransition::Started => MixerEvent::VoiceStarted {
                id: Arc::clone(voice.id()),
            },
            VoiceTransition::Stopped => MixerEvent::VoiceStopped {
                id: Arc::clone(voice.id()),
            },
            _ => return,
        };
        emit(&self.links.events, event);
    }

    fn retire(&self, buffer: Arc<DecodedBuffer>) {
        self.hand_back(Retired::Buffer(buffer));
    }

    fn hand_back(&self, retired: Retired) {
        // Full or disconnected: it is dropped here instead
        let _ = self.links.retired.try_send(retired);
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        let released: Vec<_> = self
            .voices
            .iter_mut()
            .filter_map(TrackVoice::release_buffer)
            .collect();
        for buffer in released {
            self.retire(buffer);
        }

        self.links.telemetry.clear();
        self.shut_down = true;
        emit(&self.links.events, MixerEvent::Disposed);
        let _ = self.links.ack.try_send(());
        info!(clock = self.clock, "Mixer tick shut down");
    }

    /// Frames rendered so far
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Mixer sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per scheduling block
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Selected backend
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Master bus as the tick sees it
    pub fn bus(&self) -> &MasterBus {
        &self.bus
    }

    /// Voice for a track id
    pub fn voice(&self, id: &str) -> Option<&TrackVoice> {
        self.voices.iter().find(|v| v.id().as_ref() == id)
    }

    /// Diagnostic snapshot of every voice
    pub fn runtime_states(&self) -> Vec<TrackRuntimeState> {
        self.voices
            .iter()
            .map(|v| v.runtime_state(self.clock))
            .collect()
    }

    /// Whether the tick is waiting for a resume
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the tick has shut down for good
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

#[inline]
fn emit(events: &Sender<MixerEvent>, event: MixerEvent) {
    // Dropped when the host is not draining events
    let _ = events.try_send(event);
}
