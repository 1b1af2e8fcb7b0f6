/// Desktop composition of engine, decoder and output stream
use crate::decoder::SymphoniaDecoder;
use crate::error::Result;
use crate::output::DesktopOutput;
use crate::probe::CpalProbe;
use ambient_mixer::{
    AmbientEngine, AudioBackend, BackendKind, BackendSelector, EngineConfig, FixedProbe,
    MixerProcessor, SourceDecoder, TrackDescriptor,
};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend choice for the desktop mixer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendPreference {
    /// Graph backend when a device is available
    #[default]
    Auto,
    /// Always use the ramp-less fallback, even with a device
    Fallback,
}

/// Ambient mixer playing through the default output device
///
/// Without a usable device, or when the stream cannot be started, the engine
/// still runs (state, presets, loading) on a timer thread but nothing is
/// audible.
// Field order is drop order: the engine disposes while the tick still runs.
pub struct DesktopMixer {
    engine: AmbientEngine,
    output: Option<DesktopOutput>,
    detached: Option<DetachedClock>,
}

impl DesktopMixer {
    /// Open the default device and build the engine at its rate
    pub fn open(descriptors: Vec<TrackDescriptor>, config: EngineConfig) -> Result<Self> {
        Self::open_with(descriptors, config, BackendPreference::Auto)
    }

    /// Open with an explicit backend preference
    ///
    /// # Errors
    /// Only when no thread can be spawned. Device and stream failures fall
    /// back to running without output.
    pub fn open_with(
        descriptors: Vec<TrackDescriptor>,
        mut config: EngineConfig,
        preference: BackendPreference,
    ) -> Result<Self> {
        let probe = CpalProbe::default_output();

        let backend = match preference {
            BackendPreference::Auto => BackendSelector::select(&probe),
            BackendPreference::Fallback => {
                BackendSelector::select(&FixedProbe::unavailable("fallback requested"))
            }
        };

        if let Some(rate) = probe.sample_rate() {
            config.sample_rate = rate;
        }

        Self::assemble(
            descriptors,
            config,
            backend,
            Arc::new(SymphoniaDecoder::new()),
            probe.into_target(),
            DesktopOutput::start,
        )
    }

    /// Build the engine and attach it to `target`, or run it detached
    ///
    /// A failing `start` rebuilds the engine on the fallback backend before
    /// the host has seen it, so nothing queued is lost.
    fn assemble<T>(
        descriptors: Vec<TrackDescriptor>,
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        decoder: Arc<dyn SourceDecoder>,
        target: Option<T>,
        start: impl FnOnce(T, MixerProcessor, bool) -> Result<DesktopOutput>,
    ) -> Result<Self> {
        let autoplay = !config.start_suspended;
        let (engine, processor) = AmbientEngine::new(
            descriptors.clone(),
            backend,
            Arc::clone(&decoder),
            config.clone(),
        );

        let Some(target) = target else {
            warn!("No output device, mixer runs without audio output");
            return Self::detached(engine, processor);
        };

        match start(target, processor, autoplay) {
            Ok(output) => Ok(Self {
                engine,
                output: Some(output),
                detached: None,
            }),
            Err(e) => {
                warn!(error = %e, "Output stream failed, mixer runs without audio output");
                drop(engine);
                let backend = BackendSelector::select(&FixedProbe::unavailable(e.to_string()));
                let (engine, processor) = AmbientEngine::new(descriptors, backend, decoder, config);
                Self::detached(engine, processor)
            }
        }
    }

    fn detached(engine: AmbientEngine, processor: MixerProcessor) -> Result<Self> {
        Ok(Self {
            engine,
            output: None,
            detached: Some(DetachedClock::start(processor)?),
        })
    }

    /// Control surface
    pub fn engine(&self) -> &AmbientEngine {
        &self.engine
    }

    /// Mutable control surface
    pub fn engine_mut(&mut self) -> &mut AmbientEngine {
        &mut self.engine
    }

    /// Which backend the engine selected
    pub fn backend_kind(&self) -> BackendKind {
        self.engine.backend_kind()
    }

    /// Output device name, when playing through one
    pub fn device(&self) -> Option<&str> {
        self.output.as_ref().map(DesktopOutput::device)
    }

    /// Whether audio is reaching a device
    pub fn is_audible(&self) -> bool {
        self.output.as_ref().is_some_and(DesktopOutput::is_playing)
    }

    /// Start the device stream and the tick if either is suspended
    ///
    /// Idempotent. Without a device only the tick is resumed.
    pub fn resume_if_suspended(&self) -> Result<()> {
        if let Some(output) = &self.output {
            if !output.is_playing() {
                output.play()?;
            }
        }
        self.engine.resume_if_suspended();
        Ok(())
    }

    /// Tear everything down
    ///
    /// The engine is disposed first so the running tick can acknowledge, then
    /// the stream or timer is stopped.
    pub fn dispose(self) {
        let Self {
            engine,
            output,
            detached,
        } = self;
        engine.dispose();
        if let Some(mut output) = output {
            output.shutdown();
        }
        if let Some(mut clock) = detached {
            clock.shutdown();
        }
        info!("Desktop mixer closed");
    }
}

/// Drives the tick in real time when no stream does
///
/// Commands (and the buffers they carry) are consumed, loop positions
/// advance, and the rendered blocks are discarded.
struct DetachedClock {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl DetachedClock {
    fn start(mut processor: MixerProcessor) -> Result<Self> {
        let block = processor.block_frames();
        let period =
            Duration::from_secs_f64(block as f64 / f64::from(processor.sample_rate().max(1)));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("ambient-detached".into())
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(period) {
                    processor.tick(block);
                    if processor.is_shut_down() {
                        break;
                    }
                }
                debug!("Detached tick stopped");
            })?;

        Ok(Self {
            stop_tx,
            thread: Some(thread),
        })
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Detached tick thread panicked");
            }
        }
    }
}

impl Drop for DetachedClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}
