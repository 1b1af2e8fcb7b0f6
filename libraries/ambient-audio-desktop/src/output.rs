/// CPAL output driving the mixer tick
///
/// The CPAL `Stream` is not `Send` on every platform, so a dedicated thread
/// builds and owns it. The host talks to that thread over a channel; the
/// stream callback owns the [`MixerProcessor`] and renders straight into the
/// device buffer.
use crate::error::{AudioError, Result};
use crate::probe::OutputTarget;
use ambient_mixer::MixerProcessor;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Commands sent to the audio thread
enum OutputCommand {
    Play,
    Pause,
    Shutdown,
}

/// Running output stream
pub struct DesktopOutput {
    command_tx: Sender<OutputCommand>,
    thread: Option<JoinHandle<()>>,
    playing: Arc<AtomicBool>,
    device: String,
    sample_rate: u32,
    channels: u16,
}

impl DesktopOutput {
    /// Start the audio thread and build the stream
    ///
    /// The processor moves into the stream callback. With `autoplay` false
    /// the stream is built paused and stays silent until [`Self::play`].
    pub fn start(target: OutputTarget, processor: MixerProcessor, autoplay: bool) -> Result<Self> {
        let device = target.name.clone();
        let sample_rate = target.config.sample_rate();
        let channels = target.config.channels();

        let (command_tx, command_rx) = bounded(32);
        let (ready_tx, ready_rx) = bounded(1);
        let playing = Arc::new(AtomicBool::new(false));
        let playing_clone = Arc::clone(&playing);

        let thread = thread::Builder::new()
            .name("ambient-output".into())
            .spawn(move || {
                audio_thread_run(target, processor, autoplay, playing_clone, command_rx, ready_tx);
            })?;

        // Surface stream construction errors to the caller
        ready_rx.recv().map_err(|_| AudioError::ThreadStopped)??;

        info!(device = %device, sample_rate, channels, autoplay, "Output stream ready");

        Ok(Self {
            command_tx,
            thread: Some(thread),
            playing,
            device,
            sample_rate,
            channels,
        })
    }

    /// Start or resume the device stream
    pub fn play(&self) -> Result<()> {
        self.command_tx
            .send(OutputCommand::Play)
            .map_err(|_| AudioError::ThreadStopped)
    }

    /// Pause the device stream (the tick stops with it)
    pub fn pause(&self) -> Result<()> {
        self.command_tx
            .send(OutputCommand::Pause)
            .map_err(|_| AudioError::ThreadStopped)
    }

    /// Whether the stream was last reported playing
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Output device name
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Device sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop the stream and join the audio thread
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(OutputCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

impl Drop for DesktopOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Audio thread main loop; owns the stream until shutdown
fn audio_thread_run(
    target: OutputTarget,
    processor: MixerProcessor,
    autoplay: bool,
    playing: Arc<AtomicBool>,
    command_rx: Receiver<OutputCommand>,
    ready_tx: Sender<Result<()>>,
) {
    let config = target.config.config();
    let stream = match build_stream(&target.device, &config, target.config.sample_format(), processor) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let initial = if autoplay {
        stream.play().map_err(AudioError::from)
    } else {
        // Some hosts start streams implicitly
        stream.pause().map_err(AudioError::from)
    };
    if let Err(e) = initial {
        let _ = ready_tx.send(Err(e));
        return;
    }
    playing.store(autoplay, Ordering::Release);
    let _ = ready_tx.send(Ok(()));

    while let Ok(cmd) = command_rx.recv() {
        match cmd {
            OutputCommand::Play => match stream.play() {
                Ok(()) => playing.store(true, Ordering::Release),
                Err(e) => error!(error = %e, "Failed to start output stream"),
            },
            OutputCommand::Pause => match stream.pause() {
                Ok(()) => playing.store(false, Ordering::Release),
                Err(e) => error!(error = %e, "Failed to pause output stream"),
            },
            OutputCommand::Shutdown => break,
        }
    }

    playing.store(false, Ordering::Release);
    drop(stream);
    info!("Output stream closed");
}

/// Sample formats [`build_stream`] can render into
pub(crate) fn supports_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32
            | SampleFormat::F64
            | SampleFormat::I16
            | SampleFormat::I32
            | SampleFormat::U16
            | SampleFormat::U8
    )
}

/// Build a stream in the device's native sample format
fn build_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    processor: MixerProcessor,
) -> Result<Stream> {
    match format {
        SampleFormat::F32 => build_typed::<f32>(device, config, processor),
        SampleFormat::F64 => build_typed::<f64>(device, config, processor),
        SampleFormat::I16 => build_typed::<i16>(device, config, processor),
        SampleFormat::I32 => build_typed::<i32>(device, config, processor),
        SampleFormat::U16 => build_typed::<u16>(device, config, processor),
        SampleFormat::U8 => build_typed::<u8>(device, config, processor),
        other => Err(AudioError::UnsupportedFormat(format!("Output sample format {other:?}"))),
    }
}

fn build_typed<T>(device: &Device, config: &StreamConfig, mut processor: MixerProcessor) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let mix = &mut scratch[..data.len()];
            processor.process(mix, channels);
            for (out, sample) in data.iter_mut().zip(mix.iter()) {
                *out = T::from_sample(sample.clamp(-1.0, 1.0));
            }
        },
        |err| error!(error = %err, "Output stream error"),
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats_match_stream_builders() {
        for format in [
            SampleFormat::F32,
            SampleFormat::F64,
            SampleFormat::I16,
            SampleFormat::I32,
            SampleFormat::U16,
            SampleFormat::U8,
        ] {
            assert!(supports_format(format), "{format:?}");
        }
        assert!(!supports_format(SampleFormat::I8));
        assert!(!supports_format(SampleFormat::U64));
    }
}
