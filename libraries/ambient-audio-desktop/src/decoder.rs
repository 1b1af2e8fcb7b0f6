//! Whole-file decoding with Symphonia
//!
//! Ambient loops are short and must wrap sample-accurately, so each source is
//! decoded completely up front instead of streamed.
//!
//! Every Symphonia sample type goes through one generic interleaver
//! (`interleave_f32`) with a per-format normalization function:
//! - **Float formats**: pass through (F32) or cast (F64)
//! - **Signed ints**: divide by MAX
//! - **Unsigned ints**: normalize to [0,1], scale to [-1,1]
//! - **24-bit types**: extract `.inner()`, normalize
//!
//! Channel folding to stereo happens in [`DecodedBuffer::from_interleaved`];
//! rate conversion to the mixer rate uses a rubato sinc resampler.

use crate::error::{AudioError, Result};
use ambient_mixer::{AudioSource, DecodedBuffer, SourceDecoder};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Input frames per resampler chunk
const RESAMPLE_CHUNK: usize = 1024;

/// Decodes files and in-memory bytes with Symphonia
///
/// Supports every container and codec Symphonia's `all` feature enables
/// (WAV, FLAC, OGG/Vorbis, MP3, AAC, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    /// Create a decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode a source to stereo at `target_sample_rate`
    pub fn decode_source(&self, source: &AudioSource, target_sample_rate: u32) -> Result<DecodedBuffer> {
        let (media, hint): (Box<dyn MediaSource>, Hint) = match source {
            AudioSource::Path(path) => {
                let file = File::open(path)?;
                let mut hint = Hint::new();
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
                (Box::new(file), hint)
            }
            AudioSource::Bytes { data, extension } => {
                let mut hint = Hint::new();
                if let Some(ext) = extension {
                    hint.with_extension(ext);
                }
                (Box::new(Cursor::new(Arc::clone(data))), hint)
            }
        };

        let (samples, channels, source_rate) = decode_interleaved(media, &hint)?;
        if samples.is_empty() {
            return Err(AudioError::Decode("No audio frames decoded".into()));
        }

        let stereo = DecodedBuffer::from_interleaved(&samples, channels, source_rate);
        if source_rate == target_sample_rate {
            return Ok(stereo);
        }

        debug!(
            from = source_rate,
            to = target_sample_rate,
            frames = stereo.frames(),
            "Resampling decoded loop"
        );
        let interleaved: Vec<f32> = (0..stereo.frames())
            .flat_map(|i| {
                let (l, r) = stereo.frame(i);
                [l, r]
            })
            .collect();
        let resampled = resample_stereo(&interleaved, source_rate, target_sample_rate)?;
        Ok(DecodedBuffer::from_interleaved(&resampled, 2, target_sample_rate))
    }
}

impl SourceDecoder for SymphoniaDecoder {
    fn decode(&self, source: &AudioSource, target_sample_rate: u32) -> ambient_mixer::Result<DecodedBuffer> {
        self.decode_source(source, target_sample_rate)
            .map_err(Into::into)
    }
}

/// Decode the default track to interleaved f32 at its native rate
///
/// Returns `(samples, channels, sample_rate)`.
fn decode_interleaved(media: Box<dyn MediaSource>, hint: &Hint) -> Result<(Vec<f32>, u16, u32)> {
    let mss = MediaSourceStream::new(media, Default::default());

    let probed = symphonia::default::get_probe().format(
        hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::UnsupportedFormat("No audio tracks found".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);
                convert_to_f32_interleaved(decoded, &mut samples);
            }
            // Corrupt packet: skip it and keep going
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(error = msg, "Skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| AudioError::UnsupportedFormat("Unknown sample rate".into()))?;
    let channels = channels.unwrap_or(2).max(1);
    Ok((samples, channels, sample_rate))
}

/// Append a planar buffer to `output` as interleaved f32
///
/// `normalize` maps one sample of type `T` into [-1.0, 1.0].
fn interleave_f32<T, F>(buf: &symphonia::core::audio::AudioBuffer<T>, normalize: F, output: &mut Vec<f32>)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    output.reserve(frames * channels);

    for frame_idx in 0..frames {
        for ch in 0..channels {
            output.push(normalize(buf.chan(ch)[frame_idx]));
        }
    }
}

/// Convert any Symphonia sample format, appending to `output`
fn convert_to_f32_interleaved(decoded: AudioBufferRef, output: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave_f32(&buf, |s| s, output),
        AudioBufferRef::F64(buf) => interleave_f32(&buf, |s| s as f32, output),

        AudioBufferRef::S8(buf) => interleave_f32(&buf, |s| s as f32 / i8::MAX as f32, output),
        AudioBufferRef::S16(buf) => interleave_f32(&buf, |s| s as f32 / i16::MAX as f32, output),
        AudioBufferRef::S24(buf) => interleave_f32(&buf, |s| s.inner() as f32 / 8388607.0, output),
        AudioBufferRef::S32(buf) => interleave_f32(&buf, |s| s as f32 / i32::MAX as f32, output),

        AudioBufferRef::U8(buf) => {
            interleave_f32(&buf, |s| (s as f32 / u8::MAX as f32) * 2.0 - 1.0, output);
        }
        AudioBufferRef::U16(buf) => {
            interleave_f32(&buf, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0, output);
        }
        AudioBufferRef::U24(buf) => {
            interleave_f32(&buf, |s| (s.inner() as f32 / 16777215.0) * 2.0 - 1.0, output);
        }
        AudioBufferRef::U32(buf) => {
            interleave_f32(&buf, |s| (s as f64 / u32::MAX as f64) as f32 * 2.0 - 1.0, output);
        }
    }
}

/// Resample interleaved stereo from `from` Hz to `to` Hz
///
/// The output holds exactly `round(frames * to / from)` frames with the
/// resampler's delay trimmed, so the loop length is preserved.
pub fn resample_stereo(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    let frames = samples.len() / 2;
    if from == to || frames == 0 {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to) / f64::from(from);
    let expected = (frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 2)
        .map_err(|e| AudioError::ResampleError(e.to_string()))?;

    let delay = resampler.output_delay();
    let mut left = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut right = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut offset = 0;
    while offset < frames {
        let chunk = resampler.input_frames_next();
        let end = (offset + chunk).min(frames);

        let mut deinterleaved = vec![Vec::with_capacity(end - offset); 2];
        for frame in samples[offset * 2..end * 2].chunks_exact(2) {
            deinterleaved[0].push(frame[0]);
            deinterleaved[1].push(frame[1]);
        }

        let resampled = if end - offset == chunk {
            resampler.process(&deinterleaved, None)
        } else {
            resampler.process_partial(Some(&deinterleaved), None)
        }
        .map_err(|e| AudioError::ResampleError(e.to_string()))?;

        left.extend_from_slice(&resampled[0]);
        right.extend_from_slice(&resampled[1]);
        offset = end;
    }

    // Flush the filter tail
    while left.len() < expected + delay {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| AudioError::ResampleError(e.to_string()))?;
        if tail[0].is_empty() {
            break;
        }
        left.extend_from_slice(&tail[0]);
        right.extend_from_slice(&tail[1]);
    }

    let start = delay.min(left.len());
    let end = (delay + expected).min(left.len());
    Ok(left[start..end]
        .iter()
        .zip(&right[start..end])
        .flat_map(|(l, r)| [*l, *r])
        .collect())
}
