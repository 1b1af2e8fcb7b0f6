//! Seamless loop playback tests
//!
//! The loop content is a unique ramp per frame, so any gap, repeat or skip at
//! an iteration boundary shows up as a wrong sample in the output.

use ambient_mixer::{
    AmbientEngine, AudioSource, BackendSelector, DecodedBuffer, EngineConfig, FixedProbe,
    GraphCapabilities, MixerEvent, MixerProcessor, SourceDecoder, TrackDescriptor,
};
use std::path::PathBuf;
use std::sync::Arc;

const RATE: u32 = 8_000;
const BLOCK: usize = 256;

struct RampDecoder {
    frames: usize,
}

impl SourceDecoder for RampDecoder {
    fn decode(&self, _source: &AudioSource, rate: u32) -> ambient_mixer::Result<DecodedBuffer> {
        let frames = self.frames;
        Ok(DecodedBuffer::from_fn(frames, rate, |i| {
            let v = i as f32 / frames as f32;
            (v, -v)
        }))
    }
}

fn expected(i: usize, frames: usize) -> f32 {
    (i % frames) as f32 / frames as f32
}

fn engine(frames: usize, graph: bool) -> (AmbientEngine, MixerProcessor) {
    let probe = if graph {
        FixedProbe::available(GraphCapabilities {
            device: "Test Device".into(),
            sample_rate: RATE,
            channels: 2,
        })
    } else {
        FixedProbe::unavailable("forced fallback")
    };

    let config = EngineConfig {
        sample_rate: RATE,
        block_frames: BLOCK,
        master_volume: 1.0,
        crossfade_secs: 0.0,
        dispose_timeout_ms: 0,
        event_capacity: 4096,
        ..Default::default()
    };

    let (mut engine, processor) = AmbientEngine::new(
        vec![TrackDescriptor::new("rain", "Rain", 1.0)],
        BackendSelector::select(&probe),
        Arc::new(RampDecoder { frames }),
        config,
    );
    assert!(engine
        .load_buffer("rain", &AudioSource::Path(PathBuf::from("rain.wav")))
        .is_loaded());
    engine.set_track_enabled("rain", true);
    (engine, processor)
}

/// Play 2.5 iterations and check every output frame against the loop content
fn assert_seamless(duration_secs: f64, graph: bool) {
    let frames = (duration_secs * f64::from(RATE)) as usize;
    let total = frames * 5 / 2;
    let (engine, mut processor) = engine(frames, graph);

    let mut left = Vec::with_capacity(total);
    let mut right = Vec::with_capacity(total);
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(1000);
        let mut out = vec![0.0f32; n * 2];
        processor.process(&mut out, 2);
        for frame in out.chunks_exact(2) {
            left.push(frame[0]);
            right.push(frame[1]);
        }
        remaining -= n;
    }

    for (i, (l, r)) in left.iter().zip(&right).enumerate() {
        let want = expected(i, frames);
        assert_eq!(*l, want, "left frame {i} of D={duration_secs}s");
        assert_eq!(*r, -want, "right frame {i} of D={duration_secs}s");
    }

    let voice = processor.voice("rain").unwrap();
    assert_eq!(voice.iterations(), 3);
    assert!(voice.max_loop_gap_frames() <= BLOCK as u64);
    assert_eq!(voice.iteration_start(), Some(2 * frames as u64));

    if graph {
        // Every boundary was queued ahead of time, exactly on the boundary
        let scheduled: Vec<_> = std::iter::from_fn(|| engine.try_recv_event())
            .filter_map(|e| match e {
                MixerEvent::LoopScheduled {
                    iteration,
                    start_frame,
                    ..
                } => Some((iteration, start_frame)),
                _ => None,
            })
            .collect();
        assert_eq!(
            scheduled,
            vec![(2, frames as u64), (3, 2 * frames as u64)],
            "D={duration_secs}s"
        );
    }
}

#[test]
fn test_half_second_loop_is_seamless() {
    assert_seamless(0.5, true);
}

#[test]
fn test_three_second_loop_is_seamless() {
    assert_seamless(3.0, true);
}

#[test]
fn test_thirty_second_loop_is_seamless() {
    assert_seamless(30.0, true);
}

#[test]
fn test_element_backend_loops_natively() {
    assert_seamless(0.5, false);
}

#[test]
fn test_loop_shorter_than_a_block() {
    // 100 frames per loop, 256 frames per block: several wraps per block
    let (_engine, mut processor) = engine(100, true);
    let mut out = vec![0.0f32; 1000 * 2];
    processor.process(&mut out, 2);

    for (i, frame) in out.chunks_exact(2).enumerate() {
        assert_eq!(frame[0], expected(i, 100), "frame {i}");
    }
    // Ten complete loops: the eleventh has just begun
    assert_eq!(processor.voice("rain").unwrap().iterations(), 11);
}
