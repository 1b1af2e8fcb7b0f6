//! Property-based tests for the gain law and crossfade settling
//!
//! Uses proptest to check invariants across random volumes, crossfade lengths
//! and toggle sequences.

use ambient_mixer::{
    AmbientEngine, AudioSource, BackendSelector, CrossfadeScheduler, DecodedBuffer, EngineConfig,
    FadeCurve, FixedProbe, GraphCapabilities, MasterBus, MixerProcessor, SourceDecoder,
    TrackDescriptor,
};
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

const RATE: u32 = 8_000;
const BLOCK: usize = 64;

// ===== Helpers =====

struct OnesDecoder;

impl SourceDecoder for OnesDecoder {
    fn decode(&self, _source: &AudioSource, rate: u32) -> ambient_mixer::Result<DecodedBuffer> {
        Ok(DecodedBuffer::from_fn(rate as usize, rate, |_| (1.0, 1.0)))
    }
}

fn engine() -> (AmbientEngine, MixerProcessor) {
    let backend = BackendSelector::select(&FixedProbe::available(GraphCapabilities {
        device: "Test Device".into(),
        sample_rate: RATE,
        channels: 2,
    }));
    let config = EngineConfig {
        sample_rate: RATE,
        block_frames: BLOCK,
        dispose_timeout_ms: 0,
        ..Default::default()
    };
    let (mut engine, processor) = AmbientEngine::new(
        vec![TrackDescriptor::new("rain", "Rain", 1.0)],
        backend,
        Arc::new(OnesDecoder),
        config,
    );
    engine.load_buffer("rain", &AudioSource::Path(PathBuf::from("rain.wav")));
    (engine, processor)
}

fn render_left(processor: &mut MixerProcessor, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    processor.process(&mut out, 2);
    out.chunks_exact(2).map(|f| f[0]).collect()
}

// ===== Property Tests =====

proptest! {
    /// Property: after the crossfade settles, output = master x volume
    #[test]
    fn steady_state_gain_is_master_times_volume(
        master in 0.0f32..=1.0,
        volume in 0.0f32..=1.0,
        crossfade in 0.0f32..0.05,
    ) {
        let (mut engine, mut processor) = engine();
        engine.set_master_volume(master);
        engine.set_crossfade(crossfade);
        engine.set_track_state("rain", true, volume);

        let settle = (crossfade * RATE as f32) as usize + BLOCK;
        processor.tick(settle);

        let left = render_left(&mut processor, BLOCK);
        let want = master * volume;
        prop_assert!(left.iter().all(|s| (s - want).abs() < 1e-5), "want {want}, got {}", left[0]);
    }

    /// Property: out-of-range inputs are clamped, never rejected
    #[test]
    fn inputs_are_clamped(
        master in -5.0f32..5.0,
        volume in -5.0f32..5.0,
        crossfade in -30.0f32..30.0,
    ) {
        let (mut engine, _processor) = engine();
        engine.set_master_volume(master);
        engine.set_track_volume("rain", volume);
        engine.set_crossfade(crossfade);

        let state = engine.state();
        prop_assert!((0.0..=1.0).contains(&state.master_volume));
        prop_assert!((0.0..=1.0).contains(&state.tracks[0].volume));
        prop_assert!((0.0..=10.0).contains(&state.crossfade_secs));
    }

    /// Property: the bus gain is always within [0, 1] and finite
    #[test]
    fn effective_gain_is_bounded(
        master in prop::num::f32::ANY,
        volume in prop::num::f32::ANY,
        fade in prop::num::f32::ANY,
    ) {
        let bus = MasterBus::new(master, 1.0, FadeCurve::Linear);
        let gain = bus.effective_gain(volume, fade);
        prop_assert!(gain.is_finite());
        prop_assert!((0.0..=1.0).contains(&gain));
    }

    /// Property: any toggle sequence ending disabled settles silent within one crossfade
    #[test]
    fn toggle_sequences_never_get_stuck(
        toggles in prop::collection::vec(1usize..400, 1..12),
        crossfade in 0.0f32..0.05,
    ) {
        let (mut engine, mut processor) = engine();
        engine.set_crossfade(crossfade);

        for frames in toggles {
            engine.toggle_track("rain");
            processor.tick(frames);
        }
        engine.set_track_enabled("rain", false);

        let settle = (crossfade * RATE as f32).ceil() as usize + BLOCK;
        processor.tick(settle);

        let voice = processor.voice("rain").unwrap();
        prop_assert!(!voice.is_playing());
        prop_assert!(!voice.fade().is_ramping());
        prop_assert!(render_left(&mut processor, BLOCK).iter().all(|s| *s == 0.0));
    }

    /// Property: retargeting never makes the gain jump
    #[test]
    fn retarget_is_continuous(
        first_len in 1u64..1000,
        second_len in 1u64..1000,
        at in 0u64..1000,
        curve in prop_oneof![Just(FadeCurve::Linear), Just(FadeCurve::EqualPower)],
    ) {
        let mut fade = CrossfadeScheduler::new();
        fade.retarget(0, 1.0, first_len, curve);
        fade.advance(at);

        let before = fade.gain_at(at);
        fade.retarget(at, 0.0, second_len, curve);
        prop_assert!((fade.gain_at(at) - before).abs() < 1e-6);
        prop_assert!(fade.gain_at(at + second_len) == 0.0);
    }
}
