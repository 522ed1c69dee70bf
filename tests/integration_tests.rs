//! Integration Tests
//!
//! End-to-end tests for the load -> reconstruct -> score pipeline.

use std::path::Path;

use approx::assert_abs_diff_eq;
use recon_eval::dsp::{
    reconstruct_waveform, ReconstructionConfig, StftParams, StftPlan, WindowKind,
};
use recon_eval::engine::{load_waveform, save_waveform, truncate_to_common, Waveform};
use recon_eval::quality::{mos_lqo, pesq, pesq_waveforms, PesqMode};
use recon_eval::EvalError;
use tempfile::tempdir;

/// Smaller transform so the tests stay fast
fn quick_config() -> ReconstructionConfig {
    ReconstructionConfig {
        n_fft: 512,
        win_length: 512,
        hop_length: 128,
        n_mels: 64,
        n_iter: 8,
        ..ReconstructionConfig::speech_16k()
    }
}

fn write_wav(path: &Path, wave: &Waveform) {
    save_waveform(wave, path, 32).unwrap();
}

// === Round-trip through files ===

#[test]
fn test_saved_speech_scores_itself_at_top() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speech.wav");
    write_wav(&path, &Waveform::speech_like(1.0, 16000));

    let loaded = load_waveform(&path, 16000).unwrap();
    let score = pesq_waveforms(&loaded, &loaded, PesqMode::Wideband).unwrap();
    assert_abs_diff_eq!(score, mos_lqo(4.5, PesqMode::Wideband), epsilon = 1e-9);
    assert_abs_diff_eq!(score, 4.644, epsilon = 0.01);
}

#[test]
fn test_reconstruction_scores_on_mos_scale() {
    let original = Waveform::speech_like(1.0, 16000);
    let rebuilt = reconstruct_waveform(&original, &quick_config()).unwrap();
    assert!(rebuilt.len() <= original.len());

    let (reference, degraded) = truncate_to_common(&original, &rebuilt);
    assert_eq!(reference.len(), rebuilt.len());

    let score = pesq_waveforms(&reference, &degraded, PesqMode::Wideband).unwrap();
    assert!((1.0..=4.65).contains(&score), "score {}", score);
}

#[test]
fn test_more_iterations_do_not_hurt_much() {
    let original = Waveform::speech_like(1.0, 16000);
    let few = ReconstructionConfig {
        n_iter: 2,
        ..quick_config()
    };
    let many = ReconstructionConfig {
        n_iter: 24,
        ..quick_config()
    };

    let score_for = |config: &ReconstructionConfig| {
        let rebuilt = reconstruct_waveform(&original, config).unwrap();
        let (r, d) = truncate_to_common(&original, &rebuilt);
        pesq_waveforms(&r, &d, PesqMode::Wideband).unwrap()
    };

    let few_score = score_for(&few);
    let many_score = score_for(&many);
    assert!(
        many_score > few_score - 0.5,
        "{} iterations: {}, {} iterations: {}",
        few.n_iter,
        few_score,
        many.n_iter,
        many_score
    );
}

#[test]
fn test_resampled_input_is_scored_at_target_rate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speech_8k.wav");
    write_wav(&path, &Waveform::speech_like(1.0, 8000));

    let wide = load_waveform(&path, 16000).unwrap();
    assert_eq!(wide.sample_rate(), 16000);
    assert_eq!(wide.len(), 16000);
    assert!(pesq_waveforms(&wide, &wide, PesqMode::Wideband).unwrap() > 4.5);

    let narrow = load_waveform(&path, 8000).unwrap();
    assert!(pesq_waveforms(&narrow, &narrow, PesqMode::Narrowband).unwrap() > 4.5);
}

// === Edge cases ===

#[test]
fn test_silence_round_trip() {
    let silence = Waveform::silence(0.5, 16000);
    let rebuilt = reconstruct_waveform(&silence, &quick_config()).unwrap();
    assert!(rebuilt.energy() < 1e-12);

    let (reference, degraded) = truncate_to_common(&silence, &rebuilt);
    let result = pesq(reference.samples(), degraded.samples(), 16000, PesqMode::Wideband);
    assert!(matches!(result, Err(EvalError::NoUtterances)));
}

#[test]
fn test_stft_inverse_is_near_perfect() {
    let params = StftParams {
        n_fft: 512,
        win_length: 512,
        hop_length: 128,
        window: WindowKind::Hann,
    };
    let plan = StftPlan::new(params).unwrap();
    let wave = Waveform::speech_like(0.5, 16000);
    let usable = 128 * (wave.len() / 128);

    let rebuilt = plan.inverse(&plan.forward(&wave.samples()[..usable]));
    assert_eq!(rebuilt.len(), usable);
    for (a, b) in wave.samples()[..usable].iter().zip(&rebuilt) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}

#[test]
fn test_rate_mismatch_is_rejected() {
    let a = Waveform::speech_like(0.5, 16000);
    let b = Waveform::speech_like(0.5, 8000);
    assert!(matches!(
        pesq_waveforms(&a, &b, PesqMode::Narrowband),
        Err(EvalError::UnsupportedSampleRate { .. })
    ));
}
