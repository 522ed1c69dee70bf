//! Waveform Buffer
//!
//! Provides the mono waveform type used throughout the evaluation harness.
//! A waveform is loaded once, then only ever read: reconstruction and
//! truncation produce new values instead of editing samples in place.

use crate::error::{EvalError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default analysis sample rate (16kHz wideband speech)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Sum of squared samples, accumulated in f64
pub fn calculate_energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// RMS level of a sample slice in dB
///
/// Returns -f32::INFINITY for empty or silent input.
pub fn calculate_rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let rms = (calculate_energy(samples) / samples.len() as f64).sqrt() as f32;
    linear_to_db(rms)
}

// ============================================================================
// Waveform
// ============================================================================

/// Mono waveform at a fixed sample rate
///
/// # Example
/// ```
/// use recon_eval::engine::Waveform;
///
/// let wave = Waveform::new(vec![0.0, 0.5, -0.5, 0.0], 16000).unwrap();
/// assert_eq!(wave.len(), 4);
/// assert_eq!(wave.truncated(2).samples(), &[0.0, 0.5]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Wrap samples at the given rate
    ///
    /// Fails with `UnsupportedFormat` for a zero sample rate. Empty sample
    /// vectors are allowed here; loaders reject them separately.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EvalError::UnsupportedFormat {
                format: "0 Hz sample rate".to_string(),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Silent waveform of the given duration
    pub fn silence(duration_secs: f32, sample_rate: u32) -> Self {
        let num_samples = (duration_secs * sample_rate as f32) as usize;
        Self {
            samples: vec![0.0; num_samples],
            sample_rate,
        }
    }

    /// Sine tone, mostly for fixtures and benchmarks
    pub fn sine(frequency: f32, amplitude: f32, duration_secs: f32, sample_rate: u32) -> Self {
        let num_samples = (duration_secs * sample_rate as f32) as usize;
        let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
        let samples = (0..num_samples)
            .map(|i| amplitude * (angular_freq * i as f32).sin())
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Deterministic voiced-speech stand-in
    ///
    /// Harmonics of a gliding 120 Hz fundamental up to 3.8 kHz with 1/n
    /// rolloff, gated by a 3 Hz syllable envelope. Peak amplitude is 0.5.
    pub fn speech_like(duration_secs: f32, sample_rate: u32) -> Self {
        use std::f64::consts::PI;

        let num_samples = (duration_secs * sample_rate as f32) as usize;
        let sr = sample_rate as f64;
        let mut phase = 0.0_f64;
        let mut raw = Vec::with_capacity(num_samples);

        for i in 0..num_samples {
            let t = i as f64 / sr;
            let f0 = 120.0 + 30.0 * (2.0 * PI * 0.5 * t).sin();
            phase += 2.0 * PI * f0 / sr;

            let n_harmonics = ((3800.0_f64.min(sr / 2.0 - 100.0)) / f0).floor() as usize;
            let voiced: f64 = (1..=n_harmonics)
                .map(|n| (n as f64 * phase).sin() / n as f64)
                .sum();
            let envelope = (2.0 * PI * 3.0 * t).sin().max(0.0).sqrt();
            raw.push(voiced * envelope);
        }

        let peak = raw.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        let scale = if peak > 0.0 { 0.5 / peak } else { 0.0 };
        Self {
            samples: raw.into_iter().map(|s| (s * scale) as f32).collect(),
            sample_rate,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Copy of the first `len` samples (or all of them if shorter)
    pub fn truncated(&self, len: usize) -> Self {
        let end = len.min(self.samples.len());
        Self {
            samples: self.samples[..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Total energy (sum of squares)
    pub fn energy(&self) -> f64 {
        calculate_energy(&self.samples)
    }

    /// RMS level in dBFS
    pub fn rms_db(&self) -> f32 {
        calculate_rms_db(&self.samples)
    }
}

/// Truncate two waveforms to their common length
///
/// Both results start at sample zero and have `min(a.len(), b.len())`
/// samples.
pub fn truncate_to_common(a: &Waveform, b: &Waveform) -> (Waveform, Waveform) {
    let len = a.len().min(b.len());
    (a.truncated(len), b.truncated(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_db_conversion() {
        assert_abs_diff_eq!(linear_to_db(1.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(linear_to_db(0.5), -6.02, epsilon = 0.01);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(Waveform::new(vec![0.0; 4], 0).is_err());
    }

    #[test]
    fn test_sine_levels() {
        let wave = Waveform::sine(440.0, 1.0, 1.0, 16000);
        assert_eq!(wave.len(), 16000);
        assert_abs_diff_eq!(wave.rms_db(), -3.01, epsilon = 0.05);
    }

    #[test]
    fn test_silence_is_silent() {
        let wave = Waveform::silence(0.5, 16000);
        assert_eq!(wave.len(), 8000);
        assert_eq!(wave.energy(), 0.0);
        assert_eq!(wave.rms_db(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_speech_like_is_deterministic_and_bounded() {
        let a = Waveform::speech_like(0.5, 16000);
        let b = Waveform::speech_like(0.5, 16000);
        assert_eq!(a.samples(), b.samples());
        let peak = a.samples().iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert_abs_diff_eq!(peak, 0.5, epsilon = 1e-6);
        assert!(a.rms_db() > -30.0);
    }

    #[test]
    fn test_truncate_to_common_keeps_prefix() {
        let a = Waveform::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], 8000).unwrap();
        let b = Waveform::new(vec![9.0, 8.0, 7.0], 8000).unwrap();
        let (ta, tb) = truncate_to_common(&a, &b);
        assert_eq!(ta.samples(), &[1.0, 2.0, 3.0]);
        assert_eq!(tb.samples(), &[9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_truncated_longer_than_len() {
        let a = Waveform::new(vec![1.0, 2.0], 8000).unwrap();
        assert_eq!(a.truncated(10).len(), 2);
    }
}
