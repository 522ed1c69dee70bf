//! Griffin-Lim phase reconstruction
//!
//! Estimates a signal whose STFT magnitude matches a target magnitude
//! spectrogram by alternating projections, with the "fast" momentum update
//! of Perraudin et al. Phases start from a seeded random draw so repeated
//! runs over the same input give the same waveform.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex32;

use crate::dsp::stft::{Spectrogram, StftParams, StftPlan};
use crate::error::{EvalError, Result};

/// Iteration settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GriffinLimParams {
    /// Number of projection iterations
    pub n_iter: usize,
    /// Momentum of the fast update (0 gives classic Griffin-Lim)
    pub momentum: f32,
    /// Seed for the initial random phases
    pub seed: u64,
}

impl Default for GriffinLimParams {
    fn default() -> Self {
        Self {
            n_iter: 32,
            momentum: 0.99,
            seed: 0,
        }
    }
}

impl GriffinLimParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.momentum >= 0.0) {
            return Err(EvalError::InvalidConfig {
                reason: format!("momentum must be non-negative (got {})", self.momentum),
            });
        }
        if self.momentum > 1.0 {
            warn!(
                "Griffin-Lim momentum {} > 1 may be unstable",
                self.momentum
            );
        }
        Ok(())
    }
}

/// Reconstruct a waveform from a linear magnitude spectrogram
///
/// `magnitude` must have `1 + n_fft / 2` bins. The result has
/// `hop_length * (frames - 1)` samples.
pub fn griffin_lim(
    magnitude: &Spectrogram<f32>,
    params: StftParams,
    gl: &GriffinLimParams,
) -> Result<Vec<f32>> {
    gl.validate()?;
    let plan = StftPlan::new(params)?;

    if magnitude.n_bins() != params.n_bins() {
        return Err(EvalError::InvalidConfig {
            reason: format!(
                "magnitude has {} bins, n_fft={} needs {}",
                magnitude.n_bins(),
                params.n_fft,
                params.n_bins()
            ),
        });
    }

    let n_bins = magnitude.n_bins();
    let n_frames = magnitude.n_frames();
    debug!(
        "Griffin-Lim: {} bins x {} frames, {} iterations, momentum {}",
        n_bins, n_frames, gl.n_iter, gl.momentum
    );

    let mut rng = StdRng::seed_from_u64(gl.seed);
    let mut angles: Spectrogram<Complex32> = Spectrogram::zeros(n_bins, n_frames);
    for a in angles.data_mut() {
        let phase = 2.0 * std::f32::consts::PI * rng.gen::<f32>();
        *a = Complex32::from_polar(1.0, phase);
    }

    let mut previous: Spectrogram<Complex32> = Spectrogram::zeros(n_bins, n_frames);
    let blend = gl.momentum / (1.0 + gl.momentum);

    for _ in 0..gl.n_iter {
        let estimate = apply_magnitude(magnitude, &angles);
        let inverse = plan.inverse(&estimate);
        let rebuilt = plan.forward(&inverse);

        for t in 0..n_frames.min(rebuilt.n_frames()) {
            let rebuilt_frame = rebuilt.frame(t);
            let previous_frame = previous.frame(t);
            for ((a, &r), &p) in angles
                .frame_mut(t)
                .iter_mut()
                .zip(rebuilt_frame)
                .zip(previous_frame)
            {
                let updated = r - p * blend;
                *a = updated / (updated.norm() + f32::MIN_POSITIVE);
            }
        }

        previous = rebuilt;
    }

    Ok(plan.inverse(&apply_magnitude(magnitude, &angles)))
}

/// `magnitude * angles`, element-wise
fn apply_magnitude(
    magnitude: &Spectrogram<f32>,
    angles: &Spectrogram<Complex32>,
) -> Spectrogram<Complex32> {
    let mut out = angles.clone();
    for (c, &m) in out.data_mut().iter_mut().zip(magnitude.data()) {
        *c *= m;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::stft::magnitude;
    use crate::dsp::window::WindowKind;
    use crate::engine::Waveform;

    fn params() -> StftParams {
        StftParams {
            n_fft: 256,
            win_length: 256,
            hop_length: 64,
            window: WindowKind::Hann,
        }
    }

    fn spectral_error(target: &Spectrogram<f32>, signal: &[f32]) -> f32 {
        let plan = StftPlan::new(params()).unwrap();
        let rebuilt = magnitude(&plan.forward(signal), 1.0);
        let num: f32 = target
            .data()
            .iter()
            .zip(rebuilt.data())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let den: f32 = target.data().iter().map(|a| a * a).sum();
        (num / den).sqrt()
    }

    #[test]
    fn test_output_length() {
        let wave = Waveform::sine(500.0, 0.5, 0.25, 8000);
        let plan = StftPlan::new(params()).unwrap();
        let mag = magnitude(&plan.forward(wave.samples()), 1.0);
        let out = griffin_lim(&mag, params(), &GriffinLimParams::default()).unwrap();
        assert_eq!(out.len(), 64 * (mag.n_frames() - 1));
    }

    #[test]
    fn test_iterations_reduce_spectral_error() {
        let wave = Waveform::sine(440.0, 0.5, 0.25, 8000);
        let plan = StftPlan::new(params()).unwrap();
        let mag = magnitude(&plan.forward(wave.samples()), 1.0);

        let zero_iter = GriffinLimParams {
            n_iter: 0,
            ..Default::default()
        };
        let many_iter = GriffinLimParams {
            n_iter: 50,
            ..Default::default()
        };

        let before = spectral_error(&mag, &griffin_lim(&mag, params(), &zero_iter).unwrap());
        let after = spectral_error(&mag, &griffin_lim(&mag, params(), &many_iter).unwrap());
        assert!(after < before, "error did not drop: {} -> {}", before, after);
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let wave = Waveform::sine(300.0, 0.3, 0.2, 8000);
        let plan = StftPlan::new(params()).unwrap();
        let mag = magnitude(&plan.forward(wave.samples()), 1.0);
        let gl = GriffinLimParams {
            n_iter: 5,
            ..Default::default()
        };
        let a = griffin_lim(&mag, params(), &gl).unwrap();
        let b = griffin_lim(&mag, params(), &gl).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mag = Spectrogram::zeros(129, 20);
        let out = griffin_lim(&mag, params(), &GriffinLimParams::default()).unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_bin_mismatch_rejected() {
        let mag = Spectrogram::zeros(100, 4);
        assert!(griffin_lim(&mag, params(), &GriffinLimParams::default()).is_err());
    }

    #[test]
    fn test_negative_momentum_rejected() {
        let gl = GriffinLimParams {
            momentum: -0.5,
            ..Default::default()
        };
        assert!(gl.validate().is_err());
    }
}
