//! Mel filterbank, mel spectrogram and its inverse
//!
//! The filterbank uses the Slaney mel scale (linear below 1 kHz,
//! logarithmic above) with triangular filters normalized to equal area.
//! The inverse mapping solves a non-negative least squares problem per
//! frame with accelerated projected gradient descent.

use log::warn;

use crate::dsp::stft::{magnitude, Spectrogram, StftParams, StftPlan};
use crate::error::{EvalError, Result};

/// Slaney scale: linear slope below this frequency
const MIN_LOG_HZ: f64 = 1000.0;
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

/// Iterations of the projected gradient solver in [`MelFilterbank::invert_nnls`]
pub const NNLS_ITERATIONS: usize = 150;

/// Power iterations used to bound the filterbank's spectral norm
const POWER_ITERATIONS: usize = 64;

#[inline]
fn log_step() -> f64 {
    6.4_f64.ln() / 27.0
}

/// Convert frequency in Hz to the Slaney mel scale
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert Slaney mel value back to Hz
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// One triangular filter, stored as its non-zero span
#[derive(Debug, Clone)]
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

/// Sparse `n_mels x n_bins` mel weight matrix
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    n_bins: usize,
    filters: Vec<MelFilter>,
}

impl MelFilterbank {
    /// Build a filterbank covering `[fmin, fmax]` Hz
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Result<Self> {
        if n_mels == 0 {
            return Err(EvalError::InvalidConfig {
                reason: "n_mels must be positive".to_string(),
            });
        }
        if n_fft == 0 {
            return Err(EvalError::InvalidConfig {
                reason: "n_fft must be positive".to_string(),
            });
        }
        if !(fmin >= 0.0 && fmax > fmin) {
            return Err(EvalError::InvalidConfig {
                reason: format!("mel range must satisfy 0 <= fmin < fmax (got {fmin}..{fmax})"),
            });
        }

        let n_bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;
        let fft_freqs: Vec<f64> = if n_bins == 1 {
            vec![0.0]
        } else {
            (0..n_bins)
                .map(|k| k as f64 * nyquist / (n_bins - 1) as f64)
                .collect()
        };

        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let mel_f: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
            .collect();

        let mut filters = Vec::with_capacity(n_mels);
        let mut empty = 0;

        for m in 0..n_mels {
            let lower_span = mel_f[m + 1] - mel_f[m];
            let upper_span = mel_f[m + 2] - mel_f[m + 1];
            let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);

            let row: Vec<f32> = fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_f[m]) / lower_span;
                    let upper = (mel_f[m + 2] - f) / upper_span;
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect();

            match row.iter().position(|&w| w > 0.0) {
                Some(start) => {
                    let end = row.iter().rposition(|&w| w > 0.0).unwrap_or(start) + 1;
                    filters.push(MelFilter {
                        start,
                        weights: row[start..end].to_vec(),
                    });
                }
                None => {
                    empty += 1;
                    filters.push(MelFilter {
                        start: 0,
                        weights: Vec::new(),
                    });
                }
            }
        }

        if empty > 0 {
            warn!(
                "{} of {} mel filters are empty; n_mels may be too high for n_fft={}",
                empty, n_mels, n_fft
            );
        }

        Ok(Self { n_bins, filters })
    }

    /// Full-band filterbank (`0 .. sample_rate / 2`)
    pub fn full_band(sample_rate: u32, n_fft: usize, n_mels: usize) -> Result<Self> {
        Self::new(sample_rate, n_fft, n_mels, 0.0, sample_rate as f64 / 2.0)
    }

    #[inline]
    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Weight of mel band `m` at FFT bin `k`
    pub fn weight(&self, m: usize, k: usize) -> f32 {
        let filter = &self.filters[m];
        if k < filter.start {
            return 0.0;
        }
        filter.weights.get(k - filter.start).copied().unwrap_or(0.0)
    }

    /// `out = M x` for one frame
    fn project(&self, x: &[f32], out: &mut [f32]) {
        for (o, filter) in out.iter_mut().zip(&self.filters) {
            *o = filter
                .weights
                .iter()
                .zip(&x[filter.start..filter.start + filter.weights.len()])
                .map(|(w, v)| w * v)
                .sum();
        }
    }

    /// `out = M^T r` for one frame
    fn back_project(&self, r: &[f32], out: &mut [f32]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        for (filter, &rm) in self.filters.iter().zip(r) {
            for (j, w) in filter.weights.iter().enumerate() {
                out[filter.start + j] += w * rm;
            }
        }
    }

    /// Map a linear spectrogram onto mel bands
    pub fn apply(&self, spec: &Spectrogram<f32>) -> Result<Spectrogram<f32>> {
        if spec.n_bins() != self.n_bins {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "spectrogram has {} bins, filterbank expects {}",
                    spec.n_bins(),
                    self.n_bins
                ),
            });
        }
        let mut mel = Spectrogram::zeros(self.n_mels(), spec.n_frames());
        for t in 0..spec.n_frames() {
            self.project(spec.frame(t), mel.frame_mut(t));
        }
        Ok(mel)
    }

    /// Largest eigenvalue of `M M^T`, the gradient step bound for NNLS
    fn lipschitz(&self) -> f32 {
        let mut v = vec![1.0_f32; self.n_mels()];
        let mut tmp = vec![0.0_f32; self.n_bins];
        let mut next = vec![0.0_f32; self.n_mels()];
        let mut estimate = 0.0_f32;

        for _ in 0..POWER_ITERATIONS {
            self.back_project(&v, &mut tmp);
            self.project(&tmp, &mut next);
            let norm = next.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm <= f32::MIN_POSITIVE {
                return 0.0;
            }
            let v_norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            estimate = norm / v_norm;
            for (vi, ni) in v.iter_mut().zip(&next) {
                *vi = ni / norm;
            }
        }

        estimate
    }

    /// Non-negative least squares inverse of [`MelFilterbank::apply`]
    ///
    /// For every frame solves `min ||M x - mel||^2` subject to `x >= 0`.
    /// Bins outside every filter stay at zero.
    pub fn invert_nnls(&self, mel: &Spectrogram<f32>, n_iter: usize) -> Result<Spectrogram<f32>> {
        if mel.n_bins() != self.n_mels() {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "mel spectrogram has {} bands, filterbank has {}",
                    mel.n_bins(),
                    self.n_mels()
                ),
            });
        }

        let n_bins = self.n_bins;
        let mut out = Spectrogram::zeros(n_bins, mel.n_frames());

        let lipschitz = self.lipschitz() * 1.01;
        if lipschitz <= 0.0 {
            return Ok(out);
        }
        let step = 1.0 / lipschitz;

        // Column norms for the initial guess
        let mut col_norm = vec![0.0_f32; n_bins];
        for filter in &self.filters {
            for (j, w) in filter.weights.iter().enumerate() {
                col_norm[filter.start + j] += w * w;
            }
        }

        let mut x = vec![0.0_f32; n_bins];
        let mut x_prev = vec![0.0_f32; n_bins];
        let mut y = vec![0.0_f32; n_bins];
        let mut grad = vec![0.0_f32; n_bins];
        let mut residual = vec![0.0_f32; self.n_mels()];

        for t in 0..mel.n_frames() {
            let target = mel.frame(t);

            self.back_project(target, &mut x);
            for (xi, &c) in x.iter_mut().zip(&col_norm) {
                *xi = if c > 0.0 { (*xi / c).max(0.0) } else { 0.0 };
            }
            x_prev.copy_from_slice(&x);
            y.copy_from_slice(&x);
            let mut momentum = 1.0_f32;

            for _ in 0..n_iter {
                self.project(&y, &mut residual);
                for (r, &b) in residual.iter_mut().zip(target) {
                    *r -= b;
                }
                self.back_project(&residual, &mut grad);

                for i in 0..n_bins {
                    x[i] = (y[i] - step * grad[i]).max(0.0);
                }

                let next_momentum = (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt()) / 2.0;
                let beta = (momentum - 1.0) / next_momentum;
                for i in 0..n_bins {
                    y[i] = x[i] + beta * (x[i] - x_prev[i]);
                }
                x_prev.copy_from_slice(&x);
                momentum = next_momentum;
            }

            out.frame_mut(t).copy_from_slice(&x);
        }

        Ok(out)
    }
}

/// Mel spectrogram of `signal`
///
/// Computes `|STFT|^power` with centered framing, then maps it through a
/// full-band Slaney filterbank with `n_mels` bands.
pub fn melspectrogram(
    signal: &[f32],
    sample_rate: u32,
    params: StftParams,
    n_mels: usize,
    power: f32,
) -> Result<Spectrogram<f32>> {
    if !(power > 0.0) {
        return Err(EvalError::InvalidConfig {
            reason: format!("power must be positive (got {power})"),
        });
    }
    let plan = StftPlan::new(params)?;
    let spec = magnitude(&plan.forward(signal), power);
    let filterbank = MelFilterbank::full_band(sample_rate, params.n_fft, n_mels)?;
    filterbank.apply(&spec)
}

/// Approximate a linear magnitude spectrogram from a mel spectrogram
///
/// Inverts the filterbank with NNLS and undoes the `power` exponent, so
/// the result is `|STFT|` with `1 + n_fft / 2` bins.
pub fn mel_to_stft(
    mel: &Spectrogram<f32>,
    sample_rate: u32,
    n_fft: usize,
    power: f32,
) -> Result<Spectrogram<f32>> {
    if !(power > 0.0) {
        return Err(EvalError::InvalidConfig {
            reason: format!("power must be positive (got {power})"),
        });
    }
    let filterbank = MelFilterbank::full_band(sample_rate, n_fft, mel.n_bins())?;
    let linear = filterbank.invert_nnls(mel, NNLS_ITERATIONS)?;
    let inv_power = 1.0 / power;
    Ok(if power == 1.0 {
        linear
    } else {
        linear.map(|v| v.powf(inv_power))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::window::WindowKind;
    use crate::engine::Waveform;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_slaney_scale_is_linear_below_1khz() {
        assert_abs_diff_eq!(hz_to_mel(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hz_to_mel(500.0), 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(hz_to_mel(1000.0), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mel_hz_round_trip() {
        for hz in [0.0, 123.0, 999.0, 1000.0, 2500.0, 8000.0] {
            assert_abs_diff_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_filterbank_shape_and_sign() {
        let fb = MelFilterbank::full_band(16000, 512, 40).unwrap();
        assert_eq!(fb.n_mels(), 40);
        assert_eq!(fb.n_bins(), 257);
        for m in 0..40 {
            for k in 0..257 {
                assert!(fb.weight(m, k) >= 0.0);
            }
        }
    }

    #[test]
    fn test_filters_have_equal_area_in_hz() {
        let n_fft = 2048;
        let sr = 16000;
        let fb = MelFilterbank::full_band(sr, n_fft, 40).unwrap();
        let bin_hz = sr as f32 / n_fft as f32;
        for m in 0..40 {
            let area: f32 = (0..fb.n_bins()).map(|k| fb.weight(m, k) * bin_hz).sum();
            assert!((area - 1.0).abs() < 0.1, "filter {} area {}", m, area);
        }
    }

    #[test]
    fn test_empty_mels_rejected() {
        assert!(MelFilterbank::full_band(16000, 512, 0).is_err());
        assert!(MelFilterbank::new(16000, 512, 10, 4000.0, 1000.0).is_err());
    }

    #[test]
    fn test_melspectrogram_shape() {
        let wave = Waveform::sine(440.0, 0.5, 0.5, 16000);
        let params = StftParams {
            n_fft: 512,
            win_length: 512,
            hop_length: 128,
            window: WindowKind::Hann,
        };
        let mel = melspectrogram(wave.samples(), 16000, params, 32, 2.0).unwrap();
        assert_eq!(mel.n_bins(), 32);
        assert_eq!(mel.n_frames(), 1 + 8000 / 128);
        assert!(mel.data().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_nnls_is_non_negative_and_consistent() {
        let fb = MelFilterbank::full_band(16000, 256, 24).unwrap();
        let linear: Vec<f32> = (0..fb.n_bins())
            .map(|k| 1.0 + (k as f32 * 0.2).sin().abs())
            .collect();
        let spec = Spectrogram::from_frames(fb.n_bins(), 1, linear).unwrap();
        let mel = fb.apply(&spec).unwrap();

        let recovered = fb.invert_nnls(&mel, 400).unwrap();
        assert!(recovered.data().iter().all(|&v| v >= 0.0));

        // Re-projecting the estimate should land close to the mel target
        let reprojected = fb.apply(&recovered).unwrap();
        for (a, b) in mel.data().iter().zip(reprojected.data()) {
            assert!((a - b).abs() <= 0.05 * a.abs().max(1e-3), "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_mel_to_stft_shape() {
        let fb = MelFilterbank::full_band(16000, 256, 16).unwrap();
        let mel = Spectrogram::from_frames(16, 3, vec![1.0; 48]).unwrap();
        let stft = mel_to_stft(&mel, 16000, 256, 2.0).unwrap();
        assert_eq!(stft.n_bins(), fb.n_bins());
        assert_eq!(stft.n_frames(), 3);
        assert!(stft.data().iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_zero_power_rejected() {
        let params = StftParams {
            n_fft: 256,
            win_length: 256,
            hop_length: 64,
            window: WindowKind::Hann,
        };
        assert!(melspectrogram(&[0.0; 512], 16000, params, 16, 0.0).is_err());
    }
}
