//! Short-time Fourier transform
//!
//! Centered STFT and its overlap-add inverse. Frames are taken from the
//! signal padded with `n_fft / 2` zeros on both sides, so frame `t` is
//! centered on sample `t * hop_length`. The inverse divides by the
//! overlap-added squared window and trims the padding again, giving
//! `hop_length * (frames - 1)` output samples.

use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::dsp::window::WindowKind;
use crate::error::{EvalError, Result};

/// Frame-major time-frequency matrix
///
/// `data[frame * n_bins + bin]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram<T> {
    n_bins: usize,
    n_frames: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Spectrogram<T> {
    pub fn zeros(n_bins: usize, n_frames: usize) -> Self {
        Self {
            n_bins,
            n_frames,
            data: vec![T::default(); n_bins * n_frames],
        }
    }

    /// Build from frame-major data
    pub fn from_frames(n_bins: usize, n_frames: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != n_bins * n_frames {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "spectrogram data has {} values, expected {} x {}",
                    data.len(),
                    n_bins,
                    n_frames
                ),
            });
        }
        Ok(Self {
            n_bins,
            n_frames,
            data,
        })
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    #[inline]
    pub fn frame(&self, frame: usize) -> &[T] {
        &self.data[frame * self.n_bins..(frame + 1) * self.n_bins]
    }

    #[inline]
    pub fn frame_mut(&mut self, frame: usize) -> &mut [T] {
        &mut self.data[frame * self.n_bins..(frame + 1) * self.n_bins]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Element-wise map into a new spectrogram of the same shape
    pub fn map<U, F>(&self, f: F) -> Spectrogram<U>
    where
        F: Fn(T) -> U,
    {
        Spectrogram {
            n_bins: self.n_bins,
            n_frames: self.n_frames,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// `|X|^power` of a complex spectrogram
pub fn magnitude(spec: &Spectrogram<Complex32>, power: f32) -> Spectrogram<f32> {
    if power == 1.0 {
        spec.map(|c| c.norm())
    } else if power == 2.0 {
        spec.map(|c| c.norm_sqr())
    } else {
        spec.map(|c| c.norm().powf(power))
    }
}

/// Framing parameters shared by the forward and inverse transforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StftParams {
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub window: WindowKind,
}

impl StftParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_fft == 0 {
            return Err(EvalError::InvalidConfig {
                reason: "n_fft must be positive".to_string(),
            });
        }
        if self.hop_length == 0 {
            return Err(EvalError::InvalidConfig {
                reason: "hop_length must be positive".to_string(),
            });
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "win_length must be in 1..={} (got {})",
                    self.n_fft, self.win_length
                ),
            });
        }
        Ok(())
    }

    /// Number of one-sided frequency bins
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Planned forward/inverse STFT for one parameter set
pub struct StftPlan {
    params: StftParams,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl StftPlan {
    pub fn new(params: StftParams) -> Result<Self> {
        params.validate()?;
        let mut planner = FftPlanner::new();
        Ok(Self {
            window: params.window.padded(params.win_length, params.n_fft),
            forward: planner.plan_fft_forward(params.n_fft),
            inverse: planner.plan_fft_inverse(params.n_fft),
            params,
        })
    }

    /// Frames produced for a signal of `signal_len` samples
    pub fn num_frames(&self, signal_len: usize) -> usize {
        let pad = self.params.n_fft / 2;
        let padded_len = signal_len + 2 * pad;
        if padded_len < self.params.n_fft {
            return 0;
        }
        1 + (padded_len - self.params.n_fft) / self.params.hop_length
    }

    /// Centered STFT, one-sided
    pub fn forward(&self, signal: &[f32]) -> Spectrogram<Complex32> {
        let n_fft = self.params.n_fft;
        let hop = self.params.hop_length;
        let n_bins = self.params.n_bins();
        let n_frames = self.num_frames(signal.len());

        let pad = n_fft / 2;
        let mut padded = vec![0.0_f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let mut spec = Spectrogram::zeros(n_bins, n_frames);
        let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];

        for t in 0..n_frames {
            let start = t * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex32::new(padded[start + i] * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            spec.frame_mut(t).copy_from_slice(&buffer[..n_bins]);
        }

        spec
    }

    /// Overlap-add inverse of [`StftPlan::forward`]
    pub fn inverse(&self, spec: &Spectrogram<Complex32>) -> Vec<f32> {
        let n_fft = self.params.n_fft;
        let hop = self.params.hop_length;
        let n_frames = spec.n_frames();
        if n_frames == 0 {
            return Vec::new();
        }

        let full_len = n_fft + hop * (n_frames - 1);
        let mut output = vec![0.0_f32; full_len];
        let mut window_sum = vec![0.0_f32; full_len];
        let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];
        let scale = 1.0 / n_fft as f32;
        let usable_bins = spec.n_bins().min(n_fft / 2 + 1);

        for t in 0..n_frames {
            let frame = spec.frame(t);
            buffer.iter_mut().for_each(|c| *c = Complex32::new(0.0, 0.0));

            // Rebuild the Hermitian spectrum; DC and Nyquist are real
            buffer[0] = Complex32::new(frame[0].re, 0.0);
            for k in 1..usable_bins {
                let mirror = n_fft - k;
                if k == mirror {
                    buffer[k] = Complex32::new(frame[k].re, 0.0);
                } else if k < mirror {
                    buffer[k] = frame[k];
                    buffer[mirror] = frame[k].conj();
                }
            }

            self.inverse.process(&mut buffer);

            let start = t * hop;
            for i in 0..n_fft {
                let w = self.window[i];
                output[start + i] += buffer[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &wss) in output.iter_mut().zip(window_sum.iter()) {
            if wss > f32::MIN_POSITIVE {
                *sample /= wss;
            }
        }

        let start = n_fft / 2;
        let len = hop * (n_frames - 1);
        let end = (start + len).min(full_len);
        output[start..end].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waveform;
    use approx::assert_abs_diff_eq;

    fn plan(n_fft: usize, hop: usize, window: WindowKind) -> StftPlan {
        StftPlan::new(StftParams {
            n_fft,
            win_length: n_fft,
            hop_length: hop,
            window,
        })
        .unwrap()
    }

    #[test]
    fn test_frame_count_matches_centered_framing() {
        let p = plan(512, 128, WindowKind::Hann);
        assert_eq!(p.num_frames(16000), 1 + 16000 / 128);
        assert_eq!(p.num_frames(0), 1);
    }

    #[test]
    fn test_forward_shape() {
        let p = plan(256, 64, WindowKind::Hann);
        let spec = p.forward(&vec![0.1; 1000]);
        assert_eq!(spec.n_bins(), 129);
        assert_eq!(spec.n_frames(), 1 + 1000 / 64);
    }

    #[test]
    fn test_sine_peak_bin() {
        let sr = 16000;
        let n_fft = 512;
        let p = plan(n_fft, 128, WindowKind::Hann);
        let wave = Waveform::sine(1000.0, 0.5, 0.5, sr);
        let mag = magnitude(&p.forward(wave.samples()), 1.0);

        let mid = mag.n_frames() / 2;
        let frame = mag.frame(mid);
        let peak_bin = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 1000 * n_fft / sr as usize);
    }

    #[test]
    fn test_round_trip_reconstructs_interior() {
        let p = plan(256, 64, WindowKind::Hann);
        let signal: Vec<f32> = (0..2048)
            .map(|i| (i as f32 * 0.03).sin() * 0.5 + (i as f32 * 0.11).cos() * 0.2)
            .collect();

        let rebuilt = p.inverse(&p.forward(&signal));
        assert_eq!(rebuilt.len(), 2048);
        for (a, b) in signal.iter().zip(rebuilt.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_round_trip_short_window() {
        let p = StftPlan::new(StftParams {
            n_fft: 256,
            win_length: 128,
            hop_length: 32,
            window: WindowKind::Hamming,
        })
        .unwrap();
        let signal: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.05).sin()).collect();
        let rebuilt = p.inverse(&p.forward(&signal));
        for (a, b) in signal.iter().zip(rebuilt.iter()).skip(64).take(896) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_inverse_length_is_hop_multiple() {
        let p = plan(512, 128, WindowKind::Hann);
        let rebuilt = p.inverse(&p.forward(&vec![0.0; 1000]));
        assert_eq!(rebuilt.len(), 128 * (1000 / 128));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = StftParams {
            n_fft: 256,
            win_length: 512,
            hop_length: 64,
            window: WindowKind::Hann,
        };
        assert!(StftPlan::new(bad).is_err());

        let zero_hop = StftParams {
            hop_length: 0,
            win_length: 256,
            ..bad
        };
        assert!(zero_hop.validate().is_err());
    }

    #[test]
    fn test_spectrogram_from_frames_checks_shape() {
        assert!(Spectrogram::<f32>::from_frames(3, 2, vec![0.0; 6]).is_ok());
        assert!(Spectrogram::<f32>::from_frames(3, 2, vec![0.0; 5]).is_err());
    }
}
