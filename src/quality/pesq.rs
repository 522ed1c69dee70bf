//! PESQ-style perceptual speech quality
//!
//! Follows the processing chain of ITU-T P.862 (narrowband) and P.862.2
//! (wideband): level alignment, input filtering, time alignment, Bark-band
//! pitch power densities, frequency and gain compensation, Zwicker loudness,
//! symmetric and asymmetric disturbance, Lp aggregation over split-second
//! intervals and the P.862.1 / P.862.2 MOS-LQO mappings.
//!
//! The result is on the MOS-LQO scale but is not bit-exact with the ITU
//! reference implementation: the alignment is a single global delay and the
//! filters are idealised.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::dsp::window::WindowKind;
use crate::engine::Waveform;
use crate::error::{EvalError, Result};
use crate::quality::bark::BarkLayout;

// ============================================================================
// Model constants
// ============================================================================

/// Power below which a level-alignment band counts as silent
const SILENCE_LEVEL: f64 = 1e-10;

/// Frames quieter than this fraction of the mean reference power are inactive
const ACTIVITY_FLOOR: f64 = 1e-4;

/// Zwicker loudness scaling and exponent
const LOUDNESS_SCALE: f64 = 0.1866;
const ZWICKER_POWER: f64 = 0.23;

/// Offset in the asymmetry ratio, in level-aligned power units
const ASYM_OFFSET: f64 = 5e-6;

const MAX_FRAME_DISTURBANCE: f64 = 45.0;

/// Frames per split-second interval and the interval hop
const INTERVAL_FRAMES: usize = 20;
const INTERVAL_HOP: usize = 10;

/// Longest delay searched by the time alignment, in seconds
const MAX_DELAY_SECS: f64 = 0.5;

// ============================================================================
// Mode
// ============================================================================

/// Narrowband (P.862 + P.862.1) or wideband (P.862.2) operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PesqMode {
    #[default]
    Wideband,
    Narrowband,
}

impl PesqMode {
    pub fn short_name(&self) -> &'static str {
        match self {
            PesqMode::Wideband => "wb",
            PesqMode::Narrowband => "nb",
        }
    }

    /// Analysis band `[low, high]` Hz and number of Bark bands
    fn band_layout(&self) -> (f64, f64, usize) {
        match self {
            PesqMode::Wideband => (100.0, 7000.0, 49),
            PesqMode::Narrowband => (100.0, 4000.0, 42),
        }
    }

    /// Band used for level alignment
    fn alignment_band(&self) -> (f64, f64) {
        match self {
            PesqMode::Wideband => (100.0, 7000.0),
            PesqMode::Narrowband => (350.0, 3250.0),
        }
    }

    /// Idealised input filter: flat wideband, IRS-like telephone band
    fn input_filter(&self, hz: f64) -> f64 {
        match self {
            PesqMode::Wideband => {
                if hz < 100.0 {
                    0.0
                } else {
                    1.0
                }
            }
            PesqMode::Narrowband => {
                if (300.0..=3400.0).contains(&hz) {
                    1.0
                } else if (200.0..300.0).contains(&hz) || (3400.0..=3600.0).contains(&hz) {
                    0.1
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for PesqMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for PesqMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wb" | "wideband" => Ok(PesqMode::Wideband),
            "nb" | "narrowband" => Ok(PesqMode::Narrowband),
            other => Err(format!("unknown PESQ mode '{}' (expected wb or nb)", other)),
        }
    }
}

/// Map a raw P.862 score onto MOS-LQO
pub fn mos_lqo(raw: f64, mode: PesqMode) -> f64 {
    match mode {
        PesqMode::Narrowband => 0.999 + 4.0 / (1.0 + (-1.4945 * raw + 4.6607).exp()),
        PesqMode::Wideband => 0.999 + 4.0 / (1.0 + (-1.3669 * raw + 3.8224).exp()),
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Detailed outcome of one comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PesqResult {
    /// MOS-LQO score
    pub mos_lqo: f64,
    /// Raw score before the MOS-LQO mapping
    pub raw: f64,
    pub symmetric_disturbance: f64,
    pub asymmetric_disturbance: f64,
    /// Estimated delay of the degraded signal, in samples
    pub delay_samples: i64,
}

/// Perceptual model for one sample rate and mode
pub struct PesqScorer {
    mode: PesqMode,
    sample_rate: u32,
    frame_len: usize,
    window: Vec<f64>,
    window_energy: f64,
    filter: Vec<f64>,
    layout: BarkLayout,
    fft: Arc<dyn Fft<f64>>,
}

impl PesqScorer {
    /// Build the model
    ///
    /// Only 8000 and 16000 Hz are supported; wideband needs 16000 Hz.
    pub fn new(sample_rate: u32, mode: PesqMode) -> Result<Self> {
        let frame_len = match sample_rate {
            8000 => 256,
            16000 => 512,
            _ => {
                return Err(EvalError::UnsupportedSampleRate {
                    sample_rate,
                    reason: "expected 8000 or 16000".to_string(),
                })
            }
        };
        if mode == PesqMode::Wideband && sample_rate != 16000 {
            return Err(EvalError::UnsupportedSampleRate {
                sample_rate,
                reason: "wideband mode needs 16000".to_string(),
            });
        }

        let window: Vec<f64> = WindowKind::Hann
            .coefficients(frame_len)
            .into_iter()
            .map(f64::from)
            .collect();
        let window_energy = window.iter().map(|w| w * w).sum::<f64>();

        let bin_hz = sample_rate as f64 / frame_len as f64;
        let filter = (0..frame_len / 2 + 1)
            .map(|k| mode.input_filter(k as f64 * bin_hz))
            .collect();

        let (f_lo, f_hi, n_bands) = mode.band_layout();
        let layout = BarkLayout::new(sample_rate, frame_len, n_bands, f_lo, f_hi);

        let fft = FftPlanner::new().plan_fft_forward(frame_len);

        Ok(Self {
            mode,
            sample_rate,
            frame_len,
            window,
            window_energy,
            filter,
            layout,
            fft,
        })
    }

    /// Shortest accepted input (a quarter second)
    pub fn min_samples(&self) -> usize {
        (self.sample_rate as usize / 4).max(self.frame_len)
    }

    /// MOS-LQO of `degraded` against `reference`
    pub fn score(&self, reference: &[f32], degraded: &[f32]) -> Result<f64> {
        self.evaluate(reference, degraded).map(|r| r.mos_lqo)
    }

    /// Full comparison with intermediate disturbance values
    pub fn evaluate(&self, reference: &[f32], degraded: &[f32]) -> Result<PesqResult> {
        if reference.len() != degraded.len() {
            return Err(EvalError::LengthMismatch {
                reference: reference.len(),
                degraded: degraded.len(),
            });
        }
        if reference.len() < self.min_samples() {
            return Err(EvalError::SignalTooShort {
                samples: reference.len(),
                minimum: self.min_samples(),
            });
        }

        let reference: Vec<f64> = reference.iter().map(|&s| s as f64).collect();
        let degraded: Vec<f64> = degraded.iter().map(|&s| s as f64).collect();

        let delay = self.estimate_delay(&reference, &degraded);
        let degraded = shift(&degraded, delay);

        let ref_bins = self.frame_powers(&reference);
        let deg_bins = self.frame_powers(&degraded);

        // Level alignment
        let (align_lo, align_hi) = self.mode.alignment_band();
        let ref_level = self.band_level(&ref_bins, align_lo, align_hi);
        let deg_level = self.band_level(&deg_bins, align_lo, align_hi);
        if ref_level < SILENCE_LEVEL {
            return Err(EvalError::NoUtterances);
        }
        let ref_gain = 1.0 / ref_level;
        let deg_gain = if deg_level < SILENCE_LEVEL {
            ref_gain
        } else {
            1.0 / deg_level
        };

        let mut ref_pitch = self.pitch_power(&ref_bins, ref_gain);
        let mut deg_pitch = self.pitch_power(&deg_bins, deg_gain);

        let ref_frame_power: Vec<f64> = ref_pitch.iter().map(|f| f.iter().sum()).collect();
        let (first, last) = active_span(&ref_frame_power).ok_or(EvalError::NoUtterances)?;

        self.compensate_frequency_response(&mut ref_pitch, &deg_pitch, first, last);
        self.compensate_gain(&ref_pitch, &mut deg_pitch);

        let mut frame_sym = Vec::with_capacity(last - first + 1);
        let mut frame_asym = Vec::with_capacity(last - first + 1);
        for f in first..=last {
            let (sym, asym) = self.frame_disturbance(&ref_pitch[f], &deg_pitch[f]);
            let weight = (ref_frame_power[f] + 0.01).powf(0.04);
            frame_sym.push((sym / weight).min(MAX_FRAME_DISTURBANCE));
            frame_asym.push((asym / weight).min(MAX_FRAME_DISTURBANCE));
        }

        let d_sym = aggregate(&frame_sym);
        let d_asym = aggregate(&frame_asym);
        let raw = (4.5 - 0.1 * d_sym - 0.0309 * d_asym).clamp(-0.5, 4.5);
        let mos = mos_lqo(raw, self.mode);

        debug!(
            "PESQ ({}): delay {} samples, d_sym {:.3}, d_asym {:.3}, raw {:.3}, MOS-LQO {:.3}",
            self.mode, delay, d_sym, d_asym, raw, mos
        );

        Ok(PesqResult {
            mos_lqo: mos,
            raw,
            symmetric_disturbance: d_sym,
            asymmetric_disturbance: d_asym,
            delay_samples: delay,
        })
    }

    /// Global delay of `degraded` relative to `reference`
    ///
    /// Cross-correlates 4 ms RMS envelopes; ties resolve to the smallest
    /// absolute lag.
    fn estimate_delay(&self, reference: &[f64], degraded: &[f64]) -> i64 {
        let block = (self.sample_rate / 250) as usize;
        let env_ref = envelope(reference, block);
        let env_deg = envelope(degraded, block);
        if env_deg.iter().all(|&e| e == 0.0) {
            return 0;
        }

        let n = env_ref.len() as i64;
        let max_lag = ((MAX_DELAY_SECS * 250.0) as i64).min(n / 4).max(0);

        let correlate = |lag: i64| -> f64 {
            (0..n)
                .filter_map(|i| {
                    let j = i + lag;
                    (j >= 0 && j < n).then(|| env_ref[i as usize] * env_deg[j as usize])
                })
                .sum()
        };

        let mut best_lag = 0;
        let mut best = correlate(0);
        for step in 1..=max_lag {
            for lag in [step, -step] {
                let c = correlate(lag);
                if c > best {
                    best = c;
                    best_lag = lag;
                }
            }
        }

        best_lag * block as i64
    }

    /// One-sided power spectra of 50%-overlapping Hann frames
    ///
    /// Scaled so the bins of a stationary signal sum to its mean square.
    fn frame_powers(&self, signal: &[f64]) -> Vec<Vec<f64>> {
        let hop = self.frame_len / 2;
        let n_frames = (signal.len() - self.frame_len) / hop + 1;
        let n_bins = self.frame_len / 2 + 1;
        let norm = 1.0 / (self.frame_len as f64 * self.window_energy);

        let mut buffer = vec![Complex64::new(0.0, 0.0); self.frame_len];
        (0..n_frames)
            .map(|f| {
                let start = f * hop;
                for (i, slot) in buffer.iter_mut().enumerate() {
                    *slot = Complex64::new(signal[start + i] * self.window[i], 0.0);
                }
                self.fft.process(&mut buffer);
                (0..n_bins)
                    .map(|k| {
                        let fold = if k == 0 || k == self.frame_len / 2 { 1.0 } else { 2.0 };
                        buffer[k].norm_sqr() * fold * norm
                    })
                    .collect()
            })
            .collect()
    }

    /// Mean per-frame power between `lo` and `hi` Hz
    fn band_level(&self, frames: &[Vec<f64>], lo: f64, hi: f64) -> f64 {
        let bin_hz = self.sample_rate as f64 / self.frame_len as f64;
        let lo_bin = (lo / bin_hz).ceil() as usize;
        let hi_bin = ((hi / bin_hz).floor() as usize).min(self.frame_len / 2);
        if frames.is_empty() || lo_bin > hi_bin {
            return 0.0;
        }
        let total: f64 = frames
            .iter()
            .map(|f| f[lo_bin..=hi_bin].iter().sum::<f64>())
            .sum();
        total / frames.len() as f64
    }

    /// Filtered, level-aligned Bark band powers per frame
    fn pitch_power(&self, frames: &[Vec<f64>], gain: f64) -> Vec<Vec<f64>> {
        let mut filtered = vec![0.0; self.filter.len()];
        frames
            .iter()
            .map(|bins| {
                for ((out, &p), &h) in filtered.iter_mut().zip(bins).zip(&self.filter) {
                    *out = p * h * gain;
                }
                let mut bands = vec![0.0; self.layout.len()];
                self.layout.group(&filtered, &mut bands);
                bands
            })
            .collect()
    }

    /// Equalise the reference towards the degraded long-term spectrum
    fn compensate_frequency_response(
        &self,
        reference: &mut [Vec<f64>],
        degraded: &[Vec<f64>],
        first: usize,
        last: usize,
    ) {
        let frames = (last - first + 1) as f64;
        for (b, band) in self.layout.bands().iter().enumerate() {
            let avg_ref: f64 = reference[first..=last].iter().map(|f| f[b]).sum::<f64>() / frames;
            let avg_deg: f64 = degraded[first..=last].iter().map(|f| f[b]).sum::<f64>() / frames;
            let ratio = ((avg_deg + band.threshold) / (avg_ref + band.threshold)).clamp(0.01, 100.0);
            for frame in reference.iter_mut() {
                frame[b] *= ratio;
            }
        }
    }

    /// Scale each degraded frame towards the audible reference power
    fn compensate_gain(&self, reference: &[Vec<f64>], degraded: &mut [Vec<f64>]) {
        let bands = self.layout.bands();
        let offset: f64 = bands.iter().map(|b| 100.0 * b.threshold).sum();
        let audible = |frame: &[f64]| -> f64 {
            frame
                .iter()
                .zip(bands)
                .filter(|&(&p, band)| p > 100.0 * band.threshold)
                .map(|(&p, _)| p)
                .sum()
        };

        let mut smoothed: Option<f64> = None;
        for (r, d) in reference.iter().zip(degraded.iter_mut()) {
            let ratio = ((audible(r) + offset) / (audible(d) + offset)).clamp(3e-4, 5.0);
            let gain = match smoothed {
                Some(prev) => 0.8 * prev + 0.2 * ratio,
                None => ratio,
            };
            smoothed = Some(gain);
            d.iter_mut().for_each(|p| *p *= gain);
        }
    }

    /// Specific loudness of each band
    fn loudness(&self, pitch: &[f64]) -> Vec<f64> {
        pitch
            .iter()
            .zip(self.layout.bands())
            .map(|(&p, band)| {
                let mut exponent = ZWICKER_POWER;
                if band.centre_bark < 4.0 {
                    let h = (6.0 / (band.centre_bark + 2.0)).min(2.0);
                    exponent *= h.powf(0.15);
                }
                let thr = band.threshold;
                let l = LOUDNESS_SCALE
                    * (band.threshold_abs / 0.5).powf(exponent)
                    * ((0.5 + 0.5 * p / thr).powf(exponent) - 1.0);
                l.max(0.0)
            })
            .collect()
    }

    /// Symmetric and asymmetric disturbance of one frame
    fn frame_disturbance(&self, reference: &[f64], degraded: &[f64]) -> (f64, f64) {
        let loud_ref = self.loudness(reference);
        let loud_deg = self.loudness(degraded);

        let bands = self.layout.bands();
        let mut sym = vec![0.0; bands.len()];
        let mut asym = vec![0.0; bands.len()];

        for b in 0..bands.len() {
            let diff = loud_deg[b] - loud_ref[b];
            let dead_zone = 0.25 * loud_deg[b].min(loud_ref[b]);
            let d = if diff > dead_zone {
                diff - dead_zone
            } else if diff < -dead_zone {
                diff + dead_zone
            } else {
                0.0
            };
            sym[b] = d;

            let ratio = ((degraded[b] + ASYM_OFFSET) / (reference[b] + ASYM_OFFSET)).powf(1.2);
            let factor = if ratio < 3.0 { 0.0 } else { ratio.min(12.0) };
            asym[b] = d * factor;
        }

        let widths: Vec<f64> = bands.iter().map(|b| b.width_bark).collect();
        (pseudo_lp(&sym, &widths, 2.0), pseudo_lp(&asym, &widths, 1.0))
    }
}

// ============================================================================
// Free functions
// ============================================================================

/// MOS-LQO of two equal-length sample slices
pub fn pesq(reference: &[f32], degraded: &[f32], sample_rate: u32, mode: PesqMode) -> Result<f64> {
    PesqScorer::new(sample_rate, mode)?.score(reference, degraded)
}

/// MOS-LQO of two waveforms that share a sample rate
pub fn pesq_waveforms(reference: &Waveform, degraded: &Waveform, mode: PesqMode) -> Result<f64> {
    if reference.sample_rate() != degraded.sample_rate() {
        return Err(EvalError::UnsupportedSampleRate {
            sample_rate: degraded.sample_rate(),
            reason: format!("reference is at {} Hz", reference.sample_rate()),
        });
    }
    pesq(
        reference.samples(),
        degraded.samples(),
        reference.sample_rate(),
        mode,
    )
}

/// Band-width weighted Lp norm (band 0 excluded)
fn pseudo_lp(values: &[f64], widths: &[f64], p: f64) -> f64 {
    let mut total = 0.0;
    let mut weight = 0.0;
    for (v, w) in values.iter().zip(widths).skip(1) {
        total += (v.abs() * w).powf(p);
        weight += w;
    }
    if weight == 0.0 {
        return 0.0;
    }
    (total / weight).powf(1.0 / p) * weight
}

/// L6 within split-second intervals, then L2 across intervals
fn aggregate(frames: &[f64]) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    let lp = |values: &[f64], p: f64| -> f64 {
        let mean = values.iter().map(|v| v.powf(p)).sum::<f64>() / values.len() as f64;
        mean.powf(1.0 / p)
    };

    let intervals: Vec<f64> = if frames.len() <= INTERVAL_FRAMES {
        vec![lp(frames, 6.0)]
    } else {
        (0..=frames.len() - INTERVAL_FRAMES)
            .step_by(INTERVAL_HOP)
            .map(|start| lp(&frames[start..start + INTERVAL_FRAMES], 6.0))
            .collect()
    };

    lp(&intervals, 2.0)
}

/// Span from the first to the last active frame
fn active_span(frame_power: &[f64]) -> Option<(usize, usize)> {
    if frame_power.is_empty() {
        return None;
    }
    let mean = frame_power.iter().sum::<f64>() / frame_power.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let threshold = mean * ACTIVITY_FLOOR;
    let first = frame_power.iter().position(|&p| p > threshold)?;
    let last = frame_power.iter().rposition(|&p| p > threshold)?;
    Some((first, last))
}

/// RMS envelope over non-overlapping blocks, mean removed
fn envelope(signal: &[f64], block: usize) -> Vec<f64> {
    let env: Vec<f64> = signal
        .chunks(block)
        .map(|c| (c.iter().map(|s| s * s).sum::<f64>() / c.len() as f64).sqrt())
        .collect();
    let mean = env.iter().sum::<f64>() / env.len().max(1) as f64;
    env.into_iter().map(|e| e - mean).collect()
}

/// `out[i] = signal[i + delay]`, zero outside the signal
fn shift(signal: &[f64], delay: i64) -> Vec<f64> {
    if delay == 0 {
        return signal.to_vec();
    }
    let n = signal.len() as i64;
    (0..n)
        .map(|i| {
            let j = i + delay;
            if j >= 0 && j < n {
                signal[j as usize]
            } else {
                0.0
            }
        })
        .collect()
}
