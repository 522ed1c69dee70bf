//! Bark-band layout for the perceptual model
//!
//! Groups FFT bins into bands of roughly equal width on the Bark scale and
//! attaches an absolute hearing threshold to each band.

/// Presentation level assumed for a level-aligned signal (dB SPL)
pub const LISTENING_LEVEL_DB: f64 = 79.0;

/// Frequency in Hz to Bark (Schroeder's approximation)
pub fn hz_to_bark(hz: f64) -> f64 {
    6.0 * (hz / 600.0).asinh()
}

/// Threshold in quiet, dB SPL (Terhardt)
pub fn hearing_threshold_db(hz: f64) -> f64 {
    let khz = (hz / 1000.0).max(0.02);
    3.64 * khz.powf(-0.8) - 6.5 * (-0.6 * (khz - 3.3).powi(2)).exp() + 1e-3 * khz.powi(4)
}

/// One Bark band: bins `[lo_bin, hi_bin)`
#[derive(Debug, Clone)]
pub struct BarkBand {
    pub lo_bin: usize,
    pub hi_bin: usize,
    pub centre_bark: f64,
    pub width_bark: f64,
    /// Hearing threshold in level-aligned power units
    pub threshold: f64,
    /// Hearing threshold in absolute (dB SPL referenced) power units
    pub threshold_abs: f64,
}

#[derive(Debug, Clone)]
pub struct BarkLayout {
    bands: Vec<BarkBand>,
}

impl BarkLayout {
    /// Split `[f_lo, f_hi]` into `n_bands` Bark-uniform bands over the bins
    /// of a `frame_len`-point FFT
    ///
    /// Bands narrower than one bin are widened to one bin; bands that no
    /// longer fit below `f_hi` are dropped.
    pub fn new(sample_rate: u32, frame_len: usize, n_bands: usize, f_lo: f64, f_hi: f64) -> Self {
        let bin_hz = sample_rate as f64 / frame_len as f64;
        let n_bins = frame_len / 2 + 1;
        let max_bin = ((f_hi / bin_hz).round() as usize).min(n_bins);

        let bark_lo = hz_to_bark(f_lo);
        let bark_hi = hz_to_bark(f_hi);

        let mut bands = Vec::with_capacity(n_bands);
        let mut lo_bin = (f_lo / bin_hz).round() as usize;

        for i in 0..n_bands {
            if lo_bin >= max_bin {
                break;
            }
            let edge_bark = bark_lo + (bark_hi - bark_lo) * (i + 1) as f64 / n_bands as f64;
            let edge_hz = 600.0 * (edge_bark / 6.0).sinh();
            let hi_bin = ((edge_hz / bin_hz).round() as usize)
                .max(lo_bin + 1)
                .min(max_bin);

            let lo_hz = lo_bin as f64 * bin_hz;
            let hi_hz = hi_bin as f64 * bin_hz;
            let centre_hz = 0.5 * (lo_hz + hi_hz);
            let threshold_db = hearing_threshold_db(centre_hz);

            bands.push(BarkBand {
                lo_bin,
                hi_bin,
                centre_bark: hz_to_bark(centre_hz),
                width_bark: (hz_to_bark(hi_hz) - hz_to_bark(lo_hz)).max(1e-3),
                threshold: 10f64.powf((threshold_db - LISTENING_LEVEL_DB) / 10.0),
                threshold_abs: 10f64.powf(threshold_db / 10.0),
            });

            lo_bin = hi_bin;
        }

        Self { bands }
    }

    pub fn bands(&self) -> &[BarkBand] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Sum bin powers into band powers
    pub fn group(&self, bin_power: &[f64], out: &mut [f64]) {
        for (o, band) in out.iter_mut().zip(&self.bands) {
            let hi = band.hi_bin.min(bin_power.len());
            *o = if band.lo_bin < hi {
                bin_power[band.lo_bin..hi].iter().sum()
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bark_scale_monotonic() {
        let mut prev = hz_to_bark(0.0);
        for hz in (100..8000).step_by(100) {
            let b = hz_to_bark(hz as f64);
            assert!(b > prev);
            prev = b;
        }
    }

    #[test]
    fn test_threshold_dips_near_3khz() {
        assert!(hearing_threshold_db(3300.0) < hearing_threshold_db(100.0));
        assert!(hearing_threshold_db(3300.0) < hearing_threshold_db(1000.0));
    }

    #[test]
    fn test_layout_bands_are_contiguous() {
        let layout = BarkLayout::new(16000, 512, 49, 100.0, 7000.0);
        assert!(!layout.is_empty());
        for pair in layout.bands().windows(2) {
            assert_eq!(pair[0].hi_bin, pair[1].lo_bin);
            assert!(pair[0].lo_bin < pair[0].hi_bin);
        }
        assert!(layout.bands().last().unwrap().hi_bin <= 257);
    }

    #[test]
    fn test_group_sums_bins() {
        let layout = BarkLayout::new(8000, 256, 42, 100.0, 4000.0);
        let power = vec![1.0; 129];
        let mut out = vec![0.0; layout.len()];
        layout.group(&power, &mut out);
        for (band, value) in layout.bands().iter().zip(&out) {
            assert_eq!(*value, (band.hi_bin - band.lo_bin) as f64);
        }
    }
}
