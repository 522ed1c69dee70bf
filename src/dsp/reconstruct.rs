//! Mel-spectrogram analysis/synthesis round-trip
//!
//! `waveform -> mel spectrogram -> linear magnitude -> Griffin-Lim`, with the
//! same framing on the forward and inverse legs.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::griffin_lim::{griffin_lim, GriffinLimParams};
use crate::dsp::mel::{mel_to_stft, melspectrogram};
use crate::dsp::stft::StftParams;
use crate::dsp::window::WindowKind;
use crate::engine::Waveform;
use crate::error::{EvalError, Result};

/// Transform parameters for [`reconstruct_waveform`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub window: WindowKind,
    /// Exponent applied to the STFT magnitude (2.0 = power spectrogram)
    pub power: f32,
    pub n_iter: usize,
    pub momentum: f32,
    pub seed: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self::speech_16k()
    }
}

impl ReconstructionConfig {
    /// 64 ms frames, 16 ms hop, 80 mel bands
    pub fn speech_16k() -> Self {
        Self {
            n_fft: 1024,
            win_length: 1024,
            hop_length: 256,
            n_mels: 80,
            window: WindowKind::Hann,
            power: 2.0,
            n_iter: 32,
            momentum: 0.99,
            seed: 0,
        }
    }

    /// 50 ms window / 12.5 ms hop at 16 kHz, the common TTS vocoder framing
    pub fn tts_16k() -> Self {
        Self {
            n_fft: 1024,
            win_length: 800,
            hop_length: 200,
            ..Self::speech_16k()
        }
    }

    pub fn stft_params(&self) -> StftParams {
        StftParams {
            n_fft: self.n_fft,
            win_length: self.win_length,
            hop_length: self.hop_length,
            window: self.window,
        }
    }

    pub fn griffin_lim_params(&self) -> GriffinLimParams {
        GriffinLimParams {
            n_iter: self.n_iter,
            momentum: self.momentum,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.stft_params().validate()?;
        if self.n_mels == 0 {
            return Err(EvalError::InvalidConfig {
                reason: "n_mels must be positive".to_string(),
            });
        }
        if !(self.power > 0.0) {
            return Err(EvalError::InvalidConfig {
                reason: format!("power must be positive (got {})", self.power),
            });
        }
        self.griffin_lim_params().validate()
    }
}

/// Run `waveform` through the mel round-trip
///
/// The output has the input's sample rate and `hop_length * (len /
/// hop_length)` samples, i.e. slightly fewer than the input when its length
/// is not a multiple of the hop.
pub fn reconstruct_waveform(waveform: &Waveform, config: &ReconstructionConfig) -> Result<Waveform> {
    config.validate()?;
    let sample_rate = waveform.sample_rate();
    let stft = config.stft_params();

    let mel = melspectrogram(waveform.samples(), sample_rate, stft, config.n_mels, config.power)?;
    debug!("mel spectrogram: {} bands x {} frames", mel.n_bins(), mel.n_frames());

    let linear = mel_to_stft(&mel, sample_rate, config.n_fft, config.power)?;
    let samples = griffin_lim(&linear, stft, &config.griffin_lim_params())?;
    debug!(
        "reconstructed {} samples from {} input samples",
        samples.len(),
        waveform.len()
    );

    Waveform::new(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ReconstructionConfig {
        ReconstructionConfig {
            n_fft: 256,
            win_length: 256,
            hop_length: 64,
            n_mels: 32,
            n_iter: 8,
            ..ReconstructionConfig::speech_16k()
        }
    }

    #[test]
    fn test_presets_validate() {
        assert!(ReconstructionConfig::speech_16k().validate().is_ok());
        assert!(ReconstructionConfig::tts_16k().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            ReconstructionConfig { n_fft: 0, ..small_config() },
            ReconstructionConfig { hop_length: 0, ..small_config() },
            ReconstructionConfig { win_length: 512, ..small_config() },
            ReconstructionConfig { n_mels: 0, ..small_config() },
            ReconstructionConfig { power: 0.0, ..small_config() },
            ReconstructionConfig { momentum: -1.0, ..small_config() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(EvalError::InvalidConfig { .. })),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_length_is_hop_aligned() {
        let wave = Waveform::sine(300.0, 0.5, 0.3, 16000);
        let out = reconstruct_waveform(&wave, &small_config()).unwrap();
        assert_eq!(out.sample_rate(), 16000);
        assert_eq!(out.len(), 64 * (wave.len() / 64));
        assert!(out.len() <= wave.len());
    }

    #[test]
    fn test_silence_reconstructs_to_near_zero_energy() {
        let wave = Waveform::silence(0.25, 16000);
        let out = reconstruct_waveform(&wave, &small_config()).unwrap();
        assert!(out.energy() < 1e-12);
    }

    #[test]
    fn test_tone_energy_roughly_preserved() {
        let wave = Waveform::sine(440.0, 0.5, 0.5, 16000);
        let out = reconstruct_waveform(&wave, &small_config()).unwrap();
        let ratio = out.energy() / wave.truncated(out.len()).energy();
        assert!(ratio > 0.1 && ratio < 10.0, "energy ratio {}", ratio);
    }

    #[test]
    fn test_config_serializes_window_by_name() {
        let json = serde_json::to_string(&small_config()).unwrap();
        assert!(json.contains("\"window\":\"hann\""));
    }
}
