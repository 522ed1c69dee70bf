//! Spectral transforms
//!
//! Everything needed for the mel round-trip:
//! window → STFT → mel spectrogram → NNLS inverse → Griffin-Lim.

pub mod griffin_lim;
pub mod mel;
pub mod reconstruct;
pub mod stft;
pub mod window;

pub use griffin_lim::{griffin_lim, GriffinLimParams};
pub use mel::{mel_to_stft, melspectrogram, MelFilterbank};
pub use reconstruct::{reconstruct_waveform, ReconstructionConfig};
pub use stft::{magnitude, Spectrogram, StftParams, StftPlan};
pub use window::WindowKind;
