//! recon-eval - speech reconstruction quality harness
//!
//! Loads speech recordings, passes them through a mel-spectrogram
//! analysis/synthesis round-trip and scores the result against the original
//! with a PESQ-style perceptual metric.
//!
//! # Architecture
//!
//! - `engine`: waveform type and WAV I/O
//! - `dsp`: windows, STFT, mel filterbank, Griffin-Lim and the round-trip
//! - `quality`: perceptual scoring
//! - `pipeline`: directory batch driver, summary statistics and reports

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod quality;

pub use error::{EvalError, Result};
