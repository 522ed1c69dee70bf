//! Perceptual speech quality scoring

pub mod bark;
pub mod pesq;

pub use pesq::{mos_lqo, pesq, pesq_waveforms, PesqMode, PesqResult, PesqScorer};
