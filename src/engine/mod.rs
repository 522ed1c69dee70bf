//! Audio Engine Module
//!
//! Waveform storage and file I/O:
//! - Mono waveform buffer with level helpers
//! - WAV loading (downmix + resample) and export

pub mod buffer;
pub mod io;

pub use buffer::{truncate_to_common, Waveform, DEFAULT_SAMPLE_RATE};
pub use io::{load_waveform, save_waveform};
