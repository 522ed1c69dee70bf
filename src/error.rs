//! Error handling for recon-eval
//!
//! Every fallible operation in the library returns [`EvalError`]. Batch runs
//! are fail-fast unless the caller opts into skipping bad files, so the
//! variants carry enough context (paths, sizes, rates) to explain the abort.

use thiserror::Error;

/// Result type alias for recon-eval operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Main error type for recon-eval operations
#[derive(Error, Debug)]
pub enum EvalError {
    // File Errors
    #[error("Failed to read audio file: {path}")]
    AudioRead {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write audio file: {path}")]
    AudioWrite {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Failed to resample from {from} Hz to {to} Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },

    #[error("Failed to list directory {path}: {reason}")]
    DirectoryWalk { path: String, reason: String },

    // Transform Errors
    #[error("Invalid transform configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Unknown window function: {name}")]
    UnknownWindow { name: String },

    // Scoring Errors
    #[error("Unsupported sample rate for scoring: {sample_rate} Hz ({reason})")]
    UnsupportedSampleRate { sample_rate: u32, reason: String },

    #[error("Signal length mismatch: reference has {reference} samples, degraded has {degraded}")]
    LengthMismatch { reference: usize, degraded: usize },

    #[error("Signal too short for scoring: {samples} samples (minimum {minimum})")]
    SignalTooShort { samples: usize, minimum: usize },

    #[error("No utterances detected in the reference signal")]
    NoUtterances,

    // Aggregation Errors
    #[error("No scores collected: cannot summarise an empty batch")]
    EmptyScores,

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EvalError::AudioRead { .. } => "AUDIO_READ",
            EvalError::AudioWrite { .. } => "AUDIO_WRITE",
            EvalError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            EvalError::EmptyAudio => "EMPTY_AUDIO",
            EvalError::Resample { .. } => "RESAMPLE",
            EvalError::DirectoryWalk { .. } => "DIRECTORY_WALK",
            EvalError::InvalidConfig { .. } => "INVALID_CONFIG",
            EvalError::UnknownWindow { .. } => "UNKNOWN_WINDOW",
            EvalError::UnsupportedSampleRate { .. } => "UNSUPPORTED_SAMPLE_RATE",
            EvalError::LengthMismatch { .. } => "LENGTH_MISMATCH",
            EvalError::SignalTooShort { .. } => "SIGNAL_TOO_SHORT",
            EvalError::NoUtterances => "NO_UTTERANCES",
            EvalError::EmptyScores => "EMPTY_SCORES",
            EvalError::Io(_) => "IO_ERROR",
            EvalError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::AudioRead { .. } => "Check that the file exists and is a valid WAV file",
            Self::UnsupportedFormat { .. } => "Convert to 16/24/32-bit PCM or 32-bit float WAV",
            Self::EmptyAudio => "Remove zero-length files from the input directory",
            Self::InvalidConfig { .. } => "Check n_fft, win_length, hop_length, n_mels and power",
            Self::UnknownWindow { .. } => "Use one of: hann, hamming, blackman, bartlett, boxcar",
            Self::UnsupportedSampleRate { .. } => "Score at 16000 Hz (wideband) or 8000 Hz (narrowband)",
            Self::SignalTooShort { .. } => "Use recordings of at least a quarter second",
            Self::NoUtterances => "The reference is silent; remove it or pass --keep-going",
            Self::EmptyScores => "Point the run at a directory that contains .wav files",
            _ => "Check the error details and try again",
        }
    }
}
