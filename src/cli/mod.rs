//! CLI Module
//!
//! Command-line interface for the reconstruction quality harness.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::dsp::reconstruct::ReconstructionConfig;
use crate::dsp::window::WindowKind;
use crate::engine::DEFAULT_SAMPLE_RATE;
use crate::quality::PesqMode;

/// Measure how much speech quality survives a mel-spectrogram round-trip
#[derive(Parser, Debug)]
#[command(name = "recon-eval")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score every .wav file in a directory and print summary statistics
    #[command(name = "evaluate")]
    Evaluate {
        /// Directory holding the .wav files (not searched recursively)
        dir: PathBuf,

        /// Sample rate files are resampled to
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Score the original against itself instead of a reconstruction
        #[arg(long)]
        no_reconstruct: bool,

        #[command(flatten)]
        transform: TransformArgs,

        /// Skip files that fail instead of aborting
        #[arg(long)]
        keep_going: bool,

        /// Write reconstructed audio to this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Write a JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Do not draw the per-file progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Score one degraded file against a reference
    #[command(name = "score")]
    Score {
        reference: PathBuf,
        degraded: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// wb (wideband) or nb (narrowband)
        #[arg(long, default_value = "wb")]
        mode: PesqMode,
    },

    /// Run one file through the mel round-trip and save the result
    #[command(name = "reconstruct")]
    Reconstruct {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        #[command(flatten)]
        transform: TransformArgs,
    },
}

/// Mel round-trip parameters shared by `evaluate` and `reconstruct`
#[derive(Args, Debug, Clone)]
pub struct TransformArgs {
    #[arg(long, default_value_t = 1024)]
    pub n_fft: usize,

    #[arg(long, default_value_t = 1024)]
    pub win_length: usize,

    #[arg(long, default_value_t = 256)]
    pub hop_length: usize,

    #[arg(long, default_value_t = 80)]
    pub n_mels: usize,

    /// hann, hamming, blackman, bartlett or boxcar
    #[arg(long, default_value = "hann")]
    pub window: WindowKind,

    /// Spectrogram exponent (1 = magnitude, 2 = power)
    #[arg(long, default_value_t = 2.0)]
    pub power: f32,

    /// Griffin-Lim iterations
    #[arg(long, default_value_t = 32)]
    pub n_iter: usize,

    /// Griffin-Lim momentum
    #[arg(long, default_value_t = 0.99)]
    pub momentum: f32,

    /// Seed for the initial phases
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl From<&TransformArgs> for ReconstructionConfig {
    fn from(args: &TransformArgs) -> Self {
        Self {
            n_fft: args.n_fft,
            win_length: args.win_length,
            hop_length: args.hop_length,
            n_mels: args.n_mels,
            window: args.window,
            power: args.power,
            n_iter: args.n_iter,
            momentum: args.momentum,
            seed: args.seed,
        }
    }
}
