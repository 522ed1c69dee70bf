//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use log::{info, warn};

use crate::dsp::reconstruct::{reconstruct_waveform, ReconstructionConfig};
use crate::engine::{load_waveform, save_waveform, truncate_to_common};
use crate::error::Result;
use crate::pipeline::{run_batch, BatchConfig, EvaluationReport, ScoreSummary};
use crate::quality::{PesqMode, PesqScorer};

/// Evaluate a directory and print the four summary lines.
pub fn evaluate(dir: &Path, config: &BatchConfig, report: Option<&Path>) -> Result<ScoreSummary> {
    let outcome = run_batch(dir, config)?;
    if !outcome.skipped.is_empty() {
        warn!("{} file(s) skipped", outcome.skipped.len());
    }

    let summary = ScoreSummary::from_scores(&outcome.values())?;
    print!("{}", summary);

    if let Some(path) = report {
        EvaluationReport::new(dir, config, &outcome, &summary).save(path)?;
    }

    Ok(summary)
}

/// Score a degraded file against a reference and print the result.
///
/// Both files are truncated to the shorter one before scoring.
pub fn score(reference: &Path, degraded: &Path, sample_rate: u32, mode: PesqMode) -> Result<f64> {
    info!(
        "Scoring {} against {} ({})",
        degraded.display(),
        reference.display(),
        mode
    );

    let scorer = PesqScorer::new(sample_rate, mode)?;
    let reference = load_waveform(reference, sample_rate)?;
    let degraded = load_waveform(degraded, sample_rate)?;
    if reference.len() != degraded.len() {
        warn!(
            "Length mismatch ({} vs {} samples), truncating",
            reference.len(),
            degraded.len()
        );
    }

    let (reference, degraded) = truncate_to_common(&reference, &degraded);
    let value = scorer.score(reference.samples(), degraded.samples())?;
    println!("PESQ: {}", value);

    Ok(value)
}

/// Reconstruct one file through the mel round-trip and write a 16-bit WAV.
pub fn reconstruct(
    input: &Path,
    output: &Path,
    sample_rate: u32,
    config: &ReconstructionConfig,
) -> Result<()> {
    info!("Reconstructing {} -> {}", input.display(), output.display());

    let original = load_waveform(input, sample_rate)?;
    let rebuilt = reconstruct_waveform(&original, config)?;
    save_waveform(&rebuilt, output, 16)?;

    println!(
        "Reconstructed {} samples ({:.2}s) to {}",
        rebuilt.len(),
        rebuilt.duration_secs(),
        output.display()
    );

    Ok(())
}
