//! Batch evaluation over a directory of WAV files
//!
//! Every `.wav` file directly inside the directory is loaded, optionally
//! passed through the mel round-trip, truncated to the common length and
//! scored against the original.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::dsp::reconstruct::{reconstruct_waveform, ReconstructionConfig};
use crate::engine::{load_waveform, save_waveform, truncate_to_common, DEFAULT_SAMPLE_RATE};
use crate::error::{EvalError, Result};
use crate::quality::{PesqMode, PesqScorer};

/// Extension matched by the directory scan (case-sensitive)
pub const WAV_EXTENSION: &str = "wav";

/// Bit depth of reconstructions written to the save directory
const SAVE_BIT_DEPTH: u16 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Rate every file is resampled to before processing
    pub sample_rate: u32,
    /// Run the mel round-trip; when false the original is scored against itself
    pub reconstruct: bool,
    pub reconstruction: ReconstructionConfig,
    pub mode: PesqMode,
    /// Skip failing files instead of aborting the run
    pub keep_going: bool,
    /// Write each reconstruction here under its original file name
    pub save_dir: Option<PathBuf>,
    /// Draw a per-file progress bar on stderr (only when it is a terminal)
    pub progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            reconstruct: true,
            reconstruction: ReconstructionConfig::default(),
            mode: PesqMode::Wideband,
            keep_going: false,
            save_dir: None,
            progress: true,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reconstruct {
            self.reconstruction.validate()?;
        }
        // Surfaces rate/mode mismatches before any file is touched
        PesqScorer::new(self.sample_rate, self.mode).map(|_| ())
    }
}

/// Score of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileScore {
    pub path: PathBuf,
    pub score: f64,
    pub original_len: usize,
    pub reconstructed_len: usize,
    /// Samples actually compared, `min(original_len, reconstructed_len)`
    pub scored_len: usize,
}

/// A file left out of the results under `keep_going`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error_code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Scores in visit order
    pub scores: Vec<FileScore>,
    pub skipped: Vec<SkippedFile>,
}

impl BatchOutcome {
    pub fn values(&self) -> Vec<f64> {
        self.scores.iter().map(|s| s.score).collect()
    }
}

/// WAV files directly inside `dir`, sorted by path
pub fn list_wav_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EvalError::DirectoryWalk {
            path: dir.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| EvalError::DirectoryWalk {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_wav = entry
            .path()
            .extension()
            .map(|ext| ext == WAV_EXTENSION)
            .unwrap_or(false);
        if is_wav {
            files.push(entry.into_path());
        } else {
            debug!("Ignoring {}", entry.path().display());
        }
    }

    files.sort();
    Ok(files)
}

/// Load, reconstruct and score a single file
pub fn score_file(path: &Path, config: &BatchConfig, scorer: &PesqScorer) -> Result<FileScore> {
    let original = load_waveform(path, config.sample_rate)?;

    let reconstructed = if config.reconstruct {
        reconstruct_waveform(&original, &config.reconstruction)?
    } else {
        original.clone()
    };

    if let Some(dir) = &config.save_dir {
        let name = path.file_name().unwrap_or(path.as_os_str());
        save_waveform(&reconstructed, &dir.join(name), SAVE_BIT_DEPTH)?;
    }

    let (reference, degraded) = truncate_to_common(&original, &reconstructed);
    let score = scorer.score(reference.samples(), degraded.samples())?;

    debug!(
        "{}: PESQ {:.3} over {} samples (original {} at {:.1} dBFS, reconstructed {} at {:.1} dBFS)",
        path.display(),
        score,
        reference.len(),
        original.len(),
        original.rms_db(),
        reconstructed.len(),
        reconstructed.rms_db()
    );

    Ok(FileScore {
        path: path.to_path_buf(),
        score,
        original_len: original.len(),
        reconstructed_len: reconstructed.len(),
        scored_len: reference.len(),
    })
}

/// Evaluate every WAV file in `dir`
///
/// Fails on the first bad file unless `config.keep_going` is set, in which
/// case failures are logged and collected in [`BatchOutcome::skipped`].
pub fn run_batch(dir: &Path, config: &BatchConfig) -> Result<BatchOutcome> {
    config.validate()?;
    let scorer = PesqScorer::new(config.sample_rate, config.mode)?;

    let files = list_wav_files(dir)?;

    if let Some(save_dir) = &config.save_dir {
        check_save_dir(dir, save_dir)?;
        fs::create_dir_all(save_dir)?;
    }

    info!(
        "Evaluating {} file(s) in {} (reconstruct: {}, {} Hz, {})",
        files.len(),
        dir.display(),
        config.reconstruct,
        config.sample_rate,
        config.mode
    );

    let progress = progress_bar(files.len(), config.progress);
    let mut outcome = BatchOutcome::default();
    for path in files {
        if let Some(name) = path.file_name() {
            progress.set_message(name.to_string_lossy().into_owned());
        }
        let result = score_file(&path, config, &scorer);
        progress.inc(1);

        match result {
            Ok(score) => outcome.scores.push(score),
            Err(e) if config.keep_going => {
                warn!("Skipping {}: {}", path.display(), e);
                outcome.skipped.push(SkippedFile {
                    path,
                    error_code: e.error_code().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        }
    }
    progress.finish_and_clear();

    info!(
        "Scored {} file(s), skipped {}",
        outcome.scores.len(),
        outcome.skipped.len()
    );
    Ok(outcome)
}

/// Refuse a save directory that is the input directory itself
fn check_save_dir(dir: &Path, save_dir: &Path) -> Result<()> {
    if !save_dir.exists() {
        return Ok(());
    }
    if fs::canonicalize(save_dir)? == fs::canonicalize(dir)? {
        return Err(EvalError::InvalidConfig {
            reason: format!(
                "save directory {} is the input directory; originals would be overwritten",
                save_dir.display()
            ),
        });
    }
    Ok(())
}

/// Per-file progress on stderr; indicatif hides it when stderr is not a terminal
fn progress_bar(len: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stderr());
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}
