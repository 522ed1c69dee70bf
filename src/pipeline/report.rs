//! JSON evaluation report

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::pipeline::batch::{BatchConfig, BatchOutcome, FileScore, SkippedFile};
use crate::pipeline::stats::ScoreSummary;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub directory: PathBuf,
    pub config: BatchConfig,
    pub files: Vec<FileScore>,
    pub skipped: Vec<SkippedFile>,
    pub summary: ScoreSummary,
}

impl EvaluationReport {
    pub fn new(
        directory: &Path,
        config: &BatchConfig,
        outcome: &BatchOutcome,
        summary: &ScoreSummary,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            directory: directory.to_path_buf(),
            config: config.clone(),
            files: outcome.scores.clone(),
            skipped: outcome.skipped.clone(),
            summary: summary.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the pretty-printed report, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}
