//! Directory-level evaluation: batch driver, summary statistics, reports

pub mod batch;
pub mod report;
pub mod stats;

pub use batch::{
    list_wav_files, run_batch, score_file, BatchConfig, BatchOutcome, FileScore, SkippedFile,
};
pub use report::EvaluationReport;
pub use stats::ScoreSummary;
