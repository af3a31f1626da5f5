use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Conditions that abort a run. Row-level problems are never reported here;
/// they are counted into the per-source reports instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("table '{table}' has none of the required columns: {}", .candidates.join(", "))]
    MissingColumn {
        table: String,
        candidates: Vec<String>,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{count} unmatched community name(s) in '{table}': {}", .samples.join(", "))]
    UnmatchedCommunities {
        table: String,
        count: usize,
        samples: Vec<String>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
