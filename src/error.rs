//! Crate-wide error type.
//!
//! Component helpers raise immediately on I/O failure; the orchestrator never
//! catches-and-continues except for scoped-teardown code, which logs its own
//! failures and re-raises the original error unchanged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Archive or directory missing. Doubles as the pre-flight existence
    /// gate for path derivation.
    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// Document-converter extraction failure. Always surfaced with the
    /// underlying cause attached.
    #[error("Failed to extract '{}': {source}", .archive.display())]
    Extraction {
        archive: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Document-converter construction failure.
    #[error("Failed to construct '{}': {source}", .archive.display())]
    Construction {
        archive: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A single matched file cannot fit a fresh bucket at the configured
    /// size cap and compression level. Fatal; the operator must raise the
    /// cap or lower the level.
    #[error(
        "Bucket size limit {max_bytes} B at compression level {level} is too small for '{}' ({file_size} B)",
        .file.display()
    )]
    Capacity {
        file:      PathBuf,
        file_size: u64,
        max_bytes: u64,
        level:     i64,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
