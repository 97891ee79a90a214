//! Export error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while exporting a clip
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no frames in the requested window")]
    NoFrames,

    #[error("sequence encoder exited with status {code} (sequence was in {})", .dir.display())]
    Encoder { code: i32, dir: PathBuf },

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for export operations
pub type ExportResult<T> = Result<T, ExportError>;
