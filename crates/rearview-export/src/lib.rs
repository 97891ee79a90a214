//! Rearview Export - Clip export through an external sequence encoder
//!
//! [`ClipExporter`] snapshots recent pool history, expands coalesced runs
//! back into repeated frames, writes the sequence as numbered PNGs into a
//! transient directory and hands it to a [`SequenceEncoder`]. The default
//! encoder shells out to ffmpeg; tests inject fakes.

pub mod encoder;
pub mod error;
pub mod export;

pub use encoder::{FfmpegEncoder, SequenceEncoder};
pub use error::{ExportError, ExportResult};
pub use export::{ClipExporter, ExportSummary};
