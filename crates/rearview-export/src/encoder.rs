//! Sequence encoder collaborators
//!
//! The exporter hands a finished numbered image sequence to a
//! [`SequenceEncoder`]; the default implementation shells out to the
//! ffmpeg binary. Injecting the encoder keeps export logic testable
//! without the binary installed.

use std::future::Future;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ExportError, ExportResult};

/// Turns a directory of numbered frame images into a video file.
pub trait SequenceEncoder {
    /// Encode the sequence matching `pattern` (printf-style, relative to
    /// `frames_dir`) at `fps` frames per second into `target`.
    fn encode(
        &self,
        frames_dir: &Path,
        pattern: &str,
        fps: u32,
        target: &Path,
    ) -> impl Future<Output = ExportResult<()>> + Send;
}

/// Default encoder: invokes the `ffmpeg` binary on the sequence.
///
/// ffmpeg inherits no stdin and is killed if the returned future is
/// dropped, so a cancelled export does not leave an encoder running.
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a different binary name or path instead of `ffmpeg`.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        frames_dir: &Path,
        pattern: &str,
        fps: u32,
        target: &Path,
    ) -> ExportResult<()> {
        let input = frames_dir.join(pattern);
        debug!(
            input = %input.display(),
            target = %target.display(),
            fps,
            "invoking sequence encoder"
        );

        let output = Command::new(&self.binary)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .arg("-framerate")
            .arg(fps.max(1).to_string())
            .arg("-i")
            .arg(&input)
            .args(["-pix_fmt", "yuv420p"])
            // yuv420p needs even dimensions.
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
            .arg(target)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            warn!(
                "sequence encoder failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(ExportError::Encoder {
                code: output.status.code().unwrap_or(-1),
                dir: frames_dir.to_path_buf(),
            });
        }
        Ok(())
    }
}
