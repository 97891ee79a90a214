//! Clip export: expand coalesced runs and drive the sequence encoder

use std::path::Path;

use rearview_core::FrameBuffer;
use rearview_pool::{FramePool, PoolEntry};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::encoder::SequenceEncoder;
use crate::error::{ExportError, ExportResult};

/// printf-style pattern naming the numbered frame files.
const FRAME_PATTERN: &str = "frame_%06d.png";

/// Outcome of a successful export.
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    /// Coalesced history entries covered by the clip
    pub entries: usize,
    /// Frames written after run expansion
    pub frames_written: usize,
    /// Rate the sequence was encoded at
    pub fps: u32,
}

/// Exports recent pool history as a video clip via an injected encoder.
pub struct ClipExporter<E> {
    encoder: E,
}

impl<E: SequenceEncoder> ClipExporter<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    /// Export the last `window_secs` of pool history to `target`.
    ///
    /// Coalesced entries are expanded back into repeated frames so the
    /// clip plays with real timing instead of one tick per unique frame.
    /// Frames are written as full-depth PNGs into a fresh temporary
    /// directory that is removed again whether or not the encoder
    /// succeeds; an encoder failure wins over cleanup problems and
    /// carries its exit code and the sequence directory path.
    ///
    /// `fps` falls back to the pool's configured frame rate hint.
    pub async fn export_recent(
        &self,
        pool: &FramePool,
        window_secs: f64,
        target: &Path,
        fps: Option<u32>,
    ) -> ExportResult<ExportSummary> {
        let clip = pool.snapshot_recent(window_secs);
        if clip.is_empty() {
            return Err(ExportError::NoFrames);
        }
        let fps = fps.unwrap_or_else(|| pool.fps_hint()).max(1);

        let dir = TempDir::with_prefix("rearview-clip-")?;
        let mut written = 0usize;

        for (i, entry) in clip.iter().enumerate() {
            let repeats = repeat_count(entry, clip.get(i + 1), fps);
            for _ in 0..repeats {
                let path = dir.path().join(format!("frame_{written:06}.png"));
                write_png(&entry.frame, &path)?;
                written += 1;
            }
        }
        debug!(
            frames = written,
            entries = clip.len(),
            "wrote frame sequence"
        );

        let encoded = self
            .encoder
            .encode(dir.path(), FRAME_PATTERN, fps, target)
            .await;

        // Cleanup runs on success and failure alike; an encoder error
        // already carries the directory path for its report.
        if let Err(e) = dir.close() {
            debug!("sequence dir cleanup failed: {}", e);
        }
        encoded?;

        info!(
            frames = written,
            entries = clip.len(),
            target = %target.display(),
            "clip exported"
        );
        Ok(ExportSummary {
            entries: clip.len(),
            frames_written: written,
            fps,
        })
    }
}

/// How many times `entry` repeats at `fps` to cover its span.
///
/// A coalesced entry covers `last_seen - first_seen`. An entry that never
/// coalesced borrows the gap to the next entry's start; a trailing entry
/// with no span contributes a single frame. Every entry contributes at
/// least one frame regardless.
fn repeat_count(entry: &PoolEntry, next: Option<&PoolEntry>, fps: u32) -> usize {
    let end = if entry.last_seen > entry.first_seen {
        entry.last_seen
    } else {
        next.map(|n| n.first_seen).unwrap_or(entry.first_seen)
    };
    let span = (end - entry.first_seen).max(0.0);
    ((span * f64::from(fps)).round() as i64).max(1) as usize
}

/// Write one frame as a full-depth PNG, widening BGRA to RGBA.
fn write_png(frame: &FrameBuffer, path: &Path) -> ExportResult<()> {
    let mut rgba = frame.data().to_vec();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    image::save_buffer(
        path,
        &rgba,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(())
}
