//! Rearview - In-memory frame history cache for screen monitoring pipelines
//!
//! Rearview sits between a screen capture source and downstream consumers.
//! It ingests a high-frequency stream of raw BGRA frames, recognizes when
//! nothing changed, and keeps a bounded history that can be scrubbed,
//! reconstructed and exported:
//!
//! - [`Signature`] fingerprints a frame in one pass; [`frames_identical`]
//!   turns a fingerprint match into a byte-exact verdict
//! - [`FramePool`] coalesces identical frames, evicts by scrub window and
//!   byte budget, and offers every change to the lock-free [`QuickLane`]
//! - [`DeltaStore`] and [`DeltaTimeline`] keep history as base frames plus
//!   tile patches, optionally demoted to RGB565
//! - [`ClipExporter`] expands coalesced runs back into real timing and
//!   drives an external [`SequenceEncoder`] such as [`FfmpegEncoder`]
//!
//! ```no_run
//! use std::sync::Arc;
//! use rearview::{ClipExporter, FfmpegEncoder, FrameBuffer, FramePool, PoolConfig};
//!
//! # async fn demo() -> Result<(), rearview::ExportError> {
//! let (pool, mut lane) = FramePool::new(PoolConfig::default());
//!
//! // Capture loop: hand every grabbed frame to the pool.
//! let frame = Arc::new(FrameBuffer::filled(1920, 1080, [0, 0, 0, 255]));
//! pool.push(frame, 0, 0.0);
//!
//! // Low-latency consumer drains changes without blocking the producer.
//! while let Some(entry) = lane.pop() {
//!     println!("frame {} changed at {:.3}", entry.index, entry.first_seen);
//! }
//!
//! // Export the last minute as a clip.
//! let exporter = ClipExporter::new(FfmpegEncoder::new());
//! exporter
//!     .export_recent(&pool, 60.0, "recent.mp4".as_ref(), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub use rearview_core::{
    frames_identical, DeltaConfig, Error, FrameBuffer, PoolConfig, Result, Signature,
    BYTES_PER_PIXEL,
};
pub use rearview_delta::{DeltaStore, DeltaTimeline, EntryId, EntryMeta, PatchFormat, TilePatch};
pub use rearview_export::{
    ClipExporter, ExportError, ExportResult, ExportSummary, FfmpegEncoder, SequenceEncoder,
};
pub use rearview_pool::{FramePool, PoolEntry, PoolStats, QuickLane};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Synthetic capture sequence: a desktop that sits still, gets two
    /// small edits, then switches scenes entirely.
    fn scripted_frames() -> Vec<Arc<FrameBuffer>> {
        let desktop = FrameBuffer::filled(128, 128, [30, 30, 30, 255]);

        let mut edit1 = desktop.clone();
        edit1.set_pixel(10, 10, [200, 200, 200, 255]);
        let mut edit2 = edit1.clone();
        edit2.set_pixel(11, 10, [200, 200, 200, 255]);

        let scene_change = FrameBuffer::filled(128, 128, [240, 120, 60, 255]);

        vec![
            Arc::new(desktop.clone()),
            Arc::new(desktop.clone()),
            Arc::new(desktop),
            Arc::new(edit1),
            Arc::new(edit2),
            Arc::new(scene_change),
        ]
    }

    #[test]
    fn test_pool_and_timeline_agree_on_changes() {
        let (pool, mut lane) = FramePool::new(
            PoolConfig::new()
                .with_channel_capacity(16)
                .with_single_static(false, 0.0),
        );
        let timeline = DeltaTimeline::new(DeltaStore::new(
            DeltaConfig::new()
                .with_tile_size(64, 32)
                .with_demotion(false),
        ));

        let frames = scripted_frames();
        let mut ids = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            let ts = i as f64 * 0.1;
            pool.push(Arc::clone(frame), i as u64, ts);
            ids.push(timeline.push(Arc::clone(frame), ts).unwrap().unwrap());
        }

        // Three repeats collapsed into the first entry; four unique
        // contents remain.
        assert_eq!(pool.stats().entries, 4);
        assert_eq!(timeline.store().len(), 4);
        assert_eq!(timeline.coalesced(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[0], ids[2]);

        // The quick lane saw exactly the content changes, in order.
        let changed: Vec<u64> = std::iter::from_fn(|| lane.pop()).map(|e| e.index).collect();
        assert_eq!(changed, vec![0, 3, 4, 5]);

        // Every retained frame reconstructs byte-exact.
        for (frame, id) in [
            (&frames[0], ids[0]),
            (&frames[3], ids[3]),
            (&frames[4], ids[4]),
            (&frames[5], ids[5]),
        ] {
            let back = timeline.store().reconstruct(id).unwrap();
            assert_eq!(back.data(), frame.data());
        }

        // Small edits were stored as patches, the scene change re-based.
        let meta = |id| timeline.store().meta(id).unwrap();
        assert!(meta(ids[0]).is_base);
        assert!(!meta(ids[3]).is_base);
        assert!(!meta(ids[4]).is_base);
        assert_eq!(meta(ids[4]).base, Some(ids[0]));
        assert!(meta(ids[5]).is_base);
        assert_eq!(timeline.base_id(), Some(ids[5]));
    }

    #[derive(Clone, Default)]
    struct CountingEncoder {
        frames: Arc<Mutex<usize>>,
    }

    impl SequenceEncoder for CountingEncoder {
        async fn encode(
            &self,
            frames_dir: &Path,
            _pattern: &str,
            _fps: u32,
            _target: &Path,
        ) -> ExportResult<()> {
            let count = std::fs::read_dir(frames_dir)?.count();
            *self.frames.lock().unwrap() = count;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capture_to_clip_pipeline() {
        let (pool, _lane) = FramePool::new(
            PoolConfig::new()
                .with_fps_hint(10)
                .with_channel_capacity(16)
                .with_single_static(false, 0.0),
        );

        let frames = scripted_frames();
        for (i, frame) in frames.iter().enumerate() {
            pool.push(Arc::clone(frame), i as u64, i as f64 * 0.1);
        }

        let encoder = CountingEncoder::default();
        let out = tempfile::tempdir().unwrap();
        let summary = ClipExporter::new(encoder.clone())
            .export_recent(&pool, 60.0, &out.path().join("clip.mp4"), None)
            .await
            .unwrap();

        assert_eq!(summary.fps, 10);
        assert_eq!(summary.entries, 4);
        // Static run expands to two frames (0.2s at 10 fps); the edits
        // borrow their gaps; the trailing scene change adds one.
        assert_eq!(summary.frames_written, 2 + 1 + 1 + 1);
        assert_eq!(*encoder.frames.lock().unwrap(), summary.frames_written);
    }
}
