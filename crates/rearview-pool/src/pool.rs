//! Temporal frame pool with dedup, coalescing and dual eviction

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rearview_core::{frames_identical, FrameBuffer, PoolConfig, Signature};
use tracing::debug;

use crate::spsc;

/// One retained unique frame together with its observation span.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    /// Ingestion sequence number of the first frame with this content
    pub index: u64,
    /// When this content was first observed, in seconds
    pub first_seen: f64,
    /// When this content was last observed; equals `first_seen` until the
    /// entry coalesces a repeat
    pub last_seen: f64,
    /// How many consecutive ingested frames collapsed into this entry
    pub run_len: u64,
    /// The frame itself, shared rather than copied
    pub frame: Arc<FrameBuffer>,
    /// Content fingerprint used for dedup
    pub signature: Signature,
}

/// Point-in-time counters for monitoring.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub entries: usize,
    pub total_bytes: usize,
    /// Timestamp of the most recent valid push
    pub latest: f64,
    /// Change notifications dropped because the quick lane was full
    pub dropped_changes: u64,
}

/// Single-consumer handle receiving newly changed frames.
///
/// There is exactly one per pool and it cannot be cloned, which is what
/// keeps the underlying ring's single-consumer contract honest.
pub struct QuickLane {
    rx: spsc::Consumer<PoolEntry>,
}

impl QuickLane {
    /// Take the oldest pending change notification, if any.
    ///
    /// Entries carry their metadata as of the moment the change was
    /// ingested; later coalescing does not rewrite them.
    pub fn pop(&mut self) -> Option<PoolEntry> {
        self.rx.pop()
    }

    /// Quick-lane capacity in slots.
    pub fn capacity(&self) -> usize {
        self.rx.capacity()
    }
}

struct PoolState {
    entries: VecDeque<PoolEntry>,
    total_bytes: usize,
    latest: f64,
    in_static_run: bool,
    static_since: f64,
    quick_tx: spsc::Producer<PoolEntry>,
    dropped_changes: u64,
    // Knobs adjustable at runtime; everything else is fixed at creation.
    retention_secs: f64,
    budget_bytes: u64,
    single_static: bool,
    static_grace_secs: f64,
}

/// Time- and memory-bounded history of unique frames.
///
/// Consecutive identical frames coalesce into one entry whose span
/// stretches to cover them; each content change starts a new entry and is
/// offered to the quick lane. All mutation happens under one short-held
/// lock; fingerprinting runs before the lock is taken.
pub struct FramePool {
    state: Mutex<PoolState>,
    fps_hint: u32,
}

impl FramePool {
    /// Create a pool and the single quick-lane consumer attached to it.
    pub fn new(config: PoolConfig) -> (Self, QuickLane) {
        let (quick_tx, rx) = spsc::channel(config.channel_capacity);
        let pool = Self {
            state: Mutex::new(PoolState {
                entries: VecDeque::new(),
                total_bytes: 0,
                latest: 0.0,
                in_static_run: false,
                static_since: 0.0,
                quick_tx,
                dropped_changes: 0,
                retention_secs: config.retention_secs.max(0.0),
                budget_bytes: config.budget_bytes(),
                single_static: config.single_static,
                static_grace_secs: config.static_grace_secs.max(0.0),
            }),
            fps_hint: config.fps_hint.max(1),
        };
        (pool, QuickLane { rx })
    }

    /// Ingest one frame observed at `timestamp` seconds.
    ///
    /// A frame identical to the newest entry extends that entry's run; a
    /// changed frame is appended and offered to the quick lane. Either
    /// way the caller's `Arc` comes back so producers can keep reusing
    /// it. Invalid buffers are returned unchanged without touching any
    /// state.
    pub fn push(&self, frame: Arc<FrameBuffer>, index: u64, timestamp: f64) -> Arc<FrameBuffer> {
        if !frame.is_valid() {
            return frame;
        }

        // The O(pixels) pass stays outside the lock.
        let signature = Signature::of(&frame);

        let mut st = self.lock();
        st.latest = timestamp;

        let is_repeat = match st.entries.back() {
            Some(last) => frames_identical(&frame, &last.frame, &signature, &last.signature),
            None => false,
        };

        if is_repeat {
            if let Some(last) = st.entries.back_mut() {
                last.last_seen = timestamp;
                last.run_len += 1;
            }
            if st.single_static {
                if !st.in_static_run {
                    st.in_static_run = true;
                    st.static_since = timestamp;
                }
                if timestamp - st.static_since >= st.static_grace_secs {
                    Self::collapse_to_latest(&mut st);
                }
            }
            Self::evict(&mut st);
            return frame;
        }

        // Content changed (or the pool was empty): start a fresh entry.
        st.in_static_run = false;

        let entry = PoolEntry {
            index,
            first_seen: timestamp,
            last_seen: timestamp,
            run_len: 1,
            frame: Arc::clone(&frame),
            signature,
        };
        st.total_bytes += entry.frame.size_bytes();
        st.entries.push_back(entry.clone());

        if st.quick_tx.push(entry).is_err() {
            st.dropped_changes += 1;
            debug!(index, "quick lane full, dropped change notification");
        }

        Self::evict(&mut st);
        frame
    }

    /// Entries whose coverage ends inside the last `window_secs`, oldest
    /// first. A non-empty pool always yields at least its newest entry.
    pub fn snapshot_recent(&self, window_secs: f64) -> Vec<PoolEntry> {
        let st = self.lock();
        if st.entries.is_empty() {
            return Vec::new();
        }
        let cutoff = st.latest - window_secs.max(0.0);

        let mut out: Vec<PoolEntry> = Vec::new();
        for entry in st.entries.iter().rev() {
            if entry.last_seen >= cutoff {
                out.push(entry.clone());
            } else {
                // End times never decrease from front to back.
                break;
            }
        }
        if out.is_empty() {
            if let Some(last) = st.entries.back() {
                out.push(last.clone());
            }
        }
        out.reverse();
        out
    }

    /// Adjust the scrub window at runtime; takes effect on the next push.
    pub fn set_retention_secs(&self, seconds: f64) {
        self.lock().retention_secs = seconds.max(0.0);
    }

    /// Adjust the memory budget at runtime; takes effect on the next push.
    pub fn set_budget_mb(&self, mb: u64) {
        self.lock().budget_bytes = mb * 1024 * 1024;
    }

    /// Enable or disable single-static collapse and set its grace period.
    pub fn set_single_static_mode(&self, enabled: bool, grace_secs: f64) {
        let mut st = self.lock();
        st.single_static = enabled;
        st.static_grace_secs = grace_secs.max(0.0);
    }

    /// Counters for monitoring; taken under the same lock as push.
    pub fn stats(&self) -> PoolStats {
        let st = self.lock();
        PoolStats {
            entries: st.entries.len(),
            total_bytes: st.total_bytes,
            latest: st.latest,
            dropped_changes: st.dropped_changes,
        }
    }

    /// Producer frame rate hint from the configuration, floored at one.
    pub fn fps_hint(&self) -> u32 {
        self.fps_hint
    }

    /// Drop everything except the newest entry and recount bytes.
    fn collapse_to_latest(st: &mut PoolState) {
        let drop_count = st.entries.len().saturating_sub(1);
        if drop_count > 0 {
            st.entries.drain(..drop_count);
            debug!(dropped = drop_count, "collapsed static scene to one frame");
        }
        st.total_bytes = st.entries.back().map(|e| e.frame.size_bytes()).unwrap_or(0);
    }

    /// Scrub-window eviction, then budget eviction. The newest entry is
    /// never evicted, so the pool can always serve its current frame.
    fn evict(st: &mut PoolState) {
        let before = st.entries.len();
        let cutoff = st.latest - st.retention_secs;

        while st.entries.len() > 1 && st.entries.front().map_or(false, |e| e.last_seen < cutoff) {
            if let Some(gone) = st.entries.pop_front() {
                st.total_bytes = st.total_bytes.saturating_sub(gone.frame.size_bytes());
            }
        }
        while st.entries.len() > 1 && st.total_bytes as u64 > st.budget_bytes {
            if let Some(gone) = st.entries.pop_front() {
                st.total_bytes = st.total_bytes.saturating_sub(gone.frame.size_bytes());
            }
        }

        let evicted = before - st.entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = st.entries.len(), "evicted aged frames");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A poisoned lock means some thread panicked while holding it;
        // the history is still usable, so keep serving.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bgra: [u8; 4]) -> Arc<FrameBuffer> {
        Arc::new(FrameBuffer::filled(64, 32, bgra))
    }

    fn small_config() -> PoolConfig {
        PoolConfig::new()
            .with_channel_capacity(64)
            .with_single_static(false, 0.0)
    }

    #[test]
    fn test_identical_frames_coalesce() {
        let (pool, mut lane) = FramePool::new(small_config());
        let a = frame([10, 20, 30, 255]);

        for i in 0..5u64 {
            pool.push(Arc::clone(&a), i, i as f64 * 0.1);
        }

        let stats = pool.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, a.size_bytes());

        let entry = lane.pop().expect("first push reaches the quick lane");
        assert_eq!(entry.index, 0);
        assert_eq!(entry.run_len, 1);
        assert!(lane.pop().is_none(), "repeats never reach the quick lane");

        let snap = pool.snapshot_recent(10.0);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].run_len, 5);
        assert_eq!(snap[0].first_seen, 0.0);
        assert_eq!(snap[0].last_seen, 0.4);
    }

    #[test]
    fn test_changed_frames_reach_quick_lane_once() {
        let (pool, mut lane) = FramePool::new(small_config());
        let a = frame([1, 1, 1, 255]);
        let b = frame([2, 2, 2, 255]);

        pool.push(Arc::clone(&a), 0, 0.0);
        for i in 1..4u64 {
            pool.push(Arc::clone(&a), i, i as f64 * 0.1);
        }
        pool.push(Arc::clone(&b), 4, 0.4);

        let first = lane.pop().expect("entry for the unique frame");
        assert_eq!(first.index, 0);
        let second = lane.pop().expect("entry for the changed frame");
        assert_eq!(second.index, 4);
        assert!(lane.pop().is_none());
        assert_eq!(pool.stats().entries, 2);
    }

    #[test]
    fn test_scrub_window_eviction() {
        let (pool, _lane) = FramePool::new(small_config().with_retention_secs(0.4));
        pool.push(frame([1, 0, 0, 255]), 0, 0.0);
        pool.push(frame([2, 0, 0, 255]), 1, 0.2);
        pool.push(frame([3, 0, 0, 255]), 2, 0.6);

        // First frame aged out: its coverage ended at 0.0 < 0.6 - 0.4.
        assert_eq!(pool.stats().entries, 2);
        let snap = pool.snapshot_recent(10.0);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].index, 1);
        assert_eq!(snap[1].index, 2);
    }

    #[test]
    fn test_budget_eviction_keeps_newest() {
        // 256x256 BGRA frames are 256 KiB; a 1 MiB budget holds four.
        let config = PoolConfig::new()
            .with_budget_mb(1)
            .with_channel_capacity(64)
            .with_single_static(false, 0.0);
        let (pool, _lane) = FramePool::new(config);

        for i in 0..10u64 {
            let f = Arc::new(FrameBuffer::filled(256, 256, [i as u8, 0, 0, 255]));
            pool.push(f, i, i as f64);
        }

        let stats = pool.stats();
        assert_eq!(stats.entries, 4);
        assert!(stats.total_bytes as u64 <= 1024 * 1024);
        assert_eq!(pool.snapshot_recent(100.0).last().unwrap().index, 9);
    }

    #[test]
    fn test_newest_entry_survives_zero_budget() {
        let (pool, _lane) = FramePool::new(
            small_config()
                .with_budget_mb(0)
                .with_retention_secs(0.0),
        );
        for i in 0..5u64 {
            pool.push(frame([i as u8, 0, 0, 255]), i, i as f64);
        }
        let stats = pool.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(pool.snapshot_recent(1.0)[0].index, 4);
    }

    #[test]
    fn test_static_collapse_after_grace() {
        let config = PoolConfig::new()
            .with_channel_capacity(64)
            .with_single_static(true, 0.1);
        let (pool, _lane) = FramePool::new(config);

        let a = frame([1, 2, 3, 255]);
        let b = frame([4, 5, 6, 255]);
        pool.push(Arc::clone(&a), 0, 0.0);
        pool.push(Arc::clone(&b), 1, 0.1);
        assert_eq!(pool.stats().entries, 2);

        // Repeats of b within the grace period keep the history intact.
        pool.push(Arc::clone(&b), 2, 0.15);
        assert_eq!(pool.stats().entries, 2);

        // Once the static run outlasts the grace the pool collapses.
        for i in 3..8u64 {
            pool.push(Arc::clone(&b), i, 0.1 + i as f64 * 0.05);
        }
        let stats = pool.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, b.size_bytes());
        let snap = pool.snapshot_recent(10.0);
        assert_eq!(snap[0].index, 1);
        assert_eq!(snap[0].run_len, 7);

        // A change ends the static run and history grows again.
        pool.push(Arc::clone(&a), 8, 1.0);
        assert_eq!(pool.stats().entries, 2);
    }

    #[test]
    fn test_long_static_run_collapses_to_one_entry() {
        let config = PoolConfig::new()
            .with_channel_capacity(64)
            .with_single_static(true, 0.1);
        let (pool, _lane) = FramePool::new(config);

        // Some history before the screen goes still.
        pool.push(frame([9, 9, 9, 255]), 0, 0.9);

        let still = frame([1, 2, 3, 255]);
        for i in 0..10u64 {
            pool.push(Arc::clone(&still), i + 1, 1.0 + i as f64 * 0.0625);
        }

        let snap = pool.snapshot_recent(10.0);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].run_len, 10);
        assert_eq!(snap[0].first_seen, 1.0);
        assert_eq!(snap[0].last_seen, 1.5625);
    }

    #[test]
    fn test_quick_lane_overflow_is_counted() {
        let config = PoolConfig::new()
            .with_channel_capacity(2)
            .with_single_static(false, 0.0);
        let (pool, mut lane) = FramePool::new(config);

        for i in 0..4u64 {
            pool.push(frame([i as u8, 0, 0, 255]), i, i as f64 * 0.01);
        }

        // Ring held two entries; two more changes were dropped without
        // blocking the producer.
        assert_eq!(pool.stats().dropped_changes, 2);
        assert_eq!(lane.pop().unwrap().index, 0);
        assert_eq!(lane.pop().unwrap().index, 1);
        assert!(lane.pop().is_none());
        // The pool itself retained everything.
        assert_eq!(pool.stats().entries, 4);
    }

    #[test]
    fn test_invalid_frame_is_ignored() {
        let (pool, mut lane) = FramePool::new(small_config());
        let bad = Arc::new(FrameBuffer::new(vec![0u8; 10], 4, 4));

        let back = pool.push(Arc::clone(&bad), 0, 5.0);
        assert!(Arc::ptr_eq(&back, &bad));
        let stats = pool.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.latest, 0.0);
        assert!(lane.pop().is_none());
        assert!(pool.snapshot_recent(1.0).is_empty());
    }

    #[test]
    fn test_snapshot_window_filters_by_coverage_end() {
        let (pool, _lane) = FramePool::new(small_config());
        let a = frame([1, 0, 0, 255]);
        pool.push(Arc::clone(&a), 0, 0.0);
        // Coalesced until 4.0, so the entry stays "recent" long after its
        // first appearance.
        pool.push(Arc::clone(&a), 1, 4.0);
        pool.push(frame([2, 0, 0, 255]), 2, 5.0);

        let snap = pool.snapshot_recent(1.5);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].index, 0);

        let snap = pool.snapshot_recent(0.5);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].index, 2);
    }

    #[test]
    fn test_runtime_setters_apply_on_next_push() {
        let (pool, _lane) = FramePool::new(small_config());
        for i in 0..3u64 {
            pool.push(frame([i as u8, 0, 0, 255]), i, i as f64);
        }
        assert_eq!(pool.stats().entries, 3);

        pool.set_retention_secs(0.5);
        pool.push(frame([9, 9, 9, 255]), 3, 3.0);
        // Entries ending at 0.0, 1.0 and 2.0 all aged out of the window.
        assert_eq!(pool.stats().entries, 1);
    }
}
