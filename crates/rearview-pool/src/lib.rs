//! Rearview Pool - Temporal frame history with dedup and bounded retention
//!
//! [`FramePool`] ingests a high-frequency stream of frames, coalesces
//! identical content into single entries and keeps a history bounded both
//! by a scrub window and a byte budget. Every content change is also
//! offered to an independent low-latency consumer over the lock-free
//! single-producer single-consumer ring in [`spsc`].

pub mod pool;
pub mod spsc;

pub use pool::{FramePool, PoolEntry, PoolStats, QuickLane};
