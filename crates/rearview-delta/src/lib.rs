//! Rearview Delta - Base-plus-patch storage for frame history
//!
//! [`DeltaStore`] keeps full base frames and per-tile patches against
//! them, bounded by a byte budget; [`DeltaTimeline`] decides per incoming
//! frame whether to coalesce, patch or start a new base. Patch tiles can
//! optionally be demoted to RGB565 to halve their footprint.

pub mod rgb565;
pub mod store;
pub mod timeline;

pub use store::{DeltaStore, EntryId, EntryMeta, PatchFormat, TilePatch};
pub use timeline::DeltaTimeline;
