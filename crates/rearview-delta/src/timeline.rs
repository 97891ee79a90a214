//! Base-or-patch sequencing policy over the delta store

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rearview_core::{frames_identical, FrameBuffer, Result, Signature};
use tracing::debug;

use crate::store::{DeltaStore, EntryId};

struct TimelineState {
    last_id: Option<EntryId>,
    base_id: Option<EntryId>,
    /// Full frame of the current reference base; every diff runs against
    /// this, so a stored patch overlays back to exactly the frame it was
    /// made from.
    base_frame: Option<Arc<FrameBuffer>>,
    prev_frame: Option<Arc<FrameBuffer>>,
    prev_signature: Signature,
    coalesced: u64,
}

/// Decides, per incoming frame, between coalescing, patching against the
/// current base, or starting a new base.
///
/// Patches always reference the most recent base entry and never another
/// patch, so any frame reconstructs in one hop. The timeline is fed by a
/// single writer; reads may come from anywhere.
pub struct DeltaTimeline {
    store: DeltaStore,
    state: Mutex<TimelineState>,
}

impl DeltaTimeline {
    pub fn new(store: DeltaStore) -> Self {
        Self {
            store,
            state: Mutex::new(TimelineState {
                last_id: None,
                base_id: None,
                base_frame: None,
                prev_frame: None,
                prev_signature: Signature::default(),
                coalesced: 0,
            }),
        }
    }

    /// Ingest one frame observed at `timestamp` seconds.
    ///
    /// Returns the id now representing the frame: the previous id when
    /// the content is unchanged, a fresh id for a patch or a new base,
    /// and `Ok(None)` for an invalid buffer, which is a no-op.
    pub fn push(&self, frame: Arc<FrameBuffer>, timestamp: f64) -> Result<Option<EntryId>> {
        if !frame.is_valid() {
            return Ok(None);
        }
        let signature = Signature::of(&frame);

        let mut st = self.lock();

        // Unchanged content never creates a new entry.
        if let Some(prev) = &st.prev_frame {
            if frames_identical(&frame, prev, &signature, &st.prev_signature) {
                st.coalesced += 1;
                return Ok(st.last_id);
            }
        }

        let decision = match (&st.base_id, &st.base_frame) {
            (Some(base_id), Some(base_frame)) => {
                let (patches, coverage) = self.store.diff_and_patch(base_frame, &frame);
                let patch_bytes: usize = patches.iter().map(|p| p.data.len()).sum();
                let byte_ratio = patch_bytes as f64 / frame.size_bytes() as f64;
                let config = self.store.config();

                if coverage < config.big_change_cutoff
                    && !patches.is_empty()
                    && byte_ratio <= config.patch_byte_cutoff
                {
                    Some((*base_id, patches, coverage))
                } else {
                    None
                }
            }
            // First frame: nothing to diff against.
            _ => None,
        };

        let (id, rebased) = match decision {
            Some((base_id, patches, coverage)) => (
                self.store
                    .add_patched(base_id, patches, signature, timestamp, coverage)?,
                false,
            ),
            None => (
                self.store
                    .add_base(Arc::clone(&frame), signature, timestamp, 1.0)?,
                true,
            ),
        };

        if rebased {
            st.base_id = Some(id);
            st.base_frame = Some(Arc::clone(&frame));
            debug!(id = %id, "started new base");
        }
        st.last_id = Some(id);
        st.prev_frame = Some(frame);
        st.prev_signature = signature;
        Ok(Some(id))
    }

    /// Id of the entry representing the most recent frame, if any.
    pub fn last_id(&self) -> Option<EntryId> {
        self.lock().last_id
    }

    /// Id of the current reference base, if any.
    pub fn base_id(&self) -> Option<EntryId> {
        self.lock().base_id
    }

    /// How many pushes coalesced into no-ops because nothing changed.
    pub fn coalesced(&self) -> u64 {
        self.lock().coalesced
    }

    /// The underlying store, for reconstruction and inspection.
    pub fn store(&self) -> &DeltaStore {
        &self.store
    }

    /// Retained payload bytes in the underlying store.
    pub fn total_bytes(&self) -> usize {
        self.store.total_bytes()
    }

    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
