//! Byte-budgeted store of base frames and tile patches
//!
//! An entry is either a full base frame or an ordered set of tile patches
//! against exactly one base; patches never stack on other patches, so any
//! frame reconstructs in one hop. Ids are monotonic and never reused, and
//! a base stays pinned while live patches reference it, which means
//! eviction can age entries out from under old ids but never dangle one:
//! the worst case is a clean [`Error::EntryNotFound`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rearview_core::{DeltaConfig, Error, FrameBuffer, Result, Signature, BYTES_PER_PIXEL};
use tracing::debug;

use crate::rgb565;

/// Stable identifier of one stored entry; never renumbered or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel format of one tile patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    /// Full-depth 4-byte BGRA, row-major inside the tile
    Bgra32,
    /// Demoted 2-byte little-endian 5-6-5 RGB
    Rgb565,
}

impl PatchFormat {
    /// Bytes per pixel in this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PatchFormat::Bgra32 => BYTES_PER_PIXEL,
            PatchFormat::Rgb565 => rgb565::BYTES_PER_PIXEL_565,
        }
    }
}

/// One changed tile captured from a frame.
///
/// `data` must hold exactly `width * height` pixels in `format` layout;
/// malformed patches are skipped during reconstruction.
#[derive(Debug, Clone)]
pub struct TilePatch {
    /// Row-major index in the tile grid the patch was produced on
    pub tile_index: u32,
    /// Tile width in pixels; edge tiles may be narrower than the grid
    pub width: u16,
    /// Tile height in pixels; edge tiles may be shorter than the grid
    pub height: u16,
    pub format: PatchFormat,
    /// Raw pixel data in `format` layout
    pub data: Vec<u8>,
}

/// Metadata snapshot of one stored entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub is_base: bool,
    /// Base this entry patches against; `None` for bases
    pub base: Option<EntryId>,
    pub signature: Signature,
    pub timestamp: f64,
    /// Fraction of tiles that changed relative to the diffed frame
    pub coverage: f64,
    /// Payload bytes counted against the budget
    pub bytes: usize,
}

enum Payload {
    Base {
        frame: Arc<FrameBuffer>,
        /// Live patched entries referencing this base. Nonzero pins the
        /// base against eviction.
        dependents: u32,
    },
    Patched {
        base: EntryId,
        patches: Arc<[TilePatch]>,
    },
}

struct StoreEntry {
    payload: Payload,
    signature: Signature,
    timestamp: f64,
    coverage: f64,
    bytes: usize,
}

struct StoreState {
    entries: BTreeMap<EntryId, StoreEntry>,
    total_bytes: usize,
    next_id: u64,
}

impl StoreState {
    fn alloc_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Byte-budgeted store of base frames and tile patch sets.
pub struct DeltaStore {
    state: Mutex<StoreState>,
    config: DeltaConfig,
    budget_bytes: u64,
}

impl DeltaStore {
    pub fn new(config: DeltaConfig) -> Self {
        Self {
            budget_bytes: config.budget_bytes(),
            config,
            state: Mutex::new(StoreState {
                entries: BTreeMap::new(),
                total_bytes: 0,
                next_id: 0,
            }),
        }
    }

    /// The tile and patch policy this store was built with.
    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    /// Append a full base frame and return its id.
    pub fn add_base(
        &self,
        frame: Arc<FrameBuffer>,
        signature: Signature,
        timestamp: f64,
        coverage: f64,
    ) -> Result<EntryId> {
        if !frame.is_valid() {
            return Err(Error::InvalidFrame(format!(
                "{}x{} with {} bytes",
                frame.width,
                frame.height,
                frame.size_bytes()
            )));
        }
        let bytes = frame.size_bytes();

        let mut st = self.lock();
        let id = st.alloc_id();
        st.entries.insert(
            id,
            StoreEntry {
                payload: Payload::Base {
                    frame,
                    dependents: 0,
                },
                signature,
                timestamp,
                coverage,
                bytes,
            },
        );
        st.total_bytes += bytes;
        self.evict_over_budget(&mut st);
        Ok(id)
    }

    /// Append a patch set against an existing base and return its id.
    ///
    /// The reference is validated up front: a missing id fails with
    /// [`Error::EntryNotFound`] and a patched id with [`Error::NotABase`],
    /// which is what bounds reconstruction to one hop.
    pub fn add_patched(
        &self,
        base: EntryId,
        patches: Vec<TilePatch>,
        signature: Signature,
        timestamp: f64,
        coverage: f64,
    ) -> Result<EntryId> {
        let bytes: usize = patches.iter().map(|p| p.data.len()).sum();

        let mut st = self.lock();
        match st.entries.get_mut(&base) {
            None => return Err(Error::EntryNotFound(base.0)),
            Some(entry) => match &mut entry.payload {
                Payload::Base { dependents, .. } => *dependents += 1,
                Payload::Patched { .. } => return Err(Error::NotABase(base.0)),
            },
        }

        let id = st.alloc_id();
        st.entries.insert(
            id,
            StoreEntry {
                payload: Payload::Patched {
                    base,
                    patches: patches.into(),
                },
                signature,
                timestamp,
                coverage,
                bytes,
            },
        );
        st.total_bytes += bytes;
        self.evict_over_budget(&mut st);
        Ok(id)
    }

    /// Materialize the full frame stored under `id`.
    ///
    /// A base comes back shared, without copying. For a patched entry the
    /// base bytes are copied once and each tile is overlaid; that
    /// composition runs outside the store lock.
    pub fn reconstruct(&self, id: EntryId) -> Result<Arc<FrameBuffer>> {
        let (base_frame, patches) = {
            let st = self.lock();
            let entry = st.entries.get(&id).ok_or(Error::EntryNotFound(id.0))?;
            match &entry.payload {
                Payload::Base { frame, .. } => return Ok(Arc::clone(frame)),
                Payload::Patched { base, patches } => {
                    let base_entry = st.entries.get(base).ok_or(Error::EntryNotFound(base.0))?;
                    match &base_entry.payload {
                        Payload::Base { frame, .. } => (Arc::clone(frame), Arc::clone(patches)),
                        Payload::Patched { .. } => return Err(Error::NotABase(base.0)),
                    }
                }
            }
        };
        Ok(Arc::new(self.compose(&base_frame, &patches)))
    }

    /// Partition both frames into the configured tile grid and emit one
    /// patch per tile whose bytes differ, plus the changed-tile coverage.
    ///
    /// Invalid or dimension-mismatched input yields the neutral result
    /// of no patches and coverage 1.0, which policy layers read as
    /// "cannot patch, store a base". Runs without taking the store lock.
    pub fn diff_and_patch(&self, prev: &FrameBuffer, curr: &FrameBuffer) -> (Vec<TilePatch>, f64) {
        if !prev.is_valid()
            || !curr.is_valid()
            || prev.width != curr.width
            || prev.height != curr.height
        {
            return (Vec::new(), 1.0);
        }

        let width = curr.width as usize;
        let height = curr.height as usize;
        let stride = curr.stride();
        let (tile_w, tile_h) = self.config.tile_size();
        let (grid_x, grid_y) = self.config.tile_grid(curr.width, curr.height);

        let mut patches = Vec::new();
        let mut changed_tiles = 0usize;

        for ty in 0..grid_y {
            for tx in 0..grid_x {
                let x = tx * tile_w;
                let y = ty * tile_h;
                let w = tile_w.min(width - x);
                let h = tile_h.min(height - y);
                if !tile_changed(prev.data(), curr.data(), x, y, w, h, stride) {
                    continue;
                }
                changed_tiles += 1;

                let origin = (y * width + x) * BYTES_PER_PIXEL;
                let (format, data) = if self.config.allow_demotion {
                    (
                        PatchFormat::Rgb565,
                        rgb565::pack_tile(&curr.data()[origin..], w, h, stride),
                    )
                } else {
                    let mut full = Vec::with_capacity(w * h * BYTES_PER_PIXEL);
                    for row in 0..h {
                        let start = origin + row * stride;
                        full.extend_from_slice(&curr.data()[start..start + w * BYTES_PER_PIXEL]);
                    }
                    (PatchFormat::Bgra32, full)
                };

                patches.push(TilePatch {
                    tile_index: (ty * grid_x + tx) as u32,
                    width: w as u16,
                    height: h as u16,
                    format,
                    data,
                });
            }
        }

        let total_tiles = grid_x * grid_y;
        let coverage = if total_tiles == 0 {
            1.0
        } else {
            changed_tiles as f64 / total_tiles as f64
        };
        (patches, coverage)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether `id` still resolves to a stored entry.
    pub fn contains(&self, id: EntryId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Current payload byte total across all entries.
    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// Metadata for `id`, if it is still stored.
    pub fn meta(&self, id: EntryId) -> Option<EntryMeta> {
        let st = self.lock();
        st.entries.get(&id).map(|entry| {
            let (is_base, base) = match &entry.payload {
                Payload::Base { .. } => (true, None),
                Payload::Patched { base, .. } => (false, Some(*base)),
            };
            EntryMeta {
                is_base,
                base,
                signature: entry.signature,
                timestamp: entry.timestamp,
                coverage: entry.coverage,
                bytes: entry.bytes,
            }
        })
    }

    /// Copy the base and overlay each tile patch at its grid rectangle.
    fn compose(&self, base: &FrameBuffer, patches: &[TilePatch]) -> FrameBuffer {
        let width = base.width as usize;
        let height = base.height as usize;
        let stride = base.stride();
        let (tile_w, tile_h) = self.config.tile_size();
        let (grid_x, _) = self.config.tile_grid(base.width, base.height);
        let mut data = base.data().to_vec();

        for patch in patches {
            let expected =
                patch.width as usize * patch.height as usize * patch.format.bytes_per_pixel();
            if patch.data.len() < expected {
                debug!(tile = patch.tile_index, "skipping malformed patch");
                continue;
            }
            let tx = patch.tile_index as usize % grid_x;
            let ty = patch.tile_index as usize / grid_x;
            let x = tx * tile_w;
            let y = ty * tile_h;
            if x >= width || y >= height {
                // Patch from a different grid geometry.
                debug!(tile = patch.tile_index, "skipping out-of-grid patch");
                continue;
            }
            let copy_w = (patch.width as usize).min(width - x);
            let copy_h = (patch.height as usize).min(height - y);
            let origin = (y * width + x) * BYTES_PER_PIXEL;

            match patch.format {
                PatchFormat::Bgra32 => {
                    let patch_stride = patch.width as usize * BYTES_PER_PIXEL;
                    for row in 0..copy_h {
                        let src = &patch.data[row * patch_stride..][..copy_w * BYTES_PER_PIXEL];
                        let dst = &mut data[origin + row * stride..][..copy_w * BYTES_PER_PIXEL];
                        dst.copy_from_slice(src);
                    }
                }
                PatchFormat::Rgb565 => {
                    rgb565::unpack_tile(
                        &patch.data,
                        patch.width as usize,
                        copy_w,
                        copy_h,
                        &mut data[origin..],
                        stride,
                    );
                }
            }
        }

        FrameBuffer::new(data, base.width, base.height)
    }

    /// Oldest-first eviction while over budget.
    ///
    /// The newest entry and any base with live dependents are skipped.
    /// Patches are always younger than their base, so a pinned base
    /// drains its dependents first and then ages out itself. When only
    /// protected entries remain the total is allowed to rest above the
    /// budget.
    fn evict_over_budget(&self, st: &mut StoreState) {
        while st.total_bytes as u64 > self.budget_bytes && st.entries.len() > 1 {
            let newest = match st.entries.keys().next_back() {
                Some(id) => *id,
                None => break,
            };
            let victim = st.entries.iter().find_map(|(id, entry)| {
                if *id == newest {
                    return None;
                }
                match &entry.payload {
                    Payload::Base { dependents, .. } if *dependents > 0 => None,
                    _ => Some(*id),
                }
            });
            let victim = match victim {
                Some(id) => id,
                None => break,
            };

            if let Some(gone) = st.entries.remove(&victim) {
                st.total_bytes = st.total_bytes.saturating_sub(gone.bytes);
                if let Payload::Patched { base, .. } = gone.payload {
                    if let Some(base_entry) = st.entries.get_mut(&base) {
                        if let Payload::Base { dependents, .. } = &mut base_entry.payload {
                            *dependents = dependents.saturating_sub(1);
                        }
                    }
                }
                debug!(id = victim.0, "evicted entry over budget");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// True when any byte differs inside the tile rectangle.
fn tile_changed(
    prev: &[u8],
    curr: &[u8],
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    stride: usize,
) -> bool {
    for row in y..y + h {
        let start = row * stride + x * BYTES_PER_PIXEL;
        if prev[start..start + w * BYTES_PER_PIXEL] != curr[start..start + w * BYTES_PER_PIXEL] {
            return true;
        }
    }
    false
}
