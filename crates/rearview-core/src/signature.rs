//! Content fingerprinting for fast frame identity checks
//!
//! A [`Signature`] is a cheap one-pass summary of a frame: per-channel
//! byte sums, a running XOR over the 32-bit pixel words and an
//! order-sensitive rolling hash. Equal signatures are necessary but not
//! sufficient for identity, so [`frames_identical`] always re-verifies a
//! signature match with a full byte compare. The split keeps the common
//! "nothing changed" case at one O(pixels) pass per frame while never
//! trusting the fingerprint alone.

use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};

const HASH_SEED: u64 = 1_469_598_103_934_665_603;
const HASH_PRIME: u64 = 1_099_511_628_211;

/// Derived content summary of a frame, including its dimensions.
///
/// An invalid buffer always fingerprints to the all-zero sentinel, which
/// never satisfies [`frames_identical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signature {
    /// Sum of all blue channel bytes
    pub sum_b: u64,
    /// Sum of all green channel bytes
    pub sum_g: u64,
    /// Sum of all red channel bytes
    pub sum_r: u64,
    /// Sum of all alpha channel bytes
    pub sum_a: u64,
    /// XOR of all pixels read as little-endian 32-bit words
    pub xor32: u64,
    /// Rolling hash over every byte in storage order
    pub hash: u64,
    pub width: u32,
    pub height: u32,
}

impl Signature {
    /// Compute the signature of a frame in a single pass.
    pub fn of(frame: &FrameBuffer) -> Self {
        if !frame.is_valid() {
            return Self::default();
        }

        let mut sig = Signature {
            width: frame.width,
            height: frame.height,
            ..Default::default()
        };
        let mut hash = HASH_SEED;

        for px in frame.data().chunks_exact(BYTES_PER_PIXEL) {
            sig.sum_b += u64::from(px[0]);
            sig.sum_g += u64::from(px[1]);
            sig.sum_r += u64::from(px[2]);
            sig.sum_a += u64::from(px[3]);
            sig.xor32 ^= u64::from(u32::from_le_bytes([px[0], px[1], px[2], px[3]]));
            for &b in px {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(HASH_PRIME);
            }
        }

        sig.hash = hash;
        sig
    }
}

/// Byte-exact identity check gated by the cheap signature comparison.
///
/// Returns `false` without touching pixel data when either buffer is
/// invalid, the signatures differ or the dimensions differ. A signature
/// match alone never declares identity; the full compare still runs.
pub fn frames_identical(
    a: &FrameBuffer,
    b: &FrameBuffer,
    sig_a: &Signature,
    sig_b: &Signature,
) -> bool {
    if !a.is_valid() || !b.is_valid() {
        return false;
    }
    if sig_a != sig_b {
        return false;
    }
    // Guards callers that pass signatures computed from other frames.
    if a.width != b.width || a.height != b.height {
        return false;
    }
    a.data() == b.data()
}
