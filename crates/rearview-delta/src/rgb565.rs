//! RGB565 color demotion for patch tiles
//!
//! A demoted tile stores each pixel as one little-endian 16-bit word with
//! 5 bits of red, 6 of green and 5 of blue; alpha is dropped and comes
//! back as 255. Quantization truncates the low channel bits, so demotion
//! is lossy and round-tripped channels come back with those bits zeroed.

use bytes::BufMut;

use rearview_core::BYTES_PER_PIXEL;

/// Bytes per demoted pixel on the wire.
pub const BYTES_PER_PIXEL_565: usize = 2;

/// Pack a BGRA tile into RGB565 wire format.
///
/// `src` starts at the tile's top-left pixel inside the full frame and
/// `row_stride` is the full frame's row length in bytes, so edge tiles
/// pack without copying the source rectangle out first.
pub fn pack_tile(src: &[u8], tile_w: usize, tile_h: usize, row_stride: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(tile_w * tile_h * BYTES_PER_PIXEL_565);
    for y in 0..tile_h {
        let row = &src[y * row_stride..];
        for x in 0..tile_w {
            let px = &row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL];
            let r = u16::from(px[2] >> 3);
            let g = u16::from(px[1] >> 2);
            let b = u16::from(px[0] >> 3);
            out.put_u16_le((r << 11) | (g << 5) | b);
        }
    }
    out
}

/// Widen an RGB565 tile back to BGRA.
///
/// `patch_w` is the packed tile's row length in pixels; `copy_w` and
/// `copy_h` bound the written rectangle so clipped edge tiles stay inside
/// the target. `dst` starts at the tile's top-left pixel inside the
/// target frame whose row length is `dst_stride` bytes.
pub fn unpack_tile(
    data: &[u8],
    patch_w: usize,
    copy_w: usize,
    copy_h: usize,
    dst: &mut [u8],
    dst_stride: usize,
) {
    for y in 0..copy_h {
        let dst_row = &mut dst[y * dst_stride..];
        for x in 0..copy_w {
            let at = (y * patch_w + x) * BYTES_PER_PIXEL_565;
            let packed = u16::from_le_bytes([data[at], data[at + 1]]);
            let r = (((packed >> 11) & 0x1F) << 3) as u8;
            let g = (((packed >> 5) & 0x3F) << 2) as u8;
            let b = ((packed & 0x1F) << 3) as u8;
            let px = &mut dst_row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL];
            px[0] = b;
            px[1] = g;
            px[2] = r;
            px[3] = 255;
        }
    }
}
