//! Frame buffer representation for captured screen content
//!
//! Every component of the cache exchanges frames through [`FrameBuffer`]:
//! a contiguous, row-major BGRA bitmap with no row padding. Frames are
//! shared by reference (`Arc<FrameBuffer>`) rather than copied; nothing in
//! this crate mutates a frame after it has been published.

/// Bytes per pixel in the fixed B,G,R,A layout.
pub const BYTES_PER_PIXEL: usize = 4;

/// A raw bitmap frame in BGRA format.
///
/// A buffer is valid only when both dimensions are nonzero and
/// `data.len() == width * height * 4`. Operations that read pixel data
/// check [`is_valid`](Self::is_valid) first and treat invalid buffers as
/// no-ops rather than panicking.
#[derive(Clone)]
pub struct FrameBuffer {
    /// Raw pixel data in BGRA byte order
    data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameBuffer {
    /// Create a frame from raw BGRA pixel data.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Create a frame filled with a single BGRA color.
    ///
    /// Handy for synthetic producers and tests.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&bgra);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Raw pixel data, row-major BGRA.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Row length in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Total payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer length matches the stated dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Overwrite one pixel. Out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[at..at + BYTES_PER_PIXEL].copy_from_slice(&bgra);
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size_bytes", &self.data.len())
            .finish()
    }
}
