//! Lazy pixel signal over a prepared [`PixelBuffer`]
//!
//! Classifiers pull packed `0xRRGGBB` values by pixel index instead of
//! receiving a pre-flattened copy of the frame.

use crate::buffer::PixelBuffer;
use crate::types::Resolution;

/// Borrowed view of a pixel buffer indexed by pixel
#[derive(Debug, Clone, Copy)]
pub struct PixelSignal<'a> {
    rgb: &'a [u8],
    resolution: Resolution,
}

impl<'a> PixelSignal<'a> {
    pub fn new(pixels: &'a PixelBuffer) -> Self {
        Self::from_rgb(pixels.as_bytes(), pixels.resolution())
    }

    /// View over raw packed RGB888 bytes at `resolution`.
    ///
    /// # Panics
    /// If `rgb` is not exactly `resolution.rgb_bytes()` long.
    pub fn from_rgb(rgb: &'a [u8], resolution: Resolution) -> Self {
        assert_eq!(
            rgb.len(),
            resolution.rgb_bytes(),
            "pixel signal over {} needs {} bytes",
            resolution,
            resolution.rgb_bytes()
        );
        Self { rgb, resolution }
    }

    /// Number of pixels (`width * height`)
    pub fn total_length(&self) -> usize {
        self.resolution.pixels()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Packed pixels `offset..offset + count`, read straight from the buffer.
    ///
    /// # Panics
    /// If the range is not within `0..total_length()`; that is a caller bug.
    pub fn read(&self, offset: usize, count: usize) -> Pixels<'a> {
        let end = self.checked_end(offset, count);
        Pixels {
            rgb: &self.rgb[offset * 3..end * 3],
        }
    }

    /// Fill `out` with pixels starting at `offset`, as floats.
    ///
    /// # Panics
    /// Same range contract as [`PixelSignal::read`].
    pub fn read_into(&self, offset: usize, out: &mut [f32]) {
        let count = out.len();
        for (dst, px) in out.iter_mut().zip(self.read(offset, count)) {
            *dst = px as f32;
        }
    }

    /// One row of pixels
    pub fn row(&self, y: u32) -> Pixels<'a> {
        let width = self.resolution.width as usize;
        self.read(y as usize * width, width)
    }

    fn checked_end(&self, offset: usize, count: usize) -> usize {
        match offset.checked_add(count) {
            Some(end) if end <= self.total_length() => end,
            _ => panic!(
                "pixel range {}..+{} outside signal of {} pixels",
                offset,
                count,
                self.total_length()
            ),
        }
    }
}

/// Iterator of packed `0xRRGGBB` pixel values
#[derive(Debug, Clone)]
pub struct Pixels<'a> {
    rgb: &'a [u8],
}

impl Iterator for Pixels<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let (px, rest) = self.rgb.split_first_chunk::<3>()?;
        self.rgb = rest;
        Some(pack_rgb(*px))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.rgb.len() / 3;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Pixels<'_> {}

/// Pack one RGB888 pixel into `0xRRGGBB`
#[inline]
pub fn pack_rgb([r, g, b]: [u8; 3]) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Split `0xRRGGBB` back into channels
#[inline]
pub fn unpack_rgb(px: u32) -> [u8; 3] {
    [(px >> 16) as u8, (px >> 8) as u8, px as u8]
}
