//! Canvas frames
//!
//! A [`CanvasFrame`] is a fixed-size RGB8 buffer. Frames are immutable once
//! produced: every transform builds a new frame, and cloning only bumps a
//! reference count so the routing engine and status taps can hold on to a
//! frame without copying pixels.

use std::sync::Arc;

use crate::{CoreError, Result};

/// Bytes per pixel (RGB, 8 bits per channel)
pub const BYTES_PER_PIXEL: usize = 3;

/// Immutable RGB8 pixel buffer
#[derive(Clone, PartialEq, Eq)]
pub struct CanvasFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl std::fmt::Debug for CanvasFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl CanvasFrame {
    /// Wrap a raw RGB8 buffer, checking its length.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(CoreError::FrameSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// All-black frame, used as the stand-in for failed sources.
    pub fn black(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0])
    }

    /// Frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    /// Build a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGB bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`. Out-of-range coordinates read as black.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// New frame with `f` applied to every pixel.
    pub fn map_pixels(&self, mut f: impl FnMut([u8; 3]) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(BYTES_PER_PIXEL) {
            data.extend_from_slice(&f([px[0], px[1], px[2]]));
        }
        Self {
            width: self.width,
            height: self.height,
            data: data.into(),
        }
    }

    /// New frame combining two equally sized frames pixel by pixel.
    ///
    /// If the sizes differ, `other` is sampled with black outside its bounds.
    pub fn zip_map(&self, other: &CanvasFrame, mut f: impl FnMut([u8; 3], [u8; 3]) -> [u8; 3]) -> Self {
        if self.size() == other.size() {
            let mut data = Vec::with_capacity(self.data.len());
            for (a, b) in self
                .data
                .chunks_exact(BYTES_PER_PIXEL)
                .zip(other.data.chunks_exact(BYTES_PER_PIXEL))
            {
                data.extend_from_slice(&f([a[0], a[1], a[2]], [b[0], b[1], b[2]]));
            }
            return Self {
                width: self.width,
                height: self.height,
                data: data.into(),
            };
        }
        Self::from_fn(self.width, self.height, |x, y| {
            f(self.pixel(x, y), other.pixel(x, y))
        })
    }

    /// True if every byte is zero
    pub fn is_black(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}
