//! Raster implementation.
use std::ops::Range;

use crate::{coretraits::cast_u16, PixelStor, SampleAccess};

use super::Channel;

/// Mutable raster over a band of consecutive rows of an interleaved RGB image.
pub(crate) struct RasterMut<'a, T: PixelStor> {
    y: usize,
    h: usize,
    stride: usize,
    buf: &'a mut [T],
}

impl<'a, T: PixelStor> RasterMut<'a, T> {
    /// Wrap the rows starting at image row `y` of an RGB image `w` pixels wide.
    ///
    /// # Panics
    /// If `buf` does not hold a whole number of rows.
    pub fn with_offset(y: usize, w: usize, buf: &'a mut [T]) -> Self {
        let stride = w.checked_mul(3).expect("overflow");
        assert!(stride > 0 && buf.len() % stride == 0);
        RasterMut {
            y,
            h: buf.len() / stride,
            stride,
            buf,
        }
    }

    /// Image rows covered by this raster.
    pub fn rows(&self) -> Range<usize> {
        self.y..self.y + self.h
    }

    /// Borrow a mutable row slice, by image row.
    ///
    /// # Panics
    /// Panics if the row is outside the raster.
    pub fn borrow_row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(self.rows().contains(&y));
        let start = self.stride * (y - self.y);
        &mut self.buf[start..start + self.stride]
    }
}

/// Single-channel working copy of a mosaic, on the `[0, 1]` scale.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CfaPlane {
    pub(crate) data: Vec<f32>,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl CfaPlane {
    /// Read a mosaic. Colour mosaics (3 channels or more) contribute, at every
    /// pixel, the channel of the filter colour there.
    pub fn load<M, F>(mosaic: &M, color_at: F) -> Self
    where
        M: SampleAccess + ?Sized,
        F: Fn(usize, usize) -> Channel,
    {
        let (width, height) = (mosaic.width(), mosaic.height());
        let colour = mosaic.channels() >= 3;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let c = if colour { color_at(y, x).index() } else { 0 };
                data.push(mosaic.sample(x, y, c) as f32);
            }
        }
        CfaPlane {
            data,
            width,
            height,
        }
    }

    #[inline(always)]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Samples on the 16-bit integer scale.
    pub fn to_u16(&self) -> Vec<u16> {
        cast_u16(&self.data)
    }
}
