use crate::{BayerPattern, ColorSpace, PixelType};

/// A trait for shifting Bayer patterns.
///
/// Used when a mosaic is cropped at an odd offset: the pattern of the crop is the
/// pattern of the full frame shifted by the crop origin.
pub trait BayerShift {
    /// Shift the Bayer pattern by `x` columns and `y` rows, such that
    /// `p.shift(x, y).color_at(r, c) == p.color_at(r + y, c + x)`.
    fn shift(&self, x: usize, y: usize) -> Self;
    /// Flip the Bayer pattern horizontally.
    fn flip_horizontal(&self) -> Self;
    /// Flip the Bayer pattern vertically.
    fn flip_vertical(&self) -> Self;
}

impl BayerShift for BayerPattern {
    fn shift(&self, x: usize, y: usize) -> Self {
        let [c00, c01, c10, c11] = self.colors();
        match (x % 2, y % 2) {
            (0, 0) => Some(*self),
            (1, 0) => BayerPattern::from_colors([c01, c00, c11, c10]),
            (0, 1) => BayerPattern::from_colors([c10, c11, c00, c01]),
            _ => BayerPattern::from_colors([c11, c10, c01, c00]),
        }
        .unwrap_or(*self)
    }

    fn flip_horizontal(&self) -> Self {
        self.shift(1, 0)
    }

    fn flip_vertical(&self) -> Self {
        self.shift(0, 1)
    }
}

/// A trait for accessing the properties of an image.
pub trait ImageProps {
    /// Get the width of the image.
    fn width(&self) -> usize;

    /// Get the height of the image.
    fn height(&self) -> usize;

    /// Get the number of channels in the image.
    fn channels(&self) -> u8;

    /// Get the color space of the image.
    fn color_space(&self) -> ColorSpace;

    /// Get the pixel type of the image.
    fn pixel_type(&self) -> PixelType;

    /// Get the length of the image data.
    fn len(&self) -> usize;

    /// Check if the data is empty.
    fn is_empty(&self) -> bool;
}

/// Normalized sample access.
///
/// This is the only capability the demosaicing engines need from a mosaic. It is
/// implemented for [`ImageOwned`](crate::ImageOwned) and
/// [`DynamicImageOwned`](crate::DynamicImageOwned), and can be implemented for any
/// other pixel container.
pub trait SampleAccess: ImageProps {
    /// Read the sample at column `x`, row `y` and channel `c`, scaled to `[0, 1]`.
    ///
    /// # Panics
    /// If the coordinates are out of bounds.
    fn sample(&self, x: usize, y: usize, c: usize) -> f64;

    /// Write a sample given on the `[0, 1]` scale. Values outside the range are clamped.
    ///
    /// # Panics
    /// If the coordinates are out of bounds.
    fn set_sample(&mut self, x: usize, y: usize, c: usize, value: f64);
}
