use crate::{
    coretraits::cast_f32, ColorSpace, ImageProps, PixelStor, PixelType, SampleAccess,
};
use num_traits::CheckedEuclid;
use serde::{Deserialize, Serialize};

/// A structure that holds image data backed by a vector.
///
/// This represents a _matrix_ of _pixels_ which are composed of primitive and common
/// types, i.e. `u8`, `u16`, and `f32`. The matrix is stored in a _row-major_ order,
/// with the channels of a pixel interleaved.
///
/// Mosaics ([`ColorSpace::Bayer`], [`ColorSpace::XTrans`]) and grayscale images carry
/// one channel, [`ColorSpace::Rgb`] images carry three.
///
/// # Usage
/// ```
/// use cfadebayer::{ImageOwned, ColorSpace};
///
/// let data = vec![1u8, 2, 3, 4, 5, 6];
/// let img = ImageOwned::from_owned(data, 3, 2, ColorSpace::Gray).unwrap();
/// ```
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ImageOwned<T: PixelStor> {
    pub(crate) data: Vec<T>,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) channels: u8,
    pub(crate) cspace: ColorSpace,
}

impl<T: PixelStor> ImageOwned<T> {
    pub(crate) fn new(
        data: Vec<T>,
        width: usize,
        height: usize,
        cspace: ColorSpace,
    ) -> Result<Self, &'static str> {
        if height > u16::MAX as usize || width > u16::MAX as usize {
            return Err("Image too large.");
        }
        if data.is_empty() {
            return Err("Data is empty");
        }
        if width == 0 {
            return Err("Width is zero");
        }
        if height == 0 {
            return Err("Height is zero");
        }
        let len = data.len();
        let tot = width.checked_mul(height).ok_or("Image too large.")?;
        let (channels, rem) = len
            .checked_div_rem_euclid(&tot)
            .ok_or("Could not determine number of channels.")?;
        if rem != 0 {
            return Err("Data length does not match image size.");
        }
        if channels > u8::MAX.into() {
            return Err("Too many channels.");
        }

        let exp_channels = match cspace {
            ColorSpace::Gray | ColorSpace::Bayer(_) | ColorSpace::XTrans(_) => 1,
            ColorSpace::Rgb => 3,
        };
        if channels != exp_channels {
            return Err("Invalid number of channels.");
        }

        Ok(ImageOwned {
            data,
            width: width as u16,
            height: height as u16,
            channels: channels as u8,
            cspace,
        })
    }

    /// Create a new [`ImageOwned`] from a slice of data.
    ///
    /// Images can not be larger than 65535x65535 pixels.
    ///
    /// # Arguments
    /// - `data`: The data slice. It is copied into the image.
    /// - `width`: The width of the image.
    /// - `height`: The height of the image.
    /// - `cspace`: The color space of the image ([`ColorSpace`]).
    ///
    /// # Errors
    /// - If the image is too large.
    /// - If the data is empty.
    /// - If the width or height is zero.
    /// - If the data length does not match the image size.
    /// - If the number of channels does not match the color space.
    pub fn from_ref(
        data: &[T],
        width: usize,
        height: usize,
        cspace: ColorSpace,
    ) -> Result<Self, &'static str> {
        Self::new(data.into(), width, height, cspace)
    }

    /// Create a new [`ImageOwned`] from owned data.
    ///
    /// Images can not be larger than 65535x65535 pixels.
    ///
    /// # Arguments
    /// - `data`: Owned data ([`Vec`]).
    /// - `width`: The width of the image.
    /// - `height`: The height of the image.
    /// - `cspace`: The color space of the image ([`ColorSpace`]).
    ///
    /// # Errors
    /// Same as [`ImageOwned::from_ref`].
    pub fn from_owned(
        data: Vec<T>,
        width: usize,
        height: usize,
        cspace: ColorSpace,
    ) -> Result<Self, &'static str> {
        Self::new(data, width, height, cspace)
    }

    /// Get the underlying data as a slice.
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Get the underlying data as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Consume the image and return the underlying vector.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Get the length of the data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the data is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the width of the image.
    pub fn width(&self) -> usize {
        self.width.into()
    }

    /// Get the height of the image.
    pub fn height(&self) -> usize {
        self.height.into()
    }

    /// Get the number of channels in the image.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Get the color space of the image.
    pub fn color_space(&self) -> ColorSpace {
        self.cspace
    }

    /// Convert the image to a [`ImageOwned`] with [`f32`] pixel type, on the `[0, 1]` scale.
    ///
    /// Note: This operation is parallelized if the `rayon` feature is enabled.
    pub fn into_f32(&self) -> ImageOwned<f32> {
        ImageOwned {
            data: cast_f32(self.data.as_slice()),
            width: self.width,
            height: self.height,
            channels: self.channels,
            cspace: self.cspace,
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize, c: usize) -> usize {
        assert!(x < self.width() && y < self.height() && c < self.channels as usize);
        (y * self.width() + x) * self.channels as usize + c
    }
}

impl<T: PixelStor> ImageProps for ImageOwned<T> {
    fn width(&self) -> usize {
        self.width()
    }

    fn height(&self) -> usize {
        self.height()
    }

    fn channels(&self) -> u8 {
        self.channels()
    }

    fn color_space(&self) -> ColorSpace {
        self.color_space()
    }

    fn pixel_type(&self) -> PixelType {
        T::PIXEL_TYPE
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<T: PixelStor> SampleAccess for ImageOwned<T> {
    #[inline]
    fn sample(&self, x: usize, y: usize, c: usize) -> f64 {
        self.data[self.index(x, y, c)].cast_f64()
    }

    #[inline]
    fn set_sample(&mut self, x: usize, y: usize, c: usize, value: f64) {
        let idx = self.index(x, y, c);
        self.data[idx] = T::from_normalized(value);
    }
}

#[cfg(test)]
mod tests {
    use super::ImageOwned;
    use crate::{BayerPattern, ColorSpace, ImageProps, PixelType, SampleAccess, XTransPattern};

    #[test]
    fn test_create() {
        let data = vec![1u8, 2, 3, 4, 5, 6];
        let img = ImageOwned::from_owned(data.clone(), 3, 2, ColorSpace::Gray).unwrap();
        assert_eq!(img.width(), 3);
        assert_eq!(img.height(), 2);
        assert_eq!(img.channels(), 1);
        assert_eq!(img.pixel_type(), PixelType::U8);
        assert!(ImageOwned::from_owned(data.clone(), 1, 2, ColorSpace::Rgb).is_ok());
        assert_eq!(
            ImageOwned::from_owned(data.clone(), 2, 1, ColorSpace::Bayer(BayerPattern::Rggb)),
            Err("Invalid number of channels.")
        );
        assert_eq!(
            ImageOwned::from_owned(data.clone(), 4, 1, ColorSpace::Gray),
            Err("Data length does not match image size.")
        );
        assert_eq!(
            ImageOwned::<u8>::from_owned(vec![], 4, 1, ColorSpace::Gray),
            Err("Data is empty")
        );
        assert_eq!(
            ImageOwned::from_owned(data, 0, 1, ColorSpace::Gray),
            Err("Width is zero")
        );
        let xt = ColorSpace::XTrans(XTransPattern::default());
        assert!(ImageOwned::from_owned(vec![0u16; 36], 6, 6, xt).is_ok());
    }

    #[test]
    fn test_samples() {
        let mut img = ImageOwned::from_owned(vec![0u16; 12], 2, 2, ColorSpace::Rgb).unwrap();
        img.set_sample(1, 0, 2, 1.0);
        img.set_sample(0, 1, 1, 0.5);
        assert_eq!(img.as_slice()[5], u16::MAX);
        assert_eq!(img.as_slice()[7], 32768);
        assert_eq!(img.sample(1, 0, 2), 1.0);
        let f = img.into_f32();
        assert_eq!(f.as_slice()[5], 1.0);
        assert_eq!(f.pixel_type(), PixelType::F32);
    }

    #[test]
    #[should_panic]
    fn test_sample_out_of_bounds() {
        let img = ImageOwned::from_owned(vec![0u8; 4], 2, 2, ColorSpace::Gray).unwrap();
        img.sample(2, 0, 0);
    }
}
