use crate::{ColorSpace, DynamicImageOwned, ImageOwned, ImageProps, PixelType, SampleAccess};

macro_rules! dynamic_map(
    ($dynimage: expr, $image:pat_param, $action: expr) => (
        match $dynimage {
            DynamicImageOwned::U8($image) => $action,
            DynamicImageOwned::U16($image) => $action,
            DynamicImageOwned::U32($image) => $action,
            DynamicImageOwned::F32($image) => $action,
            DynamicImageOwned::F64($image) => $action,
        }
    );
);

impl ImageProps for DynamicImageOwned {
    fn width(&self) -> usize {
        dynamic_map!(self, ref image, { image.width() })
    }

    fn height(&self) -> usize {
        dynamic_map!(self, ref image, { image.height() })
    }

    fn channels(&self) -> u8 {
        dynamic_map!(self, ref image, { image.channels() })
    }

    fn color_space(&self) -> ColorSpace {
        dynamic_map!(self, ref image, { image.color_space() })
    }

    fn pixel_type(&self) -> PixelType {
        dynamic_map!(self, ref image, { ImageProps::pixel_type(image) })
    }

    fn len(&self) -> usize {
        dynamic_map!(self, ref image, { image.len() })
    }

    fn is_empty(&self) -> bool {
        dynamic_map!(self, ref image, { image.is_empty() })
    }
}

impl SampleAccess for DynamicImageOwned {
    #[inline]
    fn sample(&self, x: usize, y: usize, c: usize) -> f64 {
        dynamic_map!(self, ref image, { image.sample(x, y, c) })
    }

    #[inline]
    fn set_sample(&mut self, x: usize, y: usize, c: usize, value: f64) {
        dynamic_map!(self, ref mut image, { image.set_sample(x, y, c, value) })
    }
}

impl DynamicImageOwned {
    /// Convert the samples to `f32`, normalized to `[0, 1]`.
    pub fn into_f32(&self) -> ImageOwned<f32> {
        match self {
            DynamicImageOwned::F32(image) => image.clone(),
            _ => dynamic_map!(self, ref image, { image.into_f32() }),
        }
    }
}

macro_rules! convert_dynamic {
    ($type:ty, $variant:path) => {
        impl TryFrom<DynamicImageOwned> for ImageOwned<$type> {
            type Error = &'static str;

            fn try_from(data: DynamicImageOwned) -> Result<Self, Self::Error> {
                match data {
                    $variant(data) => Ok(data),
                    _ => Err(concat!("Data is not of type ", stringify!($type))),
                }
            }
        }

        impl From<ImageOwned<$type>> for DynamicImageOwned {
            fn from(data: ImageOwned<$type>) -> Self {
                $variant(data)
            }
        }
    };
}

convert_dynamic!(u8, DynamicImageOwned::U8);
convert_dynamic!(u16, DynamicImageOwned::U16);
convert_dynamic!(u32, DynamicImageOwned::U32);
convert_dynamic!(f32, DynamicImageOwned::F32);
convert_dynamic!(f64, DynamicImageOwned::F64);
