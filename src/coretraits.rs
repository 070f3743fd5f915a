use num_traits::{Bounded, Num, NumCast};
#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::fmt::Debug;

use crate::PixelType;

extern crate paste;
macro_rules! impl_cast_round {
    ($to:ty) => {
        ::paste::paste! {
            #[doc = "Cast the value to [`" $to "`], by scaling the normalized value to the full range of the target."]
            #[inline(always)]
            fn [<cast_ $to>](self) -> $to {
                let val = self.cast_f64().clamp(0.0, 1.0) * <$to>::MAX as f64;
                val.round() as $to
            }
        }
    };
}

/// The type of each sample in a mosaic or image. For example, this can be `u8`, `u16`, `f32`.
///
/// Sample values are interpreted on a normalized scale: the range
/// [`DEFAULT_MIN_VALUE`](PixelStor::DEFAULT_MIN_VALUE)..=[`DEFAULT_MAX_VALUE`](PixelStor::DEFAULT_MAX_VALUE)
/// maps to `[0, 1]`.
pub trait PixelStor:
    Copy + NumCast + Num + PartialOrd<Self> + Clone + Bounded + Send + Sync + Debug
{
    /// The maximum value for this type of primitive within the context of color.
    /// For floats, the maximum is `1.0`, whereas the integer types inherit their usual maximum values.
    const DEFAULT_MAX_VALUE: Self;

    /// The minimum value for this type of primitive within the context of color.
    /// For floats, the minimum is `0.0`, whereas the integer types inherit their usual minimum values.
    const DEFAULT_MIN_VALUE: Self;

    /// The pixel type of the primitive.
    const PIXEL_TYPE: PixelType;

    /// Convert to f64, without scaling.
    #[inline(always)]
    fn to_f64(self) -> f64 {
        NumCast::from(self).unwrap_or(0.0)
    }

    /// Convert from f64, without scaling.
    /// This function will clamp the value to the range of the type.
    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        if v >= Self::DEFAULT_MAX_VALUE.to_f64() {
            Self::DEFAULT_MAX_VALUE
        } else if v <= Self::DEFAULT_MIN_VALUE.to_f64() {
            Self::DEFAULT_MIN_VALUE
        } else {
            NumCast::from(v).unwrap_or(Self::DEFAULT_MIN_VALUE)
        }
    }

    impl_cast_round!(u8);
    impl_cast_round!(u16);

    /// Cast the value to `f32`, by scaling the value to the `[0, 1]` range.
    #[inline(always)]
    fn cast_f32(self) -> f32 {
        self.cast_f64() as f32
    }

    /// Cast the value to `f64`, by scaling the value to the `[0, 1]` range.
    #[inline(always)]
    fn cast_f64(self) -> f64 {
        let min = Self::DEFAULT_MIN_VALUE.to_f64();
        let max = Self::DEFAULT_MAX_VALUE.to_f64();
        (self.to_f64() - min) / (max - min)
    }

    /// Inverse of [`cast_f64`](PixelStor::cast_f64).
    ///
    /// The value is clamped to `[0, 1]` first. Integer types round to the nearest value.
    #[inline(always)]
    fn from_normalized(v: f64) -> Self {
        let min = Self::DEFAULT_MIN_VALUE.to_f64();
        let max = Self::DEFAULT_MAX_VALUE.to_f64();
        let val = min + v.clamp(0.0, 1.0) * (max - min);
        match Self::PIXEL_TYPE {
            PixelType::F32 | PixelType::F64 => Self::from_f64(val),
            _ => Self::from_f64(val.round()),
        }
    }
}

macro_rules! declare_pixelstor {
    ($base:ty: ($from:expr)..$to:expr, $pty: path) => {
        impl PixelStor for $base {
            const DEFAULT_MAX_VALUE: Self = $to;
            const DEFAULT_MIN_VALUE: Self = $from;
            const PIXEL_TYPE: PixelType = $pty;
        }
    };
}

declare_pixelstor!(u8: (0)..Self::MAX, PixelType::U8);
declare_pixelstor!(u16: (0)..Self::MAX, PixelType::U16);
declare_pixelstor!(u32: (0)..Self::MAX, PixelType::U32);

declare_pixelstor!(f32: (0.0)..1.0,  PixelType::F32);
declare_pixelstor!(f64: (0.0)..1.0, PixelType::F64);

macro_rules! impl_pixelstor_cast {
    ($to: ty) => {
        ::paste::paste! {
            #[doc = "Cast a slice of T to a vector of [`" $to "`], by scaling the value to requisite range."]
            #[inline(never)]
            pub(crate) fn [<cast_ $to>]<T: PixelStor>(data: &[T]) -> Vec<$to> {
                #[cfg(not(feature = "rayon"))]
                {
                    data.iter().map(|&x| x.[<cast_ $to>]()).collect()
                }
                #[cfg(feature = "rayon")]
                {
                    data.par_iter().map(|&x| x.[<cast_ $to>]()).collect()
                }
            }
        }
    };
}

impl_pixelstor_cast!(u16);
impl_pixelstor_cast!(f32);
