#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
//! # cfadebayer
//! Reconstructs full colour images from single-channel colour filter array (CFA)
//! sensor mosaics.
//!
//! Supported mosaics:
//! - 2x2 Bayer tilings, in all eight legal permutations ([`BayerPattern`]).
//! - 6x6 Fujifilm X-Trans tilings ([`XTransPattern`]).
//!
//! Supported interpolation methods:
//! - [`DebayerMethod::SuperPixel`]: every 2x2 cell becomes one output pixel.
//! - [`DebayerMethod::Bilinear`]: same-colour neighbour averaging.
//! - [`DebayerMethod::Vng`]: variable number of gradients.
//! - Markesteijn interpolation for X-Trans mosaics, in one or two passes
//!   ([`interpolate_xtrans`]).
//!
//! An optional FBDD noise reduction pass ([`FbddMode`]) can be run on Bayer
//! mosaics before interpolation, and the Gaussian noise of the result can be
//! estimated per channel ([`NoiseEvaluator`]).
//!
//! Work is split across a per-call worker pool (with the `rayon` feature, enabled
//! by default). Progress can be observed and the call cancelled through a
//! [`StatusMonitor`].
//!
//! # Usage
//! ```
//! use cfadebayer::{debayer, BayerPattern, ColorSpace, DebayerMethod, ImageOwned, ImageProps};
//!
//! let data = vec![0u16; 64 * 64];
//! let mosaic = ImageOwned::from_owned(data, 64, 64, ColorSpace::Bayer(BayerPattern::Rggb)).unwrap();
//! let rgb = debayer(&mosaic, &BayerPattern::Rggb, DebayerMethod::Bilinear).unwrap();
//! assert_eq!(rgb.width(), 64);
//! assert_eq!(rgb.channels(), 3);
//! ```
mod coretraits;
mod demosaic;
mod dynamicimageowned;
mod imageowned;
mod imagetraits;
mod metadata;
mod noise;

use serde::{Deserialize, Serialize};

pub use coretraits::PixelStor;
pub use demosaic::{
    debayer, interpolate_xtrans, number_of_threads, run_debayer, BayerPattern, CameraMatrix,
    CfaPattern, Channel, Debayer, DebayerError, DebayerMethod, DebayerParameters, DebayerResult,
    FbddMode, StatusMonitor, XTransPattern,
};
pub use imageowned::ImageOwned;
pub use imagetraits::{BayerShift, ImageProps, SampleAccess};
pub use metadata::{
    DebayerOutput, GenericLineItem, GenericValue, InsertValue, HISTORY_KEY, NOISE_ALGORITHM_KEY,
    NOISE_FRACTION_KEY, NOISE_KEY,
};
pub use noise::{
    evaluate_noise, KSigmaNoise, MrsNoise, NoiseAlgorithm, NoiseEstimate, NoiseEvaluator,
    B3_SPLINE_KJ,
};

/// Image data with a dynamic pixel storage type.
///
/// This is the type-erased counterpart of [`ImageOwned`], for callers that only know
/// the sample type of a mosaic at runtime.
#[derive(Debug, PartialEq, Clone)]
pub enum DynamicImageOwned {
    /// Image with 8-bit unsigned integer samples.
    U8(ImageOwned<u8>),
    /// Image with 16-bit unsigned integer samples.
    U16(ImageOwned<u16>),
    /// Image with 32-bit unsigned integer samples.
    U32(ImageOwned<u32>),
    /// Image with 32-bit floating point samples.
    F32(ImageOwned<f32>),
    /// Image with 64-bit floating point samples.
    F64(ImageOwned<f64>),
}

/// Enum to describe the color space of the image.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Grayscale image.
    Gray,
    /// Bayer mosaic, with the given 2x2 pattern.
    Bayer(BayerPattern),
    /// X-Trans mosaic, with the given 6x6 pattern.
    XTrans(XTransPattern),
    /// RGB image.
    Rgb,
}

impl ColorSpace {
    /// The CFA pattern carried by this color space, if any.
    pub fn cfa_pattern(&self) -> Option<CfaPattern> {
        match self {
            ColorSpace::Bayer(p) => Some(CfaPattern::Bayer(*p)),
            ColorSpace::XTrans(p) => Some(CfaPattern::XTrans(*p)),
            _ => None,
        }
    }
}

/// Enum to describe the pixel type of the image.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PixelType {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
}
