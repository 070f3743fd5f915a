//! Demosaicing engines and their dispatcher.
mod bilinear;
mod border;
mod cfa;
mod errcode;
mod fbdd;
mod lab;
mod parallel;
mod raster;
mod superpixel;
mod vng;
mod xtrans;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

pub use cfa::{BayerPattern, CfaPattern, Channel, XTransPattern};
pub use errcode::{DebayerError, DebayerResult};
pub use fbdd::FbddMode;
pub use lab::CameraMatrix;
pub use parallel::{number_of_threads, StatusMonitor};

use crate::{
    noise::evaluate_channel, DebayerOutput, DynamicImageOwned, ImageOwned, ImageProps,
    NoiseAlgorithm, NoiseEstimate, PixelStor, SampleAccess,
};
use parallel::Executor;
use raster::CfaPlane;

/// Smallest width and height of a Bayer mosaic.
const MIN_BAYER_SIZE: usize = 6;

/// Interpolation method for Bayer mosaics.
///
/// X-Trans mosaics are always interpolated with the Markesteijn algorithm.
///
/// # Usage
/// ```
/// use cfadebayer::DebayerMethod;
///
/// let m: DebayerMethod = "vng".parse().unwrap();
/// assert_eq!(m, DebayerMethod::Vng);
/// assert_eq!(m.id(), "VNG");
/// assert!("AHD".parse::<DebayerMethod>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebayerMethod {
    /// Every 2x2 cell becomes one pixel of a half size image.
    SuperPixel,
    /// Average of the same-coloured neighbours.
    Bilinear,
    /// Variable number of gradients.
    #[default]
    #[serde(rename = "VNG", alias = "Vng")]
    Vng,
}

impl DebayerMethod {
    /// Method identifier, as recorded in the output metadata.
    pub fn id(&self) -> &'static str {
        match self {
            DebayerMethod::SuperPixel => "SuperPixel",
            DebayerMethod::Bilinear => "Bilinear",
            DebayerMethod::Vng => "VNG",
        }
    }
}

impl fmt::Display for DebayerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DebayerMethod {
    type Err = DebayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            DebayerMethod::SuperPixel,
            DebayerMethod::Bilinear,
            DebayerMethod::Vng,
        ]
        .into_iter()
        .find(|m| m.id().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| DebayerError::UnsupportedMethod(s.to_owned()))
    }
}

/// Parameters of [`run_debayer`].
///
/// Deserializes from the parameter identifiers of the Debayer process
/// (`cfaPattern`, `debayerMethod`, `evaluateNoise`, `noiseEvaluationAlgorithm`).
/// Missing fields take their default value.
///
/// # Usage
/// ```
/// use cfadebayer::{BayerPattern, CfaPattern, DebayerMethod, DebayerParameters};
///
/// let params: DebayerParameters =
///     serde_json::from_str(r#"{ "cfaPattern": "GBRG", "debayerMethod": "Bilinear" }"#).unwrap();
/// assert_eq!(params.pattern, Some(CfaPattern::Bayer(BayerPattern::Gbrg)));
/// assert_eq!(params.method, DebayerMethod::Bilinear);
/// assert!(params.evaluate_noise);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebayerParameters {
    /// CFA pattern. `None` (`"Auto"`) takes the pattern from the color space of the mosaic.
    #[serde(rename = "cfaPattern", with = "auto_pattern")]
    pub pattern: Option<CfaPattern>,
    /// Interpolation method for Bayer mosaics.
    #[serde(rename = "debayerMethod")]
    pub method: DebayerMethod,
    /// Noise reduction of Bayer mosaics before interpolation.
    pub fbdd: FbddMode,
    /// Number of Markesteijn passes for X-Trans mosaics, 1 or 2.
    #[serde(rename = "xtransPasses")]
    pub xtrans_passes: usize,
    /// Camera colour space to linear sRGB matrix, used by the X-Trans homogeneity test.
    #[serde(rename = "cameraMatrix")]
    pub camera_matrix: CameraMatrix,
    /// Estimate the noise of the demosaiced image.
    #[serde(rename = "evaluateNoise")]
    pub evaluate_noise: bool,
    /// Noise estimation algorithm.
    #[serde(rename = "noiseEvaluationAlgorithm")]
    pub noise_algorithm: NoiseAlgorithm,
    /// Maximum number of worker threads. `None` uses the available parallelism.
    #[serde(rename = "maxThreads")]
    pub max_threads: Option<usize>,
}

impl Default for DebayerParameters {
    fn default() -> Self {
        DebayerParameters {
            pattern: None,
            method: DebayerMethod::default(),
            fbdd: FbddMode::default(),
            xtrans_passes: 1,
            camera_matrix: CameraMatrix::identity(),
            evaluate_noise: true,
            noise_algorithm: NoiseAlgorithm::default(),
            max_threads: None,
        }
    }
}

mod auto_pattern {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::CfaPattern;

    const AUTO: &str = "Auto";

    pub fn serialize<S: Serializer>(p: &Option<CfaPattern>, s: S) -> Result<S::Ok, S::Error> {
        match p {
            Some(p) => s.serialize_str(&p.id()),
            None => s.serialize_str(AUTO),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<CfaPattern>, D::Error> {
        let s = String::deserialize(d)?;
        if s.eq_ignore_ascii_case(AUTO) {
            Ok(None)
        } else {
            s.parse().map(Some).map_err(D::Error::custom)
        }
    }
}

/// Demosaic a Bayer mosaic.
///
/// # Arguments
/// - `mosaic`: A single channel mosaic, or a colour image whose channel at every
///   pixel is taken from the filter colour there.
/// - `pattern`: The 2x2 pattern at the top left corner of the mosaic.
/// - `method`: The interpolation method.
///
/// # Errors
/// - [`DebayerError::Dimension`] if the mosaic is smaller than 6x6.
pub fn debayer<M: SampleAccess + ?Sized>(
    mosaic: &M,
    pattern: &BayerPattern,
    method: DebayerMethod,
) -> DebayerResult<ImageOwned<f32>> {
    check_size(mosaic, MIN_BAYER_SIZE)?;
    let monitor = StatusMonitor::new();
    let exec = Executor::new(None, &monitor)?;
    let plane = CfaPlane::load(mosaic, |r, c| pattern.color_at(r, c));
    bayer_engine(&plane, pattern, method, &exec)
}

/// Demosaic an X-Trans mosaic with the Markesteijn algorithm.
///
/// # Arguments
/// - `mosaic`: The mosaic, at least 512x512.
/// - `pattern`: The 6x6 pattern at the top left corner of the mosaic.
/// - `camera`: The camera colour space to linear sRGB matrix.
/// - `passes`: 1 for four interpolation directions, 2 for eight.
///
/// # Errors
/// - [`DebayerError::Dimension`] if the mosaic is smaller than 512x512.
/// - [`DebayerError::UnsupportedMethod`] if `passes` is not 1 or 2.
/// - [`DebayerError::CfaValidation`] if the pattern lacks the X-Trans neighbourhood structure.
pub fn interpolate_xtrans<M: SampleAccess + ?Sized>(
    mosaic: &M,
    pattern: &XTransPattern,
    camera: &CameraMatrix,
    passes: usize,
) -> DebayerResult<ImageOwned<f32>> {
    check_size(mosaic, xtrans::TS)?;
    let monitor = StatusMonitor::new();
    let exec = Executor::new(None, &monitor)?;
    let plane = CfaPlane::load(mosaic, |r, c| pattern.color_at(r, c));
    xtrans::run(&plane, pattern, camera, passes, &exec)
}

/// Demosaic a mosaic, with optional noise reduction and noise evaluation.
///
/// Bayer mosaics are filtered with FBDD when `params.fbdd` is enabled and the
/// pattern has diagonal greens, then interpolated with `params.method`. X-Trans
/// mosaics are interpolated with `params.xtrans_passes` Markesteijn passes.
///
/// Progress is reported to `monitor`, which can also cancel the call. Noise
/// evaluation is a stage of its own, with one work item per channel.
///
/// # Errors
/// - [`DebayerError::Dimension`] if the mosaic is too small for the method.
/// - [`DebayerError::Cancelled`] if `monitor` was cancelled.
/// - Any error of [`debayer`] or [`interpolate_xtrans`].
#[instrument(level = "info", skip_all, fields(pattern = %pattern, method = %params.method))]
pub fn run_debayer<M: SampleAccess + ?Sized>(
    mosaic: &M,
    pattern: &CfaPattern,
    params: &DebayerParameters,
    monitor: Option<&StatusMonitor>,
) -> DebayerResult<DebayerOutput> {
    let local = StatusMonitor::new();
    let monitor = monitor.unwrap_or(&local);
    let exec = Executor::new(params.max_threads, monitor)?;

    let (image, method_id) = match pattern {
        CfaPattern::Bayer(p) => {
            check_size(mosaic, MIN_BAYER_SIZE)?;
            let mut plane = CfaPlane::load(mosaic, |r, c| p.color_at(r, c));
            if params.fbdd != FbddMode::Off {
                if p.is_standard() {
                    let filtered = fbdd::apply(&plane, p, params.fbdd)?;
                    plane = CfaPlane::load(&filtered, |r, c| p.color_at(r, c));
                } else {
                    warn!(pattern = %p, "FBDD needs diagonal greens, skipped");
                }
            }
            let image = bayer_engine(&plane, p, params.method, &exec)?;
            (image, params.method.id().to_owned())
        }
        CfaPattern::XTrans(p) => {
            check_size(mosaic, xtrans::TS)?;
            if params.fbdd != FbddMode::Off {
                warn!("FBDD applies to Bayer mosaics only, skipped");
            }
            let plane = CfaPlane::load(mosaic, |r, c| p.color_at(r, c));
            let image = xtrans::run(&plane, p, &params.camera_matrix, params.xtrans_passes, &exec)?;
            (image, format!("Markesteijn-{}", params.xtrans_passes))
        }
    };
    info!(
        width = image.width(),
        height = image.height(),
        method = %method_id,
        "demosaiced"
    );

    let mut out = DebayerOutput::new(image, pattern.id(), method_id);
    if params.evaluate_noise {
        let noise = noise_estimates(out.image(), params.noise_algorithm, &exec)?;
        info!(
            r = noise[0].sigma,
            g = noise[1].sigma,
            b = noise[2].sigma,
            algorithm = %noise[0].algorithm,
            "noise estimates"
        );
        out.set_noise(noise);
    }
    Ok(out)
}

/// Per channel noise estimates on the worker pool of the call, one work item per channel.
fn noise_estimates(
    image: &ImageOwned<f32>,
    algorithm: NoiseAlgorithm,
    exec: &Executor,
) -> DebayerResult<[NoiseEstimate; 3]> {
    let est = exec.tiles(&[0usize, 1, 2], |&c| evaluate_channel(image, algorithm, c))?;
    Ok([est[0], est[1], est[2]])
}

fn check_size<M: ImageProps + ?Sized>(mosaic: &M, min: usize) -> DebayerResult<()> {
    let (width, height) = (mosaic.width(), mosaic.height());
    if width < min || height < min {
        Err(DebayerError::Dimension {
            width,
            height,
            min_width: min,
            min_height: min,
        })
    } else {
        Ok(())
    }
}

fn bayer_engine(
    plane: &CfaPlane,
    pattern: &BayerPattern,
    method: DebayerMethod,
    exec: &Executor,
) -> DebayerResult<ImageOwned<f32>> {
    match method {
        DebayerMethod::SuperPixel => superpixel::run(plane, pattern, exec),
        DebayerMethod::Bilinear => bilinear::run(plane, pattern, exec),
        DebayerMethod::Vng => vng::run(plane, pattern, exec),
    }
}

/// Demosaic an image container.
///
/// The CFA pattern is taken from the parameters, or from the color space of the
/// image when the parameters leave it on `Auto`.
pub trait Debayer {
    /// Demosaic the image with [`run_debayer`].
    ///
    /// # Errors
    /// - [`DebayerError::InvalidPattern`] if no pattern is given and the image
    ///   carries none.
    /// - Any error of [`run_debayer`].
    fn debayer(&self, params: &DebayerParameters) -> DebayerResult<DebayerOutput>;
}

pub(crate) fn resolve_pattern<M: ImageProps + ?Sized>(
    mosaic: &M,
    params: &DebayerParameters,
) -> DebayerResult<CfaPattern> {
    params
        .pattern
        .or_else(|| mosaic.color_space().cfa_pattern())
        .ok_or_else(|| DebayerError::InvalidPattern("no CFA pattern for the image".to_owned()))
}

impl<T: PixelStor> Debayer for ImageOwned<T> {
    fn debayer(&self, params: &DebayerParameters) -> DebayerResult<DebayerOutput> {
        let pattern = resolve_pattern(self, params)?;
        run_debayer(self, &pattern, params, None)
    }
}

impl Debayer for DynamicImageOwned {
    fn debayer(&self, params: &DebayerParameters) -> DebayerResult<DebayerOutput> {
        let pattern = resolve_pattern(self, params)?;
        run_debayer(self, &pattern, params, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{evaluate_noise, ColorSpace};

    #[test]
    fn test_noise_stage() {
        let data = (0..3 * 32 * 32).map(|i| ((i * 7) % 13) as f32 / 13.0).collect();
        let img = ImageOwned::from_owned(data, 32, 32, ColorSpace::Rgb).unwrap();
        let monitor = StatusMonitor::new();
        let exec = Executor::new(Some(1), &monitor).unwrap();
        let est = noise_estimates(&img, NoiseAlgorithm::Mrs, &exec).unwrap();
        assert_eq!(est, evaluate_noise(&img, NoiseAlgorithm::Mrs));
        assert_eq!((monitor.total(), monitor.count()), (3, 3));

        monitor.cancel();
        assert_eq!(
            noise_estimates(&img, NoiseAlgorithm::Mrs, &exec).unwrap_err(),
            DebayerError::Cancelled
        );
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn test_method_parse() {
        for m in [
            DebayerMethod::SuperPixel,
            DebayerMethod::Bilinear,
            DebayerMethod::Vng,
        ] {
            assert_eq!(m.id().parse::<DebayerMethod>(), Ok(m));
            assert_eq!(m.to_string().to_lowercase().parse::<DebayerMethod>(), Ok(m));
        }
        assert_eq!(
            "Cubic".parse::<DebayerMethod>(),
            Err(DebayerError::UnsupportedMethod("Cubic".into()))
        );
    }

    #[test]
    fn test_parameters_serde() {
        let params = DebayerParameters::default();
        let s = serde_json::to_string(&params).unwrap();
        assert!(s.contains("\"cfaPattern\":\"Auto\""));
        assert!(s.contains("\"debayerMethod\":\"VNG\""));
        let back: DebayerParameters = serde_json::from_str(&s).unwrap();
        assert_eq!(back, params);

        let params: DebayerParameters = serde_json::from_str(
            r#"{"cfaPattern":"GGRGGBGGBGGRBRGRBGGGBGGRGGRGGBRBGBRG","noiseEvaluationAlgorithm":"KSigma","xtransPasses":2}"#,
        )
        .unwrap();
        assert_eq!(
            params.pattern,
            Some(CfaPattern::XTrans(XTransPattern::default()))
        );
        assert_eq!(params.noise_algorithm, NoiseAlgorithm::KSigma);
        assert_eq!(params.xtrans_passes, 2);
        assert!(serde_json::from_str::<DebayerParameters>(r#"{"cfaPattern":"RGGX"}"#).is_err());
    }

    #[test]
    fn test_small_mosaic() {
        let img = ImageOwned::from_owned(vec![0u8; 25], 5, 5, ColorSpace::Gray).unwrap();
        assert!(matches!(
            debayer(&img, &BayerPattern::Rggb, DebayerMethod::Bilinear),
            Err(DebayerError::Dimension { min_width: 6, .. })
        ));
    }

    #[test]
    fn test_resolve_pattern() {
        let img = ImageOwned::from_owned(vec![0u8; 64], 8, 8, ColorSpace::Gray).unwrap();
        let params = DebayerParameters::default();
        assert!(matches!(
            img.debayer(&params),
            Err(DebayerError::InvalidPattern(_))
        ));
        let img = ImageOwned::from_owned(
            vec![0u8; 64],
            8,
            8,
            ColorSpace::Bayer(BayerPattern::Bggr),
        )
        .unwrap();
        assert_eq!(
            resolve_pattern(&img, &params),
            Ok(CfaPattern::Bayer(BayerPattern::Bggr))
        );
        let params = DebayerParameters {
            pattern: Some(BayerPattern::Grbg.into()),
            evaluate_noise: false,
            ..Default::default()
        };
        let out = img.debayer(&params).unwrap();
        assert_eq!(out.pattern_id(), "GRBG");
        assert_eq!(out.method_id(), "VNG");
    }
}
