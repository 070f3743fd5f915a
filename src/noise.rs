//! Gaussian noise estimation of demosaiced images.
//!
//! Both estimators work on the à trous wavelet transform of one channel, computed
//! with the separable B3 spline kernel and mirrored borders.
//!
//! # Usage
//! ```
//! use cfadebayer::{KSigmaNoise, NoiseEvaluator};
//!
//! let flat = vec![0.25f32; 32 * 32];
//! let est = KSigmaNoise.evaluate(&flat, 32, 32);
//! assert_eq!(est.sigma, 0.0);
//! ```
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::ImageOwned;

const B3: [f64; 5] = [1.0 / 16.0, 1.0 / 4.0, 3.0 / 8.0, 1.0 / 4.0, 1.0 / 16.0];

/// Standard deviation of the B3 spline wavelet layers of unit white noise.
pub const B3_SPLINE_KJ: [f64; 10] = [
    0.8907, 0.2007, 0.0856, 0.0413, 0.0205, 0.0103, 0.0052, 0.0026, 0.0013, 0.0007,
];

const KSIGMA_K: f64 = 3.0;
const KSIGMA_EPS: f64 = 0.01;
const KSIGMA_ITERATIONS: usize = 10;

const MRS_LOW: f64 = 0.00002;
const MRS_HIGH: f64 = 0.99998;
const MRS_K: f64 = 3.0;
const MRS_MIN_FRACTION: f64 = 0.01;
/// Systematic bias of the MRS estimate.
const MRS_BIAS: f64 = 0.974;

/// Noise estimation algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseAlgorithm {
    /// Iterative k-sigma clipping of the first wavelet layer.
    #[serde(rename = "KSigma", alias = "K-Sigma")]
    KSigma,
    /// Multiresolution support, falling back to [`NoiseAlgorithm::KSigma`].
    #[default]
    #[serde(rename = "MRS", alias = "Mrs")]
    Mrs,
}

impl NoiseAlgorithm {
    /// Name of the algorithm, as recorded in the image metadata.
    pub fn name(&self) -> &'static str {
        match self {
            NoiseAlgorithm::KSigma => "K-Sigma",
            NoiseAlgorithm::Mrs => "MRS",
        }
    }
}

impl Display for NoiseAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Noise estimate of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseEstimate {
    /// Standard deviation of the Gaussian noise, on the `[0, 1]` scale.
    pub sigma: f64,
    /// Fraction of the pixels identified as noise.
    pub fraction: f64,
    /// Algorithm that produced the estimate.
    pub algorithm: NoiseAlgorithm,
}

/// Estimate the Gaussian noise of a single channel image.
pub trait NoiseEvaluator {
    /// Estimate the noise of `data`, a row-major `width` x `height` image with
    /// samples on the `[0, 1]` scale.
    fn evaluate(&self, data: &[f32], width: usize, height: usize) -> NoiseEstimate;
}

/// K-Sigma noise estimator.
#[derive(Clone, Copy, Debug, Default)]
pub struct KSigmaNoise;

/// Multiresolution support noise estimator.
#[derive(Clone, Copy, Debug, Default)]
pub struct MrsNoise;

impl NoiseEvaluator for KSigmaNoise {
    fn evaluate(&self, data: &[f32], width: usize, height: usize) -> NoiseEstimate {
        let input: Vec<f64> = data.iter().map(|&v| v as f64).collect();
        let (layers, _) = atrous(input, width, height, 1);
        let (sigma, fraction) = ksigma_estimate(&layers[0]);
        NoiseEstimate {
            sigma,
            fraction,
            algorithm: NoiseAlgorithm::KSigma,
        }
    }
}

impl NoiseEvaluator for MrsNoise {
    fn evaluate(&self, data: &[f32], width: usize, height: usize) -> NoiseEstimate {
        let input: Vec<f64> = data.iter().map(|&v| v as f64).collect();
        let mut fallback = (0.0, 0.0);
        for n in (2..=4).rev() {
            let (layers, residual) = atrous(input.clone(), width, height, n);
            if n == 4 {
                fallback = ksigma_estimate(&layers[0]);
            }
            let (sigma, count) = mrs(&input, &layers, &residual, fallback.0);
            let fraction = count as f64 / input.len().max(1) as f64;
            debug!(layers = n, sigma, fraction, "multiresolution support");
            if sigma > 0.0 && fraction >= MRS_MIN_FRACTION {
                return NoiseEstimate {
                    sigma,
                    fraction,
                    algorithm: NoiseAlgorithm::Mrs,
                };
            }
        }
        NoiseEstimate {
            sigma: fallback.0,
            fraction: fallback.1,
            algorithm: NoiseAlgorithm::KSigma,
        }
    }
}

/// Estimate the noise of every channel of a demosaiced image.
///
/// Single channel images repeat the estimate of their only channel.
#[instrument(level = "debug", skip(image))]
pub fn evaluate_noise(image: &ImageOwned<f32>, algorithm: NoiseAlgorithm) -> [NoiseEstimate; 3] {
    [0, 1, 2].map(|c| evaluate_channel(image, algorithm, c))
}

/// Estimate the noise of channel `c`, clamped to the channels of `image`.
pub(crate) fn evaluate_channel(
    image: &ImageOwned<f32>,
    algorithm: NoiseAlgorithm,
    c: usize,
) -> NoiseEstimate {
    let (w, h, channels) = (image.width(), image.height(), image.channels() as usize);
    let c = c.min(channels.saturating_sub(1));
    let plane: Vec<f32> = image
        .as_slice()
        .iter()
        .skip(c)
        .step_by(channels.max(1))
        .copied()
        .collect();
    match algorithm {
        NoiseAlgorithm::KSigma => KSigmaNoise.evaluate(&plane, w, h),
        NoiseAlgorithm::Mrs => MrsNoise.evaluate(&plane, w, h),
    }
}

/// Reflect an index into `0..n`.
#[inline]
fn mirror(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * (n - 1) - i;
        } else {
            return i as usize;
        }
    }
}

/// B3 spline smoothing with holes `dist` pixels apart.
fn smooth(data: &[f64], width: usize, height: usize, dist: usize) -> Vec<f64> {
    let mut tmp = vec![0f64; data.len()];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for x in 0..width {
            tmp[y * width + x] = B3
                .iter()
                .enumerate()
                .map(|(k, &c)| {
                    let xx = mirror(x as isize + (k as isize - 2) * dist as isize, width);
                    c * row[xx]
                })
                .sum();
        }
    }
    let mut out = vec![0f64; data.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = B3
                .iter()
                .enumerate()
                .map(|(k, &c)| {
                    let yy = mirror(y as isize + (k as isize - 2) * dist as isize, height);
                    c * tmp[yy * width + x]
                })
                .sum();
        }
    }
    out
}

/// Wavelet layers `0..n` and the residual.
fn atrous(data: Vec<f64>, width: usize, height: usize, n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut layers = Vec::with_capacity(n);
    let mut c = data;
    for j in 0..n {
        let next = smooth(&c, width, height, 1 << j);
        layers.push(c.iter().zip(&next).map(|(a, b)| a - b).collect());
        c = next;
    }
    (layers, c)
}

/// Sample standard deviation. Zero for less than two values.
fn stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// K-sigma clipped standard deviation of the first wavelet layer, scaled to the
/// image noise, and the fraction of retained coefficients.
fn ksigma_estimate(layer: &[f64]) -> (f64, f64) {
    let total = layer.len().max(1) as f64;
    let mut values = layer.to_vec();
    let mut s0 = 0.0;
    let mut it = 0;
    loop {
        let fraction = values.len() as f64 / total;
        if values.len() < 2 {
            return (0.0, fraction);
        }
        let s = stddev(&values);
        if 1.0 + s == 1.0 {
            return (0.0, fraction);
        }
        it += 1;
        if it == KSIGMA_ITERATIONS || (it > 1 && (s0 - s) / s0 < KSIGMA_EPS) {
            return (s / B3_SPLINE_KJ[0], fraction);
        }
        s0 = s;
        let ks = KSIGMA_K * s;
        values.retain(|v| v.abs() < ks);
    }
}

/// Multiresolution support estimate, starting from `sigma`. Returns the estimate
/// and the number of noise pixels.
fn mrs(input: &[f64], layers: &[Vec<f64>], residual: &[f64], mut sigma: f64) -> (f64, usize) {
    if input.len() < 9 {
        return (0.0, 0);
    }
    if 1.0 + sigma == 1.0 {
        sigma = stddev(input);
        if 1.0 + sigma == 1.0 {
            return (0.0, 0);
        }
    }
    let mut it = 0;
    loop {
        let ks: Vec<f64> = B3_SPLINE_KJ[..layers.len()]
            .iter()
            .map(|kj| MRS_K * sigma * kj)
            .collect();
        let noise: Vec<f64> = input
            .iter()
            .enumerate()
            .filter(|&(k, &v)| {
                v > MRS_LOW
                    && v < MRS_HIGH
                    && layers.iter().zip(&ks).all(|(w, &t)| w[k].abs() <= t)
            })
            .map(|(k, &v)| v - residual[k])
            .collect();
        if noise.len() < 2 {
            return (0.0, 0);
        }
        let s = stddev(&noise);
        if 1.0 + s == 1.0 {
            return (0.0, 0);
        }
        let e = (s - sigma).abs() / s;
        sigma = s;
        if e < 1e-4 {
            return (sigma / MRS_BIAS, noise.len());
        }
        if it > 16 {
            return (0.0, 0);
        }
        it += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColorSpace;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn noisy(w: usize, h: usize, mean: f64, sigma: f64, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(mean, sigma).unwrap();
        (0..w * h)
            .map(|_| normal.sample(&mut rng) as f32)
            .collect()
    }

    #[test]
    fn test_mirror() {
        assert_eq!(mirror(-1, 5), 1);
        assert_eq!(mirror(-2, 5), 2);
        assert_eq!(mirror(5, 5), 3);
        assert_eq!(mirror(6, 5), 2);
        assert_eq!(mirror(3, 5), 3);
        assert_eq!(mirror(-7, 3), 1);
        assert_eq!(mirror(4, 1), 0);
    }

    #[test]
    fn test_atrous_sums_to_input() {
        let data: Vec<f64> = (0..24 * 20).map(|i| ((i * 37) % 101) as f64 / 101.0).collect();
        let (layers, residual) = atrous(data.clone(), 24, 20, 3);
        for (k, &v) in data.iter().enumerate() {
            let sum: f64 = layers.iter().map(|w| w[k]).sum::<f64>() + residual[k];
            assert!((sum - v).abs() < 1e-12);
        }
    }

    #[test]
    fn test_flat_is_noiseless() {
        let flat = vec![0.4f32; 48 * 40];
        let ks = KSigmaNoise.evaluate(&flat, 48, 40);
        assert_eq!(ks.sigma, 0.0);
        assert_eq!(ks.algorithm, NoiseAlgorithm::KSigma);
        let mrs = MrsNoise.evaluate(&flat, 48, 40);
        assert_eq!(mrs.sigma, 0.0);
        assert_eq!(mrs.algorithm, NoiseAlgorithm::KSigma);
    }

    #[test]
    fn test_gaussian_noise() {
        let data = noisy(128, 128, 0.5, 0.02, 7);
        let ks = KSigmaNoise.evaluate(&data, 128, 128);
        assert!((ks.sigma - 0.02).abs() < 0.004, "{ks:?}");
        assert!(ks.fraction > 0.9);
        let mrs = MrsNoise.evaluate(&data, 128, 128);
        assert_eq!(mrs.algorithm, NoiseAlgorithm::Mrs);
        assert!((mrs.sigma - 0.02).abs() < 0.004, "{mrs:?}");
        assert!(mrs.fraction >= MRS_MIN_FRACTION);
    }

    #[test]
    fn test_evaluate_channels() {
        let (w, h) = (128, 128);
        let sigmas = [0.01, 0.03, 0.0];
        let planes: Vec<Vec<f32>> = sigmas
            .iter()
            .enumerate()
            .map(|(c, &s)| {
                if s > 0.0 {
                    noisy(w, h, 0.5, s, c as u64 + 11)
                } else {
                    vec![0.5; w * h]
                }
            })
            .collect();
        let data = (0..w * h).flat_map(|i| planes.iter().map(move |p| p[i])).collect();
        let img = ImageOwned::from_owned(data, w, h, ColorSpace::Rgb).unwrap();
        let est = evaluate_noise(&img, NoiseAlgorithm::KSigma);
        assert!((est[0].sigma - 0.01).abs() < 0.002, "{:?}", est[0]);
        assert!((est[1].sigma - 0.03).abs() < 0.006, "{:?}", est[1]);
        assert_eq!(est[2].sigma, 0.0);

        let gray = ImageOwned::from_owned(planes[1].clone(), w, h, ColorSpace::Gray).unwrap();
        let est = evaluate_noise(&gray, NoiseAlgorithm::KSigma);
        assert_eq!(est[0], est[2]);
        assert_eq!(est[1], evaluate_channel(&gray, NoiseAlgorithm::KSigma, 1));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(NoiseAlgorithm::default(), NoiseAlgorithm::Mrs);
        assert_eq!(NoiseAlgorithm::KSigma.to_string(), "K-Sigma");
        let a: NoiseAlgorithm = serde_json::from_str("\"K-Sigma\"").unwrap();
        assert_eq!(a, NoiseAlgorithm::KSigma);
        assert_eq!(serde_json::to_string(&NoiseAlgorithm::Mrs).unwrap(), "\"MRS\"");
    }
}
