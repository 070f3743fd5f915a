//! Variable Number of Gradients (VNG) demosaicing.
//!
//! Eight directional gradients are measured over the 5x5 neighbourhood of every
//! pixel. The directions with a gradient below an adaptive threshold vote for the
//! colour differences between the missing channels and the sampled one. Opposite
//! directions vote in pairs unless one of them crosses an edge, which keeps smooth
//! gradients in the colour difference from biasing the estimate.

use itertools::{iproduct, Itertools};
use tracing::instrument;

use crate::{ColorSpace, ImageOwned};

use super::{
    border::interpolate_pixel, parallel::Executor, raster::CfaPlane, BayerPattern, Channel,
    DebayerResult,
};

const N: usize = 0;
const E: usize = 1;
const S: usize = 2;
const W: usize = 3;
const NE: usize = 4;
const SE: usize = 5;
const NW: usize = 6;
const SW: usize = 7;

/// Window positions averaged along each direction, green sample at the centre.
const GREEN_CENTER: [&[usize]; 8] = [
    &[1, 2, 3, 7, 11, 12, 13],
    &[7, 9, 12, 13, 14, 17, 19],
    &[11, 12, 13, 17, 21, 22, 23],
    &[5, 7, 10, 11, 12, 15, 17],
    &[3, 7, 8, 9, 13],
    &[13, 17, 18, 19, 23],
    &[1, 5, 6, 7, 11],
    &[11, 15, 16, 17, 21],
];

/// Window positions averaged along each direction, red or blue sample at the centre.
const OTHER_CENTER: [&[usize]; 8] = [
    &[2, 6, 7, 8, 12],
    &[8, 12, 13, 14, 18],
    &[12, 16, 17, 18, 22],
    &[6, 10, 11, 12, 16],
    &[3, 4, 7, 8, 9, 12, 13],
    &[12, 13, 17, 18, 19, 23, 24],
    &[0, 1, 5, 6, 7, 11, 12],
    &[11, 12, 15, 16, 17, 20, 21],
];

const K1: f64 = 1.5;
const K2: f64 = 0.5;

/// Opposite directions, admitted together so the colour differences stay centred.
const OPPOSITE: [(usize, usize); 4] = [(N, S), (E, W), (NE, SW), (SE, NW)];

/// A direction is admitted alone only when its opposite gradient exceeds it by this factor.
const EDGE_RATIO: f64 = 2.0;

#[instrument(level = "debug", skip_all, fields(pattern = %pattern))]
pub(crate) fn run(
    plane: &CfaPlane,
    pattern: &BayerPattern,
    exec: &Executor,
) -> DebayerResult<ImageOwned<f32>> {
    let (w, h) = (plane.width, plane.height);
    let cfa = |r: usize, c: usize| pattern.color_at(r, c);
    let mut out = vec![0f32; 3 * w * h];
    exec.rows(&mut out, w, |y, row| {
        let interior_row = (2..h - 2).contains(&y);
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let rgb = if interior_row && (2..w - 2).contains(&x) {
                interpolate(plane, x, y, &cfa)
            } else {
                interpolate_pixel(plane, x, y, &cfa)
            };
            px.copy_from_slice(&rgb);
        }
    })?;
    Ok(ImageOwned::new(out, w, h, ColorSpace::Rgb)?)
}

fn interpolate<F>(plane: &CfaPlane, x: usize, y: usize, cfa: &F) -> [f32; 3]
where
    F: Fn(usize, usize) -> Channel,
{
    let mut v = [0f64; 25];
    let mut ch = [0usize; 25];
    for (i, (dy, dx)) in iproduct!(0..5, 0..5).enumerate() {
        let (yy, xx) = (y + dy - 2, x + dx - 2);
        v[i] = plane.at(xx, yy) as f64;
        ch[i] = cfa(yy, xx).index();
    }
    let own = ch[12];
    let green_center = own == Channel::Green.index();

    let g = gradients(&v, green_center);
    let Some((min, max)) = g.iter().copied().minmax().into_option() else {
        return interpolate_pixel(plane, x, y, cfa);
    };
    let threshold = K1 * min + K2 * (max - min) + 1e-10;
    let table = if green_center {
        &GREEN_CENTER
    } else {
        &OTHER_CENTER
    };

    let admitted = admitted_directions(&g, threshold);

    // per channel: sum of directional means, number of contributing directions
    let mut sums = [0f64; 3];
    let mut counts = [0u32; 3];
    for d in (0..8).filter(|&d| admitted[d]) {
        let mut partial = [0f64; 3];
        let mut n = [0u32; 3];
        for &i in table[d] {
            partial[ch[i]] += v[i];
            n[ch[i]] += 1;
        }
        for c in 0..3 {
            if n[c] > 0 {
                sums[c] += partial[c] / n[c] as f64;
                counts[c] += 1;
            }
        }
    }

    let mut out = [v[12] as f32; 3];
    let mut fallback = None;
    for c in (0..3).filter(|&c| c != own) {
        if counts[c] == 0 || counts[own] == 0 {
            let px = *fallback.get_or_insert_with(|| interpolate_pixel(plane, x, y, cfa));
            out[c] = px[c];
            continue;
        }
        let diff = sums[c] / counts[c] as f64 - sums[own] / counts[own] as f64;
        out[c] = (v[12] + diff).clamp(0.0, 1.0) as f32;
    }
    out
}

/// Selects the directions that vote. Opposite directions enter as a pair when both
/// pass the threshold; one side of a pair enters alone only across a strong edge.
/// When no direction qualifies, the pairs are thresholded on their summed gradients.
fn admitted_directions(g: &[f64; 8], threshold: f64) -> [bool; 8] {
    let mut admitted = [false; 8];
    for &(a, b) in OPPOSITE.iter() {
        match (g[a] <= threshold, g[b] <= threshold) {
            (true, true) => {
                admitted[a] = true;
                admitted[b] = true;
            }
            (true, false) if g[b] > EDGE_RATIO * g[a] + 1e-10 => admitted[a] = true,
            (false, true) if g[a] > EDGE_RATIO * g[b] + 1e-10 => admitted[b] = true,
            _ => {}
        }
    }
    if admitted.iter().any(|&a| a) {
        return admitted;
    }
    let pair = OPPOSITE.map(|(a, b)| g[a] + g[b]);
    let Some((min, max)) = pair.iter().copied().minmax().into_option() else {
        return admitted;
    };
    let threshold = K1 * min + K2 * (max - min) + 1e-10;
    for (&(a, b), &grad) in OPPOSITE.iter().zip(pair.iter()) {
        if grad <= threshold {
            admitted[a] = true;
            admitted[b] = true;
        }
    }
    admitted
}

#[inline]
fn gradients(v: &[f64; 25], green_center: bool) -> [f64; 8] {
    let d = |a: usize, b: usize| (v[a] - v[b]).abs();
    let mut g = [0f64; 8];
    g[N] = d(7, 17) + d(2, 12) + d(6, 16) / 2. + d(8, 18) / 2. + d(1, 11) / 2. + d(3, 13) / 2.;
    g[E] = d(13, 11) + d(14, 12) + d(8, 6) / 2. + d(18, 16) / 2. + d(9, 7) / 2. + d(19, 17) / 2.;
    g[S] = d(17, 7) + d(22, 12) + d(16, 6) / 2. + d(18, 8) / 2. + d(21, 11) / 2. + d(23, 13) / 2.;
    g[W] = d(11, 13) + d(10, 12) + d(6, 8) / 2. + d(16, 18) / 2. + d(5, 7) / 2. + d(15, 17) / 2.;
    if green_center {
        g[NE] = d(8, 16) + d(4, 12) + d(3, 11) + d(9, 17);
        g[SE] = d(18, 6) + d(24, 12) + d(23, 11) + d(19, 7);
        g[NW] = d(6, 18) + d(0, 12) + d(1, 13) + d(5, 17);
        g[SW] = d(16, 8) + d(20, 12) + d(21, 13) + d(15, 7);
    } else {
        g[NE] = d(8, 16) + d(4, 12) + d(7, 11) / 2. + d(13, 17) / 2. + d(3, 7) / 2. + d(9, 13) / 2.;
        g[SE] = d(18, 6) + d(24, 12) + d(13, 7) / 2. + d(17, 11) / 2. + d(19, 13) + d(23, 17) / 2.;
        g[NW] = d(6, 18) + d(0, 12) + d(7, 13) / 2. + d(11, 17) / 2. + d(1, 7) / 2. + d(5, 11) / 2.;
        g[SW] = d(16, 8) + d(20, 12) + d(11, 7) / 2. + d(17, 13) / 2. + d(15, 11) + d(21, 17) / 2.;
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_gradients() {
        let v = [0.3; 25];
        assert_eq!(gradients(&v, true), [0.0; 8]);
        assert_eq!(gradients(&v, false), [0.0; 8]);
    }

    #[test]
    fn test_vertical_edge() {
        // left half dark, right half bright: E and W see the edge, N and S do not
        let mut v = [0.1; 25];
        for (i, px) in v.iter_mut().enumerate() {
            if i % 5 >= 3 {
                *px = 0.9;
            }
        }
        let g = gradients(&v, true);
        assert_eq!(g[N], 0.0);
        assert_eq!(g[S], 0.0);
        assert!(g[E] > 1.0);
        assert!(g[W] > 1.0);
    }

    #[test]
    fn test_admission() {
        assert_eq!(admitted_directions(&[0.0; 8], 1e-10), [true; 8]);

        // crossing an edge on the east side only: west may vote alone
        let mut g = [1.0; 8];
        g[N] = 0.1;
        g[S] = 0.1;
        g[W] = 0.2;
        g[E] = 3.0;
        let a = admitted_directions(&g, 0.25);
        assert!(a[N] && a[S] && a[W]);
        assert!(!a[E] && !a[NE] && !a[SW]);

        // a mild slope keeps west out when east is close behind
        g[E] = 0.3;
        let a = admitted_directions(&g, 0.25);
        assert!(a[N] && a[S]);
        assert!(!a[W] && !a[E]);
    }

    #[test]
    fn test_admission_pair_fallback() {
        // every direction passes, every opposite fails: pairs are ranked on their sums
        let g = [0.1, 0.15, 0.18, 0.12, 0.5, 0.6, 0.55, 0.45];
        let a = admitted_directions(&g, 0.11);
        assert_eq!(a, [true, true, true, true, false, false, false, false]);
    }

    #[test]
    fn test_smooth_beats_bilinear() {
        // luminance correlated sinusoid sampled through every layout
        let (w, h) = (64, 48);
        let scene = |x: usize, y: usize| {
            let l = 0.5 + 0.3 * (0.12 * x as f64).sin() * (0.09 * y as f64).cos();
            let hue = 0.05 * (0.05 * x as f64 + 0.04 * y as f64).sin();
            [0.9 * l + hue, l, 0.7 * l - hue]
        };
        for pattern in BayerPattern::ALL {
            let cfa = |r: usize, c: usize| pattern.color_at(r, c);
            let data = (0..w * h)
                .map(|i| scene(i % w, i / w)[cfa(i / w, i % w).index()] as f32)
                .collect();
            let plane = CfaPlane {
                data,
                width: w,
                height: h,
            };
            let (mut vng, mut bl) = (0f64, 0f64);
            for (x, y) in iproduct!(4..w - 4, 4..h - 4) {
                let truth = scene(x, y);
                let a = interpolate(&plane, x, y, &cfa);
                let b = interpolate_pixel(&plane, x, y, &cfa);
                for c in 0..3 {
                    vng += (a[c] as f64 - truth[c]).abs();
                    bl += (b[c] as f64 - truth[c]).abs();
                }
            }
            assert!(vng <= bl, "{pattern}: VNG {vng} > bilinear {bl}");
        }
    }

    #[test]
    fn test_interior_flat() {
        let (w, h) = (8, 8);
        let pattern = BayerPattern::Gbrg;
        let colour = [0.2f32, 0.5, 0.8];
        let data = (0..w * h)
            .map(|i| colour[pattern.color_at(i / w, i % w).index()])
            .collect();
        let plane = CfaPlane {
            data,
            width: w,
            height: h,
        };
        let cfa = |r: usize, c: usize| pattern.color_at(r, c);
        for (x, y) in iproduct!(2..w - 2, 2..h - 2) {
            let px = interpolate(&plane, x, y, &cfa);
            for c in 0..3 {
                assert!((px[c] - colour[c]).abs() < 1e-6, "({x}, {y}) {px:?}");
            }
        }
    }
}
