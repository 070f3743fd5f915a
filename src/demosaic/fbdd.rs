//! Fake Before Demosaicing Denoising (FBDD).
//!
//! The mosaic is demosaiced once with a fast directional method, and every sample is
//! then clamped to the range of the values interpolated for its colour at the four
//! orthogonal neighbours. Impulse noise, which no neighbour can support, is flattened.
//! The filtered mosaic is handed to the regular Bayer engines.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{ColorSpace, ImageOwned};

use super::{border::border_interpolate, raster::CfaPlane, BayerPattern, DebayerResult};

/// Strength of the FBDD noise reduction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FbddMode {
    /// No noise reduction.
    #[default]
    Off,
    /// Green interpolation, chroma interpolation and the sample correction.
    Reduced,
    /// [`FbddMode::Reduced`], followed by two chroma outlier corrections in an
    /// L/C/H colour space.
    Full,
}

/// Margin left uncorrected, where the chroma interpolation has no support.
const MARGIN: usize = 7;

#[inline(always)]
fn clip(v: f64) -> u16 {
    v.round().clamp(0.0, 65535.0) as u16
}

struct Fbdd<'p> {
    img: Vec<[u16; 3]>,
    w: usize,
    h: usize,
    pattern: &'p BayerPattern,
}

/// Filter a standard (diagonal green) Bayer mosaic.
#[instrument(level = "debug", skip_all, fields(mode = ?mode))]
pub(crate) fn apply(
    plane: &CfaPlane,
    pattern: &BayerPattern,
    mode: FbddMode,
) -> DebayerResult<ImageOwned<u16>> {
    let (w, h) = (plane.width, plane.height);
    let img = plane
        .to_u16()
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let mut px = [0; 3];
            px[pattern.color_at(i / w, i % w).index()] = v;
            px
        })
        .collect();
    let mut f = Fbdd {
        img,
        w,
        h,
        pattern,
    };
    if mode != FbddMode::Off {
        border_interpolate(&mut f.img, w, h, 4, |r, c| pattern.color_at(r, c));
        f.green();
        f.color_full();
        f.correction();
    }
    if mode == FbddMode::Full {
        f.color();
        let mut lch = f.to_lch();
        correction2(&mut lch, w, h);
        correction2(&mut lch, w, h);
        f.from_lch(&lch);
    }
    let out = f
        .img
        .iter()
        .enumerate()
        .map(|(i, px)| px[f.fc(i / w, i % w)])
        .collect();
    Ok(ImageOwned::new(out, w, h, ColorSpace::Bayer(*pattern))?)
}

impl Fbdd<'_> {
    #[inline(always)]
    fn fc(&self, row: usize, col: usize) -> usize {
        self.pattern.color_at(row, col).index()
    }

    #[inline(always)]
    fn at(&self, i: usize, off: isize, c: usize) -> f64 {
        self.img[i.wrapping_add_signed(off)][c] as f64
    }

    /// Green at red and blue sites, from four directional estimates weighted by
    /// their smoothness, clamped to the surrounding greens.
    fn green(&mut self) {
        let (w, h) = (self.w, self.h);
        let u = w as isize;
        let (v, w3, x4, y5) = (2 * u, 3 * u, 4 * u, 5 * u);
        for row in 5..h.saturating_sub(5) {
            let mut col = 5 + (self.fc(row, 1) & 1);
            let c = self.fc(row, col);
            while col + 5 < w {
                let i = row * w + col;
                let g = |o: isize| self.at(i, o, 1);
                let s = |o: isize| self.at(i, o, c);
                let weights = [
                    1.0 / (1.0 + (g(-u) - g(-w3)).abs() + (g(-w3) - g(y5)).abs()),
                    1.0 / (1.0 + (g(1) - g(3)).abs() + (g(3) - g(-5)).abs()),
                    1.0 / (1.0 + (g(-1) - g(-3)).abs() + (g(-3) - g(5)).abs()),
                    1.0 / (1.0 + (g(u) - g(w3)).abs() + (g(w3) - g(-y5)).abs()),
                ];
                let estimate = |a: isize, b: isize, d: isize, e: isize, x: isize| {
                    clip(
                        (23.0 * g(a) + 23.0 * g(b) + 2.0 * g(x) + 8.0 * (s(d) - s(e))
                            + 40.0 * (s(0) - s(d)))
                            / 48.0,
                    ) as f64
                };
                let estimates = [
                    estimate(-u, -w3, -v, -x4, -y5),
                    estimate(1, 3, 2, 4, 5),
                    estimate(-1, -3, -2, -4, -5),
                    estimate(u, w3, v, x4, y5),
                ];
                let num: f64 = weights.iter().zip(estimates).map(|(f, e)| f * e).sum();
                let den: f64 = weights.iter().sum();
                let (lo, hi) = [1 + u, 1 - u, u - 1, -1 - u, -1, 1, -u, u]
                    .into_iter()
                    .map(|o| self.img[i.wrapping_add_signed(o)][1])
                    .fold((u16::MAX, 0), |(lo, hi), x| (lo.min(x), hi.max(x)));
                self.img[i][1] = clip(num / den).min(hi).max(lo);
                col += 2;
            }
        }
    }

    /// Both colour differences at every site, then red and blue from them.
    fn color_full(&mut self) {
        let (w, h) = (self.w, self.h);
        if w < 7 || h < 7 {
            return;
        }
        let u = w as isize;
        let w3 = 3 * u;
        let mut chroma = vec![[0f64; 2]; w * h];

        for row in 1..h - 1 {
            let mut col = 1 + (self.fc(row, 1) & 1);
            let c = self.fc(row, col);
            while col + 1 < w {
                let i = row * w + col;
                chroma[i][c / 2] = self.img[i][c] as f64 - self.img[i][1] as f64;
                col += 2;
            }
        }

        // the other colour difference at red and blue sites, along the diagonals
        for row in 3..h - 3 {
            let mut col = 3 + (self.fc(row, 1) & 1);
            let c = 1 - self.fc(row, col) / 2;
            while col + 3 < w {
                let i = row * w + col;
                let ch = |o: isize| chroma[i.wrapping_add_signed(o)][c];
                let f = [
                    1.0 / (1.0
                        + (ch(-u - 1) - ch(u + 1)).abs()
                        + (ch(-u - 1) - ch(-w3 - 3)).abs()
                        + (ch(u + 1) - ch(-w3 - 3)).abs()),
                    1.0 / (1.0
                        + (ch(-u + 1) - ch(u - 1)).abs()
                        + (ch(-u + 1) - ch(-w3 + 3)).abs()
                        + (ch(u - 1) - ch(-w3 + 3)).abs()),
                    1.0 / (1.0
                        + (ch(u - 1) - ch(-u + 1)).abs()
                        + (ch(u - 1) - ch(w3 + 3)).abs()
                        + (ch(-u + 1) - ch(w3 - 3)).abs()),
                    1.0 / (1.0
                        + (ch(u + 1) - ch(-u - 1)).abs()
                        + (ch(u + 1) - ch(w3 - 3)).abs()
                        + (ch(-u - 1) - ch(w3 + 3)).abs()),
                ];
                let g = [
                    1.325 * ch(-u - 1) - 0.175 * ch(-w3 - 3) - 0.075 * ch(-w3 - 1) - 0.075 * ch(-u - 3),
                    1.325 * ch(-u + 1) - 0.175 * ch(-w3 + 3) - 0.075 * ch(-w3 + 1) - 0.075 * ch(-u + 3),
                    1.325 * ch(u - 1) - 0.175 * ch(w3 - 3) - 0.075 * ch(w3 - 1) - 0.075 * ch(u - 3),
                    1.325 * ch(u + 1) - 0.175 * ch(w3 + 3) - 0.075 * ch(w3 + 1) - 0.075 * ch(u + 3),
                ];
                chroma[i][c] = weighted(&f, &g);
                col += 2;
            }
        }

        // both colour differences at green sites
        for row in 3..h - 3 {
            let mut col = 3 + (self.fc(row, 2) & 1);
            let first = self.fc(row, col + 1) / 2;
            while col + 3 < w {
                let i = row * w + col;
                for c in [first, 1 - first] {
                    let ch = |o: isize| chroma[i.wrapping_add_signed(o)][c];
                    let f = [
                        1.0 / (1.0
                            + (ch(-u) - ch(u)).abs()
                            + (ch(-u) - ch(-w3)).abs()
                            + (ch(u) - ch(-w3)).abs()),
                        1.0 / (1.0
                            + (ch(1) - ch(-1)).abs()
                            + (ch(1) - ch(3)).abs()
                            + (ch(-1) - ch(3)).abs()),
                        1.0 / (1.0
                            + (ch(-1) - ch(1)).abs()
                            + (ch(-1) - ch(-3)).abs()
                            + (ch(1) - ch(-3)).abs()),
                        1.0 / (1.0
                            + (ch(u) - ch(-u)).abs()
                            + (ch(u) - ch(w3)).abs()
                            + (ch(-u) - ch(w3)).abs()),
                    ];
                    let g = [
                        0.875 * ch(-u) + 0.125 * ch(-w3),
                        0.875 * ch(1) + 0.125 * ch(3),
                        0.875 * ch(-1) + 0.125 * ch(-3),
                        0.875 * ch(u) + 0.125 * ch(w3),
                    ];
                    chroma[i][c] = weighted(&f, &g);
                }
                col += 2;
            }
        }

        for row in 6..h.saturating_sub(6) {
            for col in 6..w.saturating_sub(6) {
                let i = row * w + col;
                let g = self.img[i][1] as f64;
                self.img[i][0] = clip(chroma[i][0] + g);
                self.img[i][2] = clip(chroma[i][1] + g);
            }
        }
    }

    /// Clamp every sample to the values interpolated for its colour at the four
    /// orthogonal neighbours.
    fn correction(&mut self) {
        let (w, h) = (self.w, self.h);
        for row in MARGIN..h.saturating_sub(MARGIN) {
            for col in MARGIN..w.saturating_sub(MARGIN) {
                let i = row * w + col;
                let c = self.fc(row, col);
                let (lo, hi) = [i - 1, i + 1, i - w, i + w]
                    .into_iter()
                    .map(|j| self.img[j][c])
                    .fold((u16::MAX, 0), |(lo, hi), v| (lo.min(v), hi.max(v)));
                self.img[i][c] = self.img[i][c].min(hi).max(lo);
            }
        }
    }

    /// Red and blue from the colour differences of the nearest same-coloured sites.
    fn color(&mut self) {
        let (w, h) = (self.w, self.h);
        if w < 3 || h < 3 {
            return;
        }
        let u = w as isize;
        for row in 1..h - 1 {
            let mut col = 1 + (self.fc(row, 1) & 1);
            let c = 2 - self.fc(row, col);
            while col + 1 < w {
                let i = row * w + col;
                let g = |o: isize| self.at(i, o, 1);
                let s = |o: isize| self.at(i, o, c);
                self.img[i][c] = clip(
                    (4.0 * g(0) - g(u + 1) - g(u - 1) - g(-u + 1) - g(-u - 1)
                        + s(u + 1)
                        + s(u - 1)
                        + s(-u + 1)
                        + s(-u - 1))
                        / 4.0,
                );
                col += 2;
            }
        }
        for row in 1..h - 1 {
            let mut col = 1 + (self.fc(row, 2) & 1);
            let c = self.fc(row, col + 1);
            let d = 2 - c;
            while col + 1 < w {
                let i = row * w + col;
                let g = |o: isize| self.at(i, o, 1);
                let horizontal =
                    clip((2.0 * g(0) - g(1) - g(-1) + self.at(i, 1, c) + self.at(i, -1, c)) / 2.0);
                let vertical =
                    clip((2.0 * g(0) - g(u) - g(-u) + self.at(i, u, d) + self.at(i, -u, d)) / 2.0);
                self.img[i][c] = horizontal;
                self.img[i][d] = vertical;
                col += 2;
            }
        }
    }

    fn to_lch(&self) -> Vec<[f64; 3]> {
        self.img
            .iter()
            .map(|&[r, g, b]| {
                let (r, g, b) = (r as f64, g as f64, b as f64);
                [r + g + b, 1.732050808 * (r - g), 2.0 * b - r - g]
            })
            .collect()
    }

    fn from_lch(&mut self, lch: &[[f64; 3]]) {
        for (px, &[l, c, h]) in self.img.iter_mut().zip(lch) {
            *px = [
                clip(l / 3.0 - h / 6.0 + c / 3.464101615),
                clip(l / 3.0 - h / 6.0 - c / 3.464101615),
                clip(l / 3.0 + h / 3.0),
            ];
        }
    }
}

#[inline]
fn weighted(f: &[f64; 4], g: &[f64; 4]) -> f64 {
    f.iter().zip(g).map(|(f, g)| f * g).sum::<f64>() / f.iter().sum::<f64>()
}

/// Replace chroma outliers by the median-like mean of the four neighbours two pixels away.
fn correction2(lch: &mut [[f64; 3]], w: usize, h: usize) {
    let v = 2 * w;
    for row in 6..h.saturating_sub(6) {
        for col in 6..w.saturating_sub(6) {
            let i = row * w + col;
            if lch[i][1] * lch[i][2] == 0.0 {
                continue;
            }
            let trimmed = |k: usize| {
                let n = [lch[i + v][k], lch[i - v][k], lch[i - 2][k], lch[i + 2][k]];
                let (lo, hi) = n
                    .iter()
                    .fold((f64::MAX, f64::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
                (n.iter().sum::<f64>() - hi - lo) / 2.0
            };
            let (co, ho) = (trimmed(1), trimmed(2));
            let ratio = ((co * co + ho * ho) / (lch[i][1] * lch[i][1] + lch[i][2] * lch[i][2])).sqrt();
            if ratio < 0.85 {
                lch[i][1] = co;
                lch[i][2] = ho;
            }
        }
    }
}
