//! Markesteijn demosaicing of X-Trans mosaics.
//!
//! Green is interpolated along hexagonal neighbourhoods in four directions, red and
//! blue follow from colour differences, and the most homogeneous directions in
//! CIELab are averaged. The image is processed in overlapping 512x512 tiles.

use itertools::iproduct;
use tracing::{debug, instrument};

use crate::{coretraits::cast_f32, ColorSpace, ImageOwned};

use super::{
    border::border_interpolate, lab::CieLab, parallel::Executor, raster::CfaPlane,
    CameraMatrix, Channel, DebayerError, DebayerResult, XTransPattern,
};

/// Tile size, also the smallest image dimension accepted.
pub(crate) const TS: usize = 512;
const TT: usize = TS * TS;
const OVERLAP: usize = 16;

const ORTH: [isize; 12] = [1, 0, 0, 1, -1, 0, 0, -1, 1, 0, 0, 1];
const PATT: [[isize; 16]; 2] = [
    [0, 1, 0, -1, 2, 0, -1, 0, 1, 1, 1, -1, 0, 0, 0, 0],
    [0, 1, 0, -2, 1, 0, -2, 0, 1, 1, -2, -2, 1, -1, -1, 1],
];
/// Derivative directions inside a tile: horizontal, vertical and both diagonals.
const DIR: [usize; 4] = [1, TS, TS + 1, TS - 1];

/// Offsets from a pixel to its green hexagon, for the 3x3 phases of the mosaic.
#[derive(Debug)]
struct HexMap {
    image: [[[isize; 8]; 3]; 3],
    tile: [[[isize; 8]; 3]; 3],
    sgrow: usize,
    sgcol: usize,
}

impl HexMap {
    fn new(pattern: &XTransPattern, width: usize) -> DebayerResult<Self> {
        let green = |r: isize, c: isize| {
            pattern.color_at(r.rem_euclid(6) as usize, c.rem_euclid(6) as usize) == Channel::Green
        };
        let mut hex = [[[None::<(isize, isize)>; 8]; 3]; 3];
        let mut solitary = None;
        for (row, col) in iproduct!(0..3isize, 0..3isize) {
            let g = green(row, col) as usize;
            let mut ng = 0;
            for d in (0..10).step_by(2) {
                if green(row + ORTH[d], col + ORTH[d + 2]) {
                    ng = 0;
                } else {
                    ng += 1;
                }
                if ng == 4 {
                    solitary = Some((row as usize, col as usize));
                }
                if ng == g + 1 {
                    for c in 0..8 {
                        let v = ORTH[d] * PATT[g][c * 2] + ORTH[d + 1] * PATT[g][c * 2 + 1];
                        let h = ORTH[d + 2] * PATT[g][c * 2] + ORTH[d + 3] * PATT[g][c * 2 + 1];
                        hex[row as usize][col as usize][c ^ ((g * 2) & d)] = Some((v, h));
                    }
                }
            }
        }
        let (sgrow, sgcol) =
            solitary.ok_or(DebayerError::CfaValidation("no solitary green pixel"))?;
        let mut image = [[[0; 8]; 3]; 3];
        let mut tile = [[[0; 8]; 3]; 3];
        for (row, col, c) in iproduct!(0..3, 0..3, 0..8) {
            let (v, h) =
                hex[row][col][c].ok_or(DebayerError::CfaValidation("incomplete green hexagon"))?;
            image[row][col][c] = v * width as isize + h;
            tile[row][col][c] = v * TS as isize + h;
        }
        Ok(HexMap {
            image,
            tile,
            sgrow,
            sgcol,
        })
    }
}

#[instrument(level = "debug", skip_all, fields(pattern = %pattern, passes))]
pub(crate) fn run(
    plane: &CfaPlane,
    pattern: &XTransPattern,
    camera: &CameraMatrix,
    passes: usize,
    exec: &Executor,
) -> DebayerResult<ImageOwned<f32>> {
    if !(1..=2).contains(&passes) {
        return Err(DebayerError::UnsupportedMethod(format!(
            "Markesteijn-{passes}"
        )));
    }
    let (w, h) = (plane.width, plane.height);
    if w < TS || h < TS {
        return Err(DebayerError::Dimension {
            width: w,
            height: h,
            min_width: TS,
            min_height: TS,
        });
    }
    let hex = HexMap::new(pattern, w)?;
    let fcol = |r: usize, c: usize| pattern.color_at(r, c);

    let mut img: Vec<[u16; 4]> = plane
        .to_u16()
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let mut px = [0; 4];
            px[fcol(i / w, i % w).index()] = v;
            px
        })
        .collect();
    green_brackets(&mut img, w, h, &fcol, &hex)?;

    let lab = CieLab::new(camera);
    let engine = Markesteijn {
        img: &img,
        width: w,
        height: h,
        pattern,
        hex: &hex,
        lab: &lab,
        passes,
        ndir: 4 << (passes > 1) as usize,
    };
    let tiles: Vec<(usize, usize)> = iproduct!(tile_starts(h), tile_starts(w)).collect();
    debug!(tiles = tiles.len(), ndir = engine.ndir, "tile grid");
    let blocks = exec.tiles(&tiles, |&(top, left)| engine.tile(top, left))?;

    for block in blocks.iter().filter(|b| b.cols > 0) {
        for (r, line) in block.data.chunks_exact(block.cols).enumerate() {
            let start = (block.top + r) * w + block.left;
            for (dst, src) in img[start..start + block.cols].iter_mut().zip(line) {
                dst[..3].copy_from_slice(src);
            }
        }
    }
    border_interpolate(&mut img, w, h, 8, fcol);

    let out: Vec<u16> = img.iter().flat_map(|px| [px[0], px[1], px[2]]).collect();
    Ok(ImageOwned::new(cast_f32(&out), w, h, ColorSpace::Rgb)?)
}

/// Top (or left) coordinates of the tiles along an image dimension.
fn tile_starts(size: usize) -> impl Iterator<Item = usize> + Clone {
    (3..size.saturating_sub(19)).step_by(TS - OVERLAP)
}

#[inline(always)]
fn clip(v: i32) -> u16 {
    v.clamp(0, u16::MAX as i32) as u16
}

/// Store in slots 1 and 3 of every non-green pixel the smallest and largest of
/// the six greens around it.
fn green_brackets<F>(
    img: &mut [[u16; 4]],
    width: usize,
    height: usize,
    fcol: &F,
    hex: &HexMap,
) -> DebayerResult<()>
where
    F: Fn(usize, usize) -> Channel,
{
    let (w, h) = (width as isize, height as isize);
    let sgrow = hex.sgrow as isize;
    let limit = width * height;
    let mut retries = 0;
    let mut row = 2isize;
    while row < h - 2 {
        let (mut lo, mut hi) = (u16::MAX, 0u16);
        let mut col = 2isize;
        while col < w - 2 {
            if fcol(row as usize, col as usize) == Channel::Green {
                (lo, hi) = (u16::MAX, 0);
                col += 1;
                continue;
            }
            let pix = (row * w + col) as usize;
            if hi == 0 {
                lo = u16::MAX;
                for &off in &hex.image[row as usize % 3][col as usize % 3][..6] {
                    let v = img[pix.wrapping_add_signed(off)][1];
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
            img[pix][1] = lo;
            img[pix][3] = hi;
            // pairs of non-green pixels share one bracket
            match (row - sgrow) % 3 {
                1 if row < h - 3 => {
                    row += 1;
                    col -= 1;
                }
                2 => {
                    (lo, hi) = (u16::MAX, 0);
                    col += 2;
                    if col < w - 3 && row > 2 {
                        row -= 1;
                        retries += 1;
                        if retries > limit {
                            return Err(DebayerError::CfaValidation(
                                "green bracket traversal does not terminate",
                            ));
                        }
                    }
                }
                _ => {}
            }
            col += 1;
        }
        row += 1;
    }
    Ok(())
}

/// Interpolated pixels of one tile, rows `top..top + rows` and columns
/// `left..left + cols` of the image.
#[derive(Debug)]
struct Block {
    top: usize,
    left: usize,
    rows: usize,
    cols: usize,
    data: Vec<[u16; 3]>,
}

struct Markesteijn<'a> {
    img: &'a [[u16; 4]],
    width: usize,
    height: usize,
    pattern: &'a XTransPattern,
    hex: &'a HexMap,
    lab: &'a CieLab,
    passes: usize,
    ndir: usize,
}

impl Markesteijn<'_> {
    #[inline(always)]
    fn fcol(&self, row: usize, col: usize) -> usize {
        self.pattern.color_at(row, col).index()
    }

    fn tile(&self, top: usize, left: usize) -> Block {
        let (w, ndir) = (self.width, self.ndir);
        let mrow = (top + TS).min(self.height - 3);
        let mcol = (left + TS).min(w - 3);
        let mut rgb = vec![[0u16; 3]; ndir * TT];
        for (row, col) in iproduct!(top..mrow, left..mcol) {
            let px = &self.img[row * w + col];
            rgb[(row - top) * TS + col - left] = [px[0], px[1], px[2]];
        }
        for d in 1..4 {
            rgb.copy_within(0..TT, d * TT);
        }

        self.green_pass(&mut rgb, top, left, mrow, mcol);
        for pass in 0..self.passes {
            if pass == 1 {
                rgb.copy_within(0..4 * TT, 4 * TT);
            }
            let base = if pass == 0 { 0 } else { 4 * TT };
            if pass > 0 {
                self.green_refine(&mut rgb, base, top, left, mrow, mcol);
            }
            self.solitary_greens(&mut rgb, base, top, left, mrow, mcol);
            self.red_blue(&mut rgb, base, top, left, mrow, mcol);
            self.green_blocks(&mut rgb, base, top, left, mrow, mcol);
        }

        let homo = self.homogeneity(&rgb, mrow - top, mcol - left);
        self.average(&rgb, &homo, top, left, mrow - top, mcol - left)
    }

    /// Green at red and blue sites, in four directions.
    fn green_pass(&self, rgb: &mut [[u16; 3]], top: usize, left: usize, mrow: usize, mcol: usize) {
        let (w, sgrow) = (self.width, self.hex.sgrow);
        for (row, col) in iproduct!(top..mrow, left..mcol) {
            let f = self.fcol(row, col);
            if f == 1 {
                continue;
            }
            let pix = row * w + col;
            let hex = &self.hex.image[row % 3][col % 3];
            let g = |o: isize| self.img[pix.wrapping_add_signed(o)][1] as i32;
            let s = |o: isize| self.img[pix.wrapping_add_signed(o)][f] as i32;
            let diag = |h: isize| 164 * g(h) + 92 * g(-2 * h) + 33 * (2 * s(0) - s(3 * h) - s(-3 * h));
            let color = [
                174 * (g(hex[1]) + g(hex[0])) - 46 * (g(2 * hex[1]) + g(2 * hex[0])),
                223 * g(hex[3]) + 33 * g(hex[2]) + 92 * (s(0) - s(-hex[2])),
                diag(hex[4]),
                diag(hex[5]),
            ];
            let (lo, hi) = (self.img[pix][1] as i32, self.img[pix][3] as i32);
            let flip = ((row - sgrow) % 3 == 0) as usize;
            let i = (row - top) * TS + col - left;
            for (c, v) in color.into_iter().enumerate() {
                rgb[(c ^ flip) * TT + i][1] = (v >> 8).min(hi).max(lo) as u16;
            }
        }
    }

    /// Recompute green from the interpolated values of closer pixels.
    fn green_refine(
        &self,
        rgb: &mut [[u16; 3]],
        base: usize,
        top: usize,
        left: usize,
        mrow: usize,
        mcol: usize,
    ) {
        let sgrow = self.hex.sgrow;
        for (row, col) in iproduct!(top + 2..mrow - 2, left + 2..mcol - 2) {
            let f = self.fcol(row, col);
            if f == 1 {
                continue;
            }
            let px = &self.img[row * self.width + col];
            let (lo, hi) = (px[1] as i32, px[3] as i32);
            let hex = &self.hex.tile[row % 3][col % 3];
            let flip = ((row - sgrow) % 3 == 0) as usize;
            for d in 3..6 {
                let rix = base + ((d - 2) ^ flip) * TT + (row - top) * TS + col - left;
                let v = |o: isize, c: usize| rgb[rix.wrapping_add_signed(o)][c] as i32;
                let val = v(-2 * hex[d], 1) + 2 * v(hex[d], 1) - v(-2 * hex[d], f)
                    - 2 * v(hex[d], f)
                    + 3 * v(0, f);
                rgb[rix][1] = (val / 3).min(hi).max(lo) as u16;
            }
        }
    }

    /// Red and blue at solitary green sites, from six directions.
    fn solitary_greens(
        &self,
        rgb: &mut [[u16; 3]],
        base: usize,
        top: usize,
        left: usize,
        mrow: usize,
        mcol: usize,
    ) {
        let (sgrow, sgcol) = (self.hex.sgrow, self.hex.sgcol);
        let row0 = (top - sgrow + 4) / 3 * 3 + sgrow;
        let col0 = (left - sgcol + 4) / 3 * 3 + sgcol;
        for row in (row0..mrow - 2).step_by(3) {
            for col in (col0..mcol - 2).step_by(3) {
                let mut rix = base + (row - top) * TS + col - left;
                let mut h = self.fcol(row, col + 1);
                let mut diff = [0i64; 6];
                let mut color = [[0i32; 6]; 3];
                let mut i = 1isize;
                for d in 0..6 {
                    for c in 0..2 {
                        let p = rix.wrapping_add_signed(i << c);
                        let m = rix.wrapping_add_signed(-(i << c));
                        let g = 2 * rgb[rix][1] as i32 - rgb[p][1] as i32 - rgb[m][1] as i32;
                        color[h][d] = g + rgb[p][h] as i32 + rgb[m][h] as i32;
                        if d > 1 {
                            let t = rgb[p][1] as i64 - rgb[m][1] as i64 - rgb[p][h] as i64
                                + rgb[m][h] as i64;
                            diff[d] += t * t + g as i64 * g as i64;
                        }
                        h ^= 2;
                    }
                    if d > 1 && d & 1 == 1 && diff[d - 1] < diff[d] {
                        for c in [0, 2] {
                            color[c][d] = color[c][d - 1];
                        }
                    }
                    if d < 2 || d & 1 == 1 {
                        for c in [0, 2] {
                            rgb[rix][c] = clip(color[c][d] / 2);
                        }
                        rix += TT;
                    }
                    i ^= TS as isize ^ 1;
                    h ^= 2;
                }
            }
        }
    }

    /// Red at blue sites and blue at red sites.
    fn red_blue(
        &self,
        rgb: &mut [[u16; 3]],
        base: usize,
        top: usize,
        left: usize,
        mrow: usize,
        mcol: usize,
    ) {
        let sgrow = self.hex.sgrow;
        for (row, col) in iproduct!(top + 3..mrow - 3, left + 3..mcol - 3) {
            let f = 2 - self.fcol(row, col);
            if f == 1 {
                continue;
            }
            let c: isize = if (row - sgrow) % 3 != 0 { TS as isize } else { 1 };
            let h = 3 * (c ^ TS as isize ^ 1);
            let mut rix = base + (row - top) * TS + col - left;
            for d in 0..4isize {
                let v = |o: isize, ch: usize| rgb[rix.wrapping_add_signed(o)][ch] as i32;
                let g0 = v(0, 1);
                let along = (g0 - v(c, 1)).abs() + (g0 - v(-c, 1)).abs();
                let across = (g0 - v(h, 1)).abs() + (g0 - v(-h, 1)).abs();
                let i = if d > 1 || (d ^ c) & 1 != 0 || along < 2 * across {
                    c
                } else {
                    h
                };
                let val = (v(i, f) + v(-i, f) + 2 * g0 - v(i, 1) - v(-i, 1)) / 2;
                rgb[rix][f] = clip(val);
                rix += TT;
            }
        }
    }

    /// Red and blue in the 2x2 blocks of green, one hex direction per buffer.
    fn green_blocks(
        &self,
        rgb: &mut [[u16; 3]],
        base: usize,
        top: usize,
        left: usize,
        mrow: usize,
        mcol: usize,
    ) {
        let (sgrow, sgcol) = (self.hex.sgrow, self.hex.sgcol);
        for (row, col) in iproduct!(top + 2..mrow - 2, left + 2..mcol - 2) {
            if (row - sgrow) % 3 == 0 || (col - sgcol) % 3 == 0 {
                continue;
            }
            let hex = &self.hex.tile[row % 3][col % 3];
            let mut rix = base + (row - top) * TS + col - left;
            for d in (0..8).step_by(2) {
                let (a, b) = (hex[d], hex[d + 1]);
                let v = |o: isize, ch: usize| rgb[rix.wrapping_add_signed(o)][ch] as i32;
                let px = if a + b != 0 {
                    let g = 3 * v(0, 1) - 2 * v(a, 1) - v(b, 1);
                    [0, 2].map(|c| clip((g + 2 * v(a, c) + v(b, c)) / 3))
                } else {
                    let g = 2 * v(0, 1) - v(a, 1) - v(b, 1);
                    [0, 2].map(|c| clip((g + v(a, c) + v(b, c)) / 2))
                };
                rgb[rix][0] = px[0];
                rgb[rix][2] = px[1];
                rix += TT;
            }
        }
    }

    /// Per direction, the number of 3x3 neighbours whose CIELab derivative is
    /// within eight times the smallest derivative at the pixel.
    fn homogeneity(&self, rgb: &[[u16; 3]], mrow: usize, mcol: usize) -> Vec<u8> {
        let ndir = self.ndir;
        let mut lab = vec![[0i16; 3]; TT];
        let mut drv = vec![0f32; ndir * TT];
        for d in 0..ndir {
            for (row, col) in iproduct!(2..mrow - 2, 2..mcol - 2) {
                let i = row * TS + col;
                lab[i] = self.lab.convert(&rgb[d * TT + i]);
            }
            let f = DIR[d & 3];
            for (row, col) in iproduct!(3..mrow - 3, 3..mcol - 3) {
                let i = row * TS + col;
                let sd = |k: usize| 2 * lab[i][k] as i64 - lab[i + f][k] as i64 - lab[i - f][k] as i64;
                let g = sd(0);
                let a = sd(1) + g * 500 / 232;
                let b = sd(2) - g * 500 / 580;
                drv[d * TT + i] = (g * g + a * a + b * b) as f32;
            }
        }

        let mut homo = vec![0u8; ndir * TT];
        for (row, col) in iproduct!(4..mrow - 4, 4..mcol - 4) {
            let i = row * TS + col;
            let tr = 8.0 * (0..ndir).map(|d| drv[d * TT + i]).fold(f32::MAX, f32::min);
            for d in 0..ndir {
                homo[d * TT + i] = iproduct!(0..3, 0..3)
                    .filter(|&(v, h)| drv[d * TT + i + v * TS + h - TS - 1] <= tr)
                    .count() as u8;
            }
        }
        homo
    }

    /// Average the most homogeneous directions.
    fn average(
        &self,
        rgb: &[[u16; 3]],
        homo: &[u8],
        top: usize,
        left: usize,
        mut mrow: usize,
        mut mcol: usize,
    ) -> Block {
        let ndir = self.ndir;
        if self.height - top < TS + 4 {
            mrow = self.height - top + 2;
        }
        if self.width - left < TS + 4 {
            mcol = self.width - left + 2;
        }
        let (r0, c0) = (top.min(8), left.min(8));
        let rows = (mrow - 8).saturating_sub(r0);
        let cols = (mcol - 8).saturating_sub(c0);
        let mut data = Vec::with_capacity(rows * cols);
        for (row, col) in iproduct!(r0..r0 + rows, c0..c0 + cols) {
            let i = row * TS + col;
            let mut hm = [0u32; 8];
            for (d, hm) in hm.iter_mut().enumerate().take(ndir) {
                *hm = iproduct!(0..5, 0..5)
                    .map(|(v, h)| homo[d * TT + i + v * TS + h - 2 * TS - 2] as u32)
                    .sum();
            }
            for d in 0..ndir - 4 {
                if hm[d] < hm[d + 4] {
                    hm[d] = 0;
                } else if hm[d] > hm[d + 4] {
                    hm[d + 4] = 0;
                }
            }
            let mut max = hm[..ndir].iter().copied().max().unwrap_or(0);
            max -= max >> 3;
            let mut avg = [0u32; 4];
            for d in (0..ndir).filter(|&d| hm[d] >= max) {
                for (acc, &v) in avg.iter_mut().zip(&rgb[d * TT + i]) {
                    *acc += v as u32;
                }
                avg[3] += 1;
            }
            data.push([0, 1, 2].map(|c| (avg[c] / avg[3]) as u16));
        }
        Block {
            top: top + r0,
            left: left + c0,
            rows,
            cols,
            data,
        }
    }
}
