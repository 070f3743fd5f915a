//! Same-colour neighbourhood averaging, used at image borders where the
//! directional methods lack support.

use super::{raster::CfaPlane, Channel};

/// Interpolate one pixel of `plane` from its 3x3 neighbourhood.
///
/// The sampled channel is copied. Every other channel is the unweighted mean of the
/// neighbours of that colour inside the image, or zero when there are none.
pub(crate) fn interpolate_pixel<F>(plane: &CfaPlane, x: usize, y: usize, color_at: &F) -> [f32; 3]
where
    F: Fn(usize, usize) -> Channel,
{
    let own = color_at(y, x).index();
    let mut sum = [0f64; 3];
    let mut count = [0u32; 3];
    for yy in y.saturating_sub(1)..=(y + 1).min(plane.height - 1) {
        for xx in x.saturating_sub(1)..=(x + 1).min(plane.width - 1) {
            let c = color_at(yy, xx).index();
            if c != own {
                sum[c] += plane.at(xx, yy) as f64;
                count[c] += 1;
            }
        }
    }
    let mut out = [0f32; 3];
    for (c, px) in out.iter_mut().enumerate() {
        *px = if c == own {
            plane.at(x, y)
        } else if count[c] > 0 {
            (sum[c] / count[c] as f64) as f32
        } else {
            0.0
        };
    }
    out
}

/// Fill the missing channels of the outer `border` pixels of an integer working
/// image, from the sampled channel of the same-coloured neighbours.
///
/// The 3x3 neighbourhood is used, widened to 5x5 for a colour that is absent from
/// the 3x3 window. Channels without any neighbour of their colour are left unchanged.
pub(crate) fn border_interpolate<const N: usize, F>(
    img: &mut [[u16; N]],
    width: usize,
    height: usize,
    border: usize,
    color_at: F,
) where
    F: Fn(usize, usize) -> Channel,
{
    for row in 0..height {
        let mut col = 0;
        while col < width {
            if col == border && row >= border && row + border < height {
                col = width.saturating_sub(border).max(border + 1);
                continue;
            }
            let mut done = [false; 3];
            done[color_at(row, col).index()] = true;
            for radius in 1..=2 {
                let mut sum = [0u32; 3];
                let mut count = [0u32; 3];
                for y in row.saturating_sub(radius)..=(row + radius).min(height - 1) {
                    for x in col.saturating_sub(radius)..=(col + radius).min(width - 1) {
                        let f = color_at(y, x).index();
                        sum[f] += img[y * width + x][f] as u32;
                        count[f] += 1;
                    }
                }
                for c in 0..3 {
                    if !done[c] && count[c] > 0 {
                        img[row * width + col][c] = (sum[c] / count[c]) as u16;
                        done[c] = true;
                    }
                }
                if done.iter().all(|&d| d) {
                    break;
                }
            }
            col += 1;
        }
    }
}
