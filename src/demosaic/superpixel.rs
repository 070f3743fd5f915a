//! SuperPixel demosaicing: every 2x2 cell of the mosaic becomes one output pixel.

use tracing::instrument;

use crate::{ColorSpace, ImageOwned};

use super::{parallel::Executor, raster::CfaPlane, BayerPattern, Channel, DebayerResult};

/// Red and blue are copied from their sites, green is the mean of the two green
/// sites. The output is `(width / 2) x (height / 2)`; an odd last row or column
/// is dropped.
#[instrument(level = "debug", skip_all, fields(pattern = %pattern))]
pub(crate) fn run(
    plane: &CfaPlane,
    pattern: &BayerPattern,
    exec: &Executor,
) -> DebayerResult<ImageOwned<f32>> {
    let (w, h) = (plane.width / 2, plane.height / 2);
    let mut out = vec![0f32; 3 * w * h];
    exec.rows(&mut out, w, |y, row| {
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let mut green = 0f64;
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let v = plane.at(2 * x + dx, 2 * y + dy);
                match pattern.color_at(dy, dx) {
                    Channel::Red => px[0] = v,
                    Channel::Blue => px[2] = v,
                    Channel::Green => green += v as f64,
                }
            }
            px[1] = (green / 2.0) as f32;
        }
    })?;
    Ok(ImageOwned::new(out, w, h, ColorSpace::Rgb)?)
}
