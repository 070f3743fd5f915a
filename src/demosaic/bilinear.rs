//! Bilinear demosaicing.

use tracing::instrument;

use crate::{ColorSpace, ImageOwned};

use super::{
    border::interpolate_pixel, parallel::Executor, raster::CfaPlane, BayerPattern, DebayerResult,
};

/// Every missing channel is the mean of the same-coloured pixels of the 3x3
/// neighbourhood. The outermost rows and columns repeat their inner neighbours.
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
        let yy = y.clamp(1, h - 2);
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            px.copy_from_slice(&interpolate_pixel(plane, x.clamp(1, w - 2), yy, &cfa));
        }
    })?;
    Ok(ImageOwned::new(out, w, h, ColorSpace::Rgb)?)
}
