//! Camera colour to CIELab conversion, used to measure the homogeneity of the
//! X-Trans interpolation directions.

use serde::{Deserialize, Serialize};

/// Linear sRGB to XYZ.
const XYZ_RGB: [[f64; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

/// D65 white point.
const D65: [f64; 3] = [0.950456, 1.0, 1.088754];

/// Camera colour space to linear sRGB matrix, 3 rows by 3 or 4 camera colours.
///
/// A fourth column applies to a second green filter and is folded into green.
///
/// # Usage
/// ```
/// use cfadebayer::CameraMatrix;
///
/// let m = CameraMatrix::new([[1.2, -0.1, -0.1], [-0.2, 1.3, -0.1], [0.0, -0.4, 1.4]]);
/// assert_eq!(m.colors(), 3);
/// assert_eq!(CameraMatrix::default(), CameraMatrix::identity());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraMatrix {
    rgb_cam: [[f32; 4]; 3],
    colors: usize,
}

impl CameraMatrix {
    /// The identity matrix: camera colours are linear sRGB.
    pub fn identity() -> Self {
        Self::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Create a matrix for a three colour camera.
    pub fn new(rows: [[f32; 3]; 3]) -> Self {
        let mut rgb_cam = [[0.0; 4]; 3];
        for (dst, src) in rgb_cam.iter_mut().zip(rows) {
            dst[..3].copy_from_slice(&src);
        }
        CameraMatrix { rgb_cam, colors: 3 }
    }

    /// Create a matrix for a camera with a second green filter.
    pub fn with_four_colors(rows: [[f32; 4]; 3]) -> Self {
        CameraMatrix {
            rgb_cam: rows,
            colors: 4,
        }
    }

    /// Number of camera colours.
    pub fn colors(&self) -> usize {
        self.colors
    }

    /// The matrix rows. Only the first [`colors`](CameraMatrix::colors) columns are used.
    pub fn rows(&self) -> &[[f32; 4]; 3] {
        &self.rgb_cam
    }
}

impl Default for CameraMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Integer CIELab conversion of 16-bit camera colours.
pub(crate) struct CieLab {
    cbrt: Vec<f32>,
    xyz_cam: [[f32; 3]; 3],
}

impl CieLab {
    pub fn new(camera: &CameraMatrix) -> Self {
        let cbrt = (0..0x10000)
            .map(|i| {
                let r = i as f64 / 65535.0;
                let v = if r > 0.008856 {
                    r.powf(1.0 / 3.0)
                } else {
                    7.787 * r + 16.0 / 116.0
                };
                v as f32
            })
            .collect();
        let mut xyz_cam = [[0f32; 3]; 3];
        for (i, row) in xyz_cam.iter_mut().enumerate() {
            for j in 0..camera.colors {
                let v: f64 = (0..3)
                    .map(|k| XYZ_RGB[i][k] * camera.rgb_cam[k][j] as f64)
                    .sum::<f64>()
                    / D65[i];
                // second green folds into green
                row[if j == 3 { 1 } else { j }] += v as f32;
            }
        }
        CieLab { cbrt, xyz_cam }
    }

    /// L, a and b, scaled by 64.
    #[inline]
    pub fn convert(&self, rgb: &[u16; 3]) -> [i16; 3] {
        let mut xyz = [0.5f32; 3];
        for (c, &v) in rgb.iter().enumerate() {
            for (i, acc) in xyz.iter_mut().enumerate() {
                *acc += self.xyz_cam[i][c] * v as f32;
            }
        }
        let [x, y, z] = xyz.map(|v| self.cbrt[(v as i32).clamp(0, 0xFFFF) as usize]);
        [
            (64.0 * (116.0 * y - 16.0)) as i16,
            (64.0 * 500.0 * (x - y)) as i16,
            (64.0 * 200.0 * (y - z)) as i16,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_and_black() {
        let lab = CieLab::new(&CameraMatrix::identity());
        let [l, a, b] = lab.convert(&[65535; 3]);
        assert!((l - 6400).abs() <= 1, "{l}");
        assert!(a.abs() <= 2 && b.abs() <= 2, "{a} {b}");
        let [l, a, b] = lab.convert(&[0; 3]);
        assert_eq!([l, a, b], [0, 0, 0]);
    }

    #[test]
    fn test_lightness_order() {
        let lab = CieLab::new(&CameraMatrix::default());
        let dark = lab.convert(&[1000, 1000, 1000])[0];
        let mid = lab.convert(&[20000, 20000, 20000])[0];
        assert!(dark < mid);
        let red = lab.convert(&[30000, 5000, 5000]);
        assert!(red[1] > 0);
    }

    #[test]
    fn test_four_colors() {
        let m = CameraMatrix::with_four_colors([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.5, 0.0, 0.5],
            [0.0, 0.0, 1.0, 0.0],
        ]);
        let a = CieLab::new(&m);
        let b = CieLab::new(&CameraMatrix::identity());
        assert_eq!(a.convert(&[9000, 12000, 3000]), b.convert(&[9000, 12000, 3000]));
    }
}
