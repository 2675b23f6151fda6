use super::Vec3;

/// Row-major 4x4 matrix using the row-vector convention.
///
/// Points transform as `p * M`, translation lives in the last row, and
/// `a.multiply(&b)` yields the transform that applies `a` first and then `b`.
/// A node's world matrix is therefore `local.multiply(&parent_world)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    pub m: [[f64; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn translation(t: Vec3) -> Self {
        let mut out = Self::identity();
        out.m[3] = [t.x, t.y, t.z, 1.0];
        out
    }

    pub fn scaling(s: Vec3) -> Self {
        let mut out = Self::identity();
        out.m[0][0] = s.x;
        out.m[1][1] = s.y;
        out.m[2][2] = s.z;
        out
    }

    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Scale, then rotate, then translate.
    pub fn compose(scale: Vec3, rotation: &Mat4, translation: Vec3) -> Self {
        Self::scaling(scale)
            .multiply(rotation)
            .multiply(&Self::translation(translation))
    }

    /// Reads 16 consecutive values (row-major) starting at `offset`.
    pub fn from_slice(values: &[f32], offset: usize) -> Option<Self> {
        let chunk = values.get(offset..offset + 16)?;
        let mut out = Self::identity();
        for (i, v) in chunk.iter().enumerate() {
            out.m[i / 4][i % 4] = f64::from(*v);
        }
        Some(out)
    }

    pub fn to_f32_array(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.m[i / 4][i % 4] as f32;
        }
        out
    }

    pub fn multiply(&self, other: &Mat4) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Mat4 { m: out }
    }

    pub fn translation_part(&self) -> Vec3 {
        Vec3::new(self.m[3][0], self.m[3][1], self.m[3][2])
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        let x = p.x * m[0][0] + p.y * m[1][0] + p.z * m[2][0] + m[3][0];
        let y = p.x * m[0][1] + p.y * m[1][1] + p.z * m[2][1] + m[3][1];
        let z = p.x * m[0][2] + p.y * m[1][2] + p.z * m[2][2] + m[3][2];
        let w = p.x * m[0][3] + p.y * m[1][3] + p.z * m[2][3] + m[3][3];
        if w != 0.0 && w != 1.0 {
            Vec3::new(x / w, y / w, z / w)
        } else {
            Vec3::new(x, y, z)
        }
    }

    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            d.x * m[0][0] + d.y * m[1][0] + d.z * m[2][0],
            d.x * m[0][1] + d.y * m[1][1] + d.z * m[2][1],
            d.x * m[0][2] + d.y * m[1][2] + d.z * m[2][2],
        )
    }

    /// General 4x4 inverse (cofactor expansion). `None` when singular.
    pub fn inverse(&self) -> Option<Mat4> {
        let a: [f64; 16] = {
            let mut a = [0.0; 16];
            for (i, v) in a.iter_mut().enumerate() {
                *v = self.m[i / 4][i % 4];
            }
            a
        };

        let mut inv = [0.0; 16];
        inv[0] = a[5] * a[10] * a[15] - a[5] * a[11] * a[14] - a[9] * a[6] * a[15]
            + a[9] * a[7] * a[14]
            + a[13] * a[6] * a[11]
            - a[13] * a[7] * a[10];
        inv[4] = -a[4] * a[10] * a[15] + a[4] * a[11] * a[14] + a[8] * a[6] * a[15]
            - a[8] * a[7] * a[14]
            - a[12] * a[6] * a[11]
            + a[12] * a[7] * a[10];
        inv[8] = a[4] * a[9] * a[15] - a[4] * a[11] * a[13] - a[8] * a[5] * a[15]
            + a[8] * a[7] * a[13]
            + a[12] * a[5] * a[11]
            - a[12] * a[7] * a[9];
        inv[12] = -a[4] * a[9] * a[14] + a[4] * a[10] * a[13] + a[8] * a[5] * a[14]
            - a[8] * a[6] * a[13]
            - a[12] * a[5] * a[10]
            + a[12] * a[6] * a[9];
        inv[1] = -a[1] * a[10] * a[15] + a[1] * a[11] * a[14] + a[9] * a[2] * a[15]
            - a[9] * a[3] * a[14]
            - a[13] * a[2] * a[11]
            + a[13] * a[3] * a[10];
        inv[5] = a[0] * a[10] * a[15] - a[0] * a[11] * a[14] - a[8] * a[2] * a[15]
            + a[8] * a[3] * a[14]
            + a[12] * a[2] * a[11]
            - a[12] * a[3] * a[10];
        inv[9] = -a[0] * a[9] * a[15] + a[0] * a[11] * a[13] + a[8] * a[1] * a[15]
            - a[8] * a[3] * a[13]
            - a[12] * a[1] * a[11]
            + a[12] * a[3] * a[9];
        inv[13] = a[0] * a[9] * a[14] - a[0] * a[10] * a[13] - a[8] * a[1] * a[14]
            + a[8] * a[2] * a[13]
            + a[12] * a[1] * a[10]
            - a[12] * a[2] * a[9];
        inv[2] = a[1] * a[6] * a[15] - a[1] * a[7] * a[14] - a[5] * a[2] * a[15]
            + a[5] * a[3] * a[14]
            + a[13] * a[2] * a[7]
            - a[13] * a[3] * a[6];
        inv[6] = -a[0] * a[6] * a[15] + a[0] * a[7] * a[14] + a[4] * a[2] * a[15]
            - a[4] * a[3] * a[14]
            - a[12] * a[2] * a[7]
            + a[12] * a[3] * a[6];
        inv[10] = a[0] * a[5] * a[15] - a[0] * a[7] * a[13] - a[4] * a[1] * a[15]
            + a[4] * a[3] * a[13]
            + a[12] * a[1] * a[7]
            - a[12] * a[3] * a[5];
        inv[14] = -a[0] * a[5] * a[14] + a[0] * a[6] * a[13] + a[4] * a[1] * a[14]
            - a[4] * a[2] * a[13]
            - a[12] * a[1] * a[6]
            + a[12] * a[2] * a[5];
        inv[3] = -a[1] * a[6] * a[11] + a[1] * a[7] * a[10] + a[5] * a[2] * a[11]
            - a[5] * a[3] * a[10]
            - a[9] * a[2] * a[7]
            + a[9] * a[3] * a[6];
        inv[7] = a[0] * a[6] * a[11] - a[0] * a[7] * a[10] - a[4] * a[2] * a[11]
            + a[4] * a[3] * a[10]
            + a[8] * a[2] * a[7]
            - a[8] * a[3] * a[6];
        inv[11] = -a[0] * a[5] * a[11] + a[0] * a[7] * a[9] + a[4] * a[1] * a[11]
            - a[4] * a[3] * a[9]
            - a[8] * a[1] * a[7]
            + a[8] * a[3] * a[5];
        inv[15] = a[0] * a[5] * a[10] - a[0] * a[6] * a[9] - a[4] * a[1] * a[10]
            + a[4] * a[2] * a[9]
            + a[8] * a[1] * a[6]
            - a[8] * a[2] * a[5];

        let det = a[0] * inv[0] + a[1] * inv[4] + a[2] * inv[8] + a[3] * inv[12];
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let inv_det = 1.0 / det;
        let mut out = Mat4::identity();
        for (i, v) in inv.iter().enumerate() {
            out.m[i / 4][i % 4] = v * inv_det;
        }
        Some(out)
    }

    pub fn approx_eq(&self, other: &Mat4, eps: f64) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

#[cfg(test)]
mod tests {
    use super::Mat4;
    use crate::math::Vec3;
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        let d = (a - b).length();
        assert!(d < 1e-9, "expected {a:?} ~= {b:?}");
    }

    #[test]
    fn multiply_applies_left_operand_first() {
        let s = Mat4::scaling(Vec3::new(2.0, 2.0, 2.0));
        let t = Mat4::translation(Vec3::new(1.0, 0.0, 0.0));
        let p = Vec3::new(1.0, 1.0, 1.0);
        assert_vec_close(s.multiply(&t).transform_point(p), Vec3::new(3.0, 2.0, 2.0));
        assert_vec_close(t.multiply(&s).transform_point(p), Vec3::new(4.0, 2.0, 2.0));
    }

    #[test]
    fn rotation_y_quarter_turn() {
        // Left-handed: +X rotates onto -Z about +Y.
        let r = Mat4::rotation_y(FRAC_PI_2);
        assert_vec_close(r.transform_direction(Vec3::RIGHT), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn inverse_round_trips() {
        let m = Mat4::compose(
            Vec3::new(1.0, -1.0, 2.0),
            &Mat4::rotation_x(0.3).multiply(&Mat4::rotation_z(1.1)),
            Vec3::new(10.0, -3.0, 7.5),
        );
        let inv = m.inverse().expect("invertible");
        assert!(m.multiply(&inv).approx_eq(&Mat4::identity(), 1e-9));
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        assert!(Mat4::scaling(Vec3::new(1.0, 0.0, 1.0)).inverse().is_none());
    }

    #[test]
    fn from_slice_reads_row_major_with_offset() {
        let mut values = vec![0.0f32; 4];
        values.extend(Mat4::translation(Vec3::new(1.0, 2.0, 3.0)).to_f32_array());
        let m = Mat4::from_slice(&values, 4).expect("16 values");
        assert_eq!(m.translation_part(), Vec3::new(1.0, 2.0, 3.0));
        assert!(Mat4::from_slice(&values, 8).is_none());
    }
}
