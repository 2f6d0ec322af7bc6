//! Fixed-layout rigid transforms exchanged with the VR runtime.
//!
//! # Memory layout
//! ```text
//! m[0] = [ r00 r01 r02 tx ]
//! m[1] = [ r10 r11 r12 ty ]
//! m[2] = [ r20 r21 r22 tz ]
//! ```
//! Row-major, three rows of four `f32`, rotation in columns 0..3 and the
//! translation in column 3. The implicit fourth row is `[0 0 0 1]`.
//! glam matrices are column-major, so every conversion goes through
//! [`PoseMatrix::to_mat4`] / [`PoseMatrix::from_mat4`].

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct PoseMatrix {
    pub m: [[f32; 4]; 3],
}

impl PoseMatrix {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self::from_mat4(&Mat4::from_rotation_translation(rotation, translation))
    }

    /// Drops the bottom row of `mat`, which must be affine.
    pub fn from_mat4(mat: &Mat4) -> Self {
        let row = |i: usize| {
            let r: Vec4 = mat.row(i);
            [r.x, r.y, r.z, r.w]
        };
        Self { m: [row(0), row(1), row(2)] }
    }

    pub fn to_mat4(&self) -> Mat4 {
        let m = &self.m;
        Mat4::from_cols(
            Vec4::new(m[0][0], m[1][0], m[2][0], 0.0),
            Vec4::new(m[0][1], m[1][1], m[2][1], 0.0),
            Vec4::new(m[0][2], m[1][2], m[2][2], 0.0),
            Vec4::new(m[0][3], m[1][3], m[2][3], 1.0),
        )
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    pub fn rotation(&self) -> Quat {
        let m = &self.m;
        let basis = Mat3::from_cols(
            Vec3::new(m[0][0], m[1][0], m[2][0]),
            Vec3::new(m[0][1], m[1][1], m[2][1]),
            Vec3::new(m[0][2], m[1][2], m[2][2]),
        );
        Quat::from_mat3(&basis).normalize()
    }
}

impl Default for PoseMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn translation_lives_in_last_column() {
        let pose = PoseMatrix {
            m: [
                [1.0, 0.0, 0.0, 0.5],
                [0.0, 1.0, 0.0, 1.7],
                [0.0, 0.0, 1.0, -2.0],
            ],
        };
        let mat = pose.to_mat4();
        assert_eq!(mat.w_axis, Vec4::new(0.5, 1.7, -2.0, 1.0));
        assert_eq!(pose.translation(), Vec3::new(0.5, 1.7, -2.0));
    }

    #[test]
    fn rotation_survives_layout_conversion() {
        let yaw = Quat::from_rotation_y(FRAC_PI_2);
        let pose = PoseMatrix::from_rotation_translation(yaw, Vec3::new(1.0, 2.0, 3.0));

        let forward = pose.to_mat4().transform_vector3(Vec3::NEG_Z);
        assert!((forward - Vec3::NEG_X).length() < 1e-5, "got {forward}");

        let back = pose.rotation();
        assert!(back.dot(yaw).abs() > 0.9999);
        assert_eq!(PoseMatrix::from_mat4(&pose.to_mat4()), pose);
    }
}
