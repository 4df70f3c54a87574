// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Position / rotation / scale transforms
//!
//! Composition order matches the scene graph: scale first, then rotation,
//! then translation (`M = T * R * S`).

use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Decomposed affine transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

impl Transform {
    /// Identity transform
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>, scale: Vector3<f64>) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// Compose into a 4x4 matrix (`T * R * S`)
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Translation3::from(self.position).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose an affine matrix built as `T * R * S`.
    ///
    /// Scale is the column length of the linear part; a negative
    /// determinant is folded into the X scale.
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Self {
        let position = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();

        let mut scale = Vector3::new(
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        );
        if linear.determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let rotation = if scale.iter().all(|s| s.abs() > f64::EPSILON && s.is_finite()) {
            let mut basis = linear;
            for (i, s) in scale.iter().enumerate() {
                basis.column_mut(i).scale_mut(1.0 / *s);
            }
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(basis))
        } else {
            UnitQuaternion::identity()
        };

        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Copy with unit scale (same position and rotation)
    pub fn without_scale(&self) -> Self {
        Self {
            scale: Vector3::new(1.0, 1.0, 1.0),
            ..*self
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
