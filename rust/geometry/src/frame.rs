// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame normalization for stretched volumes
//!
//! Boolean evaluation happens in a frame that keeps a volume's position and
//! rotation but drops its scale. The scale lives in the operand's vertices
//! instead, and the result nodes carry the inverse scale so they render
//! correctly underneath the scaled volume node.

use crate::brush::Brush;
use crate::error::{Error, Result};
use crate::transform::Transform;
use nalgebra::{Matrix4, Vector3};

/// A volume frame with its scale stripped
#[derive(Debug, Clone, Copy)]
pub struct NormalizedFrame {
    /// Same position and rotation, unit scale
    pub unit: Transform,
    /// The stripped scale
    pub scale: Vector3<f64>,
    /// Component-wise inverse of `scale`
    pub inverse_scale: Vector3<f64>,
}

impl NormalizedFrame {
    /// Matrix taking world coordinates into the de-scaled frame
    pub fn world_to_unit(&self) -> Matrix4<f64> {
        let m = self.unit.to_matrix();
        // Rigid inverse: always invertible
        m.try_inverse().unwrap_or_else(Matrix4::identity)
    }

    /// Matrix baking the stripped scale into local geometry
    pub fn scale_matrix(&self) -> Matrix4<f64> {
        Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameNormalizer;

impl FrameNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Split a volume transform into a unit-scale frame and its inverse scale.
    ///
    /// Fails with [`Error::DegenerateVolume`] when any scale component is zero
    /// or not finite.
    pub fn normalize(&self, volume: &Transform) -> Result<NormalizedFrame> {
        let scale = volume.scale;
        let degenerate = scale
            .iter()
            .any(|s| !s.is_finite() || s.abs() <= f64::EPSILON);
        if degenerate {
            return Err(Error::DegenerateVolume(scale));
        }

        Ok(NormalizedFrame {
            unit: volume.without_scale(),
            scale,
            inverse_scale: Vector3::new(1.0 / scale.x, 1.0 / scale.y, 1.0 / scale.z),
        })
    }

    /// Same as [`normalize`](Self::normalize) for a composed world matrix
    pub fn normalize_matrix(&self, world: &Matrix4<f64>) -> Result<NormalizedFrame> {
        self.normalize(&Transform::from_matrix(world))
    }

    /// Multiply the brush's scale by `inverse_scale`, component-wise
    pub fn denormalize(&self, brush: &mut Brush, inverse_scale: &Vector3<f64>) {
        brush.transform.scale.component_mul_assign(inverse_scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion};

    #[test]
    fn test_normalize_strips_scale() {
        let volume = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0),
            Vector3::new(2.0, 4.0, 0.5),
        );
        let frame = FrameNormalizer::new().normalize(&volume).unwrap();
        assert_relative_eq!(frame.unit.scale, Vector3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(frame.unit.position, volume.position);
        assert_relative_eq!(frame.inverse_scale, Vector3::new(0.5, 0.25, 2.0));
    }

    #[test]
    fn test_zero_scale_is_degenerate() {
        let volume = Transform::identity().with_scale(Vector3::new(1.0, 0.0, 1.0));
        let err = FrameNormalizer::new().normalize(&volume).unwrap_err();
        assert!(matches!(err, Error::DegenerateVolume(_)));
    }

    #[test]
    fn test_non_finite_scale_is_degenerate() {
        let volume = Transform::identity().with_scale(Vector3::new(f64::INFINITY, 1.0, 1.0));
        assert!(FrameNormalizer::new().normalize(&volume).is_err());
        let volume = Transform::identity().with_scale(Vector3::new(1.0, f64::NAN, 1.0));
        assert!(FrameNormalizer::new().normalize(&volume).is_err());
    }

    #[test]
    fn test_world_to_unit_inverts_placement() {
        let volume = Transform::new(
            Vector3::new(-2.0, 0.0, 1.0),
            UnitQuaternion::from_euler_angles(0.2, 0.0, 1.0),
            Vector3::new(3.0, 3.0, 3.0),
        );
        let frame = FrameNormalizer::new().normalize(&volume).unwrap();
        let p = frame
            .world_to_unit()
            .transform_point(&Point3::new(-2.0, 0.0, 1.0));
        assert_relative_eq!(p, Point3::origin(), epsilon = 1e-12);
    }

    #[test]
    fn test_denormalize_restores_proportions() {
        let normalizer = FrameNormalizer::new();
        let volume = Transform::identity().with_scale(Vector3::new(2.0, 1.0, 4.0));
        let frame = normalizer.normalize(&volume).unwrap();

        let mut brush = Brush::default();
        normalizer.denormalize(&mut brush, &frame.inverse_scale);
        let world = volume.to_matrix() * brush.matrix();
        assert_relative_eq!(world, Matrix4::identity(), epsilon = 1e-12);
    }
}
