// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CSG operands: a mesh plus the transform that places it.

use crate::mesh::Mesh;
use crate::transform::Transform;
use nalgebra::Matrix4;

#[derive(Debug, Clone, Default)]
pub struct Brush {
    /// Geometry in the brush's local frame
    pub mesh: Mesh,
    /// Placement of the local frame
    pub transform: Transform,
}

impl Brush {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            transform: Transform::identity(),
        }
    }

    pub fn with_transform(mesh: Mesh, transform: Transform) -> Self {
        Self { mesh, transform }
    }

    /// Bake a matrix into the vertices, leaving the transform untouched
    pub fn apply_matrix(&mut self, matrix: &Matrix4<f64>) {
        self.mesh.transform(matrix);
    }

    #[inline]
    pub fn matrix(&self) -> Matrix4<f64> {
        self.transform.to_matrix()
    }

    /// Geometry with the transform applied
    pub fn world_mesh(&self) -> Mesh {
        if self.transform == Transform::identity() {
            return self.mesh.clone();
        }
        self.mesh.transformed(&self.matrix())
    }

    /// Volume enclosed by the placed geometry
    pub fn volume(&self) -> f64 {
        self.world_mesh().volume()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_world_mesh_applies_scale() {
        let brush = Brush::with_transform(
            primitives::cuboid(),
            Transform::identity().with_scale(Vector3::new(2.0, 3.0, 4.0)),
        );
        assert_relative_eq!(brush.volume(), 24.0, epsilon = 1e-4);
        // local geometry untouched
        assert_relative_eq!(brush.mesh.volume(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_apply_matrix_bakes_vertices() {
        let mut brush = Brush::new(primitives::cuboid());
        brush.apply_matrix(&Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)));
        let (min, max) = brush.mesh.bounds();
        assert_relative_eq!(min.x, 4.5);
        assert_relative_eq!(max.x, 5.5);
        assert_eq!(brush.transform, Transform::identity());
    }
}
