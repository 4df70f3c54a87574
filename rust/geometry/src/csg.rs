// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CSG (Constructive Solid Geometry) Operations
//!
//! Boolean evaluation between brushes, delegated to csgrs. This module only
//! prepares operands (transforms applied, inputs validated) and converts
//! between mesh formats.

use crate::brush::Brush;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::triangulation::{calculate_polygon_normal, triangulate_oriented};
use nalgebra::{Point3, Vector3};
use std::fmt;

/// Boolean operator between two brushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    Union,
    Intersection,
    Subtraction,
}

impl fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanOp::Union => write!(f, "UNION"),
            BooleanOp::Intersection => write!(f, "INTERSECTION"),
            BooleanOp::Subtraction => write!(f, "SUBTRACTION"),
        }
    }
}

/// Evaluates boolean operations between brushes
#[derive(Debug, Clone)]
pub struct BooleanEvaluator {
    /// Area below which output triangles are dropped
    pub epsilon: f64,
}

impl BooleanEvaluator {
    pub fn new() -> Self {
        Self { epsilon: 1e-9 }
    }

    pub fn with_epsilon(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Combine `a` and `b` with `op`.
    ///
    /// Both operands are placed by their own transforms; the result carries
    /// an identity transform. Inputs are left untouched.
    pub fn evaluate(&self, a: &Brush, b: &Brush, op: BooleanOp) -> Result<Brush> {
        let mesh_a = a.world_mesh();
        let mesh_b = b.world_mesh();
        Self::validate_operand(&mesh_a, "first operand")?;
        Self::validate_operand(&mesh_b, "second operand")?;

        // Empty operands never reach csgrs
        match (mesh_a.is_empty(), mesh_b.is_empty(), op) {
            (_, true, BooleanOp::Union) | (_, true, BooleanOp::Subtraction) => {
                return Ok(Brush::new(mesh_a));
            }
            (true, _, BooleanOp::Union) => return Ok(Brush::new(mesh_b)),
            (true, _, _) | (_, true, BooleanOp::Intersection) => {
                return Ok(Brush::default());
            }
            _ => {}
        }

        let result = self.evaluate_meshes(&mesh_a, &mesh_b, op)?;
        if !result.is_finite() {
            return Err(Error::boolean(format!("{} produced non-finite vertices", op)));
        }

        tracing::trace!(
            %op,
            a_triangles = mesh_a.triangle_count(),
            b_triangles = mesh_b.triangle_count(),
            result_triangles = result.triangle_count(),
            "boolean evaluated"
        );
        Ok(Brush::new(result))
    }

    /// Run the csgrs operation on placed meshes
    fn evaluate_meshes(&self, a: &Mesh, b: &Mesh, op: BooleanOp) -> Result<Mesh> {
        use csgrs::traits::CSG;

        let a_csg = Self::mesh_to_csgrs(a)?;
        let b_csg = Self::mesh_to_csgrs(b)?;

        let result_csg = match op {
            BooleanOp::Union => a_csg.union(&b_csg),
            BooleanOp::Intersection => a_csg.intersection(&b_csg),
            BooleanOp::Subtraction => a_csg.difference(&b_csg),
        };

        self.csgrs_to_mesh(&result_csg)
    }

    fn validate_operand(mesh: &Mesh, name: &str) -> Result<()> {
        if !mesh.is_finite() {
            return Err(Error::boolean(format!("{} has non-finite vertices", name)));
        }
        if !mesh.indices_in_range() {
            return Err(Error::boolean(format!("{} has out-of-range indices", name)));
        }
        Ok(())
    }

    /// Convert our Mesh format to csgrs Mesh format
    fn mesh_to_csgrs(mesh: &Mesh) -> Result<csgrs::mesh::Mesh<()>> {
        use csgrs::mesh::{polygon::Polygon, vertex::Vertex, Mesh as CSGMesh};

        let mut polygons = Vec::with_capacity(mesh.triangle_count());

        for [v0, v1, v2] in mesh.triangles() {
            // Degenerate triangles would propagate NaN normals
            let face_normal = match (v1 - v0).cross(&(v2 - v0)).try_normalize(1e-12) {
                Some(n) => n,
                None => continue,
            };

            let vertices = vec![
                Vertex::new(v0, face_normal),
                Vertex::new(v1, face_normal),
                Vertex::new(v2, face_normal),
            ];
            polygons.push(Polygon::new(vertices, None));
        }

        if polygons.is_empty() {
            return Err(Error::EmptyMesh("operand has only degenerate triangles".to_string()));
        }

        Ok(CSGMesh::from_polygons(&polygons, None))
    }

    /// Convert csgrs Mesh format back to our Mesh format
    fn csgrs_to_mesh(&self, csg_mesh: &csgrs::mesh::Mesh<()>) -> Result<Mesh> {
        let mut mesh = Mesh::new();

        for polygon in &csg_mesh.polygons {
            let vertices = &polygon.vertices;
            if vertices.len() < 3 {
                continue;
            }

            let points: Vec<Point3<f64>> = vertices
                .iter()
                .map(|v| Point3::new(v.pos[0], v.pos[1], v.pos[2]))
                .collect();

            // Prefer the polygon's plane normal; recompute if it is unusable
            let raw_normal = Vector3::new(
                vertices[0].normal[0],
                vertices[0].normal[1],
                vertices[0].normal[2],
            );
            let normal = match raw_normal.try_normalize(1e-10) {
                Some(n) if n.iter().all(|c| c.is_finite()) => n,
                _ => match calculate_polygon_normal(&points) {
                    Some(n) => n,
                    None => continue,
                },
            };

            let triangles = match triangulate_oriented(&points, &normal) {
                Ok(t) => t,
                Err(_) => continue,
            };

            for [i0, i1, i2] in triangles {
                let (a, b, c) = (points[i0], points[i1], points[i2]);
                if (b - a).cross(&(c - a)).norm() * 0.5 <= self.epsilon {
                    continue;
                }
                mesh.add_flat_triangle(a, b, c);
            }
        }

        Ok(mesh)
    }
}

impl Default for BooleanEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
