// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use rustc_hash::FxHashMap;

/// Quantization used when matching vertices by position (micrometer precision)
const WELD_SCALE: f64 = 1e6;

type QuantizedPoint = (i64, i64, i64);

#[inline]
fn quantize(p: &Point3<f64>) -> QuantizedPoint {
    (
        (p.x * WELD_SCALE).round() as i64,
        (p.y * WELD_SCALE).round() as i64,
        (p.z * WELD_SCALE).round() as i64,
    )
}

/// Triangle mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f32>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count * 3),
            normals: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
        }
    }

    /// Add a vertex with normal
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>) {
        self.positions.push(position.x as f32);
        self.positions.push(position.y as f32);
        self.positions.push(position.z as f32);

        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);
    }

    /// Add a triangle
    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }

    /// Add a flat-shaded triangle with its own three vertices.
    /// Zero-area triangles are skipped.
    pub fn add_flat_triangle(&mut self, v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) {
        let normal = match (v1 - v0).cross(&(v2 - v0)).try_normalize(1e-12) {
            Some(n) => n,
            None => return,
        };
        let base_idx = self.vertex_count() as u32;
        self.add_vertex(v0, normal);
        self.add_vertex(v1, normal);
        self.add_vertex(v2, normal);
        self.add_triangle(base_idx, base_idx + 1, base_idx + 2);
    }

    /// Merge another mesh into this one
    #[inline]
    pub fn merge(&mut self, other: &Mesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = (self.positions.len() / 3) as u32;

        self.positions.reserve(other.positions.len());
        self.normals.reserve(other.normals.len());
        self.indices.reserve(other.indices.len());

        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Vertex position in f64
    #[inline]
    pub fn vertex(&self, index: usize) -> Point3<f64> {
        Point3::new(
            self.positions[index * 3] as f64,
            self.positions[index * 3 + 1] as f64,
            self.positions[index * 3 + 2] as f64,
        )
    }

    /// Iterate triangles as vertex triples
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            [
                self.vertex(tri[0] as usize),
                self.vertex(tri[1] as usize),
                self.vertex(tri[2] as usize),
            ]
        })
    }

    /// Calculate bounds (min, max)
    #[inline]
    pub fn bounds(&self) -> (Point3<f32>, Point3<f32>) {
        if self.positions.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = Point3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Point3::new(f32::MIN, f32::MIN, f32::MIN);

        self.positions.chunks_exact(3).for_each(|chunk| {
            let (x, y, z) = (chunk[0], chunk[1], chunk[2]);
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            min.z = min.z.min(z);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
            max.z = max.z.max(z);
        });

        (min, max)
    }

    /// Enclosed volume of a closed, outward-wound mesh (divergence theorem).
    ///
    /// Negative when the winding points inward.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[v0, v1, v2]| v0.coords.dot(&v1.coords.cross(&v2.coords)) / 6.0)
            .sum()
    }

    /// Absolute enclosed volume
    #[inline]
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Check that every position and normal is finite
    pub fn is_finite(&self) -> bool {
        self.positions.iter().all(|v| v.is_finite()) && self.normals.iter().all(|v| v.is_finite())
    }

    /// Check that every index references an existing vertex
    pub fn indices_in_range(&self) -> bool {
        let count = self.vertex_count() as u32;
        self.indices.len() % 3 == 0 && self.indices.iter().all(|&i| i < count)
    }

    /// Count edges not shared by exactly two triangles.
    ///
    /// Vertices are matched by quantized position so flat-shaded meshes
    /// with duplicated corners are handled. Zero for a closed manifold.
    pub fn open_edge_count(&self) -> usize {
        let mut edge_count: FxHashMap<(QuantizedPoint, QuantizedPoint), usize> =
            FxHashMap::default();

        for [v0, v1, v2] in self.triangles() {
            let q = [quantize(&v0), quantize(&v1), quantize(&v2)];
            if q[0] == q[1] || q[1] == q[2] || q[2] == q[0] {
                continue;
            }
            for (a, b) in [(q[0], q[1]), (q[1], q[2]), (q[2], q[0])] {
                let key = if a < b { (a, b) } else { (b, a) };
                *edge_count.entry(key).or_insert(0) += 1;
            }
        }

        edge_count.values().filter(|&&count| count != 2).count()
    }

    /// Transform positions and normals in place.
    ///
    /// Normals use the inverse transpose of the linear part. A mirroring
    /// matrix reverses triangle winding so the surface stays outward.
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        let linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(linear);

        for chunk in self.positions.chunks_exact_mut(3) {
            let p = Point3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            let t = matrix.transform_point(&p);
            chunk[0] = t.x as f32;
            chunk[1] = t.y as f32;
            chunk[2] = t.z as f32;
        }

        for chunk in self.normals.chunks_exact_mut(3) {
            let n = Vector3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            let t = (normal_matrix * n).try_normalize(1e-12).unwrap_or(n);
            chunk[0] = t.x as f32;
            chunk[1] = t.y as f32;
            chunk[2] = t.z as f32;
        }

        if linear.determinant() < 0.0 {
            for tri in self.indices.chunks_exact_mut(3) {
                tri.swap(1, 2);
            }
        }
    }

    /// Copy of this mesh transformed by `matrix`
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform(matrix);
        mesh
    }

    /// Clear the mesh
    #[inline]
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.indices.clear();
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}
