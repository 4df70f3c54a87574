// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unit geometries for volumes and capture ranges
//!
//! Shapes follow the renderer's conventions: boxes and cylinders are
//! centered on the origin with their axis along +Y, capture ranges open
//! along +Z from the device origin. All primitives are convex, closed and
//! wound outward.

use crate::mesh::Mesh;
use nalgebra::Point3;
use std::f64::consts::PI;

/// Default segment counts for the unit volumes
pub const SPHERE_WIDTH_SEGMENTS: u32 = 16;
pub const SPHERE_HEIGHT_SEGMENTS: u32 = 16;
pub const RADIAL_SEGMENTS: u32 = 32;

/// Collects triangles of a convex solid and orients each one away from an
/// interior point.
struct ConvexBuilder {
    interior: Point3<f64>,
    mesh: Mesh,
}

impl ConvexBuilder {
    fn new(interior: Point3<f64>) -> Self {
        Self {
            interior,
            mesh: Mesh::new(),
        }
    }

    fn triangle(&mut self, a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) {
        let normal = (b - a).cross(&(c - a));
        let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
        if normal.dot(&(centroid - self.interior)) >= 0.0 {
            self.mesh.add_flat_triangle(a, b, c);
        } else {
            self.mesh.add_flat_triangle(a, c, b);
        }
    }

    fn quad(&mut self, a: Point3<f64>, b: Point3<f64>, c: Point3<f64>, d: Point3<f64>) {
        self.triangle(a, b, c);
        self.triangle(a, c, d);
    }

    fn finish(self) -> Mesh {
        self.mesh
    }
}

/// Axis-aligned box from min/max corners (12 triangles)
pub fn aabb(min: Point3<f64>, max: Point3<f64>) -> Mesh {
    let v = |x: bool, y: bool, z: bool| {
        Point3::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };
    let mut builder = ConvexBuilder::new(Point3::from((min.coords + max.coords) * 0.5));

    let (c000, c100, c110, c010) = (
        v(false, false, false),
        v(true, false, false),
        v(true, true, false),
        v(false, true, false),
    );
    let (c001, c101, c111, c011) = (
        v(false, false, true),
        v(true, false, true),
        v(true, true, true),
        v(false, true, true),
    );

    // -Z, +Z
    builder.quad(c000, c100, c110, c010);
    builder.quad(c001, c101, c111, c011);
    // -X, +X
    builder.quad(c000, c010, c011, c001);
    builder.quad(c100, c110, c111, c101);
    // -Y, +Y
    builder.quad(c000, c100, c101, c001);
    builder.quad(c010, c110, c111, c011);

    builder.finish()
}

/// Unit cube centered on the origin (edge length 1)
pub fn cuboid() -> Mesh {
    aabb(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5))
}

/// UV sphere centered on the origin
pub fn sphere(radius: f64, width_segments: u32, height_segments: u32) -> Mesh {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);

    let point = |column: u32, row: u32| -> Point3<f64> {
        if row == 0 {
            return Point3::new(0.0, radius, 0.0);
        }
        if row == height_segments {
            return Point3::new(0.0, -radius, 0.0);
        }
        let phi = (column % width_segments) as f64 / width_segments as f64 * 2.0 * PI;
        let theta = row as f64 / height_segments as f64 * PI;
        Point3::new(
            -radius * phi.cos() * theta.sin(),
            radius * theta.cos(),
            radius * phi.sin() * theta.sin(),
        )
    };

    let mut builder = ConvexBuilder::new(Point3::origin());
    for row in 0..height_segments {
        for column in 0..width_segments {
            let a = point(column, row);
            let b = point(column + 1, row);
            let c = point(column + 1, row + 1);
            let d = point(column, row + 1);
            if row != 0 {
                builder.triangle(a, b, d);
            }
            if row != height_segments - 1 {
                builder.triangle(b, c, d);
            }
        }
    }
    builder.finish()
}

/// Cylinder or truncated cone along Y, centered on the origin.
///
/// A zero top radius yields a cone with its apex at `+height / 2`.
pub fn cylinder(radius_top: f64, radius_bottom: f64, height: f64, radial_segments: u32) -> Mesh {
    let segments = radial_segments.max(3);
    let half = height * 0.5;

    let ring = |radius: f64, y: f64| -> Vec<Point3<f64>> {
        (0..segments)
            .map(|i| {
                let theta = i as f64 / segments as f64 * 2.0 * PI;
                Point3::new(radius * theta.sin(), y, radius * theta.cos())
            })
            .collect()
    };

    let top = ring(radius_top, half);
    let bottom = ring(radius_bottom, -half);
    let top_center = Point3::new(0.0, half, 0.0);
    let bottom_center = Point3::new(0.0, -half, 0.0);

    let mut builder = ConvexBuilder::new(Point3::origin());
    for i in 0..segments as usize {
        let j = (i + 1) % segments as usize;
        if radius_top > 0.0 {
            builder.quad(top[i], top[j], bottom[j], bottom[i]);
            builder.triangle(top_center, top[i], top[j]);
        } else {
            builder.triangle(top_center, bottom[j], bottom[i]);
        }
        if radius_bottom > 0.0 {
            builder.triangle(bottom_center, bottom[j], bottom[i]);
        }
    }
    builder.finish()
}

/// Unit cone (radius 1, height 1, apex up)
pub fn cone(radial_segments: u32) -> Mesh {
    cylinder(0.0, 1.0, 1.0, radial_segments)
}

/// Rectangular pyramid along +Z with its apex at the origin.
pub fn pyramid(half_width: f64, half_height: f64, length: f64) -> Mesh {
    let apex = Point3::origin();
    let corners = [
        Point3::new(-half_width, -half_height, length),
        Point3::new(half_width, -half_height, length),
        Point3::new(half_width, half_height, length),
        Point3::new(-half_width, half_height, length),
    ];

    let mut builder = ConvexBuilder::new(Point3::new(0.0, 0.0, length * 0.75));
    for i in 0..4 {
        builder.triangle(apex, corners[i], corners[(i + 1) % 4]);
    }
    builder.quad(corners[0], corners[1], corners[2], corners[3]);
    builder.finish()
}

/// Sensing frustum along +Z from field-of-view angles (radians).
///
/// A near distance of zero produces a pyramid with its apex at the origin.
pub fn view_frustum(horizontal_fov: f64, vertical_fov: f64, near: f64, far: f64) -> Mesh {
    let tan_w = (horizontal_fov * 0.5).tan();
    let tan_h = (vertical_fov * 0.5).tan();

    if near <= f64::EPSILON {
        return pyramid(tan_w * far, tan_h * far, far);
    }

    let rect = |d: f64| -> [Point3<f64>; 4] {
        [
            Point3::new(-tan_w * d, -tan_h * d, d),
            Point3::new(tan_w * d, -tan_h * d, d),
            Point3::new(tan_w * d, tan_h * d, d),
            Point3::new(-tan_w * d, tan_h * d, d),
        ]
    };
    let n = rect(near);
    let f = rect(far);

    let mut builder = ConvexBuilder::new(Point3::new(0.0, 0.0, (near + far) * 0.5));
    builder.quad(n[0], n[1], n[2], n[3]);
    builder.quad(f[0], f[1], f[2], f[3]);
    for i in 0..4 {
        let j = (i + 1) % 4;
        builder.quad(n[i], n[j], f[j], f[i]);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_is_closed_unit_volume() {
        let mesh = cuboid();
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.open_edge_count(), 0);
        assert_relative_eq!(mesh.signed_volume(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sphere_is_closed() {
        let mesh = sphere(1.0, SPHERE_WIDTH_SEGMENTS, SPHERE_HEIGHT_SEGMENTS);
        assert_eq!(mesh.open_edge_count(), 0);
        // Inscribed polyhedron: a bit below 4/3 pi
        let volume = mesh.signed_volume();
        assert!(volume > 3.9 && volume < 4.0 * PI / 3.0, "volume {}", volume);
    }

    #[test]
    fn test_cylinder_and_cone_are_closed() {
        let cyl = cylinder(1.0, 1.0, 1.0, RADIAL_SEGMENTS);
        assert_eq!(cyl.open_edge_count(), 0);
        assert_relative_eq!(cyl.signed_volume(), PI, epsilon = 0.03);

        let cone = cone(RADIAL_SEGMENTS);
        assert_eq!(cone.open_edge_count(), 0);
        assert_relative_eq!(cone.signed_volume(), PI / 3.0, epsilon = 0.01);
    }

    #[test]
    fn test_pyramid_volume() {
        let mesh = pyramid(1.0, 2.0, 3.0);
        assert_eq!(mesh.open_edge_count(), 0);
        // base 2 x 4, height 3
        assert_relative_eq!(mesh.signed_volume(), 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_view_frustum_truncated() {
        let fov = 2.0 * 1.0f64.atan(); // tan(fov/2) = 1
        let mesh = view_frustum(fov, fov, 1.0, 2.0);
        assert_eq!(mesh.open_edge_count(), 0);
        // apex pyramid to the far plane minus apex pyramid to the near plane
        let expected = (16.0 * 2.0 - 4.0 * 1.0) / 3.0;
        assert_relative_eq!(mesh.signed_volume(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_normals_point_outward() {
        let mesh = cuboid();
        for [a, b, c] in mesh.triangles() {
            let normal = (b - a).cross(&(c - a));
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(normal.dot(&centroid) > 0.0);
        }
    }
}
