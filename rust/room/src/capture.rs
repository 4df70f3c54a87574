// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capture devices and their sensing ranges.

use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use stage_geometry::{primitives, Mesh, Transform};
use std::f64::consts::FRAC_1_SQRT_2;

/// Kinds of device whose range counts toward action-space coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Camera,
    DepthSensor,
}

impl CaptureKind {
    pub const ALL: [CaptureKind; 2] = [CaptureKind::Camera, CaptureKind::DepthSensor];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Camera => "camera",
            CaptureKind::DepthSensor => "depthsensor",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "camera" => Some(CaptureKind::Camera),
            "depthsensor" | "kinect" | "sensor" => Some(CaptureKind::DepthSensor),
            _ => None,
        }
    }
}

/// Sensing volume of a device, in the device's local frame.
#[derive(Debug, Clone)]
pub struct CaptureRange {
    /// Closed range geometry
    pub geometry: Mesh,
    /// Placement of the geometry relative to the device
    pub offset: Transform,
}

impl CaptureRange {
    /// Camera length along the optical axis.
    pub const CAMERA_RANGE: f64 = 5.0;

    /// Depth sensor field of view (degrees) and working range (meters).
    pub const SENSOR_FOV_DEG: (f64, f64) = (75.0, 65.0);
    pub const SENSOR_NEAR: f64 = 0.5;
    pub const SENSOR_FAR: f64 = 3.86;

    pub fn new(geometry: Mesh, offset: Transform) -> Self {
        Self { geometry, offset }
    }

    /// Square pyramid opening along +Z: length 5, base half-diagonal 5.
    pub fn camera() -> Self {
        let half = Self::CAMERA_RANGE * FRAC_1_SQRT_2;
        Self::new(
            primitives::pyramid(half, half, Self::CAMERA_RANGE),
            Transform::identity(),
        )
    }

    /// Truncated frustum opening along +Z.
    pub fn depth_sensor() -> Self {
        let (h, v) = Self::SENSOR_FOV_DEG;
        Self::new(
            primitives::view_frustum(
                h.to_radians(),
                v.to_radians(),
                Self::SENSOR_NEAR,
                Self::SENSOR_FAR,
            ),
            Transform::identity(),
        )
    }

    pub fn for_kind(kind: CaptureKind) -> Self {
        match kind {
            CaptureKind::Camera => Self::camera(),
            CaptureKind::DepthSensor => Self::depth_sensor(),
        }
    }

    /// Box-shaped range covering `min..max` in device space.
    pub fn aabb(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self::new(
            primitives::aabb(min.into(), max.into()),
            Transform::identity(),
        )
    }
}

/// A capture device as seen by the evaluator: read-only geometry and its
/// world placement.
#[derive(Debug, Clone)]
pub struct CaptureDevice {
    pub uid: String,
    pub kind: CaptureKind,
    /// Range geometry in the range node's local frame
    pub geometry: Mesh,
    /// World matrix of the range node
    pub world: Matrix4<f64>,
}

/// Lookup of capture devices without owning their lifecycle.
pub trait DeviceRegistry {
    fn capture_devices(&self, kind: CaptureKind) -> Vec<CaptureDevice>;

    /// Devices of several kinds, in kind order.
    fn capture_devices_of(&self, kinds: &[CaptureKind]) -> Vec<CaptureDevice> {
        kinds
            .iter()
            .flat_map(|&kind| self.capture_devices(kind))
            .collect()
    }
}

/// Devices copied out of a registry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot(pub Vec<CaptureDevice>);

impl DeviceRegistry for DeviceSnapshot {
    fn capture_devices(&self, kind: CaptureKind) -> Vec<CaptureDevice> {
        self.0.iter().filter(|d| d.kind == kind).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn device(uid: &str, kind: CaptureKind) -> CaptureDevice {
        CaptureDevice {
            uid: uid.to_string(),
            kind,
            geometry: CaptureRange::for_kind(kind).geometry,
            world: Matrix4::identity(),
        }
    }

    #[test]
    fn test_snapshot_filters_by_kind() {
        let snapshot = DeviceSnapshot(vec![
            device("k1", CaptureKind::DepthSensor),
            device("c1", CaptureKind::Camera),
            device("c2", CaptureKind::Camera),
        ]);
        assert_eq!(snapshot.capture_devices(CaptureKind::Camera).len(), 2);
        let uids: Vec<String> = snapshot
            .capture_devices_of(&CaptureKind::ALL)
            .into_iter()
            .map(|d| d.uid)
            .collect();
        assert_eq!(uids, vec!["c1", "c2", "k1"]);
    }

    #[test]
    fn test_camera_range_is_closed_pyramid() {
        let range = CaptureRange::camera();
        assert_eq!(range.geometry.open_edge_count(), 0);
        let (min, max) = range.geometry.bounds();
        assert_relative_eq!(min.z, 0.0);
        assert_relative_eq!(max.z, 5.0);
        assert_relative_eq!(max.x, 5.0 * FRAC_1_SQRT_2 as f32, epsilon = 1e-5);
    }

    #[test]
    fn test_depth_sensor_range_starts_at_near_plane() {
        let range = CaptureRange::depth_sensor();
        assert_eq!(range.geometry.open_edge_count(), 0);
        let (min, max) = range.geometry.bounds();
        assert_relative_eq!(min.z, 0.5);
        assert_relative_eq!(max.z, 3.86, epsilon = 1e-5);
    }

    #[test]
    fn test_kind_names() {
        for kind in CaptureKind::ALL {
            assert_eq!(CaptureKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CaptureKind::parse("Kinect"), Some(CaptureKind::DepthSensor));
        assert_eq!(CaptureKind::parse("projector"), None);
    }
}
