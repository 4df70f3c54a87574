// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room nodes.
//!
//! A [`RoomNode`] carries the state every node shares (uid, caption,
//! connection state, drag and selection flags, scene key) and a closed
//! [`RoomNodeKind`] payload. Per-variant behavior is dispatched by matching
//! on the payload.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stage_geometry::{primitives, Transform};

use crate::action_space::{ActionSpace, EvaluationOutcome, VolumeShape};
use crate::capture::{CaptureDevice, CaptureKind, CaptureRange, DeviceRegistry};
use crate::config::EvaluatorConfig;
use crate::error::{Error, Result};
use crate::registry::RoomNodeType;
use crate::scene::{
    Color, Material, NodeKey, SceneAttach, SceneGraph, SceneNode, LAYER_DEFAULT, LAYER_HIDDEN,
};

pub const CAPTURE_RANGE_NAME: &str = "capturerange";
const MARKER_SUFFIX: &str = "_marker";

/// Connection state of a node with its backend device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoomNodeState {
    /// Created locally, not yet confirmed.
    #[default]
    Pending,
    Virtual,
    Connected,
    Bypassed,
    Disconnected,
}

/// `{x, y, z}` as used by room messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vector3<f64>> for Xyz {
    fn from(v: Vector3<f64>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Xyz> for Vector3<f64> {
    fn from(v: Xyz) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

/// `{w, x, y, z}` quaternion as used by room messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wxyz {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<UnitQuaternion<f64>> for Wxyz {
    fn from(q: UnitQuaternion<f64>) -> Self {
        Self {
            w: q.w,
            x: q.i,
            y: q.j,
            z: q.k,
        }
    }
}

impl From<Wxyz> for UnitQuaternion<f64> {
    fn from(q: Wxyz) -> Self {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z))
    }
}

fn invalid(node_type: RoomNodeType, reason: impl Into<String>) -> Error {
    Error::InvalidParams {
        node_type: node_type.name().to_string(),
        reason: reason.into(),
    }
}

/// Payload of a camera or depth sensor.
#[derive(Debug, Clone)]
pub struct CaptureNode {
    pub device_name: Option<String>,
    range: CaptureRange,
    range_key: Option<NodeKey>,
}

impl CaptureNode {
    pub fn new(kind: CaptureKind) -> Self {
        Self {
            device_name: None,
            range: CaptureRange::for_kind(kind),
            range_key: None,
        }
    }

    pub fn range(&self) -> &CaptureRange {
        &self.range
    }

    /// Scene node holding the range geometry.
    pub fn range_key(&self) -> Option<NodeKey> {
        self.range_key
    }

    fn setup(&mut self, scene: &mut SceneGraph, key: NodeKey) -> Result<()> {
        let node = SceneNode::new(CAPTURE_RANGE_NAME)
            .with_mesh(
                self.range.geometry.clone(),
                Material::new(Color::from_hex(0xFFFFFF), 0.1),
            )
            .with_transform(self.range.offset)
            .with_layer(LAYER_HIDDEN);
        self.range_key = Some(scene.attach(key, node)?);
        Ok(())
    }

    /// Swap the sensing volume; the scene node is rebuilt when set up.
    pub fn set_range(
        &mut self,
        scene: &mut SceneGraph,
        key: NodeKey,
        range: CaptureRange,
    ) -> Result<()> {
        self.range = range;
        if let Some(old) = self.range_key.take() {
            scene.detach(old);
            self.setup(scene, key)?;
        }
        Ok(())
    }

    /// Draw the range while the device is dragged.
    pub fn show_capture_range(&self, scene: &mut SceneGraph, show: bool) {
        let layer = if show { LAYER_DEFAULT } else { LAYER_HIDDEN };
        if let Some(node) = self.range_key.and_then(|k| scene.get_mut(k)) {
            node.layer = layer;
        }
    }

    fn device(&self, uid: &str, kind: CaptureKind, scene: &SceneGraph) -> Option<CaptureDevice> {
        let range_key = self.range_key?;
        Some(CaptureDevice {
            uid: uid.to_string(),
            kind,
            geometry: self.range.geometry.clone(),
            world: scene.world_matrix(range_key)?,
        })
    }

    fn to_params(&self) -> Value {
        match &self.device_name {
            Some(name) => serde_json::json!({ "deviceName": name }),
            None => serde_json::json!({}),
        }
    }

    fn apply_params(&mut self, node_type: RoomNodeType, params: &Value) -> Result<()> {
        match params.get("deviceName") {
            None | Some(Value::Null) => {}
            Some(Value::String(name)) => self.device_name = Some(name.clone()),
            Some(Value::Number(n)) => self.device_name = Some(n.to_string()),
            Some(other) => {
                return Err(invalid(
                    node_type,
                    format!("deviceName must be a string, got {other}"),
                ))
            }
        }
        Ok(())
    }
}

/// Linear RGB in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// DMX settings of a moving-head light.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightParams {
    /// First DMX channel, 0..=512
    pub start_address: u16,
    pub dimmer: f64,
    pub color: Rgb,
    pub zoom: f64,
    pub strobe: f64,
    pub uv: f64,
    pub is_pan_flipped: bool,
    pub is_tilt_flipped: bool,
}

impl LightParams {
    pub const MAX_START_ADDRESS: u16 = 512;
}

/// Partial update of [`LightParams`]; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LightPatch {
    start_address: Option<f64>,
    dimmer: Option<f64>,
    color: Option<Rgb>,
    zoom: Option<f64>,
    strobe: Option<f64>,
    uv: Option<f64>,
    is_pan_flipped: Option<bool>,
    is_tilt_flipped: Option<bool>,
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightNode {
    pub params: LightParams,
}

impl LightNode {
    fn apply_params(&mut self, params: &Value) -> Result<()> {
        let patch: LightPatch = serde_json::from_value(params.clone())
            .map_err(|e| invalid(RoomNodeType::MovingHead, e.to_string()))?;

        let p = &mut self.params;
        if let Some(address) = patch.start_address {
            if !address.is_finite() {
                return Err(invalid(RoomNodeType::MovingHead, "startAddress is not a number"));
            }
            p.start_address =
                address.round().clamp(0.0, LightParams::MAX_START_ADDRESS as f64) as u16;
        }
        if let Some(v) = patch.dimmer {
            p.dimmer = unit(v);
        }
        if let Some(c) = patch.color {
            p.color = Rgb {
                r: unit(c.r),
                g: unit(c.g),
                b: unit(c.b),
            };
        }
        if let Some(v) = patch.zoom {
            p.zoom = unit(v);
        }
        if let Some(v) = patch.strobe {
            p.strobe = unit(v);
        }
        if let Some(v) = patch.uv {
            p.uv = unit(v);
        }
        if let Some(v) = patch.is_pan_flipped {
            p.is_pan_flipped = v;
        }
        if let Some(v) = patch.is_tilt_flipped {
            p.is_tilt_flipped = v;
        }
        Ok(())
    }
}

/// Variant payload of a room node.
#[derive(Debug)]
pub enum RoomNodeKind {
    Camera(CaptureNode),
    Sensor(CaptureNode),
    Light(LightNode),
    Projector,
    Body,
    Zone(ActionSpace),
}

impl RoomNodeKind {
    pub fn new_camera() -> Self {
        RoomNodeKind::Camera(CaptureNode::new(CaptureKind::Camera))
    }

    pub fn new_sensor() -> Self {
        RoomNodeKind::Sensor(CaptureNode::new(CaptureKind::DepthSensor))
    }

    pub fn new_light() -> Self {
        RoomNodeKind::Light(LightNode::default())
    }

    pub fn new_projector() -> Self {
        RoomNodeKind::Projector
    }

    pub fn new_body() -> Self {
        RoomNodeKind::Body
    }

    pub fn new_zone() -> Self {
        RoomNodeKind::Zone(ActionSpace::new())
    }

    pub fn node_type(&self) -> RoomNodeType {
        match self {
            RoomNodeKind::Camera(_) => RoomNodeType::Camera,
            RoomNodeKind::Sensor(_) => RoomNodeType::Kinect,
            RoomNodeKind::Light(_) => RoomNodeType::MovingHead,
            RoomNodeKind::Projector => RoomNodeType::Projector,
            RoomNodeKind::Body => RoomNodeType::Body,
            RoomNodeKind::Zone(_) => RoomNodeType::ActionSpace,
        }
    }

    pub fn capture_kind(&self) -> Option<CaptureKind> {
        match self {
            RoomNodeKind::Camera(_) => Some(CaptureKind::Camera),
            RoomNodeKind::Sensor(_) => Some(CaptureKind::DepthSensor),
            _ => None,
        }
    }

    pub fn as_capture(&self) -> Option<&CaptureNode> {
        match self {
            RoomNodeKind::Camera(c) | RoomNodeKind::Sensor(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_capture_mut(&mut self) -> Option<&mut CaptureNode> {
        match self {
            RoomNodeKind::Camera(c) | RoomNodeKind::Sensor(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_action_space(&self) -> Option<&ActionSpace> {
        match self {
            RoomNodeKind::Zone(space) => Some(space),
            _ => None,
        }
    }

    pub fn as_action_space_mut(&mut self) -> Option<&mut ActionSpace> {
        match self {
            RoomNodeKind::Zone(space) => Some(space),
            _ => None,
        }
    }

    /// Build the variant's scene children under `key`.
    pub fn setup(&mut self, scene: &mut SceneGraph, key: NodeKey) -> Result<()> {
        let marker = match self {
            RoomNodeKind::Zone(space) => return space.setup(scene, key),
            RoomNodeKind::Camera(capture) | RoomNodeKind::Sensor(capture) => {
                capture.setup(scene, key)?;
                primitives::aabb(Point3::new(-0.1, -0.1, -0.1), Point3::new(0.1, 0.1, 0.1))
            }
            RoomNodeKind::Light(_) => primitives::cylinder(0.1, 0.15, 0.3, 16),
            RoomNodeKind::Projector => {
                primitives::aabb(Point3::new(-0.15, -0.075, -0.2), Point3::new(0.15, 0.075, 0.2))
            }
            RoomNodeKind::Body => primitives::sphere(0.06, 16, 16),
        };

        let name = format!("{}{}", self.node_type().name(), MARKER_SUFFIX);
        scene.attach(
            key,
            SceneNode::new(name).with_mesh(marker, Material::new(Color::from_hex(0x333333), 1.0)),
        )?;
        Ok(())
    }

    /// Per-frame update; a dragged zone re-evaluates its coverage.
    pub fn update(
        &mut self,
        scene: &mut SceneGraph,
        key: NodeKey,
        dragged: bool,
        registry: &dyn DeviceRegistry,
        config: &EvaluatorConfig,
    ) -> Option<EvaluationOutcome> {
        match self {
            RoomNodeKind::Zone(space) if dragged => {
                Some(space.evaluate_action_space(scene, key, registry, config))
            }
            _ => None,
        }
    }

    pub fn to_params(&self, scene: &SceneGraph, key: NodeKey) -> Value {
        match self {
            RoomNodeKind::Zone(space) => {
                let size = scene
                    .get(key)
                    .map(|n| n.transform().scale)
                    .unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
                serde_json::json!({
                    "type": space.shape().code(),
                    "size": Xyz::from(size),
                })
            }
            RoomNodeKind::Camera(capture) | RoomNodeKind::Sensor(capture) => capture.to_params(),
            RoomNodeKind::Light(light) => {
                serde_json::to_value(&light.params).unwrap_or_else(|_| serde_json::json!({}))
            }
            RoomNodeKind::Projector | RoomNodeKind::Body => serde_json::json!({}),
        }
    }

    /// Merge params into the node; absent keys are left unchanged.
    pub fn apply_params(
        &mut self,
        scene: &mut SceneGraph,
        key: NodeKey,
        params: &Value,
    ) -> Result<()> {
        let node_type = self.node_type();
        if !params.is_object() {
            return Err(invalid(node_type, "params must be an object"));
        }

        match self {
            RoomNodeKind::Zone(space) => {
                if let Some(code) = params.get("type").filter(|v| !v.is_null()) {
                    let code = code
                        .as_f64()
                        .filter(|c| c.is_finite())
                        .ok_or_else(|| invalid(node_type, "type must be a shape code"))?;
                    space.set_shape(scene, key, VolumeShape::from_code(code as i64))?;
                }
                if let Some(size) = params.get("size").filter(|v| !v.is_null()) {
                    let size: Xyz = serde_json::from_value(size.clone())
                        .map_err(|e| invalid(node_type, format!("size: {e}")))?;
                    let transform = scene
                        .get(key)
                        .map(|n| *n.transform())
                        .ok_or(Error::SceneNodeNotFound(key))?;
                    scene.set_transform(key, transform.with_scale(size.into()))?;
                }
                Ok(())
            }
            RoomNodeKind::Camera(capture) | RoomNodeKind::Sensor(capture) => {
                capture.apply_params(node_type, params)
            }
            RoomNodeKind::Light(light) => light.apply_params(params),
            RoomNodeKind::Projector | RoomNodeKind::Body => Ok(()),
        }
    }

    pub fn on_drag_start(&mut self, scene: &mut SceneGraph) {
        match self {
            RoomNodeKind::Zone(space) => space.on_drag_start(scene),
            RoomNodeKind::Camera(capture) | RoomNodeKind::Sensor(capture) => {
                capture.show_capture_range(scene, true)
            }
            RoomNodeKind::Light(_) | RoomNodeKind::Projector | RoomNodeKind::Body => {}
        }
    }

    pub fn on_drag_end(&mut self, scene: &mut SceneGraph) {
        match self {
            RoomNodeKind::Zone(space) => space.on_drag_end(scene),
            RoomNodeKind::Camera(capture) | RoomNodeKind::Sensor(capture) => {
                capture.show_capture_range(scene, false)
            }
            RoomNodeKind::Light(_) | RoomNodeKind::Projector | RoomNodeKind::Body => {}
        }
    }
}

/// A node placed in the room.
#[derive(Debug)]
pub struct RoomNode {
    uid: String,
    pub caption: String,
    pub state: RoomNodeState,
    pub selected: bool,
    dragged: bool,
    key: NodeKey,
    kind: RoomNodeKind,
}

impl RoomNode {
    pub(crate) fn new(
        uid: String,
        caption: String,
        state: RoomNodeState,
        key: NodeKey,
        kind: RoomNodeKind,
    ) -> Self {
        Self {
            uid,
            caption,
            state,
            selected: false,
            dragged: false,
            key,
            kind,
        }
    }

    #[inline]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[inline]
    pub fn node_type(&self) -> RoomNodeType {
        self.kind.node_type()
    }

    /// Root scene node of this room node.
    #[inline]
    pub fn key(&self) -> NodeKey {
        self.key
    }

    #[inline]
    pub fn kind(&self) -> &RoomNodeKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut RoomNodeKind {
        &mut self.kind
    }

    #[inline]
    pub fn is_dragged(&self) -> bool {
        self.dragged
    }

    /// Record the drag flag and run the matching hook.
    pub(crate) fn set_dragged(&mut self, scene: &mut SceneGraph, dragged: bool) {
        self.dragged = dragged;
        if dragged {
            self.kind.on_drag_start(scene);
        } else {
            self.kind.on_drag_end(scene);
        }
    }

    pub fn transform(&self, scene: &SceneGraph) -> Option<Transform> {
        scene.get(self.key).map(|n| *n.transform())
    }

    /// Evaluator view of a capture device, if this is one.
    pub fn capture_device(&self, scene: &SceneGraph) -> Option<CaptureDevice> {
        let kind = self.kind.capture_kind()?;
        self.kind.as_capture()?.device(&self.uid, kind, scene)
    }

    /// Distance along a ray to this node's drawn geometry.
    ///
    /// Only meshes on the default layer are tested, against their
    /// world-space bounding boxes.
    pub fn hit(
        &self,
        scene: &SceneGraph,
        origin: Point3<f64>,
        direction: Vector3<f64>,
    ) -> Option<f64> {
        let direction = direction.try_normalize(1e-12)?;
        scene
            .subtree(self.key)
            .into_iter()
            .filter(|&k| {
                scene
                    .get(k)
                    .is_some_and(|n| n.visible && n.layer == LAYER_DEFAULT && n.mesh.is_some())
            })
            .filter_map(|k| scene.mesh_world_bounds(k))
            .filter_map(|(min, max)| ray_box_distance(&origin, &direction, &min, &max))
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Slab test; returns the entry distance, or the exit distance when the
/// origin is inside the box.
fn ray_box_distance(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    min: &Point3<f64>,
    max: &Point3<f64>,
) -> Option<f64> {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1e-12 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (t0, t1) = {
            let a = (min[axis] - o) * inv;
            let b = (max[axis] - o) * inv;
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    if t_max < 0.0 {
        return None;
    }
    Some(if t_min >= 0.0 { t_min } else { t_max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn placed(kind: RoomNodeKind, transform: Transform) -> (SceneGraph, RoomNode) {
        let mut scene = SceneGraph::new();
        let key = scene
            .attach(scene.root(), SceneNode::new(kind.node_type().name()).with_transform(transform))
            .unwrap();
        let mut kind = kind;
        kind.setup(&mut scene, key).unwrap();
        let node = RoomNode::new("n1".into(), "Node".into(), RoomNodeState::Connected, key, kind);
        (scene, node)
    }

    #[test]
    fn test_ray_box_distance() {
        let min = Point3::new(-1.0, -1.0, -1.0);
        let max = Point3::new(1.0, 1.0, 1.0);
        let d = ray_box_distance(&Point3::new(0.0, 0.0, -5.0), &Vector3::z(), &min, &max);
        assert_relative_eq!(d.unwrap(), 4.0);
        let inside = ray_box_distance(&Point3::origin(), &Vector3::z(), &min, &max);
        assert_relative_eq!(inside.unwrap(), 1.0);
        let above = Point3::new(0.0, 3.0, -5.0);
        assert!(ray_box_distance(&above, &Vector3::z(), &min, &max).is_none());
        assert!(ray_box_distance(&Point3::new(0.0, 0.0, 5.0), &Vector3::z(), &min, &max).is_none());
    }

    #[test]
    fn test_camera_hit_ignores_hidden_range() {
        let (mut scene, mut node) = placed(RoomNodeKind::new_camera(), Transform::identity());
        // Range points along +Z; only the marker is drawn
        let d = node.hit(&scene, Point3::new(0.0, 0.0, 8.0), -Vector3::z()).unwrap();
        assert_relative_eq!(d, 7.9, epsilon = 1e-6);

        node.set_dragged(&mut scene, true);
        let d = node.hit(&scene, Point3::new(0.0, 0.0, 8.0), -Vector3::z()).unwrap();
        assert_relative_eq!(d, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_capture_range_layers_follow_drag() {
        let (mut scene, mut node) = placed(RoomNodeKind::new_sensor(), Transform::identity());
        let range = node.kind().as_capture().unwrap().range_key().unwrap();
        assert_eq!(scene.get(range).unwrap().layer, LAYER_HIDDEN);
        node.set_dragged(&mut scene, true);
        assert_eq!(scene.get(range).unwrap().layer, LAYER_DEFAULT);
        node.set_dragged(&mut scene, false);
        assert_eq!(scene.get(range).unwrap().layer, LAYER_HIDDEN);
    }

    #[test]
    fn test_capture_device_world_matrix() {
        let (scene, node) = placed(
            RoomNodeKind::new_camera(),
            Transform::from_position(Vector3::new(0.0, 1.0, 0.0)),
        );
        let device = node.capture_device(&scene).unwrap();
        assert_eq!(device.kind, CaptureKind::Camera);
        let apex = device.world.transform_point(&Point3::origin());
        assert_relative_eq!(apex, Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_zone_params() {
        let (mut scene, mut node) = placed(RoomNodeKind::new_zone(), Transform::identity());
        let key = node.key();
        node.kind_mut()
            .apply_params(
                &mut scene,
                key,
                &serde_json::json!({ "type": 0, "size": { "x": 2.0, "y": 1.0, "z": 3.0 } }),
            )
            .unwrap();

        let params = node.kind().to_params(&scene, key);
        assert_eq!(params["type"], 0);
        assert_eq!(params["size"]["z"], 3.0);
        assert_eq!(node.kind().as_action_space().unwrap().shape(), VolumeShape::Sphere);

        let err = node
            .kind_mut()
            .apply_params(&mut scene, key, &serde_json::json!({ "size": "big" }))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_light_params_are_clamped_and_partial() {
        let (mut scene, mut node) = placed(RoomNodeKind::new_light(), Transform::identity());
        let key = node.key();
        node.kind_mut()
            .apply_params(
                &mut scene,
                key,
                &serde_json::json!({ "startAddress": 600, "dimmer": 0.5 }),
            )
            .unwrap();
        node.kind_mut()
            .apply_params(&mut scene, key, &serde_json::json!({ "isPanFlipped": true }))
            .unwrap();

        let params = node.kind().to_params(&scene, key);
        assert_eq!(params["startAddress"], 512);
        assert_eq!(params["dimmer"], 0.5);
        assert_eq!(params["isPanFlipped"], true);
        assert_eq!(params["isTiltFlipped"], false);
    }

    #[test]
    fn test_device_name_params() {
        let (mut scene, mut node) = placed(RoomNodeKind::new_camera(), Transform::identity());
        let key = node.key();
        assert_eq!(node.kind().to_params(&scene, key), serde_json::json!({}));
        node.kind_mut()
            .apply_params(&mut scene, key, &serde_json::json!({ "deviceName": 3 }))
            .unwrap();
        assert_eq!(node.kind().to_params(&scene, key)["deviceName"], "3");
    }
}
