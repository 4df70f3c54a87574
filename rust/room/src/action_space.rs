// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Action spaces and their capture coverage.
//!
//! An action space is a zone of interaction: a unit shape stretched by its
//! node's non-uniform scale. [`ActionSpaceEvaluator`] splits the zone into
//! the part observed by the union of all capture ranges and the part that is
//! not, and [`ActionSpace`] publishes both into the scene underneath the
//! zone node.
//!
//! Booleans run in the zone's de-scaled frame: the zone brush carries its
//! scale in its vertices, capture ranges are moved into the same frame, and
//! the results are given the inverse scale so they render correctly under
//! the scaled zone node.

use nalgebra::Matrix4;
use stage_geometry::{primitives, BooleanEvaluator, BooleanOp, Brush, FrameNormalizer, Mesh};

use crate::capture::{CaptureDevice, DeviceRegistry};
use crate::config::EvaluatorConfig;
use crate::error::{Error, Result};
use crate::scene::{Color, Material, NodeKey, SceneAttach, SceneGraph, SceneNode};

pub const GENERAL_SHAPE_NAME: &str = "actionspace_generalshape";
pub const VISIBLE_CONTAINER_NAME: &str = "actionspace_intersectionshape";
pub const OCCLUDED_CONTAINER_NAME: &str = "actionspace_differenceshape";
const VISIBLE_MESH_NAME: &str = "actionspace_intersection";
const OCCLUDED_MESH_NAME: &str = "actionspace_difference";

pub const ZONE_COLOR: u32 = 0xFFD900;
pub const ZONE_OPACITY: f32 = 0.5;

/// Material shared by every part of a zone.
pub fn zone_material() -> Material {
    Material::new(Color::from_hex(ZONE_COLOR), ZONE_OPACITY)
}

/// Shape of an action space, with its room message code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VolumeShape {
    Unknown,
    Sphere,
    Cylinder,
    #[default]
    Cuboid,
    Cone,
    Freeform,
}

impl VolumeShape {
    pub fn code(&self) -> i64 {
        match self {
            VolumeShape::Unknown => -1,
            VolumeShape::Sphere => 0,
            VolumeShape::Cylinder => 1,
            VolumeShape::Cuboid => 2,
            VolumeShape::Cone => 3,
            VolumeShape::Freeform => 4,
        }
    }

    /// Shape for a message code; unmapped codes become `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => VolumeShape::Sphere,
            1 => VolumeShape::Cylinder,
            2 => VolumeShape::Cuboid,
            3 => VolumeShape::Cone,
            4 => VolumeShape::Freeform,
            _ => VolumeShape::Unknown,
        }
    }

    /// Unit geometry for this shape.
    ///
    /// Unknown shapes, and freeform shapes without a supplied mesh, fall back
    /// to the unit cuboid.
    pub fn unit_geometry(&self, freeform: Option<&Mesh>) -> Mesh {
        match (self, freeform) {
            (VolumeShape::Sphere, _) => primitives::sphere(
                1.0,
                primitives::SPHERE_WIDTH_SEGMENTS,
                primitives::SPHERE_HEIGHT_SEGMENTS,
            ),
            (VolumeShape::Cylinder, _) => {
                primitives::cylinder(1.0, 1.0, 1.0, primitives::RADIAL_SEGMENTS)
            }
            (VolumeShape::Cuboid, _) => primitives::cuboid(),
            (VolumeShape::Cone, _) => primitives::cone(primitives::RADIAL_SEGMENTS),
            (VolumeShape::Freeform, Some(mesh)) if !mesh.is_empty() => mesh.clone(),
            (VolumeShape::Freeform, _) => {
                tracing::warn!("freeform action space has no mesh, using cuboid");
                primitives::cuboid()
            }
            (VolumeShape::Unknown, _) => {
                tracing::warn!("invalid action space shape, using cuboid");
                primitives::cuboid()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluatorState {
    #[default]
    Idle,
    Evaluating,
}

/// Observed and unobserved parts of a zone.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Zone ∩ capture union
    pub visible: Brush,
    /// Zone − capture union
    pub occluded: Brush,
}

impl EvaluationResult {
    /// World-space volumes of the visible and occluded parts.
    pub fn volumes(&self) -> (f64, f64) {
        (self.visible.mesh.volume(), self.occluded.mesh.volume())
    }
}

/// What one evaluation cycle did.
#[derive(Debug)]
pub enum EvaluationOutcome {
    /// Result containers were replaced.
    Updated {
        visible_volume: f64,
        occluded_volume: f64,
    },
    /// No capture device in scope; nothing changed.
    NoCaptureDevices,
    /// The cycle failed and the previous result was kept.
    Aborted(Error),
}

impl EvaluationOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, EvaluationOutcome::Updated { .. })
    }
}

/// Coverage evaluation for one zone.
#[derive(Debug, Default)]
pub struct ActionSpaceEvaluator {
    state: EvaluatorState,
    normalizer: FrameNormalizer,
    last: Option<EvaluationResult>,
}

impl ActionSpaceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    /// Result of the last successful cycle.
    pub fn last_result(&self) -> Option<&EvaluationResult> {
        self.last.as_ref()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Split a zone against a set of capture devices.
    ///
    /// `zone_world` is the zone node's world matrix and `unit_geometry` its
    /// unscaled shape. Returns `Ok(None)` when `devices` is empty.
    pub fn evaluate(
        &self,
        zone_world: &Matrix4<f64>,
        unit_geometry: &Mesh,
        devices: &[CaptureDevice],
        config: &EvaluatorConfig,
    ) -> Result<Option<EvaluationResult>> {
        if devices.is_empty() {
            return Ok(None);
        }

        let frame = self.normalizer.normalize_matrix(zone_world)?;
        let world_to_unit = frame.world_to_unit();

        let mut zone = Brush::new(unit_geometry.clone());
        zone.apply_matrix(&frame.scale_matrix());
        ensure_closed(&zone.mesh, "action space")?;

        let booleans = BooleanEvaluator::with_epsilon(config.csg_epsilon);

        let mut union: Option<Brush> = None;
        for device in devices {
            self.normalizer.normalize_matrix(&device.world)?;
            let mut range = Brush::new(device.geometry.clone());
            range.apply_matrix(&(world_to_unit * device.world));
            ensure_closed(&range.mesh, &device.uid)?;
            ensure_solid(&range.mesh, config.csg_epsilon, &device.uid)?;

            union = Some(match union {
                None => range,
                Some(acc) => booleans.evaluate(&acc, &range, BooleanOp::Union)?,
            });
        }
        let union = match union {
            Some(u) => u,
            None => return Ok(None),
        };

        let mut visible = booleans.evaluate(&zone, &union, BooleanOp::Intersection)?;
        let mut occluded = booleans.evaluate(&zone, &union, BooleanOp::Subtraction)?;

        self.normalizer.denormalize(&mut visible, &frame.inverse_scale);
        self.normalizer.denormalize(&mut occluded, &frame.inverse_scale);

        Ok(Some(EvaluationResult { visible, occluded }))
    }
}

fn ensure_closed(mesh: &Mesh, context: &str) -> Result<()> {
    let open_edges = mesh.open_edge_count();
    if open_edges > 0 {
        return Err(stage_geometry::Error::NonManifold {
            open_edges,
            context: context.to_string(),
        }
        .into());
    }
    Ok(())
}

fn ensure_solid(mesh: &Mesh, min: f64, context: &str) -> Result<()> {
    let volume = mesh.volume();
    if !volume.is_finite() || volume <= min {
        return Err(stage_geometry::Error::ZeroVolume {
            volume,
            min,
            context: context.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Zone node payload: shape, scene children and evaluator.
#[derive(Debug)]
pub struct ActionSpace {
    shape: VolumeShape,
    freeform: Option<Mesh>,
    geometry: Mesh,
    material: Material,
    general: Option<NodeKey>,
    visible: Option<NodeKey>,
    occluded: Option<NodeKey>,
    show_occluded: bool,
    evaluator: ActionSpaceEvaluator,
}

impl ActionSpace {
    pub fn new() -> Self {
        let shape = VolumeShape::default();
        Self {
            shape,
            freeform: None,
            geometry: shape.unit_geometry(None),
            material: zone_material(),
            general: None,
            visible: None,
            occluded: None,
            show_occluded: false,
            evaluator: ActionSpaceEvaluator::new(),
        }
    }

    #[inline]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// Unit geometry currently in use.
    #[inline]
    pub fn geometry(&self) -> &Mesh {
        &self.geometry
    }

    pub fn evaluator(&self) -> &ActionSpaceEvaluator {
        &self.evaluator
    }

    pub fn general_shape(&self) -> Option<NodeKey> {
        self.general
    }

    pub fn visible_container(&self) -> Option<NodeKey> {
        self.visible
    }

    pub fn occluded_container(&self) -> Option<NodeKey> {
        self.occluded
    }

    pub fn setup(&mut self, scene: &mut SceneGraph, zone: NodeKey) -> Result<()> {
        self.set_shape(scene, zone, self.shape)
    }

    /// Rebuild the zone's children for a new shape.
    ///
    /// Any previous evaluation result is discarded.
    pub fn set_shape(
        &mut self,
        scene: &mut SceneGraph,
        zone: NodeKey,
        shape: VolumeShape,
    ) -> Result<()> {
        if !scene.contains(zone) {
            return Err(Error::SceneNodeNotFound(zone));
        }

        self.shape = shape;
        self.geometry = shape.unit_geometry(self.freeform.as_ref());
        self.evaluator.clear();

        for child in scene.children(zone).to_vec() {
            scene.detach(child);
        }

        let mut general_material = self.material.clone();
        general_material.color_write = false;
        general_material.depth_write = false;
        self.general = Some(scene.attach(
            zone,
            SceneNode::new(GENERAL_SHAPE_NAME).with_mesh(self.geometry.clone(), general_material),
        )?);

        let visible = scene.attach(zone, SceneNode::new(VISIBLE_CONTAINER_NAME))?;
        scene.attach(
            visible,
            SceneNode::new(VISIBLE_MESH_NAME)
                .with_mesh(self.geometry.clone(), self.material.clone()),
        )?;
        self.visible = Some(visible);

        self.occluded = Some(scene.attach(zone, SceneNode::new(OCCLUDED_CONTAINER_NAME))?);
        Ok(())
    }

    /// Use a closed mesh as the freeform shape.
    pub fn set_freeform_mesh(
        &mut self,
        scene: &mut SceneGraph,
        zone: NodeKey,
        mesh: Mesh,
    ) -> Result<()> {
        self.freeform = Some(mesh);
        self.set_shape(scene, zone, VolumeShape::Freeform)
    }

    /// Recompute coverage and replace the result meshes.
    ///
    /// Failures are contained: the previous result stays in place and the
    /// outcome reports what happened.
    pub fn evaluate_action_space(
        &mut self,
        scene: &mut SceneGraph,
        zone: NodeKey,
        registry: &dyn DeviceRegistry,
        config: &EvaluatorConfig,
    ) -> EvaluationOutcome {
        self.evaluator.state = EvaluatorState::Evaluating;
        let outcome = self.run_cycle(scene, zone, registry, config);
        self.evaluator.state = EvaluatorState::Idle;

        match &outcome {
            EvaluationOutcome::Updated {
                visible_volume,
                occluded_volume,
            } => tracing::debug!(
                shape = ?self.shape,
                visible_volume,
                occluded_volume,
                "action space evaluated"
            ),
            EvaluationOutcome::NoCaptureDevices => {
                tracing::debug!(shape = ?self.shape, "no capture devices, action space unchanged")
            }
            EvaluationOutcome::Aborted(error) => {
                tracing::warn!(shape = ?self.shape, %error, "action space evaluation aborted")
            }
        }
        outcome
    }

    fn run_cycle(
        &mut self,
        scene: &mut SceneGraph,
        zone: NodeKey,
        registry: &dyn DeviceRegistry,
        config: &EvaluatorConfig,
    ) -> EvaluationOutcome {
        let devices = registry.capture_devices_of(&config.capture_kinds);
        if devices.is_empty() {
            if config.clear_stale_on_empty && self.evaluator.last.is_some() {
                self.evaluator.clear();
                if let Err(error) = self.clear_results(scene) {
                    return EvaluationOutcome::Aborted(error);
                }
            }
            return EvaluationOutcome::NoCaptureDevices;
        }

        let zone_world = match scene.world_matrix(zone) {
            Some(world) => world,
            None => return EvaluationOutcome::Aborted(Error::SceneNodeNotFound(zone)),
        };

        let result = match self.evaluator.evaluate(&zone_world, &self.geometry, &devices, config) {
            Ok(Some(result)) => result,
            Ok(None) => return EvaluationOutcome::NoCaptureDevices,
            Err(error) => return EvaluationOutcome::Aborted(error),
        };

        if let Err(error) = self.publish(scene, &result, config) {
            return EvaluationOutcome::Aborted(error);
        }

        let (visible_volume, occluded_volume) = result.volumes();
        self.evaluator.last = Some(result);
        EvaluationOutcome::Updated {
            visible_volume,
            occluded_volume,
        }
    }

    fn publish(
        &self,
        scene: &mut SceneGraph,
        result: &EvaluationResult,
        config: &EvaluatorConfig,
    ) -> Result<()> {
        let (visible, occluded) = self.containers(scene)?;

        let visible_node = result_node(VISIBLE_MESH_NAME, &result.visible, self.material.clone());
        let mut occluded_node = result_node(
            OCCLUDED_MESH_NAME,
            &result.occluded,
            self.material.tinted(config.occluded_tint),
        );
        occluded_node.visible = self.show_occluded;

        replace_children(scene, visible, visible_node)?;
        replace_children(scene, occluded, occluded_node)?;
        Ok(())
    }

    fn clear_results(&self, scene: &mut SceneGraph) -> Result<()> {
        let (visible, occluded) = self.containers(scene)?;
        for container in [visible, occluded] {
            for child in scene.children(container).to_vec() {
                scene.detach(child);
            }
        }
        Ok(())
    }

    fn containers(&self, scene: &SceneGraph) -> Result<(NodeKey, NodeKey)> {
        let visible = self.visible.ok_or_else(|| not_set_up("visible container"))?;
        let occluded = self.occluded.ok_or_else(|| not_set_up("occluded container"))?;
        for key in [visible, occluded] {
            if !scene.contains(key) {
                return Err(Error::SceneNodeNotFound(key));
            }
        }
        Ok((visible, occluded))
    }

    /// Show the occluded part while the zone is dragged.
    pub fn on_drag_start(&mut self, scene: &mut SceneGraph) {
        self.set_occluded_visible(scene, true);
    }

    pub fn on_drag_end(&mut self, scene: &mut SceneGraph) {
        self.set_occluded_visible(scene, false);
    }

    fn set_occluded_visible(&mut self, scene: &mut SceneGraph, visible: bool) {
        self.show_occluded = visible;
        let Some(container) = self.occluded else {
            return;
        };
        if let Some(&child) = scene.children(container).first() {
            if let Some(node) = scene.get_mut(child) {
                node.visible = visible;
            }
        }
    }
}

impl Default for ActionSpace {
    fn default() -> Self {
        Self::new()
    }
}

fn not_set_up(what: &str) -> Error {
    Error::InvalidParams {
        node_type: "actionspace".to_string(),
        reason: format!("{what} missing, node was not set up"),
    }
}

fn result_node(name: &str, brush: &Brush, material: Material) -> SceneNode {
    SceneNode::new(name)
        .with_mesh(brush.mesh.clone(), material)
        .with_transform(brush.transform)
}

fn replace_children(
    scene: &mut SceneGraph,
    container: NodeKey,
    node: SceneNode,
) -> Result<NodeKey> {
    for child in scene.children(container).to_vec() {
        scene.detach(child);
    }
    scene.attach(container, node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureKind, CaptureRange};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use stage_geometry::Transform;

    fn box_device(uid: &str, min: Vector3<f64>, max: Vector3<f64>) -> CaptureDevice {
        CaptureDevice {
            uid: uid.to_string(),
            kind: CaptureKind::Camera,
            geometry: CaptureRange::aabb(min, max).geometry,
            world: Matrix4::identity(),
        }
    }

    #[test]
    fn test_shape_codes() {
        for shape in [
            VolumeShape::Sphere,
            VolumeShape::Cylinder,
            VolumeShape::Cuboid,
            VolumeShape::Cone,
            VolumeShape::Freeform,
        ] {
            assert_eq!(VolumeShape::from_code(shape.code()), shape);
        }
        assert_eq!(VolumeShape::from_code(17), VolumeShape::Unknown);
        assert_eq!(VolumeShape::default(), VolumeShape::Cuboid);
    }

    #[test]
    fn test_unknown_shape_falls_back_to_cuboid() {
        let mesh = VolumeShape::Unknown.unit_geometry(None);
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-9);
        let mesh = VolumeShape::Freeform.unit_geometry(None);
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_devices_yields_nothing() {
        let evaluator = ActionSpaceEvaluator::new();
        let result = evaluator
            .evaluate(&Matrix4::identity(), &primitives::cuboid(), &[], &EvaluatorConfig::default())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_stretched_zone_half_covered() {
        let evaluator = ActionSpaceEvaluator::new();
        let zone_world = Transform::identity()
            .with_scale(Vector3::new(2.0, 1.0, 1.0))
            .to_matrix();
        let device = box_device("cam", Vector3::new(0.0, -2.0, -2.0), Vector3::new(3.0, 2.0, 2.0));

        let result = evaluator
            .evaluate(&zone_world, &primitives::cuboid(), &[device], &EvaluatorConfig::default())
            .unwrap()
            .unwrap();

        let (visible, occluded) = result.volumes();
        assert_relative_eq!(visible, 1.0, epsilon = 1e-6);
        assert_relative_eq!(occluded, 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.visible.transform.scale, Vector3::new(0.5, 1.0, 1.0));

        let (min, max) = result.visible.mesh.bounds();
        assert_relative_eq!(min.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(max.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_zone_scale_fails() {
        let evaluator = ActionSpaceEvaluator::new();
        let zone_world = Transform::identity()
            .with_scale(Vector3::new(1.0, 0.0, 1.0))
            .to_matrix();
        let device = box_device("cam", Vector3::new(-2.0, -2.0, -2.0), Vector3::new(2.0, 2.0, 2.0));
        let err = evaluator
            .evaluate(&zone_world, &primitives::cuboid(), &[device], &EvaluatorConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(stage_geometry::Error::DegenerateVolume(_))
        ));
    }

    #[test]
    fn test_flattened_device_is_rejected() {
        let evaluator = ActionSpaceEvaluator::new();
        let mut device = box_device(
            "cam",
            Vector3::new(-2.0, -2.0, -2.0),
            Vector3::new(2.0, 2.0, 2.0),
        );
        device.world = Transform::identity()
            .with_scale(Vector3::new(1.0, 0.0, 1.0))
            .to_matrix();
        let err = evaluator
            .evaluate(
                &Matrix4::identity(),
                &primitives::cuboid(),
                &[device],
                &EvaluatorConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(stage_geometry::Error::DegenerateVolume(_))
        ));
    }

    #[test]
    fn test_sliver_range_is_rejected() {
        let evaluator = ActionSpaceEvaluator::new();
        let device = box_device(
            "cam",
            Vector3::new(-2.0, 0.0, -2.0),
            Vector3::new(2.0, 1e-5, 2.0),
        );
        let config = EvaluatorConfig {
            csg_epsilon: 1e-3,
            ..EvaluatorConfig::default()
        };
        let err = evaluator
            .evaluate(&Matrix4::identity(), &primitives::cuboid(), &[device], &config)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(stage_geometry::Error::ZeroVolume { .. })
        ));
    }

    #[test]
    fn test_open_capture_range_is_rejected() {
        let evaluator = ActionSpaceEvaluator::new();
        let mut device = box_device(
            "cam",
            Vector3::new(-2.0, -2.0, -2.0),
            Vector3::new(2.0, 2.0, 2.0),
        );
        device.geometry.indices.truncate(device.geometry.indices.len() - 3);
        let err = evaluator
            .evaluate(
                &Matrix4::identity(),
                &primitives::cuboid(),
                &[device],
                &EvaluatorConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(stage_geometry::Error::NonManifold { .. })
        ));
    }

    #[test]
    fn test_set_shape_rebuilds_children() {
        let mut scene = SceneGraph::new();
        let zone = scene.attach(scene.root(), SceneNode::new("actionspace")).unwrap();
        let mut space = ActionSpace::new();
        space.setup(&mut scene, zone).unwrap();
        assert_eq!(scene.children(zone).len(), 3);
        assert_eq!(scene.find_child(zone, GENERAL_SHAPE_NAME), space.general_shape());

        let general = space.general_shape().unwrap();
        let material = scene.get(general).unwrap().material.as_ref().unwrap();
        assert!(!material.color_write);

        space.set_shape(&mut scene, zone, VolumeShape::Sphere).unwrap();
        assert_eq!(scene.children(zone).len(), 3);
        assert!(!scene.contains(general));
        assert_eq!(scene.children(space.visible_container().unwrap()).len(), 1);
        assert!(scene.children(space.occluded_container().unwrap()).is_empty());
    }
}
