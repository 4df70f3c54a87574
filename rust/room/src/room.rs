// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The room: scene, nodes, event queue and coverage orchestration.
//!
//! Edits (create, remove, drag, params) queue [`RoomEvent`]s;
//! [`Room::dispatch`] refreshes world matrices, re-evaluates affected
//! action spaces and forwards every event to registered observers.

use std::sync::Arc;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stage_geometry::{Mesh, Transform};

use crate::action_space::EvaluationOutcome;
use crate::capture::{CaptureDevice, CaptureKind, CaptureRange, DeviceRegistry, DeviceSnapshot};
use crate::config::EvaluatorConfig;
use crate::error::{Error, Result};
use crate::events::{EventQueue, ObserverId, Observers, RoomEvent, RoomObserver};
use crate::node::{RoomNode, RoomNodeState, Wxyz, Xyz};
use crate::registry::{NodeTypeRegistry, RoomNodeType};
use crate::scene::{SceneAttach, SceneGraph, SceneNode};

/// Serialized room: `{ nodes: [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomState {
    pub nodes: Vec<NodeRecord>,
}

/// One node in a room message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uid: String,
    /// Node type name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Xyz>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Wxyz>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Xyz>,
    #[serde(default)]
    pub params: Value,
}

/// Outcome of evaluating one action space.
#[derive(Debug)]
pub struct ZoneEvaluation {
    pub uid: String,
    pub outcome: EvaluationOutcome,
}

#[derive(Debug)]
pub struct Room {
    scene: SceneGraph,
    nodes: Vec<RoomNode>,
    registry: Arc<NodeTypeRegistry>,
    config: EvaluatorConfig,
    events: EventQueue,
    observers: Observers,
}

impl Room {
    pub fn new(registry: Arc<NodeTypeRegistry>, config: EvaluatorConfig) -> Self {
        Self {
            scene: SceneGraph::new(),
            nodes: Vec::new(),
            registry,
            config,
            events: EventQueue::default(),
            observers: Observers::default(),
        }
    }

    #[inline]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    #[inline]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoomNode> {
        self.nodes.iter()
    }

    pub fn nodes_of_type(&self, node_type: RoomNodeType) -> impl Iterator<Item = &RoomNode> {
        self.nodes.iter().filter(move |n| n.node_type() == node_type)
    }

    pub fn node(&self, uid: &str) -> Option<&RoomNode> {
        self.nodes.iter().find(|n| n.uid() == uid)
    }

    fn index_of(&self, uid: &str) -> Result<usize> {
        self.nodes
            .iter()
            .position(|n| n.uid() == uid)
            .ok_or_else(|| Error::NodeNotFound(uid.to_string()))
    }

    pub fn register_observer(&mut self, observer: Box<dyn RoomObserver>) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Events queued since the last dispatch.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Create a node of a registered type.
    ///
    /// A supplied uid means the node already exists elsewhere and starts
    /// `Connected`; otherwise a fresh uid is generated and the node is
    /// `Pending`. Returns the uid.
    pub fn create_node(
        &mut self,
        type_name: &str,
        uid: Option<&str>,
        position: Option<Vector3<f64>>,
        orientation: Option<UnitQuaternion<f64>>,
        params: Option<&Value>,
    ) -> Result<String> {
        let registry = Arc::clone(&self.registry);
        let capabilities = registry
            .lookup(type_name)
            .ok_or_else(|| Error::UnknownNodeType(type_name.to_string()))?;

        let (uid, state) = match uid {
            Some(uid) => (uid.to_string(), RoomNodeState::Connected),
            None => (uuid::Uuid::new_v4().to_string(), RoomNodeState::Pending),
        };
        if self.node(&uid).is_some() {
            return Err(Error::DuplicateNode(uid));
        }

        let mut transform = Transform::identity();
        if let Some(position) = position {
            transform.position = position;
        }
        if let Some(orientation) = orientation {
            transform.rotation = orientation;
        }

        let root = self.scene.root();
        let key = self.scene.attach(
            root,
            SceneNode::new(capabilities.node_type.name()).with_transform(transform),
        )?;

        let mut kind = (capabilities.create)();
        let built = match kind.setup(&mut self.scene, key) {
            Ok(()) => match params {
                Some(params) => kind.apply_params(&mut self.scene, key, params),
                None => Ok(()),
            },
            Err(error) => Err(error),
        };
        if let Err(error) = built {
            self.scene.detach(key);
            return Err(error);
        }

        if let Some(capture) = kind.as_capture_mut() {
            if capture.device_name.is_none() {
                let count = self.nodes_of_type(capabilities.node_type).count();
                capture.device_name = Some(format!("{} {}", capabilities.caption, count + 1));
            }
        }

        tracing::debug!(uid = %uid, node_type = %capabilities.node_type, "room node created");
        self.nodes.push(RoomNode::new(
            uid.clone(),
            capabilities.caption.to_string(),
            state,
            key,
            kind,
        ));
        self.events.push(RoomEvent::NodeCreated {
            uid: uid.clone(),
            node_type: capabilities.node_type,
        });
        Ok(uid)
    }

    /// Remove a node and its scene subtree, including any coverage result.
    pub fn remove_node(&mut self, uid: &str) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = self.nodes.remove(index);
        self.scene.detach(node.key());
        tracing::debug!(uid, node_type = %node.node_type(), "room node removed");
        self.events.push(RoomEvent::NodeRemoved {
            uid: uid.to_string(),
            node_type: node.node_type(),
        });
        Ok(())
    }

    pub fn set_transform(&mut self, uid: &str, transform: Transform) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = &self.nodes[index];
        self.scene.set_transform(node.key(), transform)?;
        self.events.push(RoomEvent::NodeChanged {
            uid: uid.to_string(),
            node_type: node.node_type(),
        });
        Ok(())
    }

    pub fn set_params(&mut self, uid: &str, params: &Value) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = &mut self.nodes[index];
        let key = node.key();
        node.kind_mut().apply_params(&mut self.scene, key, params)?;
        self.events.push(RoomEvent::NodeChanged {
            uid: uid.to_string(),
            node_type: node.node_type(),
        });
        Ok(())
    }

    /// Record drag state, run the node's drag hook and queue the event.
    pub fn set_dragged(&mut self, uid: &str, dragged: bool) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = &mut self.nodes[index];
        node.set_dragged(&mut self.scene, dragged);

        let uid = uid.to_string();
        let node_type = node.node_type();
        self.events.push(if dragged {
            RoomEvent::DragStarted { uid, node_type }
        } else {
            RoomEvent::DragEnded { uid, node_type }
        });
        Ok(())
    }

    /// Capture devices currently in the room, for the configured kinds.
    pub fn device_snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot(self.capture_devices_of(&self.config.capture_kinds))
    }

    /// Re-evaluate one action space.
    pub fn evaluate(&mut self, uid: &str) -> Result<EvaluationOutcome> {
        let index = self.index_of(uid)?;
        if self.nodes[index].kind().as_action_space().is_none() {
            return Err(Error::InvalidParams {
                node_type: self.nodes[index].node_type().name().to_string(),
                reason: "only action spaces can be evaluated".to_string(),
            });
        }
        self.scene.update_world_matrices();
        let snapshot = self.device_snapshot();
        Ok(self.evaluate_index(index, &snapshot))
    }

    /// Re-evaluate every action space.
    pub fn evaluate_all(&mut self) -> Vec<ZoneEvaluation> {
        self.scene.update_world_matrices();
        let snapshot = self.device_snapshot();
        self.zone_indices()
            .into_iter()
            .map(|index| ZoneEvaluation {
                uid: self.nodes[index].uid().to_string(),
                outcome: self.evaluate_index(index, &snapshot),
            })
            .collect()
    }

    fn zone_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind().as_action_space().is_some())
            .map(|(i, _)| i)
            .collect()
    }

    fn evaluate_index(&mut self, index: usize, snapshot: &DeviceSnapshot) -> EvaluationOutcome {
        let node = &mut self.nodes[index];
        let key = node.key();
        let outcome = match node.kind_mut().as_action_space_mut() {
            Some(space) => {
                space.evaluate_action_space(&mut self.scene, key, snapshot, &self.config)
            }
            None => return EvaluationOutcome::NoCaptureDevices,
        };
        if let EvaluationOutcome::Updated {
            visible_volume,
            occluded_volume,
        } = outcome
        {
            self.events.push(RoomEvent::ActionSpaceEvaluated {
                uid: node.uid().to_string(),
                visible_volume,
                occluded_volume,
            });
        }
        outcome
    }

    /// Process queued events.
    ///
    /// Drag start/end of a capture device re-evaluates every action space
    /// and applies the matching drag hook to each; drag start/end of an
    /// action space re-evaluates that space. Every event, including the
    /// evaluation notices produced here, goes to the observers.
    pub fn dispatch(&mut self) -> Vec<ZoneEvaluation> {
        self.scene.update_world_matrices();
        let mut evaluations = Vec::new();

        while let Some(event) = self.events.pop() {
            self.observers.notify(&event);

            let (uid, node_type, started) = match &event {
                RoomEvent::DragStarted { uid, node_type } => (uid.as_str(), *node_type, true),
                RoomEvent::DragEnded { uid, node_type } => (uid.as_str(), *node_type, false),
                _ => continue,
            };
            let triggers = self
                .registry
                .capabilities(node_type)
                .is_some_and(|c| c.triggers_evaluation);
            if !triggers {
                continue;
            }

            if node_type == RoomNodeType::ActionSpace {
                if let Ok(index) = self.index_of(uid) {
                    let snapshot = self.device_snapshot();
                    evaluations.push(ZoneEvaluation {
                        uid: uid.to_string(),
                        outcome: self.evaluate_index(index, &snapshot),
                    });
                }
                continue;
            }

            let snapshot = self.device_snapshot();
            for index in self.zone_indices() {
                let outcome = self.evaluate_index(index, &snapshot);
                let zone = &mut self.nodes[index];
                if started {
                    zone.kind_mut().on_drag_start(&mut self.scene);
                } else {
                    zone.kind_mut().on_drag_end(&mut self.scene);
                }
                evaluations.push(ZoneEvaluation {
                    uid: zone.uid().to_string(),
                    outcome,
                });
            }
        }

        evaluations
    }

    /// Per-frame update of every node; dragged action spaces re-evaluate.
    pub fn update(&mut self) -> Vec<ZoneEvaluation> {
        self.scene.update_world_matrices();
        let snapshot = self.device_snapshot();
        let mut evaluations = Vec::new();

        for node in &mut self.nodes {
            let key = node.key();
            let dragged = node.is_dragged();
            if let Some(outcome) = node
                .kind_mut()
                .update(&mut self.scene, key, dragged, &snapshot, &self.config)
            {
                if let EvaluationOutcome::Updated {
                    visible_volume,
                    occluded_volume,
                } = outcome
                {
                    self.events.push(RoomEvent::ActionSpaceEvaluated {
                        uid: node.uid().to_string(),
                        visible_volume,
                        occluded_volume,
                    });
                }
                evaluations.push(ZoneEvaluation {
                    uid: node.uid().to_string(),
                    outcome,
                });
            }
        }

        evaluations
    }

    /// Nearest node hit by a ray, with its distance.
    pub fn hit(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Option<(&RoomNode, f64)> {
        self.nodes
            .iter()
            .filter_map(|n| n.hit(&self.scene, origin, direction).map(|d| (n, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn to_state(&self) -> RoomState {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let transform = node.transform(&self.scene).unwrap_or_default();
                NodeRecord {
                    uid: node.uid().to_string(),
                    name: node.node_type().name().to_string(),
                    position: Some(transform.position.into()),
                    orientation: Some(transform.rotation.into()),
                    scale: Some(transform.scale.into()),
                    params: node.kind().to_params(&self.scene, node.key()),
                }
            })
            .collect();
        RoomState { nodes }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_state())?)
    }

    /// Load room state; existing uids are updated in place.
    ///
    /// Unknown node types and invalid params reject the whole state before
    /// anything changes. Returns the uids of the loaded nodes.
    pub fn load_state(&mut self, state: &RoomState) -> Result<Vec<String>> {
        if let Some(unknown) = state
            .nodes
            .iter()
            .find(|r| self.registry.lookup(&r.name).is_none())
        {
            return Err(Error::UnknownNodeType(unknown.name.clone()));
        }
        for record in &state.nodes {
            self.check_record(record)?;
        }

        let mut loaded = Vec::with_capacity(state.nodes.len());
        for record in &state.nodes {
            let params = (!record.params.is_null()).then_some(&record.params);

            match self.index_of(&record.uid) {
                Ok(index) => {
                    let key = self.nodes[index].key();
                    let mut transform =
                        self.nodes[index].transform(&self.scene).unwrap_or_default();
                    apply_record_transform(&mut transform, record);
                    self.scene.set_transform(key, transform)?;
                    if let Some(params) = params {
                        self.nodes[index]
                            .kind_mut()
                            .apply_params(&mut self.scene, key, params)?;
                    }
                    self.events.push(RoomEvent::NodeChanged {
                        uid: record.uid.clone(),
                        node_type: self.nodes[index].node_type(),
                    });
                }
                Err(_) => {
                    let uid = self.create_node(
                        &record.name,
                        Some(&record.uid),
                        record.position.map(Into::into),
                        record.orientation.map(Into::into),
                        None,
                    )?;
                    let index = self.index_of(&uid)?;
                    let key = self.nodes[index].key();
                    if let Some(scale) = record.scale {
                        let transform =
                            self.nodes[index].transform(&self.scene).unwrap_or_default();
                        self.scene.set_transform(key, transform.with_scale(scale.into()))?;
                    }
                    if let Some(params) = params {
                        self.nodes[index]
                            .kind_mut()
                            .apply_params(&mut self.scene, key, params)?;
                    }
                }
            }
            loaded.push(record.uid.clone());
        }

        tracing::info!(nodes = loaded.len(), "room state loaded");
        Ok(loaded)
    }

    /// Apply a record's params to a scratch node of the type it would use.
    fn check_record(&self, record: &NodeRecord) -> Result<()> {
        if record.params.is_null() {
            return Ok(());
        }
        let node_type = match self.node(&record.uid) {
            Some(node) => node.node_type(),
            None => self.registry.node_type(&record.name),
        };
        let capabilities = self
            .registry
            .capabilities(node_type)
            .ok_or_else(|| Error::UnknownNodeType(record.name.clone()))?;

        let mut scratch = SceneGraph::new();
        let root = scratch.root();
        let key = scratch.attach(root, SceneNode::new(node_type.name()))?;
        let mut kind = (capabilities.create)();
        kind.setup(&mut scratch, key)?;
        kind.apply_params(&mut scratch, key, &record.params)
    }

    pub fn from_json(&mut self, json: &str) -> Result<Vec<String>> {
        let state: RoomState = serde_json::from_str(json)?;
        self.load_state(&state)
    }

    /// Replace the sensing volume of a capture device.
    pub fn set_capture_range(&mut self, uid: &str, range: CaptureRange) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = &mut self.nodes[index];
        let key = node.key();
        let node_type = node.node_type();
        match node.kind_mut().as_capture_mut() {
            Some(capture) => capture.set_range(&mut self.scene, key, range),
            None => Err(Error::InvalidParams {
                node_type: node_type.name().to_string(),
                reason: "not a capture device".to_string(),
            }),
        }
    }

    /// Give an action space a closed mesh and switch it to the freeform shape.
    pub fn set_freeform_mesh(&mut self, uid: &str, mesh: Mesh) -> Result<()> {
        let index = self.index_of(uid)?;
        let node = &mut self.nodes[index];
        let key = node.key();
        let node_type = node.node_type();
        match node.kind_mut().as_action_space_mut() {
            Some(space) => space.set_freeform_mesh(&mut self.scene, key, mesh)?,
            None => {
                return Err(Error::InvalidParams {
                    node_type: node_type.name().to_string(),
                    reason: "not an action space".to_string(),
                })
            }
        }
        self.events.push(RoomEvent::NodeChanged {
            uid: uid.to_string(),
            node_type,
        });
        Ok(())
    }
}

fn apply_record_transform(transform: &mut Transform, record: &NodeRecord) {
    if let Some(position) = record.position {
        transform.position = position.into();
    }
    if let Some(orientation) = record.orientation {
        transform.rotation = orientation.into();
    }
    if let Some(scale) = record.scale {
        transform.scale = scale.into();
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new(Arc::new(NodeTypeRegistry::standard()), EvaluatorConfig::default())
    }
}

impl DeviceRegistry for Room {
    fn capture_devices(&self, kind: CaptureKind) -> Vec<CaptureDevice> {
        let types = self.registry.types_capturing(kind);
        self.nodes
            .iter()
            .filter(|n| types.contains(&n.node_type()))
            .filter_map(|n| n.capture_device(&self.scene))
            .collect()
    }
}
