// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room-node type names and per-variant capabilities.
//!
//! The registry is a read-only table built once at startup and shared by
//! reference with the components that create nodes.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capture::CaptureKind;
use crate::node::RoomNodeKind;

/// Every kind of node a room can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomNodeType {
    Unknown,
    ActionSpace,
    Camera,
    Kinect,
    MovingHead,
    Body,
    Projector,
}

impl RoomNodeType {
    pub const ALL: [RoomNodeType; 6] = [
        RoomNodeType::ActionSpace,
        RoomNodeType::Camera,
        RoomNodeType::Kinect,
        RoomNodeType::MovingHead,
        RoomNodeType::Body,
        RoomNodeType::Projector,
    ];

    /// Wire name used in room messages.
    pub fn name(&self) -> &'static str {
        match self {
            RoomNodeType::Unknown => "unknown",
            RoomNodeType::ActionSpace => "actionspace",
            RoomNodeType::Camera => "camera",
            RoomNodeType::Kinect => "kinect",
            RoomNodeType::MovingHead => "movinghead",
            RoomNodeType::Body => "body",
            RoomNodeType::Projector => "projector",
        }
    }
}

impl fmt::Display for RoomNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a node variant can do, looked up by type.
#[derive(Debug, Clone, Copy)]
pub struct NodeCapabilities {
    pub node_type: RoomNodeType,
    /// Default caption shown in the editor.
    pub caption: &'static str,
    /// Set for devices whose range feeds coverage evaluation.
    pub capture_kind: Option<CaptureKind>,
    /// Zones are re-evaluated when this node is dragged.
    pub triggers_evaluation: bool,
    /// Builds the variant payload with default state.
    pub create: fn() -> RoomNodeKind,
}

/// Read-only name → type → capability table.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    by_name: FxHashMap<&'static str, RoomNodeType>,
    capabilities: FxHashMap<RoomNodeType, NodeCapabilities>,
}

impl NodeTypeRegistry {
    /// Registry with every built-in node type.
    pub fn standard() -> Self {
        let entries = [
            NodeCapabilities {
                node_type: RoomNodeType::ActionSpace,
                caption: "ActionSpace",
                capture_kind: None,
                triggers_evaluation: true,
                create: RoomNodeKind::new_zone,
            },
            NodeCapabilities {
                node_type: RoomNodeType::Camera,
                caption: "Camera",
                capture_kind: Some(CaptureKind::Camera),
                triggers_evaluation: true,
                create: RoomNodeKind::new_camera,
            },
            NodeCapabilities {
                node_type: RoomNodeType::Kinect,
                caption: "Kinect",
                capture_kind: Some(CaptureKind::DepthSensor),
                triggers_evaluation: true,
                create: RoomNodeKind::new_sensor,
            },
            NodeCapabilities {
                node_type: RoomNodeType::MovingHead,
                caption: "MovingHead",
                capture_kind: None,
                triggers_evaluation: false,
                create: RoomNodeKind::new_light,
            },
            NodeCapabilities {
                node_type: RoomNodeType::Body,
                caption: "Body",
                capture_kind: None,
                triggers_evaluation: false,
                create: RoomNodeKind::new_body,
            },
            NodeCapabilities {
                node_type: RoomNodeType::Projector,
                caption: "Projector",
                capture_kind: None,
                triggers_evaluation: false,
                create: RoomNodeKind::new_projector,
            },
        ];

        let mut registry = Self {
            by_name: FxHashMap::default(),
            capabilities: FxHashMap::default(),
        };
        for entry in entries {
            registry.by_name.insert(entry.node_type.name(), entry.node_type);
            registry.capabilities.insert(entry.node_type, entry);
        }
        registry
    }

    /// Type for a wire name; unknown names map to [`RoomNodeType::Unknown`].
    pub fn node_type(&self, name: &str) -> RoomNodeType {
        self.by_name
            .get(name)
            .copied()
            .unwrap_or(RoomNodeType::Unknown)
    }

    pub fn capabilities(&self, node_type: RoomNodeType) -> Option<&NodeCapabilities> {
        self.capabilities.get(&node_type)
    }

    pub fn lookup(&self, name: &str) -> Option<&NodeCapabilities> {
        self.capabilities(self.node_type(name))
    }

    /// Types whose devices capture the given kind.
    pub fn types_capturing(&self, kind: CaptureKind) -> Vec<RoomNodeType> {
        let mut types: Vec<RoomNodeType> = self
            .capabilities
            .values()
            .filter(|c| c.capture_kind == Some(kind))
            .map(|c| c.node_type)
            .collect();
        types.sort_by_key(|t| t.name());
        types
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        let registry = NodeTypeRegistry::standard();
        for node_type in RoomNodeType::ALL {
            assert_eq!(registry.node_type(node_type.name()), node_type);
            assert!(registry.capabilities(node_type).is_some());
        }
    }

    #[test]
    fn test_unknown_name() {
        let registry = NodeTypeRegistry::standard();
        assert_eq!(registry.node_type("fog-machine"), RoomNodeType::Unknown);
        assert!(registry.lookup("fog-machine").is_none());
    }

    #[test]
    fn test_capture_types() {
        let registry = NodeTypeRegistry::standard();
        assert_eq!(registry.types_capturing(CaptureKind::Camera), vec![RoomNodeType::Camera]);
        assert_eq!(
            registry.types_capturing(CaptureKind::DepthSensor),
            vec![RoomNodeType::Kinect]
        );
    }
}
