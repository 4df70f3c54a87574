// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stage Room
//!
//! Room model for the Stage editor: an arena scene graph, typed room nodes
//! (cameras, depth sensors, lights, projectors, bodies, action spaces) and
//! the evaluator that splits each action space into the part seen by the
//! capture devices and the part that is not.
//!
//! ```no_run
//! use stage_room::Room;
//!
//! let mut room = Room::default();
//! room.from_json(r#"{ "nodes": [] }"#).unwrap();
//! for evaluation in room.evaluate_all() {
//!     println!("{}: {:?}", evaluation.uid, evaluation.outcome);
//! }
//! ```

pub mod action_space;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod node;
pub mod registry;
pub mod room;
pub mod scene;

pub use action_space::{
    ActionSpace, ActionSpaceEvaluator, EvaluationOutcome, EvaluationResult, EvaluatorState,
    VolumeShape,
};
pub use capture::{CaptureDevice, CaptureKind, CaptureRange, DeviceRegistry, DeviceSnapshot};
pub use config::EvaluatorConfig;
pub use error::{Error, Result};
pub use events::{ObserverId, RoomEvent, RoomObserver};
pub use node::{RoomNode, RoomNodeKind, RoomNodeState};
pub use registry::{NodeCapabilities, NodeTypeRegistry, RoomNodeType};
pub use room::{NodeRecord, Room, RoomState, ZoneEvaluation};
pub use scene::{Color, Material, NodeKey, SceneAttach, SceneGraph, SceneNode};
