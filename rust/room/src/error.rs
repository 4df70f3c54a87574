// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for room operations.

use crate::scene::NodeKey;

/// Result type alias for room operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while editing a room.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Geometry failure surfaced from stage-geometry.
    #[error("geometry error: {0}")]
    Geometry(#[from] stage_geometry::Error),

    /// No room node with this uid exists.
    #[error("room node not found: {0}")]
    NodeNotFound(String),

    /// A room node with this uid already exists.
    #[error("room node already exists: {0}")]
    DuplicateNode(String),

    /// The type name is not in the node type registry.
    #[error("unknown room node type: {0}")]
    UnknownNodeType(String),

    /// A scene node key does not resolve.
    #[error("scene node not found: {0:?}")]
    SceneNodeNotFound(NodeKey),

    /// Params did not match the node type's expected shape.
    #[error("invalid params for {node_type}: {reason}")]
    InvalidParams { node_type: String, reason: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
