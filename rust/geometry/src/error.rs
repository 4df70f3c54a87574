// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use nalgebra::Vector3;
use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry processing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Degenerate volume: scale {0:?} has a zero or non-finite component")]
    DegenerateVolume(Vector3<f64>),

    #[error("Volume {volume} at or below {min} ({context})")]
    ZeroVolume {
        volume: f64,
        min: f64,
        context: String,
    },

    #[error("Boolean operation failed: {0}")]
    BooleanFailure(String),

    #[error("Mesh is not a closed manifold: {open_edges} open edges ({context})")]
    NonManifold { open_edges: usize, context: String },

    #[error("Triangulation failed: {0}")]
    TriangulationError(String),

    #[error("Empty mesh: {0}")]
    EmptyMesh(String),
}

impl Error {
    pub fn boolean(msg: impl Into<String>) -> Self {
        Error::BooleanFailure(msg.into())
    }
}
