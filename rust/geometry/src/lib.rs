// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stage Geometry
//!
//! Brushes, frame normalization and boolean evaluation for action-space
//! coverage, using csgrs for the mesh booleans and nalgebra for transforms.

pub mod brush;
pub mod csg;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod primitives;
pub mod transform;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

pub use brush::Brush;
pub use csg::{BooleanEvaluator, BooleanOp};
pub use error::{Error, Result};
pub use frame::{FrameNormalizer, NormalizedFrame};
pub use mesh::Mesh;
pub use transform::Transform;
