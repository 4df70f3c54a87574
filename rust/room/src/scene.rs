// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based scene graph.
//!
//! The [`SceneGraph`] owns every node in a slot map with stable,
//! generational keys. Nodes form a tree through parent/children links.
//! Each node caches its world matrix; changing a transform marks the node
//! and its descendants dirty, and [`SceneGraph::update_world_matrices`]
//! recomputes only what is dirty.

use nalgebra::{Matrix4, Point3};
use slotmap::{new_key_type, SlotMap};
use stage_geometry::{Mesh, Transform};

use crate::error::{Error, Result};

new_key_type! {
    /// Key for a node in the scene graph.
    pub struct NodeKey;
}

/// Render layer drawn by the editor camera.
pub const LAYER_DEFAULT: u8 = 0;
/// Render layer that is not drawn; parked capture ranges live here.
pub const LAYER_HIDDEN: u8 = 2;

/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Color from a packed `0xRRGGBB` value.
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
        }
    }
}

/// Surface appearance of a renderable node.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    /// Disabled for helper shapes that only exist for picking.
    pub color_write: bool,
    pub depth_write: bool,
}

impl Material {
    pub fn new(color: Color, opacity: f32) -> Self {
        Self {
            color,
            opacity,
            transparent: opacity < 1.0,
            color_write: true,
            depth_write: true,
        }
    }

    /// Copy with a different color.
    pub fn tinted(&self, color: Color) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }
}

/// A node in the scene graph.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub mesh: Option<Mesh>,
    pub material: Option<Material>,
    pub visible: bool,
    pub layer: u8,
    transform: Transform,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    world: Matrix4<f64>,
    world_dirty: bool,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: None,
            material: None,
            visible: true,
            layer: LAYER_DEFAULT,
            transform: Transform::identity(),
            parent: None,
            children: Vec::new(),
            world: Matrix4::identity(),
            world_dirty: true,
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh, material: Material) -> Self {
        self.mesh = Some(mesh);
        self.material = Some(material);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[inline]
    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty
    }
}

/// Add/remove capability used by components that publish renderables.
pub trait SceneAttach {
    /// Insert `node` as the last child of `parent`.
    fn attach(&mut self, parent: NodeKey, node: SceneNode) -> Result<NodeKey>;

    /// Remove `node` and its whole subtree, returning the node itself.
    fn detach(&mut self, node: NodeKey) -> Option<SceneNode>;
}

/// Owner of all scene nodes.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, SceneNode>,
    root: NodeKey,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new("scene"));
        Self { nodes, root }
    }

    #[inline]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    /// Mutable access to everything but the transform.
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SceneNode> {
        self.nodes.get_mut(key)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes.get(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn find_child(&self, parent: NodeKey, name: &str) -> Option<NodeKey> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.nodes.get(child).is_some_and(|n| n.name == name))
    }

    /// Replace a node's local transform and invalidate its subtree.
    pub fn set_transform(&mut self, key: NodeKey, transform: Transform) -> Result<()> {
        let node = self.nodes.get_mut(key).ok_or(Error::SceneNodeNotFound(key))?;
        node.transform = transform;
        self.mark_dirty(key);
        Ok(())
    }

    fn mark_dirty(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current) {
                node.world_dirty = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// Recompute cached world matrices of dirty nodes, parents first.
    pub fn update_world_matrices(&mut self) {
        let mut stack = vec![(self.root, Matrix4::identity(), false)];

        while let Some((key, parent_world, parent_changed)) = stack.pop() {
            let node = match self.nodes.get_mut(key) {
                Some(n) => n,
                None => continue,
            };

            let changed = parent_changed || node.world_dirty;
            if changed {
                node.world = parent_world * node.transform.to_matrix();
                node.world_dirty = false;
            }

            let world = node.world;
            for &child in &node.children {
                stack.push((child, world, changed));
            }
        }
    }

    /// World matrix of a node, computed through its ancestors when stale.
    pub fn world_matrix(&self, key: NodeKey) -> Option<Matrix4<f64>> {
        let node = self.nodes.get(key)?;
        if !node.world_dirty {
            return Some(node.world);
        }

        let mut matrix = node.transform.to_matrix();
        let mut parent = node.parent;
        while let Some(parent_key) = parent {
            let parent_node = self.nodes.get(parent_key)?;
            if !parent_node.world_dirty {
                return Some(parent_node.world * matrix);
            }
            matrix = parent_node.transform.to_matrix() * matrix;
            parent = parent_node.parent;
        }
        Some(matrix)
    }

    /// Keys of a node and all of its descendants (pre-order).
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                keys.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        keys
    }

    /// World-space bounds of a single node's own mesh.
    pub fn mesh_world_bounds(&self, key: NodeKey) -> Option<(Point3<f64>, Point3<f64>)> {
        let mesh = match self.nodes.get(key).and_then(|n| n.mesh.as_ref()) {
            Some(m) if !m.is_empty() => m,
            _ => return None,
        };
        let world = self.world_matrix(key)?;

        let (min, max) = mesh.bounds();
        let mut bounds: Option<(Point3<f64>, Point3<f64>)> = None;
        for x in [min.x, max.x] {
            for y in [min.y, max.y] {
                for z in [min.z, max.z] {
                    let p = world.transform_point(&Point3::new(x as f64, y as f64, z as f64));
                    bounds = Some(match bounds {
                        None => (p, p),
                        Some((lo, hi)) => (lo.inf(&p), hi.sup(&p)),
                    });
                }
            }
        }
        bounds
    }

    /// World-space bounds of every mesh in a subtree.
    pub fn world_bounds(&self, key: NodeKey) -> Option<(Point3<f64>, Point3<f64>)> {
        self.subtree(key)
            .into_iter()
            .filter_map(|current| self.mesh_world_bounds(current))
            .reduce(|(lo, hi), (min, max)| (lo.inf(&min), hi.sup(&max)))
    }
}

impl SceneAttach for SceneGraph {
    fn attach(&mut self, parent: NodeKey, mut node: SceneNode) -> Result<NodeKey> {
        if !self.nodes.contains_key(parent) {
            return Err(Error::SceneNodeNotFound(parent));
        }
        node.parent = Some(parent);
        node.children.clear();
        node.world_dirty = true;

        let key = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(key);
        }
        Ok(key)
    }

    fn detach(&mut self, key: NodeKey) -> Option<SceneNode> {
        if key == self.root {
            return None;
        }

        let parent = self.nodes.get(key)?.parent;
        if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent_node.children.retain(|&c| c != key);
        }

        for descendant in self.subtree(key).into_iter().skip(1) {
            self.nodes.remove(descendant);
        }

        let mut node = self.nodes.remove(key)?;
        node.parent = None;
        node.children.clear();
        Some(node)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
