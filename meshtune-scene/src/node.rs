//! Scene graph nodes

use meshtune_core::{Drawable, Error, NodeTransform, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Surface appearance of a mesh node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub wireframe: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            wireframe: false,
        }
    }
}

/// Full-resolution mesh and the currently displayed reduction of it.
///
/// `generation` increases every time a new reduction is requested so that
/// late results for an older request can be recognised and dropped.
#[derive(Debug, Clone)]
pub struct MeshPair {
    pub original: Arc<TriangleMesh>,
    pub working: Arc<TriangleMesh>,
    pub generation: u64,
}

impl MeshPair {
    pub fn new(mesh: TriangleMesh) -> Self {
        let original = Arc::new(mesh);
        Self {
            working: Arc::clone(&original),
            original,
            generation: 0,
        }
    }

    /// Whether the displayed mesh is the original itself
    pub fn is_original(&self) -> bool {
        Arc::ptr_eq(&self.original, &self.working)
    }

    pub fn reset(&mut self) {
        self.working = Arc::clone(&self.original);
    }
}

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub name: String,
    pub pair: MeshPair,
    pub material: Material,
    pub transform: NodeTransform,
    pub visible: bool,
}

impl MeshNode {
    pub fn new(name: impl Into<String>, mesh: TriangleMesh) -> Self {
        Self {
            name: name.into(),
            pair: MeshPair::new(mesh),
            material: Material::default(),
            transform: NodeTransform::identity(),
            visible: true,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.pair.working.triangle_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightNode {
    pub name: String,
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
    pub transform: NodeTransform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraNode {
    pub name: String,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub transform: NodeTransform,
}

impl Default for CameraNode {
    fn default() -> Self {
        Self {
            name: "Camera".to_string(),
            fov_y_degrees: 60.0,
            near: 0.01,
            far: 1000.0,
            transform: NodeTransform::identity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
    pub name: String,
    pub transform: NodeTransform,
    pub children: Vec<NodeId>,
}

impl GroupNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: NodeTransform::identity(),
            children: Vec::new(),
        }
    }
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub enum SceneNode {
    Group(GroupNode),
    Mesh(MeshNode),
    Light(LightNode),
    Camera(CameraNode),
}

impl SceneNode {
    pub fn name(&self) -> &str {
        match self {
            SceneNode::Group(g) => &g.name,
            SceneNode::Mesh(m) => &m.name,
            SceneNode::Light(l) => &l.name,
            SceneNode::Camera(c) => &c.name,
        }
    }

    pub fn transform(&self) -> &NodeTransform {
        match self {
            SceneNode::Group(g) => &g.transform,
            SceneNode::Mesh(m) => &m.transform,
            SceneNode::Light(l) => &l.transform,
            SceneNode::Camera(c) => &c.transform,
        }
    }

    pub fn transform_mut(&mut self) -> &mut NodeTransform {
        match self {
            SceneNode::Group(g) => &mut g.transform,
            SceneNode::Mesh(m) => &mut m.transform,
            SceneNode::Light(l) => &mut l.transform,
            SceneNode::Camera(c) => &mut c.transform,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match self {
            SceneNode::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut MeshNode> {
        match self {
            SceneNode::Mesh(m) => Some(m),
            _ => None,
        }
    }

    fn rename(&mut self, name: String) {
        match self {
            SceneNode::Group(g) => g.name = name,
            SceneNode::Mesh(m) => m.name = name,
            SceneNode::Light(l) => l.name = name,
            SceneNode::Camera(c) => c.name = name,
        }
    }
}

#[derive(Debug, Clone)]
struct SceneEntry {
    node: SceneNode,
    parent: Option<NodeId>,
}

/// Flat node store with parent links. Root nodes have no parent; only
/// groups can have children.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    entries: BTreeMap<NodeId, SceneEntry>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert a node, optionally under a group
    pub fn add(&mut self, node: SceneNode, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(parent_id) = parent {
            match self.entries.get(&parent_id).map(|e| &e.node) {
                Some(SceneNode::Group(_)) => {}
                Some(other) => {
                    return Err(Error::InvalidData(format!(
                        "node {} ('{}') is not a group",
                        parent_id,
                        other.name()
                    )))
                }
                None => return Err(Error::UnknownNode(parent_id.0)),
            }
        }

        self.next_id += 1;
        let id = NodeId(self.next_id);
        if let Some(parent_id) = parent {
            if let Some(SceneNode::Group(group)) =
                self.entries.get_mut(&parent_id).map(|e| &mut e.node)
            {
                group.children.push(id);
            }
        }
        self.entries.insert(id, SceneEntry { node, parent });
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&SceneNode> {
        self.entries
            .get(&id)
            .map(|e| &e.node)
            .ok_or(Error::UnknownNode(id.0))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.entries
            .get_mut(&id)
            .map(|e| &mut e.node)
            .ok_or(Error::UnknownNode(id.0))
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.entries
            .get(&id)
            .map(|e| e.parent)
            .ok_or(Error::UnknownNode(id.0))
    }

    /// Remove a node and all of its descendants, returning the removed ids
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let parent = self.parent(id)?;
        if let Some(parent_id) = parent {
            if let Some(SceneNode::Group(group)) =
                self.entries.get_mut(&parent_id).map(|e| &mut e.node)
            {
                group.children.retain(|&child| child != id);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(entry) = self.entries.remove(&next) {
                if let SceneNode::Group(group) = &entry.node {
                    stack.extend(group.children.iter().copied());
                }
                removed.push(next);
            }
        }
        Ok(removed)
    }

    /// Copy a node (and, for groups, its subtree) next to the original.
    ///
    /// `copy_mesh` decides how each mesh pair is carried over.
    pub fn duplicate_with<F>(&mut self, id: NodeId, copy_mesh: &F) -> Result<NodeId>
    where
        F: Fn(&MeshPair) -> MeshPair,
    {
        let parent = self.parent(id)?;
        let copy_id = self.copy_subtree(id, parent, copy_mesh)?;
        let name = format!("{} (copy)", self.get(id)?.name());
        self.get_mut(copy_id)?.rename(name);
        Ok(copy_id)
    }

    fn copy_subtree<F>(&mut self, id: NodeId, parent: Option<NodeId>, copy_mesh: &F) -> Result<NodeId>
    where
        F: Fn(&MeshPair) -> MeshPair,
    {
        let mut node = self.get(id)?.clone();
        let children = match &mut node {
            SceneNode::Group(group) => std::mem::take(&mut group.children),
            SceneNode::Mesh(mesh) => {
                mesh.pair = copy_mesh(&mesh.pair);
                Vec::new()
            }
            _ => Vec::new(),
        };
        let copy_id = self.add(node, parent)?;
        for child in children {
            self.copy_subtree(child, Some(copy_id), copy_mesh)?;
        }
        Ok(copy_id)
    }

    /// All node ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.entries.iter().map(|(id, e)| (*id, &e.node))
    }

    pub fn mesh_ids(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.as_mesh().is_some())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (NodeId, &MeshNode)> {
        self.nodes().filter_map(|(id, node)| node.as_mesh().map(|m| (id, m)))
    }
}
