use std::fmt;

use foundation::handles::Handle;
use foundation::math::Mat4;

use crate::geometry::Geometry;
use crate::material::MaterialBinding;

/// Free-form node metadata (string keys, JSON values).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Generational handle to a scene node. Stale handles never alias a newer node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub Handle);

impl NodeId {
    pub fn index(&self) -> u32 {
        self.0.index()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ShadowFlags {
    pub cast: bool,
    pub receive: bool,
}

/// One scene node. Hierarchy links are owned by the graph and only readable here.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub local: Mat4,
    pub enabled: bool,
    pub metadata: Metadata,
    pub geometry: Option<Geometry>,
    pub material: Option<MaterialBinding>,
    pub shadows: ShadowFlags,
    /// Per-instance placement transforms relative to this node.
    pub instances: Vec<Mat4>,
    pub rendering_group: u8,
    /// Hidden beyond this camera distance.
    pub lod_cutoff: Option<f64>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: Mat4::identity(),
            enabled: true,
            metadata: Metadata::new(),
            geometry: None,
            material: None,
            shadows: ShadowFlags::default(),
            instances: Vec::new(),
            rendering_group: 0,
            lod_cutoff: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn has_meta(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// Whether this node has a mesh with triangles.
    pub fn has_drawable_geometry(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| !g.is_empty())
    }
}
