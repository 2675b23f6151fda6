//! Decoded tile content: a plain node tree, not yet part of any scene.

use foundation::math::Mat4;
use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::material::Material;
use crate::node::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentNode {
    pub name: String,
    /// Local transform, 16 values row-major. Identity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<[f32; 16]>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_matrix(mut self, m: &Mat4) -> Self {
        self.matrix = Some(m.to_f32_array());
        self
    }

    pub fn with_child(mut self, child: ContentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn local_transform(&self) -> Mat4 {
        self.matrix
            .and_then(|m| Mat4::from_slice(&m, 0))
            .unwrap_or_default()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ContentNode::node_count).sum::<usize>()
    }
}
