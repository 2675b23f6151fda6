use foundation::bounds::{Aabb2, Aabb3};
use foundation::math::Mat4;
use thiserror::Error;

use crate::content::ContentNode;
use crate::material::Color;
use crate::node::{Node, NodeId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("unknown scene node {0}")]
    UnknownNode(NodeId),
    #[error("cannot parent {node} under its own descendant {parent}")]
    Cycle { node: NodeId, parent: NodeId },
}

/// Scene collaborator used by the streaming core.
///
/// Implementors own node storage; callers only hold [`NodeId`]s. Operations on
/// disposed nodes are no-ops (or `Err` where a result is expected).
pub trait SceneGraph {
    fn create_node(&mut self, name: &str, parent: Option<NodeId>) -> NodeId;

    /// Flat colored quad over `extent` (scene `x`/`z`) at height `y`.
    fn create_placeholder(&mut self, name: &str, extent: Aabb2, y: f64, color: Color) -> NodeId;

    /// Instantiates a decoded content tree under `parent`, returning its root.
    fn attach_content(&mut self, parent: NodeId, content: ContentNode)
    -> Result<NodeId, SceneError>;

    /// Copies one node (own geometry, no children) as a new root.
    fn clone_node(&mut self, source: NodeId, name: &str) -> Result<NodeId, SceneError>;

    /// Destroys `node` and its whole subtree.
    fn dispose(&mut self, node: NodeId);

    fn node(&self, id: NodeId) -> Option<&Node>;

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node>;

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError>;

    fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        if let Some(node) = self.node_mut(id) {
            node.enabled = enabled;
        }
    }

    /// The node's own flag; ancestors are not consulted.
    fn is_enabled(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.enabled)
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children().to_vec()).unwrap_or_default()
    }

    /// `id` and every node below it, depth first, parents before children.
    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.node(next) else { continue };
            out.push(next);
            stack.extend(node.children().iter().rev().copied());
        }
        out
    }

    /// Local transform chained through every ancestor.
    fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut out = Mat4::identity();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else { break };
            out = out.multiply(&node.local);
            cursor = node.parent();
        }
        out
    }

    /// World-space bounds of all geometry at or below `id`.
    fn world_bounds(&self, id: NodeId) -> Option<Aabb3> {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| {
                let bounds = self.node(n)?.geometry.as_ref()?.bounds()?;
                Some(bounds.transformed(&self.world_transform(n)))
            })
            .reduce(|a, b| a.union(&b))
    }
}
