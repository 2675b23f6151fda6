use foundation::bounds::Aabb2;
use foundation::handles::Handle;

use crate::content::ContentNode;
use crate::geometry::Geometry;
use crate::graph::{SceneError, SceneGraph};
use crate::material::{Color, Material, MaterialBinding};
use crate::node::{Node, NodeId};

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// In-memory scene: a generational node arena.
#[derive(Debug, Default)]
pub struct World {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live nodes without a parent, in slot order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.parent().is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            let node = slot.node.as_ref()?;
            Some((NodeId(Handle::new(idx as u32, slot.generation)), node))
        })
    }

    /// First live node with this name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.node = Some(node);
            return NodeId(Handle::new(idx, slot.generation));
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId(Handle::new((self.slots.len() - 1) as u32, 0))
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.0.generation())
    }

    fn link(&mut self, child: NodeId, parent: Option<NodeId>) {
        if let Some(old) = self.node(child).and_then(Node::parent)
            && let Some(p) = self.node_mut(old)
        {
            p.children.retain(|c| *c != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = parent;
        }
        if let Some(p) = parent.and_then(|p| self.node_mut(p)) {
            p.children.push(child);
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut cursor = Some(of);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.node(current).and_then(Node::parent);
        }
        false
    }

    fn instantiate(&mut self, content: ContentNode, parent: NodeId) -> NodeId {
        let local = content.local_transform();
        let ContentNode {
            name,
            metadata,
            geometry,
            material,
            children,
            ..
        } = content;

        let mut node = Node::new(name);
        node.local = local;
        node.metadata = metadata;
        node.geometry = geometry;
        node.material = material.map(MaterialBinding::Inline);
        let id = self.insert(node);
        self.link(id, Some(parent));

        for child in children {
            self.instantiate(child, id);
        }
        id
    }
}

impl SceneGraph for World {
    fn create_node(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        let id = self.insert(Node::new(name));
        let parent = parent.filter(|p| self.contains(*p));
        self.link(id, parent);
        id
    }

    fn create_placeholder(&mut self, name: &str, extent: Aabb2, y: f64, color: Color) -> NodeId {
        let mut node = Node::new(name);
        node.geometry = Some(Geometry::ground_quad(extent, y));
        node.material = Some(MaterialBinding::Inline(Material::flat(
            format!("{name}_material"),
            color,
        )));
        self.insert(node)
    }

    fn attach_content(
        &mut self,
        parent: NodeId,
        content: ContentNode,
    ) -> Result<NodeId, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        Ok(self.instantiate(content, parent))
    }

    fn clone_node(&mut self, source: NodeId, name: &str) -> Result<NodeId, SceneError> {
        let original = self.node(source).ok_or(SceneError::UnknownNode(source))?;
        let mut copy = original.clone();
        copy.name = name.to_string();
        copy.parent = None;
        copy.children.clear();
        Ok(self.insert(copy))
    }

    fn dispose(&mut self, node: NodeId) {
        if !self.contains(node) {
            return;
        }
        self.link(node, None);
        for id in self.descendants(node) {
            let idx = id.index() as usize;
            let slot = &mut self.slots[idx];
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(idx as u32);
                self.live -= 1;
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slot(id)?.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.0.generation())?
            .node
            .as_mut()
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        if !self.contains(node) {
            return Err(SceneError::UnknownNode(node));
        }
        if let Some(p) = parent {
            if !self.contains(p) {
                return Err(SceneError::UnknownNode(p));
            }
            if self.is_ancestor_or_self(node, p) {
                return Err(SceneError::Cycle { node, parent: p });
            }
        }
        self.link(node, parent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::World;
    use crate::content::ContentNode;
    use crate::geometry::Geometry;
    use crate::graph::{SceneError, SceneGraph};
    use crate::material::{Color, MaterialBinding};
    use foundation::bounds::Aabb2;
    use foundation::math::{Mat4, Vec3};
    use pretty_assertions::assert_eq;

    fn tri() -> Geometry {
        Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0, 1, 2])
    }

    #[test]
    fn attach_builds_hierarchy() {
        let mut world = World::new();
        let root = world.create_node("tile", None);
        let content = ContentNode::new("content")
            .with_child(ContentNode::new("a").with_geometry(tri()))
            .with_child(ContentNode::new("b"));
        let attached = world.attach_content(root, content).unwrap();

        assert_eq!(world.len(), 4);
        assert_eq!(world.node(attached).and_then(|n| n.parent()), Some(root));
        let names: Vec<String> = world
            .descendants(root)
            .into_iter()
            .filter_map(|id| world.node(id).map(|n| n.name.clone()))
            .collect();
        assert_eq!(names, vec!["tile", "content", "a", "b"]);
    }

    #[test]
    fn dispose_removes_subtree_and_invalidates_handles() {
        let mut world = World::new();
        let root = world.create_node("root", None);
        let child = world.create_node("child", Some(root));
        let other = world.create_node("other", None);

        world.dispose(root);
        assert!(!world.contains(root));
        assert!(!world.contains(child));
        assert!(world.contains(other));
        assert_eq!(world.len(), 1);

        // Reused slot gets a new generation.
        let fresh = world.create_node("fresh", None);
        assert_eq!(fresh.index(), child.index());
        assert_ne!(fresh, child);
        assert!(!world.contains(child));
    }

    #[test]
    fn world_transform_chains_parents() {
        let mut world = World::new();
        let parent = world.create_node("p", None);
        let child = world.create_node("c", Some(parent));
        world.node_mut(parent).unwrap().local = Mat4::translation(Vec3::new(10.0, 0.0, 0.0));
        world.node_mut(child).unwrap().local = Mat4::translation(Vec3::new(0.0, 2.0, 0.0));

        let p = world.world_transform(child).transform_point(Vec3::ZERO);
        assert_eq!(p, Vec3::new(10.0, 2.0, 0.0));
    }

    #[test]
    fn world_bounds_cover_descendants() {
        let mut world = World::new();
        let root = world.create_node("root", None);
        world.node_mut(root).unwrap().local = Mat4::translation(Vec3::new(0.0, 5.0, 0.0));
        let content = ContentNode::new("c").with_geometry(tri());
        world.attach_content(root, content).unwrap();

        let b = world.world_bounds(root).expect("has geometry");
        assert_eq!(b.min, [0.0, 5.0, 0.0]);
        assert_eq!(b.max, [1.0, 6.0, 0.0]);
    }

    #[test]
    fn clone_is_detached_and_childless() {
        let mut world = World::new();
        let root = world.create_node("root", None);
        let src = world
            .attach_content(
                root,
                ContentNode::new("src")
                    .with_geometry(tri())
                    .with_child(ContentNode::new("inner")),
            )
            .unwrap();
        let copy = world.clone_node(src, "copy").unwrap();
        let node = world.node(copy).unwrap();
        assert_eq!(node.parent(), None);
        assert!(node.children().is_empty());
        assert_eq!(node.geometry, Some(tri()));
    }

    #[test]
    fn reparenting_rejects_cycles() {
        let mut world = World::new();
        let a = world.create_node("a", None);
        let b = world.create_node("b", Some(a));
        assert_eq!(
            world.set_parent(a, Some(b)),
            Err(SceneError::Cycle { node: a, parent: b })
        );
        world.set_parent(b, None).unwrap();
        assert!(world.children(a).is_empty());
        assert_eq!(world.roots(), vec![a, b]);
    }

    #[test]
    fn placeholder_is_flat_colored_quad() {
        let mut world = World::new();
        let id = world.create_placeholder(
            "tile_17_1_2",
            Aabb2::new([0.0, 0.0], [100.0, 100.0]),
            3.0,
            Color::LOADING,
        );
        let node = world.node(id).unwrap();
        assert!(node.has_drawable_geometry());
        match &node.material {
            Some(MaterialBinding::Inline(m)) => assert_eq!(m.emissive, Color::LOADING),
            other => panic!("unexpected material {other:?}"),
        }
    }
}
