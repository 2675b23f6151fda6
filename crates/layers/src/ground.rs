//! Ground texture overlay for area and way surfaces.

use std::collections::BTreeMap;

use catalog::meta;
use foundation::math::TileCoord;
use scene::{Color, Material, MaterialBinding, NodeId, SceneGraph};
use streaming::TileUrlTemplate;

/// Texture overlap factor that hides seams between neighboring tiles.
const SEAM_OVERLAP: f64 = 127.0 / 128.0;

/// Area and way surfaces: a path segment past the root.
pub fn is_ground_path(path: &str) -> bool {
    ["/Areas", "/Ways"]
        .iter()
        .any(|part| path.find(part).is_some_and(|i| i > 0))
}

/// Per-tile ground material; `tile_width` is in scene units.
pub fn ground_material(coord: TileCoord, url: String, tile_width: f64) -> Material {
    let mut material = Material::textured(format!("materialGround_{}", coord.key()), url);
    material.albedo = Color::new(0.2, 0.2, 0.2);
    material.emissive = Color::new(0.05, 0.05, 0.05);
    if tile_width > 0.0 {
        material.uv_scale = 4.0 / tile_width * SEAM_OVERLAP;
    }
    material
}

/// Swaps ground surface materials for a map texture and back.
#[derive(Debug, Default)]
pub struct GroundOverlay {
    template: Option<TileUrlTemplate>,
    originals: BTreeMap<NodeId, Option<MaterialBinding>>,
}

impl GroundOverlay {
    pub fn template(&self) -> Option<&TileUrlTemplate> {
        self.template.as_ref()
    }

    pub fn set_template(&mut self, template: Option<TileUrlTemplate>) {
        self.template = template;
    }

    /// Nodes currently showing the overlay.
    pub fn overridden(&self) -> usize {
        self.originals.len()
    }

    /// Applies (or, without a template, reverts) the overlay on every
    /// ground surface below `tile`.
    pub fn apply(
        &mut self,
        scene: &mut dyn SceneGraph,
        tile: NodeId,
        coord: TileCoord,
        tile_width: f64,
    ) {
        let material = self
            .template
            .as_ref()
            .map(|t| ground_material(coord, t.expand(coord), tile_width));

        for id in scene.descendants(tile) {
            let Some(node) = scene.node_mut(id) else {
                continue;
            };
            if !node.meta_str(meta::PATH).is_some_and(is_ground_path) {
                continue;
            }
            match &material {
                Some(material) => {
                    let current = node.material.clone();
                    self.originals.entry(id).or_insert(current);
                    node.material = Some(MaterialBinding::Inline(material.clone()));
                }
                None => {
                    if let Some(original) = self.originals.remove(&id) {
                        node.material = original;
                    }
                }
            }
        }
    }

    /// Puts the saved materials back on every overridden node below `tile`,
    /// leaving the template in place.
    pub fn revert(&mut self, scene: &mut dyn SceneGraph, tile: NodeId) {
        for id in scene.descendants(tile) {
            let Some(original) = self.originals.remove(&id) else {
                continue;
            };
            if let Some(node) = scene.node_mut(id) {
                node.material = original;
            }
        }
    }

    /// Drops saved materials of nodes that no longer exist.
    pub fn prune(&mut self, scene: &dyn SceneGraph) {
        self.originals.retain(|id, _| scene.contains(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::{GroundOverlay, is_ground_path};
    use foundation::math::TileCoord;
    use pretty_assertions::assert_eq;
    use scene::{ContentNode, MaterialBinding, SceneGraph, World};
    use streaming::TileUrlTemplate;

    #[test]
    fn ground_paths() {
        assert!(is_ground_path("/Root/Areas_0/Park"));
        assert!(is_ground_path("/Root/Ways_1/Road"));
        assert!(!is_ground_path("/Areas"));
        assert!(!is_ground_path("/Root/Buildings/House"));
    }

    #[test]
    fn overlay_swaps_and_restores() {
        let mut world = World::new();
        let tile = world.create_node("chunk", None);
        let content = ContentNode::new("root")
            .with_child(ContentNode::new("park").with_metadata("ddd:path", "/Root/Areas_0/Park"))
            .with_child(ContentNode::new("house").with_metadata("ddd:path", "/Root/Buildings/House"));
        let root = world.attach_content(tile, content).unwrap();
        let kids = world.children(root);
        world.node_mut(kids[0]).unwrap().material = Some(MaterialBinding::Catalog("Grass".into()));

        let coord = TileCoord::new(17, 1, 2);
        let mut overlay = GroundOverlay::default();
        overlay.set_template(Some(TileUrlTemplate::new("https://t/{z}/{x}/{y}.png")));
        overlay.apply(&mut world, tile, coord, 226.0);
        assert_eq!(overlay.overridden(), 1);
        match &world.node(kids[0]).unwrap().material {
            Some(MaterialBinding::Inline(m)) => {
                assert_eq!(m.albedo_texture.as_deref(), Some("https://t/17/1/2.png"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(world.node(kids[1]).unwrap().material, None);

        // Re-applying keeps the first saved original.
        overlay.apply(&mut world, tile, coord, 226.0);
        overlay.set_template(None);
        overlay.apply(&mut world, tile, coord, 226.0);
        assert_eq!(
            world.node(kids[0]).unwrap().material,
            Some(MaterialBinding::Catalog("Grass".into()))
        );
        assert_eq!(overlay.overridden(), 0);
    }

    #[test]
    fn revert_keeps_template() {
        let mut world = World::new();
        let tile = world.create_node("chunk", None);
        let content = ContentNode::new("root")
            .with_child(ContentNode::new("road").with_metadata("ddd:path", "/Root/Ways_1/Road"));
        let root = world.attach_content(tile, content).unwrap();
        let road = world.children(root)[0];
        world.node_mut(road).unwrap().material = Some(MaterialBinding::Catalog("Asphalt".into()));

        let coord = TileCoord::new(17, 1, 2);
        let mut overlay = GroundOverlay::default();
        overlay.set_template(Some(TileUrlTemplate::new("https://t/{z}/{x}/{y}.png")));
        overlay.apply(&mut world, tile, coord, 226.0);
        overlay.revert(&mut world, tile);

        assert_eq!(
            world.node(road).unwrap().material,
            Some(MaterialBinding::Catalog("Asphalt".into()))
        );
        assert_eq!(overlay.overridden(), 0);
        assert!(overlay.template().is_some());
    }
}
