//! Content walk: binds nodes to catalog materials, replaces instance
//! references with batched placements and records missing dependencies.

use scene::{Geometry, Material, MaterialBinding, Metadata, NodeId, SceneGraph, Transparency};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::depends::DependencyResolver;
use crate::instances::InstanceDeduper;
use crate::meta;
use crate::rules::{self, WATER_BASIC_DAYTIME, WATER_INSTANCED};

/// Rendering group for water surfaces.
pub const WATER_RENDERING_GROUP: u8 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Instance roots become shadow casters.
    pub shadows_enabled: bool,
    /// Keep `ddd:text` nodes (as labels) instead of removing them.
    pub texts_enabled: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            shadows_enabled: true,
            texts_enabled: false,
        }
    }
}

/// Outcome of one dependency resolution pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ResolveReport {
    pub reprocessed: usize,
    /// Snapshot entries whose tile no longer exists.
    pub dropped: usize,
    pub still_pending: usize,
}

/// Owns the catalog, the instance roots and the pending set for one session.
#[derive(Debug, Default)]
pub struct ContentProcessor {
    pub(crate) catalog: Catalog,
    pub(crate) instances: InstanceDeduper,
    pub(crate) depends: DependencyResolver,
    pub(crate) options: ProcessOptions,
}

impl ContentProcessor {
    pub fn new(catalog: Catalog, options: ProcessOptions) -> Self {
        Self {
            catalog,
            instances: InstanceDeduper::default(),
            depends: DependencyResolver::new(),
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn instances(&self) -> &InstanceDeduper {
        &self.instances
    }

    pub fn depends(&self) -> &DependencyResolver {
        &self.depends
    }

    pub fn options(&self) -> ProcessOptions {
        self.options
    }

    /// Walks a freshly attached tile.
    pub fn process_tile<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, tile: NodeId) {
        self.process_node(scene, tile, tile);
    }

    /// Reprocesses every pending tile once against the current catalog.
    pub fn resolve_pending<S: SceneGraph + ?Sized>(&mut self, scene: &mut S) -> ResolveReport {
        let mut report = ResolveReport::default();
        for tile in self.depends.begin_pass() {
            if !scene.contains(tile) {
                report.dropped += 1;
                continue;
            }
            self.process_node(scene, tile, tile);
            report.reprocessed += 1;
        }
        report.still_pending = self.depends.len();
        if report.reprocessed > 0 {
            debug!(?report, "dependency pass");
        }
        report
    }

    /// Drops instance roots and pending state owned by a disposed tile.
    pub fn forget_tile(&mut self, tile: NodeId) {
        self.instances.forget_tile(tile);
        self.depends.forget(tile);
    }

    /// Registers geometry templates and materials found under `node`.
    ///
    /// With `load_materials` every material is registered (forced);
    /// otherwise only keys missing from the catalog are added.
    pub fn load_catalog_from_node<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        node: NodeId,
        load_materials: bool,
    ) {
        let children = scene.children(node);
        if let Some(data) = scene.node(node) {
            let instance_key = data.meta_str(meta::INSTANCE_KEY).map(str::to_string);
            let material_key = data.meta_str(meta::MATERIAL).map(str::to_string);
            let inline = data
                .material
                .as_ref()
                .and_then(MaterialBinding::inline)
                .cloned();
            let metadata = data.metadata.clone();

            if let Some(key) = instance_key
                && let Err(err) = self.catalog.register_geometry(scene, &key, node)
            {
                warn!(%key, %err, "could not register catalog geometry");
            }
            if let Some(key) = material_key
                && (load_materials || !self.catalog.contains_material(&key))
            {
                match inline {
                    Some(material) => {
                        self.catalog.register_material(&key, material, &metadata, true);
                    }
                    None => debug!(%key, "catalog node without material"),
                }
            }
        }
        for child in children {
            self.load_catalog_from_node(scene, child, load_materials);
        }
    }

    /// Processes `node` (belonging to `tile`) and its children. Returns the
    /// node if it survives the walk.
    pub(crate) fn process_node<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        tile: NodeId,
        node: NodeId,
    ) -> Option<NodeId> {
        let data = scene.node_mut(node)?;
        if data.children().is_empty() && data.geometry.as_ref().is_some_and(Geometry::is_empty) {
            return None;
        }
        data.shadows.receive = true;
        let metadata = data.metadata.clone();

        if !metadata.is_empty() {
            if metadata.contains_key(meta::MATERIAL) && !metadata.contains_key(meta::TEXT) {
                self.bind_material(scene, tile, node, &metadata);
            }

            if metadata.contains_key(meta::LIGHT_COLOR) {
                scene.dispose(node);
                return None;
            } else if let Some(text) = metadata.get(meta::TEXT) {
                if !self.options.texts_enabled {
                    scene.dispose(node);
                    return None;
                }
                self.make_label(scene, node, text.as_str().unwrap_or_default(), &metadata);
            } else if let Some(key) = metadata.get(meta::INSTANCE_KEY).and_then(|v| v.as_str()) {
                if self.catalog.lookup_geometry(key).is_none() {
                    debug!(%key, %tile, "instance key not in catalog");
                    self.depends.mark_pending(tile);
                    return None;
                }
                if let Some(buffer) = metadata.get(meta::INSTANCE_BUFFER_MATRICES) {
                    self.instance_buffers(scene, tile, key, node, buffer);
                } else {
                    self.instance_placements(scene, tile, key, node);
                }
                return None;
            }
        }

        for child in scene.children(node) {
            self.process_node(scene, tile, child);
        }
        Some(node)
    }

    fn bind_material<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        tile: NodeId,
        node: NodeId,
        metadata: &Metadata,
    ) {
        let Some(declared) = metadata.get(meta::MATERIAL).and_then(|v| v.as_str()) else {
            return;
        };
        let mut key = declared;
        if key == WATER_BASIC_DAYTIME
            && metadata
                .get(meta::PATH)
                .and_then(|v| v.as_str())
                .is_some_and(|p| p.contains(meta::INSTANCE_PATH_MARKER))
        {
            key = WATER_INSTANCED;
        }

        let Some(data) = scene.node_mut(node) else {
            return;
        };
        if rules::is_water(key) {
            data.rendering_group = WATER_RENDERING_GROUP;
        }

        if !self.catalog.contains_material(key)
            && let Some(material) = data.material.as_ref().and_then(MaterialBinding::inline)
        {
            let auto = Material {
                name: declared.to_string(),
                ..material.clone()
            };
            self.catalog.register_material(declared, auto, metadata, false);
            self.depends.mark_pending(tile);
        }

        if self.catalog.contains_material(key) {
            data.material = Some(MaterialBinding::Catalog(key.to_string()));
        } else {
            self.depends.mark_pending(tile);
        }
    }

    fn make_label<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        node: NodeId,
        text: &str,
        metadata: &Metadata,
    ) {
        let width = metadata
            .get(meta::TEXT_WIDTH)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0) as f32;
        let half_w = width / 2.0;
        let half_h = half_w * 0.35;
        let Some(data) = scene.node_mut(node) else {
            return;
        };
        data.geometry = Some(Geometry::new(
            vec![
                [-half_w, -half_h, 0.0],
                [half_w, -half_h, 0.0],
                [half_w, half_h, 0.0],
                [-half_w, half_h, 0.0],
            ],
            // Both windings: labels are double sided.
            vec![0, 1, 2, 0, 2, 3, 0, 2, 1, 0, 3, 2],
        ));
        data.material = Some(MaterialBinding::Inline(Material {
            transparency: Transparency::AlphaTest,
            ..Material::textured(format!("label_{node}"), format!("text:{text}"))
        }));
    }
}
