//! Instance deduplication.
//!
//! Nodes tagged with `ddd:instance:key` are replaced by placements on one
//! canonical clone per (tile, key, template mesh). Two entry points exist:
//! per-node placements computed from world matrices, and precomputed matrix
//! buffers shipped with the tile. Their coordinate corrections differ.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use base64::Engine as _;
use foundation::math::{Mat4, Vec3};
use scene::{NodeId, SceneGraph};
use serde_json::Value;
use tracing::{debug, warn};

use crate::CatalogError;
use crate::meta;
use crate::process::ContentProcessor;

/// Hidden beyond this distance when placed from a matrix buffer.
pub const BUFFER_INSTANCE_LOD_CUTOFF: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub tile: NodeId,
    pub key: String,
    /// Template mesh the root was cloned from.
    pub source: NodeId,
}

impl InstanceKey {
    pub fn new(tile: NodeId, key: &str, source: NodeId) -> Self {
        Self {
            tile,
            key: key.to_string(),
            source,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.tile.0, self.key, self.source.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InstanceRoot {
    pub node: NodeId,
    /// Placements appended so far; equals the node's instance buffer length.
    pub placements: usize,
}

#[derive(Debug, Default)]
pub struct InstanceDeduper {
    roots: BTreeMap<InstanceKey, InstanceRoot>,
}

impl InstanceDeduper {
    pub fn get(&self, key: &InstanceKey) -> Option<&InstanceRoot> {
        self.roots.get(key)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceKey, &InstanceRoot)> {
        self.roots.iter()
    }

    pub fn roots_for_tile(&self, tile: NodeId) -> impl Iterator<Item = (&InstanceKey, &InstanceRoot)> {
        self.roots.iter().filter(move |(k, _)| k.tile == tile)
    }

    pub fn total_placements(&self) -> usize {
        self.roots.values().map(|r| r.placements).sum()
    }

    pub(crate) fn forget_tile(&mut self, tile: NodeId) {
        self.roots.retain(|k, _| k.tile != tile);
    }

    fn insert(&mut self, key: InstanceKey, node: NodeId) {
        self.roots.insert(key, InstanceRoot { node, placements: 0 });
    }

    fn record(&mut self, key: &InstanceKey, count: usize) {
        if let Some(root) = self.roots.get_mut(key) {
            root.placements += count;
        }
    }
}

/// Decodes a flat matrix buffer: a JSON number array, or base64 of
/// little-endian `f32`s. Length must be a multiple of 16.
pub fn decode_matrix_buffer(value: &Value) -> Result<Vec<Mat4>, CatalogError> {
    let floats: Vec<f32> = match value {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| CatalogError::InvalidInstanceBuffer(format!("not a number: {v}")))
            })
            .collect::<Result<_, _>>()?,
        Value::String(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| CatalogError::InvalidInstanceBuffer(e.to_string()))?;
            if bytes.len() % 4 != 0 {
                return Err(CatalogError::InvalidInstanceBuffer(format!(
                    "{} bytes is not a whole number of floats",
                    bytes.len()
                )));
            }
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        other => {
            return Err(CatalogError::InvalidInstanceBuffer(format!(
                "unexpected {other}"
            )));
        }
    };
    if floats.len() % 16 != 0 {
        return Err(CatalogError::InvalidInstanceBuffer(format!(
            "{} values is not a whole number of matrices",
            floats.len()
        )));
    }
    Ok((0..floats.len() / 16)
        .filter_map(|i| Mat4::from_slice(&floats, i * 16))
        .collect())
}

/// Meshes below a template, or the template itself when it is a lone mesh.
fn template_meshes<S: SceneGraph + ?Sized>(scene: &S, template: NodeId) -> Vec<NodeId> {
    let below: Vec<NodeId> = scene
        .descendants(template)
        .into_iter()
        .skip(1)
        .filter(|id| scene.node(*id).is_some_and(|n| n.geometry.is_some()))
        .collect();
    if below.is_empty() && scene.node(template).is_some_and(|n| n.geometry.is_some()) {
        vec![template]
    } else {
        below
    }
}

/// Copies a template mesh into a fresh, material-less, enabled root under `tile`.
fn clone_for_tile<S: SceneGraph + ?Sized>(
    scene: &mut S,
    key: &InstanceKey,
) -> Result<NodeId, CatalogError> {
    let id = scene.clone_node(key.source, &key.to_string())?;
    if let Some(node) = scene.node_mut(id) {
        node.material = None;
        node.enabled = true;
        node.metadata.remove(meta::INSTANCE_KEY);
        node.metadata.remove(meta::INSTANCE_BUFFER_MATRICES);
    }
    scene.set_parent(id, Some(key.tile))?;
    Ok(id)
}

impl ContentProcessor {
    /// Per-node path: one placement for `node` on every template mesh root.
    pub(crate) fn instance_placements<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        tile: NodeId,
        key: &str,
        node: NodeId,
    ) {
        let Some(template) = self.catalog.lookup_geometry(key) else {
            return;
        };
        let Some(template_inv) = scene.world_transform(template).inverse() else {
            warn!(%key, "instance template has a singular transform");
            scene.dispose(node);
            return;
        };
        let mirrored = Mat4::scaling(Vec3::new(1.0, 1.0, -1.0)).multiply(&scene.world_transform(node));

        for mesh in template_meshes(scene, template) {
            let Some(data) = scene.node(mesh) else { continue };
            if data.has_meta(meta::LIGHT_COLOR)
                || (!data.has_drawable_geometry() && data.children().is_empty())
            {
                continue;
            }

            let ikey = InstanceKey::new(tile, key, mesh);
            let root = match self.instances.get(&ikey) {
                Some(root) => root.node,
                None => match self.create_placement_root(scene, &ikey) {
                    Ok(Some(root)) => root,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(instance = %ikey, %err, "could not create instance root");
                        continue;
                    }
                },
            };

            let Some(root_inv) = scene.world_transform(root).inverse() else {
                warn!(instance = %ikey, "instance root has a singular transform");
                continue;
            };
            let relative = scene.world_transform(mesh).multiply(&template_inv);
            let placement = relative.multiply(&mirrored).multiply(&root_inv);
            let Some(root_node) = scene.node_mut(root) else {
                continue;
            };
            root_node.instances.push(placement);
            self.instances.record(&ikey, 1);
        }
        scene.dispose(node);
    }

    fn create_placement_root<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        ikey: &InstanceKey,
    ) -> Result<Option<NodeId>, CatalogError> {
        debug!(instance = %ikey, "creating instance root");
        let root = clone_for_tile(scene, ikey)?;
        if let Some(geometry) = scene.node_mut(root).and_then(|n| n.geometry.as_mut()) {
            geometry.to_left_handed();
        }
        self.instances.insert(ikey.clone(), root);
        self.process_node(scene, ikey.tile, root);

        let drawable = scene.node(ikey.source).is_some_and(|n| n.has_drawable_geometry());
        if !drawable || !scene.contains(root) {
            return Ok(None);
        }
        if self.options.shadows_enabled
            && let Some(node) = scene.node_mut(root)
        {
            node.shadows.cast = true;
        }
        Ok(Some(root))
    }

    /// Buffer path: the tile ships every placement for `key` in one array.
    pub(crate) fn instance_buffers<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        tile: NodeId,
        key: &str,
        node: NodeId,
        buffer: &Value,
    ) {
        let matrices = match decode_matrix_buffer(buffer) {
            Ok(m) => m,
            Err(err) => {
                warn!(%key, %err, "dropping instance buffer");
                scene.dispose(node);
                return;
            }
        };
        let Some(template) = self.catalog.lookup_geometry(key) else {
            return;
        };

        for mesh in template_meshes(scene, template) {
            if scene.node(mesh).is_none_or(|n| n.has_meta(meta::LIGHT_COLOR)) {
                continue;
            }
            let ikey = InstanceKey::new(tile, key, mesh);
            let root = match self.instances.get(&ikey) {
                Some(root) => root.node,
                None => match self.create_buffer_root(scene, &ikey) {
                    Ok(root) => root,
                    Err(err) => {
                        warn!(instance = %ikey, %err, "could not create instance root");
                        continue;
                    }
                },
            };
            let Some(root_node) = scene.node_mut(root) else {
                continue;
            };
            root_node.instances.extend(matrices.iter().copied());
            self.instances.record(&ikey, matrices.len());
        }
        scene.dispose(node);
    }

    fn create_buffer_root<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        ikey: &InstanceKey,
    ) -> Result<NodeId, CatalogError> {
        debug!(instance = %ikey, "creating buffered instance root");
        let root = clone_for_tile(scene, ikey)?;
        if let Some(node) = scene.node_mut(root) {
            // Baked into vertices, then a separate root transform that the
            // shipped matrices are authored against.
            let baked = Mat4::rotation_z(PI)
                .multiply(&Mat4::rotation_y(PI))
                .multiply(&Mat4::rotation_x(-FRAC_PI_2))
                .multiply(&node.local);
            if let Some(geometry) = node.geometry.as_mut() {
                geometry.bake(&baked);
            }
            node.local = Mat4::scaling(Vec3::new(1.0, -1.0, 1.0))
                .multiply(&Mat4::rotation_x(-FRAC_PI_2))
                .multiply(&Mat4::rotation_y(PI));
            node.lod_cutoff = Some(BUFFER_INSTANCE_LOD_CUTOFF);
        }
        self.instances.insert(ikey.clone(), root);
        self.process_node(scene, ikey.tile, root);
        if self.options.shadows_enabled
            && let Some(node) = scene.node_mut(root)
        {
            node.shadows.cast = true;
        }
        Ok(root)
    }
}
