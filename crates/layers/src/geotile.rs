//! Geo-tile layer: one scene subtree per XYZ tile, streamed around the
//! viewpoint.
//!
//! Every requested tile gets a [`TileRecord`] that lives until the tile is
//! explicitly disposed. Hiding a tile keeps its content so it can be shown
//! again without a new fetch.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use catalog::{ContentProcessor, meta};
use foundation::bounds::Aabb2;
use foundation::math::{LocalTangentProjection, Mat4, Projection, TileCoord, TileGrid, Vec2, Vec3};
use scene::{Color, ContentNode, Material, MaterialBinding, Metadata, NodeId, SceneError, SceneGraph};
use serde_json::{Value, json};
use streaming::{FetchResult, LoadQueue, TileOutcome, TileStatus, TileUrlTemplate};
use tracing::{debug, info, warn};

use crate::ground::GroundOverlay;
use crate::layer::Layer;
use crate::visibility::{TileAction, Viewpoint, VisibilityScheduler};

pub const GEO_TILE_LAYER_KEY: &str = "ddd-osm-3d";

/// Map preview shown on tiles the server is still generating.
pub const PENDING_PREVIEW_URL: &str = "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Routes a tile fetch completion back to its layer and record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub layer: String,
    pub coord: TileCoord,
    /// Distinguishes fetches for a record that was disposed and recreated.
    pub ticket: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub coord: TileCoord,
    pub status: TileStatus,
    /// Placeholder while loading or after a failure, tile pivot once loaded.
    pub node: NodeId,
    /// Lowest non-zero mesh height, once loaded.
    pub min_height: Option<f64>,
    ticket: u64,
}

impl TileRecord {
    pub fn key(&self) -> String {
        self.coord.key()
    }
}

/// Whether a loaded mesh casts shadows: not when `ddd:shadows` is false, nor
/// for area and way surfaces.
pub fn casts_shadow(metadata: &Metadata) -> bool {
    let disabled = match metadata.get(meta::SHADOWS) {
        Some(Value::Bool(b)) => !b,
        Some(Value::String(s)) => s == "false",
        _ => false,
    };
    let surface = metadata
        .get(meta::PATH)
        .and_then(Value::as_str)
        .is_some_and(|p| ["/Areas_", "/Ways_"].iter().any(|m| p.find(m).is_some_and(|i| i > 0)));
    !(disabled || surface)
}

/// First node named `Metadata*`, searching each level before descending.
fn find_tile_info(scene: &dyn SceneGraph, node: NodeId) -> Option<Value> {
    let children = scene.children(node);
    for child in &children {
        if let Some(n) = scene.node(*child)
            && n.name.starts_with("Metadata")
        {
            return Some(Value::Object(n.metadata.clone()));
        }
    }
    children.into_iter().find_map(|c| find_tile_info(scene, c))
}

#[derive(Debug)]
pub struct GeoTileLayer {
    key: String,
    grid: TileGrid,
    projection: LocalTangentProjection,
    url_template: TileUrlTemplate,
    scheduler: VisibilityScheduler,
    ground: GroundOverlay,
    tiles: BTreeMap<TileCoord, TileRecord>,
    visible: bool,
    /// Tiles to show again when the hidden layer becomes visible.
    held: BTreeSet<TileCoord>,
    last_height: f64,
    tiles_loaded: u64,
    next_ticket: u64,
}

impl GeoTileLayer {
    pub fn new(
        key: impl Into<String>,
        projection: LocalTangentProjection,
        url_template: TileUrlTemplate,
    ) -> Self {
        Self {
            key: key.into(),
            grid: TileGrid::default(),
            projection,
            url_template,
            scheduler: VisibilityScheduler::default(),
            ground: GroundOverlay::default(),
            tiles: BTreeMap::new(),
            visible: true,
            held: BTreeSet::new(),
            last_height: 0.0,
            tiles_loaded: 0,
            next_ticket: 0,
        }
    }

    pub fn with_scheduler(mut self, scheduler: VisibilityScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn projection(&self) -> &LocalTangentProjection {
        &self.projection
    }

    pub fn scheduler_mut(&mut self) -> &mut VisibilityScheduler {
        &mut self.scheduler
    }

    pub fn record(&self, coord: TileCoord) -> Option<&TileRecord> {
        self.tiles.get(&coord)
    }

    pub fn records(&self) -> impl Iterator<Item = &TileRecord> {
        self.tiles.values()
    }

    pub fn status(&self, coord: TileCoord) -> Option<TileStatus> {
        self.record(coord).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles_loaded(&self) -> u64 {
        self.tiles_loaded
    }

    /// Height used for new placeholders: the last loaded tile's minimum.
    pub fn last_height(&self) -> f64 {
        self.last_height
    }

    pub fn count_by_status(&self, status: TileStatus) -> usize {
        self.tiles.values().filter(|r| r.status == status).count()
    }

    /// Tile footprint in scene units.
    pub fn scene_extent(&self, coord: TileCoord) -> Aabb2 {
        let (bottom_left, top_right) = self.grid.lon_lat_corners(coord);
        Aabb2::from_corners(
            self.projection.forward(bottom_left),
            self.projection.forward(top_right),
        )
    }

    pub fn scene_center(&self, coord: TileCoord) -> Vec2 {
        self.projection.forward(self.grid.center_of(coord))
    }

    /// Runs the visibility scheduler when its cadence allows. Returns whether
    /// it ran.
    pub fn update<T: From<TileRequest>>(
        &mut self,
        scene: &mut dyn SceneGraph,
        queue: &mut LoadQueue<T>,
        view: &Viewpoint,
        zoom: u8,
    ) -> bool {
        if !self.visible {
            return false;
        }
        let Some(plan) = self.scheduler.update(&self.grid, &self.projection, view, zoom) else {
            return false;
        };
        for (coord, action) in plan {
            match action {
                TileAction::Load => {
                    self.load_tile(scene, queue, coord);
                }
                TileAction::Disable => self.disable_tile(scene, coord),
            }
        }
        true
    }

    /// Requests a tile. Returns whether a fetch was enqueued.
    ///
    /// Existing records are never refetched; a hidden one is shown again.
    pub fn load_tile<T: From<TileRequest>>(
        &mut self,
        scene: &mut dyn SceneGraph,
        queue: &mut LoadQueue<T>,
        coord: TileCoord,
    ) -> bool {
        if let Some(record) = self.tiles.get(&coord) {
            if !self.visible {
                self.held.insert(coord);
            } else if record.status != TileStatus::Loading && !scene.is_enabled(record.node) {
                scene.set_enabled(record.node, true);
            }
            return false;
        }

        let marker = scene.create_placeholder(
            &format!("placeholder_{}", coord.key()),
            self.scene_extent(coord),
            self.last_height,
            Color::LOADING,
        );
        if !self.visible {
            scene.set_enabled(marker, false);
            self.held.insert(coord);
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.tiles.insert(
            coord,
            TileRecord {
                coord,
                status: TileStatus::Loading,
                node: marker,
                min_height: None,
                ticket,
            },
        );
        let url = self.url_template.expand(coord);
        debug!(tile = %coord, %url, "requesting tile");
        queue.enqueue(
            url,
            T::from(TileRequest {
                layer: self.key.clone(),
                coord,
                ticket,
            }),
        );
        true
    }

    /// Hides a settled, visible tile without destroying its content.
    pub fn disable_tile(&mut self, scene: &mut dyn SceneGraph, coord: TileCoord) {
        let Some(record) = self.tiles.get(&coord) else {
            return;
        };
        if record.status != TileStatus::Loading {
            self.held.remove(&coord);
        }
        if record.status != TileStatus::Loading && scene.is_enabled(record.node) {
            scene.set_enabled(record.node, false);
        }
    }

    /// Destroys a tile's content and forgets its record.
    pub fn dispose_tile(
        &mut self,
        scene: &mut dyn SceneGraph,
        processor: &mut ContentProcessor,
        coord: TileCoord,
    ) -> bool {
        let Some(record) = self.tiles.remove(&coord) else {
            return false;
        };
        self.held.remove(&coord);
        scene.dispose(record.node);
        processor.forget_tile(record.node);
        self.ground.prune(scene);
        true
    }

    /// Applies a fetch result to its record. Returns `None` when the record
    /// was removed (or replaced) since the request was made.
    pub fn complete_tile(
        &mut self,
        scene: &mut dyn SceneGraph,
        processor: &mut ContentProcessor,
        request: &TileRequest,
        result: FetchResult,
    ) -> Option<TileOutcome> {
        let coord = request.coord;
        let placeholder = match self.tiles.get(&coord) {
            Some(r) if r.ticket == request.ticket && r.status == TileStatus::Loading => r.node,
            _ => {
                debug!(tile = %coord, "discarding completion for removed tile");
                return None;
            }
        };
        scene.dispose(placeholder);

        let content = result.map_err(TileOutcome::from).and_then(|bytes| {
            debug!(
                tile = %coord,
                bytes = bytes.len(),
                digest = %formats::short_digest(&bytes),
                "tile content received"
            );
            formats::decode_tile_content(&bytes).map_err(|e| TileOutcome::Failed(e.to_string()))
        });
        let (outcome, node, min_height) = match content {
            Ok(content) => match self.attach_loaded(scene, processor, coord, content) {
                Ok((pivot, min_height)) => (TileOutcome::Loaded, pivot, min_height),
                Err(err) => {
                    let outcome = TileOutcome::Failed(err.to_string());
                    (outcome, self.error_visual(scene, coord), None)
                }
            },
            Err(outcome @ TileOutcome::NotFound(_)) => {
                debug!(tile = %coord, "tile not generated yet");
                (outcome, self.pending_visual(scene, coord), None)
            }
            Err(outcome) => (outcome, self.error_visual(scene, coord), None),
        };

        if let TileOutcome::Failed(reason) = &outcome {
            warn!(tile = %coord, %reason, "tile load failed");
        }
        if !self.visible {
            scene.set_enabled(node, false);
        }
        if outcome == TileOutcome::Loaded {
            self.tiles_loaded += 1;
            if let Some(h) = min_height {
                self.last_height = h;
            }
            info!(tile = %coord, min_height = ?min_height, "tile loaded");
        }
        if let Some(record) = self.tiles.get_mut(&coord) {
            record.status = outcome.status();
            record.node = node;
            record.min_height = min_height;
        }
        Some(outcome)
    }

    fn attach_loaded(
        &mut self,
        scene: &mut dyn SceneGraph,
        processor: &mut ContentProcessor,
        coord: TileCoord,
        content: ContentNode,
    ) -> Result<(NodeId, Option<f64>), SceneError> {
        let center = self.scene_center(coord);
        let extent = self.scene_extent(coord);
        let pivot = scene.create_node(&format!("chunk_{}", coord.key()), None);
        if let Some(node) = scene.node_mut(pivot) {
            node.local = Mat4::rotation_y(PI).multiply(&Mat4::translation(Vec3::new(
                center.x, 0.0, center.y,
            )));
        }
        let root = match scene.attach_content(pivot, content) {
            Ok(root) => root,
            Err(err) => {
                scene.dispose(pivot);
                return Err(err);
            }
        };
        if let Some(node) = scene.node_mut(root) {
            node.name = coord.key();
        }

        let shadows = processor.options().shadows_enabled;
        let mut min_height: Option<f64> = None;
        for id in scene.descendants(root) {
            let world = scene.world_transform(id);
            let Some(node) = scene.node_mut(id) else {
                continue;
            };
            let Some(bounds) = node.geometry.as_ref().and_then(|g| g.bounds()) else {
                continue;
            };
            if shadows {
                node.shadows.receive = true;
                node.shadows.cast = casts_shadow(&node.metadata);
            }
            let low = bounds.transformed(&world).min[1];
            if low != 0.0 && min_height.is_none_or(|m| low < m) {
                min_height = Some(low);
            }
        }

        let tile_info = find_tile_info(scene, pivot).unwrap_or(Value::Null);
        if let Some(node) = scene.node_mut(pivot) {
            node.metadata
                .insert("tileCoords".into(), json!([coord.z, coord.x, coord.y]));
            node.metadata
                .insert("tileSize".into(), json!([extent.width(), extent.height()]));
            node.metadata.insert("tileInfo".into(), tile_info);
        }

        processor.process_tile(scene, pivot);
        if self.ground.template().is_some() {
            self.ground.apply(scene, pivot, coord, extent.width());
        }
        Ok((pivot, min_height))
    }

    fn pending_visual(&self, scene: &mut dyn SceneGraph, coord: TileCoord) -> NodeId {
        let key = coord.key();
        let id = scene.create_placeholder(
            &format!("placeholder_{key}"),
            self.scene_extent(coord),
            self.last_height,
            Color::PENDING,
        );
        if let Some(node) = scene.node_mut(id) {
            let url = TileUrlTemplate::new(PENDING_PREVIEW_URL).expand(coord);
            node.material = Some(MaterialBinding::Inline(Material {
                albedo: Color::PENDING,
                ..Material::textured(format!("textureTile_{key}"), url)
            }));
        }
        id
    }

    fn error_visual(&self, scene: &mut dyn SceneGraph, coord: TileCoord) -> NodeId {
        scene.create_placeholder(
            &format!("placeholder_{}", coord.key()),
            self.scene_extent(coord),
            self.last_height,
            Color::ERROR,
        )
    }

    /// Sets or clears the ground texture and reapplies it to loaded tiles.
    pub fn set_ground_texture(
        &mut self,
        scene: &mut dyn SceneGraph,
        template: Option<TileUrlTemplate>,
    ) {
        self.ground.set_template(template);
        let loaded: Vec<(TileCoord, NodeId)> = self
            .tiles
            .values()
            .filter(|r| r.status == TileStatus::Loaded)
            .map(|r| (r.coord, r.node))
            .collect();
        for (coord, pivot) in loaded {
            let width = self.scene_extent(coord).width();
            self.ground.apply(scene, pivot, coord, width);
        }
    }

    pub fn ground_texture(&self) -> Option<&TileUrlTemplate> {
        self.ground.template()
    }

    /// Puts the content's own materials back on the ground surfaces of
    /// `tiles` so the catalog walk does not see the overlay.
    pub fn lift_ground(&mut self, scene: &mut dyn SceneGraph, tiles: &BTreeSet<NodeId>) {
        for record in self.tiles.values().filter(|r| tiles.contains(&r.node)) {
            self.ground.revert(scene, record.node);
        }
    }

    /// Applies the ground overlay again on the loaded tiles among `tiles`.
    pub fn restore_ground(&mut self, scene: &mut dyn SceneGraph, tiles: &BTreeSet<NodeId>) {
        self.ground.prune(scene);
        if self.ground.template().is_none() {
            return;
        }
        let loaded: Vec<(TileCoord, NodeId)> = self
            .tiles
            .values()
            .filter(|r| r.status == TileStatus::Loaded && tiles.contains(&r.node))
            .map(|r| (r.coord, r.node))
            .collect();
        for (coord, pivot) in loaded {
            let width = self.scene_extent(coord).width();
            self.ground.apply(scene, pivot, coord, width);
        }
    }
}

impl Layer for GeoTileLayer {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, scene: &mut dyn SceneGraph, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        if visible {
            for coord in std::mem::take(&mut self.held) {
                if let Some(record) = self.tiles.get(&coord) {
                    scene.set_enabled(record.node, true);
                }
            }
            self.scheduler.force();
        } else {
            for record in self.tiles.values() {
                if scene.is_enabled(record.node) {
                    self.held.insert(record.coord);
                    scene.set_enabled(record.node, false);
                }
            }
        }
    }

    fn clear(&mut self, scene: &mut dyn SceneGraph, processor: &mut ContentProcessor) {
        let count = self.tiles.len();
        self.held.clear();
        for (_, record) in std::mem::take(&mut self.tiles) {
            scene.dispose(record.node);
            processor.forget_tile(record.node);
        }
        self.ground.prune(scene);
        info!(layer = %self.key, tiles = count, "layer cleared");
    }
}
