//! Per-session streaming context.
//!
//! A [`Viewer`] owns everything one viewing session mutates: the scene, the
//! catalog processor, the load queue, the layers and the job-status list.
//! All of it is driven from [`Viewer::update`] on the caller's thread; only
//! the fetcher may work elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use catalog::{Catalog, CatalogSummary, ContentProcessor, ResolveReport};
use foundation::math::TileCoord;
use layers::{GEO_TILE_LAYER_KEY, GeoTileLayer, Layer, TileRequest, Viewpoint, VisibilityScheduler};
use runtime::{Frame, Metrics};
use scene::{NodeId, SceneGraph, World};
use serde::Serialize;
use streaming::{
    Completion, FetchResult, Fetcher, JobStatus, LoadQueue, TileOutcome, TileStatus,
    TileUrlTemplate,
};
use tracing::{debug, info, trace_span, warn};

use crate::config::ViewerConfig;
use crate::error::ViewerError;

/// What a queued load is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadToken {
    Tile(TileRequest),
    Catalog { load_materials: bool },
}

impl From<TileRequest> for LoadToken {
    fn from(request: TileRequest) -> Self {
        Self::Tile(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    pub zoom: u8,
    /// Layers whose scheduler ran.
    pub scheduled: usize,
    pub dispatched: usize,
    pub completed: usize,
    /// Set when a catalog landed and pending tiles were reprocessed.
    pub resolve: Option<ResolveReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerStats {
    pub tiles_loading: usize,
    pub tiles_loaded: usize,
    pub tiles_not_found: usize,
    pub tiles_error: usize,
    pub pending_dependencies: usize,
    pub instance_roots: usize,
    pub instance_placements: usize,
    pub queue_waiting: usize,
    pub queue_in_flight: usize,
    pub jobs: usize,
    pub catalog: CatalogSummary,
}

#[derive(Debug)]
pub struct Viewer<F: Fetcher> {
    config: ViewerConfig,
    scene: World,
    processor: ContentProcessor,
    queue: LoadQueue<LoadToken>,
    fetcher: F,
    layers: BTreeMap<String, GeoTileLayer>,
    job_statuses: Vec<JobStatus>,
    metrics: Metrics,
}

impl<F: Fetcher> Viewer<F> {
    /// Creates a session with the geo-tile layer registered.
    pub fn new(config: ViewerConfig, fetcher: F) -> Result<Self, ViewerError> {
        config.validate()?;
        let processor = ContentProcessor::new(
            Catalog::new(config.base_environment_intensity),
            config.process_options(),
        );
        let layer = GeoTileLayer::new(
            GEO_TILE_LAYER_KEY,
            config.projection(),
            config.tile_url_template(),
        )
        .with_scheduler(VisibilityScheduler::new(
            config.tile_draw_distance,
            config.update_interval_frames,
        ));
        let ground = config.ground_texture_template();

        let mut viewer = Self {
            queue: LoadQueue::new(config.concurrent_tasks),
            config,
            scene: World::new(),
            processor,
            fetcher,
            layers: BTreeMap::new(),
            job_statuses: Vec::new(),
            metrics: Metrics::new(),
        };
        viewer.add_layer(layer)?;
        if ground.is_some() {
            viewer.set_ground_texture(ground);
        }
        Ok(viewer)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scene(&self) -> &World {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut World {
        &mut self.scene
    }

    pub fn processor(&self) -> &ContentProcessor {
        &self.processor
    }

    pub fn queue(&self) -> &LoadQueue<LoadToken> {
        &self.queue
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut F {
        &mut self.fetcher
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Job-status payloads of tiles the server has not generated yet, oldest
    /// first.
    pub fn job_statuses(&self) -> &[JobStatus] {
        &self.job_statuses
    }

    pub fn take_job_statuses(&mut self) -> Vec<JobStatus> {
        std::mem::take(&mut self.job_statuses)
    }

    pub fn add_layer(&mut self, layer: GeoTileLayer) -> Result<(), ViewerError> {
        let key = layer.key().to_string();
        if self.layers.contains_key(&key) {
            return Err(ViewerError::DuplicateLayer(key));
        }
        debug!(layer = %key, "layer added");
        self.layers.insert(key, layer);
        Ok(())
    }

    /// Clears a layer's content and unregisters it. Its outstanding fetches
    /// are discarded when they complete.
    pub fn remove_layer(&mut self, key: &str) -> Result<GeoTileLayer, ViewerError> {
        let mut layer = self
            .layers
            .remove(key)
            .ok_or_else(|| ViewerError::UnknownLayer(key.to_string()))?;
        layer.clear(&mut self.scene, &mut self.processor);
        Ok(layer)
    }

    pub fn layer(&self, key: &str) -> Option<&GeoTileLayer> {
        self.layers.get(key)
    }

    pub fn layer_mut(&mut self, key: &str) -> Option<&mut GeoTileLayer> {
        self.layers.get_mut(key)
    }

    pub fn layers(&self) -> impl Iterator<Item = &GeoTileLayer> {
        self.layers.values()
    }

    pub fn set_layer_visible(&mut self, key: &str, visible: bool) -> Result<(), ViewerError> {
        let layer = self
            .layers
            .get_mut(key)
            .ok_or_else(|| ViewerError::UnknownLayer(key.to_string()))?;
        layer.set_visible(&mut self.scene, visible);
        Ok(())
    }

    /// Requests one tile outside the scheduler. Returns whether a fetch was
    /// queued.
    pub fn request_tile(&mut self, layer: &str, coord: TileCoord) -> Result<bool, ViewerError> {
        let layer = self
            .layers
            .get_mut(layer)
            .ok_or_else(|| ViewerError::UnknownLayer(layer.to_string()))?;
        Ok(layer.load_tile(&mut self.scene, &mut self.queue, coord))
    }

    pub fn disable_tile(&mut self, layer: &str, coord: TileCoord) -> Result<(), ViewerError> {
        let layer = self
            .layers
            .get_mut(layer)
            .ok_or_else(|| ViewerError::UnknownLayer(layer.to_string()))?;
        layer.disable_tile(&mut self.scene, coord);
        Ok(())
    }

    pub fn dispose_tile(&mut self, layer: &str, coord: TileCoord) -> Result<bool, ViewerError> {
        let layer = self
            .layers
            .get_mut(layer)
            .ok_or_else(|| ViewerError::UnknownLayer(layer.to_string()))?;
        Ok(layer.dispose_tile(&mut self.scene, &mut self.processor, coord))
    }

    /// One frame: schedule tiles around `view`, dispatch queued loads and
    /// apply whatever finished.
    pub fn update(
        &mut self,
        frame: &Frame,
        view: &Viewpoint,
        ground_height: Option<f64>,
    ) -> UpdateReport {
        let _span = trace_span!("update", frame = frame.index).entered();
        let zoom = self.config.zoom_for_height(ground_height);
        let mut report = UpdateReport {
            zoom,
            ..UpdateReport::default()
        };
        for layer in self.layers.values_mut() {
            if layer.update(&mut self.scene, &mut self.queue, view, zoom) {
                report.scheduled += 1;
            }
        }
        report.dispatched = self.queue.pump(&mut self.fetcher);
        let (completed, resolve) = self.drain();
        report.completed = completed;
        report.resolve = resolve;
        report
    }

    /// Applies finished loads without scheduling. Returns how many finished.
    pub fn poll_loads(&mut self) -> usize {
        self.queue.pump(&mut self.fetcher);
        self.drain().0
    }

    fn drain(&mut self) -> (usize, Option<ResolveReport>) {
        let completions = self.queue.poll(&mut self.fetcher);
        let count = completions.len();
        let mut catalog_loaded = false;
        for Completion { url, token, result } in completions {
            match token {
                LoadToken::Tile(request) => self.finish_tile(&request, result),
                LoadToken::Catalog { load_materials } => {
                    match self.finish_catalog(&url, result, load_materials) {
                        Ok(()) => catalog_loaded = true,
                        Err(err) => {
                            warn!(%url, %err, "could not load scene catalog");
                            self.metrics.inc_counter("catalog.failed", 1);
                        }
                    }
                }
            }
        }
        let resolve = catalog_loaded.then(|| self.resolve_dependencies());
        (count, resolve)
    }

    fn finish_tile(&mut self, request: &TileRequest, result: FetchResult) {
        let Some(layer) = self.layers.get_mut(&request.layer) else {
            debug!(layer = %request.layer, tile = %request.coord, "completion for removed layer");
            return;
        };
        let Some(outcome) =
            layer.complete_tile(&mut self.scene, &mut self.processor, request, result)
        else {
            return;
        };
        self.metrics
            .inc_counter(format!("tiles.{}", outcome.status().as_str()), 1);
        if let TileOutcome::NotFound(Some(job)) = outcome {
            debug!(tile = %request.coord, progress = ?job.progress(), "tile queued for generation");
            self.job_statuses.push(job);
        }
    }

    fn finish_catalog(
        &mut self,
        url: &str,
        result: FetchResult,
        load_materials: bool,
    ) -> Result<(), ViewerError> {
        let content = formats::decode_tile_content(&result?)?;
        let holder = self.scene.create_node("catalog", None);
        let root = self.scene.attach_content(holder, content)?;
        self.processor
            .load_catalog_from_node(&mut self.scene, root, load_materials);
        self.scene.set_enabled(holder, false);

        let summary = self.processor.catalog().summary();
        info!(
            %url,
            geometries = summary.geometries.len(),
            materials = summary.materials.len(),
            "catalog loaded"
        );
        self.metrics.inc_counter("catalog.loaded", 1);
        Ok(())
    }

    /// Queues a catalog scene. With `load_materials` its materials replace
    /// existing entries.
    pub fn load_catalog(&mut self, url: impl Into<String>, load_materials: bool) {
        let url = url.into();
        debug!(%url, load_materials, "loading catalog");
        self.queue.enqueue(url, LoadToken::Catalog { load_materials });
    }

    /// Queues the shared catalog and, when configured, the materials catalog.
    pub fn load_default_catalogs(&mut self) {
        self.load_catalog(self.config.catalog_url(), false);
        if let Some(url) = self.config.materials_catalog_url() {
            self.load_catalog(url, true);
        }
    }

    /// Reprocesses every pending tile once.
    pub fn resolve_dependencies(&mut self) -> ResolveReport {
        let pending: BTreeSet<NodeId> = self.processor.depends().pending().collect();
        for layer in self.layers.values_mut() {
            layer.lift_ground(&mut self.scene, &pending);
        }
        let report = self.processor.resolve_pending(&mut self.scene);
        for layer in self.layers.values_mut() {
            layer.restore_ground(&mut self.scene, &pending);
        }
        self.metrics
            .inc_counter("depends.reprocessed", report.reprocessed as u64);
        report
    }

    pub fn set_ground_texture(&mut self, template: Option<TileUrlTemplate>) {
        for layer in self.layers.values_mut() {
            layer.set_ground_texture(&mut self.scene, template.clone());
        }
        self.config.ground_texture_url = template.map(|t| t.as_str().to_string());
    }

    pub fn set_draw_distance(&mut self, draw_distance: u32) {
        self.config.tile_draw_distance = draw_distance;
        for layer in self.layers.values_mut() {
            layer.scheduler_mut().set_draw_distance(draw_distance);
        }
    }

    pub fn set_environment_intensity(&mut self, base: f64) {
        self.config.base_environment_intensity = base;
        self.processor.catalog_mut().set_environment_intensity(base);
    }

    /// Tears down every layer's content. Layers stay registered.
    pub fn clear(&mut self) {
        for layer in self.layers.values_mut() {
            layer.clear(&mut self.scene, &mut self.processor);
        }
    }

    pub fn stats(&self) -> ViewerStats {
        let count = |status: TileStatus| -> usize {
            self.layers.values().map(|l| l.count_by_status(status)).sum()
        };
        ViewerStats {
            tiles_loading: count(TileStatus::Loading),
            tiles_loaded: count(TileStatus::Loaded),
            tiles_not_found: count(TileStatus::NotFound),
            tiles_error: count(TileStatus::Error),
            pending_dependencies: self.processor.depends().len(),
            instance_roots: self.processor.instances().len(),
            instance_placements: self.processor.instances().total_placements(),
            queue_waiting: self.queue.waiting(),
            queue_in_flight: self.queue.in_flight(),
            jobs: self.job_statuses.len(),
            catalog: self.processor.catalog().summary(),
        }
    }
}
