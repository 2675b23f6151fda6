//! Viewer settings.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes.

use std::fs;
use std::path::{Path, PathBuf};

use catalog::ProcessOptions;
use foundation::math::{LocalTangentProjection, TileGrid, Vec2};
use serde::{Deserialize, Serialize};
use streaming::{DEFAULT_CONCURRENT_TASKS, TILE_CONTENT_EXTENSION, TileUrlTemplate};
use thiserror::Error;

/// Below this height above ground the viewer switches to the near zoom.
pub const NEAR_GROUND_HEIGHT: f64 = 50.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub tile_url_base: String,
    pub tile_url_suffix: String,
    pub assets_url_base: String,
    /// Texture set of the materials catalog; `None` skips it.
    pub materials_texture_set: Option<String>,
    pub tile_draw_distance: u32,
    pub tile_zoom: u8,
    pub tile_zoom_near_ground: u8,
    pub concurrent_tasks: usize,
    pub update_interval_frames: u32,
    pub shadows_enabled: bool,
    pub texts_enabled: bool,
    pub base_environment_intensity: f64,
    /// `{z}/{x}/{y}` template for the ground overlay.
    pub ground_texture_url: Option<String>,
    /// Projection origin, `[lon, lat]` degrees.
    pub origin: [f64; 2],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            tile_url_base: "/cache/ddd_http/".into(),
            tile_url_suffix: String::new(),
            assets_url_base: "/assets/".into(),
            materials_texture_set: Some("default256".into()),
            tile_draw_distance: 1,
            tile_zoom: 17,
            tile_zoom_near_ground: 18,
            concurrent_tasks: DEFAULT_CONCURRENT_TASKS,
            update_interval_frames: 5,
            shadows_enabled: true,
            texts_enabled: false,
            base_environment_intensity: 1.0,
            ground_texture_url: None,
            origin: [-8.726, 42.233],
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_zoom = TileGrid::default().max_zoom();
        if self.concurrent_tasks == 0 {
            return Err(ConfigError::Invalid("concurrent_tasks must be at least 1".into()));
        }
        if self.update_interval_frames == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_frames must be at least 1".into(),
            ));
        }
        if self.tile_zoom > max_zoom || self.tile_zoom_near_ground > max_zoom {
            return Err(ConfigError::Invalid(format!("tile zoom above {max_zoom}")));
        }
        let [lon, lat] = self.origin;
        if !(-180.0..=180.0).contains(&lon) || !(-85.0..=85.0).contains(&lat) {
            return Err(ConfigError::Invalid(format!("origin out of range: {lon}, {lat}")));
        }
        Ok(())
    }

    pub fn tile_url_template(&self) -> TileUrlTemplate {
        TileUrlTemplate::for_tiles(&self.tile_url_base, &self.tile_url_suffix)
    }

    pub fn ground_texture_template(&self) -> Option<TileUrlTemplate> {
        self.ground_texture_url.as_deref().map(TileUrlTemplate::new)
    }

    pub fn projection(&self) -> LocalTangentProjection {
        LocalTangentProjection::new(Vec2::new(self.origin[0], self.origin[1]))
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            shadows_enabled: self.shadows_enabled,
            texts_enabled: self.texts_enabled,
        }
    }

    /// Zoom for the current height above ground; unknown height uses the
    /// regular zoom.
    pub fn zoom_for_height(&self, ground_height: Option<f64>) -> u8 {
        match ground_height {
            Some(h) if h < NEAR_GROUND_HEIGHT => self.tile_zoom_near_ground,
            _ => self.tile_zoom,
        }
    }

    fn asset_url(&self, file: &str) -> String {
        format!("{}/{file}", self.assets_url_base.trim_end_matches('/'))
    }

    pub fn catalog_url(&self) -> String {
        self.asset_url(&format!("catalog.{TILE_CONTENT_EXTENSION}"))
    }

    pub fn materials_catalog_url(&self) -> Option<String> {
        self.materials_texture_set
            .as_ref()
            .map(|set| self.asset_url(&format!("catalog_materials-{set}.{TILE_CONTENT_EXTENSION}")))
    }
}
