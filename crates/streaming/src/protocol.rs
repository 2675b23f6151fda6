//! Wire-level types shared with the tile server.
//!
//! The server answers requests for tiles it has not generated yet with a
//! `404` whose body is a JSON job description. The body is kept opaque
//! ([`JobStatus`]) and only inspected for presentation.

use std::fmt;

use foundation::math::TileCoord;
use serde::{Deserialize, Serialize};

/// Extension of tile content documents.
pub const TILE_CONTENT_EXTENSION: &str = "json";

/// Generation status reported for a tile that is not available yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatus(pub serde_json::Value);

impl JobStatus {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Status for a response whose body is not a JSON document.
    pub fn unparsed(status: u16, body: &[u8]) -> Self {
        Self(serde_json::json!({
            "status": status,
            "body": String::from_utf8_lossy(body),
        }))
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Generation progress, when the server reports one.
    pub fn progress(&self) -> Option<f64> {
        self.field("progress").and_then(|v| v.as_f64())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URL pattern with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileUrlTemplate(String);

impl TileUrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// `{base}{z}/{x}/{y}{suffix}.json`, the layout of the tile cache.
    pub fn for_tiles(base: &str, suffix: &str) -> Self {
        Self(format!("{base}{{z}}/{{x}}/{{y}}{suffix}.{TILE_CONTENT_EXTENSION}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn expand(&self, coord: TileCoord) -> String {
        self.0
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

impl fmt::Display for TileUrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
