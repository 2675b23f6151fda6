use serde::Serialize;

use crate::protocol::JobStatus;
use crate::request::FetchError;

/// Lifecycle state of one tile record.
///
/// `Loading → {Loaded, NotFound, Error}`; hiding a tile keeps its status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStatus {
    Loading,
    Loaded,
    NotFound,
    Error,
}

impl TileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TileStatus::Loading => "loading",
            TileStatus::Loaded => "loaded",
            TileStatus::NotFound => "notfound",
            TileStatus::Error => "error",
        }
    }
}

/// How a tile fetch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutcome {
    Loaded,
    /// Not generated yet; carries the server's job status when it sent one.
    NotFound(Option<JobStatus>),
    Failed(String),
}

impl TileOutcome {
    pub fn status(&self) -> TileStatus {
        match self {
            TileOutcome::Loaded => TileStatus::Loaded,
            TileOutcome::NotFound(_) => TileStatus::NotFound,
            TileOutcome::Failed(_) => TileStatus::Error,
        }
    }
}

impl From<FetchError> for TileOutcome {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotYetAvailable(status) => TileOutcome::NotFound(status),
            other => TileOutcome::Failed(other.to_string()),
        }
    }
}
