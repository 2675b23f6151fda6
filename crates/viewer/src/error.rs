use formats::FormatError;
use scene::SceneError;
use streaming::FetchError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("undecodable content: {0}")]
    Format(#[from] FormatError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("no layer named {0}")]
    UnknownLayer(String),
    #[error("layer {0} already registered")]
    DuplicateLayer(String),
}
