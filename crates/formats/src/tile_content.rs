//! Tile payload envelope.
//!
//! A payload is a JSON document `{"version": "1", "root": <node>}` whose node
//! tree maps one-to-one onto [`ContentNode`].

use scene::ContentNode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TILE_CONTENT_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("empty payload")]
    Empty,
    #[error("payload parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported payload version: {found}")]
    UnsupportedVersion { found: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileContent {
    pub version: String,
    pub root: ContentNode,
}

impl TileContent {
    pub fn new(root: ContentNode) -> Self {
        Self {
            version: TILE_CONTENT_VERSION.to_string(),
            root,
        }
    }
}

pub fn decode_tile_content(bytes: &[u8]) -> Result<ContentNode, FormatError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(FormatError::Empty);
    }
    let content: TileContent = serde_json::from_slice(bytes)?;
    if content.version != TILE_CONTENT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: content.version,
        });
    }
    Ok(content.root)
}

pub fn encode_tile_content(root: &ContentNode) -> Result<Vec<u8>, FormatError> {
    Ok(serde_json::to_vec(&TileContent::new(root.clone()))?)
}
