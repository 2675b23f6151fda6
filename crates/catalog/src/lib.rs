//! Shared content catalog and the per-tile content walk.
//!
//! Tiles reference reusable geometry and materials by key. The [`Catalog`]
//! stores them, [`ContentProcessor`] rewrites freshly loaded tiles against
//! it, and tiles that referenced keys not yet loaded are retried by the
//! [`DependencyResolver`] once the catalog grows.

mod catalog;
mod depends;
mod instances;
pub mod meta;
mod process;
pub mod rules;

pub use catalog::{Catalog, CatalogSummary, MaterialEntry};
pub use depends::DependencyResolver;
pub use instances::{
    BUFFER_INSTANCE_LOD_CUTOFF, InstanceDeduper, InstanceKey, InstanceRoot, decode_matrix_buffer,
};
pub use process::{ContentProcessor, ProcessOptions, ResolveReport, WATER_RENDERING_GROUP};

use scene::SceneError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("unknown catalog material `{0}`")]
    UnknownMaterial(String),
    #[error("catalog material `{0}` is frozen")]
    Frozen(String),
    #[error("invalid instance buffer: {0}")]
    InvalidInstanceBuffer(String),
    #[error(transparent)]
    Scene(#[from] SceneError),
}
