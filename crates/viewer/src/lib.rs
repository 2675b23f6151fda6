pub mod config;
pub mod error;
pub mod session;

pub use config::{ConfigError, NEAR_GROUND_HEIGHT, ViewerConfig};
pub use error::ViewerError;
pub use session::*;
