pub mod digest;
pub mod tile_content;

pub use digest::*;
pub use tile_content::*;
