pub mod geodesy;
pub mod mat;
pub mod projection;
pub mod tile_grid;
pub mod vec;

pub use geodesy::*;
pub use mat::*;
pub use projection::*;
pub use tile_grid::*;
pub use vec::*;
