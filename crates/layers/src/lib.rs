pub mod geotile;
pub mod ground;
pub mod layer;
pub mod visibility;

pub use geotile::*;
pub use ground::GroundOverlay;
pub use layer::*;
pub use visibility::*;
