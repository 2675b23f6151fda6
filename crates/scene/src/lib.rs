pub mod content;
pub mod geometry;
pub mod graph;
pub mod material;
pub mod node;
pub mod world;

pub use content::*;
pub use geometry::*;
pub use graph::*;
pub use material::*;
pub use node::*;
pub use world::*;
