//! Metadata keys written by the tile generator.

pub const MATERIAL: &str = "ddd:material";
pub const INSTANCE_KEY: &str = "ddd:instance:key";
pub const INSTANCE_BUFFER_MATRICES: &str = "ddd:instance:buffer:matrices";
pub const LIGHT_COLOR: &str = "ddd:light:color";
pub const TEXT: &str = "ddd:text";
pub const TEXT_WIDTH: &str = "ddd:text:width";
pub const PATH: &str = "ddd:path";
pub const SHADOWS: &str = "ddd:shadows";
pub const Z_OFFSET: &str = "zoffset";

/// Path fragment marking nodes that live inside an instance template.
pub const INSTANCE_PATH_MARKER: &str = "/DDDInstance";
