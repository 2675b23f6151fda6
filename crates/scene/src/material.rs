use serde::{Deserialize, Serialize};

/// Linear RGB color, components in `0..=1`.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    /// Tile placeholder while loading.
    pub const LOADING: Color = Color::new(0.2, 0.2, 0.2);
    /// Tile whose content does not exist yet.
    pub const PENDING: Color = Color::new(0.3, 0.3, 0.6);
    /// Tile whose fetch failed permanently.
    pub const ERROR: Color = Color::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    #[default]
    Standard,
    Pbr,
    Water,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    #[default]
    Opaque,
    AlphaTest,
    AlphaBlend,
}

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

/// Surface description shared by any number of nodes.
///
/// Decoded from tile content, or created by the viewer for placeholders and
/// ground overlays. Fields not present in the source keep renderer defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default)]
    pub kind: MaterialKind,
    #[serde(default)]
    pub albedo: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albedo_texture: Option<String>,
    #[serde(default)]
    pub emissive: Color,
    #[serde(default)]
    pub has_emissive_texture: bool,
    #[serde(default = "one")]
    pub alpha: f64,
    #[serde(default)]
    pub transparency: Transparency,
    #[serde(default = "one")]
    pub uv_scale: f64,
    #[serde(default)]
    pub v_offset: f64,
    #[serde(default = "yes")]
    pub back_face_culling: bool,
    #[serde(default)]
    pub two_sided_lighting: bool,
    #[serde(default = "one")]
    pub environment_intensity: f64,
    #[serde(default)]
    pub horizon_occlusion: bool,
    #[serde(default)]
    pub reflection_probe: bool,
    #[serde(default)]
    pub z_offset: f64,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            name: name.into(),
            kind,
            albedo: Color::WHITE,
            albedo_texture: None,
            emissive: Color::BLACK,
            has_emissive_texture: false,
            alpha: 1.0,
            transparency: Transparency::Opaque,
            uv_scale: 1.0,
            v_offset: 0.0,
            back_face_culling: true,
            two_sided_lighting: false,
            environment_intensity: 1.0,
            horizon_occlusion: false,
            reflection_probe: false,
            z_offset: 0.0,
        }
    }

    /// Unlit flat color, as used by tile placeholders.
    pub fn flat(name: impl Into<String>, color: Color) -> Self {
        Self {
            albedo: color,
            emissive: color,
            ..Self::new(name, MaterialKind::Standard)
        }
    }

    /// Unlit texture, as used by the pending-tile map preview and ground overlays.
    pub fn textured(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            albedo_texture: Some(url.into()),
            emissive: Color::WHITE,
            ..Self::new(name, MaterialKind::Standard)
        }
    }
}

/// What a node draws with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialBinding {
    /// Material owned by the node.
    Inline(Material),
    /// Shared catalog entry, looked up by key at render time.
    Catalog(String),
}

impl MaterialBinding {
    pub fn catalog_key(&self) -> Option<&str> {
        match self {
            MaterialBinding::Catalog(key) => Some(key),
            MaterialBinding::Inline(_) => None,
        }
    }

    pub fn inline(&self) -> Option<&Material> {
        match self {
            MaterialBinding::Inline(material) => Some(material),
            MaterialBinding::Catalog(_) => None,
        }
    }
}
