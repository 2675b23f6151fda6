//! Key-driven material tuning applied when a material enters the catalog.

use scene::{Color, Material, MaterialKind, Transparency};

pub const WATER_BASIC_DAYTIME: &str = "WaterBasicDaytime";
pub const WATER_4_ADVANCED: &str = "Water4Advanced";
pub const WATER_INSTANCED: &str = "WaterInstanced";

/// PBR environment intensity relative to the viewer's base intensity.
pub const PBR_ENVIRONMENT_FACTOR: f64 = 0.75;

const TWO_SIDED: &[&str] = &[
    "Roadline",
    "Roadmarks",
    "Fence",
    "TrafficSigns",
    "RoadRailway",
    "Flowers Blue",
    "Flowers Roses",
    "Grass Blade",
    "Grass Blade Dry",
];

const NO_BACK_FACE_CULLING: &[&str] = &["Flowers Blue", "Flowers Roses", "Grass Blade", "Grass Blade Dry"];

pub fn is_water(key: &str) -> bool {
    matches!(key, WATER_BASIC_DAYTIME | WATER_4_ADVANCED | WATER_INSTANCED)
}

/// Where a registered material ends up.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Placement {
    /// Stored under its own key.
    Own { material: Material, frozen: bool },
    /// Redirected to the shared water material; `instanced` is the copy kept
    /// for water inside instance templates.
    Water { instanced: Option<Material> },
}

pub(crate) fn place(semantic_key: &str, mut material: Material, base_intensity: f64) -> Placement {
    match semantic_key {
        WATER_BASIC_DAYTIME => {
            material.alpha = 0.7;
            material.transparency = Transparency::AlphaBlend;
            material.name = WATER_INSTANCED.to_string();
            Placement::Water {
                instanced: Some(material),
            }
        }
        WATER_4_ADVANCED => Placement::Water { instanced: None },
        _ if material.kind == MaterialKind::Pbr => {
            tune_pbr(semantic_key, &mut material, base_intensity);
            // Environment updates reach mutable entries only.
            Placement::Own {
                material,
                frozen: false,
            }
        }
        _ => Placement::Own {
            material,
            frozen: true,
        },
    }
}

fn tune_pbr(key: &str, material: &mut Material, base_intensity: f64) {
    let mut uv_scale = 1.0;
    if key == "Lava" {
        uv_scale = 0.125;
    }
    if TWO_SIDED.contains(&key) {
        material.two_sided_lighting = true;
    }
    if NO_BACK_FACE_CULLING.contains(&key) {
        material.back_face_culling = false;
    }
    if key == "Fence" {
        uv_scale = 0.5;
        material.back_face_culling = false;
        if material.albedo_texture.is_some() {
            material.v_offset = 0.0725;
        }
    }
    if uv_scale != 1.0 && material.albedo_texture.is_some() {
        material.uv_scale = uv_scale;
    }
    if material.has_emissive_texture {
        material.emissive = Color::WHITE;
    }
    material.environment_intensity = base_intensity * PBR_ENVIRONMENT_FACTOR;
    material.horizon_occlusion = true;
    material.reflection_probe = true;
}

/// The shared water material all water keys resolve to.
pub fn water_material(base_intensity: f64) -> Material {
    Material {
        alpha: 0.8,
        transparency: Transparency::AlphaBlend,
        environment_intensity: base_intensity,
        reflection_probe: true,
        ..Material::new("Water", MaterialKind::Water)
    }
}
