use std::collections::BTreeMap;

use scene::{Material, Metadata, NodeId, SceneGraph};
use serde::Serialize;
use tracing::debug;

use crate::CatalogError;
use crate::meta;
use crate::rules::{self, Placement, WATER_INSTANCED};

#[derive(Debug, Clone, PartialEq)]
enum MaterialSlot {
    Own { material: Material, frozen: bool },
    Water,
}

/// Borrowed view of one material entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialEntry<'a> {
    pub material: &'a Material,
    pub frozen: bool,
    /// Resolves to the shared water material.
    pub shared: bool,
}

/// Serializable listing of the catalog's keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub geometries: Vec<String>,
    pub materials: Vec<String>,
    pub frozen_materials: usize,
}

/// Keyed store of shared geometry templates and materials.
///
/// Geometry templates are scene nodes kept disabled and detached; materials
/// are held by value and referenced from nodes by key. The first
/// registration of a key wins unless forced.
#[derive(Debug)]
pub struct Catalog {
    geometries: BTreeMap<String, NodeId>,
    materials: BTreeMap<String, MaterialSlot>,
    water: Material,
    base_environment_intensity: f64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Catalog {
    pub fn new(base_environment_intensity: f64) -> Self {
        Self {
            geometries: BTreeMap::new(),
            materials: BTreeMap::new(),
            water: rules::water_material(base_environment_intensity),
            base_environment_intensity,
        }
    }

    /// Stores `template` under `key`, disabling and detaching it. Returns
    /// `false` (and leaves `template` untouched) if the key is taken.
    pub fn register_geometry<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        key: &str,
        template: NodeId,
    ) -> Result<bool, CatalogError> {
        if self.geometries.contains_key(key) {
            debug!(key, "geometry already in catalog");
            return Ok(false);
        }
        scene.set_enabled(template, false);
        scene.set_parent(template, None)?;
        self.geometries.insert(key.to_string(), template);
        Ok(true)
    }

    /// Registers a material after applying the key-driven tuning rules.
    ///
    /// Rules are selected by the node's `ddd:material` metadata when present,
    /// otherwise by `key`. Returns whether anything was stored.
    pub fn register_material(
        &mut self,
        key: &str,
        mut material: Material,
        metadata: &Metadata,
        force: bool,
    ) -> bool {
        if self.materials.contains_key(key) && !force {
            debug!(key, "material already in catalog");
            return false;
        }
        material.name = key.to_string();
        let semantic = metadata
            .get(meta::MATERIAL)
            .and_then(|v| v.as_str())
            .unwrap_or(key);
        let z_offset = metadata
            .get(meta::Z_OFFSET)
            .and_then(|v| v.as_f64())
            .filter(|z| *z != 0.0);

        let mut slot = match rules::place(semantic, material, self.base_environment_intensity) {
            Placement::Own { material, frozen } => MaterialSlot::Own { material, frozen },
            Placement::Water { instanced } => {
                if let Some(instanced) = instanced {
                    self.materials.insert(
                        WATER_INSTANCED.to_string(),
                        MaterialSlot::Own {
                            material: instanced,
                            frozen: true,
                        },
                    );
                }
                MaterialSlot::Water
            }
        };

        if let Some(z) = z_offset {
            match &mut slot {
                MaterialSlot::Own { material, .. } => material.z_offset = z,
                MaterialSlot::Water => self.water.z_offset = z,
            }
        }
        self.materials.insert(key.to_string(), slot);
        true
    }

    pub fn lookup_geometry(&self, key: &str) -> Option<NodeId> {
        self.geometries.get(key).copied()
    }

    pub fn lookup_material(&self, key: &str) -> Option<MaterialEntry<'_>> {
        Some(match self.materials.get(key)? {
            MaterialSlot::Own { material, frozen } => MaterialEntry {
                material,
                frozen: *frozen,
                shared: false,
            },
            MaterialSlot::Water => MaterialEntry {
                material: &self.water,
                frozen: false,
                shared: true,
            },
        })
    }

    pub fn contains_material(&self, key: &str) -> bool {
        self.materials.contains_key(key)
    }

    /// Mutable access to a non-frozen material.
    pub fn material_mut(&mut self, key: &str) -> Result<&mut Material, CatalogError> {
        match self.materials.get_mut(key) {
            None => Err(CatalogError::UnknownMaterial(key.to_string())),
            Some(MaterialSlot::Own { frozen: true, .. }) => {
                Err(CatalogError::Frozen(key.to_string()))
            }
            Some(MaterialSlot::Own { material, .. }) => Ok(material),
            Some(MaterialSlot::Water) => Ok(&mut self.water),
        }
    }

    pub fn base_environment_intensity(&self) -> f64 {
        self.base_environment_intensity
    }

    /// Updates environment intensity on every mutable entry.
    pub fn set_environment_intensity(&mut self, base: f64) {
        self.base_environment_intensity = base;
        self.water.environment_intensity = base;
        for slot in self.materials.values_mut() {
            if let MaterialSlot::Own {
                material,
                frozen: false,
            } = slot
            {
                material.environment_intensity = base * rules::PBR_ENVIRONMENT_FACTOR;
            }
        }
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            geometries: self.geometries.keys().cloned().collect(),
            materials: self.materials.keys().cloned().collect(),
            frozen_materials: self
                .materials
                .values()
                .filter(|s| matches!(s, MaterialSlot::Own { frozen: true, .. }))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use crate::CatalogError;
    use crate::rules::{WATER_4_ADVANCED, WATER_BASIC_DAYTIME, WATER_INSTANCED};
    use pretty_assertions::assert_eq;
    use scene::{Material, MaterialKind, Metadata, SceneGraph, World};
    use serde_json::json;

    fn meta(pairs: serde_json::Value) -> Metadata {
        pairs.as_object().cloned().unwrap_or_default()
    }

    fn colored(name: &str, r: f32) -> Material {
        Material {
            albedo: scene::Color::new(r, 0.0, 0.0),
            ..Material::new(name, MaterialKind::Standard)
        }
    }

    #[test]
    fn first_registration_wins_unless_forced() {
        let mut catalog = Catalog::default();
        let none = Metadata::new();
        assert!(catalog.register_material("K", colored("v1", 0.1), &none, false));
        assert!(!catalog.register_material("K", colored("v2", 0.2), &none, false));
        assert_eq!(catalog.lookup_material("K").map(|e| e.material.albedo.r), Some(0.1));

        assert!(catalog.register_material("K", colored("v2", 0.2), &none, true));
        assert_eq!(catalog.lookup_material("K").map(|e| e.material.albedo.r), Some(0.2));
    }

    #[test]
    fn registered_material_takes_key_as_name() {
        let mut catalog = Catalog::default();
        catalog.register_material("Brick", colored("auto", 0.5), &Metadata::new(), false);
        let entry = catalog.lookup_material("Brick").unwrap();
        assert_eq!(entry.material.name, "Brick");
        assert!(entry.frozen);
    }

    #[test]
    fn water_keys_share_one_material() {
        let mut catalog = Catalog::default();
        let m = meta(json!({ "ddd:material": WATER_BASIC_DAYTIME }));
        catalog.register_material(WATER_BASIC_DAYTIME, colored("w", 0.0), &m, false);
        let m = meta(json!({ "ddd:material": WATER_4_ADVANCED, "zoffset": -2.0 }));
        catalog.register_material(WATER_4_ADVANCED, colored("w4", 0.0), &m, false);

        let a = catalog.lookup_material(WATER_BASIC_DAYTIME).unwrap();
        let b = catalog.lookup_material(WATER_4_ADVANCED).unwrap();
        assert!(a.shared && b.shared);
        assert!(std::ptr::eq(a.material, b.material));
        assert_eq!(a.material.z_offset, -2.0);

        let inst = catalog.lookup_material(WATER_INSTANCED).unwrap();
        assert!(inst.frozen);
        assert!(!inst.shared);
        assert_eq!(inst.material.alpha, 0.7);
    }

    #[test]
    fn environment_intensity_skips_frozen_entries() {
        let mut catalog = Catalog::new(1.0);
        let none = Metadata::new();
        catalog.register_material("Grass", Material::new("g", MaterialKind::Pbr), &none, false);
        catalog.register_material("Brick", colored("b", 0.5), &none, false);

        catalog.set_environment_intensity(2.0);
        let grass = catalog.lookup_material("Grass").unwrap();
        assert_eq!(grass.material.environment_intensity, 1.5);
        let brick = catalog.lookup_material("Brick").unwrap();
        assert_eq!(brick.material.environment_intensity, 1.0);

        assert!(matches!(catalog.material_mut("Brick"), Err(CatalogError::Frozen(_))));
        assert!(catalog.material_mut("Grass").is_ok());
        assert!(matches!(
            catalog.material_mut("Nope"),
            Err(CatalogError::UnknownMaterial(_))
        ));
    }

    #[test]
    fn geometry_templates_are_disabled_and_detached() {
        let mut world = World::new();
        let group = world.create_node("catalog", None);
        let bench = world.create_node("bench", Some(group));
        let other = world.create_node("bench-2", Some(group));

        let mut catalog = Catalog::default();
        assert!(catalog.register_geometry(&mut world, "bench", bench).unwrap());
        assert!(!catalog.register_geometry(&mut world, "bench", other).unwrap());

        assert_eq!(catalog.lookup_geometry("bench"), Some(bench));
        assert!(!world.is_enabled(bench));
        assert_eq!(world.node(bench).and_then(|n| n.parent()), None);
        assert!(world.is_enabled(other));

        let summary = catalog.summary();
        assert_eq!(summary.geometries, vec!["bench".to_string()]);
    }
}
