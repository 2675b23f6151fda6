use foundation::bounds::{Aabb2, Aabb3};
use foundation::math::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Indexed triangle mesh in node-local space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    /// Horizontal quad covering `extent` (scene `x`/`z`) at height `y`.
    pub fn ground_quad(extent: Aabb2, y: f64) -> Self {
        let [x0, z0] = extent.min.map(|v| v as f32);
        let [x1, z1] = extent.max.map(|v| v as f32);
        let y = y as f32;
        Self {
            positions: vec![[x0, y, z0], [x1, y, z0], [x1, y, z1], [x0, y, z1]],
            indices: vec![0, 2, 1, 0, 3, 2],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// No drawable triangles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb3> {
        Aabb3::from_points(self.positions.iter().map(|p| {
            Vec3::new(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]))
        }))
    }

    /// Applies `m` to every vertex.
    pub fn bake(&mut self, m: &Mat4) {
        for p in &mut self.positions {
            let v = m.transform_point(Vec3::new(
                f64::from(p[0]),
                f64::from(p[1]),
                f64::from(p[2]),
            ));
            *p = [v.x as f32, v.y as f32, v.z as f32];
        }
    }

    /// Reverses triangle winding.
    pub fn flip_faces(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    /// Mirrors along `z` and restores outward winding; converts right-handed
    /// source data into the scene's left-handed space.
    pub fn to_left_handed(&mut self) {
        for p in &mut self.positions {
            p[2] = -p[2];
        }
        self.flip_faces();
    }
}
