//! Axis-aligned bounding boxes
use crate::math::{Mat4, Vec2, Vec3};

/// 2D rectangle, used for tile extents (projected meters or scene units).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    /// Builds the box spanned by two arbitrary corners.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Aabb2 {
            min: [a.x.min(b.x), a.y.min(b.y)],
            max: [a.x.max(b.x), a.y.max(b.y)],
        }
    }

    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        )
    }

    pub fn bottom_left(&self) -> Vec2 {
        Vec2::new(self.min[0], self.min[1])
    }

    pub fn top_right(&self) -> Vec2 {
        Vec2::new(self.max[0], self.max[1])
    }
}

impl Aabb3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Aabb3 { min, max }
    }

    /// Smallest box containing every point; `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut b = Aabb3::new([first.x, first.y, first.z], [first.x, first.y, first.z]);
        for p in points {
            for (i, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                b.min[i] = b.min[i].min(v);
                b.max[i] = b.max[i].max(v);
            }
        }
        Some(b)
    }

    pub fn union(&self, other: &Aabb3) -> Self {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a[0], a[1], a[2]),
            Vec3::new(b[0], a[1], a[2]),
            Vec3::new(a[0], b[1], a[2]),
            Vec3::new(b[0], b[1], a[2]),
            Vec3::new(a[0], a[1], b[2]),
            Vec3::new(b[0], a[1], b[2]),
            Vec3::new(a[0], b[1], b[2]),
            Vec3::new(b[0], b[1], b[2]),
        ]
    }

    /// Bounds of this box after transforming all eight corners by `m`.
    pub fn transformed(&self, m: &Mat4) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for c in self.corners() {
            let p = m.transform_point(c);
            for (i, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
            }
        }
        Aabb3 { min, max }
    }
}
