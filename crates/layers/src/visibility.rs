//! View-driven tile selection.
//!
//! Tiles around the viewpoint's tile are tested against a horizontal view
//! cone. The walk window is wider than the draw range so tiles leaving the
//! range are disabled rather than forgotten.

use foundation::math::{Projection, TileCoord, TileGrid, Vec2, Vec3};
use runtime::FrameThrottle;

/// Bounding sphere radius approximating one zoom-17 tile footprint.
pub const TILE_SPHERE_RADIUS: f64 = 115.0;
/// Cone length per unit of draw distance, in scene units.
pub const CONE_LENGTH_PER_DRAW_DISTANCE: f64 = 300.0;
/// Extra tiles walked beyond the draw distance.
pub const WALK_MARGIN: i64 = 3;
/// Added to the draw distance before comparing squared grid distances.
pub const DRAW_MARGIN: f64 = 0.7;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 5;

/// Cone–sphere intersection.
///
/// `axis` must be normalized; `angle` is the cone half-angle in radians and
/// `length` its extent along the axis.
pub fn test_cone_sphere(
    origin: Vec3,
    axis: Vec3,
    length: f64,
    angle: f64,
    center: Vec3,
    radius: f64,
) -> bool {
    let v = center - origin;
    let v_len_sq = v.dot(v);
    let v1_len = v.dot(axis);
    let closest = angle.cos() * (v_len_sq - v1_len * v1_len).max(0.0).sqrt() - v1_len * angle.sin();

    let angle_cull = closest > radius;
    let front_cull = v1_len > radius + length;
    let back_cull = v1_len < -radius;
    !(angle_cull || front_cull || back_cull)
}

/// Camera state the scheduler needs, in scene coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewpoint {
    pub position: Vec3,
    pub forward: Vec3,
    /// Vertical field of view, radians.
    pub fov: f64,
}

impl Viewpoint {
    pub fn new(position: Vec3, forward: Vec3, fov: f64) -> Self {
        Self {
            position,
            forward,
            fov,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileAction {
    Load,
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityScheduler {
    throttle: FrameThrottle,
    draw_distance: u32,
}

impl VisibilityScheduler {
    pub fn new(draw_distance: u32, update_interval: u32) -> Self {
        Self {
            throttle: FrameThrottle::new(update_interval),
            draw_distance,
        }
    }

    pub fn draw_distance(&self) -> u32 {
        self.draw_distance
    }

    pub fn set_draw_distance(&mut self, draw_distance: u32) {
        self.draw_distance = draw_distance;
        self.throttle.force();
    }

    /// Makes the next `update` run regardless of the cadence.
    pub fn force(&mut self) {
        self.throttle.force();
    }

    pub fn walk_distance(&self) -> i64 {
        i64::from(self.draw_distance) + WALK_MARGIN
    }

    pub fn draw_threshold(&self) -> f64 {
        f64::from(self.draw_distance) + DRAW_MARGIN
    }

    /// Runs [`Self::plan`] when the throttle allows it.
    pub fn update<P: Projection + ?Sized>(
        &mut self,
        grid: &TileGrid,
        projection: &P,
        view: &Viewpoint,
        zoom: u8,
    ) -> Option<Vec<(TileCoord, TileAction)>> {
        if !self.throttle.tick() {
            return None;
        }
        Some(self.plan(grid, projection, view, zoom))
    }

    /// Decisions for one run; the viewpoint's own tile comes first and is
    /// always loaded. Neighbors outside the grid are skipped.
    pub fn plan<P: Projection + ?Sized>(
        &self,
        grid: &TileGrid,
        projection: &P,
        view: &Viewpoint,
        zoom: u8,
    ) -> Vec<(TileCoord, TileAction)> {
        let lon_lat = projection.inverse(Vec2::new(view.position.x, view.position.z));
        let current = grid.coordinate_for_point(lon_lat, zoom);

        // The cone lives on the ground plane.
        let origin = view.position.with_y(0.0);
        let axis = view.forward.with_y(0.0).normalized();
        let length = f64::from(self.draw_distance) * CONE_LENGTH_PER_DRAW_DISTANCE;
        let angle = view.fov * 2.0;

        let walk = self.walk_distance();
        let draw = self.draw_threshold();
        let mut out = vec![(current, TileAction::Load)];
        for i in -walk..=walk {
            for j in -walk..=walk {
                if i == 0 && j == 0 {
                    continue;
                }
                let Some(coord) = current.offset(i, j) else {
                    continue;
                };
                if ((i * i + j * j) as f64) > draw * draw {
                    out.push((coord, TileAction::Disable));
                    continue;
                }
                let visible = match axis {
                    Some(axis) => {
                        let c = projection.forward(grid.center_of(coord));
                        let center = Vec3::new(c.x, 0.0, c.y);
                        test_cone_sphere(origin, axis, length, angle, center, TILE_SPHERE_RADIUS)
                    }
                    // Looking straight up or down: everything in range counts.
                    None => true,
                };
                let action = if visible { TileAction::Load } else { TileAction::Disable };
                out.push((coord, action));
            }
        }
        out
    }
}

impl Default for VisibilityScheduler {
    fn default() -> Self {
        Self::new(1, DEFAULT_UPDATE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::math::LocalTangentProjection;
    use pretty_assertions::assert_eq;
    use std::f64::consts::FRAC_PI_4;

    const FORWARD: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    #[test]
    fn sphere_on_axis_passes() {
        assert!(test_cone_sphere(Vec3::ZERO, FORWARD, 100.0, FRAC_PI_4, Vec3::new(0.0, 0.0, 50.0), 1.0));
    }

    #[test]
    fn sphere_behind_origin_is_culled() {
        assert!(!test_cone_sphere(
            Vec3::ZERO,
            FORWARD,
            100.0,
            FRAC_PI_4,
            Vec3::new(0.0, 0.0, -10.0),
            5.0
        ));
        // Overlapping the apex is not a back cull.
        assert!(test_cone_sphere(Vec3::ZERO, FORWARD, 100.0, FRAC_PI_4, Vec3::new(0.0, 0.0, -4.0), 5.0));
    }

    #[test]
    fn sphere_past_cone_length_is_culled() {
        assert!(!test_cone_sphere(
            Vec3::ZERO,
            FORWARD,
            100.0,
            FRAC_PI_4,
            Vec3::new(0.0, 0.0, 106.0),
            5.0
        ));
        assert!(test_cone_sphere(Vec3::ZERO, FORWARD, 100.0, FRAC_PI_4, Vec3::new(0.0, 0.0, 104.0), 5.0));
    }

    #[test]
    fn sphere_outside_angle_is_culled() {
        assert!(!test_cone_sphere(
            Vec3::ZERO,
            FORWARD,
            100.0,
            0.1,
            Vec3::new(50.0, 0.0, 10.0),
            1.0
        ));
    }

    fn setup() -> (TileGrid, LocalTangentProjection) {
        (TileGrid::default(), LocalTangentProjection::new(Vec2::new(-8.72, 42.24)))
    }

    #[test]
    fn plan_loads_current_tile_first_and_covers_window() {
        let (grid, proj) = setup();
        let s = VisibilityScheduler::new(1, 5);
        let view = Viewpoint::new(Vec3::new(0.0, 40.0, 0.0), FORWARD, 0.8);
        let plan = s.plan(&grid, &proj, &view, 17);

        let current = grid.coordinate_for_point(Vec2::new(-8.72, 42.24), 17);
        assert_eq!(plan[0], (current, TileAction::Load));
        // 9x9 walk window minus the center, plus the center first.
        assert_eq!(plan.len(), 81);

        // Corners of the window are beyond the draw range.
        let corner = current.offset(4, 4).unwrap();
        assert!(plan.contains(&(corner, TileAction::Disable)));
        // Only the 8 neighbors fall within 1.7 tiles and reach the cone test.
        let tested = plan
            .iter()
            .skip(1)
            .filter(|(c, _)| {
                let dx = i64::from(c.x) - i64::from(current.x);
                let dy = i64::from(c.y) - i64::from(current.y);
                dx * dx + dy * dy <= 2
            })
            .count();
        assert_eq!(tested, 8);
    }

    #[test]
    fn tiles_ahead_load_tiles_behind_disable() {
        let (grid, proj) = setup();
        let s = VisibilityScheduler::new(1, 5);
        // Scene z is north; tile y grows southwards.
        let view = Viewpoint::new(Vec3::new(0.0, 40.0, 0.0), FORWARD, 0.3);
        let plan = s.plan(&grid, &proj, &view, 17);
        let current = plan[0].0;
        let action = |dy: i64| {
            let c = current.offset(0, dy).unwrap();
            plan.iter().find(|(p, _)| *p == c).map(|(_, a)| *a)
        };
        assert_eq!(action(-1), Some(TileAction::Load));
        assert_eq!(action(1), Some(TileAction::Disable));
    }

    #[test]
    fn vertical_view_loads_whole_draw_range() {
        let (grid, proj) = setup();
        let s = VisibilityScheduler::new(1, 5);
        let view = Viewpoint::new(Vec3::new(0.0, 400.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 0.8);
        let loads = s
            .plan(&grid, &proj, &view, 17)
            .iter()
            .filter(|(_, a)| *a == TileAction::Load)
            .count();
        assert_eq!(loads, 9);
    }

    #[test]
    fn update_is_throttled() {
        let (grid, proj) = setup();
        let mut s = VisibilityScheduler::new(1, 3);
        let view = Viewpoint::new(Vec3::ZERO, FORWARD, 0.8);
        let runs: Vec<bool> = (0..6).map(|_| s.update(&grid, &proj, &view, 17).is_some()).collect();
        assert_eq!(runs, vec![true, false, false, true, false, false]);
    }
}
