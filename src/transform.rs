//! Decomposed 2D transform with versioned local/world matrices.
//!
//! A [`Transform`] stores position, scale, pivot, rotation and shear as plain
//! values and derives its local matrix from them lazily. Two counters track
//! whether the local matrix is stale:
//!
//! - `local_id` is bumped by every setter that actually changes a value.
//! - `current_local_id` is the version the local matrix was last built from.
//!
//! Equality means "clean". `world_id` is bumped every time the world matrix is
//! recomputed from a parent, so caches downstream (sprite vertices, bounds) can
//! compare a single integer.
//!
//! Setters return `true` when the transform went from clean to dirty. The owner
//! of the transform (the scene) uses that to mark the node's TRANSFORM component
//! exactly once per dirty session.

use crate::math::{Matrix, Point};

/// Rotation and shear angles are in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    position: Point,
    scale: Point,
    pivot: Point,
    rotation: f32,
    shear: Point,

    // cos/sin of (rotation + shear.x), then -sin/cos of (rotation + shear.y)
    cx: f32,
    sx: f32,
    cy: f32,
    sy: f32,

    local: Matrix,
    world: Matrix,

    local_id: u32,
    current_local_id: u32,
    world_id: u32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: Point::ZERO,
            scale: Point::new(1.0, 1.0),
            pivot: Point::ZERO,
            rotation: 0.0,
            shear: Point::ZERO,
            cx: 1.0,
            sx: 0.0,
            cy: 0.0,
            sy: 1.0,
            local: Matrix::IDENTITY,
            world: Matrix::IDENTITY,
            local_id: 0,
            current_local_id: 0,
            world_id: 0,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn scale(&self) -> Point {
        self.scale
    }

    pub fn pivot(&self) -> Point {
        self.pivot
    }

    /// Rotation in degrees.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Shear angles in degrees.
    pub fn shear(&self) -> Point {
        self.shear
    }

    /// Skew expressed the conventional way: `(-shear.y, shear.x)`.
    pub fn skew(&self) -> Point {
        Point::new(-self.shear.y, self.shear.x)
    }

    /// Local matrix as of the last rebuild. Call [`Self::update_local_transform`]
    /// first if setters ran since.
    pub fn local_transform(&self) -> &Matrix {
        &self.local
    }

    pub fn world_transform(&self) -> &Matrix {
        &self.world
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    pub fn world_id(&self) -> u32 {
        self.world_id
    }

    pub fn is_local_dirty(&self) -> bool {
        self.local_id != self.current_local_id
    }

    pub fn set_position(&mut self, x: f32, y: f32) -> bool {
        if self.position == Point::new(x, y) {
            return false;
        }
        self.position = Point::new(x, y);
        self.invalidate(false)
    }

    pub fn set_scale(&mut self, x: f32, y: f32) -> bool {
        if self.scale == Point::new(x, y) {
            return false;
        }
        self.scale = Point::new(x, y);
        self.invalidate(false)
    }

    pub fn set_pivot(&mut self, x: f32, y: f32) -> bool {
        if self.pivot == Point::new(x, y) {
            return false;
        }
        self.pivot = Point::new(x, y);
        self.invalidate(false)
    }

    pub fn set_rotation(&mut self, degrees: f32) -> bool {
        if self.rotation == degrees {
            return false;
        }
        self.rotation = degrees;
        self.invalidate(true)
    }

    pub fn set_shear(&mut self, x: f32, y: f32) -> bool {
        if self.shear == Point::new(x, y) {
            return false;
        }
        self.shear = Point::new(x, y);
        self.invalidate(true)
    }

    pub fn set_skew(&mut self, x: f32, y: f32) -> bool {
        self.set_shear(y, -x)
    }

    /// Replace the decomposed fields with a decomposition of `matrix`.
    /// The pivot is reset to zero.
    pub fn set_from_matrix(&mut self, matrix: &Matrix) -> bool {
        let Matrix { a, b, c, d, tx, ty } = *matrix;

        let shear_y = (-c).atan2(d);
        let shear_x = b.atan2(a);

        let uniform = if shear_y == 0.0 {
            shear_x == 0.0
        } else {
            (1.0 - shear_x / shear_y).abs() < 1e-5
        };

        if uniform {
            let mut rotation = shear_x.to_degrees();
            if a < 0.0 && d >= 0.0 {
                rotation += if rotation <= 0.0 { 180.0 } else { -180.0 };
            }
            self.rotation = rotation;
            self.shear = Point::ZERO;
        } else {
            self.rotation = 0.0;
            self.shear = Point::new(shear_x.to_degrees(), shear_y.to_degrees());
        }

        self.scale = Point::new((a * a + b * b).sqrt(), (c * c + d * d).sqrt());
        self.position = Point::new(tx, ty);
        self.pivot = Point::ZERO;

        self.invalidate(true)
    }

    /// Bump the local version. Returns `true` if the transform was clean before.
    fn invalidate(&mut self, rotation_changed: bool) -> bool {
        if rotation_changed {
            self.update_rotation();
        }
        let last = self.local_id;
        self.local_id = self.local_id.wrapping_add(1);
        last == self.current_local_id
    }

    fn update_rotation(&mut self) {
        let (sx, cx) = (self.rotation + self.shear.x).to_radians().sin_cos();
        let (sy, cy) = (self.rotation + self.shear.y).to_radians().sin_cos();
        self.cx = cx;
        self.sx = sx;
        self.cy = -sy;
        self.sy = cy;
    }

    fn rebuild_local(&mut self) {
        let lt = &mut self.local;
        lt.a = self.cx * self.scale.x;
        lt.b = self.sx * self.scale.x;
        lt.c = self.cy * self.scale.y;
        lt.d = self.sy * self.scale.y;
        lt.tx = self.position.x - (self.pivot.x * lt.a + self.pivot.y * lt.c);
        lt.ty = self.position.y - (self.pivot.x * lt.b + self.pivot.y * lt.d);
        self.current_local_id = self.local_id;
    }

    /// Rebuild the local matrix if any setter ran since the last rebuild.
    pub fn update_local_transform(&mut self) {
        if self.is_local_dirty() {
            self.rebuild_local();
        }
    }

    /// Recompute the world matrix as `parent_world * local`.
    pub fn update_transform(&mut self, parent_world: &Matrix) {
        self.update_local_transform();
        self.world.set_to_mult(parent_world, &self.local);
        self.world_id = self.world_id.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_new_is_clean_identity() {
        let t = Transform::new();
        assert!(!t.is_local_dirty());
        assert!(t.local_transform().is_identity());
        assert!(t.world_transform().is_identity());
    }

    #[test]
    fn test_first_change_reports_dirty_once() {
        let mut t = Transform::new();
        assert!(t.set_position(5.0, 6.0));
        // Already dirty: no second notification until rebuilt.
        assert!(!t.set_scale(2.0, 2.0));
        assert!(t.is_local_dirty());

        t.update_local_transform();
        assert!(!t.is_local_dirty());
        assert!(t.set_rotation(10.0));
    }

    #[test]
    fn test_unchanged_value_does_not_bump_version() {
        let mut t = Transform::new();
        let before = t.local_id();
        assert!(!t.set_position(0.0, 0.0));
        assert!(!t.set_rotation(0.0));
        assert_eq!(t.local_id(), before);
    }

    #[test]
    fn test_local_matrix_with_pivot() {
        let mut t = Transform::new();
        t.set_position(100.0, 50.0);
        t.set_pivot(10.0, 10.0);
        t.set_scale(2.0, 2.0);
        t.update_local_transform();

        let p = t.local_transform().apply(Point::new(10.0, 10.0));
        assert!(approx_eq(p.x, 100.0));
        assert!(approx_eq(p.y, 50.0));
    }

    #[test]
    fn test_rotation_matches_matrix_rotation() {
        let mut t = Transform::new();
        t.set_rotation(90.0);
        t.update_local_transform();
        assert!(t
            .local_transform()
            .approx_eq(&Matrix::from_rotation_deg(90.0), 1e-5));
    }

    #[test]
    fn test_update_transform_bumps_world_id() {
        let mut t = Transform::new();
        t.set_position(1.0, 2.0);
        let parent = Matrix::from_translation(10.0, 0.0);
        t.update_transform(&parent);
        assert_eq!(t.world_id(), 1);
        assert!(approx_eq(t.world_transform().tx, 11.0));
        assert!(approx_eq(t.world_transform().ty, 2.0));
    }

    #[test]
    fn test_skew_maps_onto_shear() {
        let mut t = Transform::new();
        t.set_skew(15.0, 30.0);
        assert_eq!(t.shear(), Point::new(30.0, -15.0));
        assert_eq!(t.skew(), Point::new(15.0, 30.0));
    }

    #[test]
    fn test_set_from_matrix_round_trip() {
        let mut source = Transform::new();
        source.set_position(3.0, -4.0);
        source.set_rotation(30.0);
        source.set_scale(2.0, 0.5);
        source.update_local_transform();

        let mut t = Transform::new();
        t.set_from_matrix(source.local_transform());
        t.update_local_transform();

        assert!(approx_eq(t.rotation(), 30.0));
        assert!(approx_eq(t.scale().x, 2.0));
        assert!(approx_eq(t.scale().y, 0.5));
        assert!(t.local_transform().approx_eq(source.local_transform(), 1e-4));
    }

    #[test]
    fn test_set_from_matrix_with_shear() {
        let mut source = Transform::new();
        source.set_shear(20.0, -10.0);
        source.update_local_transform();

        let mut t = Transform::new();
        t.set_from_matrix(source.local_transform());
        t.update_local_transform();

        assert!(approx_eq(t.rotation(), 0.0));
        assert!(t.local_transform().approx_eq(source.local_transform(), 1e-4));
    }
}
