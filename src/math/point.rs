/// A 2D point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    pub const EMPTY: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// Running min/max accumulator used while collecting subtree bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new()
    }
}

impl Bounds {
    pub fn new() -> Self {
        Self {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn add_point(&mut self, x: f32, y: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Add a quad given as four interleaved corner coordinates.
    pub fn add_quad(&mut self, vertices: &[f32; 8]) {
        for corner in vertices.chunks_exact(2) {
            self.add_point(corner[0], corner[1]);
        }
    }

    pub fn add_bounds(&mut self, other: &Bounds) {
        if other.is_empty() {
            return;
        }
        self.add_point(other.min_x, other.min_y);
        self.add_point(other.max_x, other.max_y);
    }

    /// Rectangle covering the accumulated area, or [`Rectangle::EMPTY`].
    pub fn rectangle(&self) -> Rectangle {
        if self.is_empty() {
            return Rectangle::EMPTY;
        }
        Rectangle::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x,
            self.max_y - self.min_y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bounds_give_empty_rectangle() {
        let b = Bounds::new();
        assert!(b.is_empty());
        assert_eq!(b.rectangle(), Rectangle::EMPTY);
    }

    #[test]
    fn test_bounds_accumulate_quads() {
        let mut b = Bounds::new();
        b.add_quad(&[0.0, 0.0, 10.0, 0.0, 10.0, 5.0, 0.0, 5.0]);
        b.add_point(-2.0, 8.0);
        assert_eq!(b.rectangle(), Rectangle::new(-2.0, 0.0, 12.0, 8.0));
    }

    #[test]
    fn test_rectangle_contains() {
        let r = Rectangle::new(1.0, 1.0, 2.0, 2.0);
        assert!(r.contains(1.0, 2.5));
        assert!(!r.contains(3.0, 1.0));
    }
}
