//! Plain 2D math value types: affine matrices, points, rectangles and bounds.

mod matrix;
mod point;

pub use matrix::Matrix;
pub use point::{Bounds, Point, Rectangle};
