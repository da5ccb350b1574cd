use super::Point;

/// A 2D affine matrix.
///
/// Laid out as:
///
/// ```text
/// | a  c  tx |
/// | b  d  ty |
/// | 0  0  1  |
/// ```
///
/// Plain value type: every node owns its own copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Matrix {
    /// Identity matrix (no transformation)
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    /// Create an identity matrix
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Create a translation matrix
    pub fn from_translation(x: f32, y: f32) -> Self {
        Self {
            tx: x,
            ty: y,
            ..Self::IDENTITY
        }
    }

    /// Create a rotation matrix from degrees
    pub fn from_rotation_deg(angle_degrees: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.rotate_deg(angle_degrees);
        m
    }

    /// Create a non-uniform scale matrix
    pub fn from_scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Read a row-major 3x3 array (`[a, c, tx, b, d, ty, ..]`).
    pub fn from_array(array: &[f32; 9]) -> Self {
        Self {
            a: array[0],
            b: array[3],
            c: array[1],
            d: array[4],
            tx: array[2],
            ty: array[5],
        }
    }

    /// Flatten into a 3x3 array, row-major unless `transpose` is set.
    pub fn to_array(&self, transpose: bool) -> [f32; 9] {
        if transpose {
            [self.a, self.b, 0.0, self.c, self.d, 0.0, self.tx, self.ty, 1.0]
        } else {
            [self.a, self.c, self.tx, self.b, self.d, self.ty, 0.0, 0.0, 1.0]
        }
    }

    /// Transform a point by this matrix
    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Transform a point by the inverse of this matrix without building it.
    pub fn apply_inverse(&self, p: Point) -> Point {
        let id = 1.0 / (self.a * self.d + self.c * -self.b);
        Point::new(
            self.d * id * p.x + -self.c * id * p.y + (self.ty * self.c - self.tx * self.d) * id,
            self.a * id * p.y + -self.b * id * p.x + (-self.ty * self.a + self.tx * self.b) * id,
        )
    }

    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        self.tx += x;
        self.ty += y;
        self
    }

    pub fn scale(&mut self, x: f32, y: f32) -> &mut Self {
        self.a *= x;
        self.d *= y;
        self.c *= x;
        self.b *= y;
        self.tx *= x;
        self.ty *= y;
        self
    }

    pub fn rotate_rad(&mut self, angle: f32) -> &mut Self {
        let (sin, cos) = angle.sin_cos();
        let Self { a, b, c, d, tx, ty } = *self;
        self.a = a * cos - b * sin;
        self.b = a * sin + b * cos;
        self.c = c * cos - d * sin;
        self.d = c * sin + d * cos;
        self.tx = tx * cos - ty * sin;
        self.ty = tx * sin + ty * cos;
        self
    }

    pub fn rotate_deg(&mut self, angle: f32) -> &mut Self {
        self.rotate_rad(angle.to_radians())
    }

    /// `self = self * other`: `other` is applied first.
    pub fn append(&mut self, other: &Matrix) -> &mut Self {
        *self = Self::mult(self, other);
        self
    }

    /// `self = other * self`: `other` is applied last.
    pub fn prepend(&mut self, other: &Matrix) -> &mut Self {
        let tx1 = self.tx;
        if other.a != 1.0 || other.b != 0.0 || other.c != 0.0 || other.d != 1.0 {
            let a1 = self.a;
            let c1 = self.c;
            self.a = a1 * other.a + self.b * other.c;
            self.b = a1 * other.b + self.b * other.d;
            self.c = c1 * other.a + self.d * other.c;
            self.d = c1 * other.b + self.d * other.d;
        }
        self.tx = tx1 * other.a + self.ty * other.c + other.tx;
        self.ty = tx1 * other.b + self.ty * other.d + other.ty;
        self
    }

    /// Overwrite with `parent * local`.
    pub fn set_to_mult(&mut self, parent: &Matrix, local: &Matrix) {
        *self = Self::mult(parent, local);
    }

    fn mult(p: &Matrix, l: &Matrix) -> Matrix {
        Matrix {
            a: l.a * p.a + l.b * p.c,
            b: l.a * p.b + l.b * p.d,
            c: l.c * p.a + l.d * p.c,
            d: l.c * p.b + l.d * p.d,
            tx: l.tx * p.a + l.ty * p.c + p.tx,
            ty: l.tx * p.b + l.ty * p.d + p.ty,
        }
    }

    /// Invert in place. A singular matrix becomes the identity.
    pub fn invert(&mut self) -> &mut Self {
        let Self { a, b, c, d, tx, ty } = *self;
        let n = a * d - b * c;
        if n.abs() < 1e-10 {
            *self = Self::IDENTITY;
            return self;
        }
        self.a = d / n;
        self.b = -b / n;
        self.c = -c / n;
        self.d = a / n;
        self.tx = (c * ty - d * tx) / n;
        self.ty = -(a * ty - b * tx) / n;
        self
    }

    /// Return the inverse, leaving `self` untouched.
    pub fn inverse(&self) -> Matrix {
        let mut m = *self;
        m.invert();
        m
    }

    /// Check if this is the identity matrix
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Component-wise comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Matrix, epsilon: f32) -> bool {
        (self.a - other.a).abs() < epsilon
            && (self.b - other.b).abs() < epsilon
            && (self.c - other.c).abs() < epsilon
            && (self.d - other.d).abs() < epsilon
            && (self.tx - other.tx).abs() < epsilon
            && (self.ty - other.ty).abs() < epsilon
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identity() {
        let m = Matrix::identity();
        assert!(m.is_identity());
        let p = m.apply(Point::new(3.0, -2.0));
        assert_eq!(p, Point::new(3.0, -2.0));
    }

    #[test]
    fn test_translate() {
        let m = Matrix::from_translation(10.0, 20.0);
        let p = m.apply(Point::new(5.0, 5.0));
        assert!(approx_eq(p.x, 15.0));
        assert!(approx_eq(p.y, 25.0));
    }

    #[test]
    fn test_rotate() {
        let m = Matrix::from_rotation_deg(90.0);
        let p = m.apply(Point::new(1.0, 0.0));
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 1.0));
    }

    #[test]
    fn test_append_applies_argument_first() {
        // scale * translate: (0,0) -> (10,0) -> (20,0)
        let mut m = Matrix::from_scale(2.0, 2.0);
        m.append(&Matrix::from_translation(10.0, 0.0));
        let p = m.apply(Point::new(0.0, 0.0));
        assert!(approx_eq(p.x, 20.0));
        assert!(approx_eq(p.y, 0.0));
    }

    #[test]
    fn test_prepend_applies_argument_last() {
        // translate then scale: (0,0) -> (10,0) -> (20,0)
        let mut m = Matrix::from_translation(10.0, 0.0);
        m.prepend(&Matrix::from_scale(2.0, 2.0));
        let p = m.apply(Point::new(0.0, 0.0));
        assert!(approx_eq(p.x, 20.0));
    }

    #[test]
    fn test_set_to_mult_matches_append() {
        let parent = *Matrix::from_translation(3.0, 4.0).rotate_deg(30.0);
        let local = *Matrix::from_scale(2.0, 0.5).translate(1.0, 1.0);
        let mut a = parent;
        a.append(&local);
        let mut b = Matrix::IDENTITY;
        b.set_to_mult(&parent, &local);
        assert!(a.approx_eq(&b, 1e-5));
    }

    #[test]
    fn test_invert_round_trip() {
        let mut m = Matrix::from_rotation_deg(45.0);
        m.scale(2.0, 3.0).translate(7.0, -1.0);
        let inv = m.inverse();
        let mut composed = m;
        composed.append(&inv);
        assert!(composed.approx_eq(&Matrix::IDENTITY, 1e-5));
    }

    #[test]
    fn test_apply_inverse() {
        let mut m = Matrix::from_rotation_deg(30.0);
        m.translate(4.0, 2.0);
        let p = Point::new(3.0, 4.0);
        let back = m.apply_inverse(m.apply(p));
        assert!(approx_eq(back.x, 3.0));
        assert!(approx_eq(back.y, 4.0));
    }

    #[test]
    fn test_singular_inverts_to_identity() {
        let m = Matrix::from_scale(0.0, 1.0);
        assert!(m.inverse().is_identity());
    }

    #[test]
    fn test_array_layouts() {
        let m = Matrix::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert_eq!(m.to_array(false), [1.0, 3.0, 5.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0]);
        assert_eq!(m.to_array(true), [1.0, 2.0, 0.0, 3.0, 4.0, 0.0, 5.0, 6.0, 1.0]);
        assert_eq!(Matrix::from_array(&m.to_array(false)), m);
    }
}
