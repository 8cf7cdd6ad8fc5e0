use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// A 2D vector with in-place, chainable mutators.
///
/// Not `Copy`: every mutator works on the receiver and returns it, so a caller that
/// still needs the original must `clone()` it first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

impl Vector2D {
    /// Creates a new vector.
    pub fn new(x: f64, y: f64) -> Self {
        Vector2D { x, y }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vector2D { x: 0.0, y: 0.0 }
    }

    /// Unit vector along the positive x axis.
    pub fn unit_x() -> Self {
        Vector2D { x: 1.0, y: 0.0 }
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Rescales the vector to `length` while keeping its direction.
    ///
    /// Fails on a zero-length vector, which has no direction to keep.
    pub fn set_length(&mut self, length: f64) -> Result<&mut Self, GeometryError> {
        if !length.is_finite() {
            return Err(GeometryError::NonFinite { operation: "set_length" });
        }
        Ok(self.normalize()?.scale_by(length))
    }

    /// Multiplies both components by `rate`.
    pub fn scale_by(&mut self, rate: f64) -> &mut Self {
        self.x *= rate;
        self.y *= rate;
        self
    }

    pub fn add(&mut self, other: &Vector2D) -> &mut Self {
        self.x += other.x;
        self.y += other.y;
        self
    }

    pub fn sub(&mut self, other: &Vector2D) -> &mut Self {
        self.x -= other.x;
        self.y -= other.y;
        self
    }

    /// Rotates counter-clockwise by `degrees`.
    pub fn rotate(&mut self, degrees: f64) -> &mut Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let (x, y) = (self.x, self.y);
        self.x = x * c - y * s;
        self.y = x * s + y * c;
        self
    }

    /// z component of the 3D cross product.
    pub fn cross(&self, other: &Vector2D) -> f64 {
        self.x * other.y - other.x * self.y
    }

    /// Calculates the dot product with another vector.
    pub fn dot(&self, other: &Vector2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Scales the vector to unit length.
    pub fn normalize(&mut self) -> Result<&mut Self, GeometryError> {
        let len = checked_length(self, "normalize")?;
        Ok(self.scale_by(1.0 / len))
    }

    /// Unsigned angle between the two vectors, in degrees (`0..=180`).
    pub fn angle_between(&self, other: &Vector2D) -> Result<f64, GeometryError> {
        let denom = checked_length(self, "angle_between")? * checked_length(other, "angle_between")?;
        // Rounding can push the cosine a hair outside [-1, 1], where acos is NaN.
        let cos = clamp(self.dot(other) / denom, -1.0, 1.0);
        Ok(cos.acos().to_degrees())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

fn checked_length(v: &Vector2D, operation: &'static str) -> Result<f64, GeometryError> {
    let len = v.length();
    if !len.is_finite() {
        Err(GeometryError::NonFinite { operation })
    } else if len == 0.0 {
        Err(GeometryError::ZeroLength { operation })
    } else {
        Ok(len)
    }
}

impl From<[f64; 2]> for Vector2D {
    fn from([x, y]: [f64; 2]) -> Self {
        Vector2D::new(x, y)
    }
}

/// Unit vector pointing `degrees` counter-clockwise from the positive x axis.
pub fn angle_to_vec(degrees: f64) -> Vector2D {
    let mut v = Vector2D::unit_x();
    v.rotate(degrees);
    v
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}
