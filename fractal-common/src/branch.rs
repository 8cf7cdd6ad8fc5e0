use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::vecmath::{angle_to_vec, Vector2D};

/// One segment to draw and grow further.
///
/// The end point is derived from the heading and length, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Segment origin.
    pub start: Vector2D,
    /// Heading in degrees from the positive x axis.
    pub growth_degree: f64,
    pub length: f64,
    pub thickness: f64,
}

impl BranchConfig {
    /// `start + rotate(unit_x, growth_degree) * length`.
    pub fn end(&self) -> Result<Vector2D, GeometryError> {
        let mut step = angle_to_vec(self.growth_degree);
        step.set_length(self.length)?;

        let mut end = self.start.clone();
        end.add(&step);
        if !end.is_finite() {
            return Err(GeometryError::NonFinite { operation: "branch end" });
        }
        Ok(end)
    }

    /// The drawable geometry of this branch.
    pub fn segment(&self) -> Result<Segment, GeometryError> {
        let end = self.end()?;
        Ok(Segment {
            start: self.start.as_tuple(),
            end: end.as_tuple(),
            thickness: self.thickness,
        })
    }
}

/// What a renderer receives for each drawn branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub thickness: f64,
}

impl Segment {
    pub fn length(&self) -> f64 {
        (self.end.0 - self.start.0).hypot(self.end.1 - self.start.1)
    }
}
