use serde::{Deserialize, Serialize};

use crate::branch::Segment;

/// One drawn generation of one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)] // Derive traits for easy saving/loading
pub struct GenerationSnapshot {
    /// Index of the origin this tree grew from.
    pub tree: usize,
    /// Generation number; the seed branch is generation 0.
    pub generation: usize,
    /// Frame timestamp (ms) at which the generation was drawn.
    pub time_ms: f64,
    pub segments: Vec<Segment>,
}

impl GenerationSnapshot {
    pub fn branch_count(&self) -> usize {
        self.segments.len()
    }
}
