use serde::{Deserialize, Serialize};

/// How a value shrinks from one generation to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecayRule {
    /// `value * rate`, chosen for rates below 1.
    Multiplicative(f64),
    /// `value - rate`, chosen for rates of 1 and above.
    Subtractive(f64),
}

impl DecayRule {
    pub fn from_reduction_rate(rate: f64) -> Self {
        if rate < 1.0 {
            DecayRule::Multiplicative(rate)
        } else {
            DecayRule::Subtractive(rate)
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            DecayRule::Multiplicative(rate) => value * rate,
            DecayRule::Subtractive(rate) => value - rate,
        }
    }
}

/// Termination threshold for one axis: a value below `end_value` is dead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub end_value: f64,
}

impl Limit {
    pub fn is_reached(&self, value: f64) -> bool {
        value < self.end_value
    }
}

/// Maps a parent heading to the headings of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchingRule {
    /// Two children at `parent - offset` and `parent + offset`.
    Symmetric { offset: f64 },
    /// One child per listed offset, in order.
    Offsets(Vec<f64>),
}

impl BranchingRule {
    pub fn child_headings(&self, parent_degree: f64) -> Vec<f64> {
        match self {
            BranchingRule::Symmetric { offset } => {
                vec![parent_degree - offset, parent_degree + offset]
            }
            BranchingRule::Offsets(offsets) => {
                offsets.iter().map(|o| parent_degree + o).collect()
            }
        }
    }

    pub fn fan_out(&self) -> usize {
        match self {
            BranchingRule::Symmetric { .. } => 2,
            BranchingRule::Offsets(offsets) => offsets.len(),
        }
    }
}

/// Per-generation rate functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRules {
    pub length: DecayRule,
    pub thickness: DecayRule,
    pub growth_degree: BranchingRule,
}

/// Per-axis termination predicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitRules {
    pub length: Limit,
    pub thickness: Limit,
}

/// Everything the growth step needs for one origin, resolved once from the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub rate: RateRules,
    pub limit: LimitRules,
}
