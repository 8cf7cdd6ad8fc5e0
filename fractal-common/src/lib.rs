pub mod branch;
pub mod config;
pub mod error;
pub mod generation;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use branch::{BranchConfig, Segment};
pub use config::{
    AnimateConfig, AnimateInput, AnimationConfig, CanvasConfig, ConditionConfig, ConditionInput, FractalConfig,
    FrameConfig, OriginConfig, OutputConfig, PruningConfig, ResolvedOrigin, TreeOptions,
};
pub use error::{FractalError, GeometryError};
pub use generation::{BranchingRule, DecayRule, GenerationConfig, Limit, LimitRules, RateRules};
pub use snapshot::GenerationSnapshot;
pub use vecmath::{angle_to_vec, clamp, Vector2D};
