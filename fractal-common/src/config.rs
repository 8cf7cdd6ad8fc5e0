use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::branch::BranchConfig;
use crate::error::FractalError;
use crate::generation::{BranchingRule, DecayRule, GenerationConfig, Limit, LimitRules, RateRules};
use crate::vecmath::{clamp, Vector2D};

pub const DEFAULT_LENGTH: ResolvedCondition = ResolvedCondition {
    start_value: 20.0,
    end_value: 1.0,
    reduction_rate: 0.9,
};

pub const DEFAULT_THICKNESS: ResolvedCondition = ResolvedCondition {
    start_value: 4.0,
    end_value: 1.0,
    reduction_rate: 0.9,
};

pub const DEFAULT_DEGREE_OFFSET: f64 = 15.0;
pub const DEFAULT_FRAME_GAP_MILLIS: f64 = 1000.0;
pub const MAX_FRAME_GAP_MILLIS: f64 = 60_000.0;
/// One refresh per day.
pub const MIN_REFRESH_RATE_HZ: f64 = 1.0 / 86_400.0;

// --- Configuration surface -------------------------------------------------------------

/// Partially specified decay settings for one axis.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionConfig {
    pub start_value: Option<f64>,
    pub end_value: Option<f64>,
    pub reduction_rate: Option<f64>,
}

/// `length = 12` or `length = { start_value = 12, reduction_rate = 0.8 }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionInput {
    /// Start value only.
    Start(f64),
    Full(ConditionConfig),
}

impl ConditionInput {
    fn to_partial(&self) -> ConditionConfig {
        match self {
            ConditionInput::Start(start_value) => ConditionConfig {
                start_value: Some(*start_value),
                ..ConditionConfig::default()
            },
            ConditionInput::Full(config) => config.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnimateConfig {
    pub enabled: Option<bool>,
    pub frame_gap_millis: Option<f64>,
}

/// `animate = 60` (enabled with that gap) or `animate = { enabled = true, frame_gap_millis = 60 }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AnimateInput {
    Gap(f64),
    Full(AnimateConfig),
}

/// Survival test applied to each freshly grown branch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PruningConfig {
    Constant(bool),
    /// Always keep branches shallower than `guaranteed_depth`, then keep each one
    /// independently with `survival_probability`.
    DepthThenChance {
        guaranteed_depth: usize,
        survival_probability: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl Default for PruningConfig {
    fn default() -> Self {
        PruningConfig::Constant(true)
    }
}

/// One seed point of the tree.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OriginConfig {
    pub position: [f64; 2],
    pub growth_degree: f64,
    #[serde(default)]
    pub length: Option<ConditionInput>,
    #[serde(default)]
    pub thickness: Option<ConditionInput>,
    #[serde(default)]
    pub degree_offset: Option<f64>,
    /// Explicit child heading offsets; replaces the `±degree_offset` pair.
    #[serde(default)]
    pub branch_offsets: Option<Vec<f64>>,
}

/// The `[tree]` section: origins plus defaults shared by all of them.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TreeOptions {
    pub origins: Vec<OriginConfig>,
    #[serde(default)]
    pub length: Option<ConditionInput>,
    #[serde(default)]
    pub thickness: Option<ConditionInput>,
    #[serde(default)]
    pub degree_offset: Option<f64>,
    #[serde(default)]
    pub branch_offsets: Option<Vec<f64>>,
    #[serde(default)]
    pub animate: Option<AnimateInput>,
    #[serde(default)]
    pub is_alive: Option<PruningConfig>,
    /// Limit thickness by the length end value, as older renderings of this tree did.
    #[serde(default)]
    pub legacy_thickness_limit: bool,
}

// --- Resolved values -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCondition {
    pub start_value: f64,
    pub end_value: f64,
    pub reduction_rate: f64,
}

impl ResolvedCondition {
    fn merge(origin: Option<&ConditionInput>, global: Option<&ConditionInput>, fallback: ResolvedCondition) -> Self {
        let origin = origin.map(ConditionInput::to_partial).unwrap_or_default();
        let global = global.map(ConditionInput::to_partial).unwrap_or_default();
        ResolvedCondition {
            start_value: origin.start_value.or(global.start_value).unwrap_or(fallback.start_value),
            end_value: origin.end_value.or(global.end_value).unwrap_or(fallback.end_value),
            reduction_rate: origin
                .reduction_rate
                .or(global.reduction_rate)
                .unwrap_or(fallback.reduction_rate),
        }
    }

    fn validate(&self, axis: &str) -> Result<(), FractalError> {
        for (name, value) in [
            ("start_value", self.start_value),
            ("end_value", self.end_value),
            ("reduction_rate", self.reduction_rate),
        ] {
            if !value.is_finite() {
                return Err(FractalError::invalid(format!("{axis}.{name}"), "must be finite"));
            }
        }
        if self.reduction_rate <= 0.0 {
            return Err(FractalError::invalid(
                format!("{axis}.reduction_rate"),
                format!("must be positive, got {}", self.reduction_rate),
            ));
        }
        if self.start_value <= 0.0 {
            return Err(FractalError::invalid(
                format!("{axis}.start_value"),
                format!("must be positive, got {}", self.start_value),
            ));
        }
        if self.start_value < self.end_value {
            return Err(FractalError::invalid(
                format!("{axis}.start_value"),
                format!("{} is already below end_value {}", self.start_value, self.end_value),
            ));
        }
        Ok(())
    }
}

/// Whether repeated decay from a positive value ever drops below `end_value`.
fn decay_terminates(rule: DecayRule, end_value: f64) -> bool {
    match rule {
        DecayRule::Subtractive(_) => true,
        DecayRule::Multiplicative(_) => end_value > 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    pub enabled: bool,
    pub frame_gap_millis: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            enabled: false,
            frame_gap_millis: DEFAULT_FRAME_GAP_MILLIS,
        }
    }
}

impl AnimationConfig {
    /// Minimum time between two drawn generations. Disabled animation still draws one
    /// generation per frame.
    pub fn effective_gap(&self) -> f64 {
        if self.enabled {
            self.frame_gap_millis
        } else {
            0.0
        }
    }
}

/// One origin, ready to animate.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrigin {
    /// Generation zero.
    pub draw: BranchConfig,
    pub generation: GenerationConfig,
    pub is_alive: PruningConfig,
}

impl TreeOptions {
    /// Resolves the `animate` field, clamping the gap to `[0, 60000]` ms.
    pub fn animation(&self) -> Result<AnimationConfig, FractalError> {
        let (enabled, gap) = match &self.animate {
            None => (false, DEFAULT_FRAME_GAP_MILLIS),
            Some(AnimateInput::Gap(gap)) => (true, *gap),
            Some(AnimateInput::Full(cfg)) => (
                cfg.enabled.unwrap_or(false),
                cfg.frame_gap_millis.unwrap_or(DEFAULT_FRAME_GAP_MILLIS),
            ),
        };
        if gap.is_nan() {
            return Err(FractalError::invalid("animate.frame_gap_millis", "must be a number"));
        }
        Ok(AnimationConfig {
            enabled,
            frame_gap_millis: clamp(gap, 0.0, MAX_FRAME_GAP_MILLIS),
        })
    }

    /// Resolves every origin against the shared defaults.
    pub fn resolve_origins(&self) -> Result<Vec<ResolvedOrigin>, FractalError> {
        let is_alive = self.pruning()?;
        self.origins
            .iter()
            .enumerate()
            .map(|(idx, origin)| {
                self.normalize_origin(origin, is_alive.clone()).map_err(|e| match e {
                    FractalError::InvalidNumericConfig { field, reason } => {
                        FractalError::InvalidNumericConfig {
                            field: format!("origins[{idx}].{field}"),
                            reason,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Origin value, then the shared value, then the built-in default, field by field.
    pub fn normalize_origin(&self, origin: &OriginConfig, is_alive: PruningConfig) -> Result<ResolvedOrigin, FractalError> {
        let length = ResolvedCondition::merge(origin.length.as_ref(), self.length.as_ref(), DEFAULT_LENGTH);
        let thickness = ResolvedCondition::merge(origin.thickness.as_ref(), self.thickness.as_ref(), DEFAULT_THICKNESS);
        length.validate("length")?;
        thickness.validate("thickness")?;

        let start = Vector2D::from(origin.position);
        if !start.is_finite() {
            return Err(FractalError::invalid("position", "must be finite"));
        }
        if !origin.growth_degree.is_finite() {
            return Err(FractalError::invalid("growth_degree", "must be finite"));
        }

        let growth_degree = match origin.branch_offsets.as_ref().or(self.branch_offsets.as_ref()) {
            Some(offsets) => {
                if offsets.iter().any(|o| !o.is_finite()) {
                    return Err(FractalError::invalid("branch_offsets", "must all be finite"));
                }
                BranchingRule::Offsets(offsets.clone())
            }
            None => {
                let offset = origin.degree_offset.or(self.degree_offset).unwrap_or(DEFAULT_DEGREE_OFFSET);
                if !offset.is_finite() {
                    return Err(FractalError::invalid("degree_offset", "must be finite"));
                }
                BranchingRule::Symmetric { offset }
            }
        };

        let thickness_end = if self.legacy_thickness_limit {
            length.end_value
        } else {
            thickness.end_value
        };
        let rate = RateRules {
            length: DecayRule::from_reduction_rate(length.reduction_rate),
            thickness: DecayRule::from_reduction_rate(thickness.reduction_rate),
            growth_degree,
        };
        if !decay_terminates(rate.length, length.end_value) && !decay_terminates(rate.thickness, thickness_end) {
            return Err(FractalError::invalid(
                "end_value",
                "multiplicative decay never drops below a non-positive end_value on either axis",
            ));
        }

        Ok(ResolvedOrigin {
            draw: BranchConfig {
                start,
                growth_degree: origin.growth_degree,
                length: length.start_value,
                thickness: thickness.start_value,
            },
            generation: GenerationConfig {
                rate,
                limit: LimitRules {
                    length: Limit { end_value: length.end_value },
                    thickness: Limit { end_value: thickness_end },
                },
            },
            is_alive,
        })
    }

    fn pruning(&self) -> Result<PruningConfig, FractalError> {
        let pruning = self.is_alive.clone().unwrap_or_default();
        if let PruningConfig::DepthThenChance { survival_probability, .. } = pruning {
            if !(0.0..=1.0).contains(&survival_probability) {
                return Err(FractalError::invalid(
                    "is_alive.survival_probability",
                    format!("must be within [0, 1], got {survival_probability}"),
                ));
            }
        }
        Ok(pruning)
    }
}

// --- File-level configuration ----------------------------------------------------------

/// The drawing surface, in pixels. The y axis points up.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: String,
    /// A colour name, or "palette" to colour strokes by depth.
    #[serde(default = "default_stroke")]
    pub stroke: String,
}

fn default_background() -> String {
    "white".to_string()
}

fn default_stroke() -> String {
    "palette".to_string()
}

/// Frame pacing for the engine run.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FrameConfig {
    #[serde(default = "default_refresh_rate_hz")]
    pub refresh_rate_hz: f64,
    /// Sleep between frames instead of advancing a simulated clock.
    #[serde(default)]
    pub realtime: bool,
    /// Stop the run after this many frames even if trees are still growing.
    #[serde(default)]
    pub max_frames: Option<u64>,
}

fn default_refresh_rate_hz() -> f64 {
    60.0
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            refresh_rate_hz: default_refresh_rate_hz(),
            realtime: false,
            max_frames: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_true")]
    pub save_snapshots: bool,
    #[serde(default)]
    pub save_segments_csv: bool,
}

fn default_base_filename() -> String {
    "fractal_tree".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            format: None,
            save_snapshots: true,
            save_segments_csv: false,
        }
    }
}

/// Main configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FractalConfig {
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub frames: FrameConfig,
    pub tree: TreeOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FractalConfig {
    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config in '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: FractalConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on anything that would stop the run from drawing.
    pub fn validate(&self) -> Result<(), FractalError> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(FractalError::Configuration(format!(
                "no drawing surface: canvas is {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if self.tree.origins.is_empty() {
            return Err(FractalError::Configuration("tree has no origins".to_string()));
        }
        let rate = self.frames.refresh_rate_hz;
        if !(rate.is_finite() && rate >= MIN_REFRESH_RATE_HZ) {
            return Err(FractalError::invalid(
                "frames.refresh_rate_hz",
                format!("must be at least {} (one refresh per day), got {}", MIN_REFRESH_RATE_HZ, rate),
            ));
        }
        self.tree.animation()?;
        self.tree.resolve_origins()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> OriginConfig {
        OriginConfig {
            position: [0.0, 0.0],
            growth_degree: 90.0,
            length: None,
            thickness: None,
            degree_offset: None,
            branch_offsets: None,
        }
    }

    fn options(origins: Vec<OriginConfig>) -> TreeOptions {
        TreeOptions {
            origins,
            length: None,
            thickness: None,
            degree_offset: None,
            branch_offsets: None,
            animate: None,
            is_alive: None,
            legacy_thickness_limit: false,
        }
    }

    #[test]
    fn hardcoded_defaults_fill_everything() {
        let resolved = options(vec![origin()]).resolve_origins().unwrap();
        let r = &resolved[0];
        assert_eq!(r.draw.length, 20.0);
        assert_eq!(r.draw.thickness, 4.0);
        assert_eq!(r.generation.rate.length, DecayRule::Multiplicative(0.9));
        assert_eq!(r.generation.rate.growth_degree, BranchingRule::Symmetric { offset: 15.0 });
        assert_eq!(r.generation.limit.length.end_value, 1.0);
        assert_eq!(r.is_alive, PruningConfig::Constant(true));
    }

    #[test]
    fn origin_beats_global_field_by_field() {
        let mut o = origin();
        o.length = Some(ConditionInput::Start(50.0));
        let mut opts = options(vec![o]);
        opts.length = Some(ConditionInput::Full(ConditionConfig {
            start_value: Some(30.0),
            end_value: Some(2.0),
            reduction_rate: None,
        }));
        opts.degree_offset = Some(25.0);

        let r = &opts.resolve_origins().unwrap()[0];
        assert_eq!(r.draw.length, 50.0);
        assert_eq!(r.generation.limit.length.end_value, 2.0);
        assert_eq!(r.generation.rate.length, DecayRule::Multiplicative(0.9));
        assert_eq!(r.generation.rate.growth_degree, BranchingRule::Symmetric { offset: 25.0 });
    }

    #[test]
    fn thickness_limited_by_its_own_end_value() {
        let mut o = origin();
        o.thickness = Some(ConditionInput::Full(ConditionConfig {
            end_value: Some(0.5),
            ..ConditionConfig::default()
        }));
        let r = &options(vec![o.clone()]).resolve_origins().unwrap()[0];
        assert_eq!(r.generation.limit.thickness.end_value, 0.5);

        let mut legacy = options(vec![o]);
        legacy.legacy_thickness_limit = true;
        let r = &legacy.resolve_origins().unwrap()[0];
        assert_eq!(r.generation.limit.thickness.end_value, 1.0);
    }

    #[test]
    fn rejects_non_positive_rate() {
        let mut o = origin();
        o.length = Some(ConditionInput::Full(ConditionConfig {
            reduction_rate: Some(0.0),
            ..ConditionConfig::default()
        }));
        let err = options(vec![o]).resolve_origins().unwrap_err();
        match err {
            FractalError::InvalidNumericConfig { field, .. } => {
                assert_eq!(field, "origins[0].length.reduction_rate")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_start_below_end() {
        let mut o = origin();
        o.thickness = Some(ConditionInput::Full(ConditionConfig {
            start_value: Some(1.0),
            end_value: Some(2.0),
            reduction_rate: None,
        }));
        assert!(options(vec![o]).resolve_origins().is_err());
    }

    #[test]
    fn rejects_growth_that_never_terminates() {
        let never = ConditionInput::Full(ConditionConfig {
            end_value: Some(0.0),
            ..ConditionConfig::default()
        });
        let mut o = origin();
        o.length = Some(never.clone());
        o.thickness = Some(never);
        assert!(options(vec![o]).resolve_origins().is_err());
    }

    #[test]
    fn animate_shapes_and_clamping() {
        let mut opts = options(vec![origin()]);
        assert_eq!(opts.animation().unwrap(), AnimationConfig::default());
        assert_eq!(opts.animation().unwrap().effective_gap(), 0.0);

        opts.animate = Some(AnimateInput::Gap(60.0));
        assert_eq!(
            opts.animation().unwrap(),
            AnimationConfig { enabled: true, frame_gap_millis: 60.0 }
        );

        opts.animate = Some(AnimateInput::Full(AnimateConfig {
            enabled: Some(true),
            frame_gap_millis: Some(100_000.0),
        }));
        assert_eq!(opts.animation().unwrap().effective_gap(), MAX_FRAME_GAP_MILLIS);

        opts.animate = Some(AnimateInput::Gap(-5.0));
        assert_eq!(opts.animation().unwrap().effective_gap(), 0.0);
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let mut opts = options(vec![origin()]);
        opts.is_alive = Some(PruningConfig::DepthThenChance {
            guaranteed_depth: 4,
            survival_probability: 1.5,
            seed: None,
        });
        assert!(opts.resolve_origins().is_err());
    }
}
