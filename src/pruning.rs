use fractal_common::{BranchConfig, FractalError, PruningConfig};
use log::debug;
use rand::distr::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Decides whether a freshly grown branch is kept.
///
/// `depth` is the generation the candidate would be drawn in (the seed is depth 0).
/// All randomness of a tree lives behind this trait.
pub trait PruningPolicy {
    fn is_alive(&mut self, candidate: &BranchConfig, depth: usize) -> bool;
}

impl<F> PruningPolicy for F
where
    F: FnMut(&BranchConfig, usize) -> bool,
{
    fn is_alive(&mut self, candidate: &BranchConfig, depth: usize) -> bool {
        self(candidate, depth)
    }
}

/// Keeps everything, or nothing.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub bool);

impl PruningPolicy for Constant {
    fn is_alive(&mut self, _candidate: &BranchConfig, _depth: usize) -> bool {
        self.0
    }
}

/// Keeps every branch below `guaranteed_depth`, then each one with a fixed probability.
#[derive(Debug, Clone)]
pub struct DepthThenChance {
    guaranteed_depth: usize,
    survival: Bernoulli,
    rng: StdRng,
}

impl DepthThenChance {
    pub fn new(guaranteed_depth: usize, survival_probability: f64, rng: StdRng) -> Result<Self, FractalError> {
        let survival = Bernoulli::new(survival_probability).map_err(|_| {
            FractalError::invalid(
                "is_alive.survival_probability",
                format!("must be within [0, 1], got {survival_probability}"),
            )
        })?;
        Ok(Self {
            guaranteed_depth,
            survival,
            rng,
        })
    }
}

impl PruningPolicy for DepthThenChance {
    fn is_alive(&mut self, _candidate: &BranchConfig, depth: usize) -> bool {
        depth < self.guaranteed_depth || self.survival.sample(&mut self.rng)
    }
}

/// Builds the policy described by a resolved configuration.
///
/// Each tree gets its own policy instance; `tree` offsets the seed so that origins
/// sharing one configured seed still grow differently.
pub fn from_config(config: &PruningConfig, tree: usize) -> Result<Box<dyn PruningPolicy>, FractalError> {
    match *config {
        PruningConfig::Constant(alive) => Ok(Box::new(Constant(alive))),
        PruningConfig::DepthThenChance {
            guaranteed_depth,
            survival_probability,
            seed,
        } => {
            let rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(tree as u64)),
                None => StdRng::from_os_rng(),
            };
            debug!(
                "Tree {}: pruning keeps depth < {} and then p = {} (seed: {:?})",
                tree, guaranteed_depth, survival_probability, seed
            );
            Ok(Box::new(DepthThenChance::new(guaranteed_depth, survival_probability, rng)?))
        }
    }
}
