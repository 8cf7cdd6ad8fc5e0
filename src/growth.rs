use fractal_common::{BranchConfig, GenerationConfig, GeometryError};

/// Derives the next generation from `generation`.
///
/// Pure: the output depends only on the inputs. Children of one parent stay adjacent
/// and parents keep their input order. Pruning is applied by the caller.
pub fn step(generation: &[BranchConfig], config: &GenerationConfig) -> Result<Vec<BranchConfig>, GeometryError> {
    let fan_out = config.rate.growth_degree.fan_out();
    let mut children = Vec::with_capacity(generation.len() * fan_out);
    for branch in generation {
        children.extend(grow_branch(branch, config)?);
    }
    Ok(children)
}

/// Children of a single branch; empty once either axis passes its limit.
pub fn grow_branch(branch: &BranchConfig, config: &GenerationConfig) -> Result<Vec<BranchConfig>, GeometryError> {
    let next_length = config.rate.length.apply(branch.length);
    let next_thickness = config.rate.thickness.apply(branch.thickness);
    if config.limit.length.is_reached(next_length) || config.limit.thickness.is_reached(next_thickness) {
        return Ok(Vec::new());
    }

    let end = branch.end()?;
    Ok(config
        .rate
        .growth_degree
        .child_headings(branch.growth_degree)
        .into_iter()
        .map(|growth_degree| BranchConfig {
            start: end.clone(),
            growth_degree,
            length: next_length,
            thickness: next_thickness,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_common::{BranchingRule, DecayRule, Limit, LimitRules, RateRules, Vector2D};

    fn config(length: (f64, f64), thickness: (f64, f64), branching: BranchingRule) -> GenerationConfig {
        GenerationConfig {
            rate: RateRules {
                length: DecayRule::from_reduction_rate(length.1),
                thickness: DecayRule::from_reduction_rate(thickness.1),
                growth_degree: branching,
            },
            limit: LimitRules {
                length: Limit { end_value: length.0 },
                thickness: Limit { end_value: thickness.0 },
            },
        }
    }

    fn seed(length: f64) -> BranchConfig {
        BranchConfig {
            start: Vector2D::zero(),
            growth_degree: 90.0,
            length,
            thickness: 4.0,
        }
    }

    /// Generations drawn along a single always-alive chain, seed included.
    fn chain_generations(start: f64, end: f64, rate: f64) -> usize {
        // Thickness never binds here: multiplicative decay from 4 never drops below 0.
        let cfg = config((end, rate), (0.0, 0.99), BranchingRule::Offsets(vec![0.0]));
        let mut generation = vec![seed(start)];
        let mut count = 0;
        while !generation.is_empty() {
            count += 1;
            generation = step(&generation, &cfg).unwrap();
        }
        count
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_generation_scenario() {
        let cfg = config((5.0, 0.5), (1.0, 0.9), BranchingRule::Symmetric { offset: 30.0 });
        let gen0 = vec![seed(10.0)];

        let gen1 = step(&gen0, &cfg).unwrap();
        assert_eq!(gen1.len(), 2);
        let headings: Vec<f64> = gen1.iter().map(|b| b.growth_degree).collect();
        assert_eq!(headings, vec![60.0, 120.0]);
        for child in &gen1 {
            assert_eq!(child.length, 5.0);
            assert!(approx(child.start.x, 0.0) && approx(child.start.y, 10.0));
            assert!(approx(child.thickness, 3.6));
        }

        // 2.5 is below the end value of 5 for both branches.
        assert!(step(&gen1, &cfg).unwrap().is_empty());
    }

    #[test]
    fn multiplicative_decay_generation_count() {
        let expected = ((1.0f64 / 20.0).ln() / 0.9f64.ln()).ceil() as usize;
        assert_eq!(expected, 29);
        assert_eq!(chain_generations(20.0, 1.0, 0.9), expected);
    }

    #[test]
    fn subtractive_decay_generation_count() {
        assert_eq!(chain_generations(20.0, 1.0, 2.0), ((20.0 - 1.0) / 2.0f64).floor() as usize + 1);
        // Landing exactly on the end value is still alive.
        assert_eq!(chain_generations(21.0, 1.0, 2.0), 11);
    }

    #[test]
    fn thickness_limit_also_terminates() {
        let cfg = config((0.5, 0.9), (2.0, 1.0), BranchingRule::Symmetric { offset: 15.0 });
        let mut branch = seed(10.0);
        branch.thickness = 2.5;
        // 2.5 - 1.0 = 1.5 is below the thickness end value of 2.
        assert!(grow_branch(&branch, &cfg).unwrap().is_empty());
    }

    #[test]
    fn every_surviving_branch_has_two_children() {
        let cfg = config((1.0, 0.9), (0.5, 0.9), BranchingRule::Symmetric { offset: 15.0 });
        let parents = vec![seed(20.0), BranchConfig { growth_degree: 10.0, ..seed(15.0) }];
        let children = step(&parents, &cfg).unwrap();
        assert_eq!(children.len(), 4);
        for (pair, parent) in children.chunks(2).zip(&parents) {
            assert_eq!(pair[0].growth_degree, parent.growth_degree - 15.0);
            assert_eq!(pair[1].growth_degree, parent.growth_degree + 15.0);
            let end = parent.end().unwrap();
            assert_eq!(pair[0].start, end);
            assert_eq!(pair[1].start, end);
        }
    }

    #[test]
    fn step_is_deterministic() {
        let cfg = config((1.0, 0.8), (0.1, 0.9), BranchingRule::Symmetric { offset: 20.0 });
        let run = || {
            let mut generations = Vec::new();
            let mut generation = vec![seed(12.0)];
            while !generation.is_empty() {
                let next = step(&generation, &cfg).unwrap();
                generations.push(generation);
                generation = next;
            }
            generations
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.len() > 1);
    }

    #[test]
    fn parents_are_left_untouched() {
        let cfg = config((1.0, 0.9), (0.5, 0.9), BranchingRule::Symmetric { offset: 15.0 });
        let parents = vec![seed(20.0)];
        let snapshot = parents.clone();
        step(&parents, &cfg).unwrap();
        assert_eq!(parents, snapshot);
    }
}
