use fractal_common::{FractalError, GeometryError, TreeOptions};
use log::{debug, error, info, warn};

use crate::frame::FrameSource;
use crate::renderer::Renderer;
use crate::scheduler::{AnimationScheduler, StopToken, TickOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeStatus {
    Growing,
    Finished,
    Cancelled,
    Failed(GeometryError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeReport {
    pub tree: usize,
    pub generations: usize,
    pub branches: usize,
    pub status: TreeStatus,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestReport {
    /// Refreshes consumed from the frame source.
    pub frames: u64,
    pub trees: Vec<TreeReport>,
}

impl ForestReport {
    pub fn total_branches(&self) -> usize {
        self.trees.iter().map(|t| t.branches).sum()
    }
}

/// All trees of one drawing, each animated by its own scheduler on a shared frame source.
pub struct Forest {
    schedulers: Vec<AnimationScheduler>,
    statuses: Vec<TreeStatus>,
    stop: StopToken,
}

impl Forest {
    /// One scheduler per configured origin.
    pub fn from_options(options: &TreeOptions, stop: StopToken) -> Result<Self, FractalError> {
        let animation = options.animation()?;
        let schedulers = options
            .resolve_origins()?
            .into_iter()
            .enumerate()
            .map(|(tree, origin)| {
                debug!("Tree {} resolved: {:?}", tree, origin);
                AnimationScheduler::new(tree, origin, &animation, stop.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Seeded {} tree(s); animation {} (gap {:.0} ms)",
            schedulers.len(),
            if animation.enabled { "enabled" } else { "disabled" },
            animation.effective_gap()
        );
        Ok(Self::from_schedulers(schedulers, stop))
    }

    pub fn from_schedulers(schedulers: Vec<AnimationScheduler>, stop: StopToken) -> Self {
        let statuses = vec![TreeStatus::Growing; schedulers.len()];
        Self {
            schedulers,
            statuses,
            stop,
        }
    }

    pub fn is_growing(&self) -> bool {
        self.statuses.iter().any(|s| *s == TreeStatus::Growing)
    }

    /// Ticks every growing tree once. A failing tree is retired without affecting the others.
    pub fn tick_all<R: Renderer + ?Sized>(&mut self, now: f64, renderer: &mut R) {
        for (scheduler, status) in self.schedulers.iter_mut().zip(self.statuses.iter_mut()) {
            if *status != TreeStatus::Growing {
                continue;
            }
            match scheduler.tick(now, renderer) {
                Ok(TickOutcome::Waiting) | Ok(TickOutcome::Drew { .. }) => {}
                Ok(TickOutcome::Finished) => {
                    info!(
                        "Tree {} finished at {:.1} ms: {} generations, {} branches",
                        scheduler.tree(),
                        now,
                        scheduler.generations_drawn(),
                        scheduler.branches_drawn()
                    );
                    *status = TreeStatus::Finished;
                }
                Ok(TickOutcome::Cancelled) => {
                    info!("Tree {} cancelled after {} generations", scheduler.tree(), scheduler.generations_drawn());
                    *status = TreeStatus::Cancelled;
                }
                Err(e) => {
                    error!("Tree {} aborted: {}", scheduler.tree(), e);
                    *status = TreeStatus::Failed(e);
                }
            }
        }
    }

    /// Drives every tree to completion on `source`.
    ///
    /// `max_frames` trips the stop token once that many refreshes have been consumed.
    pub fn run<S, R>(&mut self, source: &mut S, renderer: &mut R, max_frames: Option<u64>) -> Result<ForestReport, FractalError>
    where
        S: FrameSource + ?Sized,
        R: Renderer + ?Sized,
    {
        renderer.begin()?;

        let start = source.now();
        for scheduler in &mut self.schedulers {
            scheduler.start(start);
        }

        let mut frames = 0u64;
        while self.is_growing() {
            if max_frames.is_some_and(|max| frames >= max) && !self.stop.is_stopped() {
                warn!("Reached the frame cap ({} frames); stopping the remaining trees.", frames);
                self.stop.stop();
            }

            let handle = source.request_frame();
            if self.stop.is_stopped() {
                // Trees observe the token at the top of a tick; no refresh is needed for that.
                source.cancel_frame(handle);
                self.tick_all(source.now(), renderer);
                break;
            }
            let Some(now) = source.wait_for_frame(handle) else {
                warn!("Frame source stopped delivering frames after {} frames.", frames);
                break;
            };
            frames += 1;
            self.tick_all(now, renderer);
        }

        Ok(self.report(frames))
    }

    pub fn report(&self, frames: u64) -> ForestReport {
        ForestReport {
            frames,
            trees: self
                .schedulers
                .iter()
                .zip(&self.statuses)
                .map(|(scheduler, status)| TreeReport {
                    tree: scheduler.tree(),
                    generations: scheduler.generations_drawn(),
                    branches: scheduler.branches_drawn(),
                    status: status.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SimulatedFrameSource;
    use crate::pruning::Constant;
    use crate::renderer::RecordingRenderer;
    use fractal_common::{
        AnimateInput, BranchConfig, ConditionConfig, ConditionInput, GenerationSnapshot, OriginConfig, Vector2D,
    };

    fn options(animate: Option<AnimateInput>) -> TreeOptions {
        TreeOptions {
            origins: vec![
                OriginConfig {
                    position: [0.0, 0.0],
                    growth_degree: 90.0,
                    length: Some(ConditionInput::Full(ConditionConfig {
                        start_value: Some(10.0),
                        end_value: Some(5.0),
                        reduction_rate: Some(0.5),
                    })),
                    thickness: None,
                    degree_offset: Some(30.0),
                    branch_offsets: None,
                },
                OriginConfig {
                    position: [50.0, 0.0],
                    growth_degree: 100.0,
                    length: Some(ConditionInput::Start(8.0)),
                    thickness: None,
                    degree_offset: None,
                    branch_offsets: None,
                },
            ],
            length: None,
            thickness: None,
            degree_offset: None,
            branch_offsets: None,
            animate,
            is_alive: None,
            legacy_thickness_limit: false,
        }
    }

    /// The first configured origin, heading `growth_degree`.
    fn scenario_scheduler(tree: usize, growth_degree: f64, stop: StopToken) -> AnimationScheduler {
        let origin = options(None).resolve_origins().unwrap().remove(0);
        let seed = BranchConfig { growth_degree, ..origin.draw };
        AnimationScheduler::with_policy(tree, seed, origin.generation, Box::new(Constant(true)), 0.0, stop)
    }

    fn run(animate: Option<AnimateInput>) -> (ForestReport, Vec<GenerationSnapshot>) {
        let mut forest = Forest::from_options(&options(animate), StopToken::new()).unwrap();
        let mut source = SimulatedFrameSource::new(60.0);
        let mut renderer = RecordingRenderer::new(100, 100);
        let report = forest.run(&mut source, &mut renderer, None).unwrap();
        (report, renderer.into_snapshots())
    }

    fn segments_of(snapshots: &[GenerationSnapshot]) -> Vec<(usize, usize, String)> {
        let mut all: Vec<_> = snapshots
            .iter()
            .flat_map(|g| g.segments.iter().map(move |s| (g.tree, g.generation, format!("{:?}", s))))
            .collect();
        all.sort();
        all
    }

    #[test]
    fn pacing_changes_frame_count_but_not_the_drawing() {
        let (fast, fast_drawn) = run(Some(AnimateInput::Gap(0.0)));
        let (slow, slow_drawn) = run(Some(AnimateInput::Full(fractal_common::AnimateConfig {
            enabled: Some(true),
            frame_gap_millis: Some(100_000.0),
        })));

        for report in [&fast, &slow] {
            assert!(report.trees.iter().all(|t| t.status == TreeStatus::Finished));
        }
        assert_eq!(fast.total_branches(), slow.total_branches());
        assert_eq!(segments_of(&fast_drawn), segments_of(&slow_drawn));
        assert!(slow.frames > fast.frames);

        // The clamped 60 s gap separates consecutive generations of a tree.
        let first_tree: Vec<f64> = slow_drawn.iter().filter(|g| g.tree == 0).map(|g| g.time_ms).collect();
        for pair in first_tree.windows(2) {
            assert!(pair[1] - pair[0] >= 60_000.0);
        }
    }

    #[test]
    fn first_tree_matches_the_two_generation_scenario() {
        let (report, drawn) = run(Some(AnimateInput::Gap(0.0)));
        assert_eq!(report.trees[0].generations, 2);
        assert_eq!(report.trees[0].branches, 3);
        let counts: Vec<usize> = drawn.iter().filter(|g| g.tree == 0).map(|g| g.branch_count()).collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn failing_tree_leaves_the_others_running() {
        let stop = StopToken::new();
        let bad = scenario_scheduler(0, f64::NAN, stop.clone());
        let good = scenario_scheduler(1, 90.0, stop.clone());
        let mut forest = Forest::from_schedulers(vec![bad, good], stop);
        let mut source = SimulatedFrameSource::new(60.0);
        let mut renderer = RecordingRenderer::new(100, 100);

        let report = forest.run(&mut source, &mut renderer, None).unwrap();
        assert!(matches!(report.trees[0].status, TreeStatus::Failed(_)));
        assert_eq!(report.trees[1].status, TreeStatus::Finished);
        assert_eq!(report.trees[1].branches, 3);
    }

    #[test]
    fn frame_cap_cancels_growing_trees() {
        let stop = StopToken::new();
        let seed = BranchConfig {
            start: Vector2D::zero(),
            growth_degree: 90.0,
            length: 20.0,
            thickness: 4.0,
        };
        let config = options(None).resolve_origins().unwrap().remove(1).generation;
        let scheduler = AnimationScheduler::with_policy(0, seed, config, Box::new(Constant(true)), 0.0, stop.clone());
        let mut forest = Forest::from_schedulers(vec![scheduler], stop);
        let mut source = SimulatedFrameSource::new(60.0);
        let mut renderer = RecordingRenderer::new(100, 100);

        let report = forest.run(&mut source, &mut renderer, Some(3)).unwrap();
        assert_eq!(report.frames, 3);
        assert_eq!(report.trees[0].status, TreeStatus::Cancelled);
        assert_eq!(report.trees[0].generations, 3);
    }

    #[test]
    fn missing_surface_prevents_drawing() {
        let mut forest = Forest::from_options(&options(None), StopToken::new()).unwrap();
        let mut source = SimulatedFrameSource::new(60.0);
        let mut renderer = RecordingRenderer::new(0, 0);
        assert!(matches!(
            forest.run(&mut source, &mut renderer, None),
            Err(FractalError::Configuration(_))
        ));
        assert!(renderer.snapshots().is_empty());
        assert_eq!(source.frames_delivered(), 0);
    }
}
