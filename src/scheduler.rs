use fractal_common::{AnimationConfig, BranchConfig, FractalError, GenerationConfig, GeometryError, ResolvedOrigin};
use log::{debug, trace};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::growth;
use crate::pruning::{self, PruningPolicy};
use crate::renderer::Renderer;

/// Cancellation flag shared between a running animation and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started yet.
    Idle,
    /// At least one generation is pending.
    Ticking,
    /// Queue exhausted, cancelled or aborted. Terminal.
    Done,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame gap has not elapsed yet.
    Waiting,
    Drew { generation: usize, branches: usize },
    /// No generation was left; the scheduler is now done.
    Finished,
    /// The stop token was set; nothing was drawn.
    Cancelled,
}

/// Paces the growth of one tree: one generation per qualifying frame.
pub struct AnimationScheduler {
    tree: usize,
    generation_config: GenerationConfig,
    pruning: Box<dyn PruningPolicy>,
    frame_gap: f64,
    queue: VecDeque<Vec<BranchConfig>>,
    /// Depth of the generation at the front of the queue.
    next_generation: usize,
    last_generation_time: f64,
    state: SchedulerState,
    stop: StopToken,
    branches_drawn: usize,
}

impl AnimationScheduler {
    /// Creates a scheduler for one resolved origin.
    pub fn new(tree: usize, origin: ResolvedOrigin, animation: &AnimationConfig, stop: StopToken) -> Result<Self, FractalError> {
        let pruning = pruning::from_config(&origin.is_alive, tree)?;
        Ok(Self::with_policy(
            tree,
            origin.draw,
            origin.generation,
            pruning,
            animation.effective_gap(),
            stop,
        ))
    }

    pub fn with_policy(
        tree: usize,
        seed: BranchConfig,
        generation_config: GenerationConfig,
        pruning: Box<dyn PruningPolicy>,
        frame_gap: f64,
        stop: StopToken,
    ) -> Self {
        Self {
            tree,
            generation_config,
            pruning,
            frame_gap,
            queue: VecDeque::from([vec![seed]]),
            next_generation: 0,
            last_generation_time: 0.0,
            state: SchedulerState::Idle,
            stop,
            branches_drawn: 0,
        }
    }

    /// Moves to `Ticking`; the first generation is drawn once `frame_gap` has passed since `now`.
    pub fn start(&mut self, now: f64) {
        if self.state == SchedulerState::Idle {
            self.last_generation_time = now;
            self.state = SchedulerState::Ticking;
            debug!("Tree {}: started at {:.1} ms (gap {:.1} ms)", self.tree, now, self.frame_gap);
        }
    }

    /// Handles one frame. An idle scheduler starts at `now`.
    ///
    /// A geometry error ends this tree's animation and is returned to the caller.
    pub fn tick<R: Renderer + ?Sized>(&mut self, now: f64, renderer: &mut R) -> Result<TickOutcome, GeometryError> {
        match self.state {
            SchedulerState::Done => return Ok(TickOutcome::Finished),
            SchedulerState::Idle => self.start(now),
            SchedulerState::Ticking => {}
        }

        if self.stop.is_stopped() {
            self.finish();
            return Ok(TickOutcome::Cancelled);
        }
        if now < self.last_generation_time + self.frame_gap {
            trace!("Tree {}: waiting at {:.1} ms", self.tree, now);
            return Ok(TickOutcome::Waiting);
        }

        match self.advance(now, renderer) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn advance<R: Renderer + ?Sized>(&mut self, now: f64, renderer: &mut R) -> Result<TickOutcome, GeometryError> {
        // An empty generation means every branch died or was pruned: nothing left to draw.
        let generation = match self.queue.pop_front() {
            Some(generation) if !generation.is_empty() => generation,
            _ => {
                debug!("Tree {}: finished after {} generations", self.tree, self.next_generation);
                self.finish();
                return Ok(TickOutcome::Finished);
            }
        };

        // Resolve all geometry first so a bad branch never leaves a half-drawn generation.
        let segments = generation
            .iter()
            .map(BranchConfig::segment)
            .collect::<Result<Vec<_>, _>>()?;
        for segment in &segments {
            renderer.draw(segment);
        }
        let drawn = self.next_generation;
        renderer.end_generation(self.tree, drawn, now);
        self.branches_drawn += segments.len();

        let child_depth = drawn + 1;
        let pruning = &mut self.pruning;
        let next: Vec<BranchConfig> = growth::step(&generation, &self.generation_config)?
            .into_iter()
            .filter(|candidate| pruning.is_alive(candidate, child_depth))
            .collect();
        debug!(
            "Tree {}: drew generation {} ({} branches) at {:.1} ms, {} queued",
            self.tree,
            drawn,
            segments.len(),
            now,
            next.len()
        );

        // Queued even when empty; the next qualifying tick then finishes the tree.
        self.queue.push_back(next);
        self.next_generation = child_depth;
        self.last_generation_time = now;
        Ok(TickOutcome::Drew {
            generation: drawn,
            branches: segments.len(),
        })
    }

    fn finish(&mut self) {
        self.queue.clear();
        self.state = SchedulerState::Done;
    }

    pub fn tree(&self) -> usize {
        self.tree
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SchedulerState::Done
    }

    /// Number of generations drawn so far.
    pub fn generations_drawn(&self) -> usize {
        self.next_generation
    }

    pub fn branches_drawn(&self) -> usize {
        self.branches_drawn
    }

    pub fn pending_generations(&self) -> usize {
        self.queue.len()
    }
}
