use fractal_common::{FractalError, GenerationSnapshot, Segment};

/// A drawing surface.
///
/// `draw` is called once per branch of a generation, followed by one
/// `end_generation` for that generation.
pub trait Renderer {
    /// Called once before anything is drawn.
    fn begin(&mut self) -> Result<(), FractalError> {
        Ok(())
    }

    fn draw(&mut self, segment: &Segment);

    fn end_generation(&mut self, _tree: usize, _generation: usize, _time_ms: f64) {}
}

/// Keeps every drawn generation so a run can be saved and replayed later.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    width: u32,
    height: u32,
    pending: Vec<Segment>,
    snapshots: Vec<GenerationSnapshot>,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Provides access to the recorded generations, in drawing order.
    pub fn snapshots(&self) -> &[GenerationSnapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<GenerationSnapshot> {
        self.snapshots
    }

    pub fn segment_count(&self) -> usize {
        self.snapshots.iter().map(GenerationSnapshot::branch_count).sum()
    }
}

impl Renderer for RecordingRenderer {
    fn begin(&mut self) -> Result<(), FractalError> {
        if self.width == 0 || self.height == 0 {
            return Err(FractalError::Configuration(format!(
                "no drawing surface: canvas is {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    fn draw(&mut self, segment: &Segment) {
        self.pending.push(*segment);
    }

    fn end_generation(&mut self, tree: usize, generation: usize, time_ms: f64) {
        self.snapshots.push(GenerationSnapshot {
            tree,
            generation,
            time_ms,
            segments: std::mem::take(&mut self.pending),
        });
    }
}
