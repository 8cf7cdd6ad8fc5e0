use anyhow::Result;
use log::{debug, error, info, warn};
use std::time::Instant;

// Define modules used by main
mod forest;
mod frame;
mod growth;
mod output;
mod pruning;
mod renderer;
mod scheduler;

use forest::{Forest, TreeStatus};
use fractal_common::FractalConfig;
use frame::{FrameSource, RealtimeFrameSource, SimulatedFrameSource};
use output::SnapshotFormat;
use renderer::RecordingRenderer;
use scheduler::StopToken;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Fractal Tree Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = FractalConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);
    debug!("Configuration: {:#?}", config);

    // --- Seed the trees ---
    let mut forest = Forest::from_options(&config.tree, StopToken::new())?;
    let mut renderer = RecordingRenderer::new(config.canvas.width, config.canvas.height);

    let mut source: Box<dyn FrameSource> = if config.frames.realtime {
        info!("Pacing frames on the wall clock at {} Hz.", config.frames.refresh_rate_hz);
        Box::new(RealtimeFrameSource::new(config.frames.refresh_rate_hz))
    } else {
        info!("Pacing frames on a simulated {} Hz clock.", config.frames.refresh_rate_hz);
        Box::new(SimulatedFrameSource::new(config.frames.refresh_rate_hz))
    };

    // --- Animation Loop ---
    let start_time = Instant::now();
    let report = forest.run(source.as_mut(), &mut renderer, config.frames.max_frames)?;
    let total_duration = start_time.elapsed();

    info!(
        "Animation finished in {:.3} seconds: {} frames, {} generations drawn, {} branches.",
        total_duration.as_secs_f64(),
        report.frames,
        renderer.snapshots().len(),
        renderer.segment_count()
    );
    debug!("Branches per tree total: {}", report.total_branches());
    for tree in &report.trees {
        match &tree.status {
            TreeStatus::Failed(e) => error!("Tree {} failed after {} generations: {}", tree.tree, tree.generations, e),
            TreeStatus::Cancelled => warn!("Tree {} was stopped after {} generations.", tree.tree, tree.generations),
            _ => info!("Tree {}: {} generations, {} branches.", tree.tree, tree.generations, tree.branches),
        }
    }

    // --- Save Recorded Data ---
    info!("Saving recorded data...");
    let snapshots = renderer.snapshots();
    if config.output.save_snapshots {
        let format = SnapshotFormat::from_name(config.output.format.as_deref());
        output::save_snapshots(snapshots, &config.output, format)?;
    } else {
        info!("Skipping saving generations as per config (save_snapshots is false).");
    }

    if config.output.save_segments_csv {
        let filename = format!("{}_segments.csv", config.output.base_filename);
        if let Err(e) = output::save_segments_csv(snapshots, &filename) {
            error!("Error saving CSV file '{}': {:#}", filename, e);
        }
    } else {
        info!("Skipping saving segments as per config.");
    }

    info!("Fractal Tree Complete.");
    Ok(())
}
