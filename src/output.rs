use anyhow::{Context, Result};
use fractal_common::{GenerationSnapshot, OutputConfig};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialized snapshot layouts understood by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    /// `u32` snapshot count followed by each snapshot; the layout the visualizer reads.
    Bincode,
    MessagePack,
}

impl SnapshotFormat {
    pub fn from_name(name: Option<&str>) -> Self {
        match name.unwrap_or("json") {
            "json" => SnapshotFormat::Json,
            "bincode" => SnapshotFormat::Bincode,
            "messagepack" => SnapshotFormat::MessagePack,
            other => {
                error!("Unknown output format: {}. Using JSON instead.", other);
                SnapshotFormat::Json
            }
        }
    }

    fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Bincode => "bin",
            SnapshotFormat::MessagePack => "msgpack",
        }
    }
}

pub fn snapshot_path(output: &OutputConfig, format: SnapshotFormat) -> PathBuf {
    PathBuf::from(format!("{}_generations.{}", output.base_filename, format.extension()))
}

/// Writes every recorded generation in `format` and returns the file written.
pub fn save_snapshots(snapshots: &[GenerationSnapshot], output: &OutputConfig, format: SnapshotFormat) -> Result<PathBuf> {
    let path = snapshot_path(output, format);
    let file = File::create(&path).with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        SnapshotFormat::Json => {
            serde_json::to_writer(&mut writer, snapshots).context("Error serializing snapshots to JSON")?;
        }
        SnapshotFormat::Bincode => write_bincode(&mut writer, snapshots)?,
        SnapshotFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, snapshots).context("Error serializing snapshots to MessagePack")?;
        }
    }
    writer.flush()?;
    info!("{} generations saved to {}", snapshots.len(), path.display());
    Ok(path)
}

fn write_bincode<W: Write>(writer: &mut W, snapshots: &[GenerationSnapshot]) -> Result<()> {
    let count = u32::try_from(snapshots.len()).context("Too many generations for the bincode header")?;
    bincode::serialize_into(&mut *writer, &count).context("Error writing snapshot count")?;
    for snapshot in snapshots {
        bincode::serialize_into(&mut *writer, snapshot).context("Error serializing snapshot to bincode")?;
    }
    Ok(())
}

/// One CSV row per drawn segment.
pub fn save_segments_csv<P: AsRef<Path>>(snapshots: &[GenerationSnapshot], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Error saving CSV file '{}'", path.display()))?;
    writer.write_record(["tree", "generation", "time_ms", "x0", "y0", "x1", "y1", "thickness"])?;
    for snapshot in snapshots {
        for s in &snapshot.segments {
            writer.write_record(&[
                snapshot.tree.to_string(),
                snapshot.generation.to_string(),
                format!("{:.3}", snapshot.time_ms),
                format!("{:.4}", s.start.0),
                format!("{:.4}", s.start.1),
                format!("{:.4}", s.end.0),
                format!("{:.4}", s.end.1),
                format!("{:.4}", s.thickness),
            ])?;
        }
    }
    writer.flush()?;
    info!("Segments saved to {}", path.display());
    Ok(())
}
