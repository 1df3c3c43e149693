use anyhow::{Context, Result};
use brownian_common::Snapshot;
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialization formats supported for snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
    MessagePack,
}

impl SnapshotFormat {
    /// Resolves the configured format name, falling back to JSON for unknown names.
    pub fn from_config(name: Option<&str>) -> Self {
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

    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Bincode => "bin",
            SnapshotFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes all snapshots to `<base>_snapshots.<ext>` and returns the file path.
pub fn save_snapshots(base_filename: &str, format: SnapshotFormat, snapshots: &[Snapshot]) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_snapshots.{}", base_filename, format.extension()));
    let file = File::create(&path)
        .with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        SnapshotFormat::Json => serde_json::to_writer(&mut writer, snapshots)
            .context("Error serializing snapshots to JSON")?,
        SnapshotFormat::Bincode => bincode::serialize_into(&mut writer, snapshots)
            .context("Error serializing snapshots to bincode")?,
        SnapshotFormat::MessagePack => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Error serializing snapshots to MessagePack")?,
    }
    writer.flush()?;

    info!("All snapshots saved to {} ({:?} format)", path.display(), format);
    Ok(path)
}

/// Writes final agent positions as CSV with an `x,y,z` header.
pub fn save_final_positions<P: AsRef<Path>>(path: P, positions: &[[f64; 3]]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating CSV file '{}'", path.display()))?;
    writer.write_record(["x", "y", "z"])?;
    for [x, y, z] in positions {
        writer.write_record(&[format!("{:.6}", x), format!("{:.6}", y), format!("{:.6}", z)])?;
    }
    writer.flush()?;
    info!("Final positions saved to {}", path.display());
    Ok(())
}
