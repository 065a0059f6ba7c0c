//! Directory-backed store for raw observations and result tables.
//!
//! One extraction produces a single output directory holding:
//! - `charge.csv` — every raw observation batch, appended in ingestion
//!   order and tagged with its run's true amplitude
//! - `charge_resolution_pixel.csv` — the per-pixel result table
//! - `charge_resolution_camera.csv` — the per-camera result table
//! - `store.json` — a small manifest describing the extraction

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::resolution::{CameraResolutionRow, PixelResolutionRow};
use crate::run_reader::RecordBatch;

pub const RAW_TABLE: &str = "charge.csv";
pub const PIXEL_TABLE: &str = "charge_resolution_pixel.csv";
pub const CAMERA_TABLE: &str = "charge_resolution_camera.csv";
pub const MANIFEST: &str = "store.json";

/// Manifest describing one finished extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Input column used as the measured charge
    pub measured_column: String,

    /// Number of run files ingested
    pub num_runs: usize,

    /// Total observations across all runs
    pub num_observations: u64,

    /// Creation time (Unix epoch seconds)
    pub timestamp: u64,
}

#[derive(Serialize)]
struct RawRecord {
    pixel: u32,
    #[serde(rename = "true")]
    true_pe: f64,
    measured: f64,
}

/// Output store for one extraction run.
///
/// The raw table is held open for incremental appends; the result tables are
/// written whole at finalization. A pre-existing store at the same path is
/// overwritten.
pub struct ResolutionStore {
    dir: PathBuf,
    raw: csv::Writer<File>,
}

impl ResolutionStore {
    /// Create the output directory (and parents) and start a fresh raw table.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        let raw_path = dir.join(RAW_TABLE);
        let raw = csv::Writer::from_path(&raw_path)
            .with_context(|| format!("Failed to create raw table: {}", raw_path.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            raw,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one raw observation batch, tagged with its true amplitude.
    pub fn append_raw(&mut self, batch: &RecordBatch, true_pe: f64) -> Result<()> {
        for (&pixel, &measured) in batch.pixel.iter().zip(batch.measured.iter()) {
            self.raw
                .serialize(RawRecord {
                    pixel,
                    true_pe,
                    measured,
                })
                .context("Failed to append raw observation")?;
        }
        Ok(())
    }

    /// Write the per-pixel result table.
    pub fn write_pixel_table(&self, rows: &[PixelResolutionRow]) -> Result<()> {
        write_table(&self.dir.join(PIXEL_TABLE), rows)
    }

    /// Write the per-camera result table.
    pub fn write_camera_table(&self, rows: &[CameraResolutionRow]) -> Result<()> {
        write_table(&self.dir.join(CAMERA_TABLE), rows)
    }

    /// Flush the raw table and write the manifest, closing the store.
    pub fn finish(mut self, measured_column: &str, num_runs: usize, num_observations: u64) -> Result<()> {
        self.raw.flush().context("Failed to flush raw table")?;

        let manifest = StoreManifest {
            measured_column: measured_column.to_string(),
            num_runs,
            num_observations,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let path = self.dir.join(MANIFEST);
        let json = serde_json::to_string_pretty(&manifest)
            .context("Failed to serialize store manifest")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create table: {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush table: {}", path.display()))?;
    Ok(())
}
