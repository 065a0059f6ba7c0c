//! Sequential extraction loop: run files in, result tables out.
//!
//! Each run file is fully drained before the next begins; within a file,
//! batches are consumed in source order. Every batch is appended to the
//! store and folded into the accumulator. There is no parallelism; the
//! accumulator's compaction threshold is the only memory bound.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use std::path::PathBuf;
use tracing::info;

use crate::amplitude::amplitudes_from_filenames;
use crate::resolution::ChargeResolution;
use crate::run_reader::{RunReader, DEFAULT_MEASURED_COLUMN};
use crate::store::ResolutionStore;

/// Inputs for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Calibration run files, one known amplitude each
    pub input_paths: Vec<PathBuf>,

    /// Output store directory
    pub output_dir: PathBuf,

    /// Input column to treat as the measured charge
    pub measured_column: String,
}

impl ExtractionConfig {
    pub fn new(input_paths: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            input_paths,
            output_dir,
            measured_column: DEFAULT_MEASURED_COLUMN.to_string(),
        }
    }
}

/// Counts reported after a successful extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionSummary {
    pub num_runs: usize,
    pub num_observations: u64,
    pub num_pixel_rows: usize,
    pub num_camera_rows: usize,
}

/// Run the full extraction: resolve amplitudes, stream every run file
/// through the store and the accumulator, then persist both result tables.
pub fn run_extraction(config: &ExtractionConfig) -> Result<ExtractionSummary> {
    let amplitudes = amplitudes_from_filenames(&config.input_paths);
    if amplitudes.len() != config.input_paths.len() {
        bail!(
            "Resolved {} amplitudes for {} input files; every run file name must carry an amplitude label",
            amplitudes.len(),
            config.input_paths.len()
        );
    }

    let mut store = ResolutionStore::create(&config.output_dir)?;
    let mut cr = ChargeResolution::new();
    let mut num_observations = 0u64;

    let pb = ProgressBar::new(config.input_paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_message("Looping over run files");

    for (path, &amplitude) in config.input_paths.iter().zip(&amplitudes) {
        let reader = RunReader::open(path, &config.measured_column)?;
        for batch in reader {
            let batch = batch?;
            store
                .append_raw(&batch, amplitude)
                .with_context(|| format!("Failed to persist batch from {}", path.display()))?;

            let true_column = Array1::from_elem(batch.len(), amplitude);
            cr.add(&batch.pixel, &true_column, &batch.measured)?;
            num_observations += batch.len() as u64;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let (pixel_rows, camera_rows) = cr.finish();
    store.write_pixel_table(&pixel_rows)?;
    store.write_camera_table(&camera_rows)?;

    let num_runs = config.input_paths.len();
    store.finish(&config.measured_column, num_runs, num_observations)?;

    info!(
        "Extracted charge resolution from {num_runs} runs ({num_observations} observations) \
         into {}",
        config.output_dir.display()
    );

    Ok(ExtractionSummary {
        num_runs,
        num_observations,
        num_pixel_rows: pixel_rows.len(),
        num_camera_rows: camera_rows.len(),
    })
}
