//! Batched columnar reader over calibration run files.
//!
//! Run files are CSV tables with a header row, one record per measured
//! event-pixel, carrying at least a `pixel` column and a measured-charge
//! column (named `charge` by default). The reader yields the file lazily as
//! columnar batches of bounded row count, in file order, so arbitrarily
//! large runs stream through a fixed memory footprint.

use ndarray::Array1;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column holding the measured charge unless configured otherwise.
pub const DEFAULT_MEASURED_COLUMN: &str = "charge";

/// Maximum rows per yielded batch.
pub const DEFAULT_BATCH_ROWS: usize = 65536;

/// Errors that can occur while reading a run file
#[derive(Error, Debug)]
pub enum RunReadError {
    #[error("failed to open run file {path}: {source}")]
    Open {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("run file {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error("failed to read record from {path}: {source}")]
    Record {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("invalid value '{value}' in column '{column}' of {path}")]
    InvalidValue {
        path: PathBuf,
        column: String,
        value: String,
    },
}

/// One columnar batch of observations from a run file.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub pixel: Array1<u32>,
    pub measured: Array1<f64>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.pixel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel.is_empty()
    }
}

/// Lazy batched reader over a single run file.
///
/// Iterating yields `Result<RecordBatch, RunReadError>` in file order until
/// the file is exhausted. Not restartable; open a new reader to re-read.
#[derive(Debug)]
pub struct RunReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    pixel_idx: usize,
    measured_idx: usize,
    batch_rows: usize,
    measured_column: String,
}

impl RunReader {
    /// Open a run file, locating the `pixel` column and the named measured
    /// column in its header.
    pub fn open(path: &Path, measured_column: &str) -> Result<Self, RunReadError> {
        Self::with_batch_rows(path, measured_column, DEFAULT_BATCH_ROWS)
    }

    /// Open a run file with an explicit batch row limit.
    pub fn with_batch_rows(
        path: &Path,
        measured_column: &str,
        batch_rows: usize,
    ) -> Result<Self, RunReadError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| RunReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let headers = reader
            .headers()
            .map_err(|source| RunReadError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .clone();

        let column_index = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| RunReadError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };
        let pixel_idx = column_index("pixel")?;
        let measured_idx = column_index(measured_column)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            pixel_idx,
            measured_idx,
            batch_rows: batch_rows.max(1),
            measured_column: measured_column.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_field<T: std::str::FromStr>(
        &self,
        record: &csv::StringRecord,
        idx: usize,
        column: &str,
    ) -> Result<T, RunReadError> {
        let raw = record.get(idx).unwrap_or("");
        raw.trim()
            .parse::<T>()
            .map_err(|_| RunReadError::InvalidValue {
                path: self.path.clone(),
                column: column.to_string(),
                value: raw.to_string(),
            })
    }
}

impl Iterator for RunReader {
    type Item = Result<RecordBatch, RunReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut pixel = Vec::with_capacity(self.batch_rows);
        let mut measured = Vec::with_capacity(self.batch_rows);

        let mut record = csv::StringRecord::new();
        while pixel.len() < self.batch_rows {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    match self.parse_field::<u32>(&record, self.pixel_idx, "pixel") {
                        Ok(p) => pixel.push(p),
                        Err(e) => return Some(Err(e)),
                    }
                    match self.parse_field::<f64>(&record, self.measured_idx, &self.measured_column) {
                        Ok(m) => measured.push(m),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Ok(false) => break,
                Err(source) => {
                    return Some(Err(RunReadError::Record {
                        path: self.path.clone(),
                        source,
                    }))
                }
            }
        }

        if pixel.is_empty() {
            return None;
        }
        Some(Ok(RecordBatch {
            pixel: Array1::from_vec(pixel),
            measured: Array1::from_vec(measured),
        }))
    }
}
