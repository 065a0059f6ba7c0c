//! Charge resolution accumulation for photon-sensor calibration runs.
//!
//! Calibration runs illuminate the camera at a known injected amplitude; each
//! event yields one measured charge per pixel. This module accumulates the
//! squared deviation between measured and true charge per `(pixel, true)`
//! key across arbitrarily many runs without holding the full dataset in
//! memory, and derives the resolution metrics at two granularities:
//! - **Per pixel**: one row per `(pixel, true)` key
//! - **Per camera**: one row per distinct true amplitude, summed over pixels
//!
//! Incoming batches are buffered as increment tables and periodically
//! amalgamated into an ordered merged table once their estimated footprint
//! crosses a byte threshold, bounding peak memory at the cost of repeated
//! grouped merges.

use ndarray::Array1;
use serde::Serialize;
use std::collections::BTreeMap;
use std::mem;
use thiserror::Error;

/// Estimated pending-batch footprint (bytes) that triggers amalgamation.
pub const DEFAULT_COMPACTION_BYTES: usize = 500_000_000;

/// Errors that can occur while accumulating observations
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error(
        "column length mismatch: pixel has {pixel} rows, true has {true_pe}, measured has {measured}"
    )]
    ColumnLengthMismatch {
        pixel: usize,
        true_pe: usize,
        measured: usize,
    },
}

/// Aggregated state for one `(pixel, true)` key.
///
/// Created lazily on the first observation for its key; `sum_sq_dev` and `n`
/// only ever grow until the accumulator is finished.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    true_pe: f64,
    sum_sq_dev: f64,
    n: u64,
}

/// One not-yet-merged increment table: the rows of a single `add` call,
/// each carrying an implicit count of 1.
struct IncrementBatch {
    pixel: Vec<u32>,
    true_pe: Vec<f64>,
    sum_sq_dev: Vec<f64>,
}

impl IncrementBatch {
    /// Estimated in-memory footprint, counting the implicit count column.
    fn estimated_bytes(&self) -> usize {
        self.pixel.len()
            * (mem::size_of::<u32>() + 2 * mem::size_of::<f64>() + mem::size_of::<u64>())
    }
}

/// Per-pixel result row: cumulative statistics plus derived metrics for one
/// `(pixel, true)` key.
#[derive(Debug, Clone, Serialize)]
pub struct PixelResolutionRow {
    pub pixel: u32,
    #[serde(rename = "true")]
    pub true_pe: f64,
    pub sum_sq_dev: f64,
    pub n: u64,
    pub rmse: f64,
    pub rmse_abs: f64,
    pub charge_resolution: f64,
    pub charge_resolution_abs: f64,
}

/// Per-camera result row: statistics summed across all pixels sharing a
/// true amplitude, with the same derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CameraResolutionRow {
    #[serde(rename = "true")]
    pub true_pe: f64,
    pub sum_sq_dev: f64,
    pub n: u64,
    pub rmse: f64,
    pub rmse_abs: f64,
    pub charge_resolution: f64,
    pub charge_resolution_abs: f64,
}

/// Streaming charge resolution accumulator.
///
/// Ingests columnar batches of (pixel, true, measured) observations via
/// [`add`](Self::add), keeps the grouped running statistics bounded in
/// memory via [`amalgamate`](Self::amalgamate), and derives the result
/// tables in [`finish`](Self::finish). Exclusively owned by the processing
/// loop; `finish` consumes it, so no further observations can be added once
/// the tables have been produced.
///
/// Amplitudes are grouping labels, constant across a run file, so buckets
/// are keyed by the exact bit pattern of the true value.
pub struct ChargeResolution {
    pending: Vec<IncrementBatch>,
    pending_bytes: usize,
    merged: BTreeMap<(u32, u64), Bucket>,
    compaction_threshold: usize,
}

impl Default for ChargeResolution {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargeResolution {
    /// Create an empty accumulator with the default compaction threshold.
    pub fn new() -> Self {
        Self::with_compaction_threshold(DEFAULT_COMPACTION_BYTES)
    }

    /// Create an empty accumulator that amalgamates once the pending batches
    /// are estimated to exceed `threshold_bytes`.
    pub fn with_compaction_threshold(threshold_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            pending_bytes: 0,
            merged: BTreeMap::new(),
            compaction_threshold: threshold_bytes,
        }
    }

    /// Root mean squared error, not normalized by the true charge.
    pub fn rmse_abs(sum_sq_dev: f64, n: u64) -> f64 {
        (sum_sq_dev / n as f64).sqrt()
    }

    /// Root mean squared error as a fraction of the true charge.
    ///
    /// Non-finite for `true_pe == 0`, per IEEE division semantics.
    pub fn rmse(true_pe: f64, sum_sq_dev: f64, n: u64) -> f64 {
        Self::rmse_abs(sum_sq_dev, n) / true_pe.abs()
    }

    /// Charge resolution in charge units.
    ///
    /// The raw true charge is added to the mean squared deviation before the
    /// square root: the injected signal contributes Poisson variance equal to
    /// its own mean. This exact formula defines the metric's published
    /// meaning.
    pub fn charge_res_abs(true_pe: f64, sum_sq_dev: f64, n: u64) -> f64 {
        (sum_sq_dev / n as f64 + true_pe).sqrt()
    }

    /// Charge resolution as a fraction of the true charge.
    pub fn charge_res(true_pe: f64, sum_sq_dev: f64, n: u64) -> f64 {
        Self::charge_res_abs(true_pe, sum_sq_dev, n) / true_pe.abs()
    }

    /// Add one batch of observations as equal-length columns.
    ///
    /// Computes the squared deviation per row and appends an increment table
    /// with one count per row. Triggers [`amalgamate`](Self::amalgamate)
    /// before returning if the estimated pending footprint exceeds the
    /// compaction threshold.
    pub fn add(
        &mut self,
        pixel: &Array1<u32>,
        true_pe: &Array1<f64>,
        measured: &Array1<f64>,
    ) -> Result<(), ResolutionError> {
        if pixel.len() != true_pe.len() || pixel.len() != measured.len() {
            return Err(ResolutionError::ColumnLengthMismatch {
                pixel: pixel.len(),
                true_pe: true_pe.len(),
                measured: measured.len(),
            });
        }

        let sum_sq_dev: Vec<f64> = measured
            .iter()
            .zip(true_pe.iter())
            .map(|(&m, &t)| (m - t).powi(2))
            .collect();

        let batch = IncrementBatch {
            pixel: pixel.to_vec(),
            true_pe: true_pe.to_vec(),
            sum_sq_dev,
        };
        self.pending_bytes += batch.estimated_bytes();
        self.pending.push(batch);

        if self.pending_bytes > self.compaction_threshold {
            self.amalgamate();
        }

        Ok(())
    }

    /// Fold every pending increment table into the merged table.
    ///
    /// Groups by `(pixel, true)` and sums `(sum_sq_dev, n)` within each
    /// group. Clears the pending set and resets its byte estimate. Calling
    /// this with nothing pending changes nothing observable; the merged
    /// state depends only on the multiset of observations added so far, not
    /// on batch boundaries or compaction timing.
    pub fn amalgamate(&mut self) {
        for batch in self.pending.drain(..) {
            for i in 0..batch.pixel.len() {
                let true_pe = batch.true_pe[i];
                let bucket = self
                    .merged
                    .entry((batch.pixel[i], true_pe.to_bits()))
                    .or_insert(Bucket {
                        true_pe,
                        sum_sq_dev: 0.0,
                        n: 0,
                    });
                bucket.sum_sq_dev += batch.sum_sq_dev[i];
                bucket.n += 1;
            }
        }
        self.pending_bytes = 0;
    }

    /// Flush pending data and derive both result tables.
    ///
    /// Consumes the accumulator: the per-pixel table has the metrics for
    /// every `(pixel, true)` key, the per-camera table for every distinct
    /// true amplitude with statistics summed across pixels. Rows are ordered
    /// by key.
    pub fn finish(mut self) -> (Vec<PixelResolutionRow>, Vec<CameraResolutionRow>) {
        self.amalgamate();

        let pixel_rows: Vec<PixelResolutionRow> = self
            .merged
            .iter()
            .map(|(&(pixel, _), bucket)| PixelResolutionRow {
                pixel,
                true_pe: bucket.true_pe,
                sum_sq_dev: bucket.sum_sq_dev,
                n: bucket.n,
                rmse: Self::rmse(bucket.true_pe, bucket.sum_sq_dev, bucket.n),
                rmse_abs: Self::rmse_abs(bucket.sum_sq_dev, bucket.n),
                charge_resolution: Self::charge_res(bucket.true_pe, bucket.sum_sq_dev, bucket.n),
                charge_resolution_abs: Self::charge_res_abs(
                    bucket.true_pe,
                    bucket.sum_sq_dev,
                    bucket.n,
                ),
            })
            .collect();

        // Regroup by true amplitude alone, discarding the pixel id.
        let mut camera: BTreeMap<u64, Bucket> = BTreeMap::new();
        for bucket in self.merged.values() {
            let entry = camera.entry(bucket.true_pe.to_bits()).or_insert(Bucket {
                true_pe: bucket.true_pe,
                sum_sq_dev: 0.0,
                n: 0,
            });
            entry.sum_sq_dev += bucket.sum_sq_dev;
            entry.n += bucket.n;
        }

        let camera_rows: Vec<CameraResolutionRow> = camera
            .values()
            .map(|bucket| CameraResolutionRow {
                true_pe: bucket.true_pe,
                sum_sq_dev: bucket.sum_sq_dev,
                n: bucket.n,
                rmse: Self::rmse(bucket.true_pe, bucket.sum_sq_dev, bucket.n),
                rmse_abs: Self::rmse_abs(bucket.sum_sq_dev, bucket.n),
                charge_resolution: Self::charge_res(bucket.true_pe, bucket.sum_sq_dev, bucket.n),
                charge_resolution_abs: Self::charge_res_abs(
                    bucket.true_pe,
                    bucket.sum_sq_dev,
                    bucket.n,
                ),
            })
            .collect();

        (pixel_rows, camera_rows)
    }

    /// Number of distinct `(pixel, true)` keys merged so far.
    ///
    /// Excludes pending batches that have not been amalgamated yet.
    pub fn num_merged_buckets(&self) -> usize {
        self.merged.len()
    }
}
