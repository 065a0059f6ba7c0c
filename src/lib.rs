//! Charge resolution extraction for photon-sensor camera calibration.
//!
//! This crate computes per-pixel and per-camera charge resolution statistics
//! from calibration runs taken at known injected signal amplitudes. Run
//! files stream through a memory-bounded accumulator that maintains grouped
//! sums of squared deviations per `(pixel, true amplitude)` key and derives
//! the resolution metrics once all runs are drained.

pub mod amplitude;
pub mod pipeline;
pub mod resolution;
pub mod run_reader;
pub mod store;

// Re-exports for easier access
pub use amplitude::amplitudes_from_filenames;
pub use pipeline::{run_extraction, ExtractionConfig, ExtractionSummary};
pub use resolution::{CameraResolutionRow, ChargeResolution, PixelResolutionRow};
pub use run_reader::{RecordBatch, RunReader, DEFAULT_MEASURED_COLUMN};
pub use store::ResolutionStore;
