//! Charge resolution extraction tool.
//!
//! Builds a result store containing the charge resolution of a camera from
//! calibration run files taken at known injected amplitudes. The amplitude
//! of each run is read from the varying part of its file name.
//!
//! Usage:
//! ```
//! cargo run --release --bin extract_charge_resolution -- \
//!     -f runs/Run_10pe_dl1.csv runs/Run_50pe_dl1.csv -o resolution_store
//! ```

use charge_resolution::{run_extraction, ExtractionConfig, DEFAULT_MEASURED_COLUMN};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "extract_charge_resolution")]
#[command(about = "Create a result store containing the charge resolution")]
#[command(version)]
struct Args {
    /// Paths to the input run files
    #[arg(short = 'f', long = "files", num_args = 1.., required = true)]
    input_paths: Vec<PathBuf>,

    /// Directory to store the output tables
    #[arg(short, long)]
    output: PathBuf,

    /// Column from the input tables to use as the extracted charge
    #[arg(short, long, default_value = DEFAULT_MEASURED_COLUMN)]
    column: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ExtractionConfig {
        input_paths: args.input_paths,
        output_dir: args.output,
        measured_column: args.column,
    };

    println!("Creating result store: {}", config.output_dir.display());

    let summary = run_extraction(&config)?;

    println!(
        "Filled store with charge resolution: {} runs, {} observations",
        summary.num_runs, summary.num_observations
    );
    println!(
        "  per-pixel rows: {}, per-camera rows: {}",
        summary.num_pixel_rows, summary.num_camera_rows
    );

    Ok(())
}
