//! End-to-end extraction over synthetic calibration runs.

use approx::assert_relative_eq;
use charge_resolution::{run_extraction, ExtractionConfig};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_run_file(dir: &Path, name: &str, rows: &[(u32, f64)]) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "pixel,charge").unwrap();
    for (pixel, charge) in rows {
        writeln!(file, "{pixel},{charge}").unwrap();
    }
    path
}

fn read_table(path: &Path) -> Vec<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}

#[test]
fn test_extraction_over_three_runs() {
    let temp = TempDir::new().unwrap();

    // Runs at 10, 50 and 2.5 pe. The amplitude labels must differ in every
    // character, otherwise the shared part joins the common prefix/suffix
    // and is stripped from the label ("10" and "50" alone would resolve as
    // 1 and 5).
    let run_10 = write_run_file(
        temp.path(),
        "Run_10pe_dl1.csv",
        &[(0, 11.0), (1, 10.0), (0, 9.0), (1, 10.0)],
    );
    let run_50 = write_run_file(
        temp.path(),
        "Run_50pe_dl1.csv",
        &[(0, 53.0), (1, 47.0)],
    );
    let run_2_5 = write_run_file(
        temp.path(),
        "Run_2.5pe_dl1.csv",
        &[(0, 3.0), (1, 2.0)],
    );

    let output_dir = temp.path().join("store");
    let config = ExtractionConfig::new(vec![run_10, run_50, run_2_5], output_dir.clone());
    let summary = run_extraction(&config).unwrap();

    assert_eq!(summary.num_runs, 3);
    assert_eq!(summary.num_observations, 8);
    assert_eq!(summary.num_pixel_rows, 6);
    assert_eq!(summary.num_camera_rows, 3);

    // Raw table holds every observation, in ingestion order, tagged with
    // its run's amplitude.
    let raw = read_table(&output_dir.join("charge.csv"));
    assert_eq!(raw.len(), 8);
    assert_eq!(raw[0]["pixel"], "0");
    assert_eq!(raw[0]["true"], "10.0");
    assert_eq!(raw[0]["measured"], "11.0");
    assert_eq!(raw[4]["true"], "50.0");
    assert_eq!(raw[6]["true"], "2.5");

    // Per-pixel table: pixel 0 at 10 pe saw deviations +1 and -1.
    let pixel_table = read_table(&output_dir.join("charge_resolution_pixel.csv"));
    let p0_at_10 = pixel_table
        .iter()
        .find(|r| r["pixel"] == "0" && r["true"] == "10.0")
        .unwrap();
    assert_relative_eq!(p0_at_10["sum_sq_dev"].parse::<f64>().unwrap(), 2.0);
    assert_eq!(p0_at_10["n"], "2");
    assert_relative_eq!(p0_at_10["rmse_abs"].parse::<f64>().unwrap(), 1.0);
    assert_relative_eq!(p0_at_10["rmse"].parse::<f64>().unwrap(), 0.1);
    assert_relative_eq!(
        p0_at_10["charge_resolution_abs"].parse::<f64>().unwrap(),
        11.0_f64.sqrt(),
        max_relative = 1e-12
    );

    let p1_at_10 = pixel_table
        .iter()
        .find(|r| r["pixel"] == "1" && r["true"] == "10.0")
        .unwrap();
    assert_relative_eq!(p1_at_10["sum_sq_dev"].parse::<f64>().unwrap(), 0.0);
    assert_eq!(p1_at_10["n"], "2");

    // Per-camera table sums the pixel rows per amplitude.
    let camera_table = read_table(&output_dir.join("charge_resolution_camera.csv"));
    let cam_10 = camera_table.iter().find(|r| r["true"] == "10.0").unwrap();
    assert_relative_eq!(cam_10["sum_sq_dev"].parse::<f64>().unwrap(), 2.0);
    assert_eq!(cam_10["n"], "4");
    let cam_50 = camera_table.iter().find(|r| r["true"] == "50.0").unwrap();
    assert_relative_eq!(cam_50["sum_sq_dev"].parse::<f64>().unwrap(), 18.0);
    assert_eq!(cam_50["n"], "2");
    let cam_2_5 = camera_table.iter().find(|r| r["true"] == "2.5").unwrap();
    assert_relative_eq!(cam_2_5["sum_sq_dev"].parse::<f64>().unwrap(), 0.5);
    assert_eq!(cam_2_5["n"], "2");

    // Manifest records the extraction parameters.
    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(output_dir.join("store.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["measured_column"], "charge");
    assert_eq!(manifest["num_runs"], 3);
    assert_eq!(manifest["num_observations"], 8);
}

#[test]
fn test_amplitude_count_mismatch_aborts_before_output() {
    let temp = TempDir::new().unwrap();

    // A single run file leaves no varying name part to parse, so amplitude
    // resolution yields nothing and the extraction must fail fast.
    let run = write_run_file(temp.path(), "Run_10pe_dl1.csv", &[(0, 10.0)]);
    let output_dir = temp.path().join("store");
    let config = ExtractionConfig::new(vec![run], output_dir.clone());

    let err = run_extraction(&config).unwrap_err();
    assert!(err.to_string().contains("amplitude"));
    assert!(!output_dir.exists());
}

#[test]
fn test_missing_measured_column_is_fatal() {
    let temp = TempDir::new().unwrap();
    let run_10 = write_run_file(temp.path(), "Run_10pe.csv", &[(0, 10.0)]);
    let run_50 = write_run_file(temp.path(), "Run_50pe.csv", &[(0, 50.0)]);

    let mut config = ExtractionConfig::new(
        vec![run_10, run_50],
        temp.path().join("store"),
    );
    config.measured_column = "charge_cc".to_string();

    let err = run_extraction(&config).unwrap_err();
    assert!(err.to_string().contains("charge_cc"));
}
