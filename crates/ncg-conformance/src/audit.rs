//! Whole-folder checks of test results against fixtures, and promotion of
//! reviewed results to fixtures.

use crate::{
    EXPECTED_RESULTS_SUFFIX, HarnessConfig, HarnessError, ResultFiles, SuiteReport,
    TEST_RESULTS_SUFFIX,
};
use ncg_compare::{CompareMode, file_compare};
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_files(root: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(root)
        .ok()
        .into_iter()
        .flat_map(|it| it.filter_map(Result::ok))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.ends_with(EXPECTED_RESULTS_SUFFIX))
        })
        .collect();
    out.sort();
    out
}

/// Compares every `*-expected_results.{json,csv}` fixture with the matching
/// test results. A fixture without test results is a failure.
#[must_use]
pub fn audit_results(config: &HarnessConfig) -> SuiteReport {
    let mut report = SuiteReport {
        suite: "results_audit",
        case_count: 0,
        pass_count: 0,
        failures: Vec::new(),
    };

    for expected in fixture_files(&config.expected_results_root) {
        report.case_count += 1;
        let Some(file_name) = expected.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let actual = config
            .test_results_root
            .join(file_name.replace(EXPECTED_RESULTS_SUFFIX, TEST_RESULTS_SUFFIX));
        let mode = if expected.extension().is_some_and(|ext| ext == "json") {
            CompareMode::JsonData
        } else {
            CompareMode::RawFile
        };

        if !actual.exists() {
            report
                .failures
                .push(format!("{file_name}: no test results at {}", actual.display()));
            continue;
        }
        match file_compare(&expected, &actual, file_name, mode) {
            Ok(()) => report.pass_count += 1,
            Err(err) => report.failures.push(err.to_string()),
        }
    }

    report
}

/// Copies the test results of `suite`/`method` over its fixtures. Both the
/// JSON and CSV forms are promoted when present.
pub fn promote_results(
    config: &HarnessConfig,
    suite: &str,
    method: &str,
) -> Result<Vec<PathBuf>, HarnessError> {
    let files = ResultFiles::new(config, suite, method);
    let pairs = [
        (files.test_results_path(), files.expected_results_path()),
        (files.test_results_csv_path(), files.expected_results_csv_path()),
    ];

    let mut promoted = Vec::new();
    for (from, to) in pairs {
        if !from.exists() {
            continue;
        }
        fs::create_dir_all(&config.expected_results_root).map_err(|source| HarnessError::Io {
            path: config.expected_results_root.clone(),
            source,
        })?;
        fs::copy(&from, &to).map_err(|source| HarnessError::Io {
            path: to.clone(),
            source,
        })?;
        promoted.push(to);
    }

    if promoted.is_empty() {
        return Err(HarnessError::Io {
            path: files.test_results_path(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no test results to promote; run the suite first",
            ),
        });
    }
    Ok(promoted)
}
