#![forbid(unsafe_code)]

pub mod audit;
pub mod logs;
pub mod regression;
pub mod standard;

pub use audit::{audit_results, promote_results};
pub use logs::{CASE_LOG_ENV, CaseLogEntry, SuiteLogEntry, set_case_log_path};
pub use regression::{RegressionReport, RegressionTest};
pub use standard::{
    AttributeValue, Model, ModelApi, PrototypeRequest, Standard, StandardError, TableModelApi,
};

use ncg_cases::{CaseError, MergePolicy};
use ncg_compare::{CompareError, ComparisonFailure};
use ncg_signif::DEFAULT_SIGNIFICANT_DIGITS;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXPECTED_RESULTS_SUFFIX: &str = "-expected_results";
pub const TEST_RESULTS_SUFFIX: &str = "-test_results";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub expected_results_root: PathBuf,
    pub test_results_root: PathBuf,
    pub output_root: PathBuf,
    pub significant_digits: u32,
    pub merge_policy: MergePolicy,
    pub save_intermediate_outputs: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let crate_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            expected_results_root: crate_root.join("fixtures/expected_results"),
            test_results_root: crate_root.join("target-results/test_results"),
            output_root: crate_root.join("target-results/output"),
            significant_digits: DEFAULT_SIGNIFICANT_DIGITS,
            merge_policy: MergePolicy::default(),
            save_intermediate_outputs: false,
        }
    }

    /// `expected_results`, `test_results` and `output` folders side by side
    /// under `dir`.
    #[must_use]
    pub fn for_test_dir(dir: &Path) -> Self {
        Self {
            expected_results_root: dir.join("expected_results"),
            test_results_root: dir.join("test_results"),
            output_root: dir.join("output"),
            ..Self::default_paths()
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// File names for one suite method, all rooted at the lowercased
/// `<suite>-<method>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFiles {
    file_root: String,
    method: String,
    expected_results_root: PathBuf,
    test_results_root: PathBuf,
    output_root: PathBuf,
}

impl ResultFiles {
    #[must_use]
    pub fn new(config: &HarnessConfig, suite: &str, method: &str) -> Self {
        Self {
            file_root: format!("{suite}-{method}").to_lowercase(),
            method: method.to_string(),
            expected_results_root: config.expected_results_root.clone(),
            test_results_root: config.test_results_root.clone(),
            output_root: config.output_root.clone(),
        }
    }

    #[must_use]
    pub fn file_root(&self) -> &str {
        &self.file_root
    }

    #[must_use]
    pub fn test_results_path(&self) -> PathBuf {
        self.test_results_root
            .join(format!("{}{TEST_RESULTS_SUFFIX}.json", self.file_root))
    }

    #[must_use]
    pub fn expected_results_path(&self) -> PathBuf {
        self.expected_results_root
            .join(format!("{}{EXPECTED_RESULTS_SUFFIX}.json", self.file_root))
    }

    #[must_use]
    pub fn test_results_csv_path(&self) -> PathBuf {
        self.test_results_root
            .join(format!("{}{TEST_RESULTS_SUFFIX}.csv", self.file_root))
    }

    #[must_use]
    pub fn expected_results_csv_path(&self) -> PathBuf {
        self.expected_results_root
            .join(format!("{}{EXPECTED_RESULTS_SUFFIX}.csv", self.file_root))
    }

    /// Scratch folder shared by the cases of this method.
    #[must_use]
    pub fn method_output_dir(&self) -> PathBuf {
        self.output_root.join(&self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub expected_results_present: bool,
    pub fixture_count: usize,
    pub test_results_count: usize,
    pub significant_digits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: &'static str,
    pub case_count: usize,
    pub pass_count: usize,
    pub failures: Vec<String>,
}

impl SuiteReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.case_count == self.pass_count && self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Cases(#[from] CaseError),
    #[error(
        "expected results fixture {} does not exist; review the test results and promote them",
        .0.display()
    )]
    FixtureMissing(PathBuf),
    #[error(transparent)]
    Mismatch(ComparisonFailure),
    #[error(transparent)]
    Compare(CompareError),
    #[error("failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed serializing results: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Log(String),
}

impl From<CompareError> for HarnessError {
    fn from(err: CompareError) -> Self {
        match err {
            CompareError::FixtureMissing(path) => Self::FixtureMissing(path),
            CompareError::Mismatch(failure) => Self::Mismatch(failure),
            other => Self::Compare(other),
        }
    }
}

impl From<ComparisonFailure> for HarnessError {
    fn from(failure: ComparisonFailure) -> Self {
        Self::Mismatch(failure)
    }
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| HarnessError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn count_files_with_suffix(root: &Path, suffix: &str) -> usize {
    fs::read_dir(root)
        .ok()
        .into_iter()
        .flat_map(|it| it.filter_map(Result::ok))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.contains(suffix))
        })
        .count()
}

#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    HarnessReport {
        suite: "smoke",
        expected_results_present: config.expected_results_root.is_dir(),
        fixture_count: count_files_with_suffix(
            &config.expected_results_root,
            EXPECTED_RESULTS_SUFFIX,
        ),
        test_results_count: count_files_with_suffix(&config.test_results_root, TEST_RESULTS_SUFFIX),
        significant_digits: config.significant_digits,
    }
}

#[cfg(test)]
mod tests {
    use super::{HarnessConfig, HarnessError, ResultFiles, run_smoke};
    use ncg_compare::{CompareError, ComparisonFailure};
    use std::path::{Path, PathBuf};

    #[test]
    fn result_files_are_lowercased_and_suffixed() {
        let config = HarnessConfig::for_test_dir(Path::new("/work/necb/chiller"));
        let files = ResultFiles::new(&config, "NECB_HVAC_Chiller_Test", "test_NECB_chiller_cop");
        assert_eq!(files.file_root(), "necb_hvac_chiller_test-test_necb_chiller_cop");
        assert_eq!(
            files.test_results_path(),
            PathBuf::from(
                "/work/necb/chiller/test_results/necb_hvac_chiller_test-test_necb_chiller_cop-test_results.json"
            )
        );
        assert_eq!(
            files.expected_results_csv_path(),
            PathBuf::from(
                "/work/necb/chiller/expected_results/necb_hvac_chiller_test-test_necb_chiller_cop-expected_results.csv"
            )
        );
        assert_eq!(
            files.method_output_dir(),
            PathBuf::from("/work/necb/chiller/output/test_NECB_chiller_cop")
        );
    }

    #[test]
    fn default_paths_are_anchored_on_the_crate() {
        let config = HarnessConfig::default();
        assert!(config.expected_results_root.ends_with("fixtures/expected_results"));
        assert_eq!(config.significant_digits, 3);
        assert!(!config.save_intermediate_outputs);
    }

    #[test]
    fn smoke_counts_fixtures_in_a_scratch_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HarnessConfig::for_test_dir(dir.path());
        let empty = run_smoke(&config);
        assert!(!empty.expected_results_present);
        assert_eq!(empty.fixture_count, 0);

        std::fs::create_dir_all(&config.expected_results_root).expect("mkdir");
        std::fs::write(
            config.expected_results_root.join("a-b-expected_results.json"),
            "{}",
        )
        .expect("write");
        std::fs::write(config.expected_results_root.join("notes.txt"), "x").expect("write");
        let report = run_smoke(&config);
        assert!(report.expected_results_present);
        assert_eq!(report.fixture_count, 1);
        assert_eq!(report.test_results_count, 0);
    }

    #[test]
    fn compare_errors_map_onto_harness_errors() {
        let missing: HarnessError =
            CompareError::FixtureMissing(PathBuf::from("x-expected_results.json")).into();
        assert!(matches!(missing, HarnessError::FixtureMissing(_)));

        let failure = ComparisonFailure {
            message: "differs".to_string(),
            mismatches: Vec::new(),
        };
        let mismatch: HarnessError = CompareError::Mismatch(failure).into();
        assert!(matches!(mismatch, HarnessError::Mismatch(_)));
    }
}
