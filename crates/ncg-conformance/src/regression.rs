use crate::logs::{
    CaseLogEntry, SuiteLogEntry, maybe_append_case_log, maybe_append_suite_log, now_unix_ms,
};
use crate::{HarnessConfig, HarnessError, ResultFiles, write_file};
use ncg_cases::{
    AxisSpec, CaseInvocation, CaseTree, REFERENCE_KEY, RunOutcome, make_test_cases, run_cases,
    run_cases_parallel,
};
use ncg_compare::{compare_files, compare_results, load_fixture};
use ncg_signif::normalize_value;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// One suite method: a case tree, the static parameters handed to every
/// case, and the files its results are written to and checked against.
#[derive(Debug, Clone)]
pub struct RegressionTest {
    config: HarnessConfig,
    suite: String,
    method: String,
    files: ResultFiles,
    static_pars: Map<String, Value>,
    cases: CaseTree,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionReport {
    pub suite: String,
    pub test_method: String,
    pub case_count: usize,
    pub error_count: usize,
    pub results_path: PathBuf,
    /// Normalized results as written to `results_path`.
    pub results: Value,
}

impl RegressionTest {
    #[must_use]
    pub fn new(config: &HarnessConfig, suite: &str, method: &str) -> Self {
        let files = ResultFiles::new(config, suite, method);
        let mut static_pars = Map::new();
        static_pars.insert("test_method".to_string(), Value::String(method.to_string()));
        static_pars.insert(
            "save_intermediate_outputs".to_string(),
            Value::Bool(config.save_intermediate_outputs),
        );
        static_pars.insert(
            "output_folder".to_string(),
            Value::String(files.method_output_dir().display().to_string()),
        );
        Self {
            config: config.clone(),
            suite: suite.to_string(),
            method: method.to_string(),
            files,
            static_pars,
            cases: CaseTree::new(),
        }
    }

    #[must_use]
    pub fn static_par(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.static_pars.insert(key.into(), value.into());
        self
    }

    /// Attaches a `Reference` note to the branch at `path`.
    pub fn reference(mut self, path: &[&str], text: &str) -> Result<Self, HarnessError> {
        self.cases
            .annotate(path, REFERENCE_KEY, Value::String(text.to_string()))?;
        Ok(self)
    }

    /// Expands `spec` and merges it into the case tree under the configured
    /// merge policy.
    pub fn cases(mut self, spec: &AxisSpec) -> Result<Self, HarnessError> {
        let generated = make_test_cases(spec)?;
        self.cases.merge(generated, self.config.merge_policy)?;
        Ok(self)
    }

    #[must_use]
    pub fn case_tree(&self) -> &CaseTree {
        &self.cases
    }

    #[must_use]
    pub fn static_pars(&self) -> &Map<String, Value> {
        &self.static_pars
    }

    #[must_use]
    pub fn files(&self) -> &ResultFiles {
        &self.files
    }

    /// Runs every case in depth-first order, writes the normalized results
    /// and compares them with the JSON fixture.
    pub fn run<F, E>(&self, callback: F) -> Result<RegressionReport, HarnessError>
    where
        F: FnMut(&CaseInvocation) -> Result<Value, E>,
        E: Display,
    {
        self.log_started()?;
        let outcome = run_cases(&self.cases, &self.static_pars, callback);
        self.check_json(&outcome)
    }

    /// [`run`](Self::run) with the cases executed on the rayon pool.
    pub fn run_parallel<F, E>(&self, callback: F) -> Result<RegressionReport, HarnessError>
    where
        F: Fn(&CaseInvocation) -> Result<Value, E> + Sync,
        E: Display,
    {
        self.log_started()?;
        let outcome = run_cases_parallel(&self.cases, &self.static_pars, callback);
        self.check_json(&outcome)
    }

    /// Like [`run`](Self::run) but the normalized results are rendered to
    /// text by `render` and compared line by line with the `.csv` fixture.
    pub fn run_csv<F, E, R>(
        &self,
        callback: F,
        render: R,
    ) -> Result<RegressionReport, HarnessError>
    where
        F: FnMut(&CaseInvocation) -> Result<Value, E>,
        E: Display,
        R: FnOnce(&Value) -> String,
    {
        self.log_started()?;
        let outcome = run_cases(&self.cases, &self.static_pars, callback);
        self.check_csv(&outcome, render)
    }

    pub fn run_csv_parallel<F, E, R>(
        &self,
        callback: F,
        render: R,
    ) -> Result<RegressionReport, HarnessError>
    where
        F: Fn(&CaseInvocation) -> Result<Value, E> + Sync,
        E: Display,
        R: FnOnce(&Value) -> String,
    {
        self.log_started()?;
        let outcome = run_cases_parallel(&self.cases, &self.static_pars, callback);
        self.check_csv(&outcome, render)
    }

    fn log_started(&self) -> Result<(), HarnessError> {
        maybe_append_suite_log(&SuiteLogEntry {
            suite: self.suite.clone(),
            test_method: self.method.clone(),
            status: "started".to_string(),
            case_count: self.cases.leaf_count(),
            error_count: 0,
            mismatch_count: 0,
            results_path: String::new(),
            ts_unix_ms: now_unix_ms(),
        })
        .map_err(HarnessError::Log)
    }

    fn log_cases(&self, outcome: &RunOutcome) -> Result<(), HarnessError> {
        for record in &outcome.records {
            maybe_append_case_log(&CaseLogEntry::from_record(&self.suite, &self.method, record))
                .map_err(HarnessError::Log)?;
        }
        Ok(())
    }

    fn check_json(&self, outcome: &RunOutcome) -> Result<RegressionReport, HarnessError> {
        self.log_cases(outcome)?;
        let results = normalize_value(&outcome.results, self.config.significant_digits);
        let results_path = self.files.test_results_path();
        write_file(&results_path, &serde_json::to_string_pretty(&results)?)?;

        let compared = load_fixture(&self.files.expected_results_path())
            .map_err(HarnessError::from)
            .and_then(|expected| {
                compare_results(&expected, &results, &self.mismatch_message())
                    .map_err(HarnessError::from)
            });
        self.finish(compared, outcome, results_path, results)
    }

    fn check_csv<R>(
        &self,
        outcome: &RunOutcome,
        render: R,
    ) -> Result<RegressionReport, HarnessError>
    where
        R: FnOnce(&Value) -> String,
    {
        self.log_cases(outcome)?;
        let results = normalize_value(&outcome.results, self.config.significant_digits);
        let results_path = self.files.test_results_csv_path();
        write_file(&results_path, &render(&results))?;

        let compared = compare_files(&self.files.expected_results_csv_path(), &results_path)
            .map_err(HarnessError::from)
            .and_then(|comparison| {
                comparison
                    .into_result(&self.mismatch_message())
                    .map_err(HarnessError::from)
            });
        self.finish(compared.map(|_| ()), outcome, results_path, results)
    }

    fn mismatch_message(&self) -> String {
        format!(
            "{}::{} results do not match {}",
            self.suite,
            self.method,
            self.files.file_root()
        )
    }

    fn finish(
        &self,
        compared: Result<(), HarnessError>,
        outcome: &RunOutcome,
        results_path: PathBuf,
        results: Value,
    ) -> Result<RegressionReport, HarnessError> {
        if let Err(err) = compared {
            let mismatch_count = match &err {
                HarnessError::Mismatch(failure) => failure.mismatches.len(),
                _ => 1,
            };
            self.log_suite("failed", outcome, mismatch_count, &results_path)?;
            return Err(err);
        }
        self.log_suite("passed", outcome, 0, &results_path)?;
        Ok(self.report(outcome, results_path, results))
    }

    fn log_suite(
        &self,
        status: &str,
        outcome: &RunOutcome,
        mismatch_count: usize,
        results_path: &Path,
    ) -> Result<(), HarnessError> {
        maybe_append_suite_log(&SuiteLogEntry {
            suite: self.suite.clone(),
            test_method: self.method.clone(),
            status: status.to_string(),
            case_count: outcome.case_count(),
            error_count: outcome.error_count(),
            mismatch_count,
            results_path: results_path.display().to_string(),
            ts_unix_ms: now_unix_ms(),
        })
        .map_err(HarnessError::Log)
    }

    fn report(
        &self,
        outcome: &RunOutcome,
        results_path: PathBuf,
        results: Value,
    ) -> RegressionReport {
        RegressionReport {
            suite: self.suite.clone(),
            test_method: self.method.clone(),
            case_count: outcome.case_count(),
            error_count: outcome.error_count(),
            results_path,
            results,
        }
    }
}
