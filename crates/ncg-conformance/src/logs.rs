//! JSONL run logs. Nothing is written unless a path is set with
//! [`set_case_log_path`] or through `NCG_CASE_LOG_PATH`.

use ncg_cases::CaseRunRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CASE_LOG_ENV: &str = "NCG_CASE_LOG_PATH";

static CASE_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();
static CASE_LOG_WRITE: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseLogEntry {
    pub suite: String,
    pub test_method: String,
    pub case_path: Vec<String>,
    pub case_name: String,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

impl CaseLogEntry {
    #[must_use]
    pub fn from_record(suite: &str, test_method: &str, record: &CaseRunRecord) -> Self {
        Self {
            suite: suite.to_string(),
            test_method: test_method.to_string(),
            case_path: record.path.clone(),
            case_name: record.case_name.clone(),
            status: if record.passed() { "ok" } else { "error" }.to_string(),
            error: record.error.clone(),
            elapsed_ms: record.elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteLogEntry {
    pub suite: String,
    pub test_method: String,
    /// `started`, `passed` or `failed`.
    pub status: String,
    pub case_count: usize,
    pub error_count: usize,
    pub mismatch_count: usize,
    pub results_path: String,
    pub ts_unix_ms: u128,
}

pub fn set_case_log_path(path: Option<PathBuf>) {
    let cell = CASE_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

fn configured_log_path() -> Option<PathBuf> {
    let configured = CASE_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    configured.or_else(|| std::env::var_os(CASE_LOG_ENV).map(PathBuf::from))
}

#[must_use]
pub fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

pub fn maybe_append_case_log(entry: &CaseLogEntry) -> Result<(), String> {
    maybe_append_jsonl(entry, "case log entry")
}

pub fn maybe_append_suite_log(entry: &SuiteLogEntry) -> Result<(), String> {
    maybe_append_jsonl(entry, "suite log entry")
}

fn maybe_append_jsonl<T: Serialize>(entry: &T, what: &str) -> Result<(), String> {
    let Some(path) = configured_log_path() else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let line =
        serde_json::to_string(entry).map_err(|err| format!("failed serializing {what}: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');

    let _guard = CASE_LOG_WRITE.lock().map_err(|_| "case log lock poisoned".to_string())?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    file.write_all(&payload)
        .map_err(|err| format!("failed appending case log {}: {err}", path.display()))
}
