#![forbid(unsafe_code)]

//! Comparison of regression results against checked-in fixtures.
//!
//! JSON data mode walks both documents and aggregates every difference as a
//! [`Mismatch`] addressed by a `$.a.b[2]` style path. Raw mode ([`raw`])
//! compares text files line by line. Neither mode normalizes numbers; that
//! happens before results are written.

pub mod raw;

pub use raw::{
    CompareMode, FileComparison, compare_bytes, compare_files, compare_text, file_compare,
};

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    MissingKey {
        path: String,
        expected: Value,
    },
    ExtraKey {
        path: String,
        actual: Value,
    },
    ValueDiffers {
        path: String,
        expected: Value,
        actual: Value,
    },
    TypeDiffers {
        path: String,
        expected: Value,
        actual: Value,
    },
    LengthDiffers {
        path: String,
        expected: usize,
        actual: usize,
    },
    /// Raw mode only. `None` means the file ended before this line.
    LineDiffers {
        line: usize,
        expected: Option<String>,
        actual: Option<String>,
    },
}

impl Mismatch {
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::MissingKey { path, .. }
            | Self::ExtraKey { path, .. }
            | Self::ValueDiffers { path, .. }
            | Self::TypeDiffers { path, .. }
            | Self::LengthDiffers { path, .. } => path.clone(),
            Self::LineDiffers { line, .. } => format!("line {line}"),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { path, expected } => {
                write!(f, "{path}: missing, expected {expected}")
            }
            Self::ExtraKey { path, actual } => write!(f, "{path}: unexpected key, got {actual}"),
            Self::ValueDiffers {
                path,
                expected,
                actual,
            } => write!(f, "{path}: expected {expected} | actual {actual}"),
            Self::TypeDiffers {
                path,
                expected,
                actual,
            } => write!(
                f,
                "{path}: expected {} {expected} | actual {} {actual}",
                json_kind(expected),
                json_kind(actual)
            ),
            Self::LengthDiffers {
                path,
                expected,
                actual,
            } => write!(f, "{path}: expected {expected} elements | actual {actual}"),
            Self::LineDiffers {
                line,
                expected,
                actual,
            } => write!(
                f,
                "line {line}: expected {} | actual {}",
                expected.as_deref().unwrap_or("<eof>"),
                actual.as_deref().unwrap_or("<eof>")
            ),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Caller-supplied context followed by one line per difference.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}{}", render_mismatches(.mismatches))]
pub struct ComparisonFailure {
    pub message: String,
    pub mismatches: Vec<Mismatch>,
}

fn render_mismatches(mismatches: &[Mismatch]) -> String {
    let mut out = format!(" ({} mismatches)", mismatches.len());
    for mismatch in mismatches {
        out.push_str("\n  ");
        out.push_str(&mismatch.to_string());
    }
    out
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("expected results fixture {} does not exist", .0.display())]
    FixtureMissing(PathBuf),
    #[error("failed reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Mismatch(#[from] ComparisonFailure),
}

/// Every difference between `expected` and `actual`, in document order of
/// `expected` (extra keys follow the keys they sit beside).
#[must_use]
pub fn compare_json(expected: &Value, actual: &Value) -> Vec<Mismatch> {
    let mut out = Vec::new();
    walk(&mut String::from("$"), expected, actual, &mut out);
    out
}

fn walk(path: &mut String, expected: &Value, actual: &Value, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(lhs), Value::Object(rhs)) => {
            for (key, value) in lhs {
                let len = path.len();
                push_key(path, key);
                match rhs.get(key) {
                    Some(other) => walk(path, value, other, out),
                    None => out.push(Mismatch::MissingKey {
                        path: path.clone(),
                        expected: value.clone(),
                    }),
                }
                path.truncate(len);
            }
            for (key, value) in rhs {
                if lhs.contains_key(key) {
                    continue;
                }
                let len = path.len();
                push_key(path, key);
                out.push(Mismatch::ExtraKey {
                    path: path.clone(),
                    actual: value.clone(),
                });
                path.truncate(len);
            }
        }
        (Value::Array(lhs), Value::Array(rhs)) => {
            if lhs.len() != rhs.len() {
                out.push(Mismatch::LengthDiffers {
                    path: path.clone(),
                    expected: lhs.len(),
                    actual: rhs.len(),
                });
            }
            for (idx, (left, right)) in lhs.iter().zip(rhs).enumerate() {
                let len = path.len();
                path.push_str(&format!("[{idx}]"));
                walk(path, left, right, out);
                path.truncate(len);
            }
        }
        (Value::Number(lhs), Value::Number(rhs)) => {
            if !numbers_equal(lhs, rhs) {
                out.push(Mismatch::ValueDiffers {
                    path: path.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        _ if json_kind(expected) == json_kind(actual) => {
            if expected != actual {
                out.push(Mismatch::ValueDiffers {
                    path: path.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        _ => out.push(Mismatch::TypeDiffers {
            path: path.clone(),
            expected: expected.clone(),
            actual: actual.clone(),
        }),
    }
}

fn numbers_equal(lhs: &serde_json::Number, rhs: &serde_json::Number) -> bool {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (lhs.as_u64(), rhs.as_u64()) {
        return a == b;
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn push_key(path: &mut String, key: &str) {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if plain {
        path.push('.');
        path.push_str(key);
    } else {
        path.push('[');
        path.push_str(&Value::String(key.to_string()).to_string());
        path.push(']');
    }
}

pub fn compare_results(
    expected: &Value,
    actual: &Value,
    message: &str,
) -> Result<(), ComparisonFailure> {
    let mismatches = compare_json(expected, actual);
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ComparisonFailure {
            message: message.to_string(),
            mismatches,
        })
    }
}

/// Panics with the rendered [`ComparisonFailure`]; meant for `#[test]` bodies.
#[track_caller]
pub fn assert_results_match(expected: &Value, actual: &Value, message: &str) {
    if let Err(failure) = compare_results(expected, actual, message) {
        panic!("{failure}");
    }
}

/// Reads an expected-results fixture. A missing file is reported as
/// [`CompareError::FixtureMissing`] so the caller can tell the user which
/// fixture to create.
pub fn load_fixture(path: &Path) -> Result<Value, CompareError> {
    if !path.exists() {
        return Err(CompareError::FixtureMissing(path.to_path_buf()));
    }
    load_json(path)
}

pub fn load_json(path: &Path) -> Result<Value, CompareError> {
    let raw = fs::read_to_string(path).map_err(|source| CompareError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CompareError::Json {
        path: path.to_path_buf(),
        source,
    })
}
