//! Raw file mode: line-by-line comparison for CSV and text outputs.

use crate::{CompareError, ComparisonFailure, Mismatch, compare_results, load_fixture, load_json};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    #[default]
    JsonData,
    RawFile,
}

impl CompareMode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "json_data" | "json" => Ok(Self::JsonData),
            "raw" | "raw_file" | "csv" => Ok(Self::RawFile),
            other => Err(format!(
                "unknown compare mode `{other}` (expected json_data, raw or csv)"
            )),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonData => "json_data",
            Self::RawFile => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileComparison {
    pub expected_path: PathBuf,
    pub actual_path: PathBuf,
    pub expected_sha256: String,
    pub actual_sha256: String,
    /// Only [`Mismatch::LineDiffers`] entries.
    pub mismatches: Vec<Mismatch>,
}

impl FileComparison {
    /// Line bytes decide; digests may still differ on `\r\n` endings.
    #[must_use]
    pub fn matches(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn into_result(self, message: &str) -> Result<Self, ComparisonFailure> {
        if self.matches() {
            Ok(self)
        } else {
            Err(ComparisonFailure {
                message: message.to_string(),
                mismatches: self.mismatches,
            })
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Line differences between two texts, 1-based. `\r\n` and `\n` endings
/// compare equal.
#[must_use]
pub fn compare_text(expected: &str, actual: &str) -> Vec<Mismatch> {
    compare_bytes(expected.as_bytes(), actual.as_bytes())
}

/// Byte-exact line comparison. The only difference tolerated is a `\r`
/// directly before a `\n`, so an empty result means the files are the same
/// up to line endings. A missing final newline on one side is a difference.
#[must_use]
pub fn compare_bytes(expected: &[u8], actual: &[u8]) -> Vec<Mismatch> {
    let mut lhs = split_lines(expected);
    let mut rhs = split_lines(actual);
    // Both files end in a newline: the empty segment after it is not a line.
    if expected.ends_with(b"\n") && actual.ends_with(b"\n") {
        lhs.pop();
        rhs.pop();
    }

    let mut out = Vec::new();
    let mut lhs = lhs.into_iter();
    let mut rhs = rhs.into_iter();
    let mut line = 0usize;
    loop {
        line += 1;
        match (lhs.next(), rhs.next()) {
            (None, None) => break,
            (Some(left), Some(right)) if left == right => {}
            (left, right) => out.push(Mismatch::LineDiffers {
                line,
                expected: left.map(render_line),
                actual: right.map(render_line),
            }),
        }
    }
    out
}

fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let segments: Vec<&[u8]> = bytes.split(|byte| *byte == b'\n').collect();
    let last = segments.len().saturating_sub(1);
    segments
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            if index < last {
                line.strip_suffix(b"\r").unwrap_or(line)
            } else {
                line
            }
        })
        .collect()
}

/// Valid UTF-8 is shown as is; anything else is escaped so that two
/// different byte sequences never render the same.
fn render_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.escape_ascii().to_string(),
    }
}

pub fn compare_files(
    expected_path: &Path,
    actual_path: &Path,
) -> Result<FileComparison, CompareError> {
    if !expected_path.exists() {
        return Err(CompareError::FixtureMissing(expected_path.to_path_buf()));
    }
    let expected = read_bytes(expected_path)?;
    let actual = read_bytes(actual_path)?;

    Ok(FileComparison {
        expected_path: expected_path.to_path_buf(),
        actual_path: actual_path.to_path_buf(),
        expected_sha256: sha256_hex(&expected),
        actual_sha256: sha256_hex(&actual),
        mismatches: compare_bytes(&expected, &actual),
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, CompareError> {
    fs::read(path).map_err(|source| CompareError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Compares a results file with its fixture in the given mode. Any
/// difference comes back as [`CompareError::Mismatch`].
pub fn file_compare(
    expected_path: &Path,
    actual_path: &Path,
    message: &str,
    mode: CompareMode,
) -> Result<(), CompareError> {
    match mode {
        CompareMode::JsonData => {
            let expected = load_fixture(expected_path)?;
            let actual = load_json(actual_path)?;
            compare_results(&expected, &actual, message)?;
        }
        CompareMode::RawFile => {
            compare_files(expected_path, actual_path)?.into_result(message)?;
        }
    }
    Ok(())
}
