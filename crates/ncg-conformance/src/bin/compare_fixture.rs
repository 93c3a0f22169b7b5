#![forbid(unsafe_code)]

use ncg_compare::{CompareError, CompareMode, Mismatch, file_compare};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct CompareSummary {
    status: &'static str,
    mode: &'static str,
    expected: String,
    actual: String,
    mismatches: Vec<Mismatch>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("compare_fixture failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut expected: Option<PathBuf> = None;
    let mut actual: Option<PathBuf> = None;
    let mut mode = CompareMode::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--expected" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--expected requires a value".to_string())?;
                expected = Some(PathBuf::from(value));
            }
            "--actual" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--actual requires a value".to_string())?;
                actual = Some(PathBuf::from(value));
            }
            "--mode" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--mode requires a value".to_string())?;
                mode = CompareMode::parse(&value)?;
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p ncg-conformance --bin compare_fixture -- --expected <path> --actual <path> [--mode json_data|raw|csv]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let expected = expected.ok_or_else(|| "--expected is required".to_string())?;
    let actual = actual.ok_or_else(|| "--actual is required".to_string())?;

    let mismatches = match file_compare(&expected, &actual, "compare_fixture", mode) {
        Ok(()) => Vec::new(),
        Err(CompareError::Mismatch(failure)) => failure.mismatches,
        Err(err) => return Err(err.to_string()),
    };
    let status = if mismatches.is_empty() { "pass" } else { "fail" };
    let summary = CompareSummary {
        status,
        mode: mode.as_str(),
        expected: expected.display().to_string(),
        actual: actual.display().to_string(),
        mismatches,
    };

    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");

    if status == "fail" {
        std::process::exit(2);
    }
    Ok(())
}
