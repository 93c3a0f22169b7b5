#![forbid(unsafe_code)]

use ncg_conformance::{HarnessConfig, audit_results, run_smoke};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct GateSummary {
    status: &'static str,
    expected_results_root: String,
    test_results_root: String,
    fixture_count: usize,
    case_count: usize,
    pass_count: usize,
    failures: Vec<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("run_results_gate failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut cfg = HarnessConfig::default_paths();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--expected-root" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--expected-root requires a value".to_string())?;
                cfg.expected_results_root = PathBuf::from(value);
            }
            "--test-results-root" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--test-results-root requires a value".to_string())?;
                cfg.test_results_root = PathBuf::from(value);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p ncg-conformance --bin run_results_gate -- [--expected-root <dir>] [--test-results-root <dir>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let smoke = run_smoke(&cfg);
    if !smoke.expected_results_present {
        return Err(format!(
            "expected results folder {} does not exist",
            cfg.expected_results_root.display()
        ));
    }

    let report = audit_results(&cfg);
    let status = if report.all_passed() {
        "pass"
    } else {
        "fail"
    };
    let summary = GateSummary {
        status,
        expected_results_root: cfg.expected_results_root.display().to_string(),
        test_results_root: cfg.test_results_root.display().to_string(),
        fixture_count: smoke.fixture_count,
        case_count: report.case_count,
        pass_count: report.pass_count,
        failures: report.failures,
    };

    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");

    if status == "fail" {
        std::process::exit(2);
    }
    Ok(())
}
