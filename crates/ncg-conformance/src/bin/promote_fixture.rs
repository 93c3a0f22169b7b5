#![forbid(unsafe_code)]

use ncg_conformance::{HarnessConfig, promote_results};
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("promote_fixture failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut cfg = HarnessConfig::default_paths();
    let mut suite: Option<String> = None;
    let mut method: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                suite = Some(args.next().ok_or_else(|| "--suite requires a value".to_string())?);
            }
            "--method" => {
                method = Some(
                    args.next()
                        .ok_or_else(|| "--method requires a value".to_string())?,
                );
            }
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
                    "Usage: cargo run -p ncg-conformance --bin promote_fixture -- --suite <name> --method <name> [--expected-root <dir>] [--test-results-root <dir>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let suite = suite.ok_or_else(|| "--suite is required".to_string())?;
    let method = method.ok_or_else(|| "--method is required".to_string())?;
    let promoted = promote_results(&cfg, &suite, &method).map_err(|err| err.to_string())?;
    for path in promoted {
        println!("promoted {}", path.display());
    }
    Ok(())
}
