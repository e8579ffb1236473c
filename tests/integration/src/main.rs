//! Integration Test Harness
//!
//! Runs the parse, include and constant evaluation test targets in turn and
//! reports which of them failed.
//!
//! ```text
//! cargo run -p integration-tests
//! RUST_LOG=idl=debug cargo run -p integration-tests
//! ```

use std::process::{Command, ExitCode};
use std::time::Instant;

/// Test targets declared in Cargo.toml, with a short label
const TEST_TARGETS: &[(&str, &str)] = &[
    ("parse_tests", "entity tree construction, scoping and comments"),
    ("include_tests", "preprocessor directives and multi-file sources"),
    ("const_eval_tests", "typed constant evaluation and value lookup"),
];

fn run_target(name: &str) -> Result<bool, String> {
    let status = Command::new(env!("CARGO"))
        .args(["test", "-p", "integration-tests", "--test", name])
        .status()
        .map_err(|e| format!("failed to execute cargo: {}", e))?;
    Ok(status.success())
}

fn main() -> ExitCode {
    let mut failed = Vec::new();

    for (name, label) in TEST_TARGETS {
        println!("==> {} ({})", name, label);
        let start = Instant::now();
        match run_target(name) {
            Ok(true) => println!("<== {} passed in {:?}", name, start.elapsed()),
            Ok(false) => failed.push(name.to_string()),
            Err(e) => failed.push(format!("{}: {}", name, e)),
        }
    }

    if failed.is_empty() {
        println!("All {} test targets passed", TEST_TARGETS.len());
        ExitCode::SUCCESS
    } else {
        for failure in &failed {
            eprintln!("FAILED {}", failure);
        }
        ExitCode::FAILURE
    }
}
