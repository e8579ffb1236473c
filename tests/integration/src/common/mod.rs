//! Common test utilities for the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use idl::{ConstVariant, EntityId, EntityTree, Environment, Kind};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize logging for tests; `RUST_LOG` selects the level
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Parse code with the default environment, failing the test on errors
pub fn parse(code: &str) -> EntityTree {
    match idl::parse_str(code, &Environment::new()) {
        Ok(tree) => tree,
        Err(err) => panic!("parse failed: {}\n{}", err, code),
    }
}

/// Description of the error a parse is expected to produce
pub fn parse_error(code: &str) -> String {
    parse_error_with(code, &Environment::new())
}

pub fn parse_error_with(code: &str, env: &Environment) -> String {
    match idl::parse_str(code, env) {
        Ok(_) => panic!("parse unexpectedly succeeded:\n{}", code),
        Err(err) => {
            println!("Expected error: {}", err);
            err.description
        }
    }
}

/// Look up an entity by scoped name, failing the test when it is missing
pub fn entity(tree: &EntityTree, name: &str) -> EntityId {
    tree.find(tree.root(), name, false)
        .unwrap_or_else(|| panic!("entity '{}' not found", name))
}

/// Names of the children of an entity in declaration order
pub fn child_names(tree: &EntityTree, id: EntityId) -> Vec<String> {
    tree.children(id).iter().map(|child| tree.get(*child).name.clone()).collect()
}

pub fn child_kinds(tree: &EntityTree, id: EntityId) -> Vec<Kind> {
    tree.children(id).iter().map(|child| tree.get(*child).kind).collect()
}

/// Value of a constant at a value path
pub fn value(tree: &EntityTree, path: &str) -> ConstVariant {
    tree.find_value_variant(tree.root(), path)
}

/// Write a file below `dir`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create directories");
    }
    fs::write(&path, content).expect("write test file");
    path
}
