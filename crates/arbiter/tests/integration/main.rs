//! Integration tests for arbiter
//!
//! These tests spawn real processes through `/bin/sh` and the fixtures
//! under `tests/fixtures`. Tests that need a C++ compiler are ignored unless
//! the `toolchain-tests` feature is enabled:
//!    cargo test -p arbiter --features toolchain-tests

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use arbiter::config::Config;
use arbiter::judge::{AnswerSource, TestCase};
use arbiter::process::InputSource;

mod compilation;
mod config_loading;
mod duel;
mod execution;
mod judging;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Absolute path of a fixture file
pub(crate) fn fixture(path: &str) -> PathBuf {
    Path::new(FIXTURES_PATH).join(path)
}

/// Path of a fixture program under `sources/`
pub(crate) fn source(name: &str) -> PathBuf {
    fixture(&format!("sources/{name}"))
}

/// The fixture config: `sh`, `copy` and `broken` toolchains, two workers
pub(crate) fn test_config() -> Config {
    let path = fixture("configs/arbiter.toml");
    Config::from_file(&path).unwrap_or_else(|e| panic!("Failed to load {}: {e}", path.display()))
}

/// Copy a fixture checker into `dir` and make it executable
pub(crate) fn checker(name: &str, dir: &Path) -> PathBuf {
    let target = dir.join(name);
    fs::copy(fixture(&format!("checkers/{name}")), &target).expect("Failed to copy checker");
    fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
        .expect("Failed to make checker executable");
    target
}

/// A case with in-memory input and answer
pub(crate) fn text_case(name: &str, input: &str, answer: &str) -> TestCase {
    TestCase::new(
        name,
        InputSource::bytes(input),
        AnswerSource::text(answer),
    )
}
