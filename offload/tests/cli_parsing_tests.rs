//! CLI argument parsing tests for offload
//!
//! These tests verify that command-line arguments are parsed correctly, in particular that both
//! the kebab-case and PascalCase spellings of enum values are accepted.

use assert_cmd::Command;

#[test]
fn test_help_runs() {
    Command::cargo_bin("offload")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("offload")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_help_lists_option_groups() {
    Command::cargo_bin("offload")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Copy options"))
        .stdout(predicates::str::contains("--parallel-destinations"))
        .stdout(predicates::str::contains("Progress & output"));
}

// ============================================================================
// ProgressType Argument Parsing Tests
// ============================================================================

#[test]
fn test_progress_type_auto_lowercase() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_auto_capitalized() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "Auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_progress_bar_pascal_case() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "ProgressBar", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_progress_bar_kebab_case() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "progress-bar", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_text_updates_pascal_case() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "TextUpdates", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_text_updates_kebab_case() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "text-updates", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_invalid_value_rejected() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--progress-type", "spinner", "src", "dst"])
        .assert()
        .failure();
}

// ============================================================================
// Size and positional arguments
// ============================================================================

#[test]
fn test_chunk_size_accepts_human_readable_sizes() {
    for size in ["64KiB", "1MiB", "4096"] {
        Command::cargo_bin("offload")
            .unwrap()
            .args(["--chunk-size", size, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_chunk_size_invalid_value_rejected() {
    Command::cargo_bin("offload")
        .unwrap()
        .args(["--chunk-size", "lots", "src", "dst"])
        .assert()
        .failure();
}

#[test]
fn test_destination_is_required() {
    Command::cargo_bin("offload")
        .unwrap()
        .arg("src")
        .assert()
        .failure();
}
