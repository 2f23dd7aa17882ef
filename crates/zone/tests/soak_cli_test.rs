//! # Soak Binary Tests
//!
//! Runs the `zone_soak` binary end to end: a normal run exits cleanly, a zone
//! too small for the level goes down the fatal path.

use std::path::PathBuf;
use std::process::Command;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("zone_soak_{}_{name}.toml", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Test: a small run completes and prints the final arena summary.
#[test]
fn test_soak_run_succeeds() {
    let config = write_config(
        "ok",
        r"
        levels = 2
        tics_per_level = 50
        sectors = 30

        [zone]
        target_bytes = 262144
        check_heap_on_purge = true
        ",
    );

    let output = Command::new(env!("CARGO_BIN_EXE_zone_soak"))
        .arg(&config)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    std::fs::remove_file(&config).ok();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Levels played:       2"));
    assert!(stdout.contains("level-special"));
}

/// Test: an exhausted zone ends the process with the fatal exit code.
#[test]
fn test_exhausted_zone_is_fatal() {
    let config = write_config(
        "tiny",
        r"
        levels = 1

        [zone]
        target_bytes = 4096
        ",
    );

    let output = Command::new(env!("CARGO_BIN_EXE_zone_soak"))
        .arg(&config)
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    std::fs::remove_file(&config).ok();

    assert_eq!(output.status.code(), Some(zone::fatal::FATAL_EXIT_CODE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to allocate"), "stderr: {stderr}");
}

/// Test: a config with an unknown key is rejected before anything runs.
#[test]
fn test_bad_config_is_fatal() {
    let config = write_config("bad", "levles = 3\n");

    let output = Command::new(env!("CARGO_BIN_EXE_zone_soak"))
        .arg(&config)
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    std::fs::remove_file(&config).ok();

    assert_eq!(output.status.code(), Some(zone::fatal::FATAL_EXIT_CODE));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Levels played"));
}
