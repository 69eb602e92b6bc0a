//! End-to-end tests for the `hookprof` binary
#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use object::{Object, ObjectSymbol};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use tempfile::TempDir;

/// Helper: Compile a small Rust program with debug info
fn compile_test_program() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let src_file = temp_dir.path().join("test.rs");
    let bin_file = temp_dir.path().join("test_bin");

    fs::write(
        &src_file,
        "#[inline(never)]\nfn compute() -> u32 { 42 }\nfn main() { println!(\"{}\", compute()); }\n",
    )
    .unwrap();

    StdCommand::new("rustc")
        .arg(&src_file)
        .arg("-o")
        .arg(&bin_file)
        .arg("-g") // Include debug info
        .status()
        .expect("Failed to compile test program");

    (temp_dir, bin_file)
}

fn symbol_address(binary: &Path, needle: &str) -> u64 {
    let data = fs::read(binary).unwrap();
    let object = object::File::parse(&*data).unwrap();
    object
        .symbols()
        .find(|s| s.name().map(|n| n.contains(needle)).unwrap_or(false))
        .map(|s| s.address())
        .unwrap()
}

#[test]
fn test_demangle_rust_symbols() {
    Command::cargo_bin("hookprof")
        .unwrap()
        .args(["demangle", "_ZN4core3fmt5write17h0123456789abcdefE", "main"])
        .assert()
        .success()
        .stdout("core::fmt::write\nmain\n");
}

#[test]
fn test_resolve_function_and_line() {
    let (_temp_dir, bin_file) = compile_test_program();
    let addr = symbol_address(&bin_file, "7compute");

    Command::cargo_bin("hookprof")
        .unwrap()
        .arg("resolve")
        .arg("--binary")
        .arg(&bin_file)
        .arg(format!("0x{:x}", addr))
        .assert()
        .success()
        .stdout(predicate::str::contains("compute"))
        .stdout(predicate::str::contains("test.rs:2"));
}

#[test]
fn test_resolve_with_bias() {
    let (_temp_dir, bin_file) = compile_test_program();
    let addr = symbol_address(&bin_file, "7compute");

    Command::cargo_bin("hookprof")
        .unwrap()
        .arg("resolve")
        .arg("--binary")
        .arg(&bin_file)
        .args(["--bias", "0x10000000"])
        .arg(format!("{:x}", addr + 0x1000_0000))
        .assert()
        .success()
        .stdout(predicate::str::contains("test.rs:2"));
}

#[test]
fn test_resolve_unknown_address_shows_placeholder() {
    let (_temp_dir, bin_file) = compile_test_program();

    Command::cargo_bin("hookprof")
        .unwrap()
        .arg("resolve")
        .arg("--binary")
        .arg(&bin_file)
        .arg("0x0")
        .assert()
        .success()
        .stdout(predicate::str::contains("symbol resolution failed"))
        .stdout(predicate::str::contains("line resolution failed"));
}

#[test]
fn test_resolve_json_output() {
    let (_temp_dir, bin_file) = compile_test_program();
    let addr = symbol_address(&bin_file, "7compute");

    let output = Command::cargo_bin("hookprof")
        .unwrap()
        .arg("resolve")
        .arg("--binary")
        .arg(&bin_file)
        .args(["--format", "json"])
        .arg(format!("0x{:x}", addr))
        .arg("0x0")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["func"], addr);
    assert_eq!(entries[0]["line"], 2);
    assert!(entries[0]["name"].as_str().unwrap().contains("compute"));
    assert_eq!(entries[1]["line"], 0);
}

#[test]
fn test_resolve_missing_binary_fails() {
    Command::cargo_bin("hookprof")
        .unwrap()
        .args(["resolve", "--binary", "/nonexistent/binary", "0x1000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Binary does not exist"));
}

#[test]
fn test_resolve_rejects_bad_address() {
    Command::cargo_bin("hookprof")
        .unwrap()
        .args(["resolve", "--binary", "x", "0xnothex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid address"));
}
