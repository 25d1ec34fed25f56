//! Loads the built `expansion-hello` library the way the host does.
//!
//! `expansion-hello` is a dev-dependency, so its `cdylib` lands next to this
//! test binary in `target/<profile>/deps`.

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};

use expansion_core::abi::{symbol_name, API_VERSION, API_VERSION_SYMBOL};
use expansion_core::{ExpansionError, ExpansionLoader, LifecycleState, SharedBuffer};

// Every test that opens the library shares one copy of its context.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hello_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let path = exe
        .parent()
        .unwrap()
        .join(format!("{DLL_PREFIX}expansion_hello.{DLL_EXTENSION}"));
    assert!(path.exists(), "cdylib not built at {}", path.display());
    path
}

#[test]
fn test_load_hello_library_end_to_end() {
    let _guard = serial();
    let library = hello_library();

    let mut expansion = ExpansionLoader::load(&library).unwrap();
    assert_eq!(expansion.name(), "expansion_hello");
    assert_eq!(expansion.negotiated_version(), API_VERSION);
    assert_eq!(expansion.descriptor().path.as_deref(), Some(library.as_path()));
    assert_eq!(expansion.state(), LifecycleState::Unloaded);

    let mut buffer = SharedBuffer::filled(0xFFFF);
    expansion.init().unwrap();
    for _ in 0..2 {
        buffer.fill(0xFFFF);
        expansion.trigger(&mut buffer).unwrap();
        assert_eq!(buffer.text_until(0xFFFF), "Hello");
        assert_eq!(buffer.count_changed(0xFFFF), 5);
    }
    expansion.deinit().unwrap();

    assert_eq!(expansion.state(), LifecycleState::Deinitialized);
    assert_eq!(expansion.trigger_count(), 2);
    assert_eq!(expansion.api_version(), API_VERSION);
}

#[test]
fn test_dropping_initialized_library_deinitializes() {
    let _guard = serial();
    let library = hello_library();

    let mut first = ExpansionLoader::load(&library).unwrap();
    first.init().unwrap();
    drop(first);

    // on_deinit ran before the library was closed, so a new load starts over.
    let mut second = ExpansionLoader::load(&library).unwrap();
    let mut buffer = SharedBuffer::new();
    second.init().unwrap();
    second.trigger(&mut buffer).unwrap();
    assert_eq!(buffer.text(), "Hello");
    second.deinit().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_library_without_exports_is_rejected_at_version_symbol() {
    let err = ExpansionLoader::load(std::path::Path::new("libc.so.6")).unwrap_err();

    // The version symbol is looked up before the other three.
    match err {
        ExpansionError::SymbolNotPresent { path, symbol } => {
            assert_eq!(path, PathBuf::from("libc.so.6"));
            assert_eq!(symbol, symbol_name(API_VERSION_SYMBOL));
        }
        other => panic!("expected SymbolNotPresent, got {other:?}"),
    }
}

#[test]
fn test_host_binary_runs_hello() {
    let _guard = serial();
    let library = hello_library();
    let temp = tempfile::TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_expansion-host"))
        .arg("--config")
        .arg(temp.path().join("expansions.toml"))
        .arg("run")
        .arg(&library)
        .args(["--triggers", "2", "--fill", "65535", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    let reports: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reports.len(), 2);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report["expansion"], "expansion_hello");
        assert_eq!(report["trigger"], i + 1);
        assert_eq!(report["text"], "Hello");
        assert_eq!(report["changed_slots"], 5);
    }
}

#[test]
fn test_host_binary_inspect_reports_version() {
    let library = hello_library();
    let temp = tempfile::TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_expansion-host"))
        .arg("--config")
        .arg(temp.path().join("expansions.toml"))
        .arg("inspect")
        .arg(&library)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["name"], "expansion_hello");
    assert_eq!(report["api_version"], API_VERSION);
    assert_eq!(report["supported"], true);
    assert!(report["error"].is_null());
}
