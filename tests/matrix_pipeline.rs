//! End-to-end runs of the build matrix through the library API.
//!
//! A fake "cmake" toolchain is assembled from shell scripts inside a temp
//! root, so these tests exercise real processes, real log files and the
//! watchdog without needing a compiler.
#![cfg(unix)]

use cxmatrix::config::{CompilersConfig, ProjectConfig, ProjectsConfig};
use cxmatrix::matrix::{self, MatrixOptions};
use cxmatrix::orchestrator::{Supervisor, SupervisorOptions, WorkerStatus};
use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// `make.sh clean` fails, plain `make.sh` succeeds.
const MAKE_SCRIPT: &str = "#!/bin/sh\nif [ \"$1\" = clean ]; then echo 'nothing to clean'; exit 1; fi\necho 'warning: unused variable'\nexit 0\n";

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn compilers(root: &Path, names: &[&str]) -> CompilersConfig {
    write_script(&root.join("make.sh"), MAKE_SCRIPT);
    let make = root.join("make.sh").to_string_lossy().into_owned();

    let mut entries = serde_json::Map::new();
    for name in names {
        entries.insert(
            name.to_string(),
            json!({
                "environ": { "CXM_TOOLCHAIN": name },
                "build_systems": {
                    "cmake": { "generator": "Unix Makefiles", "make_command": ["sh", make] }
                }
            }),
        );
    }
    serde_json::from_value(json!({
        "build_systems": { "cmake": { "path": [], "executable": "true" } },
        "compilers": entries
    }))
    .unwrap()
}

fn projects(test_timeout: i64) -> ProjectsConfig {
    let project: ProjectConfig = serde_json::from_value(json!({
        "build_system": "cmake",
        "build_directory": "build",
        "test_command": ["run_tests.sh"],
        "test_timeout": test_timeout
    }))
    .unwrap();
    let mut projects = ProjectsConfig::new();
    projects.insert("demo".to_string(), project);
    projects
}

fn test_binary(root: &Path, compiler: &str, body: &str) {
    write_script(&root.join("bin").join(compiler).join("run_tests.sh"), body);
}

fn run(
    root: &TempDir,
    compilers: &CompilersConfig,
    projects: &ProjectsConfig,
    clean: bool,
    fail_fast: bool,
) -> (matrix::MatrixReport, String) {
    colored::control::set_override(false);
    let supervisor = Supervisor::new(SupervisorOptions {
        fail_fast,
        poll_interval: Duration::from_millis(100),
        ..Default::default()
    });
    let options = MatrixOptions {
        root: root.path().to_path_buf(),
        clean,
    };
    let mut out = Vec::new();
    let report = matrix::run(&mut out, &supervisor, compilers, projects, &options).unwrap();
    (report, String::from_utf8(out).unwrap())
}

#[test]
fn test_hung_tests_fail_every_toolchain() {
    let root = tempfile::tempdir().unwrap();
    let compilers = compilers(root.path(), &["clang", "gcc"]);
    for compiler in ["clang", "gcc"] {
        test_binary(root.path(), compiler, "#!/bin/sh\necho started\nsleep 30\n");
    }

    let started = Instant::now();
    let (report, out) = run(&root, &compilers, &projects(3), false, false);
    let elapsed = started.elapsed();

    assert!(!report.success());
    assert!(elapsed >= Duration::from_secs(3), "deadline not honoured: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(15), "run took {elapsed:?}");

    let results = &report.projects[0].results;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == WorkerStatus::Failed));

    for compiler in ["clang", "gcc"] {
        assert!(out.contains(&format!("[{compiler}] [1/3] Running CMake")));
        assert!(out.contains(&format!("[{compiler}] [3/3] Testing")));
        assert!(out.contains(&format!("[{compiler}] FAILED")));
        assert!(out.contains(&format!("[{compiler}] Killed by watchdog")));

        let log_path = root.path().join("build/logs").join(format!("{compiler}.log"));
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("started"));
        assert!(log.contains("Killed by watchdog"));
    }
}

#[test]
fn test_failing_clean_does_not_fail_the_toolchain() {
    let root = tempfile::tempdir().unwrap();
    let compilers = compilers(root.path(), &["gcc"]);
    test_binary(root.path(), "gcc", "#!/bin/sh\necho \"tests ok on $CXM_TOOLCHAIN\"\n");

    let (report, out) = run(&root, &compilers, &projects(3), true, false);

    assert!(report.success(), "output:\n{out}");
    assert!(out.contains("[gcc] [1/4] Cleaning"));
    assert!(out.contains("[gcc] [4/4] Testing"));
    assert!(out.contains("[gcc] PASSED"));

    let log = fs::read_to_string(root.path().join("build/logs/gcc.log")).unwrap();
    assert!(log.contains("nothing to clean"));
    assert!(log.contains("tests ok on gcc"));
}

#[test]
fn test_fail_fast_stops_slow_toolchains() {
    let root = tempfile::tempdir().unwrap();
    let compilers = compilers(root.path(), &["clang", "gcc"]);
    test_binary(root.path(), "clang", "#!/bin/sh\nsleep 30\n");
    test_binary(root.path(), "gcc", "#!/bin/sh\necho 'FAILED: 1 test'\nexit 1\n");

    let started = Instant::now();
    let (report, out) = run(&root, &compilers, &projects(-1), false, true);

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!report.success());
    assert!(report.projects[0].cancelled_early);
    assert!(out.contains("[gcc] FAILED"));
    assert!(out.contains("FAILED: 1 test"));
    assert!(!out.contains("[clang] PASSED"));
}

#[test]
fn test_logs_are_overwritten_between_runs() {
    let root = tempfile::tempdir().unwrap();
    let compilers = compilers(root.path(), &["gcc"]);

    test_binary(root.path(), "gcc", "#!/bin/sh\necho first-run\n");
    let (first, _) = run(&root, &compilers, &projects(3), false, false);
    assert!(first.success());

    test_binary(root.path(), "gcc", "#!/bin/sh\necho second-run\n");
    let (second, _) = run(&root, &compilers, &projects(3), false, false);
    assert!(second.success());

    let log = fs::read_to_string(root.path().join("build/logs/gcc.log")).unwrap();
    assert!(log.contains("second-run"));
    assert!(!log.contains("first-run"));
}
