// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembling after a run that did not end cleanly.

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use junit_spool::{
    AssembleOptions, DiagnosticKind, MetadataEnricher, ReportAssembler, RunRoot, WorkerId,
    errors::AssembleError,
};
use pretty_assertions::assert_eq;
use std::io::Write;

/// Records two attempts and abandons the session without finishing it, as if the process was
/// killed right after the second `record` returned.
fn abandoned_run(dir: &Utf8TempDir) -> RunRoot {
    let mut session = controller(dir, MetadataEnricher::new());
    session
        .record_attempt(passed("tests/test_api.py::test_health"))
        .expect("recorded");
    session
        .record_attempt(failed("tests/test_api.py::test_login", "assert 401 == 200"))
        .expect("recorded");
    let run_dir = session.run_root().path().to_owned();
    std::mem::forget(session);
    RunRoot::open(run_dir).expect("run root survives")
}

fn assembler(dir: &Utf8TempDir) -> ReportAssembler {
    ReportAssembler::new(&config(dir), MetadataEnricher::new())
}

#[test]
fn attempts_survive_a_killed_process() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let run_root = abandoned_run(&dir);

    let summary = assembler(&dir)
        .assemble(run_root, &AssembleOptions::default())
        .expect("assembled");
    assert_eq!(summary.cases, 2);
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);

    let report = parse_report(&summary.report_path);
    assert_eq!(report.cases_named("test_health").len(), 1);
    assert_eq!(report.cases_named("test_login")[0].status, "failure");
}

#[test]
fn partial_write_is_dropped() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let run_root = abandoned_run(&dir);

    // A third attempt was being written when the process died.
    let store = run_root.store_path(&WorkerId::controller());
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&store)
        .expect("store opens");
    file.write_all(br#"{"kind":"attempt","identity":{"module-path":"tests/test_api.py","na"#)
        .expect("partial entry written");
    drop(file);

    let summary = assembler(&dir)
        .assemble(run_root, &AssembleOptions::default())
        .expect("a partial entry never fails assembly");
    assert_eq!(summary.cases, 2, "all prior entries retained");
    assert_eq!(summary.diagnostics.len(), 1);
    assert_eq!(summary.diagnostics[0].kind, DiagnosticKind::StoreCorruption);
}

#[test]
fn unreadable_store_keeps_run_dir() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let run_root = abandoned_run(&dir);
    let run_dir = run_root.path().to_owned();

    // A store written by a newer version.
    std::fs::write(
        run_root.store_path(&WorkerId::new("gw9")),
        "{\"kind\":\"header\",\"format-version\":99,\"worker-id\":\"gw9\",\"pid\":1,\
         \"created-at\":\"2024-03-01T12:00:00+00:00\"}\n",
    )
    .expect("store written");

    let summary = assembler(&dir)
        .assemble(run_root, &AssembleOptions::default())
        .expect("assembled");
    assert_eq!(summary.cases, 2);
    let kinds: Vec<_> = summary.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![DiagnosticKind::StoreUnreadable, DiagnosticKind::CleanupFailed]
    );
    assert!(!summary.run_root_removed);
    assert!(run_dir.exists());
}

#[test]
fn assembling_twice_is_identical() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let run_root = abandoned_run(&dir);
    let options = AssembleOptions {
        output_path: None,
        remove_run_root: false,
    };

    let first = assembler(&dir)
        .assemble(run_root.clone(), &options)
        .expect("assembled");
    let first_bytes = std::fs::read(&first.report_path).expect("report exists");
    let second = assembler(&dir)
        .assemble(run_root, &options)
        .expect("assembled again");
    let second_bytes = std::fs::read(&second.report_path).expect("report exists");

    assert_eq!(first.report_path, second.report_path);
    assert_eq!(
        String::from_utf8(first_bytes).expect("UTF-8"),
        String::from_utf8(second_bytes).expect("UTF-8")
    );
}

#[test]
fn publish_failure_keeps_temporary_file() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let run_root = abandoned_run(&dir);
    let run_dir = run_root.path().to_owned();

    // A non-empty directory where the report should go cannot be replaced by a rename.
    let output_path = dir.path().join("occupied.xml");
    std::fs::create_dir_all(output_path.join("inner")).expect("created blocking dir");

    let error = assembler(&dir)
        .assemble(
            run_root,
            &AssembleOptions {
                output_path: Some(output_path.clone()),
                remove_run_root: true,
            },
        )
        .expect_err("rename onto a directory fails");

    let AssembleError::Publish {
        output_path: failed_path,
        temp_path,
        ..
    } = &error
    else {
        panic!("expected a publish error, got {error:?}");
    };
    assert_eq!(failed_path, &output_path);
    assert_eq!(error.salvage_path(), Some(temp_path));
    let salvaged = std::fs::read_to_string(temp_path).expect("temporary file kept");
    assert!(salvaged.contains("<testsuites"), "{salvaged}");
    assert!(salvaged.contains("test_login"), "{salvaged}");
    assert!(run_dir.exists(), "stores are kept when publishing fails");
}
