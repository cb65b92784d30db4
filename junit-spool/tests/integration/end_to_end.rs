// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use junit_spool::{
    DiagnosticKind, MetadataEnricher, MetadataProvider, Outcome, Property, RunRoot, SpoolConfig,
    SpoolSession, TestIdentity, WorkerId,
    errors::{IssueLookupError, ProviderError},
    issue::{FailureSignature, IssueInfo, IssueTracker},
};
use pretty_assertions::assert_eq;

#[test]
fn two_workers_four_cases() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let controller = controller(&dir, MetadataEnricher::new());

    let mut gw0 = worker(&dir, &controller, "gw0");
    gw0.record_attempt(passed("tests/test_api.py::test_health"))
        .expect("recorded");
    gw0.record_attempt(failed("tests/test_api.py::test_login", "assert 401 == 200"))
        .expect("recorded");
    assert!(gw0.finish().expect("worker finished").is_none());

    let mut gw1 = worker(&dir, &controller, "gw1");
    gw1.record_attempt(passed("tests/test_db.py::TestQueries::test_select[sqlite]"))
        .expect("recorded");
    gw1.record_attempt(failed("tests/test_db.py::TestQueries::test_insert", "IntegrityError"))
        .expect("recorded");
    assert!(gw1.finish().expect("worker finished").is_none());

    let run_dir = controller.run_root().path().to_owned();
    let summary = controller
        .finish()
        .expect("assembled")
        .expect("controller assembles");
    assert_eq!(summary.stores, 3, "controller store holds session properties");
    assert_eq!(summary.cases, 4);
    assert_eq!(summary.attempts, 4);
    assert_eq!(summary.failed_cases, 2);
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert!(summary.run_root_removed);
    assert!(!run_dir.exists());

    let report = parse_report(&summary.report_path);
    assert_eq!(report.cases.len(), 4);
    assert_eq!(
        report.suite_properties,
        vec![("build".to_owned(), "1234".to_owned())]
    );

    let login = report.cases_named("test_login");
    assert_eq!(login.len(), 1);
    assert_eq!(login[0].classname, "tests.test_api");
    assert_eq!(login[0].status, "failure");
    assert_eq!(login[0].message.as_deref(), Some("assert 401 == 200"));
    let trace = login[0].text.as_deref().expect("failure has a trace");
    assert!(trace.contains("tests/test_api.py"), "{trace}");
    assert!(trace.contains("assert response.status == 200"), "{trace}");
    assert!(!trace.contains("_pytest"), "framework frames stripped: {trace}");
    assert!(!trace.contains("pluggy"), "framework frames stripped: {trace}");

    let select = report.cases_named("test_select[sqlite]");
    assert_eq!(select.len(), 1);
    assert_eq!(select[0].classname, "tests.test_db.TestQueries");
    assert_eq!(select[0].property("disposition"), Some("passed"));

    // Only the report remains next to it: no temporary files.
    let leftovers: Vec<_> = summary
        .report_path
        .parent()
        .expect("report has a parent")
        .read_dir_utf8()
        .expect("report dir readable")
        .map(|entry| entry.expect("entry readable").file_name().to_owned())
        .collect();
    assert_eq!(leftovers, vec!["junit.xml".to_owned()]);
}

#[test]
fn fail_fail_pass_keeps_every_attempt() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let mut controller = controller(&dir, MetadataEnricher::new());
    let node_id = "tests/test_api.py::test_flaky";
    controller
        .record_attempt(failed(node_id, "timeout"))
        .expect("recorded");
    controller
        .record_attempt(failed(node_id, "timeout"))
        .expect("recorded");
    controller.record_attempt(passed(node_id)).expect("recorded");

    let summary = controller
        .finish()
        .expect("assembled")
        .expect("controller assembles");
    assert_eq!(summary.cases, 1);
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.failed_cases, 0);

    let report = parse_report(&summary.report_path);
    let attempts = report.cases_named("test_flaky");
    assert_eq!(attempts.len(), 3);
    let statuses: Vec<_> = attempts.iter().map(|case| case.status.as_str()).collect();
    assert_eq!(statuses, vec!["failure", "failure", "passed"]);
    let numbers: Vec<_> = attempts
        .iter()
        .map(|case| case.property("attempt").expect("attempt number"))
        .collect();
    assert_eq!(numbers, vec!["0", "1", "2"]);

    let last = attempts[2];
    assert_eq!(last.property("disposition"), Some("passed after 2 retries"));
    assert_eq!(last.property("rerun-count"), Some("2"));
    assert_eq!(attempts[0].property("disposition"), None);
}

#[test]
fn concurrent_workers_do_not_interfere() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let controller = controller(&dir, MetadataEnricher::new());
    let run_dir = controller.run_root().path().to_owned();

    std::thread::scope(|scope| {
        for index in 0..4 {
            let (dir, run_dir) = (&dir, &run_dir);
            scope.spawn(move || {
                let run_root = RunRoot::open(run_dir).expect("run root opens");
                let mut session = SpoolSession::join_worker_in(
                    config(dir),
                    MetadataEnricher::new(),
                    run_root,
                    WorkerId::new(format!("gw{index}")),
                )
                .expect("worker joined");
                for test in 0..25 {
                    session
                        .record_attempt(passed(&format!(
                            "tests/test_w{index}.py::test_{test}"
                        )))
                        .expect("recorded");
                }
            });
        }
    });

    let summary = controller
        .finish()
        .expect("assembled")
        .expect("controller assembles");
    assert_eq!(summary.cases, 100);
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert_eq!(parse_report(&summary.report_path).cases.len(), 100);
}

struct DocstringProvider;

impl MetadataProvider for DocstringProvider {
    fn name(&self) -> &str {
        "docstring"
    }

    fn case_metadata(
        &self,
        identity: &TestIdentity,
        _outcome: Outcome,
    ) -> Result<Vec<Property>, ProviderError> {
        Ok(vec![Property::new(
            "docstring",
            format!("Checks {}.", identity.name),
        )])
    }
}

struct UnreachableTracker;

impl IssueTracker for UnreachableTracker {
    fn describe(&self) -> String {
        "unreachable tracker".to_owned()
    }

    fn find_issue(
        &self,
        _signature: &FailureSignature,
    ) -> Result<Option<IssueInfo>, IssueLookupError> {
        Err(IssueLookupError::Network {
            endpoint: "https://jira.invalid".to_owned(),
            source: "connection refused".into(),
        })
    }
}

#[test]
fn failing_tracker_degrades_to_no_issue() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let mut enricher = MetadataEnricher::new();
    enricher.register(DocstringProvider);
    let mut controller = controller(&dir, enricher);
    controller
        .record_attempt(failed("tests/test_api.py::test_login", "assert 401 == 200"))
        .expect("recorded");
    controller
        .record_attempt(failed("tests/test_api.py::test_logout", "assert 500 == 200"))
        .expect("recorded");

    let summary = controller
        .finish_with_tracker(UnreachableTracker)
        .expect("a failing tracker does not fail the run")
        .expect("controller assembles");

    let lookup_failures: Vec<_> = summary
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::IssueLookupFailed)
        .collect();
    assert_eq!(lookup_failures.len(), 2, "one per distinct signature");
    assert!(
        lookup_failures[0].message.contains("connection refused"),
        "{}",
        lookup_failures[0].message
    );

    let report = parse_report(&summary.report_path);
    assert_eq!(
        report.suite_properties,
        vec![("build".to_owned(), "1234".to_owned())]
    );
    let login = report.cases_named("test_login")[0];
    assert_eq!(login.message.as_deref(), Some("assert 401 == 200"));
    assert_eq!(login.property("docstring"), Some("Checks test_login."));
    assert!(
        login.properties.iter().all(|(name, _)| !name.starts_with("issue.")),
        "{:?}",
        login.properties
    );
}

#[test]
fn partial_tracker_config_is_reported() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let mut builder = SpoolConfig::builder();
    builder
        .report_path(dir.path().join("junit.xml"))
        .issue_tracker_url("https://jira.example.com");
    let config = builder.build().expect("partial config is not an error");
    assert!(config.issue_tracker().is_none());

    let mut session =
        SpoolSession::start_controller(config, MetadataEnricher::new()).expect("started");
    session
        .record_attempt(failed("tests/test_api.py::test_login", "boom"))
        .expect("recorded");
    let summary = session
        .finish()
        .expect("assembled")
        .expect("controller assembles");
    assert!(
        summary
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::IssueTrackerDisabled),
        "{:?}",
        summary.diagnostics
    );
    let login = &parse_report(&summary.report_path).cases[0];
    assert_eq!(login.message.as_deref(), Some("boom"));
}
