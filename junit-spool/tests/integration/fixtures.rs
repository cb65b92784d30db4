// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use junit_spool::{
    AttemptEvent, MetadataEnricher, Outcome, RunRoot, SpoolConfig, SpoolSession, StackFrame,
    WorkerId,
};
use quick_xml::{Reader, events::Event};
use std::time::Duration;

pub(crate) fn config(dir: &Utf8TempDir) -> SpoolConfig {
    let mut builder = SpoolConfig::builder();
    builder
        .report_path(dir.path().join("reports/junit.xml"))
        .report_name("pytest")
        .property("build", "1234");
    builder.build().expect("config builds")
}

pub(crate) fn controller(dir: &Utf8TempDir, enricher: MetadataEnricher) -> SpoolSession {
    SpoolSession::start_controller(config(dir), enricher).expect("controller started")
}

pub(crate) fn worker(dir: &Utf8TempDir, controller: &SpoolSession, id: &str) -> SpoolSession {
    let run_root = RunRoot::open(controller.run_root().path()).expect("run root opens");
    SpoolSession::join_worker_in(
        config(dir),
        MetadataEnricher::new(),
        run_root,
        WorkerId::new(id),
    )
    .expect("worker joined")
}

pub(crate) fn passed(node_id: &str) -> AttemptEvent {
    AttemptEvent::new(node_id, Outcome::Passed, Duration::from_millis(20))
}

/// A failure whose trace is wrapped in framework frames on both sides.
pub(crate) fn failed(node_id: &str, message: &str) -> AttemptEvent {
    let mut event = AttemptEvent::new(node_id, Outcome::Failed, Duration::from_millis(40));
    event.message = Some(message.to_owned());
    event.trace = Some(vec![
        StackFrame::new("/venv/lib/_pytest/runner.py")
            .with_module("_pytest.runner")
            .with_line(341)
            .with_function("call_and_report"),
        StackFrame::new("/venv/lib/pluggy/_callers.py")
            .with_module("pluggy._callers")
            .with_line(103)
            .with_function("_multicall"),
        StackFrame::new("tests/test_api.py")
            .with_module("tests.test_api")
            .with_line(12)
            .with_function("test_login")
            .with_text("assert response.status == 200"),
        StackFrame::new("/venv/lib/_pytest/assertion/rewrite.py")
            .with_module("_pytest.assertion.rewrite")
            .with_line(88)
            .with_function("rewrite"),
    ]);
    event
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ParsedCase {
    pub(crate) classname: String,
    pub(crate) name: String,
    /// `passed`, `failure`, `error` or `skipped`.
    pub(crate) status: String,
    pub(crate) message: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) properties: Vec<(String, String)>,
}

impl ParsedCase {
    pub(crate) fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ParsedReport {
    pub(crate) suite_properties: Vec<(String, String)>,
    pub(crate) cases: Vec<ParsedCase>,
}

impl ParsedReport {
    pub(crate) fn cases_named(&self, name: &str) -> Vec<&ParsedCase> {
        self.cases.iter().filter(|case| case.name == name).collect()
    }
}

fn attribute(event: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    event
        .attributes()
        .map(|attr| attr.expect("valid attribute"))
        .find(|attr| attr.key.as_ref() == name.as_bytes())
        .map(|attr| attr.unescape_value().expect("valid value").into_owned())
}

/// Parses the parts of a published report that tests check.
pub(crate) fn parse_report(path: &Utf8Path) -> ParsedReport {
    let xml = std::fs::read_to_string(path).expect("report exists");
    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);

    let mut report = ParsedReport::default();
    let mut in_case = false;
    let mut in_status = false;
    loop {
        let event = reader.read_event().expect("well-formed XML");
        match &event {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"testcase" => {
                report.cases.push(ParsedCase {
                    classname: attribute(&e, "classname").unwrap_or_default(),
                    name: attribute(&e, "name").expect("testcase has a name"),
                    status: "passed".to_owned(),
                    ..ParsedCase::default()
                });
                in_case = matches!(event, Event::Start(_));
            }
            Event::Start(e) | Event::Empty(e)
                if matches!(e.name().as_ref(), b"failure" | b"error" | b"skipped") =>
            {
                let case = report.cases.last_mut().expect("status inside testcase");
                case.status = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                case.message = attribute(&e, "message");
                in_status = matches!(event, Event::Start(_));
            }
            Event::Empty(e) if e.name().as_ref() == b"property" => {
                let pair = (
                    attribute(&e, "name").expect("property has a name"),
                    attribute(&e, "value").expect("property has a value"),
                );
                if in_case {
                    report.cases.last_mut().expect("inside testcase").properties.push(pair);
                } else {
                    report.suite_properties.push(pair);
                }
            }
            Event::Text(text) if in_status => {
                let case = report.cases.last_mut().expect("inside testcase");
                case.text = Some(text.unescape().expect("valid text").into_owned());
            }
            Event::End(e) => match e.name().as_ref() {
                b"testcase" => in_case = false,
                b"failure" | b"error" | b"skipped" => in_status = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    report
}
