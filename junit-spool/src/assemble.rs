// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging every store under a run root into one published report.

use crate::{
    attempt::{Attempt, Outcome},
    config::SpoolConfig,
    diagnostics::{Diagnostic, DiagnosticKind},
    errors::{AssembleError, DisplayErrorChain},
    issue::{FailureSignature, IssueLookup, LookupOutcome},
    metadata::{MetadataEnricher, Property},
    rerun::{CaseRecord, RerunAggregator},
    sanitize::render,
    store::{RunRoot, read_store},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use std::{io::Write, time::Duration};
use tracing::{debug, info};
use xunit_report::{NonSuccessKind, Report, ReportUuid, TestCase, TestCaseStatus, TestSuite};

/// Options for a single assembly.
#[derive(Clone, Debug)]
pub struct AssembleOptions {
    /// Where to publish the report. Defaults to the report path recorded in the run root.
    pub output_path: Option<Utf8PathBuf>,

    /// Whether to delete the run root after the report is published.
    pub remove_run_root: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            output_path: None,
            remove_run_root: true,
        }
    }
}

/// What an assembly produced.
#[derive(Clone, Debug)]
pub struct AssembleSummary {
    /// The published report.
    pub report_path: Utf8PathBuf,

    /// The run the report belongs to.
    pub run_id: ReportUuid,

    /// The number of stores read.
    pub stores: usize,

    /// The number of distinct tests.
    pub cases: usize,

    /// The number of attempts, counting reruns.
    pub attempts: usize,

    /// The number of tests whose final attempt failed or errored.
    pub failed_cases: usize,

    /// Whether the run root was deleted.
    pub run_root_removed: bool,

    /// Every non-fatal problem encountered, in the order found.
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds and publishes the final report for a run.
#[derive(Debug)]
pub struct ReportAssembler {
    store_success_output: bool,
    store_failure_output: bool,
    enricher: MetadataEnricher,
    issue_lookup: Option<IssueLookup>,
    config_diagnostics: Vec<Diagnostic>,
}

impl ReportAssembler {
    /// Creates an assembler. The enricher's session providers run once per assembly.
    pub fn new(config: &SpoolConfig, enricher: MetadataEnricher) -> Self {
        Self {
            store_success_output: config.store_success_output(),
            store_failure_output: config.store_failure_output(),
            enricher,
            issue_lookup: None,
            config_diagnostics: config.diagnostics().to_vec(),
        }
    }

    /// Looks up issues for failing tests through `lookup`.
    pub fn with_issue_lookup(mut self, lookup: IssueLookup) -> Self {
        self.issue_lookup = Some(lookup);
        self
    }

    /// Reads every store in `run_root` and atomically publishes the merged report.
    ///
    /// Corrupt entries and unreadable stores are skipped with a diagnostic. If the report cannot
    /// be renamed into place, the complete temporary file is kept and
    /// [`AssembleError::Publish`] names it; the run root is left untouched in that case.
    pub fn assemble(
        &mut self,
        run_root: RunRoot,
        options: &AssembleOptions,
    ) -> Result<AssembleSummary, AssembleError> {
        let mut diagnostics = self.config_diagnostics.clone();
        let metadata = run_root.metadata().clone();
        let output_path = options
            .output_path
            .clone()
            .unwrap_or_else(|| metadata.report_path.clone());

        let store_paths = run_root.store_paths().map_err(AssembleError::ListStores)?;
        let mut session_properties = IndexSet::new();
        let mut aggregator = RerunAggregator::new();
        let mut unreadable_stores = 0;
        for (store_index, path) in store_paths.iter().enumerate() {
            match read_store(path, store_index) {
                Ok(contents) => {
                    debug!(
                        "read {} attempts from store {path}",
                        contents.attempts.len()
                    );
                    session_properties.extend(contents.session_properties);
                    aggregator.extend(contents.attempts);
                    diagnostics.extend(contents.diagnostics);
                }
                Err(error) => {
                    unreadable_stores += 1;
                    diagnostics.push(Diagnostic::warn(
                        DiagnosticKind::StoreUnreadable,
                        format!("skipped store: {}", DisplayErrorChain::new(&error)),
                    ));
                }
            }
        }

        let collected = self.enricher.collect_session_properties();
        session_properties.extend(collected.properties);
        diagnostics.extend(collected.diagnostics);

        let aggregation = aggregator.finish();
        diagnostics.extend(aggregation.diagnostics);

        let mut suite = TestSuite::new(metadata.report_name.as_str());
        suite.set_timestamp(metadata.started_at);
        if let Some(hostname) = session_properties.iter().find(|p| p.name == "hostname") {
            suite
                .extra
                .insert("hostname".into(), hostname.value.as_str().into());
        }
        suite.add_properties(session_properties.iter());

        let mut total_time = Duration::ZERO;
        let mut attempts = 0;
        let mut failed_cases = 0;
        for case in &aggregation.cases {
            if case.final_outcome().is_failure() {
                failed_cases += 1;
            }
            let issue = self.lookup_issue(case);
            for attempt in case.attempts() {
                total_time += attempt.duration;
                attempts += 1;
                let is_final = attempt.sequence == case.final_attempt().sequence;
                suite.add_test_case(self.build_test_case(
                    case,
                    attempt,
                    is_final.then_some(&issue),
                ));
            }
        }
        suite.set_time(total_time);

        if let Some(lookup) = &mut self.issue_lookup {
            diagnostics.extend(lookup.take_diagnostics());
        }

        let mut report = Report::new(metadata.report_name.as_str());
        report
            .set_uuid(metadata.run_id)
            .set_timestamp(metadata.started_at)
            .set_time(total_time)
            .add_test_suite(suite);

        publish(&report, &output_path)?;
        info!(
            "published report with {} tests ({attempts} attempts) to {output_path}",
            aggregation.cases.len()
        );

        let mut run_root_removed = false;
        if options.remove_run_root {
            if unreadable_stores > 0 {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::CleanupFailed,
                    format!(
                        "keeping run directory {} because {unreadable_stores} store(s) \
                         could not be read",
                        run_root.path()
                    ),
                ));
            } else {
                let path = run_root.path().to_owned();
                match run_root.remove() {
                    Ok(()) => {
                        debug!("removed run directory {path}");
                        run_root_removed = true;
                    }
                    Err(error) => diagnostics.push(Diagnostic::warn(
                        DiagnosticKind::CleanupFailed,
                        format!("failed to remove run directory {path}: {error}"),
                    )),
                }
            }
        }

        Ok(AssembleSummary {
            report_path: output_path,
            run_id: metadata.run_id,
            stores: store_paths.len(),
            cases: aggregation.cases.len(),
            attempts,
            failed_cases,
            run_root_removed,
            diagnostics,
        })
    }

    fn lookup_issue(&mut self, case: &CaseRecord) -> Option<(FailureSignature, LookupOutcome)> {
        let lookup = self.issue_lookup.as_mut()?;
        let final_attempt = case.final_attempt();
        if !final_attempt.outcome.is_failure() {
            return None;
        }
        let identity = case.identity();
        let signature = FailureSignature::new(
            &identity.classname(),
            &identity.case_name(),
            final_attempt.message.as_deref().unwrap_or_default(),
        );
        let outcome = lookup.lookup(&signature);
        Some((signature, outcome))
    }

    /// `issue` is `Some` only for the final attempt.
    fn build_test_case(
        &self,
        case: &CaseRecord,
        attempt: &Attempt,
        issue: Option<&Option<(FailureSignature, LookupOutcome)>>,
    ) -> TestCase {
        let identity = case.identity();
        let mut message = attempt.message.clone();
        let mut issue_properties = Vec::new();
        if let Some(Some((signature, outcome))) = issue {
            match outcome {
                // The original message stays in the failure text.
                LookupOutcome::Found(issue) => {
                    message = Some(issue.failure_message());
                    issue_properties = issue.properties();
                }
                LookupOutcome::NotFound => {
                    message = Some(format!(
                        "{}@@{}",
                        message.as_deref().unwrap_or_default(),
                        signature.marker()
                    ));
                }
                LookupOutcome::Failed => {}
            }
        }

        let mut status = match attempt.outcome {
            Outcome::Passed => TestCaseStatus::success(),
            Outcome::Failed => TestCaseStatus::non_success(NonSuccessKind::Failure),
            Outcome::Errored => TestCaseStatus::non_success(NonSuccessKind::Error),
            Outcome::Skipped => TestCaseStatus::skipped(),
        };
        if let Some(message) = &message {
            status.set_message(message.as_str());
        }
        match attempt.outcome {
            Outcome::Failed | Outcome::Errored => {
                let description = match attempt.trace.as_deref() {
                    Some(frames) if !frames.is_empty() => {
                        Some(render(frames, attempt.message.as_deref()))
                    }
                    _ => attempt.message.clone(),
                };
                if let Some(description) = description {
                    status.set_description(description);
                }
            }
            Outcome::Skipped => {
                status.set_type("skip");
                if let (Some(location), Some(message)) = (&attempt.location, &attempt.message) {
                    let description = match location.line {
                        Some(line) => format!("{}:{line}: {message}", location.file),
                        None => format!("{}: {message}", location.file),
                    };
                    status.set_description(description);
                }
            }
            Outcome::Passed => {}
        }

        let mut test_case = TestCase::new(identity.case_name(), status);
        test_case
            .set_classname(identity.classname())
            .set_timestamp(attempt.started_at)
            .set_time(attempt.duration);
        if let Some(location) = &attempt.location {
            test_case.set_location(location.file.as_str(), location.line);
        }

        let store_output = if attempt.outcome.is_failure() {
            self.store_failure_output
        } else {
            self.store_success_output
        };
        if store_output {
            if let Some(stdout) = &attempt.stdout {
                test_case.set_system_out(stdout.as_str());
            }
            if let Some(stderr) = &attempt.stderr {
                test_case.set_system_err(stderr.as_str());
            }
        }

        test_case.add_properties(attempt.properties.iter());
        test_case.add_property(&Property::new("attempt", attempt.sequence.to_string()));
        if issue.is_some() {
            test_case
                .add_property(&Property::new("rerun-count", case.rerun_count().to_string()))
                .add_property(&Property::new("disposition", case.disposition().to_string()))
                .add_properties(issue_properties.iter());
        }
        test_case
    }
}

/// Writes the report to a temporary file next to `output_path`, then renames it into place.
fn publish(report: &Report, output_path: &Utf8Path) -> Result<(), AssembleError> {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|error| AssembleError::CreateDir {
        dir: dir.to_owned(),
        error,
    })?;

    let prefix = format!(".{}.", output_path.file_name().unwrap_or("report"));
    let mut file = camino_tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|error| AssembleError::TempCreate {
            dir: dir.to_owned(),
            error,
        })?;
    let temp_path = file.path().to_owned();

    report
        .serialize(&mut file)
        .map_err(|error| AssembleError::Serialize {
            output_path: output_path.to_owned(),
            error,
        })?;
    file.flush()
        .and_then(|()| file.as_file().sync_all())
        .map_err(|error| AssembleError::TempWrite {
            temp_path: temp_path.clone(),
            error,
        })?;

    match file.persist(output_path) {
        Ok(_) => Ok(()),
        Err(persist_error) => {
            if let Err(keep_error) = persist_error.file.keep() {
                tracing::warn!(
                    "failed to keep temporary report {temp_path}: {}",
                    keep_error.error
                );
            }
            Err(AssembleError::Publish {
                output_path: output_path.to_owned(),
                temp_path,
                error: persist_error.error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attempt::{SourceLocation, StackFrame},
        errors::IssueLookupError,
        issue::{IssueInfo, IssueTracker},
        metadata::StaticProvider,
        store::{ResultRecorder, WorkerId},
        test_helpers::*,
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn config(dir: &Utf8TempDir) -> SpoolConfig {
        let mut builder = SpoolConfig::builder();
        builder.report_path(dir.path().join("junit.xml"));
        builder.build().expect("config builds")
    }

    struct FixedTracker(Option<IssueInfo>);

    impl IssueTracker for FixedTracker {
        fn describe(&self) -> String {
            "fixed tracker".to_owned()
        }

        fn find_issue(
            &self,
            _signature: &FailureSignature,
        ) -> Result<Option<IssueInfo>, IssueLookupError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn assembles_reruns_and_session_properties() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut recorder = ResultRecorder::new(&run_root, WorkerId::controller());
        recorder
            .record_session_properties(&[Property::new("build", "42")])
            .expect("recorded properties");

        let mut failed = attempt(0, Outcome::Failed);
        failed.trace = Some(vec![
            StackFrame::new("tests/test_mod.py")
                .with_line(12)
                .with_function("test_flaky")
                .with_text("assert False"),
        ]);
        failed.stdout = Some("first try".to_owned());
        recorder.record(&identity("test_flaky"), &failed).expect("recorded");
        let mut passed = attempt(1, Outcome::Passed);
        passed.stdout = Some("second try".to_owned());
        recorder.record(&identity("test_flaky"), &passed).expect("recorded");

        let mut enricher = MetadataEnricher::new();
        enricher.register(StaticProvider::new([("build", "42"), ("branch", "main")]));
        let mut assembler = ReportAssembler::new(&config(&dir), enricher);
        let summary = assembler
            .assemble(run_root, &AssembleOptions::default())
            .expect("assembled");

        assert_eq!(summary.cases, 1);
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.failed_cases, 0);
        assert!(summary.run_root_removed);
        assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);

        let xml = std::fs::read_to_string(&summary.report_path).expect("report exists");
        assert_eq!(xml.matches(r#"<property name="build" value="42"/>"#).count(), 1);
        assert!(xml.contains(r#"<property name="branch" value="main"/>"#), "{xml}");
        assert_eq!(xml.matches("<testcase ").count(), 2);
        assert!(xml.contains("Traceback (most recent call last):"), "{xml}");
        assert!(xml.contains("AssertionError: attempt 0"), "{xml}");
        assert!(xml.contains("first try"), "failure output is kept: {xml}");
        assert!(!xml.contains("second try"), "success output is dropped: {xml}");
        assert!(
            xml.contains(r#"<property name="disposition" value="passed after 1 retry"/>"#),
            "{xml}"
        );
    }

    #[test]
    fn found_issue_replaces_message() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut recorder = ResultRecorder::new(&run_root, WorkerId::controller());
        recorder
            .record(&identity("test_login"), &attempt(0, Outcome::Failed))
            .expect("recorded");

        let issue = IssueInfo {
            id: "PROJ-7".to_owned(),
            status: "Open".to_owned(),
            summary: "Login flakes".to_owned(),
            issue_type: "Bug".to_owned(),
            url: "https://jira.example.com/browse/PROJ-7".to_owned(),
        };
        let mut assembler = ReportAssembler::new(&config(&dir), MetadataEnricher::new())
            .with_issue_lookup(IssueLookup::new(FixedTracker(Some(issue))));
        let summary = assembler
            .assemble(run_root, &AssembleOptions::default())
            .expect("assembled");

        let xml = std::fs::read_to_string(&summary.report_path).expect("report exists");
        assert!(
            xml.contains(
                r#"message="Known issue https://jira.example.com/browse/PROJ-7 Bug [Login flakes]""#
            ),
            "{xml}"
        );
        assert!(xml.contains(">AssertionError: attempt 0<"), "{xml}");
        assert!(xml.contains(r#"<property name="issue.id" value="PROJ-7"/>"#), "{xml}");
    }

    #[test]
    fn missing_issue_adds_marker() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut recorder = ResultRecorder::new(&run_root, WorkerId::controller());
        recorder
            .record(&identity("test_login"), &attempt(0, Outcome::Errored))
            .expect("recorded");

        let mut assembler = ReportAssembler::new(&config(&dir), MetadataEnricher::new())
            .with_issue_lookup(IssueLookup::new(FixedTracker(None)));
        let summary = assembler
            .assemble(run_root, &AssembleOptions::default())
            .expect("assembled");
        assert_eq!(summary.failed_cases, 1);

        let identity = identity("test_login");
        let signature = FailureSignature::new(
            &identity.classname(),
            &identity.case_name(),
            "AssertionError: attempt 0",
        );
        let xml = std::fs::read_to_string(&summary.report_path).expect("report exists");
        assert!(
            xml.contains(&format!(r#"message="AssertionError: attempt 0@@testid#{signature}""#)),
            "{xml}"
        );
        assert!(xml.contains("<error "), "{xml}");
    }

    #[test]
    fn missing_issue_marker_without_message() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut recorder = ResultRecorder::new(&run_root, WorkerId::controller());
        let mut failed = attempt(0, Outcome::Failed);
        failed.message = None;
        recorder
            .record(&identity("test_login"), &failed)
            .expect("recorded");

        let mut assembler = ReportAssembler::new(&config(&dir), MetadataEnricher::new())
            .with_issue_lookup(IssueLookup::new(FixedTracker(None)));
        let summary = assembler
            .assemble(run_root, &AssembleOptions::default())
            .expect("assembled");

        let identity = identity("test_login");
        let signature = FailureSignature::new(&identity.classname(), &identity.case_name(), "");
        let xml = std::fs::read_to_string(&summary.report_path).expect("report exists");
        assert!(
            xml.contains(&format!(r#"message="@@testid#{signature}""#)),
            "{xml}"
        );
    }

    #[test]
    fn skipped_description_includes_location() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut recorder = ResultRecorder::new(&run_root, WorkerId::controller());
        let mut skipped = attempt(0, Outcome::Skipped);
        skipped.message = Some("needs network".to_owned());
        skipped.location = Some(SourceLocation {
            file: "tests/test_mod.py".to_owned(),
            line: Some(30),
        });
        recorder.record(&identity("test_remote"), &skipped).expect("recorded");

        let mut assembler = ReportAssembler::new(&config(&dir), MetadataEnricher::new());
        let summary = assembler
            .assemble(run_root, &AssembleOptions::default())
            .expect("assembled");
        let xml = std::fs::read_to_string(&summary.report_path).expect("report exists");
        assert!(xml.contains("tests/test_mod.py:30: needs network"), "{xml}");
        assert!(xml.contains(r#"skipped="1""#), "{xml}");
    }

    #[test]
    fn empty_run_produces_empty_suite() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let run_root = temp_run_root(&dir);
        let mut assembler = ReportAssembler::new(&config(&dir), MetadataEnricher::new());
        let summary = assembler
            .assemble(
                run_root,
                &AssembleOptions {
                    output_path: Some(dir.path().join("nested/out.xml")),
                    remove_run_root: false,
                },
            )
            .expect("assembled");
        assert_eq!(summary.cases, 0);
        assert_eq!(summary.stores, 0);
        assert!(!summary.run_root_removed);
        let xml = std::fs::read_to_string(dir.path().join("nested/out.xml")).expect("exists");
        assert!(xml.contains(r#"<testsuite name="pytest" tests="0""#), "{xml}");
    }
}
