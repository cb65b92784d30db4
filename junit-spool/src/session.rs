// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hooks a host test runner calls over the course of a run.

use crate::{
    assemble::{AssembleOptions, AssembleSummary, ReportAssembler},
    attempt::{Attempt, Outcome, SourceLocation, StackFrame},
    config::SpoolConfig,
    diagnostics::Diagnostic,
    errors::SessionError,
    identity::TestIdentity,
    issue::{IssueLookup, IssueTracker, JiraTracker},
    metadata::{MetadataEnricher, Property},
    store::{RUN_DIR_ENV, ResultRecorder, RunRoot, WorkerId, read_store},
};
use camino::Utf8Path;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tracing::debug;

/// A completed test attempt as reported by the host runner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttemptEvent {
    /// The host's node id, e.g. `tests/test_api.py::TestLogin::test_ok[admin]`.
    pub node_id: String,

    /// The attempt number. If omitted, attempts of the same test recorded by this worker are
    /// numbered 0, 1, 2, ..., continuing after any attempts already in the worker's store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,

    /// The outcome.
    pub outcome: Outcome,

    /// How long the attempt took.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// When the attempt started. Defaults to the time the event is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<FixedOffset>>,

    /// The failure, error, or skip message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The raw failure trace, outermost frame first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<StackFrame>>,

    /// Where the test is defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,

    /// Captured standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Captured standard error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    /// Properties the host attached to this attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl AttemptEvent {
    /// Creates an event with no message, trace, output, or properties.
    pub fn new(node_id: impl Into<String>, outcome: Outcome, duration: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            sequence: None,
            outcome,
            duration,
            started_at: None,
            message: None,
            trace: None,
            location: None,
            stdout: None,
            stderr: None,
            properties: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Role {
    Controller,
    Worker,
}

/// One process's view of a run: the controller, which creates the run root and assembles the
/// report, or a worker, which only records.
#[derive(Debug)]
pub struct SpoolSession {
    role: Role,
    config: SpoolConfig,
    run_root: RunRoot,
    recorder: ResultRecorder,
    enricher: MetadataEnricher,
    next_sequence: HashMap<TestIdentity, u32>,
    diagnostics: Vec<Diagnostic>,
}

impl SpoolSession {
    /// Starts a run in the controlling process.
    ///
    /// Creates the run root and durably records the session properties: the configured static
    /// properties followed by everything `enricher`'s providers return. Workers must be told
    /// about the run root through [`Self::env_var`].
    pub fn start_controller(
        config: SpoolConfig,
        enricher: MetadataEnricher,
    ) -> Result<Self, SessionError> {
        let run_root = RunRoot::create(
            config.run_root_parent(),
            config.report_path(),
            config.report_name(),
        )?;
        debug!("started run {} in {}", run_root.metadata().run_id, run_root.path());

        let mut session = Self::new(
            Role::Controller,
            config,
            enricher,
            run_root,
            WorkerId::controller(),
        );
        let collected = session.enricher.collect_session_properties();
        session.diagnostics.extend(collected.diagnostics);
        let mut properties = session.config.static_properties().to_vec();
        properties.extend(collected.properties);
        if !properties.is_empty() {
            session.recorder.record_session_properties(&properties)?;
        }
        Ok(session)
    }

    /// Joins the run whose root is named by the `JUNIT_SPOOL_RUN_DIR` environment variable.
    pub fn join_worker(
        config: SpoolConfig,
        enricher: MetadataEnricher,
        worker_id: WorkerId,
    ) -> Result<Self, SessionError> {
        let run_root = RunRoot::from_env()?;
        Self::join_worker_in(config, enricher, run_root, worker_id)
    }

    /// Joins the run at an explicitly opened run root.
    pub fn join_worker_in(
        config: SpoolConfig,
        enricher: MetadataEnricher,
        run_root: RunRoot,
        worker_id: WorkerId,
    ) -> Result<Self, SessionError> {
        debug!("worker {worker_id} joined run {}", run_root.metadata().run_id);
        let mut session = Self::new(Role::Worker, config, enricher, run_root, worker_id);
        session.resume_sequences()?;
        Ok(session)
    }

    fn new(
        role: Role,
        config: SpoolConfig,
        enricher: MetadataEnricher,
        run_root: RunRoot,
        worker_id: WorkerId,
    ) -> Self {
        let recorder = ResultRecorder::new(&run_root, worker_id);
        Self {
            role,
            config,
            run_root,
            recorder,
            enricher,
            next_sequence: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Continues attempt numbering after what an earlier process with the same worker id
    /// recorded, so that its reruns are not mistaken for duplicates.
    fn resume_sequences(&mut self) -> Result<(), SessionError> {
        let store_path = self.recorder.store_path();
        if !store_path.exists() {
            return Ok(());
        }
        let contents = read_store(store_path, 0)?;
        for stored in &contents.attempts {
            let next = self.next_sequence.entry(stored.identity.clone()).or_insert(0);
            *next = (*next).max(stored.attempt.sequence.saturating_add(1));
        }
        if !contents.attempts.is_empty() {
            debug!(
                "resuming {} with {} attempts of {} tests already recorded",
                store_path,
                contents.attempts.len(),
                self.next_sequence.len(),
            );
        }
        Ok(())
    }

    /// Returns true if this is the controlling process.
    pub fn is_controller(&self) -> bool {
        self.role == Role::Controller
    }

    /// Returns the run root.
    pub fn run_root(&self) -> &RunRoot {
        &self.run_root
    }

    /// Returns the environment variable, and its value, that workers need to join this run.
    pub fn env_var(&self) -> (&'static str, &Utf8Path) {
        (RUN_DIR_ENV, self.run_root.path())
    }

    /// Returns the non-fatal problems found by this session so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Durably records one attempt.
    ///
    /// Failure traces are sanitized, and traces of passing or skipped attempts are dropped.
    /// Case properties from the registered providers are appended to the event's own.
    pub fn record_attempt(&mut self, event: AttemptEvent) -> Result<(), SessionError> {
        let identity = TestIdentity::parse_node_id(&event.node_id)?;
        let next = self.next_sequence.entry(identity.clone()).or_insert(0);
        let sequence = event.sequence.unwrap_or(*next);
        *next = (*next).max(sequence.saturating_add(1));

        let started_at = event
            .started_at
            .unwrap_or_else(|| Local::now().fixed_offset());
        let mut attempt = Attempt::new(sequence, event.outcome, event.duration, started_at);
        attempt.message = event.message;
        attempt.location = event.location;
        attempt.stdout = event.stdout;
        attempt.stderr = event.stderr;
        if event.outcome.is_failure() {
            attempt.trace = event
                .trace
                .map(|frames| self.config.sanitizer().sanitize(&frames));
        }

        let collected = self.enricher.collect_case_properties(&identity, event.outcome);
        self.diagnostics.extend(collected.diagnostics);
        attempt.properties = event.properties;
        attempt.properties.extend(collected.properties);

        self.recorder.record(&identity, &attempt)?;
        Ok(())
    }

    /// Ends the session.
    ///
    /// In the controller this assembles and publishes the report, looking up issues through the
    /// configured issue tracker if there is one. In a worker this does nothing and returns
    /// `None`.
    pub fn finish(self) -> Result<Option<AssembleSummary>, SessionError> {
        let lookup = self
            .config
            .issue_tracker()
            .map(|tracker| IssueLookup::new(JiraTracker::new(tracker)));
        self.finish_impl(lookup)
    }

    /// Like [`Self::finish`], but looks up issues through `tracker` instead.
    pub fn finish_with_tracker(
        self,
        tracker: impl IssueTracker + 'static,
    ) -> Result<Option<AssembleSummary>, SessionError> {
        self.finish_impl(Some(IssueLookup::new(tracker)))
    }

    fn finish_impl(
        self,
        lookup: Option<IssueLookup>,
    ) -> Result<Option<AssembleSummary>, SessionError> {
        if self.role == Role::Worker {
            debug!("worker {} finished", self.recorder.worker_id());
            return Ok(None);
        }

        // Session properties were recorded at start, so nothing is re-collected here.
        let mut assembler = ReportAssembler::new(&self.config, MetadataEnricher::new());
        if let Some(lookup) = lookup {
            assembler = assembler.with_issue_lookup(lookup);
        }
        let options = AssembleOptions {
            output_path: Some(self.config.report_path().to_owned()),
            remove_run_root: true,
        };
        let mut summary = assembler.assemble(self.run_root, &options)?;
        let mut diagnostics = self.diagnostics;
        diagnostics.append(&mut summary.diagnostics);
        summary.diagnostics = diagnostics;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::DiagnosticKind, errors::ProviderError, metadata::MetadataProvider,
        store::read_store,
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn config(dir: &Utf8TempDir) -> SpoolConfig {
        let mut builder = SpoolConfig::builder();
        builder
            .report_path(dir.path().join("junit.xml"))
            .property("build", "7");
        builder.build().expect("config builds")
    }

    struct OutcomeProvider;

    impl MetadataProvider for OutcomeProvider {
        fn name(&self) -> &str {
            "outcome"
        }

        fn case_metadata(
            &self,
            _identity: &TestIdentity,
            outcome: Outcome,
        ) -> Result<Vec<Property>, ProviderError> {
            if outcome == Outcome::Skipped {
                return Err(ProviderError::new("skips are not annotated"));
            }
            Ok(vec![Property::new("outcome", outcome.as_str())])
        }
    }

    #[test]
    fn records_and_sanitizes() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let mut enricher = MetadataEnricher::new();
        enricher.register(OutcomeProvider);
        let mut session =
            SpoolSession::start_controller(config(&dir), enricher).expect("session started");
        assert!(session.is_controller());
        assert_eq!(session.env_var().0, RUN_DIR_ENV);

        let mut event = AttemptEvent::new(
            "tests/test_mod.py::test_a",
            Outcome::Failed,
            Duration::from_millis(5),
        );
        event.message = Some("boom".to_owned());
        event.trace = Some(vec![
            StackFrame::new("/venv/_pytest/python.py").with_module("_pytest.python"),
            StackFrame::new("tests/test_mod.py").with_module("tests.test_mod"),
            StackFrame::new("/venv/pluggy/_hooks.py").with_module("pluggy._hooks"),
        ]);
        session.record_attempt(event).expect("recorded");

        let mut passed = AttemptEvent::new(
            "tests/test_mod.py::test_a",
            Outcome::Passed,
            Duration::from_millis(5),
        );
        passed.trace = Some(vec![StackFrame::new("tests/test_mod.py")]);
        session.record_attempt(passed).expect("recorded");
        session
            .record_attempt(AttemptEvent::new(
                "tests/test_mod.py::test_b",
                Outcome::Skipped,
                Duration::ZERO,
            ))
            .expect("recorded");

        assert_eq!(session.diagnostics().len(), 1);
        assert_eq!(session.diagnostics()[0].kind, DiagnosticKind::ProviderFailed);

        let store = session.run_root().store_path(&WorkerId::controller());
        let contents = read_store(&store, 0).expect("store readable");
        assert_eq!(contents.session_properties, vec![Property::new("build", "7")]);
        assert_eq!(contents.attempts.len(), 3);

        let first = &contents.attempts[0].attempt;
        assert_eq!(first.sequence, 0);
        let trace = first.trace.as_ref().expect("failure keeps its trace");
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].module.as_deref(), Some("tests.test_mod"));
        assert_eq!(first.properties, vec![Property::new("outcome", "failed")]);

        let second = &contents.attempts[1].attempt;
        assert_eq!(second.sequence, 1, "sequence assigned per test");
        assert_eq!(second.trace, None);
        assert_eq!(contents.attempts[2].attempt.sequence, 0);
    }

    #[test]
    fn worker_finish_is_a_no_op() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let controller =
            SpoolSession::start_controller(config(&dir), MetadataEnricher::new()).expect("started");
        let run_root = RunRoot::open(controller.run_root().path()).expect("opened");

        let mut worker = SpoolSession::join_worker_in(
            config(&dir),
            MetadataEnricher::new(),
            run_root,
            WorkerId::new("gw0"),
        )
        .expect("joined");
        assert!(!worker.is_controller());
        worker
            .record_attempt(AttemptEvent::new(
                "tests/test_mod.py::test_a",
                Outcome::Passed,
                Duration::ZERO,
            ))
            .expect("recorded");
        assert!(worker.finish().expect("finished").is_none());

        let summary = controller
            .finish()
            .expect("finished")
            .expect("controller assembles");
        assert_eq!(summary.cases, 1);
        assert!(summary.report_path.exists());
    }

    #[test]
    fn rejoined_worker_continues_numbering() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let controller =
            SpoolSession::start_controller(config(&dir), MetadataEnricher::new()).expect("started");
        let join = || {
            let run_root = RunRoot::open(controller.run_root().path()).expect("opened");
            SpoolSession::join_worker_in(
                config(&dir),
                MetadataEnricher::new(),
                run_root,
                WorkerId::new("gw0"),
            )
            .expect("joined")
        };

        // Each attempt is recorded by a fresh process using the same worker id.
        for outcome in [Outcome::Failed, Outcome::Failed, Outcome::Passed] {
            let mut worker = join();
            worker
                .record_attempt(AttemptEvent::new(
                    "tests/test_mod.py::test_flaky",
                    outcome,
                    Duration::ZERO,
                ))
                .expect("recorded");
        }
        let mut other = join();
        other
            .record_attempt(AttemptEvent::new(
                "tests/test_mod.py::test_other",
                Outcome::Passed,
                Duration::ZERO,
            ))
            .expect("recorded");

        let store = controller.run_root().store_path(&WorkerId::new("gw0"));
        let contents = read_store(&store, 0).expect("store readable");
        let sequences: Vec<_> = contents
            .attempts
            .iter()
            .map(|stored| stored.attempt.sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 0]);

        let summary = controller
            .finish()
            .expect("finished")
            .expect("controller assembles");
        assert_eq!(summary.attempts, 4);
        assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    }

    #[test]
    fn invalid_node_id_is_rejected() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let mut session =
            SpoolSession::start_controller(config(&dir), MetadataEnricher::new()).expect("started");
        let error = session
            .record_attempt(AttemptEvent::new("no_separator", Outcome::Passed, Duration::ZERO))
            .expect_err("node id needs a module");
        assert!(matches!(error, SessionError::InvalidEvent(_)), "{error:?}");
    }
}
