// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe, incremental JUnit XML reports for test runs spread across worker processes.
//!
//! # Architecture
//!
//! - Each worker process owns one append-only store under a run-scoped directory (the
//!   [`RunRoot`]), and a [`ResultRecorder`] appends every completed attempt to it, syncing
//!   before returning.
//! - At session end, the [`ReportAssembler`] reads every store, folds attempts into
//!   [`CaseRecord`]s with the [`RerunAggregator`], enriches them with metadata and issue
//!   tracker information, and atomically publishes a single JUnit document.
//! - [`SpoolSession`] ties these together for a host test runner.
//!
//! Nothing is shared between workers except the run directory, and each store has exactly one
//! writer, so no locking is required.

mod assemble;
mod attempt;
mod config;
mod diagnostics;
pub mod errors;
mod identity;
pub mod issue;
mod metadata;
mod rerun;
mod sanitize;
mod session;
mod store;
#[cfg(test)]
mod test_helpers;

pub use assemble::{AssembleOptions, AssembleSummary, ReportAssembler};
pub use attempt::{Attempt, Outcome, SourceLocation, StackFrame};
pub use config::{
    DEFAULT_LOOKUP_TIMEOUT, DEFAULT_REPORT_NAME, IssueTrackerConfig, SpoolConfig,
    SpoolConfigBuilder,
};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use identity::TestIdentity;
pub use metadata::{
    CollectedProperties, EnvProvider, HostProvider, MetadataEnricher, MetadataProvider,
    Property, StaticProvider,
};
pub use rerun::{Aggregation, CaseRecord, Disposition, RerunAggregator};
pub use sanitize::{DEFAULT_DENYLIST, TraceSanitizer, render};
pub use session::{AttemptEvent, SpoolSession};
pub use store::{
    EntryOffset, RUN_DIR_ENV, RUN_METADATA_FILE_NAME, ResultRecorder, RunMetadata, RunRoot,
    STORE_FORMAT_VERSION, StoreContents, StoreFormatVersion, StoredAttempt, WorkerId, read_store,
};
pub use xunit_report::ReportUuid;
