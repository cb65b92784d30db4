// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// The kind of a non-fatal problem encountered while recording or assembling a report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// A metadata provider failed; its contribution was dropped.
    ProviderFailed,

    /// An issue lookup failed; the case carries no issue information.
    IssueLookupFailed,

    /// A store entry was truncated or could not be parsed and was skipped.
    StoreCorruption,

    /// Two different records claimed the same test and attempt number.
    DuplicateAttempt,

    /// A whole store could not be read and was skipped.
    StoreUnreadable,

    /// The run directory could not be removed after publishing.
    CleanupFailed,

    /// The issue tracker was partially configured and has been disabled.
    IssueTrackerDisabled,
}

impl DiagnosticKind {
    /// A short, stable name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProviderFailed => "provider-failed",
            Self::IssueLookupFailed => "issue-lookup-failed",
            Self::StoreCorruption => "store-corruption",
            Self::DuplicateAttempt => "duplicate-attempt",
            Self::StoreUnreadable => "store-unreadable",
            Self::CleanupFailed => "cleanup-failed",
            Self::IssueTrackerDisabled => "issue-tracker-disabled",
        }
    }
}

/// A non-fatal problem. These never abort a run; they are logged and collected into the
/// assembly summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// What went wrong.
    pub kind: DiagnosticKind,

    /// A human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic and logs it as a warning.
    pub fn warn(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(kind = kind.as_str(), "{message}");
        Self { kind, message }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}
