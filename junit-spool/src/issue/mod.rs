// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Looking up known issues for failing tests.
//!
//! Each failure is reduced to a [`FailureSignature`]. Issues in the tracker reference a failure
//! by including `testid#<signature>` in their description, so a lookup is a search for that
//! marker.

mod jira;

pub use jira::JiraTracker;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind},
    errors::{DisplayErrorChain, IssueLookupError},
    metadata::Property,
};
use debug_ignore::DebugIgnore;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, fmt};

/// A stable digest of a failure: test classname, test name without parametrization, and the
/// failure message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FailureSignature(String);

impl FailureSignature {
    /// Computes the signature of a failure.
    pub fn new(classname: &str, name: &str, message: &str) -> Self {
        let name = strip_parameters(name);
        let mut hasher = Sha256::new();
        hasher.update(format!("{classname}.{name}.{message}").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the marker searched for in issue descriptions: `testid#<signature>`.
    pub fn marker(&self) -> String {
        format!("testid#{}", self.0)
    }
}

impl fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_parameters(name: &str) -> &str {
    if name.ends_with(']')
        && let Some(open) = name.find('[')
    {
        &name[..open]
    } else {
        name
    }
}

/// What to make of an issue's status when the failure happens again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IssueResolution {
    /// The issue is open; the failure is expected.
    KnownIssue,

    /// The issue was verified or closed, but the failure is back.
    NeedToReopen,

    /// A fix exists but has not reached this branch yet.
    ResolvedInBranch,
}

impl IssueResolution {
    /// Derives the resolution from an issue status name.
    pub fn from_status(status: &str) -> Self {
        match status {
            "Verified" | "Closed" => Self::NeedToReopen,
            "Resolved" | "In Testing" => Self::ResolvedInBranch,
            _ => Self::KnownIssue,
        }
    }

    /// Returns the human-readable hint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnownIssue => "Known issue",
            Self::NeedToReopen => "Need to reopen",
            Self::ResolvedInBranch => "Resolved in branch",
        }
    }
}

impl fmt::Display for IssueResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue matching a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueInfo {
    /// The issue key, e.g. `PROJ-123`.
    pub id: String,

    /// The issue's workflow status.
    pub status: String,

    /// The issue summary.
    pub summary: String,

    /// The issue type, e.g. `Bug`.
    pub issue_type: String,

    /// A link to the issue.
    pub url: String,
}

impl IssueInfo {
    /// Returns the resolution hint derived from the status.
    pub fn resolution(&self) -> IssueResolution {
        IssueResolution::from_status(&self.status)
    }

    /// Returns the failure message to report in place of the original one.
    pub fn failure_message(&self) -> String {
        format!(
            "{} {} {} [{}]",
            self.resolution(),
            self.url,
            self.issue_type,
            self.summary
        )
    }

    /// Returns the properties describing this issue.
    pub fn properties(&self) -> Vec<Property> {
        vec![
            Property::new("issue.id", self.id.as_str()),
            Property::new("issue.status", self.status.as_str()),
            Property::new("issue.summary", self.summary.as_str()),
            Property::new("issue.type", self.issue_type.as_str()),
            Property::new("issue.url", self.url.as_str()),
            Property::new("issue.resolution", self.resolution().as_str()),
        ]
    }
}

/// An issue tracker that can be searched for failure signatures.
pub trait IssueTracker {
    /// A description of the tracker, used in diagnostics.
    fn describe(&self) -> String;

    /// Returns the most recently updated issue that references `signature`, if any.
    fn find_issue(
        &self,
        signature: &FailureSignature,
    ) -> Result<Option<IssueInfo>, IssueLookupError>;
}

/// The cached result of looking up one signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    /// An issue references the failure.
    Found(IssueInfo),

    /// The tracker has no issue for the failure.
    NotFound,

    /// The lookup failed. The failure has been reported as a diagnostic.
    Failed,
}

impl LookupOutcome {
    /// Returns the issue, if one was found.
    pub fn issue(&self) -> Option<&IssueInfo> {
        match self {
            Self::Found(issue) => Some(issue),
            Self::NotFound | Self::Failed => None,
        }
    }
}

/// Looks up issues through a tracker, caching every result (including failures) per signature.
///
/// Lookup errors never propagate: they become [`LookupOutcome::Failed`] and a diagnostic.
#[derive(Debug)]
pub struct IssueLookup {
    tracker: DebugIgnore<Box<dyn IssueTracker>>,
    cache: HashMap<FailureSignature, LookupOutcome>,
    diagnostics: Vec<Diagnostic>,
}

impl IssueLookup {
    /// Creates a lookup backed by `tracker`.
    pub fn new(tracker: impl IssueTracker + 'static) -> Self {
        Self {
            tracker: DebugIgnore(Box::new(tracker)),
            cache: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Looks up `signature`, consulting the tracker at most once per signature.
    pub fn lookup(&mut self, signature: &FailureSignature) -> LookupOutcome {
        if let Some(outcome) = self.cache.get(signature) {
            return outcome.clone();
        }

        let outcome = match self.tracker.find_issue(signature) {
            Ok(Some(issue)) => {
                tracing::debug!(%signature, issue = %issue.id, "found issue");
                LookupOutcome::Found(issue)
            }
            Ok(None) => LookupOutcome::NotFound,
            Err(error) => {
                self.diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::IssueLookupFailed,
                    format!(
                        "failed to search {} for {}: {}",
                        self.tracker.describe(),
                        signature.marker(),
                        DisplayErrorChain::new(&error),
                    ),
                ));
                LookupOutcome::Failed
            }
        };
        self.cache.insert(signature.clone(), outcome.clone());
        outcome
    }

    /// Returns and clears the diagnostics produced so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
