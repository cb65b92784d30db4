// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::metadata::Property;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The outcome of a single attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The test passed.
    Passed,

    /// An assertion in the test failed.
    Failed,

    /// The test raised an unexpected error, e.g. during setup.
    Errored,

    /// The test was skipped.
    Skipped,
}

impl Outcome {
    /// Returns true if this outcome is a failure or an error.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }

    /// Returns the outcome as a lowercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame of a failure trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackFrame {
    /// The module the frame's code belongs to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// The source file.
    pub file: String,

    /// The line within the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// The function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// The source text, or other detail printed for the frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StackFrame {
    /// Creates a new frame at `file`.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            module: None,
            file: file.into(),
            line: None,
            function: None,
            text: None,
        }
    }

    /// Sets the module.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Sets the line.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Sets the function name.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the source text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Where a test is defined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The source file.
    pub file: String,

    /// The line, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// One execution of a test. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Attempt {
    /// The 0-based attempt number; increases by one per rerun.
    pub sequence: u32,

    /// The outcome.
    pub outcome: Outcome,

    /// How long the attempt took.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// When the attempt started.
    pub started_at: DateTime<FixedOffset>,

    /// The failure, error, or skip message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The sanitized failure trace. Only present for failed and errored attempts.
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

    /// Case-level properties collected for this attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl Attempt {
    /// Creates an attempt with no message, trace, output, or properties.
    pub fn new(
        sequence: u32,
        outcome: Outcome,
        duration: Duration,
        started_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            sequence,
            outcome,
            duration,
            started_at,
            message: None,
            trace: None,
            location: None,
            stdout: None,
            stderr: None,
            properties: Vec::new(),
        }
    }
}
