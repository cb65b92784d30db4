// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Removal of test-framework frames from failure traces.

use crate::attempt::StackFrame;
use std::fmt::Write as _;

/// Module prefixes treated as test-framework machinery by default.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "_pytest",
    "pluggy",
    "std::panicking",
    "core::panicking",
    "std::rt",
];

/// Strips framework-internal frames from the outer ends of a trace.
///
/// Only the leading and trailing runs of denylisted frames are removed. A denylisted frame
/// between two user frames is kept, so the span of user code stays contiguous.
#[derive(Clone, Debug)]
pub struct TraceSanitizer {
    denylist: Vec<String>,
}

impl TraceSanitizer {
    /// Creates a sanitizer with the given module-path prefixes.
    pub fn new(denylist: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denylist: denylist.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the denylist.
    pub fn denylist(&self) -> &[String] {
        &self.denylist
    }

    /// Returns the frames between the first and last non-framework frame, inclusive.
    ///
    /// If every frame belongs to the framework the trace is returned unchanged, since an
    /// empty trace is less useful than a noisy one.
    pub fn sanitize(&self, frames: &[StackFrame]) -> Vec<StackFrame> {
        let first = frames.iter().position(|frame| !self.is_denied(frame));
        let last = frames.iter().rposition(|frame| !self.is_denied(frame));
        match (first, last) {
            (Some(first), Some(last)) => frames[first..=last].to_vec(),
            _ => frames.to_vec(),
        }
    }

    /// Returns true if the frame belongs to the test framework.
    pub fn is_denied(&self, frame: &StackFrame) -> bool {
        match &frame.module {
            Some(module) => self
                .denylist
                .iter()
                .any(|prefix| module_matches(module, prefix)),
            None => {
                let file = frame.file.replace('\\', "/");
                self.denylist.iter().any(|prefix| {
                    let dir = prefix.replace("::", "/").replace('.', "/");
                    file.contains(&format!("/{dir}/"))
                })
            }
        }
    }
}

impl Default for TraceSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied())
    }
}

fn module_matches(module: &str, prefix: &str) -> bool {
    match module.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with("::"),
        None => false,
    }
}

/// Renders frames as a traceback, followed by the failure summary.
///
/// The summary is omitted if the last frame's text already ends with it.
pub fn render(frames: &[StackFrame], summary: Option<&str>) -> String {
    let mut out = String::from("Traceback (most recent call last):\n");
    for frame in frames {
        let _ = write!(out, "  File \"{}\"", frame.file);
        if let Some(line) = frame.line {
            let _ = write!(out, ", line {line}");
        }
        if let Some(function) = &frame.function {
            let _ = write!(out, ", in {function}");
        }
        out.push('\n');
        if let Some(text) = &frame.text {
            for line in text.lines() {
                let _ = writeln!(out, "    {}", line.trim_end());
            }
        }
    }

    if let Some(summary) = summary {
        let already_present = frames
            .last()
            .and_then(|frame| frame.text.as_deref())
            .is_some_and(|text| text.trim_end().ends_with(summary.trim_end()));
        if !already_present {
            out.push_str(summary.trim_end());
            out.push('\n');
        }
    }
    out
}
