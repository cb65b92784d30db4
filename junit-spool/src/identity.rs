// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::IdentityParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The stable key for a test: module path, name, and optional parametrization.
///
/// All attempts of one test share an identity, and the identity is the same in every worker
/// process.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestIdentity {
    /// The path to the module defining the test, e.g. `tests/test_api.py::TestLogin`.
    pub module_path: String,

    /// The test name, without parametrization.
    pub name: String,

    /// The parametrization, without surrounding brackets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

impl TestIdentity {
    /// Creates a new identity.
    pub fn new(module_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            name: name.into(),
            parameters: None,
        }
    }

    /// Sets the parametrization.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    /// Parses a node id of the form `path/to/file.py::Class::name[param]`.
    ///
    /// A trailing `[...]` is the parametrization. Of the rest, the last `::` segment is the
    /// name and everything before it is the module path.
    pub fn parse_node_id(node_id: &str) -> Result<Self, IdentityParseError> {
        let (head, parameters) = match node_id.find('[') {
            Some(open) => {
                let params = node_id[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| IdentityParseError::new(node_id, "unterminated `[`"))?;
                (&node_id[..open], Some(params.to_owned()))
            }
            None => (node_id, None),
        };

        let (module_path, name) = head
            .rsplit_once("::")
            .ok_or_else(|| IdentityParseError::new(node_id, "missing `::` separator"))?;
        if module_path.is_empty() {
            return Err(IdentityParseError::new(node_id, "empty module path"));
        }
        if name.is_empty() {
            return Err(IdentityParseError::new(node_id, "empty test name"));
        }

        Ok(Self {
            module_path: module_path.to_owned(),
            name: name.to_owned(),
            parameters,
        })
    }

    /// Returns the node id this identity was parsed from.
    pub fn node_id(&self) -> String {
        format!("{}::{}", self.module_path, self.case_name())
    }

    /// Returns the JUnit `name`: the test name followed by its parametrization.
    pub fn case_name(&self) -> String {
        match &self.parameters {
            Some(parameters) => format!("{}[{parameters}]", self.name),
            None => self.name.clone(),
        }
    }

    /// Returns the JUnit `classname`.
    ///
    /// Path separators and `::` become `.`, and a source file extension on the first segment
    /// is dropped: `tests/test_api.py::TestLogin` becomes `tests.test_api.TestLogin`.
    pub fn classname(&self) -> String {
        let mut segments = self.module_path.split("::");
        let mut out = String::with_capacity(self.module_path.len());
        if let Some(first) = segments.next() {
            let first = if first.contains(['/', '\\']) || has_source_extension(first) {
                first
                    .rsplit_once('.')
                    .filter(|(_, ext)| !ext.contains(['/', '\\']))
                    .map_or(first, |(stem, _)| stem)
            } else {
                first
            };
            out.extend(first.chars().map(|c| if c == '/' || c == '\\' { '.' } else { c }));
        }
        for segment in segments {
            out.push('.');
            out.push_str(segment);
        }
        out
    }
}

fn has_source_extension(segment: &str) -> bool {
    segment.ends_with(".py") || segment.ends_with(".rs")
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module_path, self.name)?;
        if let Some(parameters) = &self.parameters {
            write!(f, "[{parameters}]")?;
        }
        Ok(())
    }
}
