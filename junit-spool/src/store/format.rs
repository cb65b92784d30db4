// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk format shared between the recorder and the reader.

use crate::{attempt::Attempt, identity::TestIdentity, metadata::Property};
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use xunit_report::ReportUuid;

/// The name of the run metadata file within a run root.
pub const RUN_METADATA_FILE_NAME: &str = "run.json";

pub(crate) const STORE_FILE_PREFIX: &str = "worker-";
pub(crate) const STORE_FILE_SUFFIX: &str = ".jsonl";

/// The current store and run metadata format version.
///
/// Increment this on changes that older readers cannot skip over.
pub const STORE_FORMAT_VERSION: StoreFormatVersion = StoreFormatVersion::new(1);

/// Version of the store format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StoreFormatVersion(u32);

impl StoreFormatVersion {
    /// Creates a new `StoreFormatVersion`.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the version number.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StoreFormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the worker process that owns a store.
///
/// Only `[A-Za-z0-9_.-]` are kept so the id can be embedded in a file name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a worker id, replacing characters unsafe in file names with `_`.
    pub fn new(id: impl AsRef<str>) -> Self {
        let id: String = id
            .as_ref()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if id.is_empty() || id.chars().all(|c| c == '.') {
            Self(format!("_{id}"))
        } else {
            Self(id)
        }
    }

    /// The worker id used by the controlling process.
    pub fn controller() -> Self {
        Self("controller".to_owned())
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn store_file_name(&self) -> String {
        format!("{STORE_FILE_PREFIX}{}{STORE_FILE_SUFFIX}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run-wide metadata, stored as `run.json` in the run root.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunMetadata {
    /// The format version of the run root.
    pub format_version: StoreFormatVersion,

    /// A unique id for this run. Also used as the report's UUID.
    pub run_id: ReportUuid,

    /// Where the final report is published.
    pub report_path: Utf8PathBuf,

    /// The name of the report's test suite.
    pub report_name: String,

    /// When the run started.
    pub started_at: DateTime<FixedOffset>,
}

/// The first entry of every store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StoreHeader {
    pub(crate) format_version: StoreFormatVersion,
    pub(crate) worker_id: WorkerId,
    pub(crate) pid: u32,
    pub(crate) created_at: DateTime<FixedOffset>,
}

/// One line of a store, as read back.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub(crate) enum StoreEntry {
    Header(StoreHeader),
    SessionProperties {
        properties: Vec<Property>,
    },
    Attempt {
        identity: TestIdentity,
        attempt: Attempt,
    },
}

/// One line of a store, as written.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub(crate) enum StoreEntryRef<'a> {
    Header(&'a StoreHeader),
    SessionProperties {
        properties: &'a [Property],
    },
    Attempt {
        identity: &'a TestIdentity,
        attempt: &'a Attempt,
    },
}
