// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::format::{STORE_FORMAT_VERSION, StoreEntry, WorkerId};
use crate::{
    attempt::Attempt,
    diagnostics::{Diagnostic, DiagnosticKind},
    errors::StoreReadError,
    identity::TestIdentity,
    metadata::Property,
};
use camino::{Utf8Path, Utf8PathBuf};

/// Where an entry was read from: the index of its store in sorted order, and its 1-based line.
///
/// Offsets order entries across a whole run root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryOffset {
    /// The index of the store, in the order stores were read.
    pub store_index: usize,

    /// The 1-based line number within the store.
    pub line: usize,
}

/// An attempt read back from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAttempt {
    /// The test the attempt belongs to.
    pub identity: TestIdentity,

    /// The attempt.
    pub attempt: Attempt,

    /// Where the attempt was read from.
    pub offset: EntryOffset,
}

/// Everything that could be read from one store.
#[derive(Clone, Debug)]
pub struct StoreContents {
    /// The path to the store.
    pub path: Utf8PathBuf,

    /// The worker id from the store's header, if the header was readable.
    pub worker_id: Option<WorkerId>,

    /// Session properties, in the order they were recorded.
    pub session_properties: Vec<Property>,

    /// Attempts, in the order they were recorded.
    pub attempts: Vec<StoredAttempt>,

    /// Problems with individual entries. Each problem entry was skipped.
    pub diagnostics: Vec<Diagnostic>,
}

/// Reads a store, skipping partial or unparsable entries.
///
/// A final line without a terminating newline is an entry whose write was interrupted, and is
/// dropped. All complete entries before and after a corrupt one are kept.
pub fn read_store(path: &Utf8Path, store_index: usize) -> Result<StoreContents, StoreReadError> {
    let bytes = std::fs::read(path).map_err(|error| StoreReadError::Read {
        path: path.to_owned(),
        error,
    })?;

    let mut contents = StoreContents {
        path: path.to_owned(),
        worker_id: None,
        session_properties: Vec::new(),
        attempts: Vec::new(),
        diagnostics: Vec::new(),
    };

    let complete_len = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    let complete = &bytes[..complete_len];

    let mut line_count = 0;
    for (index, line) in complete.split_inclusive(|&b| b == b'\n').enumerate() {
        let line_number = index + 1;
        line_count = line_number;
        if line.trim_ascii().is_empty() {
            continue;
        }

        match serde_json::from_slice::<StoreEntry>(line) {
            Ok(StoreEntry::Header(header)) => {
                if header.format_version.get() > STORE_FORMAT_VERSION.get() {
                    return Err(StoreReadError::UnsupportedFormat {
                        path: path.to_owned(),
                        found: header.format_version.get(),
                        supported: STORE_FORMAT_VERSION.get(),
                    });
                }
                contents.worker_id = Some(header.worker_id);
            }
            Ok(StoreEntry::SessionProperties { properties }) => {
                contents.session_properties.extend(properties);
            }
            Ok(StoreEntry::Attempt { identity, attempt }) => {
                contents.attempts.push(StoredAttempt {
                    identity,
                    attempt,
                    offset: EntryOffset {
                        store_index,
                        line: line_number,
                    },
                });
            }
            Err(error) => {
                contents.diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::StoreCorruption,
                    format!("{path}:{line_number}: skipped unreadable entry: {error}"),
                ));
            }
        }
    }

    if complete_len < bytes.len() {
        contents.diagnostics.push(Diagnostic::warn(
            DiagnosticKind::StoreCorruption,
            format!(
                "{path}:{}: skipped partial trailing entry ({} bytes)",
                line_count + 1,
                bytes.len() - complete_len,
            ),
        ));
    }

    tracing::debug!(
        store = %path,
        attempts = contents.attempts.len(),
        skipped = contents.diagnostics.len(),
        "read store",
    );
    Ok(contents)
}
