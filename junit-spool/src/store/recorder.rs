// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    format::{STORE_FORMAT_VERSION, StoreEntryRef, StoreHeader, WorkerId},
    run_root::RunRoot,
};
use crate::{attempt::Attempt, errors::RecordError, identity::TestIdentity, metadata::Property};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
};

/// Appends attempts and session properties to one worker's store.
///
/// Every call returns only once the entry has been synced to disk, so a process killed right
/// after `record` returns never loses that attempt. A process killed during `record` leaves
/// at most one partial trailing line, which readers skip.
///
/// The store is created on the first write. Each store has exactly one writer.
#[derive(Debug)]
pub struct ResultRecorder {
    store_path: Utf8PathBuf,
    worker_id: WorkerId,
    file: Option<File>,
    entries: u64,
}

impl ResultRecorder {
    /// Creates a recorder for `worker_id`'s store within `run_root`. No I/O happens until the
    /// first entry is recorded.
    pub fn new(run_root: &RunRoot, worker_id: WorkerId) -> Self {
        Self {
            store_path: run_root.store_path(&worker_id),
            worker_id,
            file: None,
            entries: 0,
        }
    }

    /// Returns the path to the store.
    pub fn store_path(&self) -> &Utf8Path {
        &self.store_path
    }

    /// Returns the worker id that owns the store.
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Returns the number of entries written by this recorder, not counting the header.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Durably appends one attempt.
    pub fn record(&mut self, identity: &TestIdentity, attempt: &Attempt) -> Result<(), RecordError> {
        self.append(&StoreEntryRef::Attempt { identity, attempt })?;
        tracing::debug!(
            worker = %self.worker_id,
            test = %identity,
            sequence = attempt.sequence,
            outcome = %attempt.outcome,
            "recorded attempt",
        );
        Ok(())
    }

    /// Durably appends session-level properties.
    pub fn record_session_properties(
        &mut self,
        properties: &[Property],
    ) -> Result<(), RecordError> {
        self.append(&StoreEntryRef::SessionProperties { properties })?;
        tracing::debug!(
            worker = %self.worker_id,
            count = properties.len(),
            "recorded session properties",
        );
        Ok(())
    }

    fn append(&mut self, entry: &StoreEntryRef<'_>) -> Result<(), RecordError> {
        let line = serialize_line(entry)?;

        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_store()?,
        };
        let result = write_line(&mut file, &self.store_path, &line);
        self.file = Some(file);
        result?;

        self.entries += 1;
        Ok(())
    }

    fn open_store(&self) -> Result<File, RecordError> {
        let open_error = |error| RecordError::StoreOpen {
            path: self.store_path.clone(),
            error,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.store_path)
            .map_err(open_error)?;
        let len = file.metadata().map_err(open_error)?.len();

        if len == 0 {
            let header = StoreHeader {
                format_version: STORE_FORMAT_VERSION,
                worker_id: self.worker_id.clone(),
                pid: std::process::id(),
                created_at: Local::now().fixed_offset(),
            };
            let line = serialize_line(&StoreEntryRef::Header(&header))?;
            write_line(&mut file, &self.store_path, &line)?;
            sync_parent_dir(&self.store_path).map_err(|error| RecordError::StoreSync {
                path: self.store_path.clone(),
                error,
            })?;
        } else if !ends_with_newline(&mut file).map_err(open_error)? {
            // A previous writer died mid-entry. Terminate the partial line so that the next
            // entry starts on a line of its own.
            write_line(&mut file, &self.store_path, b"\n")?;
        }

        Ok(file)
    }
}

fn serialize_line(entry: &StoreEntryRef<'_>) -> Result<Vec<u8>, RecordError> {
    let mut line = serde_json::to_vec(entry).map_err(|error| RecordError::Serialize { error })?;
    line.push(b'\n');
    Ok(line)
}

fn write_line(file: &mut File, path: &Utf8Path, line: &[u8]) -> Result<(), RecordError> {
    file.write_all(line)
        .map_err(|error| RecordError::StoreWrite {
            path: path.to_owned(),
            error,
        })?;
    file.sync_data().map_err(|error| RecordError::StoreSync {
        path: path.to_owned(),
        error,
    })
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(unix)]
fn sync_parent_dir(path: &Utf8Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}
