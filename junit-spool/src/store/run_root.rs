// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::format::{
    RUN_METADATA_FILE_NAME, RunMetadata, STORE_FILE_PREFIX, STORE_FILE_SUFFIX,
    STORE_FORMAT_VERSION, WorkerId,
};
use crate::errors::RunRootError;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::{fs, io};
use xunit_report::ReportUuid;

/// Environment variable through which worker processes find the run root.
pub const RUN_DIR_ENV: &str = "JUNIT_SPOOL_RUN_DIR";

/// The run-scoped directory holding `run.json` and one store per worker.
#[derive(Clone, Debug)]
pub struct RunRoot {
    path: Utf8PathBuf,
    metadata: RunMetadata,
}

impl RunRoot {
    /// Creates a new run root under `parent` for a report to be published at `report_path`.
    ///
    /// The directory is named `.<report file name>.spool-<run id>`, and creating it fails if it
    /// already exists.
    pub fn create(
        parent: &Utf8Path,
        report_path: &Utf8Path,
        report_name: &str,
    ) -> Result<Self, RunRootError> {
        let run_id = ReportUuid::new_v4();
        let file_name = report_path.file_name().unwrap_or("report.xml");
        let path = parent.join(format!(".{file_name}.spool-{run_id}"));

        fs::create_dir_all(parent).map_err(|error| RunRootError::Create {
            path: parent.to_owned(),
            error,
        })?;
        fs::create_dir(&path).map_err(|error| {
            if error.kind() == io::ErrorKind::AlreadyExists {
                RunRootError::AlreadyExists { path: path.clone() }
            } else {
                RunRootError::Create {
                    path: path.clone(),
                    error,
                }
            }
        })?;

        let metadata = RunMetadata {
            format_version: STORE_FORMAT_VERSION,
            run_id,
            report_path: report_path.to_owned(),
            report_name: report_name.to_owned(),
            started_at: Local::now().fixed_offset(),
        };
        write_metadata(&path, &metadata)?;

        tracing::debug!(run_dir = %path, %run_id, "created run directory");
        Ok(Self { path, metadata })
    }

    /// Opens an existing run root.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, RunRootError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(RunRootError::NotFound { path });
        }

        let metadata_path = path.join(RUN_METADATA_FILE_NAME);
        let contents =
            fs::read_to_string(&metadata_path).map_err(|error| RunRootError::MetadataRead {
                path: metadata_path.clone(),
                error,
            })?;
        let metadata = serde_json::from_str(&contents).map_err(|error| {
            RunRootError::MetadataParse {
                path: metadata_path,
                error,
            }
        })?;

        Ok(Self { path, metadata })
    }

    /// Opens the run root named by the `JUNIT_SPOOL_RUN_DIR` environment variable.
    pub fn from_env() -> Result<Self, RunRootError> {
        match std::env::var(RUN_DIR_ENV) {
            Ok(path) => Self::open(path),
            Err(std::env::VarError::NotPresent) => {
                Err(RunRootError::EnvNotSet { name: RUN_DIR_ENV })
            }
            Err(std::env::VarError::NotUnicode(_)) => {
                Err(RunRootError::EnvNotUtf8 { name: RUN_DIR_ENV })
            }
        }
    }

    /// Returns the path to the run root.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the run metadata.
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Returns the path of the store owned by `worker_id`.
    pub fn store_path(&self, worker_id: &WorkerId) -> Utf8PathBuf {
        self.path.join(worker_id.store_file_name())
    }

    /// Lists every store in the run root, sorted by file name.
    pub fn store_paths(&self) -> Result<Vec<Utf8PathBuf>, RunRootError> {
        let read_dir_error = |error| RunRootError::ReadDir {
            path: self.path.clone(),
            error,
        };

        let mut paths = Vec::new();
        for entry in self.path.read_dir_utf8().map_err(read_dir_error)? {
            let entry = entry.map_err(read_dir_error)?;
            let name = entry.file_name();
            if name.starts_with(STORE_FILE_PREFIX)
                && name.ends_with(STORE_FILE_SUFFIX)
                && entry.file_type().map_err(read_dir_error)?.is_file()
            {
                paths.push(entry.into_path());
            }
        }
        paths.sort_unstable();
        Ok(paths)
    }

    /// Deletes the run root and everything in it.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_dir_all(&self.path)
    }
}

fn write_metadata(dir: &Utf8Path, metadata: &RunMetadata) -> Result<(), RunRootError> {
    let path = dir.join(RUN_METADATA_FILE_NAME);
    AtomicFile::new(&path, OverwriteBehavior::DisallowOverwrite)
        .write(|file| serde_json::to_writer_pretty(file, metadata))
        .map_err(|error| match error {
            atomicwrites::Error::Internal(error) => RunRootError::MetadataWrite {
                path: path.clone(),
                error,
            },
            atomicwrites::Error::User(error) => RunRootError::MetadataSerialize {
                path: path.clone(),
                error,
            },
        })
}
