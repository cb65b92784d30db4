// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by junit-spool.

use camino::Utf8PathBuf;
use std::{error::Error, fmt, io, time::Duration};
use thiserror::Error;

/// An error that occurred while appending an entry to a worker's store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The store file could not be opened or created.
    #[error("error opening store at `{path}`")]
    StoreOpen {
        /// The path to the store.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An entry could not be written to the store.
    #[error("error writing to store at `{path}`")]
    StoreWrite {
        /// The path to the store.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The store could not be flushed to stable storage.
    #[error("error syncing store at `{path}` to disk")]
    StoreSync {
        /// The path to the store.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An entry could not be serialized.
    #[error("error serializing store entry")]
    Serialize {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while creating or opening a run root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunRootError {
    /// The run root directory could not be created.
    #[error("error creating run directory `{path}`")]
    Create {
        /// The path to the run root.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A run root already exists at the chosen path.
    #[error("run directory `{path}` already exists")]
    AlreadyExists {
        /// The path to the run root.
        path: Utf8PathBuf,
    },

    /// The run root does not exist.
    #[error("run directory `{path}` not found")]
    NotFound {
        /// The path to the run root.
        path: Utf8PathBuf,
    },

    /// The run root could not be listed.
    #[error("error reading run directory `{path}`")]
    ReadDir {
        /// The path to the run root.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The run metadata could not be written.
    #[error("error writing run metadata to `{path}`")]
    MetadataWrite {
        /// The path to `run.json`.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The run metadata could not be serialized.
    #[error("error serializing run metadata for `{path}`")]
    MetadataSerialize {
        /// The path to `run.json`.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The run metadata could not be read.
    #[error("error reading run metadata from `{path}`")]
    MetadataRead {
        /// The path to `run.json`.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The run metadata could not be parsed.
    #[error("error parsing run metadata at `{path}`")]
    MetadataParse {
        /// The path to `run.json`.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The run directory environment variable was not set.
    #[error("environment variable `{name}` is not set")]
    EnvNotSet {
        /// The name of the variable.
        name: &'static str,
    },

    /// The run directory environment variable was not valid UTF-8.
    #[error("environment variable `{name}` is not valid UTF-8")]
    EnvNotUtf8 {
        /// The name of the variable.
        name: &'static str,
    },
}

/// An error that occurred while reading a store as a whole.
///
/// Individual corrupt entries are not errors: they are skipped and reported as diagnostics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreReadError {
    /// The store could not be read.
    #[error("error reading store at `{path}`")]
    Read {
        /// The path to the store.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The store's header declares a format this version does not understand.
    #[error(
        "store at `{path}` has format version {found}, \
         but only version {supported} is supported"
    )]
    UnsupportedFormat {
        /// The path to the store.
        path: Utf8PathBuf,

        /// The version found in the header.
        found: u32,

        /// The supported version.
        supported: u32,
    },
}

/// An error that prevented the final report from being published.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssembleError {
    /// The run root could not be listed.
    #[error("error listing stores in run directory")]
    ListStores(#[source] RunRootError),

    /// The report could not be serialized.
    #[error("error serializing report for `{output_path}`")]
    Serialize {
        /// The final output path.
        output_path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: xunit_report::SerializeError,
    },

    /// The output directory could not be created.
    #[error("error creating output directory `{dir}`")]
    CreateDir {
        /// The output directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The temporary file could not be created in the output directory.
    #[error("error creating temporary file in `{dir}`")]
    TempCreate {
        /// The output directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The temporary file could not be written or synced.
    #[error("error writing temporary report file `{temp_path}`")]
    TempWrite {
        /// The temporary file.
        temp_path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The temporary file could not be renamed onto the output path.
    ///
    /// The temporary file is kept so the fully-written report can be salvaged.
    #[error("error renaming `{temp_path}` to `{output_path}` (the temporary file was kept)")]
    Publish {
        /// The final output path.
        output_path: Utf8PathBuf,

        /// The kept temporary file holding the complete report.
        temp_path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

impl AssembleError {
    /// Returns the path of a complete report that was written but could not be published.
    pub fn salvage_path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Publish { temp_path, .. } => Some(temp_path),
            _ => None,
        }
    }
}

/// An error that occurred while building the configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("error reading config file `{path}`")]
    Read {
        /// The path to the config file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The config file could not be parsed.
    #[error("error parsing config{}", .path.as_ref().map(|p| format!(" file `{p}`")).unwrap_or_default())]
    Parse {
        /// The path to the config file, if it was loaded from one.
        path: Option<Utf8PathBuf>,

        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// No report path was configured.
    #[error("no report path configured (set `report.path` or pass one explicitly)")]
    MissingReportPath,

    /// Some, but not all, issue tracker parameters were set, and strict mode is on.
    #[error("issue tracker is partially configured: missing {}", .missing.join(", "))]
    PartialIssueTracker {
        /// The names of the missing parameters.
        missing: Vec<&'static str>,
    },

    /// A property override was not of the form `name=value`.
    #[error("invalid property `{input}`: expected `name=value`")]
    InvalidProperty {
        /// The input string.
        input: String,
    },
}

/// A metadata provider failed to produce its properties.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new provider error with a message and an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// An error that occurred while looking up an issue in the tracker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IssueLookupError {
    /// The request did not complete within the configured timeout.
    #[error("issue lookup timed out after {}", humantime::format_duration(*.timeout))]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
    },

    /// The tracker could not be reached.
    #[error("error connecting to issue tracker at `{endpoint}`")]
    Network {
        /// The tracker endpoint.
        endpoint: String,

        /// The underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// The tracker rejected the credentials.
    #[error("issue tracker rejected credentials (HTTP {status})")]
    Auth {
        /// The HTTP status.
        status: u16,
    },

    /// The search endpoint was not found.
    #[error("issue tracker search endpoint not found (HTTP {status})")]
    NotFound {
        /// The HTTP status.
        status: u16,
    },

    /// The tracker returned an unexpected status.
    #[error("issue tracker returned HTTP {status}")]
    Status {
        /// The HTTP status.
        status: u16,
    },

    /// The response body could not be read.
    #[error("error reading issue tracker response")]
    ReadResponse {
        /// The underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// The response body was not in the expected format.
    #[error("issue tracker returned an invalid response")]
    InvalidResponse {
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A host node id could not be parsed into a [`TestIdentity`](crate::TestIdentity).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid test id `{input}`: {reason}")]
pub struct IdentityParseError {
    input: String,
    reason: &'static str,
}

impl IdentityParseError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// An error returned by a [`SpoolSession`](crate::SpoolSession) hook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The run root could not be created or opened.
    #[error("error setting up run directory")]
    RunRoot(#[from] RunRootError),

    /// An attempt event named an unparsable test.
    #[error("error reading attempt event")]
    InvalidEvent(#[from] IdentityParseError),

    /// An attempt or session properties could not be recorded.
    #[error("error recording result")]
    Record(#[from] RecordError),

    /// The worker's existing store could not be read to resume attempt numbering.
    #[error("error resuming worker store")]
    Resume(#[from] StoreReadError),

    /// The final report could not be assembled.
    #[error("error assembling report")]
    Assemble(#[from] AssembleError),
}

/// Displays an error along with every error in its source chain.
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Wraps an error.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
