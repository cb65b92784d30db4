// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use junit_spool::errors::{AssembleError, ConfigError, RunRootError, SessionError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes.
pub struct SpoolExitCode;

impl SpoolExitCode {
    /// The configuration or command line was invalid, or the run directory could not be set up.
    pub const SETUP_ERROR: i32 = 96;

    /// An attempt could not be recorded.
    pub const RECORD_FAILED: i32 = 97;

    /// An attempt event could not be parsed.
    pub const INVALID_EVENT: i32 = 98;

    /// The report could not be assembled.
    pub const ASSEMBLE_FAILED: i32 = 99;

    /// The report was written but could not be renamed into place.
    pub const PUBLISH_FAILED: i32 = 100;

    /// Writing to standard output failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// The #[error()] strings are placeholders: errors are printed with display_to_stderr.

/// An error that ends the program with a non-zero exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config error")]
    Config {
        #[from]
        err: ConfigError,
    },
    #[error("run directory error")]
    RunRoot {
        #[from]
        err: RunRootError,
    },
    #[error("session error")]
    Session {
        #[from]
        err: SessionError,
    },
    #[error("error reading attempt events")]
    ReadEvents {
        #[source]
        err: std::io::Error,
    },
    #[error("invalid attempt event")]
    InvalidEvent {
        line: usize,
        #[source]
        err: serde_json::Error,
    },
    #[error("assemble error")]
    Assemble {
        #[from]
        err: AssembleError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn read_events(err: std::io::Error) -> Self {
        Self::ReadEvents { err }
    }

    pub(crate) fn invalid_event(line: usize, err: serde_json::Error) -> Self {
        Self::InvalidEvent { line, err }
    }

    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutput { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::RunRoot { .. } => SpoolExitCode::SETUP_ERROR,
            Self::Session { err } => match err {
                SessionError::RunRoot(_) => SpoolExitCode::SETUP_ERROR,
                SessionError::InvalidEvent(_) => SpoolExitCode::INVALID_EVENT,
                SessionError::Assemble(AssembleError::Publish { .. }) => {
                    SpoolExitCode::PUBLISH_FAILED
                }
                SessionError::Assemble(_) => SpoolExitCode::ASSEMBLE_FAILED,
                _ => SpoolExitCode::RECORD_FAILED,
            },
            Self::ReadEvents { .. } => SpoolExitCode::RECORD_FAILED,
            Self::InvalidEvent { .. } => SpoolExitCode::INVALID_EVENT,
            Self::Assemble { err } => match err {
                AssembleError::Publish { .. } => SpoolExitCode::PUBLISH_FAILED,
                _ => SpoolExitCode::ASSEMBLE_FAILED,
            },
            Self::WriteOutput { .. } => SpoolExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::Config { err } => {
                error!("{err}");
                err.source()
            }
            Self::RunRoot { err } => {
                error!("{err}");
                err.source()
            }
            Self::Session { err } => {
                error!("{err}");
                err.source()
            }
            Self::ReadEvents { err } => {
                error!("failed to read attempt events from standard input");
                Some(err as &dyn Error)
            }
            Self::InvalidEvent { line, err } => {
                error!(
                    "invalid attempt event on line {}",
                    line.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::Assemble { err } => {
                if let Some(temp_path) = err.salvage_path() {
                    error!(
                        "failed to publish report (the complete report was kept at `{}`)",
                        temp_path.style(styles.bold)
                    );
                    err.source()
                } else {
                    error!("{err}");
                    err.source()
                }
            }
            Self::WriteOutput { err } => {
                error!("failed to write to standard output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
