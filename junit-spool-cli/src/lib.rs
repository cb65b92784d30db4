// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `junit-spool` command: drive the report engine from outside the test process.
//!
//! - `junit-spool init` creates a run directory and prints the environment variable workers
//!   need.
//! - `junit-spool record` durably records attempt events read as JSON lines.
//! - `junit-spool assemble` merges every worker's results into the final report, and can
//!   recover a report after an interrupted run.

mod dispatch;
mod errors;
mod output;

pub use dispatch::JunitSpoolApp;
pub use errors::{ExpectedError, SpoolExitCode};
pub use output::{Color, LOG_ENV, OutputContext, StderrStyles};
