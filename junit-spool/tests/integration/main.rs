// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: recording from several sessions, then assembling the report.

mod end_to_end;
mod fixtures;
mod recovery;
