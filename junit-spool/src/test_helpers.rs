// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for unit tests.

use crate::{
    attempt::{Attempt, Outcome},
    identity::TestIdentity,
    store::RunRoot,
};
use camino_tempfile::Utf8TempDir;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::time::Duration;

pub(crate) fn temp_run_root(dir: &Utf8TempDir) -> RunRoot {
    RunRoot::create(dir.path(), &dir.path().join("junit.xml"), "pytest")
        .expect("created run root")
}

pub(crate) fn identity(name: &str) -> TestIdentity {
    TestIdentity::new("tests/test_mod.py", name)
}

/// A fixed point in time, `offset_secs` after the base timestamp.
pub(crate) fn at(offset_secs: i64) -> DateTime<FixedOffset> {
    let tz = FixedOffset::east_opt(0).expect("valid offset");
    tz.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("unambiguous")
        + chrono::Duration::seconds(offset_secs)
}

pub(crate) fn attempt(sequence: u32, outcome: Outcome) -> Attempt {
    let mut attempt = Attempt::new(
        sequence,
        outcome,
        Duration::from_millis(250),
        at(i64::from(sequence) * 10),
    );
    if outcome.is_failure() {
        attempt.message = Some(format!("AssertionError: attempt {sequence}"));
    }
    attempt
}
