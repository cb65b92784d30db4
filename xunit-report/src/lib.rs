// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model and serializer for JUnit/XUnit XML reports.
//!
//! A [`Report`] holds one or more [`TestSuite`]s, each made up of [`TestCase`]s. Every
//! recorded attempt of a test becomes its own [`TestCase`], so reruns are preserved as
//! distinct, ordered entries.

mod errors;
mod report;
mod serialize;

pub use errors::SerializeError;
pub use report::*;
