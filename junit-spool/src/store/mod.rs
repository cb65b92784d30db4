// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, per-worker stores of recorded attempts.
//!
//! # Layout
//!
//! A run root directory holds:
//!
//! - `run.json`: the [`RunMetadata`], written atomically when the run starts.
//! - `worker-<id>.jsonl`: one JSON Lines store per worker process. The first line is a header,
//!   and every following line is either a batch of session properties or one attempt.
//!
//! Stores are append-only and each has a single writer, so readers only ever need to deal with
//! a truncated final line.

mod format;
mod reader;
mod recorder;
mod run_root;

pub use format::{
    RUN_METADATA_FILE_NAME, RunMetadata, STORE_FORMAT_VERSION, StoreFormatVersion, WorkerId,
};
pub use reader::{EntryOffset, StoreContents, StoredAttempt, read_store};
pub use recorder::ResultRecorder;
pub use run_root::{RUN_DIR_ENV, RunRoot};
