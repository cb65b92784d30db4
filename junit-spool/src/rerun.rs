// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding recorded attempts into per-test records.

use crate::{
    attempt::{Attempt, Outcome},
    diagnostics::{Diagnostic, DiagnosticKind},
    identity::TestIdentity,
    store::{EntryOffset, StoredAttempt},
};
use std::{
    collections::{BTreeMap, HashMap, btree_map, hash_map},
    fmt,
};

/// All attempts of one test, ordered by sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseRecord {
    identity: TestIdentity,
    attempts: Vec<Attempt>,
}

impl CaseRecord {
    /// Returns the test's identity.
    pub fn identity(&self) -> &TestIdentity {
        &self.identity
    }

    /// Returns every attempt, in ascending sequence order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Returns the attempt that decides the test's final status.
    pub fn final_attempt(&self) -> &Attempt {
        // Records are only built from at least one attempt.
        &self.attempts[self.attempts.len() - 1]
    }

    /// Returns the outcome of the last attempt.
    pub fn final_outcome(&self) -> Outcome {
        self.final_attempt().outcome
    }

    /// Returns the number of reruns: one less than the number of attempts.
    pub fn rerun_count(&self) -> usize {
        self.attempts.len() - 1
    }

    /// Returns the final outcome together with the number of reruns it took.
    pub fn disposition(&self) -> Disposition {
        Disposition {
            outcome: self.final_outcome(),
            retries: self.rerun_count(),
        }
    }

    fn earliest_start(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.attempts
            .iter()
            .map(|attempt| attempt.started_at)
            .min()
            .unwrap_or_else(|| self.final_attempt().started_at)
    }
}

/// A summary of how a test ended up, e.g. "passed after 2 retries".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    /// The outcome of the final attempt.
    pub outcome: Outcome,

    /// The number of reruns before the final attempt.
    pub retries: usize,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)?;
        match self.retries {
            0 => Ok(()),
            1 => write!(f, " after 1 retry"),
            n => write!(f, " after {n} retries"),
        }
    }
}

/// The result of aggregation.
#[derive(Clone, Debug, Default)]
pub struct Aggregation {
    /// One record per test, in order of each test's earliest attempt.
    pub cases: Vec<CaseRecord>,

    /// Conflicts found while aggregating.
    pub diagnostics: Vec<Diagnostic>,
}

/// Groups a stream of stored attempts by test.
///
/// Attempts may arrive from any number of stores in any order. If the same test and sequence
/// number appear more than once, identical copies are collapsed, and for conflicting copies the
/// one at the later [`EntryOffset`] wins.
#[derive(Debug, Default)]
pub struct RerunAggregator {
    by_identity: HashMap<TestIdentity, BTreeMap<u32, (EntryOffset, Attempt)>>,
    diagnostics: Vec<Diagnostic>,
}

impl RerunAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups all of `stored` in one step.
    pub fn group(stored: impl IntoIterator<Item = StoredAttempt>) -> Aggregation {
        let mut aggregator = Self::new();
        aggregator.extend(stored);
        aggregator.finish()
    }

    /// Adds one stored attempt.
    pub fn push(&mut self, stored: StoredAttempt) {
        let StoredAttempt {
            identity,
            attempt,
            offset,
        } = stored;

        let mut entry = match self.by_identity.entry(identity) {
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(BTreeMap::from([(attempt.sequence, (offset, attempt))]));
                return;
            }
            hash_map::Entry::Occupied(occupied) => occupied,
        };

        let sequence = attempt.sequence;
        let (existing_offset, existing) = match entry.get_mut().entry(sequence) {
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert((offset, attempt));
                return;
            }
            btree_map::Entry::Occupied(occupied) => occupied.into_mut(),
        };
        if *existing == attempt {
            return;
        }

        let (winner, loser) = if offset > *existing_offset {
            let loser = std::mem::replace(existing_offset, offset);
            *existing = attempt;
            (offset, loser)
        } else {
            (*existing_offset, offset)
        };
        self.diagnostics.push(Diagnostic::warn(
            DiagnosticKind::DuplicateAttempt,
            format!(
                "conflicting records for `{}` attempt {sequence}: \
                 keeping store {} line {}, discarding store {} line {}",
                entry.key(),
                winner.store_index,
                winner.line,
                loser.store_index,
                loser.line,
            ),
        ));
    }

    /// Adds every attempt from an iterator.
    pub fn extend(&mut self, stored: impl IntoIterator<Item = StoredAttempt>) {
        for stored in stored {
            self.push(stored);
        }
    }

    /// Builds the case records.
    ///
    /// Attempts within a case are ordered by sequence number, and the case's final status is
    /// the highest-numbered attempt's outcome. Cases are ordered by their earliest attempt's
    /// start time, then by identity.
    pub fn finish(self) -> Aggregation {
        let mut cases: Vec<_> = self
            .by_identity
            .into_iter()
            .filter(|(_, attempts)| !attempts.is_empty())
            .map(|(identity, attempts)| CaseRecord {
                identity,
                attempts: attempts.into_values().map(|(_, attempt)| attempt).collect(),
            })
            .collect();
        cases.sort_by(|a, b| {
            a.earliest_start()
                .cmp(&b.earliest_start())
                .then_with(|| a.identity.cmp(&b.identity))
        });

        Aggregation {
            cases,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use pretty_assertions::assert_eq;
    use test_strategy::proptest;

    fn stored(name: &str, attempt: Attempt, store_index: usize, line: usize) -> StoredAttempt {
        StoredAttempt {
            identity: identity(name),
            attempt,
            offset: EntryOffset { store_index, line },
        }
    }

    #[proptest]
    fn attempts_ordered_by_sequence(
        #[strategy(1usize..12)] count: usize,
        #[strategy(0usize..3)] rotate: usize,
    ) {
        let mut input: Vec<_> = (0..count)
            .map(|seq| stored("test_flaky", attempt(seq as u32, Outcome::Failed), 0, seq + 2))
            .collect();
        // Arrival order must not matter.
        input.rotate_left(rotate % count);
        input.reverse();

        let aggregation = RerunAggregator::group(input);

        proptest::prop_assert_eq!(aggregation.cases.len(), 1);
        let case = &aggregation.cases[0];
        proptest::prop_assert_eq!(case.attempts().len(), count);
        proptest::prop_assert_eq!(case.rerun_count(), count - 1);
        let sequences: Vec<_> = case.attempts().iter().map(|a| a.sequence).collect();
        proptest::prop_assert_eq!(sequences, (0..count as u32).collect::<Vec<_>>());
        proptest::prop_assert!(aggregation.diagnostics.is_empty());
    }

    #[test]
    fn final_status_from_last_attempt() {
        let mut aggregator = RerunAggregator::new();
        aggregator.extend([
            stored("test_flaky", attempt(2, Outcome::Passed), 0, 4),
            stored("test_flaky", attempt(0, Outcome::Failed), 0, 2),
            stored("test_flaky", attempt(1, Outcome::Failed), 0, 3),
        ]);
        let aggregation = aggregator.finish();
        let case = &aggregation.cases[0];
        assert_eq!(case.final_outcome(), Outcome::Passed);
        assert_eq!(case.rerun_count(), 2);
        assert_eq!(case.disposition().to_string(), "passed after 2 retries");
    }

    #[test]
    fn disposition_display() {
        let disposition = |outcome, retries| Disposition { outcome, retries }.to_string();
        assert_eq!(disposition(Outcome::Passed, 0), "passed");
        assert_eq!(disposition(Outcome::Passed, 1), "passed after 1 retry");
        assert_eq!(disposition(Outcome::Failed, 3), "failed after 3 retries");
        assert_eq!(disposition(Outcome::Errored, 0), "errored");
    }

    #[test]
    fn cases_from_several_stores_ordered_by_start() {
        let mut late = attempt(0, Outcome::Passed);
        late.started_at = at(100);
        let mut early = attempt(0, Outcome::Failed);
        early.started_at = at(5);

        let mut aggregator = RerunAggregator::new();
        aggregator.extend([
            stored("test_late", late, 0, 2),
            stored("test_early", early, 1, 2),
            stored("test_b_tie", attempt(0, Outcome::Passed), 1, 3),
            stored("test_a_tie", attempt(0, Outcome::Passed), 0, 3),
        ]);
        let names: Vec<_> = aggregator
            .finish()
            .cases
            .iter()
            .map(|case| case.identity().name.clone())
            .collect();
        assert_eq!(names, vec!["test_a_tie", "test_b_tie", "test_early", "test_late"]);
    }

    #[test]
    fn exact_duplicates_collapse_silently() {
        let mut aggregator = RerunAggregator::new();
        aggregator.extend([
            stored("test_a", attempt(0, Outcome::Passed), 0, 2),
            stored("test_a", attempt(0, Outcome::Passed), 1, 2),
        ]);
        let aggregation = aggregator.finish();
        assert_eq!(aggregation.cases[0].attempts().len(), 1);
        assert!(aggregation.diagnostics.is_empty());
    }

    #[test]
    fn conflicting_duplicate_later_offset_wins() {
        let mut aggregator = RerunAggregator::new();
        // The later record arrives first.
        aggregator.extend([
            stored("test_a", attempt(0, Outcome::Passed), 1, 2),
            stored("test_a", attempt(0, Outcome::Failed), 0, 7),
        ]);
        let aggregation = aggregator.finish();
        assert_eq!(aggregation.cases[0].final_outcome(), Outcome::Passed);
        assert_eq!(aggregation.diagnostics.len(), 1);
        let diagnostic = &aggregation.diagnostics[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::DuplicateAttempt);
        assert!(
            diagnostic
                .message
                .contains("keeping store 1 line 2, discarding store 0 line 7"),
            "{}",
            diagnostic.message
        );
        assert!(diagnostic.message.contains("test_a"), "{}", diagnostic.message);
    }
}
