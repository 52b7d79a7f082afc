//! This module contains the statistics the coordinator accumulates across
//! queries, for hosts that report on how much work the lookahead saved.

use std::{collections::HashMap, time::Duration};

use crate::interpreter::verdict::FailureCause;

/// Counters describing the outcomes of all queries issued so far.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    num_success: u64,
    num_fail: u64,
    num_prefix_fail: u64,
    num_errors: u64,
    num_same_lid: u64,
    failure_causes: HashMap<String, u64>,
    elapsed: Duration,
}

impl Statistics {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a query whose suffix turned out to be ignorable.
    pub fn record_success(&mut self) {
        self.num_success += 1;
    }

    /// Records a query that judged its suffix (or prefix, with `in_prefix`)
    /// as possibly failing with `cause`.
    pub fn record_failure(&mut self, cause: &FailureCause, in_prefix: bool) {
        if in_prefix {
            self.num_prefix_fail += 1;
        } else {
            self.num_fail += 1;
        }
        *self.failure_causes.entry(cause.to_string()).or_insert(0) += 1;
    }

    /// Records a query that could not be answered at all.
    pub fn record_error(&mut self) {
        self.num_errors += 1;
    }

    /// Records that the host discarded a path for having an already-seen
    /// location identifier.
    pub fn record_path_with_same_lid(&mut self) {
        self.num_same_lid += 1;
    }

    /// Adds `duration` to the total time spent in the analyzer.
    pub fn add_elapsed(&mut self, duration: Duration) {
        self.elapsed += duration;
    }

    /// Gets the number of queries whose suffix was ignorable.
    #[must_use]
    pub fn num_success(&self) -> u64 {
        self.num_success
    }

    /// Gets the number of queries whose suffix may fail.
    #[must_use]
    pub fn num_fail(&self) -> u64 {
        self.num_fail
    }

    /// Gets the number of queries whose prefix replay may fail.
    #[must_use]
    pub fn num_prefix_fail(&self) -> u64 {
        self.num_prefix_fail
    }

    /// Gets the number of queries that could not be answered.
    #[must_use]
    pub fn num_errors(&self) -> u64 {
        self.num_errors
    }

    /// Gets the number of paths the host discarded for having an
    /// already-seen location identifier.
    #[must_use]
    pub fn num_paths_with_same_lid(&self) -> u64 {
        self.num_same_lid
    }

    /// Gets the total time spent in the analyzer.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.elapsed
    }

    /// Gets a copy of the per-cause failure counts, keyed by the stable
    /// cause encodings.
    #[must_use]
    pub fn failure_causes(&self) -> HashMap<String, u64> {
        self.failure_causes.clone()
    }
}

#[cfg(test)]
mod test {
    use super::Statistics;
    use crate::interpreter::verdict::FailureCause;

    #[test]
    fn separates_prefix_and_suffix_failures() {
        let mut stats = Statistics::new();
        stats.record_failure(&FailureCause::InvalidOpcode, false);
        stats.record_failure(&FailureCause::JumpToTop.in_prefix(), true);

        assert_eq!(stats.num_fail(), 1);
        assert_eq!(stats.num_prefix_fail(), 1);

        let causes = stats.failure_causes();
        assert_eq!(causes.get("invalid-opcode"), Some(&1));
        assert_eq!(
            causes.get("prefix-computation-failure(jump-to-top)"),
            Some(&1)
        );
    }

    #[test]
    fn counts_repeated_causes() {
        let mut stats = Statistics::new();
        stats.record_failure(&FailureCause::TopStack, false);
        stats.record_failure(&FailureCause::TopStack, false);

        assert_eq!(stats.num_fail(), 2);
        assert_eq!(stats.failure_causes().get("top-stack"), Some(&2));
    }
}
