//! This module contains the lookahead coordinator: the host-facing object
//! that accumulates prefix decisions, caches suffix verdicts, and owns the
//! bookkeeping shared across queries.
//!
//! # Session Model
//!
//! A coordinator is bound to one contract at a time with
//! [`LookaheadAnalyzer::start`], which resets the prefix and the running
//! hash.
//! The verdict cache, the target registry and the statistics deliberately
//! survive across `start` calls, since hosts re-enter the same contracts
//! many times.
//!
//! # Concurrency
//!
//! A coordinator is single-threaded. Hosts that analyze several contracts
//! concurrently should own one coordinator per worker.

pub mod prefix;
pub mod stats;

use std::{collections::HashMap, rc::Rc, time::Instant};

use crate::{
    analyzer::{prefix::ExecPrefix, stats::Statistics},
    contract::{CodeHash, Contract},
    error,
    error::analysis,
    interpreter::{targets::TargetRegistry, verdict::Verdict, Config, Interpreter},
};

/// The host-facing answer to a single suffix query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuffixVerdict {
    /// Whether the host may drop the suffix beyond the current prefix.
    pub can_ignore: bool,

    /// Whether the host must not retry this query with the same prefix.
    /// Set when the failure arose while replaying the prefix, which is
    /// deterministic and will recur.
    pub avoid_retry: bool,

    /// The stable encoding of the failure cause, when the suffix may fail.
    pub cause: Option<String>,

    /// The identifier of the queried prefix, as the lowercase hexadecimal
    /// rendering of its 32-bit hash.
    pub prefix_id: String,
}

/// The per-contract state installed by [`LookaheadAnalyzer::start`].
#[derive(Clone, Debug)]
struct Session {
    contract: Rc<Contract>,
    prefix: ExecPrefix,
    interpreter: Option<Interpreter>,
}

/// The coordinator of the lookahead analysis.
///
/// The host driver reports every control-flow decision it takes through
/// [`Self::append_prefix_instruction`] (or
/// [`Self::append_prefix_summary`] for collapsed inner calls), and asks
/// [`Self::can_ignore_suffix`] before exploring beyond the prefix. Verdicts
/// are cached by the prefix hash alone: two prefixes hashing to the same
/// 32-bit value share a cache entry, an accepted trade-off because hosts
/// treat a positive answer as an optimisation rather than a safety
/// guarantee.
#[derive(Clone, Debug)]
pub struct LookaheadAnalyzer {
    config: Config,
    session: Option<Session>,
    cache: HashMap<u32, Verdict>,
    targets: TargetRegistry,
    stats: Statistics,
}

impl LookaheadAnalyzer {
    /// Creates a coordinator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a coordinator with the provided `config`. The configuration
    /// cannot change afterwards.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            session: None,
            cache: HashMap::new(),
            targets: TargetRegistry::new(),
            stats: Statistics::new(),
        }
    }

    /// Binds the coordinator to the contract with the provided `code` and
    /// `code_hash`, resetting the prefix and its hash.
    ///
    /// The bytecode is wrapped in a synthetic contract so that the
    /// interpreter's code-fetch path is uniform whether or not a real
    /// deployment backs it.
    pub fn start(&mut self, code: Vec<u8>, code_hash: impl Into<CodeHash>) {
        let contract = Contract::synthetic(code, code_hash.into());
        self.session = Some(Session {
            contract: Rc::new(contract),
            prefix: ExecPrefix::new(),
            interpreter: None,
        });
    }

    /// Binds the coordinator to the contract with the provided `code`,
    /// deriving the code hash from the bytecode for hosts that do not track
    /// one.
    pub fn start_with_derived_hash(&mut self, code: Vec<u8>) {
        let code_hash = CodeHash::of(&code);
        self.start(code, code_hash);
    }

    /// Mixes the identifier of a replayed call summary into the prefix
    /// hash.
    ///
    /// Does nothing when the coordinator has not been started.
    pub fn append_prefix_summary(&mut self, summary_id: &str) {
        if let Some(session) = self.session.as_mut() {
            session.prefix.append_summary(summary_id);
        }
    }

    /// Appends an instruction decision to the prefix.
    ///
    /// Does nothing when the coordinator has not been started.
    pub fn append_prefix_instruction(&mut self, pc: u64) {
        let started = Instant::now();
        if let Some(session) = self.session.as_mut() {
            session.prefix.append_instruction(pc);
        }
        self.stats.add_elapsed(started.elapsed());
    }

    /// Judges whether the host may drop everything reachable beyond the
    /// current prefix.
    ///
    /// Verdicts, both positive and may-fail, are cached by prefix hash.
    /// Errors are never cached; [`error::Error::avoid_retry`] tells the host
    /// whether retrying the same prefix can ever succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the coordinator has not been started, or if the
    /// prefix could not be replayed against the bytecode at all.
    pub fn can_ignore_suffix(&mut self) -> error::Result<SuffixVerdict> {
        let started = Instant::now();
        let result = self.query_suffix();
        self.stats.add_elapsed(started.elapsed());
        result
    }

    fn query_suffix(&mut self) -> error::Result<SuffixVerdict> {
        let Some(session) = self.session.as_mut() else {
            return Err(analysis::Error::NotStarted.into());
        };
        let hash = session.prefix.hash();
        let prefix_id = session.prefix.id();

        if let Some(cached) = self.cache.get(&hash) {
            if cached.may_fail {
                return Ok(SuffixVerdict {
                    can_ignore: false,
                    avoid_retry: cached.in_prefix,
                    cause: cached.cause.as_ref().map(ToString::to_string),
                    prefix_id,
                });
            }
            self.stats.record_success();
            return Ok(SuffixVerdict {
                can_ignore: true,
                avoid_retry: cached.in_prefix,
                cause: None,
                prefix_id,
            });
        }

        // The interpreter is built once per session, on the first query that
        // misses the cache.
        let interpreter = session
            .interpreter
            .get_or_insert_with(|| Interpreter::new(session.contract.clone(), self.config.clone()));

        let verdict = match interpreter.analyze(session.prefix.pcs(), &self.targets) {
            Ok(verdict) => verdict,
            Err(source) => {
                self.stats.record_error();
                return Err(error::Error::Query { prefix_id, source });
            }
        };

        // Both kinds of verdict are cached, but errors never are.
        self.cache.insert(hash, verdict.clone());

        if let Some(cause) = &verdict.cause {
            self.stats.record_failure(cause, verdict.in_prefix);
            return Ok(SuffixVerdict {
                can_ignore: false,
                avoid_retry: verdict.in_prefix,
                cause: Some(cause.to_string()),
                prefix_id,
            });
        }

        self.stats.record_success();
        Ok(SuffixVerdict {
            can_ignore: true,
            avoid_retry: false,
            cause: None,
            prefix_id,
        })
    }

    /// Records that the assertion at `pc` in the contract identified by
    /// `code_hash` has already been covered, so reaching it again is not
    /// worth reporting.
    pub fn record_covered_assertion(&mut self, code_hash: impl Into<CodeHash>, pc: u64) {
        self.targets.record_covered_assertion(&code_hash.into(), pc);
    }

    /// Checks whether the assertion at `pc` in the contract identified by
    /// `code_hash` has already been covered.
    #[must_use]
    pub fn is_covered_assertion(&self, code_hash: impl Into<CodeHash>, pc: u64) -> bool {
        self.targets.is_covered_assertion(&code_hash.into(), pc)
    }

    /// Registers the instruction at `pc` in the contract identified by
    /// `code_hash` as a target the host is steering towards.
    pub fn add_target_instruction(&mut self, code_hash: impl Into<CodeHash>, pc: u64) {
        self.targets.add_target_instruction(&code_hash.into(), pc);
    }

    /// Makes the analysis treat `AssertionFailed` event emissions as
    /// targets.
    pub fn target_assertion_failed_events(&mut self) {
        self.targets.target_assertion_failed_events();
    }

    /// Records that the host discarded a path for having an already-seen
    /// location identifier.
    pub fn record_path_with_same_lid(&mut self) {
        self.stats.record_path_with_same_lid();
    }

    /// Gets the number of queries whose suffix was ignorable.
    #[must_use]
    pub fn num_success(&self) -> u64 {
        self.stats.num_success()
    }

    /// Gets the number of queries whose suffix may fail.
    #[must_use]
    pub fn num_fail(&self) -> u64 {
        self.stats.num_fail()
    }

    /// Gets the number of queries whose prefix replay may fail.
    #[must_use]
    pub fn num_prefix_fail(&self) -> u64 {
        self.stats.num_prefix_fail()
    }

    /// Gets the number of queries that could not be answered.
    #[must_use]
    pub fn num_errors(&self) -> u64 {
        self.stats.num_errors()
    }

    /// Gets the number of paths the host discarded for having an
    /// already-seen location identifier.
    #[must_use]
    pub fn num_paths_with_same_lid(&self) -> u64 {
        self.stats.num_paths_with_same_lid()
    }

    /// Gets the total time spent appending instructions and answering
    /// queries.
    #[must_use]
    pub fn time(&self) -> std::time::Duration {
        self.stats.time()
    }

    /// Gets a copy of the per-cause failure counts, keyed by the stable
    /// cause encodings.
    #[must_use]
    pub fn failure_causes(&self) -> HashMap<String, u64> {
        self.stats.failure_causes()
    }

    /// Gets the accumulated statistics.
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

impl Default for LookaheadAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::LookaheadAnalyzer;

    #[test]
    fn cannot_query_before_starting() {
        let mut analyzer = LookaheadAnalyzer::new();
        let result = analyzer.can_ignore_suffix();
        assert!(result.is_err());
        assert_eq!(analyzer.num_errors(), 0);
    }

    #[test]
    fn can_query_a_halting_contract() {
        let mut analyzer = LookaheadAnalyzer::new();
        analyzer.start_with_derived_hash(vec![0x00]);

        let verdict = analyzer.can_ignore_suffix().expect("query failed");
        assert!(verdict.can_ignore);
        assert!(!verdict.avoid_retry);
        assert_eq!(verdict.cause, None);
        assert_eq!(analyzer.num_success(), 1);
    }

    #[test]
    fn appending_before_start_is_ignored() {
        let mut analyzer = LookaheadAnalyzer::new();
        analyzer.append_prefix_instruction(3);
        analyzer.append_prefix_summary("sum");

        analyzer.start_with_derived_hash(vec![0x00]);
        let verdict = analyzer.can_ignore_suffix().expect("query failed");
        // The ignored decisions must not have influenced the prefix id.
        let mut fresh = LookaheadAnalyzer::new();
        fresh.start_with_derived_hash(vec![0x00]);
        let fresh_verdict = fresh.can_ignore_suffix().expect("query failed");
        assert_eq!(verdict.prefix_id, fresh_verdict.prefix_id);
    }

    #[test]
    fn starting_again_resets_the_prefix() {
        let mut analyzer = LookaheadAnalyzer::new();
        analyzer.start_with_derived_hash(vec![0x00]);
        analyzer.append_prefix_instruction(0);

        analyzer.start_with_derived_hash(vec![0x00]);
        let verdict = analyzer.can_ignore_suffix().expect("query failed");

        let mut fresh = LookaheadAnalyzer::new();
        fresh.start_with_derived_hash(vec![0x00]);
        let fresh_verdict = fresh.can_ignore_suffix().expect("query failed");
        assert_eq!(verdict.prefix_id, fresh_verdict.prefix_id);
    }
}
