//! This module contains the registry of instructions that the host is (or is
//! no longer) interested in reaching.

use std::collections::HashSet;

use crate::contract::CodeHash;

/// Bookkeeping for the instructions that the analysis treats specially.
///
/// Two kinds of entry live here. Covered assertions are assertion sites the
/// host has already reported elsewhere; reaching one again is silently
/// treated as a halt rather than a failure. Target instructions are points
/// the host is actively steering towards; any path that may reach one makes
/// the suffix unprunable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TargetRegistry {
    covered_assertions: HashSet<String>,
    target_instructions: HashSet<String>,
    target_assertion_events: bool,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the assertion at `pc` in the contract identified by
    /// `code_hash` has already been covered.
    pub fn record_covered_assertion(&mut self, code_hash: &CodeHash, pc: u64) {
        self.covered_assertions.insert(Self::key(code_hash, pc));
    }

    /// Checks whether the assertion at `pc` in the contract identified by
    /// `code_hash` has already been covered.
    #[must_use]
    pub fn is_covered_assertion(&self, code_hash: &CodeHash, pc: u64) -> bool {
        self.covered_assertions.contains(&Self::key(code_hash, pc))
    }

    /// Registers the instruction at `pc` in the contract identified by
    /// `code_hash` as a target.
    pub fn add_target_instruction(&mut self, code_hash: &CodeHash, pc: u64) {
        self.target_instructions.insert(Self::key(code_hash, pc));
    }

    /// Checks whether the instruction at `pc` in the contract identified by
    /// `code_hash` is a registered target.
    #[must_use]
    pub fn is_target_instruction(&self, code_hash: &CodeHash, pc: u64) -> bool {
        self.target_instructions.contains(&Self::key(code_hash, pc))
    }

    /// Makes the analysis treat `AssertionFailed` event emissions as targets.
    pub fn target_assertion_failed_events(&mut self) {
        self.target_assertion_events = true;
    }

    /// Checks whether `AssertionFailed` event emissions are treated as
    /// targets.
    #[must_use]
    pub fn targets_assertion_failed_events(&self) -> bool {
        self.target_assertion_events
    }

    /// Builds the registry key for the instruction at `pc` in the contract
    /// identified by `code_hash`.
    fn key(code_hash: &CodeHash, pc: u64) -> String {
        format!("{code_hash}:{pc:x}")
    }
}
