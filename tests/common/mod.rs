//! This module contains common testing utilities for testing this library.
#![cfg(test)]

use anyhow::anyhow;
use lookahead_analyzer::{
    analyzer::LookaheadAnalyzer,
    contract::CodeHash,
    interpreter::Config,
};

/// Decodes the hex-encoded (without a `0x` prefix) `code` into bytecode.
#[allow(unused)] // It is actually
pub fn bytecode(code: impl Into<String>) -> anyhow::Result<Vec<u8>> {
    hex::decode(code.into()).map_err(|_| anyhow!("Could not decode hex"))
}

/// Computes the code hash for the provided `code`.
#[allow(unused)] // It is actually
pub fn code_hash(code: &[u8]) -> CodeHash {
    CodeHash::of(code)
}

/// Constructs a new analyzer bound to the hex-encoded bytecode provided in
/// `code`, with the prefix decisions in `prefix` already appended, using the
/// default configuration.
#[allow(unused)] // It is actually
pub fn started_analyzer(code: impl Into<String>, prefix: &[u64]) -> anyhow::Result<LookaheadAnalyzer> {
    started_analyzer_with_config(code, prefix, Config::default())
}

/// Constructs a new analyzer bound to the hex-encoded bytecode provided in
/// `code`, with the prefix decisions in `prefix` already appended, using the
/// provided `config`.
#[allow(unused)] // It is actually
pub fn started_analyzer_with_config(
    code: impl Into<String>,
    prefix: &[u64],
    config: Config,
) -> anyhow::Result<LookaheadAnalyzer> {
    let code = bytecode(code)?;
    let mut analyzer = LookaheadAnalyzer::with_config(config);
    analyzer.start_with_derived_hash(code);
    for pc in prefix {
        analyzer.append_prefix_instruction(*pc);
    }
    Ok(analyzer)
}
