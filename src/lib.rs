//! This library implements a lookahead static analysis of
//! [EVM](https://ethereum.org/en/developers/docs/evm/) bytecode for use by
//! symbolic execution engines. Given the prefix of control-flow decisions a
//! driver has already taken through a contract, it answers whether anything
//! reachable beyond that prefix can still fail. If nothing can, the driver
//! may safely drop the whole suffix and save the work of exploring it.
//!
//! # How it Works
//!
//! From a very high level, a suffix query is answered as follows:
//!
//! 1. The driver binds a contract with [`analyzer::LookaheadAnalyzer::start`]
//!    and reports each decision it takes; the coordinator accumulates them
//!    and folds them into a running hash.
//! 2. On [`analyzer::LookaheadAnalyzer::can_ignore_suffix`], the hash is
//!    looked up in the verdict cache. A hit answers immediately.
//! 3. On a miss, the [`interpreter::Interpreter`] replays the prefix over
//!    the abstract domain in [`domain`], reconstructing the machine state
//!    concrete execution must have had at the prefix's end.
//! 4. A worklist fixpoint then explores every program counter reachable
//!    beyond the prefix, folding constants where it can and widening to
//!    unknown values where it cannot, until the state table settles or some
//!    path is found that may fail.
//! 5. The verdict is cached and counted, and the driver prunes or explores
//!    accordingly.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct a
//! `LookaheadAnalyzer`, hand it your bytecode, and report decisions as you
//! take them.
//!
//! ```
//! use lookahead_analyzer::analyzer::LookaheadAnalyzer;
//!
//! // PUSH1 1; PUSH1 2; ADD; STOP
//! let code = vec![0x60, 0x01, 0x60, 0x02, 0x01, 0x00];
//!
//! let mut analyzer = LookaheadAnalyzer::new();
//! analyzer.start_with_derived_hash(code);
//! for pc in [0, 2, 4] {
//!     analyzer.append_prefix_instruction(pc);
//! }
//!
//! let verdict = analyzer.can_ignore_suffix().unwrap();
//! assert!(verdict.can_ignore);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod analyzer;
pub mod constant;
pub mod contract;
pub mod domain;
pub mod error;
pub mod interpreter;
pub mod opcode;

// Re-exports to provide the library interface.
pub use analyzer::{LookaheadAnalyzer, SuffixVerdict};
pub use contract::Contract;
