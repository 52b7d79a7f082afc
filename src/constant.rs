//! This module contains constants that are needed throughout the codebase.

/// The maximum stack depth for the EVM.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of an EVM word in bytes.
pub const WORD_SIZE_BYTES: u64 = 32;

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The base byte value for the `DUP` opcode.
///
/// This is constructed such that for `DUPN`, `DUP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
///
/// This is constructed such that for `SWAPN`, `SWAP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
///
/// This is constructed such that for `LOGN`, `LOG_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The first topic emitted by `LOG1` for a Solidity `AssertionFailed(string)`
/// event, as a Keccak-256 hash of the event signature.
///
/// Observing this topic during analysis means the code under analysis has
/// reached a failed assertion.
pub const ASSERTION_FAILED_TOPIC: [u8; 32] = [
    0xb4, 0x26, 0x04, 0xcb, 0x10, 0x5a, 0x16, 0xc8, 0xf6, 0xdb, 0x8a, 0x41, 0xe6, 0xb0, 0x0c,
    0x0c, 0x1b, 0x48, 0x26, 0x46, 0x5e, 0x8b, 0xc5, 0x04, 0xb3, 0xeb, 0x3e, 0x88, 0xb3, 0xe6,
    0xa4, 0xa0,
];

/// The address given to the synthetic contract that wraps the bytecode under
/// analysis.
///
/// The analysis never executes operations that depend on the address, so any
/// recognisable value works here.
pub const SYNTHETIC_CONTRACT_ADDRESS: u64 = 0x0123_4567_89ab_cdef;

/// The gas allowance given to the synthetic contract that wraps the bytecode
/// under analysis.
///
/// Gas is not accounted for during analysis, so this is effectively
/// "unlimited".
pub const SYNTHETIC_CONTRACT_GAS: u64 = 0xffff_ffff_ffff_ffff;

/// The default number of concrete stack-length partitions that are tracked
/// per program counter before further states collapse into the shared
/// partition.
pub const DEFAULT_MAX_DISJUNCTS: usize = 4;

/// Whether an unknown memory resize fails the analysis by default, rather
/// than widening the abstract memory to an unknown state.
pub const DEFAULT_FAIL_ON_TOP_MEMORY_RESIZE: bool = false;

/// Whether worklist entries are by default re-enqueued when their state
/// changes after the first visit.
pub const DEFAULT_USE_BOUNDED_JOINS: bool = false;

/// Whether the analysis dumps the prefix and bytecode on entry by default.
pub const DEFAULT_VERBOSE: bool = false;

/// The maximum number of memory words that a single transfer will track
/// individually when invalidating a written region.
///
/// Regions larger than this widen the whole memory to unknown instead of
/// being walked word by word.
pub const MAXIMUM_TRACKED_REGION_WORDS: u64 = 4096;
