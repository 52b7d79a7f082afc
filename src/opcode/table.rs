//! This module contains the per-hardfork instruction table consumed by the
//! interpreter.
//!
//! Each of the 256 possible opcode bytes maps to an [`Operation`] describing
//! the stack shape the opcode requires, the memory expansion it performs, and
//! the abstract transfer that models its effect. Tables are built by layering
//! hardforks on top of one another, in the same fashion as the reference
//! client's jump tables.

use ethnum::U256;

use crate::{
    constant::{MAXIMUM_STACK_DEPTH, WORD_SIZE_BYTES},
    domain::stack::AbsStack,
    opcode,
    opcode::version::EthereumVersion,
};

/// The description of a single opcode's behaviour.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Operation {
    /// Whether the opcode is part of the instruction set for the table's
    /// hardfork.
    pub valid: bool,

    /// The minimum stack depth the opcode requires.
    pub min_stack: usize,

    /// The maximum stack depth at which the opcode can execute without
    /// overflowing the stack.
    pub max_stack: usize,

    /// How the opcode expands memory before executing.
    pub memory: MemorySpec,

    /// The abstract model of the opcode's effect, or [`None`] if the
    /// analysis does not model it.
    pub transfer: Option<Transfer>,
}

impl Operation {
    /// The descriptor for opcodes outside the instruction set.
    pub const INVALID: Self = Self {
        valid: false,
        min_stack: 0,
        max_stack: MAXIMUM_STACK_DEPTH,
        memory: MemorySpec::None,
        transfer: None,
    };

    /// Creates a valid operation that pops `pops` values and pushes `pushes`
    /// values, computing the stack bounds the same way the reference
    /// client's `makeStackFunc` does.
    #[must_use]
    pub fn new(pops: usize, pushes: usize, transfer: Transfer) -> Self {
        Self {
            valid: true,
            min_stack: pops,
            max_stack: MAXIMUM_STACK_DEPTH + pops - pushes,
            memory: MemorySpec::None,
            transfer: Some(transfer),
        }
    }

    /// Attaches a memory-expansion specification to the operation.
    #[must_use]
    pub fn with_memory(mut self, memory: MemorySpec) -> Self {
        self.memory = memory;
        self
    }
}

/// The categories of abstract transfer implemented by the interpreter.
///
/// The per-opcode behaviour is selected by a match over this tag together
/// with the payload values, rather than a table of function pointers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transfer {
    /// Halting opcodes: no successor states.
    Halt,

    /// A stack-only operation that folds to a concrete result when all of
    /// its operands are concrete.
    Arith(ArithOp),

    /// `PUSHN` with the given immediate byte count.
    Push(u8),

    /// `DUPN` with the given one-based depth.
    Dup(u8),

    /// `SWAPN` with the given one-based depth.
    Swap(u8),

    /// Pops `pops` operands and discards them.
    Discard { pops: usize },

    /// Pops `pops` operands and pushes a single unknown value. Covers the
    /// environment, blockchain-state and hashing queries whose results the
    /// analysis does not model.
    Env { pops: usize },

    /// Pushes the current program counter.
    Pc,

    /// Pushes the current memory size.
    MSize,

    /// Loads a memory word.
    MLoad,

    /// Stores a memory word.
    MStore,

    /// Stores a single memory byte.
    MStore8,

    /// Copies external data into memory, invalidating the written region.
    /// The operand depths locate the destination offset and length on the
    /// stack before any value is popped.
    MemCopy {
        pops: usize,
        dest_depth: usize,
        len_depth: usize,
    },

    /// An unconditional jump.
    Jump,

    /// A conditional jump.
    JumpI,

    /// The jump-target marker; an identity operation.
    JumpDest,

    /// `LOGN` with the given topic count.
    Log(u8),

    /// A call-family operation: pops `pops` operands, pushes one unknown
    /// value, and invalidates the output region located by `out_region` (as
    /// offset and length operand depths) if there is one.
    Call {
        pops: usize,
        out_region: Option<(usize, usize)>,
    },
}

/// The stack-only operations that the interpreter folds over concrete
/// operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithOp {
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,
}

impl ArithOp {
    /// Gets the number of operands the operation consumes.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::IsZero | Self::Not => 1,
            Self::AddMod | Self::MulMod => 3,
            _ => 2,
        }
    }
}

/// How an opcode expands memory, mirroring the memory-size functions of the
/// reference client. Operand positions are stack depths before any value is
/// popped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemorySpec {
    /// The opcode does not touch memory.
    None,

    /// The opcode accesses a full word at the offset found at
    /// `offset_depth`.
    Word32 { offset_depth: usize },

    /// The opcode accesses a single byte at the offset found at
    /// `offset_depth`.
    Byte1 { offset_depth: usize },

    /// The opcode accesses `len` bytes at `offset`, with both operands on
    /// the stack. An access of length zero requires no expansion regardless
    /// of its offset.
    OffsetLen {
        offset_depth: usize,
        len_depth: usize,
    },

    /// The opcode accesses two regions and requires the larger of the two
    /// expansions. Used by the call family for their input and output
    /// regions.
    MaxOfTwo {
        first: (usize, usize),
        second: (usize, usize),
    },
}

/// The memory expansion required by an opcode, in bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequiredMemory {
    /// The expansion is concretely known. Already rounded up to a whole
    /// number of words.
    Known(u64),

    /// The expansion depends on at least one unknown operand.
    Top,

    /// The requested expansion cannot be addressed.
    Overflow,
}

impl MemorySpec {
    /// Computes the memory expansion in bytes that the opcode requires given
    /// the operands on `stack`, rounded up to a whole number of words.
    ///
    /// The stack must have a concrete shape; operands that cannot be read
    /// yield [`RequiredMemory::Top`].
    #[must_use]
    pub fn required_bytes(&self, stack: &AbsStack) -> RequiredMemory {
        let required = match self {
            Self::None => Some(U256::ZERO),
            Self::Word32 { offset_depth } => {
                region_end(stack, *offset_depth, Operand::Fixed(WORD_SIZE_BYTES))
            }
            Self::Byte1 { offset_depth } => region_end(stack, *offset_depth, Operand::Fixed(1)),
            Self::OffsetLen {
                offset_depth,
                len_depth,
            } => region_end(stack, *offset_depth, Operand::Depth(*len_depth)),
            Self::MaxOfTwo { first, second } => {
                let first = region_end(stack, first.0, Operand::Depth(first.1));
                let second = region_end(stack, second.0, Operand::Depth(second.1));
                match (first, second) {
                    (Some(f), Some(s)) => Some(f.max(s)),
                    _ => None,
                }
            }
        };

        let Some(bytes) = required else {
            return RequiredMemory::Top;
        };
        let Ok(bytes) = u64::try_from(bytes) else {
            return RequiredMemory::Overflow;
        };

        // Round up to a whole number of words, as concrete memory expansion
        // does.
        let Some(words) = bytes.checked_add(WORD_SIZE_BYTES - 1) else {
            return RequiredMemory::Overflow;
        };
        let words = words / WORD_SIZE_BYTES;
        match words.checked_mul(WORD_SIZE_BYTES) {
            Some(rounded) => RequiredMemory::Known(rounded),
            None => RequiredMemory::Overflow,
        }
    }
}

/// A length operand for a memory region: either a fixed byte count or a
/// stack position to read it from.
enum Operand {
    Fixed(u64),
    Depth(usize),
}

/// Computes the end of the memory region described by the offset at
/// `offset_depth` and the provided length operand, in 256-bit arithmetic.
///
/// Returns [`None`] when an operand is unknown. A zero-length region needs no
/// expansion, whatever its offset. A region end that exceeds 256 bits is
/// saturated to a value that the caller will reject as an overflow.
fn region_end(stack: &AbsStack, offset_depth: usize, len: Operand) -> Option<U256> {
    let len = match len {
        Operand::Fixed(bytes) => U256::from(bytes as u128),
        Operand::Depth(depth) => stack.peek(depth)?.as_known()?,
    };
    if len == U256::ZERO {
        return Some(U256::ZERO);
    }
    let offset = stack.peek(offset_depth)?.as_known()?;
    Some(offset.checked_add(len).unwrap_or(U256::MAX))
}

/// A 256-entry instruction table for one hardfork.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionTable {
    ops: [Operation; 256],
}

impl InstructionTable {
    /// Builds the instruction table for the provided hardfork `version`.
    #[must_use]
    pub fn new(version: EthereumVersion) -> Self {
        match version {
            EthereumVersion::Frontier => frontier(),
            EthereumVersion::Homestead => homestead(),
            EthereumVersion::Byzantium => byzantium(),
            EthereumVersion::Constantinople => constantinople(),
        }
    }

    /// Gets the operation descriptor for `opcode`.
    #[must_use]
    pub fn op(&self, opcode: u8) -> &Operation {
        &self.ops[opcode as usize]
    }

    /// Replaces the descriptor for `opcode`.
    fn set(&mut self, opcode: u8, operation: Operation) {
        self.ops[opcode as usize] = operation;
    }
}

/// Builds the instruction table for the frontier release.
#[allow(clippy::too_many_lines)] // The table is a listing; splitting it helps nobody
fn frontier() -> InstructionTable {
    use ArithOp as A;
    use MemorySpec as M;
    use Transfer as T;

    let mut t = InstructionTable {
        ops: [Operation::INVALID; 256],
    };

    t.set(opcode::STOP, Operation::new(0, 0, T::Halt));
    t.set(opcode::ADD, Operation::new(2, 1, T::Arith(A::Add)));
    t.set(opcode::MUL, Operation::new(2, 1, T::Arith(A::Mul)));
    t.set(opcode::SUB, Operation::new(2, 1, T::Arith(A::Sub)));
    t.set(opcode::DIV, Operation::new(2, 1, T::Arith(A::Div)));
    t.set(opcode::SDIV, Operation::new(2, 1, T::Arith(A::SDiv)));
    t.set(opcode::MOD, Operation::new(2, 1, T::Arith(A::Mod)));
    t.set(opcode::SMOD, Operation::new(2, 1, T::Arith(A::SMod)));
    t.set(opcode::ADDMOD, Operation::new(3, 1, T::Arith(A::AddMod)));
    t.set(opcode::MULMOD, Operation::new(3, 1, T::Arith(A::MulMod)));
    t.set(opcode::EXP, Operation::new(2, 1, T::Arith(A::Exp)));
    t.set(
        opcode::SIGNEXTEND,
        Operation::new(2, 1, T::Arith(A::SignExtend)),
    );
    t.set(opcode::LT, Operation::new(2, 1, T::Arith(A::Lt)));
    t.set(opcode::GT, Operation::new(2, 1, T::Arith(A::Gt)));
    t.set(opcode::SLT, Operation::new(2, 1, T::Arith(A::SLt)));
    t.set(opcode::SGT, Operation::new(2, 1, T::Arith(A::SGt)));
    t.set(opcode::EQ, Operation::new(2, 1, T::Arith(A::Eq)));
    t.set(opcode::ISZERO, Operation::new(1, 1, T::Arith(A::IsZero)));
    t.set(opcode::AND, Operation::new(2, 1, T::Arith(A::And)));
    t.set(opcode::OR, Operation::new(2, 1, T::Arith(A::Or)));
    t.set(opcode::XOR, Operation::new(2, 1, T::Arith(A::Xor)));
    t.set(opcode::NOT, Operation::new(1, 1, T::Arith(A::Not)));
    t.set(opcode::BYTE, Operation::new(2, 1, T::Arith(A::Byte)));
    t.set(
        opcode::SHA3,
        Operation::new(2, 1, T::Env { pops: 2 }).with_memory(M::OffsetLen {
            offset_depth: 0,
            len_depth: 1,
        }),
    );
    t.set(opcode::ADDRESS, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::BALANCE, Operation::new(1, 1, T::Env { pops: 1 }));
    t.set(opcode::ORIGIN, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::CALLER, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::CALLVALUE, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(
        opcode::CALLDATALOAD,
        Operation::new(1, 1, T::Env { pops: 1 }),
    );
    t.set(
        opcode::CALLDATASIZE,
        Operation::new(0, 1, T::Env { pops: 0 }),
    );
    t.set(
        opcode::CALLDATACOPY,
        Operation::new(
            3,
            0,
            T::MemCopy {
                pops: 3,
                dest_depth: 0,
                len_depth: 2,
            },
        )
        .with_memory(M::OffsetLen {
            offset_depth: 0,
            len_depth: 2,
        }),
    );
    t.set(opcode::CODESIZE, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(
        opcode::CODECOPY,
        Operation::new(
            3,
            0,
            T::MemCopy {
                pops: 3,
                dest_depth: 0,
                len_depth: 2,
            },
        )
        .with_memory(M::OffsetLen {
            offset_depth: 0,
            len_depth: 2,
        }),
    );
    t.set(opcode::GASPRICE, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::EXTCODESIZE, Operation::new(1, 1, T::Env { pops: 1 }));
    t.set(
        opcode::EXTCODECOPY,
        Operation::new(
            4,
            0,
            T::MemCopy {
                pops: 4,
                dest_depth: 1,
                len_depth: 3,
            },
        )
        .with_memory(M::OffsetLen {
            offset_depth: 1,
            len_depth: 3,
        }),
    );
    t.set(opcode::BLOCKHASH, Operation::new(1, 1, T::Env { pops: 1 }));
    t.set(opcode::COINBASE, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::TIMESTAMP, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::NUMBER, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::DIFFICULTY, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::GASLIMIT, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::POP, Operation::new(1, 0, T::Discard { pops: 1 }));
    t.set(
        opcode::MLOAD,
        Operation::new(1, 1, T::MLoad).with_memory(M::Word32 { offset_depth: 0 }),
    );
    t.set(
        opcode::MSTORE,
        Operation::new(2, 0, T::MStore).with_memory(M::Word32 { offset_depth: 0 }),
    );
    t.set(
        opcode::MSTORE8,
        Operation::new(2, 0, T::MStore8).with_memory(M::Byte1 { offset_depth: 0 }),
    );
    t.set(opcode::SLOAD, Operation::new(1, 1, T::Env { pops: 1 }));
    t.set(opcode::SSTORE, Operation::new(2, 0, T::Discard { pops: 2 }));
    t.set(opcode::JUMP, Operation::new(1, 0, T::Jump));
    t.set(opcode::JUMPI, Operation::new(2, 0, T::JumpI));
    t.set(opcode::PC, Operation::new(0, 1, T::Pc));
    t.set(opcode::MSIZE, Operation::new(0, 1, T::MSize));
    t.set(opcode::GAS, Operation::new(0, 1, T::Env { pops: 0 }));
    t.set(opcode::JUMPDEST, Operation::new(0, 0, T::JumpDest));

    for n in 1..=32u8 {
        t.set(opcode::PUSH1 + n - 1, Operation::new(0, 1, T::Push(n)));
    }
    for n in 1..=16u8 {
        t.set(
            opcode::DUP1 + n - 1,
            Operation::new(n as usize, n as usize + 1, T::Dup(n)),
        );
    }
    for n in 1..=16u8 {
        t.set(
            opcode::SWAP1 + n - 1,
            Operation::new(n as usize + 1, n as usize + 1, T::Swap(n)),
        );
    }
    for n in 0..=4u8 {
        t.set(
            opcode::LOG0 + n,
            Operation::new(n as usize + 2, 0, T::Log(n)).with_memory(M::OffsetLen {
                offset_depth: 0,
                len_depth: 1,
            }),
        );
    }

    t.set(
        opcode::CREATE,
        Operation::new(
            3,
            1,
            T::Call {
                pops: 3,
                out_region: None,
            },
        )
        .with_memory(M::OffsetLen {
            offset_depth: 1,
            len_depth: 2,
        }),
    );
    t.set(
        opcode::CALL,
        Operation::new(
            7,
            1,
            T::Call {
                pops: 7,
                out_region: Some((5, 6)),
            },
        )
        .with_memory(M::MaxOfTwo {
            first: (5, 6),
            second: (3, 4),
        }),
    );
    t.set(
        opcode::CALLCODE,
        Operation::new(
            7,
            1,
            T::Call {
                pops: 7,
                out_region: Some((5, 6)),
            },
        )
        .with_memory(M::MaxOfTwo {
            first: (5, 6),
            second: (3, 4),
        }),
    );
    t.set(
        opcode::RETURN,
        Operation::new(2, 0, T::Halt).with_memory(M::OffsetLen {
            offset_depth: 0,
            len_depth: 1,
        }),
    );
    t.set(opcode::SELFDESTRUCT, Operation::new(1, 0, T::Halt));

    t
}

/// Builds the instruction table for the homestead fork.
fn homestead() -> InstructionTable {
    let mut t = frontier();
    t.set(
        opcode::DELEGATECALL,
        Operation::new(
            6,
            1,
            Transfer::Call {
                pops: 6,
                out_region: Some((4, 5)),
            },
        )
        .with_memory(MemorySpec::MaxOfTwo {
            first: (4, 5),
            second: (2, 3),
        }),
    );
    t
}

/// Builds the instruction table for the byzantium fork.
fn byzantium() -> InstructionTable {
    let mut t = homestead();
    t.set(
        opcode::STATICCALL,
        Operation::new(
            6,
            1,
            Transfer::Call {
                pops: 6,
                out_region: Some((4, 5)),
            },
        )
        .with_memory(MemorySpec::MaxOfTwo {
            first: (4, 5),
            second: (2, 3),
        }),
    );
    t.set(
        opcode::RETURNDATASIZE,
        Operation::new(0, 1, Transfer::Env { pops: 0 }),
    );
    t.set(
        opcode::RETURNDATACOPY,
        Operation::new(
            3,
            0,
            Transfer::MemCopy {
                pops: 3,
                dest_depth: 0,
                len_depth: 2,
            },
        )
        .with_memory(MemorySpec::OffsetLen {
            offset_depth: 0,
            len_depth: 2,
        }),
    );
    t.set(
        opcode::REVERT,
        Operation::new(2, 0, Transfer::Halt).with_memory(MemorySpec::OffsetLen {
            offset_depth: 0,
            len_depth: 1,
        }),
    );
    t
}

/// Builds the instruction table for the constantinople fork.
fn constantinople() -> InstructionTable {
    let mut t = byzantium();
    t.set(
        opcode::SHL,
        Operation::new(2, 1, Transfer::Arith(ArithOp::Shl)),
    );
    t.set(
        opcode::SHR,
        Operation::new(2, 1, Transfer::Arith(ArithOp::Shr)),
    );
    t.set(
        opcode::SAR,
        Operation::new(2, 1, Transfer::Arith(ArithOp::Sar)),
    );
    t.set(
        opcode::EXTCODEHASH,
        Operation::new(1, 1, Transfer::Env { pops: 1 }),
    );
    t.set(
        opcode::CREATE2,
        Operation::new(
            4,
            1,
            Transfer::Call {
                pops: 4,
                out_region: None,
            },
        )
        .with_memory(MemorySpec::OffsetLen {
            offset_depth: 1,
            len_depth: 2,
        }),
    );
    t
}
