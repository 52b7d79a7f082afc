//! This module contains types for dealing with the concrete contracts whose
//! execution suffixes you want to analyze.

use std::{
    fmt::{Display, Formatter},
    fs::File,
    io::Read,
};

use anyhow::anyhow;
use ethnum::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{
    constant::{SYNTHETIC_CONTRACT_ADDRESS, SYNTHETIC_CONTRACT_GAS},
    opcode,
};

/// The Keccak-256 hash identifying a contract's bytecode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CodeHash([u8; 32]);

impl CodeHash {
    /// Computes the code hash of the provided `code`.
    #[must_use]
    pub fn of(code: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(code);
        Self(hasher.finalize().into())
    }

    /// Gets the raw bytes of the hash.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for CodeHash {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

/// Pretty-prints the hash as lowercase hexadecimal.
impl Display for CodeHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A contract under analysis.
///
/// The analysis never runs the contract for real, so the address and gas
/// allowance exist only to give the bytecode a complete execution context;
/// [`Self::synthetic`] fills them with recognisable placeholder values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contract {
    address: U256,
    code: Vec<u8>,
    code_hash: CodeHash,
    gas: u64,
    jump_dests: Vec<bool>,
}

impl Contract {
    /// Creates a new contract from the provided `code` with the provided
    /// identity.
    #[must_use]
    pub fn new(code: Vec<u8>, code_hash: CodeHash, address: U256, gas: u64) -> Self {
        let jump_dests = find_jump_dests(&code);
        Self {
            address,
            code,
            code_hash,
            gas,
            jump_dests,
        }
    }

    /// Creates a contract wrapping the provided `code` with a synthetic
    /// identity, for analyses where no real deployment exists.
    #[must_use]
    pub fn synthetic(code: Vec<u8>, code_hash: CodeHash) -> Self {
        Self::new(
            code,
            code_hash,
            U256::from(SYNTHETIC_CONTRACT_ADDRESS as u128),
            SYNTHETIC_CONTRACT_GAS,
        )
    }

    /// Creates a new contract from the file at the provided `path`, deriving
    /// its code hash from the bytecode.
    ///
    /// The file at `path` must be a compiled representation of a Solidity
    /// contract, usually output as JSON, and compiled without the CBOR
    /// metadata.
    ///
    /// If using `forge` you will need to set the following in your
    /// `foundry.toml`:
    ///
    /// ```toml
    /// cbor_metadata = false
    /// bytecode_hash = "none"
    /// ```
    ///
    /// # Errors
    ///
    /// If the file cannot be read, parsed, or hex-decoded.
    pub fn new_from_file(path: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut file = File::open(path).map_err(|_| anyhow!("File not available"))?;
        let mut contents = vec![];
        file.read_to_end(&mut contents)
            .map_err(|_| anyhow!("File could not be read"))?;

        let contract_rep: CompiledContract = serde_json::from_slice(contents.as_slice())
            .map_err(|_| anyhow!("Could not parse compiled contract."))?;

        // Generally unsafe but fine for ASCII.
        let bytecode_string = contract_rep.deployed_bytecode.object;
        let no_0x_prefix = &bytecode_string[2..];

        let code = hex::decode(no_0x_prefix).map_err(|_| anyhow!("Could not decode hex"))?;
        let code_hash = CodeHash::of(&code);

        Ok(Self::synthetic(code, code_hash))
    }

    /// Gets the opcode at the provided `pc`.
    ///
    /// Positions beyond the end of the bytecode read as `STOP`, matching the
    /// EVM's implicit-halt behaviour.
    #[must_use]
    pub fn op_at(&self, pc: u64) -> u8 {
        usize::try_from(pc)
            .ok()
            .and_then(|index| self.code.get(index).copied())
            .unwrap_or(opcode::STOP)
    }

    /// Reads the `count`-byte big-endian push immediate that starts directly
    /// after the opcode at `pc`.
    ///
    /// Immediate bytes beyond the end of the bytecode read as zero on the
    /// low end of the literal, matching how the EVM pads truncated pushes.
    #[must_use]
    pub fn push_literal(&self, pc: u64, count: u8) -> U256 {
        let count = count.min(32) as usize;
        let mut word = [0u8; 32];
        for index in 0..count {
            // The literal occupies the top `count` bytes of the word, so a
            // missing trailing byte leaves a zero in the corresponding low
            // position.
            word[32 - count + index] = self.op_at(pc + 1 + index as u64);
        }
        U256::from_be_bytes(word)
    }

    /// Checks whether `target` is a valid jump destination: a `JUMPDEST`
    /// opcode that is not part of a push immediate.
    #[must_use]
    pub fn is_valid_jump_dest(&self, target: U256) -> bool {
        usize::try_from(target)
            .ok()
            .and_then(|index| self.jump_dests.get(index).copied())
            .unwrap_or(false)
    }

    /// Gets the bytecode of the contract.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.code
    }

    /// Gets the length of the bytecode in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Checks whether the contract has any bytecode at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Gets the code hash of the contract.
    #[must_use]
    pub fn code_hash(&self) -> &CodeHash {
        &self.code_hash
    }

    /// Gets the address of the contract.
    #[must_use]
    pub fn address(&self) -> U256 {
        self.address
    }

    /// Gets the gas allowance of the contract.
    #[must_use]
    pub fn gas(&self) -> u64 {
        self.gas
    }
}

/// Scans `code` for the positions holding a `JUMPDEST` opcode, skipping the
/// immediate bytes of push instructions.
fn find_jump_dests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut index = 0;
    while index < code.len() {
        let byte = code[index];
        if byte == opcode::JUMPDEST {
            dests[index] = true;
        }
        index += 1 + opcode::push_byte_count(byte).unwrap_or(0) as usize;
    }
    dests
}

/// A wrapper for the parts of the JSON representation of the compiled
/// contract on disk that we care about.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledContract {
    deployed_bytecode: DeployedBytecode,
}
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedBytecode {
    object: String,
}
