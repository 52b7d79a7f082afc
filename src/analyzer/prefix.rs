//! This module contains the accumulated prefix of control-flow decisions and
//! the running hash that identifies it.

/// The offset basis of the 32-bit FNV-1a hash.
const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// The prime of the 32-bit FNV-1a hash.
const FNV32_PRIME: u32 = 0x0100_0193;

/// An incremental 32-bit [FNV-1a](http://www.isthe.com/chongo/tech/comp/fnv/)
/// hasher.
///
/// The ecosystem's `fnv` crate implements only the 64-bit variant of the
/// function, and prefix identifiers are defined over the 32-bit sums, so the
/// fold is implemented here. Reference sums: `fnv1a32("") = 0x811c9dc5`,
/// `fnv1a32("foobar") = 0xbf9cf968`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fnv32 {
    state: u32,
}

impl Fnv32 {
    /// Creates a hasher over the empty input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: FNV32_OFFSET_BASIS,
        }
    }

    /// Folds `bytes` into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u32::from(*byte);
            self.state = self.state.wrapping_mul(FNV32_PRIME);
        }
    }

    /// Gets the current 32-bit sum.
    #[must_use]
    pub fn sum(&self) -> u32 {
        self.state
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

/// The ordered prefix of decisions the host driver has taken, together with
/// the running hash identifying it.
///
/// Two kinds of decision are mixed into the hash: instruction decisions,
/// which also append their program counter to the replayable sequence, and
/// summary decisions, which only contribute their identifier's bytes (the
/// driver collapsed an inner call by replaying a prior summary rather than
/// stepping it).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecPrefix {
    pcs: Vec<u64>,
    hasher: Fnv32,
}

impl ExecPrefix {
    /// Creates an empty prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pcs: Vec::new(),
            hasher: Fnv32::new(),
        }
    }

    /// Mixes the identifier of a replayed summary into the hash without
    /// extending the replayable sequence.
    pub fn append_summary(&mut self, summary_id: &str) {
        self.hasher.write(summary_id.as_bytes());
    }

    /// Appends an instruction decision, extending the replayable sequence
    /// and mixing the program counter's little-endian bytes into the hash.
    pub fn append_instruction(&mut self, pc: u64) {
        self.pcs.push(pc);
        self.hasher.write(&pc.to_le_bytes());
    }

    /// Gets the replayable sequence of program counters.
    #[must_use]
    pub fn pcs(&self) -> &[u64] {
        &self.pcs
    }

    /// Gets the hash identifying everything appended so far.
    #[must_use]
    pub fn hash(&self) -> u32 {
        self.hasher.sum()
    }

    /// Renders the hash as the prefix identifier reported to hosts.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{:x}", self.hash())
    }
}

impl Default for ExecPrefix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{ExecPrefix, Fnv32};

    #[test]
    fn matches_published_fnv1a_sums() {
        assert_eq!(Fnv32::new().sum(), 0x811c_9dc5);

        let mut hasher = Fnv32::new();
        hasher.write(b"a");
        assert_eq!(hasher.sum(), 0xe40c_292c);

        let mut hasher = Fnv32::new();
        hasher.write(b"foobar");
        assert_eq!(hasher.sum(), 0xbf9c_f968);
    }

    #[test]
    fn hashing_is_incremental() {
        let mut split = Fnv32::new();
        split.write(b"foo");
        split.write(b"bar");

        let mut whole = Fnv32::new();
        whole.write(b"foobar");

        assert_eq!(split.sum(), whole.sum());
    }

    #[test]
    fn instructions_extend_the_sequence_and_the_hash() {
        let mut prefix = ExecPrefix::new();
        let empty_hash = prefix.hash();

        prefix.append_instruction(7);
        assert_eq!(prefix.pcs(), &[7]);
        assert_ne!(prefix.hash(), empty_hash);
    }

    #[test]
    fn summaries_mix_without_extending_the_sequence() {
        let mut prefix = ExecPrefix::new();
        let empty_hash = prefix.hash();

        prefix.append_summary("summary-1");
        assert!(prefix.pcs().is_empty());
        assert_ne!(prefix.hash(), empty_hash);
    }

    #[test]
    fn identical_prefixes_have_identical_identifiers() {
        let mut left = ExecPrefix::new();
        let mut right = ExecPrefix::new();
        for pc in [0u64, 2, 4, 5] {
            left.append_instruction(pc);
            right.append_instruction(pc);
        }
        assert_eq!(left.id(), right.id());
    }

    #[test]
    fn program_counters_mix_little_endian() {
        let mut by_pc = ExecPrefix::new();
        by_pc.append_instruction(0x0102_0304);

        let mut by_bytes = Fnv32::new();
        by_bytes.write(&[0x04, 0x03, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00]);

        assert_eq!(by_pc.hash(), by_bytes.sum());
    }
}
