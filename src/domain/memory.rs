//! This module contains the abstract representation of the EVM's transient
//! memory.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::{
    constant::{MAXIMUM_TRACKED_REGION_WORDS, WORD_SIZE_BYTES},
    domain::value::AbsValue,
};

/// The abstractly interpreted EVM memory.
///
/// Memory is tracked at word granularity: a sparse map from word-aligned byte
/// offsets to abstract values, together with the current size of the memory
/// in bytes. An offset that is absent from the map is concretely zero, which
/// matches the EVM's all-zero initial memory.
///
/// # Size
///
/// The size is always a multiple of the word size and only ever grows, in the
/// same way that a concrete EVM memory only ever expands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AbsMemory {
    /// A memory about which nothing is known.
    Top,

    /// A memory with a concretely known expansion, holding an abstract value
    /// per written word.
    Words {
        /// The written words, keyed by word-aligned byte offset. Words that
        /// are concretely zero are not stored.
        words: BTreeMap<u64, AbsValue>,

        /// The current size of the memory in bytes.
        size: u64,
    },
}

impl AbsMemory {
    /// Creates a new, empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::Words {
            words: BTreeMap::new(),
            size: 0,
        }
    }

    /// Creates a memory about which nothing is known.
    #[must_use]
    pub fn top() -> Self {
        Self::Top
    }

    /// Checks whether nothing is known about this memory.
    #[must_use]
    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }

    /// Gets the current size of the memory in bytes, or [`None`] if the
    /// memory shape is unknown.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Top => None,
            Self::Words { size, .. } => Some(*size),
        }
    }

    /// Expands the memory to at least `bytes` bytes.
    ///
    /// `bytes` must be a multiple of the word size; the interpreter only ever
    /// requests word-rounded sizes. Shrinking is not possible.
    pub fn resize(&mut self, bytes: u64) {
        if let Self::Words { size, .. } = self {
            *size = (*size).max(bytes);
        }
    }

    /// Loads the word at the provided byte `offset`.
    ///
    /// An aligned offset that has never been written reads as zero. Reads at
    /// unaligned offsets straddle two tracked words and yield an unknown
    /// value.
    #[must_use]
    pub fn read_word(&self, offset: u64) -> AbsValue {
        match self {
            Self::Top => AbsValue::Top,
            Self::Words { words, .. } => {
                if offset % WORD_SIZE_BYTES != 0 {
                    return AbsValue::Top;
                }
                words.get(&offset).copied().unwrap_or_else(AbsValue::zero)
            }
        }
    }

    /// Stores a word-sized `value` at the provided byte `offset`.
    ///
    /// An unaligned store invalidates both words it touches.
    pub fn write_word(&mut self, offset: u64, value: AbsValue) {
        let Self::Words { words, .. } = self else {
            return;
        };
        let aligned = offset - offset % WORD_SIZE_BYTES;
        if aligned == offset {
            Self::set_word(words, offset, value);
        } else {
            Self::set_word(words, aligned, AbsValue::Top);
            Self::set_word(words, aligned + WORD_SIZE_BYTES, AbsValue::Top);
        }
    }

    /// Stores the lowest byte of `value` at the provided byte `offset`.
    ///
    /// When the containing word and the stored value are both concretely
    /// known the byte is blended into the word; otherwise the containing word
    /// becomes unknown.
    pub fn write_byte(&mut self, offset: u64, value: AbsValue) {
        let Self::Words { words, .. } = self else {
            return;
        };
        let aligned = offset - offset % WORD_SIZE_BYTES;
        let containing = words.get(&aligned).copied().unwrap_or_else(AbsValue::zero);
        let blended = match (containing.as_known(), value.as_known()) {
            (Some(word), Some(byte)) => {
                let mut bytes = word.to_be_bytes();
                bytes[(offset % WORD_SIZE_BYTES) as usize] = byte.to_be_bytes()[31];
                AbsValue::Known(ethnum::U256::from_be_bytes(bytes))
            }
            _ => AbsValue::Top,
        };
        Self::set_word(words, aligned, blended);
    }

    /// Invalidates the region of `len` bytes starting at byte `offset`,
    /// marking every touched word as unknown.
    ///
    /// Regions spanning more than [`MAXIMUM_TRACKED_REGION_WORDS`] words are
    /// not walked individually; the whole memory becomes unknown instead.
    pub fn invalidate_region(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let Self::Words { words, .. } = self else {
            return;
        };
        let first = offset - offset % WORD_SIZE_BYTES;
        let last = (offset + len - 1) - (offset + len - 1) % WORD_SIZE_BYTES;
        if (last - first) / WORD_SIZE_BYTES >= MAXIMUM_TRACKED_REGION_WORDS {
            *self = Self::Top;
            return;
        }
        let mut aligned = first;
        while aligned <= last {
            Self::set_word(words, aligned, AbsValue::Top);
            aligned += WORD_SIZE_BYTES;
        }
    }

    /// Combines this memory with `other`, reporting whether the result
    /// differs from `self`.
    ///
    /// An unknown memory absorbs; otherwise offsets are merged with absent
    /// words treated as zero, and the size is the larger of the two sides.
    #[must_use]
    pub fn join(&self, other: &Self) -> (Self, bool) {
        let joined = match (self, other) {
            (
                Self::Words {
                    words: left,
                    size: left_size,
                },
                Self::Words {
                    words: right,
                    size: right_size,
                },
            ) => {
                let mut words = BTreeMap::new();
                for offset in left.keys().merge(right.keys()).dedup() {
                    let l = left.get(offset).copied().unwrap_or_else(AbsValue::zero);
                    let r = right.get(offset).copied().unwrap_or_else(AbsValue::zero);
                    Self::set_word(&mut words, *offset, l.join(r));
                }
                Self::Words {
                    words,
                    size: (*left_size).max(*right_size),
                }
            }
            _ => Self::Top,
        };
        let changed = &joined != self;
        (joined, changed)
    }

    /// Writes `value` at `offset` in `words`, maintaining the invariant that
    /// concretely zero words are not stored.
    fn set_word(words: &mut BTreeMap<u64, AbsValue>, offset: u64, value: AbsValue) {
        if value == AbsValue::zero() {
            words.remove(&offset);
        } else {
            words.insert(offset, value);
        }
    }
}

impl Default for AbsMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::domain::{memory::AbsMemory, value::AbsValue};

    #[test]
    fn can_construct_new_memory() {
        let memory = AbsMemory::new();
        assert_eq!(memory.size(), Some(0));
        assert!(!memory.is_top());
    }

    #[test]
    fn unwritten_words_read_as_zero() {
        let memory = AbsMemory::new();
        assert_eq!(memory.read_word(0), AbsValue::zero());
        assert_eq!(memory.read_word(64), AbsValue::zero());
    }

    #[test]
    fn can_write_and_read_aligned_words() {
        let mut memory = AbsMemory::new();
        memory.write_word(32, AbsValue::known(0xdeadu64));
        assert_eq!(memory.read_word(32), AbsValue::known(0xdeadu64));
        assert_eq!(memory.read_word(0), AbsValue::zero());
    }

    #[test]
    fn unaligned_writes_invalidate_both_words() {
        let mut memory = AbsMemory::new();
        memory.write_word(0, AbsValue::known(1u64));
        memory.write_word(32, AbsValue::known(2u64));
        memory.write_word(16, AbsValue::known(3u64));
        assert_eq!(memory.read_word(0), AbsValue::Top);
        assert_eq!(memory.read_word(32), AbsValue::Top);
    }

    #[test]
    fn unaligned_reads_are_unknown() {
        let mut memory = AbsMemory::new();
        memory.write_word(0, AbsValue::known(1u64));
        assert_eq!(memory.read_word(4), AbsValue::Top);
    }

    #[test]
    fn byte_writes_blend_into_known_words() {
        let mut memory = AbsMemory::new();
        memory.write_word(0, AbsValue::known(0xff00u64));
        memory.write_byte(31, AbsValue::known(0xabu64));
        assert_eq!(memory.read_word(0), AbsValue::known(0xffabu64));
    }

    #[test]
    fn byte_writes_blend_into_zero_words() {
        let mut memory = AbsMemory::new();
        memory.write_byte(0, AbsValue::known(0x12u64));
        let expected = U256::from(0x12u128) << 248u32;
        assert_eq!(memory.read_word(0), AbsValue::Known(expected));
    }

    #[test]
    fn byte_writes_of_unknown_values_invalidate_the_word() {
        let mut memory = AbsMemory::new();
        memory.write_word(0, AbsValue::known(1u64));
        memory.write_byte(5, AbsValue::Top);
        assert_eq!(memory.read_word(0), AbsValue::Top);
    }

    #[test]
    fn resize_is_monotone() {
        let mut memory = AbsMemory::new();
        memory.resize(64);
        assert_eq!(memory.size(), Some(64));
        memory.resize(32);
        assert_eq!(memory.size(), Some(64));
    }

    #[test]
    fn reads_do_not_widen_the_size() {
        let memory = AbsMemory::new();
        let _ = memory.read_word(1024);
        assert_eq!(memory.size(), Some(0));
    }

    #[test]
    fn can_invalidate_written_regions() {
        let mut memory = AbsMemory::new();
        memory.write_word(0, AbsValue::known(1u64));
        memory.write_word(64, AbsValue::known(2u64));
        memory.invalidate_region(0, 33);
        assert_eq!(memory.read_word(0), AbsValue::Top);
        assert_eq!(memory.read_word(32), AbsValue::Top);
        assert_eq!(memory.read_word(64), AbsValue::known(2u64));
    }

    #[test]
    fn huge_regions_widen_the_whole_memory() {
        let mut memory = AbsMemory::new();
        memory.invalidate_region(0, 1 << 32);
        assert!(memory.is_top());
    }

    #[test]
    fn join_merges_offsets_pointwise() {
        let mut left = AbsMemory::new();
        left.write_word(0, AbsValue::known(1u64));
        left.write_word(32, AbsValue::known(2u64));
        left.resize(64);

        let mut right = AbsMemory::new();
        right.write_word(0, AbsValue::known(1u64));
        right.resize(96);

        let (joined, changed) = left.join(&right);
        assert!(changed);
        assert_eq!(joined.read_word(0), AbsValue::known(1u64));
        assert_eq!(joined.read_word(32), AbsValue::Top);
        assert_eq!(joined.size(), Some(96));
    }

    #[test]
    fn join_treats_absent_words_as_zero() {
        let mut left = AbsMemory::new();
        left.write_word(0, AbsValue::zero());
        let right = AbsMemory::new();

        let (joined, changed) = left.join(&right);
        assert!(!changed);
        assert_eq!(joined, AbsMemory::new());
    }

    #[test]
    fn top_absorbs_in_joins() {
        let mut concrete = AbsMemory::new();
        concrete.write_word(0, AbsValue::known(1u64));

        let (joined, changed) = AbsMemory::top().join(&concrete);
        assert!(!changed);
        assert!(joined.is_top());

        let (joined, changed) = concrete.join(&AbsMemory::top());
        assert!(changed);
        assert!(joined.is_top());
    }
}
