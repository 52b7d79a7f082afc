//! This module contains the abstract representation of a single 256-bit EVM
//! word.

use std::fmt::{Display, Formatter};

use ethnum::U256;

/// An abstractly interpreted EVM word.
///
/// A value is either [`Self::Known`], carrying the concrete word it is
/// guaranteed to be at runtime, or [`Self::Top`], about which nothing is
/// known. There is no bottom element at the value level; unreachable states
/// are expressed on whole machine states instead.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AbsValue {
    /// A value that is concretely known to be this word at runtime.
    Known(U256),

    /// A value about which nothing is known.
    Top,
}

impl AbsValue {
    /// Creates a known value representing zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::Known(U256::ZERO)
    }

    /// Creates a known value from anything convertible to a word.
    #[must_use]
    pub fn known(value: impl Into<U256>) -> Self {
        Self::Known(value.into())
    }

    /// Checks whether nothing is known about this value.
    #[must_use]
    pub fn is_top(self) -> bool {
        matches!(self, Self::Top)
    }

    /// Gets the concrete word for this value, if there is one.
    #[must_use]
    pub fn as_known(self) -> Option<U256> {
        match self {
            Self::Known(value) => Some(value),
            Self::Top => None,
        }
    }

    /// Combines this value with `other`.
    ///
    /// Equal known values are preserved; any disagreement loses all
    /// information.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        if self == other { self } else { Self::Top }
    }
}

/// Constructs a known value from a [`U256`].
impl From<U256> for AbsValue {
    fn from(value: U256) -> Self {
        Self::Known(value)
    }
}

/// Constructs a known value from a [`u64`].
impl From<u64> for AbsValue {
    fn from(value: u64) -> Self {
        Self::Known(U256::from(value as u128))
    }
}

/// Constructs a known boolean value, using the EVM encoding of booleans as
/// zero and one.
impl From<bool> for AbsValue {
    fn from(value: bool) -> Self {
        Self::Known(if value { U256::ONE } else { U256::ZERO })
    }
}

/// Pretty-prints the value, with known words as hexadecimal-encoded numbers.
impl Display for AbsValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(value) => {
                let str = hex::encode(value.to_be_bytes());
                let str = str.trim_start_matches('0');
                let str = if str.is_empty() { "0" } else { str };
                write!(f, "0x{str}")
            }
            Self::Top => write!(f, "top"),
        }
    }
}
