//! This module contains versioning information for the Ethereum hardforks
//! whose instruction sets the analysis can work against.

/// The Ethereum hardforks for which an instruction table can be built.
///
/// Each version layers additional instructions on top of the previous one, in
/// the same fashion as the reference client's jump tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EthereumVersion {
    /// The original frontier release of ethereum.
    Frontier,

    /// The homestead fork, adding `DELEGATECALL`.
    Homestead,

    /// The byzantium fork, adding `STATICCALL`, `RETURNDATASIZE`,
    /// `RETURNDATACOPY` and `REVERT`.
    Byzantium,

    /// The constantinople fork, adding the shift opcodes, `EXTCODEHASH` and
    /// `CREATE2`.
    Constantinople,
}

impl EthereumVersion {
    /// Gets the latest version supported by the analysis.
    #[must_use]
    pub fn latest() -> Self {
        Self::Constantinople
    }
}

/// Hosts overwhelmingly analyze byzantium-era traces, so that is the default.
impl Default for EthereumVersion {
    fn default() -> Self {
        Self::Byzantium
    }
}

#[cfg(test)]
mod test {
    use super::EthereumVersion;

    #[test]
    fn defaults_to_byzantium() {
        assert_eq!(EthereumVersion::default(), EthereumVersion::Byzantium);
    }
}
