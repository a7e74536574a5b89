//! Blockchain network family classification.
//!
//! The Bazaar identifies networks by V1 human-readable names (`"base"`,
//! `"base-sepolia"`, `"solana-devnet"`, ...). Payment signing only needs to
//! know which *family* of signer a name belongs to: Solana-style names are
//! backed by an ed25519 keypair, everything else by an EVM secp256k1 key.
//!
//! Classification is a pure, total function: any identifier maps to exactly
//! one family and there is no error path. Downstream code matches on
//! [`NetworkFamily`] instead of re-inspecting strings.

use std::fmt;

/// Name prefix that selects the Solana signer family.
pub const SOLANA_FAMILY_PREFIX: &str = "solana";

/// The signer family a network identifier belongs to.
///
/// Exactly two families exist, each backed by distinct secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkFamily {
    /// EIP-155 chains (Base, Polygon, Avalanche, ...), signed with a
    /// secp256k1 private key.
    Evm,
    /// Solana clusters, signed with an ed25519 keypair.
    Solana,
}

impl NetworkFamily {
    /// Classifies a network identifier into its signer family.
    ///
    /// Leading/trailing whitespace is ignored and matching is
    /// case-insensitive. Identifiers starting with
    /// [`SOLANA_FAMILY_PREFIX`] select [`NetworkFamily::Solana`]; all
    /// others default to [`NetworkFamily::Evm`].
    #[must_use]
    pub fn classify(network: &str) -> Self {
        if normalize(network).starts_with(SOLANA_FAMILY_PREFIX) {
            Self::Solana
        } else {
            Self::Evm
        }
    }

    /// Returns the conventional short name of this family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Solana => "svm",
        }
    }
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the canonical form of a network identifier: trimmed and
/// lowercased. Table lookups and family checks operate on this form.
#[must_use]
pub fn normalize(network: &str) -> String {
    network.trim().to_ascii_lowercase()
}
