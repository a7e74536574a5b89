//! Error types for signer resolution and payment signing.

use b402::NetworkFamily;

use crate::registry::{EVM_PRIVATE_KEY_VAR, SVM_PRIVATE_KEY_VAR};

/// Errors that can occur while resolving a signer or signing a payment.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SignerError {
    /// The secret material for the requested family is not configured.
    #[error(
        "{} network requested ({network}) but {} is not configured",
        family_label(*family),
        credential_var(*family)
    )]
    MissingCredential {
        /// The family whose credential is absent.
        family: NetworkFamily,
        /// The network identifier that was requested.
        network: String,
    },

    /// Constructing the signer failed (bad key material, unknown network).
    /// Construction failures are not cached; a later resolve retries.
    #[error("failed to construct {} signer for {network}: {reason}", family_label(*family))]
    Construction {
        /// The family the signer belongs to.
        family: NetworkFamily,
        /// The network identifier that was requested.
        network: String,
        /// What went wrong.
        reason: String,
    },

    /// The challenge advertises a protocol version this signer cannot pay.
    #[error("unsupported payment challenge version {version}")]
    UnsupportedChallenge {
        /// The version the challenge declared.
        version: u32,
    },

    /// None of the challenge's accepted payment methods is payable by the
    /// resolved signer.
    #[error("no payable requirement matched network {network}")]
    NoMatchingRequirement {
        /// The network the signer was resolved for.
        network: String,
    },

    /// Building or signing the payment payload failed.
    #[error("failed to sign payment: {0}")]
    Signing(String),

    /// The signed payload could not be serialized for the payment header.
    #[error("failed to encode payment header: {0}")]
    Encode(#[from] serde_json::Error),
}

const fn family_label(family: NetworkFamily) -> &'static str {
    match family {
        NetworkFamily::Evm => "EVM",
        NetworkFamily::Solana => "SVM",
    }
}

const fn credential_var(family: NetworkFamily) -> &'static str {
    match family {
        NetworkFamily::Evm => EVM_PRIVATE_KEY_VAR,
        NetworkFamily::Solana => SVM_PRIVATE_KEY_VAR,
    }
}
