//! The network-scoped signer resolved per payment and the logic that picks
//! which challenge requirement it pays.

use b402::NetworkFamily;
use b402::network::normalize;
use b402::proto::{PaymentRequired, PaymentRequirements, X402_VERSION};

use crate::error::SignerError;
use crate::evm::EvmSigner;
use crate::svm::SolanaSigner;

/// The canonical x402 payment scheme this engine can sign.
pub const EXACT_SCHEME: &str = "exact";

/// A payment signer resolved for one network identifier.
///
/// Owned by the [`SignerRegistry`](crate::registry::SignerRegistry); never
/// mutated after construction and reused for the process lifetime.
#[derive(Debug)]
pub enum NetworkSigner {
    /// An EIP-155 signer.
    Evm(EvmSigner),
    /// A Solana signer.
    Solana(SolanaSigner),
}

impl NetworkSigner {
    /// The family this signer belongs to.
    #[must_use]
    pub const fn family(&self) -> NetworkFamily {
        match self {
            Self::Evm(_) => NetworkFamily::Evm,
            Self::Solana(_) => NetworkFamily::Solana,
        }
    }

    /// The canonical network name this signer was resolved for.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::Evm(signer) => signer.network(),
            Self::Solana(signer) => signer.network(),
        }
    }

    /// The signer's payment address, rendered for display.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Evm(signer) => signer.address().to_string(),
            Self::Solana(signer) => signer.address().to_string(),
        }
    }

    /// Produces the `X-PAYMENT` header value answering a 402 challenge.
    ///
    /// Picks the first challenge requirement this signer can pay (exact
    /// scheme on the signer's own network), signs it, and base64-encodes
    /// the resulting payment payload.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::UnsupportedChallenge`] for non-V1 challenges,
    /// [`SignerError::NoMatchingRequirement`] when nothing is payable, and
    /// signing errors from the underlying family.
    pub async fn payment_header(&self, challenge: &PaymentRequired) -> Result<String, SignerError> {
        let selected = self.select_requirement(challenge)?;
        let header = match self {
            Self::Evm(signer) => signer
                .sign_requirement(&selected)
                .await?
                .to_header_value()?,
            Self::Solana(signer) => signer
                .sign_requirement(&selected)
                .await?
                .to_header_value()?,
        };
        Ok(header)
    }

    /// Selects the first payable requirement from a challenge.
    ///
    /// Requirements are considered in the seller's priority order. A
    /// requirement is payable when it uses the exact scheme, names the
    /// signer's network, and carries the fields a payment needs. Paying a
    /// different network than the signer was resolved for is never
    /// attempted: the signature's domain would not match.
    fn select_requirement(
        &self,
        challenge: &PaymentRequired,
    ) -> Result<SelectedRequirement, SignerError> {
        if challenge.x402_version != X402_VERSION {
            return Err(SignerError::UnsupportedChallenge {
                version: challenge.x402_version,
            });
        }

        challenge
            .accepts
            .iter()
            .filter(|requirement| requirement.scheme.as_deref() == Some(EXACT_SCHEME))
            .filter(|requirement| {
                requirement
                    .network
                    .as_deref()
                    .is_some_and(|network| normalize(network) == self.network())
            })
            .find_map(SelectedRequirement::from_requirements)
            .ok_or_else(|| SignerError::NoMatchingRequirement {
                network: self.network().to_owned(),
            })
    }
}

/// A challenge requirement validated to carry everything a payment needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRequirement {
    /// The payment scheme (always the exact scheme today).
    pub scheme: String,
    /// The network name the payment settles on, as the seller wrote it.
    pub network: String,
    /// The token identifier.
    pub asset: String,
    /// The recipient address.
    pub pay_to: String,
    /// The amount to authorize, in atomic units.
    pub max_amount_required: String,
    /// Authorization validity window in seconds.
    pub max_timeout_seconds: Option<u64>,
    /// Scheme-specific extra data.
    pub extra: Option<serde_json::Value>,
}

impl SelectedRequirement {
    /// Validates a wire requirement into a payable one. Returns `None` when
    /// a field a payment needs is absent.
    #[must_use]
    pub fn from_requirements(requirement: &PaymentRequirements) -> Option<Self> {
        Some(Self {
            scheme: requirement.scheme.clone()?,
            network: requirement.network.clone()?,
            asset: requirement.asset.clone(),
            pay_to: requirement.pay_to.clone()?,
            max_amount_required: requirement.max_amount_required.clone()?,
            max_timeout_seconds: requirement.max_timeout_seconds,
            extra: requirement.extra.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde_json::json;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn evm_signer(network: &str) -> NetworkSigner {
        NetworkSigner::Evm(EvmSigner::from_private_key(network, TEST_KEY).unwrap())
    }

    fn challenge(accepts: serde_json::Value) -> PaymentRequired {
        serde_json::from_value(json!({
            "x402Version": 1,
            "accepts": accepts,
            "error": "X-PAYMENT header is required"
        }))
        .unwrap()
    }

    fn payable(network: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": network,
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxAmountRequired": "10000",
            "maxTimeoutSeconds": 60,
            "extra": {"name": "USDC", "version": "2"}
        })
    }

    #[tokio::test]
    async fn picks_the_requirement_for_its_own_network() {
        let signer = evm_signer("base-sepolia");
        let challenge = challenge(json!([payable("solana-devnet"), payable("base-sepolia")]));
        let header = signer.payment_header(&challenge).await.unwrap();

        let decoded: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(header).unwrap()).unwrap();
        assert_eq!(decoded["network"], json!("base-sepolia"));
        assert_eq!(decoded["scheme"], json!("exact"));
    }

    #[tokio::test]
    async fn never_pays_a_different_network_than_it_was_resolved_for() {
        let signer = evm_signer("base");
        let challenge = challenge(json!([payable("base-sepolia")]));
        let err = signer.payment_header(&challenge).await.unwrap_err();
        assert!(matches!(err, SignerError::NoMatchingRequirement { .. }), "{err}");
    }

    #[tokio::test]
    async fn rejects_challenges_with_nothing_payable() {
        let signer = evm_signer("base");
        let challenge = challenge(json!([payable("solana-devnet")]));
        let err = signer.payment_header(&challenge).await.unwrap_err();
        assert!(matches!(err, SignerError::NoMatchingRequirement { .. }), "{err}");
    }

    #[tokio::test]
    async fn network_comparison_is_normalized() {
        let signer = evm_signer("base-sepolia");
        let challenge = challenge(json!([payable("Base-Sepolia")]));
        assert!(signer.payment_header(&challenge).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_non_v1_challenges() {
        let signer = evm_signer("base");
        let challenge: PaymentRequired =
            serde_json::from_value(json!({"x402Version": 2, "accepts": []})).unwrap();
        let err = signer.payment_header(&challenge).await.unwrap_err();
        assert!(matches!(err, SignerError::UnsupportedChallenge { version: 2 }), "{err}");
    }

    #[test]
    fn incomplete_requirements_are_not_payable() {
        let missing_pay_to: PaymentRequirements = serde_json::from_value(json!({
            "scheme": "exact",
            "network": "base",
            "asset": "0xUSDC",
            "maxAmountRequired": "1"
        }))
        .unwrap();
        assert!(SelectedRequirement::from_requirements(&missing_pay_to).is_none());
    }
}
