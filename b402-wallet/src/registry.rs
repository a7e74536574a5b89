//! Lazy, process-lifetime caching of network signers.
//!
//! The registry is the engine's only shared mutable state. Signers are
//! keyed by the exact network identifier string; identical identifiers
//! funnel through one cache entry, and concurrent first-requests for the
//! same identifier share a single construction. Failed constructions are
//! not cached, so a later resolve retries.

use std::sync::Arc;

use b402::NetworkFamily;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::SignerError;
use crate::evm::EvmSigner;
use crate::signer::NetworkSigner;
use crate::svm::SolanaSigner;

/// Environment variable holding the EVM family's hex private key.
pub const EVM_PRIVATE_KEY_VAR: &str = "EVM_PRIVATE_KEY";

/// Environment variable holding the Solana family's base58 keypair.
pub const SVM_PRIVATE_KEY_VAR: &str = "SVM_PRIVATE_KEY";

/// The secret material backing the two signer families.
///
/// Read once at process start; absence of a secret only surfaces when a
/// network of that family is first requested.
#[derive(Debug, Clone, Default)]
pub struct SignerCredentials {
    /// 0x-prefixed hex secp256k1 private key for EVM networks.
    pub evm_private_key: Option<String>,
    /// Base58-encoded 64-byte ed25519 keypair for Solana clusters.
    pub svm_private_key: Option<String>,
}

impl SignerCredentials {
    /// Captures credentials from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            evm_private_key: std::env::var(EVM_PRIVATE_KEY_VAR).ok(),
            svm_private_key: std::env::var(SVM_PRIVATE_KEY_VAR).ok(),
        }
    }
}

/// Resolves and caches a signer per blockchain network identifier.
#[derive(Debug)]
pub struct SignerRegistry {
    credentials: SignerCredentials,
    solana_rpc_url: Option<String>,
    cache: DashMap<String, Arc<OnceCell<Arc<NetworkSigner>>>>,
}

impl SignerRegistry {
    /// Creates a registry backed by the given credentials.
    #[must_use]
    pub fn new(credentials: SignerCredentials) -> Self {
        Self {
            credentials,
            solana_rpc_url: None,
            cache: DashMap::new(),
        }
    }

    /// Creates a registry backed by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(SignerCredentials::from_env())
    }

    /// Overrides the default RPC endpoint for Solana clusters.
    #[must_use]
    pub fn with_solana_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.solana_rpc_url = Some(url.into());
        self
    }

    /// Resolves the signer for a network identifier, constructing it on
    /// first use.
    ///
    /// Resolutions for distinct identifiers proceed independently;
    /// concurrent first-requests for the same identifier await one shared
    /// construction and observe the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingCredential`] when the family's secret
    /// is not configured, or [`SignerError::Construction`] when the signer
    /// cannot be built. Neither outcome is cached.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "wallet.resolve", skip(self))
    )]
    pub async fn resolve(&self, network: &str) -> Result<Arc<NetworkSigner>, SignerError> {
        let cell = {
            let entry = self.cache.entry(network.to_owned()).or_default();
            Arc::clone(entry.value())
        };
        let signer = cell
            .get_or_try_init(|| async { self.construct(network).map(Arc::new) })
            .await?;
        Ok(Arc::clone(signer))
    }

    /// Builds a signer for the identifier's family.
    fn construct(&self, network: &str) -> Result<NetworkSigner, SignerError> {
        match NetworkFamily::classify(network) {
            NetworkFamily::Evm => {
                let key = self.credentials.evm_private_key.as_deref().ok_or_else(|| {
                    SignerError::MissingCredential {
                        family: NetworkFamily::Evm,
                        network: network.to_owned(),
                    }
                })?;
                EvmSigner::from_private_key(network, key).map(NetworkSigner::Evm)
            }
            NetworkFamily::Solana => {
                let key = self.credentials.svm_private_key.as_deref().ok_or_else(|| {
                    SignerError::MissingCredential {
                        family: NetworkFamily::Solana,
                        network: network.to_owned(),
                    }
                })?;
                SolanaSigner::from_base58(network, key, self.solana_rpc_url.as_deref())
                    .map(NetworkSigner::Solana)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_EVM_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn registry() -> SignerRegistry {
        SignerRegistry::new(SignerCredentials {
            evm_private_key: Some(TEST_EVM_KEY.to_owned()),
            svm_private_key: Some(
                bs58::encode(solana_keypair::Keypair::new().to_bytes()).into_string(),
            ),
        })
    }

    #[tokio::test]
    async fn identical_identifiers_share_one_instance() {
        let registry = registry();
        let first = registry.resolve("base").await.unwrap();
        let second = registry.resolve("base").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn distinct_identifiers_get_distinct_instances() {
        let registry = registry();
        let base = registry.resolve("base").await.unwrap();
        let sepolia = registry.resolve("base-sepolia").await.unwrap();
        assert!(!Arc::ptr_eq(&base, &sepolia));
        assert_eq!(base.network(), "base");
        assert_eq!(sepolia.network(), "base-sepolia");
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_construction() {
        let registry = registry();
        let (a, b) = tokio::join!(registry.resolve("base"), registry.resolve("base"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn families_route_to_their_own_credential() {
        let registry = registry();
        assert!(matches!(
            *registry.resolve("base").await.unwrap(),
            NetworkSigner::Evm(_)
        ));
        assert!(matches!(
            *registry.resolve("solana-devnet").await.unwrap(),
            NetworkSigner::Solana(_)
        ));
    }

    #[tokio::test]
    async fn missing_credentials_surface_lazily_per_family() {
        let registry = SignerRegistry::new(SignerCredentials::default());
        let err = registry.resolve("base").await.unwrap_err();
        assert!(matches!(
            err,
            SignerError::MissingCredential {
                family: NetworkFamily::Evm,
                ..
            }
        ));
        assert!(err.to_string().contains("EVM_PRIVATE_KEY"), "{err}");

        let err = registry.resolve("solana").await.unwrap_err();
        assert!(err.to_string().contains("SVM_PRIVATE_KEY"), "{err}");
    }

    #[tokio::test]
    async fn failed_constructions_are_not_cached() {
        let registry = SignerRegistry::new(SignerCredentials {
            evm_private_key: Some("0xnothex".to_owned()),
            svm_private_key: None,
        });
        assert!(registry.resolve("base").await.is_err());

        // The cache entry stays uninitialized, so a retry attempts a fresh
        // construction rather than replaying a cached failure.
        assert!(matches!(
            registry.resolve("base").await.unwrap_err(),
            SignerError::Construction { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_evm_network_is_a_construction_error() {
        let registry = registry();
        let err = registry.resolve("made-up-chain").await.unwrap_err();
        assert!(matches!(err, SignerError::Construction { .. }), "{err}");
    }
}
