//! EVM signer family: ERC-3009 payment signing for EIP-155 chains.
//!
//! Payments on EVM networks are authorized offline: the signer produces an
//! EIP-712 signature over an ERC-3009 `TransferWithAuthorization` struct,
//! which the seller's facilitator later submits on-chain. No RPC provider
//! is needed on the buyer side.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use b402::NetworkFamily;
use b402::network::normalize;
use b402::proto::{PaymentPayload, X402_VERSION};
use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SignerError;
use crate::signer::SelectedRequirement;

/// Authorizations are backdated this many seconds so they are immediately
/// valid despite clock skew between buyer, seller, and facilitator.
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// Validity window applied when a requirement omits `maxTimeoutSeconds`.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// A V1 network name paired with its EIP-155 chain ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmNetwork {
    /// Human-readable network name (e.g., "base-sepolia").
    pub name: &'static str,
    /// Numeric EIP-155 chain ID.
    pub chain_id: u64,
}

/// Well-known EVM networks accepted by the Bazaar.
pub static EVM_NETWORKS: &[EvmNetwork] = &[
    EvmNetwork { name: "base", chain_id: 8453 },
    EvmNetwork { name: "base-sepolia", chain_id: 84532 },
    EvmNetwork { name: "ethereum", chain_id: 1 },
    EvmNetwork { name: "sepolia", chain_id: 11_155_111 },
    EvmNetwork { name: "polygon", chain_id: 137 },
    EvmNetwork { name: "polygon-amoy", chain_id: 80_002 },
    EvmNetwork { name: "avalanche", chain_id: 43_114 },
    EvmNetwork { name: "avalanche-fuji", chain_id: 43_113 },
    EvmNetwork { name: "celo", chain_id: 42_220 },
    EvmNetwork { name: "sei", chain_id: 1329 },
    EvmNetwork { name: "sei-testnet", chain_id: 1328 },
];

/// Looks up the EIP-155 chain ID for a canonical V1 network name.
#[must_use]
pub fn chain_id_by_name(name: &str) -> Option<u64> {
    EVM_NETWORKS
        .iter()
        .find(|network| network.name == name)
        .map(|network| network.chain_id)
}

/// A token amount in atomic units, serialized as a decimal string.
///
/// `JavaScript` consumers cannot represent `uint256` values as numbers, so
/// the x402 wire format carries amounts as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount(pub U256);

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s).map(Self)
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A Unix timestamp serialized as a stringified integer, used for the
/// `validAfter`/`validBefore` bounds of an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Creates a timestamp from raw seconds since the Unix epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let secs = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(Self(secs))
    }
}

sol!(
    /// EIP-712 struct for ERC-3009 `transferWithAuthorization`.
    ///
    /// Field names and order MUST match the token contract's typed-data
    /// definition, since the facilitator reconstructs this struct from the
    /// authorization to verify the signature.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// The structured authorization data that was signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient address.
    pub to: Address,
    /// The amount to transfer, in the token's smallest unit.
    pub value: TokenAmount,
    /// The authorization is not valid before this timestamp.
    pub valid_after: UnixTimestamp,
    /// The authorization expires at this timestamp.
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce preventing replay.
    pub nonce: B256,
}

/// Scheme payload for an EVM "exact" payment: the EIP-712 signature plus
/// the authorization it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// The 65-byte EOA signature.
    pub signature: Bytes,
    /// The authorization data that was signed.
    pub authorization: ExactEvmPayloadAuthorization,
}

/// A payment signer for one EVM network.
///
/// Holds the parsed private key and the chain ID used in the EIP-712
/// domain. Immutable once constructed.
pub struct EvmSigner {
    network: String,
    chain_id: u64,
    signer: PrivateKeySigner,
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("network", &self.network)
            .field("chain_id", &self.chain_id)
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl EvmSigner {
    /// Constructs a signer for `network` from a 0x-prefixed hex private key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Construction`] when the network name is not a
    /// known EVM network or the key material does not parse.
    pub fn from_private_key(network: &str, private_key: &str) -> Result<Self, SignerError> {
        let canonical = normalize(network);
        let chain_id = chain_id_by_name(&canonical).ok_or_else(|| SignerError::Construction {
            family: NetworkFamily::Evm,
            network: network.to_owned(),
            reason: "unknown EVM network name".to_owned(),
        })?;
        let signer =
            PrivateKeySigner::from_str(private_key.trim()).map_err(|e| SignerError::Construction {
                family: NetworkFamily::Evm,
                network: network.to_owned(),
                reason: format!("invalid private key: {e}"),
            })?;
        Ok(Self {
            network: canonical,
            chain_id,
            signer,
        })
    }

    /// The canonical network name this signer pays on.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The EIP-155 chain ID of the signer's network.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The signer's account address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs an ERC-3009 authorization for the selected requirement and
    /// wraps it in a V1 payment payload.
    ///
    /// The EIP-712 domain name/version come from the requirement's `extra`
    /// data; `validBefore` honors the requirement's timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signing`] when addresses or the amount do not
    /// parse, or when the key refuses to sign.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "wallet.evm.sign", skip_all, fields(network = %self.network))
    )]
    pub async fn sign_requirement(
        &self,
        selected: &SelectedRequirement,
    ) -> Result<PaymentPayload<ExactEvmPayload>, SignerError> {
        let (name, version) = eip712_domain_fields(selected.extra.as_ref());
        let asset: Address = selected
            .asset
            .parse()
            .map_err(|e| SignerError::Signing(format!("invalid asset address: {e}")))?;
        let pay_to: Address = selected
            .pay_to
            .parse()
            .map_err(|e| SignerError::Signing(format!("invalid payTo address: {e}")))?;
        let value: U256 = U256::from_str(&selected.max_amount_required)
            .map_err(|e| SignerError::Signing(format!("invalid amount: {e}")))?;

        let domain = eip712_domain! {
            name: name,
            version: version,
            chain_id: self.chain_id,
            verifying_contract: asset,
        };

        let now = UnixTimestamp::now();
        // Backdated so the payment is immediately valid despite clock skew.
        let valid_after = UnixTimestamp::from_secs(now.as_secs().saturating_sub(VALID_AFTER_SKEW_SECS));
        let valid_before = UnixTimestamp::from_secs(
            now.as_secs() + selected.max_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let nonce: [u8; 32] = rng().random();
        let nonce = FixedBytes(nonce);

        let authorization = ExactEvmPayloadAuthorization {
            from: self.signer.address(),
            to: pay_to,
            value: value.into(),
            valid_after,
            valid_before,
            nonce,
        };

        let transfer_with_authorization = TransferWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value.0,
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        };

        let eip712_hash = transfer_with_authorization.eip712_signing_hash(&domain);
        let signature = self
            .signer
            .sign_hash(&eip712_hash)
            .await
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            scheme: selected.scheme.clone(),
            network: selected.network.clone(),
            payload: ExactEvmPayload {
                signature: signature.as_bytes().into(),
                authorization,
            },
        })
    }
}

/// Extracts the EIP-712 domain name/version from a requirement's `extra`
/// data, defaulting to empty strings when absent.
fn eip712_domain_fields(extra: Option<&serde_json::Value>) -> (String, String) {
    let field = |key: &str| {
        extra
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned()
    };
    (field("name"), field("version"))
}
