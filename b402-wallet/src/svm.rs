//! Solana signer family: SPL token transfer signing for x402 payments.
//!
//! Unlike the EVM family, paying on Solana requires RPC access: the mint
//! account determines the token program and decimals, recent prioritization
//! fees size the compute-unit price, and a simulation sizes the compute-unit
//! limit. The buyer partially signs the resulting transaction; the seller's
//! facilitator co-signs as fee payer and submits it.
//!
//! The transaction structure is:
//! - Index 0: `SetComputeUnitLimit`
//! - Index 1: `SetComputeUnitPrice`
//! - Index 2: `TransferChecked` (SPL Token or Token-2022)

use std::fmt;
use std::str::FromStr;

use b402::NetworkFamily;
use b402::network::normalize;
use b402::proto::{PaymentPayload, X402_VERSION};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;

use crate::error::SignerError;
use crate::signer::SelectedRequirement;

/// The associated token account program.
const ATA_PROGRAM_ID: Pubkey =
    solana_pubkey::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Provisional compute-unit limit used for the sizing simulation.
const SIMULATION_CU_LIMIT: u32 = 100_000;

/// A Solana cluster name paired with its default public RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolanaCluster {
    /// V1 network name (e.g., "solana-devnet").
    pub name: &'static str,
    /// Default JSON-RPC endpoint for the cluster.
    pub rpc_url: &'static str,
}

/// Well-known Solana clusters accepted by the Bazaar.
pub static SOLANA_CLUSTERS: &[SolanaCluster] = &[
    SolanaCluster {
        name: "solana",
        rpc_url: "https://api.mainnet-beta.solana.com",
    },
    SolanaCluster {
        name: "solana-devnet",
        rpc_url: "https://api.devnet.solana.com",
    },
];

/// Looks up the default RPC endpoint for a canonical cluster name.
#[must_use]
pub fn rpc_url_by_name(name: &str) -> Option<&'static str> {
    SOLANA_CLUSTERS
        .iter()
        .find(|cluster| cluster.name == name)
        .map(|cluster| cluster.rpc_url)
}

/// Scheme payload for a Solana "exact" payment: the partially signed
/// transaction, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64-encoded partially signed `VersionedTransaction`.
    pub transaction: String,
}

/// A payment signer for one Solana cluster.
pub struct SolanaSigner {
    network: String,
    keypair: solana_keypair::Keypair,
    rpc: RpcClient,
}

impl fmt::Debug for SolanaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaSigner")
            .field("network", &self.network)
            .field("address", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl SolanaSigner {
    /// Constructs a signer for `network` from a base58-encoded 64-byte
    /// keypair, optionally overriding the cluster's default RPC endpoint.
    ///
    /// No network traffic happens here; the RPC client connects lazily.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Construction`] when the cluster is unknown or
    /// the key material does not decode.
    pub fn from_base58(
        network: &str,
        private_key: &str,
        rpc_url: Option<&str>,
    ) -> Result<Self, SignerError> {
        let canonical = normalize(network);
        let construction_error = |reason: String| SignerError::Construction {
            family: NetworkFamily::Solana,
            network: network.to_owned(),
            reason,
        };

        let endpoint = match rpc_url {
            Some(url) => url.to_owned(),
            None => rpc_url_by_name(&canonical)
                .ok_or_else(|| construction_error("unknown Solana cluster name".to_owned()))?
                .to_owned(),
        };

        let bytes = bs58::decode(private_key.trim())
            .into_vec()
            .map_err(|e| construction_error(format!("private key is not base58: {e}")))?;
        let keypair = solana_keypair::Keypair::try_from(bytes.as_slice())
            .map_err(|e| construction_error(format!("invalid keypair bytes: {e}")))?;

        Ok(Self {
            network: canonical,
            keypair,
            rpc: RpcClient::new(endpoint),
        })
    }

    /// The canonical cluster name this signer pays on.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The signer's public key.
    #[must_use]
    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Builds and partially signs an SPL transfer for the selected
    /// requirement, wrapping it in a V1 payment payload.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signing`] when the requirement is missing the
    /// facilitator fee payer, addresses or the amount do not parse, or any
    /// RPC step fails.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "wallet.svm.sign", skip_all, fields(network = %self.network))
    )]
    pub async fn sign_requirement(
        &self,
        selected: &SelectedRequirement,
    ) -> Result<PaymentPayload<ExactSolanaPayload>, SignerError> {
        let fee_payer = selected
            .extra
            .as_ref()
            .and_then(|extra| extra.get("feePayer"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| SignerError::Signing("missing feePayer in requirement extra".into()))?;
        let fee_payer = Pubkey::from_str(fee_payer)
            .map_err(|e| SignerError::Signing(format!("invalid feePayer: {e}")))?;
        let pay_to = Pubkey::from_str(&selected.pay_to)
            .map_err(|e| SignerError::Signing(format!("invalid payTo address: {e}")))?;
        let mint = Pubkey::from_str(&selected.asset)
            .map_err(|e| SignerError::Signing(format!("invalid asset mint: {e}")))?;
        let amount: u64 = selected
            .max_amount_required
            .parse()
            .map_err(|e| SignerError::Signing(format!("invalid amount: {e}")))?;

        let transaction = self
            .build_transfer_transaction(&fee_payer, &pay_to, &mint, amount)
            .await?;

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            scheme: selected.scheme.clone(),
            network: selected.network.clone(),
            payload: ExactSolanaPayload { transaction },
        })
    }

    /// Builds, sizes, and partially signs the transfer transaction.
    /// Returns the base64-encoded wire bytes.
    async fn build_transfer_transaction(
        &self,
        fee_payer: &Pubkey,
        pay_to: &Pubkey,
        mint: &Pubkey,
        amount: u64,
    ) -> Result<String, SignerError> {
        let mint_info = self.fetch_mint(mint).await?;
        let token_program = mint_info.program.id();

        let source_ata = associated_token_address(&self.keypair.pubkey(), &token_program, mint);
        let destination_ata = associated_token_address(pay_to, &token_program, mint);

        let transfer = mint_info.program.transfer_checked(
            &source_ata,
            mint,
            &destination_ata,
            &self.keypair.pubkey(),
            amount,
            mint_info.decimals,
        )?;

        let recent_blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;

        let priority_fee = self
            .priority_fee_micro_lamports(&[*fee_payer, destination_ata, source_ata])
            .await?;
        let set_price = ComputeBudgetInstruction::set_compute_unit_price(priority_fee);

        let estimated_units = self
            .estimate_compute_units(fee_payer, &[set_price.clone(), transfer.clone()], recent_blockhash)
            .await?;

        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(estimated_units),
            set_price,
            transfer,
        ];
        let message = MessageV0::try_compile(fee_payer, &instructions, &[], recent_blockhash)
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;

        self.partially_sign(VersionedMessage::V0(message))
    }

    /// Resolves the token program and decimals of a mint account.
    async fn fetch_mint(&self, mint: &Pubkey) -> Result<MintInfo, SignerError> {
        let account = self
            .rpc
            .get_account(mint)
            .await
            .map_err(|e| SignerError::Signing(format!("failed to fetch mint {mint}: {e}")))?;

        if account.owner == spl_token::id() {
            let state = spl_token::state::Mint::unpack(&account.data)
                .map_err(|e| SignerError::Signing(format!("failed to unpack mint {mint}: {e}")))?;
            Ok(MintInfo {
                decimals: state.decimals,
                program: MintProgram::Token,
            })
        } else if account.owner == spl_token_2022::id() {
            let state = spl_token_2022::state::Mint::unpack(&account.data)
                .map_err(|e| SignerError::Signing(format!("failed to unpack mint {mint}: {e}")))?;
            Ok(MintInfo {
                decimals: state.decimals,
                program: MintProgram::Token2022,
            })
        } else {
            Err(SignerError::Signing(format!(
                "mint {mint} has an unknown owner program"
            )))
        }
    }

    /// Picks the lowest non-zero recent prioritization fee, in
    /// micro-lamports. Falls back to 1 when no fee data is available.
    async fn priority_fee_micro_lamports(
        &self,
        writable_accounts: &[Pubkey],
    ) -> Result<u64, SignerError> {
        let recent = self
            .rpc
            .get_recent_prioritization_fees(writable_accounts)
            .await
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;
        let fee = recent
            .iter()
            .map(|entry| entry.prioritization_fee)
            .filter(|fee| *fee > 0)
            .min()
            .unwrap_or(1);
        Ok(fee)
    }

    /// Estimates compute units by simulating the transaction with a
    /// provisional limit and no signatures.
    async fn estimate_compute_units(
        &self,
        fee_payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: Hash,
    ) -> Result<u32, SignerError> {
        let mut with_limit = Vec::with_capacity(instructions.len() + 1);
        with_limit.push(ComputeBudgetInstruction::set_compute_unit_limit(
            SIMULATION_CU_LIMIT,
        ));
        with_limit.extend_from_slice(instructions);

        let message = MessageV0::try_compile(fee_payer, &with_limit, &[], recent_blockhash)
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;
        let message = VersionedMessage::V0(message);
        let signature_slots = message.header().num_required_signatures as usize;
        let probe = VersionedTransaction {
            signatures: vec![Signature::default(); signature_slots],
            message,
        };

        let simulation = self
            .rpc
            .simulate_transaction_with_config(
                &probe,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    ..RpcSimulateTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;
        let units = simulation
            .value
            .units_consumed
            .ok_or_else(|| SignerError::Signing("simulation returned no units_consumed".into()))?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(units as u32)
    }

    /// Signs the message with the buyer's keypair, leaving the fee payer's
    /// signature slot empty for the facilitator to fill.
    fn partially_sign(&self, message: VersionedMessage) -> Result<String, SignerError> {
        let serialized = message.serialize();
        let signature_slots = message.header().num_required_signatures as usize;
        let position = message
            .static_account_keys()
            .iter()
            .take(signature_slots)
            .position(|key| *key == self.keypair.pubkey())
            .ok_or_else(|| {
                SignerError::Signing("buyer key is not a required transaction signer".into())
            })?;

        let mut signatures = vec![Signature::default(); signature_slots];
        signatures[position] = self.keypair.sign_message(&serialized);

        let transaction = VersionedTransaction {
            signatures,
            message,
        };
        let bytes = bincode::serialize(&transaction)
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;
        Ok(BASE64.encode(bytes))
    }
}

/// Which token program owns a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MintProgram {
    Token,
    Token2022,
}

impl MintProgram {
    fn id(self) -> Pubkey {
        match self {
            Self::Token => spl_token::id(),
            Self::Token2022 => spl_token_2022::id(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer_checked(
        self,
        source: &Pubkey,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        decimals: u8,
    ) -> Result<Instruction, SignerError> {
        match self {
            Self::Token => spl_token::instruction::transfer_checked(
                &self.id(),
                source,
                mint,
                destination,
                authority,
                &[],
                amount,
                decimals,
            )
            .map_err(|e| SignerError::Signing(format!("{e}"))),
            Self::Token2022 => spl_token_2022::instruction::transfer_checked(
                &self.id(),
                source,
                mint,
                destination,
                authority,
                &[],
                amount,
                decimals,
            )
            .map_err(|e| SignerError::Signing(format!("{e}"))),
        }
    }
}

/// Mint metadata needed to build a `TransferChecked` instruction.
#[derive(Debug, Clone, Copy)]
struct MintInfo {
    decimals: u8,
    program: MintProgram,
}

/// Derives the associated token account for `owner` holding `mint`.
fn associated_token_address(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (address, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    );
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        let keypair = solana_keypair::Keypair::new();
        bs58::encode(keypair.to_bytes()).into_string()
    }

    #[test]
    fn known_clusters_resolve_rpc_urls() {
        assert_eq!(
            rpc_url_by_name("solana"),
            Some("https://api.mainnet-beta.solana.com")
        );
        assert_eq!(
            rpc_url_by_name("solana-devnet"),
            Some("https://api.devnet.solana.com")
        );
        assert_eq!(rpc_url_by_name("solana-testnet-2"), None);
    }

    #[test]
    fn signer_round_trips_its_keypair() {
        let keypair = solana_keypair::Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let signer = SolanaSigner::from_base58("solana-devnet", &encoded, None).unwrap();
        assert_eq!(signer.address(), keypair.pubkey());
        assert_eq!(signer.network(), "solana-devnet");
    }

    #[test]
    fn unknown_cluster_fails_construction() {
        let err = SolanaSigner::from_base58("solana-betanet", &test_key(), None).unwrap_err();
        assert!(matches!(err, SignerError::Construction { .. }), "{err}");
    }

    #[test]
    fn rpc_override_admits_unknown_clusters() {
        let signer =
            SolanaSigner::from_base58("solana-betanet", &test_key(), Some("http://localhost:8899"));
        assert!(signer.is_ok());
    }

    #[test]
    fn invalid_key_fails_construction() {
        let err = SolanaSigner::from_base58("solana", "!!!", None).unwrap_err();
        assert!(matches!(err, SignerError::Construction { .. }), "{err}");

        let short = bs58::encode([1u8; 7]).into_string();
        let err = SolanaSigner::from_base58("solana", &short, None).unwrap_err();
        assert!(matches!(err, SignerError::Construction { .. }), "{err}");
    }

    #[test]
    fn payload_wire_format_is_camel_case() {
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: "exact".to_owned(),
            network: "solana-devnet".to_owned(),
            payload: ExactSolanaPayload {
                transaction: "AAEC".to_owned(),
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["x402Version"], serde_json::json!(1));
        assert_eq!(value["payload"]["transaction"], serde_json::json!("AAEC"));
    }
}
