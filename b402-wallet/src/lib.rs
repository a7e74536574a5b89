#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Network-scoped payment signers for the x402 Bazaar engine.
//!
//! This crate resolves blockchain network identifiers to signing credentials
//! able to authorize x402 payments. Two disjoint signer families exist,
//! distinguished by a network-name prefix and backed by distinct secret
//! material:
//!
//! - **EVM** - a secp256k1 private key signing ERC-3009
//!   `transferWithAuthorization` messages via EIP-712 typed data.
//! - **Solana** - an ed25519 keypair partially signing SPL token transfer
//!   transactions.
//!
//! [`SignerRegistry`] owns the signers: they are constructed lazily on
//! first use per network identifier, cached for the process lifetime, and
//! concurrent first-requests for the same identifier share a single
//! construction.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod error;
pub mod evm;
pub mod registry;
pub mod signer;
pub mod svm;

pub use error::SignerError;
pub use registry::{SignerCredentials, SignerRegistry};
pub use signer::NetworkSigner;
