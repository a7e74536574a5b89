#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 Bazaar.
//!
//! This crate provides the foundational types for discovering machine-payable
//! HTTP services published to the Bazaar registry and for deciding which of
//! them a buyer can use. It is transport- and chain-agnostic: HTTP access
//! lives in `b402-http`, payment signing in `b402-wallet`.
//!
//! # Overview
//!
//! The Bazaar is a catalog of resources that charge for access via the x402
//! protocol (HTTP 402 Payment Required). Each listing carries one or more
//! payment requirements: the networks, assets, and price ceilings a seller
//! accepts. This crate models those documents, classifies network
//! identifiers into signer families, and filters/summarizes discovery
//! snapshots for presentation to an agent runtime.
//!
//! # Modules
//!
//! - [`filter`] - Snapshot filtering and compact per-listing summaries
//! - [`network`] - Blockchain network family classification
//! - [`proto`] - Wire format types for discovery documents and 402 payment flows

pub mod filter;
pub mod network;
pub mod proto;

pub use network::NetworkFamily;
