#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP layer for the x402 Bazaar engine.
//!
//! Two independent concerns live here:
//!
//! - [`discovery`] - fetching and validating the upstream registry snapshot
//! - [`executor`] - performing paid HTTP calls: issue the request, answer a
//!   402 Payment Required challenge with a single signed retry, and decode
//!   the settlement receipt
//!
//! Neither component retries beyond the protocol-mandated payment retry,
//! imposes timeouts, or caches anything; those policies belong to callers.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod constants;
pub mod discovery;
pub mod executor;

pub use discovery::{BazaarClient, DiscoveryError};
pub use executor::{ExecuteError, PaidRequest, PaidRequestExecutor};
