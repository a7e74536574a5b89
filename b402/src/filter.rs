//! Filtering and summarization of Bazaar discovery snapshots.
//!
//! A listing matches when at least one of its payment requirements satisfies
//! every supplied filter simultaneously. Requirements that do not declare a
//! field a filter targets are treated as wildcards, not mismatches; the
//! one exception being the token asset, which every requirement carries.
//! Listings with no payment requirements at all never match.
//!
//! Matching preserves snapshot order; no re-sorting happens here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::proto::{DiscoveryResource, DiscoveryResponse, PaymentRequirements};

/// Cap applied to the returned set when no explicit limit is supplied.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Atomic units per displayed token unit assumed by [`price_approximation`].
const ASSUMED_ATOMIC_SCALE: u32 = 6;

/// Optional filters applied when listing Bazaar services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilters {
    /// Keep only listings payable on this network name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Keep only listings accepting exactly this token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Keep only listings whose declared price does not exceed this many
    /// atomic units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_atomic_price: Option<u64>,
    /// Truncate the matched set to the first N entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Flat projection of a listing, keyed off its primary payment requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    /// The resource URL.
    pub resource: String,
    /// Resource type, if declared.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Network of the primary requirement.
    pub network: Option<String>,
    /// Asset of the primary requirement.
    pub asset: Option<String>,
    /// Atomic price ceiling of the primary requirement.
    pub max_amount_required: Option<String>,
    /// Display-only price approximation; see [`price_approximation`].
    pub price_approx: Option<Decimal>,
    /// Description of the primary requirement.
    pub description: Option<String>,
    /// Recipient address of the primary requirement.
    pub pay_to: Option<String>,
    /// Last registry update timestamp.
    pub last_updated: Option<String>,
    /// Protocol version advertised by the listing.
    pub x402_version: Option<u32>,
}

/// Result of filtering a snapshot: summaries plus the accounting the
/// caller's result contract requires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOutcome {
    /// How many listings the snapshot contained.
    pub total_discovered: usize,
    /// How many listings matched the filters, before the limit.
    pub matched: usize,
    /// How many listings are returned, after the limit.
    pub returned: usize,
    /// Summaries of the returned listings, in snapshot order.
    pub items: Vec<ServiceSummary>,
}

/// Applies `filters` to a snapshot and summarizes the surviving listings.
///
/// The returned set is truncated to `filters.limit`, defaulting to
/// [`DEFAULT_LIST_LIMIT`].
#[must_use]
pub fn filter_and_summarize(snapshot: &DiscoveryResponse, filters: &ListFilters) -> ListOutcome {
    let matched: Vec<&DiscoveryResource> = snapshot
        .items
        .iter()
        .filter(|item| listing_matches(item, filters))
        .collect();

    let limit = filters.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let items: Vec<ServiceSummary> = matched.iter().take(limit).map(|item| summarize(item)).collect();

    ListOutcome {
        total_discovered: snapshot.items.len(),
        matched: matched.len(),
        returned: items.len(),
        items,
    }
}

/// Returns whether a listing matches the supplied filters.
///
/// A listing with an empty `accepts` list never matches: without a payment
/// requirement there is nothing to evaluate the filters against.
#[must_use]
pub fn listing_matches(item: &DiscoveryResource, filters: &ListFilters) -> bool {
    if item.accepts.is_empty() {
        return false;
    }
    item.accepts
        .iter()
        .any(|requirement| requirement_matches(requirement, filters))
}

fn requirement_matches(requirement: &PaymentRequirements, filters: &ListFilters) -> bool {
    if let (Some(wanted), Some(network)) =
        (filters.network.as_deref(), requirement.network.as_deref())
        && wanted != network
    {
        return false;
    }

    if let Some(wanted) = filters.asset.as_deref()
        && requirement.asset != wanted
    {
        return false;
    }

    if let (Some(ceiling), Some(amount)) = (
        filters.max_atomic_price,
        requirement.max_amount_required.as_deref(),
    ) {
        // Unparseable amounts never exclude a listing; this mirrors the
        // registry's observed leniency.
        if let Ok(price) = amount.parse::<f64>()
            && price > ceiling as f64
        {
            return false;
        }
    }

    true
}

/// Derives the flat summary of a listing from its first payment requirement.
#[must_use]
pub fn summarize(item: &DiscoveryResource) -> ServiceSummary {
    let primary = item.accepts.first();
    let max_amount_required = primary.and_then(|r| r.max_amount_required.clone());
    let price_approx = max_amount_required
        .as_deref()
        .and_then(price_approximation);

    ServiceSummary {
        resource: item.resource.clone(),
        kind: item.kind.clone(),
        network: primary.and_then(|r| r.network.clone()),
        asset: primary.map(|r| r.asset.clone()),
        max_amount_required,
        price_approx,
        description: primary.and_then(|r| r.description.clone()),
        pay_to: primary.and_then(|r| r.pay_to.clone()),
        last_updated: item.last_updated.clone(),
        x402_version: item.x402_version,
    }
}

/// Best-effort human price for an atomic amount, assuming 6 fractional
/// digits.
///
/// Asset decimal precision is not available from the registry, so this is a
/// display aid only, never to be used for a financial comparison.
#[must_use]
pub fn price_approximation(atomic: &str) -> Option<Decimal> {
    let amount: Decimal = atomic.trim().parse().ok()?;
    let mut approx = amount / Decimal::from(10u64.pow(ASSUMED_ATOMIC_SCALE));
    approx.rescale(ASSUMED_ATOMIC_SCALE);
    Some(approx)
}
