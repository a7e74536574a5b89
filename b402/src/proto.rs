//! Wire format types for Bazaar discovery documents and x402 payment flows.
//!
//! The Bazaar speaks x402 protocol version 1: network names instead of
//! CAIP-2 chain IDs, a JSON 402 response body listing acceptable payments,
//! and base64-encoded JSON headers for the payment proof and the settlement
//! receipt.
//!
//! Validation is strict on required fields and permissive on unknown ones:
//! a listing without `resource` or `accepts` is rejected, while fields this
//! crate does not know about are captured in flattened `rest` maps and
//! survive a serialize round-trip untouched.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The x402 protocol version this engine speaks.
pub const X402_VERSION: u32 = 1;

/// Open-ended JSON object for metadata and unknown-field capture.
pub type ExtraMap = Map<String, Value>;

/// One accepted payment option for a listing.
///
/// The Bazaar publishes these with most fields optional; only the token
/// identifier is guaranteed. The same shape appears inside HTTP 402
/// challenge bodies, where sellers in practice populate everything needed
/// to pay (`network`, `payTo`, `maxAmountRequired`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (e.g., "exact").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// The network name (e.g., "base", "solana-devnet").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// The token identifier (contract address or mint).
    pub asset: String,
    /// The recipient address for payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_to: Option<String>,
    /// Price ceiling as a decimal string in the asset's atomic unit.
    /// Absence means unconstrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount_required: Option<String>,
    /// Maximum payment authorization validity window in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// MIME type of the resource output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Human-readable description of the resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The resource URL this requirement applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Scheme-specific extra data (EIP-712 domain, fee payer, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Declared input/output shape of the resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

/// Input/output shape descriptor attached to a payment requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    /// Shape of the request the resource expects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Shape of the response the resource produces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

/// One discoverable resource in the Bazaar.
///
/// `resource` is the unique key within a snapshot. `accepts` is ordered by
/// priority: the first requirement is the listing's primary payment option
/// and drives summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResource {
    /// Registry-assigned identifier, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The resource URL. Required and unique within a snapshot.
    pub resource: String,
    /// Resource type (e.g., "http").
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Timestamp string of the last registry update for this listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Accepted payment options, in priority order. Required; may be empty.
    pub accepts: Vec<PaymentRequirements>,
    /// Open metadata published by the seller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtraMap>,
    /// Protocol version advertised by the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x402_version: Option<u32>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

/// Pagination block of a discovery response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Maximum number of results in this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Number of results skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Total number of results known to the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

/// A full snapshot of the Bazaar registry.
///
/// Snapshots are immutable: every discovery call produces a wholly new one
/// and nothing is merged incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    /// The discovered listings.
    pub items: Vec<DiscoveryResource>,
    /// Pagination info, when the registry paginates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// Opaque continuation cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Protocol version advertised by the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x402_version: Option<u32>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

/// HTTP 402 Payment Required response body.
///
/// Returned by a target resource to signal that payment must be attached.
/// Contains the list of acceptable payment methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version of the challenge.
    pub x402_version: u32,
    /// Acceptable payment methods, in the seller's priority order.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional error message describing why the previous attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A signed payment authorization from the buyer.
///
/// Serialized to JSON, base64-encoded, and attached to the retried request
/// as the `X-PAYMENT` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TPayload = Value> {
    /// Protocol version (always 1).
    pub x402_version: u32,
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The network name the payment settles on.
    pub network: String,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
}

impl<TPayload: Serialize> PaymentPayload<TPayload> {
    /// Encodes this payload as base64(JSON) for the `X-PAYMENT` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }
}

/// Structured proof of a settled payment.
///
/// Decoded from the base64(JSON) `X-PAYMENT-RESPONSE` header a target may
/// include after a paid call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Whether settlement succeeded.
    #[serde(default)]
    pub success: bool,
    /// On-chain transaction hash or signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// The network where settlement occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// The address that paid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Machine-readable reason when settlement failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Unknown fields preserved from the wire.
    #[serde(flatten)]
    pub rest: ExtraMap,
}

impl PaymentReceipt {
    /// Decodes a receipt from an `X-PAYMENT-RESPONSE` header value.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptDecodeError`] if the value is not base64 or the
    /// decoded bytes are not a valid receipt document.
    pub fn from_header_value(value: &str) -> Result<Self, ReceiptDecodeError> {
        let bytes = BASE64.decode(value.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Errors decoding a payment receipt header.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReceiptDecodeError {
    /// The header value is not valid base64.
    #[error("receipt header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not a valid receipt document.
    #[error("receipt header is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> Value {
        json!({
            "x402Version": 1,
            "items": [{
                "resource": "https://api.example.com/weather",
                "type": "http",
                "lastUpdated": "2026-01-15T10:00:00Z",
                "accepts": [{
                    "scheme": "exact",
                    "network": "base",
                    "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                    "payTo": "0x0000000000000000000000000000000000000001",
                    "maxAmountRequired": "1000000",
                    "maxTimeoutSeconds": 60,
                    "futureField": {"nested": true}
                }],
                "metadata": {"category": "weather"},
                "experimental": "kept"
            }],
            "pagination": {"limit": 100, "offset": 0, "total": 1},
            "registryHint": "kept-too"
        })
    }

    #[test]
    fn snapshot_parses_and_preserves_unknown_fields() {
        let snapshot: DiscoveryResponse = serde_json::from_value(sample_snapshot()).unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.rest["registryHint"], json!("kept-too"));

        let item = &snapshot.items[0];
        assert_eq!(item.resource, "https://api.example.com/weather");
        assert_eq!(item.rest["experimental"], json!("kept"));
        assert_eq!(
            item.accepts[0].rest["futureField"],
            json!({"nested": true})
        );

        // Unknown fields survive a round-trip.
        let round = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(round["registryHint"], json!("kept-too"));
        assert_eq!(round["items"][0]["experimental"], json!("kept"));
    }

    #[test]
    fn missing_resource_is_rejected() {
        let payload = json!({
            "items": [{"accepts": []}]
        });
        let err = serde_json::from_value::<DiscoveryResponse>(payload).unwrap_err();
        assert!(err.to_string().contains("resource"), "{err}");
    }

    #[test]
    fn missing_accepts_is_rejected() {
        let payload = json!({
            "items": [{"resource": "https://api.example.com/x"}]
        });
        assert!(serde_json::from_value::<DiscoveryResponse>(payload).is_err());
    }

    #[test]
    fn requirement_requires_asset() {
        let payload = json!({"network": "base"});
        assert!(serde_json::from_value::<PaymentRequirements>(payload).is_err());
    }

    #[test]
    fn challenge_body_parses_with_defaulted_accepts() {
        let body = json!({"x402Version": 1, "error": "payment required"});
        let challenge: PaymentRequired = serde_json::from_value(body).unwrap();
        assert_eq!(challenge.x402_version, 1);
        assert!(challenge.accepts.is_empty());
    }

    #[test]
    fn payment_payload_header_round_trips() {
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: "exact".into(),
            network: "base-sepolia".into(),
            payload: json!({"transaction": "AAEC"}),
        };
        let header = payload.to_header_value().unwrap();
        let bytes = BASE64.decode(header).unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["x402Version"], json!(1));
        assert_eq!(decoded["network"], json!("base-sepolia"));
    }

    #[test]
    fn receipt_decodes_from_header_value() {
        let receipt = json!({
            "success": true,
            "transaction": "0xabc",
            "network": "base",
            "payer": "0x0000000000000000000000000000000000000002",
            "settledAt": "2026-01-15T10:00:05Z"
        });
        let header = BASE64.encode(serde_json::to_vec(&receipt).unwrap());
        let decoded = PaymentReceipt::from_header_value(&header).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.transaction.as_deref(), Some("0xabc"));
        assert_eq!(decoded.rest["settledAt"], json!("2026-01-15T10:00:05Z"));
    }

    #[test]
    fn garbage_receipt_header_is_an_error() {
        assert!(PaymentReceipt::from_header_value("not base64 at all!").is_err());
        let header = BASE64.encode(b"not json");
        assert!(PaymentReceipt::from_header_value(&header).is_err());
    }
}
