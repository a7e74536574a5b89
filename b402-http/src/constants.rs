//! HTTP-level constants for the x402 Bazaar engine.

/// Request header carrying the base64-encoded payment payload.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64-encoded settlement receipt.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header name for exposing custom headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Default base URL of the upstream Bazaar registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://api.cdp.coinbase.com/platform/v2/x402";

/// Path of the discovery endpoint, relative to the registry base URL.
pub const DISCOVERY_RESOURCES_PATH: &str = "/discovery/resources";
