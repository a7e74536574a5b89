//! The three Bazaar tool operations.
//!
//! Input schemas are strictly enforced before any network call. Discovery
//! and inspection catch upstream failures and degrade to a descriptive
//! text payload; paid execution propagates signer and transport errors to
//! the caller.

use std::collections::BTreeMap;
use std::fmt;

use b402::filter::{DEFAULT_LIST_LIMIT, ListFilters, ServiceSummary, filter_and_summarize, summarize};
use b402::proto::{DiscoveryResource, Pagination, PaymentReceipt};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use b402_http::executor::{PaidRequest, RequestBody};
use b402_http::{BazaarClient, ExecuteError, PaidRequestExecutor};
use b402_wallet::{SignerError, SignerRegistry};

use crate::types::{CallToolResult, ToolDefinition};

/// Tool name for listing Bazaar services.
pub const LIST_SERVICES_TOOL: &str = "list-bazaar-services";

/// Tool name for inspecting one Bazaar service.
pub const INSPECT_SERVICE_TOOL: &str = "inspect-bazaar-service";

/// Tool name for executing a paid request.
pub const CALL_SERVICE_TOOL: &str = "call-bazaar-service";

/// Errors surfaced by the tool operations.
///
/// Validation failures are raised before any network call and are never
/// converted into a text payload.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The tool arguments did not match the input schema.
    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    /// No tool with the requested name exists.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Resolving the payment signer failed.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The paid request failed.
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Filters accepted by `list-bazaar-services`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesInput {
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    max_atomic_price: Option<u64>,
    #[serde(default)]
    limit: Option<usize>,
}

impl ListServicesInput {
    fn into_filters(self) -> Result<ListFilters, ToolError> {
        if self.max_atomic_price == Some(0) {
            return Err(ToolError::InvalidInput(
                "maxAtomicPrice must be a positive integer".into(),
            ));
        }
        if let Some(limit) = self.limit
            && !(1..=DEFAULT_LIST_LIMIT).contains(&limit)
        {
            return Err(ToolError::InvalidInput(format!(
                "limit must be between 1 and {DEFAULT_LIST_LIMIT}"
            )));
        }
        Ok(ListFilters {
            network: self.network,
            asset: self.asset,
            max_atomic_price: self.max_atomic_price,
            limit: self.limit,
        })
    }
}

/// Arguments of `inspect-bazaar-service`.
#[derive(Debug, Clone, Deserialize)]
struct InspectServiceInput {
    resource: String,
}

/// HTTP methods `call-bazaar-service` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Head => Self::HEAD,
        }
    }
}

/// A scalar query parameter value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum QueryValue {
    /// String value.
    Text(String),
    /// Numeric value.
    Number(serde_json::Number),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Arguments of `call-bazaar-service`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallServiceInput {
    url: String,
    #[serde(default)]
    method: Option<HttpMethod>,
    network: String,
    #[serde(default)]
    query: Option<BTreeMap<String, QueryValue>>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    parse_response_as_json: Option<bool>,
}

/// Echo of the filters a listing call ran with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryEcho {
    network: Option<String>,
    asset: Option<String>,
    max_atomic_price: Option<u64>,
    limit: usize,
}

/// JSON payload of a `list-bazaar-services` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesPayload {
    query: QueryEcho,
    total_discovered: usize,
    matched: usize,
    returned: usize,
    pagination: Option<Pagination>,
    x402_version: Option<u32>,
    items: Vec<ServiceSummary>,
}

/// JSON payload of an `inspect-bazaar-service` result.
#[derive(Debug, Clone, Serialize)]
struct InspectServicePayload {
    summary: ServiceSummary,
    item: DiscoveryResource,
}

/// The Bazaar tool surface: discovery, inspection, and paid execution.
#[derive(Debug)]
pub struct BazaarTools {
    bazaar: BazaarClient,
    signers: SignerRegistry,
    executor: PaidRequestExecutor,
}

impl BazaarTools {
    /// Assembles the tool surface from its collaborators.
    #[must_use]
    pub fn new(bazaar: BazaarClient, signers: SignerRegistry, executor: PaidRequestExecutor) -> Self {
        Self {
            bazaar,
            signers,
            executor,
        }
    }

    /// The tools this surface advertises, with their input schemas.
    #[must_use]
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: LIST_SERVICES_TOOL,
                title: "List Bazaar Services",
                description:
                    "Fetch discoverable x402 services from the Bazaar with optional filters.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "network": {
                            "type": "string",
                            "description": "Optional network name to filter accepted payments (e.g., base)."
                        },
                        "asset": {
                            "type": "string",
                            "description": "Optional ERC-20 contract address to filter supported assets."
                        },
                        "maxAtomicPrice": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Optional maximum price in atomic units (e.g., USDC has 6 decimals)."
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": 100,
                            "description": "Limit the number of results returned (default: all)."
                        }
                    }
                }),
            },
            ToolDefinition {
                name: INSPECT_SERVICE_TOOL,
                title: "Inspect Bazaar Service",
                description:
                    "Show full payment metadata and schemas for a specific Bazaar resource URL.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "resource": {
                            "type": "string",
                            "description": "Exact resource URL returned by list-bazaar-services."
                        }
                    },
                    "required": ["resource"]
                }),
            },
            ToolDefinition {
                name: CALL_SERVICE_TOOL,
                title: "Call Bazaar Service",
                description:
                    "Execute a paid request to a Bazaar-listed endpoint using x402 payments.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "Absolute URL of the x402-protected resource to call."
                        },
                        "method": {
                            "type": "string",
                            "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"],
                            "description": "HTTP method to use. Defaults to GET."
                        },
                        "network": {
                            "type": "string",
                            "description": "Network expected by the service (e.g., base, base-sepolia, solana-devnet)."
                        },
                        "query": {
                            "type": "object",
                            "additionalProperties": {"type": ["string", "number", "boolean"]},
                            "description": "Optional query parameters to append to the request URL."
                        },
                        "headers": {
                            "type": "object",
                            "additionalProperties": {"type": "string"},
                            "description": "Additional HTTP headers to send with the request."
                        },
                        "body": {
                            "description": "Optional request body. Objects will be JSON-encoded unless Content-Type is provided."
                        },
                        "parseResponseAsJson": {
                            "type": "boolean",
                            "description": "Force JSON parsing of the response body regardless of content-type."
                        }
                    },
                    "required": ["url", "network"]
                }),
            },
        ]
    }

    /// Dispatches a tool call by name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for unrecognized names, plus
    /// whatever the invoked operation raises.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, ToolError> {
        match name {
            LIST_SERVICES_TOOL => self.list_services(arguments).await,
            INSPECT_SERVICE_TOOL => self.inspect_service(arguments).await,
            CALL_SERVICE_TOOL => self.call_service(arguments).await,
            other => Err(ToolError::UnknownTool(other.to_owned())),
        }
    }

    /// Lists discoverable services, applying the optional filters.
    ///
    /// Upstream failures degrade to a descriptive text payload.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] for malformed arguments.
    pub async fn list_services(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let input: ListServicesInput = parse_input(arguments)?;
        let filters = input.into_filters()?;

        let snapshot = match self.bazaar.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return Ok(CallToolResult::text(format!(
                    "Error listing Bazaar services: {error}"
                )));
            }
        };

        let outcome = filter_and_summarize(&snapshot, &filters);
        let payload = ListServicesPayload {
            query: QueryEcho {
                network: filters.network.clone(),
                asset: filters.asset.clone(),
                max_atomic_price: filters.max_atomic_price,
                limit: filters.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            },
            total_discovered: outcome.total_discovered,
            matched: outcome.matched,
            returned: outcome.returned,
            pagination: snapshot.pagination.clone(),
            x402_version: snapshot.x402_version,
            items: outcome.items,
        };

        let trailer = if payload.items.is_empty() {
            if payload.matched > 0 {
                "No services returned after applying limit/filter.".to_owned()
            } else {
                "No services matched the provided filters.".to_owned()
            }
        } else {
            render_summary_text(&payload.items)
        };

        Ok(CallToolResult::text_blocks([
            render_json(&payload),
            trailer,
        ]))
    }

    /// Shows the full listing for an exact resource URL.
    ///
    /// Both upstream failures and a missing resource degrade to descriptive
    /// text payloads; this operation never throws past validation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] for malformed arguments.
    pub async fn inspect_service(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let input: InspectServiceInput = parse_input(arguments)?;

        let snapshot = match self.bazaar.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return Ok(CallToolResult::text(format!(
                    "Error inspecting Bazaar service: {error}"
                )));
            }
        };

        let Some(item) = snapshot
            .items
            .iter()
            .find(|item| item.resource == input.resource)
        else {
            return Ok(CallToolResult::text(format!(
                "No Bazaar service found for resource: {}",
                input.resource
            )));
        };

        let payload = InspectServicePayload {
            summary: summarize(item),
            item: item.clone(),
        };
        Ok(CallToolResult::text(render_json(&payload)))
    }

    /// Executes a paid request against a target resource.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] for malformed arguments, and
    /// propagates signer and transport failures, since a paid call's failure
    /// must stay visible to the caller.
    pub async fn call_service(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let input: CallServiceInput = parse_input(arguments)?;

        let headers = build_header_map(input.headers.unwrap_or_default())?;
        let query: Vec<(String, String)> = input
            .query
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();

        let signer = self.signers.resolve(&input.network).await?;

        let request = PaidRequest {
            url: input.url,
            method: input.method.unwrap_or_default().into(),
            headers,
            query,
            body: input.body.map(RequestBody::Structured),
            parse_json: input.parse_response_as_json,
        };
        let outcome = self.executor.execute(request, signer).await?;

        let mut summary_lines = vec![
            format!("Request: {} {}", outcome.request.method, outcome.request.url),
            format!(
                "Status: {} {}",
                outcome.response.status, outcome.response.status_text
            ),
        ];
        if let Some(receipt) = &outcome.payment {
            summary_lines.push(format!("Payment response: {}", render_receipt(receipt)));
        }

        Ok(CallToolResult::text_blocks([
            render_json(&outcome),
            summary_lines.join("\n"),
        ]))
    }
}

fn parse_input<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|error| ToolError::InvalidInput(error.to_string()))
}

fn build_header_map(headers: BTreeMap<String, String>) -> Result<HeaderMap, ToolError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| ToolError::InvalidInput(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ToolError::InvalidInput(format!("invalid value for header {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn render_json<T: Serialize>(payload: &T) -> String {
    serde_json::to_string_pretty(payload).expect("tool payloads serialize to JSON")
}

fn render_receipt(receipt: &PaymentReceipt) -> String {
    serde_json::to_string(receipt).expect("receipts serialize to JSON")
}

/// Renders the numbered human-readable summary block of a listing result.
fn render_summary_text(items: &[ServiceSummary]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, summary)| {
            let mut parts = vec![format!("{}. {}", index + 1, summary.resource)];
            if let Some(kind) = &summary.kind {
                parts.push(format!("   type: {kind}"));
            }
            if let Some(network) = &summary.network {
                parts.push(format!("   network: {network}"));
            }
            if let Some(asset) = &summary.asset {
                parts.push(format!("   asset: {asset}"));
            }
            if let Some(amount) = &summary.max_amount_required {
                parts.push(format!("   maxAtomicPrice: {amount}"));
            }
            if let Some(price) = summary.price_approx {
                parts.push(format!("   priceApprox: {price} (assuming 6 decimals)"));
            }
            if let Some(description) = &summary.description {
                parts.push(format!("   description: {description}"));
            }
            parts.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
