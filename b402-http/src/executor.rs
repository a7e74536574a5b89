//! Paid request execution: the x402 payment-required call lifecycle.
//!
//! [`PaidRequestExecutor`] performs an HTTP call against a target resource
//! through a middleware that reacts to a 402 Payment Required challenge:
//! it signs a payment with the resolved network signer and retries exactly
//! once with the proof attached. A second 402, or any other outcome of
//! the retry, is surfaced as-is; there is never a third attempt.
//!
//! After a response is obtained (paid or not), the settlement receipt is
//! decoded from the `X-PAYMENT-RESPONSE` header and the body is decoded as
//! JSON when the content type indicates it or the caller forces it, falling
//! back silently to raw text.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use b402::proto::{PaymentReceipt, PaymentRequired, ReceiptDecodeError};
use b402_wallet::{NetworkSigner, SignerError};
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};

/// Errors that can occur while executing a paid request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecuteError {
    /// The target is not an absolute http/https URL. Raised before any
    /// network call.
    #[error("target URL must be an absolute http/https URL: {0}")]
    InvalidUrl(String),

    /// A structured request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    BodyEncode(#[source] serde_json::Error),

    /// The target signalled 402 but its challenge body was unreadable.
    #[error("402 challenge body could not be parsed: {0}")]
    ChallengeParse(String),

    /// Constructing or signing the payment failed.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The original request could not be cloned for the payment retry.
    #[error("request could not be replayed with payment attached")]
    RequestNotCloneable,

    /// The transport failed on either round-trip.
    #[error(transparent)]
    Transport(rqm::Error),

    /// The settlement receipt header was present but undecodable.
    #[error("failed to decode payment receipt: {0}")]
    Receipt(#[from] ReceiptDecodeError),
}

/// The body a caller attaches to a paid request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A structured value. Objects and arrays are serialized to JSON and
    /// tagged `application/json` unless the caller already set a content
    /// type; strings pass through; other scalars are coerced to their
    /// string rendering.
    Structured(Value),
    /// A string body, passed through unchanged.
    Text(String),
    /// Raw bytes, passed through unchanged.
    Bytes(Vec<u8>),
}

/// A paid HTTP request.
#[derive(Debug, Clone)]
pub struct PaidRequest {
    /// Absolute target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Query parameters merged into the URL before sending.
    pub query: Vec<(String, String)>,
    /// Optional request body. Dropped for GET and HEAD.
    pub body: Option<RequestBody>,
    /// Force (`Some(true)`) or suppress (`Some(false)`) JSON parsing of the
    /// response body; `None` infers from the content type.
    pub parse_json: Option<bool>,
}

impl PaidRequest {
    /// Creates a request with the given method and target URL.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            parse_json: None,
        }
    }

    /// Creates a GET request for the target URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// Echo of the request as it was actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentRequest {
    /// Final URL, with query parameters merged.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Headers as sent, including any added content type.
    pub headers: BTreeMap<String, String>,
    /// Body as sent, when representable as UTF-8 text.
    pub body: Option<String>,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// The body parsed as JSON.
    Json(Value),
    /// The raw body text.
    Text(String),
}

/// The target's response to a paid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical status reason.
    pub status_text: String,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Decoded body.
    pub body: ResponseBody,
}

/// Everything a paid call produced: the echoed request, the response, and
/// the decoded settlement receipt when the target returned one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidCallOutcome {
    /// The request as sent.
    pub request: SentRequest,
    /// The target's response.
    pub response: PaidResponse,
    /// The settlement receipt, absent when the target sent none.
    pub payment: Option<PaymentReceipt>,
}

/// Executes paid HTTP requests.
#[derive(Debug, Clone, Default)]
pub struct PaidRequestExecutor {
    http: reqwest::Client,
}

impl PaidRequestExecutor {
    /// Creates an executor with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the underlying HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Performs the request, transparently answering a 402 challenge with a
    /// single payment retry signed by `signer`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::InvalidUrl`] before any network activity for
    /// a non-absolute target, transport/signing errors from either
    /// round-trip, and [`ExecuteError::Receipt`] for an undecodable
    /// settlement receipt. Body-decoding problems are never errors.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "executor.execute", skip_all, fields(url = %request.url, method = %request.method))
    )]
    pub async fn execute(
        &self,
        request: PaidRequest,
        signer: Arc<NetworkSigner>,
    ) -> Result<PaidCallOutcome, ExecuteError> {
        let target = resolve_target(&request.url, &request.query)?;
        let mut headers = request.headers;
        let body_bytes = assemble_body(request.body, &request.method, &mut headers)?;

        let client = rqm::ClientBuilder::new(self.http.clone())
            .with(PaymentChallengeMiddleware {
                signer: Arc::clone(&signer),
            })
            .build();

        let mut builder = client
            .request(request.method.clone(), target.clone())
            .headers(headers.clone());
        if let Some(bytes) = &body_bytes {
            builder = builder.body(bytes.clone());
        }
        let response = builder.send().await.map_err(flatten_error)?;

        let payment = match response.headers().get(X_PAYMENT_RESPONSE_HEADER) {
            Some(value) => Some(PaymentReceipt::from_header_value(
                &String::from_utf8_lossy(value.as_bytes()),
            )?),
            None => None,
        };

        let status = response.status();
        let response_headers = header_pairs(response.headers());
        let json_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains("application/json"));
        let text = response
            .text()
            .await
            .map_err(|e| ExecuteError::Transport(rqm::Error::Reqwest(e)))?;

        let parse_json = request.parse_json.unwrap_or(json_content_type);
        let body = if parse_json {
            // Parse failures fall back to the raw text, never to an error.
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(text),
            }
        } else {
            ResponseBody::Text(text)
        };

        Ok(PaidCallOutcome {
            request: SentRequest {
                url: target.to_string(),
                method: request.method.to_string(),
                headers: header_pairs(&headers),
                body: body_bytes.and_then(|bytes| String::from_utf8(bytes).ok()),
            },
            response: PaidResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                headers: response_headers,
                body,
            },
            payment,
        })
    }
}

/// Validates the target URL and merges query parameters into it.
fn resolve_target(url: &str, query: &[(String, String)]) -> Result<Url, ExecuteError> {
    let mut target =
        Url::parse(url).map_err(|_| ExecuteError::InvalidUrl(url.to_owned()))?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(ExecuteError::InvalidUrl(url.to_owned()));
    }
    if !query.is_empty() {
        let mut pairs = target.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(target)
}

/// Applies the body construction rule, tagging structured bodies with a
/// JSON content type unless one is already set. Bodies are dropped for GET
/// and HEAD.
fn assemble_body(
    body: Option<RequestBody>,
    method: &Method,
    headers: &mut HeaderMap,
) -> Result<Option<Vec<u8>>, ExecuteError> {
    let Some(body) = body else {
        return Ok(None);
    };
    if matches!(*method, Method::GET | Method::HEAD) {
        return Ok(None);
    }
    let bytes = match body {
        RequestBody::Text(text) => text.into_bytes(),
        RequestBody::Bytes(bytes) => bytes,
        RequestBody::Structured(value) => match value {
            Value::String(text) => text.into_bytes(),
            Value::Object(_) | Value::Array(_) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                serde_json::to_vec(&value).map_err(ExecuteError::BodyEncode)?
            }
            other => other.to_string().into_bytes(),
        },
    };
    Ok(Some(bytes))
}

fn header_pairs(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Unwraps typed executor errors smuggled through the middleware boundary.
fn flatten_error(err: rqm::Error) -> ExecuteError {
    match err {
        rqm::Error::Middleware(inner) => match inner.downcast::<ExecuteError>() {
            Ok(flat) => flat,
            Err(inner) => ExecuteError::Transport(rqm::Error::Middleware(inner)),
        },
        other => ExecuteError::Transport(other),
    }
}

fn middleware_error(err: ExecuteError) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

/// Middleware that answers a 402 Payment Required response by attaching a
/// signed payment and retrying exactly once.
struct PaymentChallengeMiddleware {
    signer: Arc<NetworkSigner>,
}

#[async_trait]
impl rqm::Middleware for PaymentChallengeMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(url = %response.url(), "received 402 Payment Required, attaching payment");

        let challenge: PaymentRequired = response
            .json()
            .await
            .map_err(|e| middleware_error(ExecuteError::ChallengeParse(e.to_string())))?;

        let payment_header = self
            .signer
            .payment_header(&challenge)
            .await
            .map_err(|e| middleware_error(ExecuteError::Signer(e)))?;

        let mut retry =
            retry_req.ok_or_else(|| middleware_error(ExecuteError::RequestNotCloneable))?;
        let headers = retry.headers_mut();
        headers.insert(
            X_PAYMENT_HEADER,
            HeaderValue::from_str(&payment_header)
                .expect("base64 payment payload is a valid header value"),
        );
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
        );

        // One retry only: whatever comes back now is the caller's to see.
        next.run(retry, extensions).await
    }
}
