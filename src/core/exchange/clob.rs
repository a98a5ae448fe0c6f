//! Trading API client: order placement, polling and cancellation.
//!
//! Authentication is header-based (`Authorization: Bearer` or `X-API-Key`)
//! with optional HMAC request signing. The signed payload is
//! `"{ts}\n{METHOD}\n{path?query}\n{body}"`; the signature is
//! base64(HMAC-SHA256(secret, payload)) and the timestamp header carries
//! whole seconds since epoch.

use std::time::Duration;

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::core::domain::{OrderStatus, TokenId, TradeSide};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// How the client authenticates with the trading API.
#[derive(Debug, Clone, Default)]
pub struct TradingAuth {
    /// Sent as `Authorization: Bearer …` when set.
    pub bearer_token: Option<String>,
    /// Sent as `X-API-Key` when set.
    pub api_key: Option<String>,
    /// HMAC secret (base64); enables request signing when set.
    pub hmac_secret: Option<String>,
    pub passphrase: Option<String>,
    pub address: Option<String>,
}

/// Request to place a single order.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub token_id: String,
    pub side: String,
    pub price: Decimal,
    pub size_usd: Decimal,
    pub client_order_id: String,
    #[serde(rename = "type")]
    pub order_type: String,
}

impl PlaceOrderRequest {
    #[must_use]
    pub fn limit(
        token_id: &TokenId,
        side: TradeSide,
        price: Decimal,
        size_usd: Decimal,
        client_order_id: String,
    ) -> Self {
        Self {
            token_id: token_id.to_string(),
            side: side.as_str().to_uppercase(),
            price,
            size_usd,
            client_order_id,
            order_type: "limit".into(),
        }
    }
}

/// Normalized view of the exchange's order responses.
///
/// The wire shape varies by endpoint; field aliases cover the variants the
/// API is known to emit.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    #[serde(alias = "id", alias = "clob_order_id")]
    pub order_id: Option<String>,
    #[serde(alias = "state")]
    pub status: Option<String>,
    #[serde(alias = "filled_value", alias = "filled")]
    pub filled_usd: Option<Decimal>,
    #[serde(alias = "average_price", alias = "price")]
    pub avg_price: Option<Decimal>,
    #[serde(alias = "fees")]
    pub fee: Option<Decimal>,
    #[serde(alias = "done_at")]
    pub filled_at: Option<String>,
    #[serde(alias = "canceled_at")]
    pub cancelled_at: Option<String>,
    #[serde(alias = "error", alias = "message")]
    pub failure_reason: Option<String>,
}

impl OrderResponse {
    /// Map the reported status string onto the internal order machine.
    #[must_use]
    pub fn order_status(&self) -> Option<OrderStatus> {
        self.status.as_deref().and_then(OrderStatus::parse)
    }

    #[must_use]
    pub fn filled_at_ts(&self) -> Option<DateTime<Utc>> {
        self.filled_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// HTTP client for the trading endpoints.
pub struct TradingClient {
    http: HttpClient,
    base_url: String,
    auth: TradingAuth,
}

impl TradingClient {
    /// Create a client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: String, timeout: Duration, auth: TradingAuth) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// Place an order. 2xx responses yield the exchange's view of the new
    /// order; 4xx is a permanent rejection surfaced as [`Error::Api`].
    pub async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderResponse> {
        let body = serde_json::to_string(request)?;
        debug!(client_order_id = %request.client_order_id, "placing order");
        self.send("POST", "/orders", Some(body)).await
    }

    /// Fetch the current state of an order by its exchange id.
    pub async fn get_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        self.send("GET", &format!("/orders/{external_order_id}"), None)
            .await
    }

    /// Request cancellation of an open order.
    pub async fn cancel_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        self.send("DELETE", &format!("/orders/{external_order_id}"), None)
            .await
    }

    async fn send(
        &self,
        method: &str,
        path_and_query: &str,
        body: Option<String>,
    ) -> Result<OrderResponse> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let body_str = body.unwrap_or_default();

        let mut request = match method {
            "POST" => self.http.post(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.get(&url),
        };

        if let Some(token) = &self.auth.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(key) = &self.auth.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(passphrase) = &self.auth.passphrase {
            request = request.header("X-Passphrase", passphrase);
        }
        if let Some(address) = &self.auth.address {
            request = request.header("X-Address", address);
        }
        if let Some(secret) = &self.auth.hmac_secret {
            let ts = Utc::now().timestamp();
            let signature = sign_request(secret, ts, method, path_and_query, &body_str)?;
            request = request
                .header("X-Timestamp", ts.to_string())
                .header("X-Signature", signature);
        }
        if !body_str.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(Error::Json)
    }
}

/// Compute the request signature over `"{ts}\n{METHOD}\n{path?query}\n{body}"`.
///
/// The secret is base64; both URL-safe and standard alphabets are accepted.
///
/// # Errors
/// Returns a config error if the secret is not valid base64.
pub fn sign_request(
    secret: &str,
    ts: i64,
    method: &str,
    path_and_query: &str,
    body: &str,
) -> Result<String> {
    let secret_bytes = URL_SAFE
        .decode(secret)
        .or_else(|_| BASE64.decode(secret))
        .map_err(|e| Error::Config(format!("invalid HMAC secret: {e}")))?;

    let payload = format!("{ts}\n{method}\n{path_and_query}\n{body}");
    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| Error::Config(format!("HMAC key error: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
