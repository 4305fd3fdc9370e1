//! Cashfree PG client: order creation, payment lookup and webhook signatures.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Gateway rejected request ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

const API_VERSION: &str = "2023-08-01";
const SANDBOX_BASE_URL: &str = "https://sandbox.cashfree.com/pg";
const PRODUCTION_BASE_URL: &str = "https://api.cashfree.com/pg";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderMeta {
    pub return_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GatewayOrderRequest {
    pub order_id: String,
    pub order_amount: f64,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
    pub order_note: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub order_id: Option<String>,
    pub payment_session_id: Option<String>,
    pub order_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayPayment {
    pub payment_status: String,
    #[serde(default)]
    pub payment_amount: Option<f64>,
}

impl GatewayPayment {
    pub fn is_success(&self) -> bool {
        self.payment_status == "SUCCESS"
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;
    /// Payments recorded against an order, most recent first.
    async fn order_payments(&self, order_id: &str) -> Result<Vec<GatewayPayment>, GatewayError>;
}

pub struct CashfreeClient {
    client: Client,
    base_url: String,
}

impl CashfreeClient {
    pub fn new(app_id: &str, secret_key: &str, environment: &str) -> Result<Self, GatewayError> {
        let base_url = match environment {
            "production" => PRODUCTION_BASE_URL,
            "sandbox" => SANDBOX_BASE_URL,
            other => {
                return Err(GatewayError::InvalidConfig(format!(
                    "Unknown Cashfree environment: {}",
                    other
                )))
            }
        };

        let mut headers = header::HeaderMap::new();
        let client_id = header::HeaderValue::from_str(app_id)
            .map_err(|e| GatewayError::InvalidConfig(format!("Invalid app id: {}", e)))?;
        let client_secret = header::HeaderValue::from_str(secret_key)
            .map_err(|e| GatewayError::InvalidConfig(format!("Invalid secret key: {}", e)))?;
        headers.insert("x-client-id", client_id);
        headers.insert("x-client-secret", client_secret);
        headers.insert("x-api-version", header::HeaderValue::from_static(API_VERSION));
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for CashfreeClient {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;

        Self::read_json(resp).await
    }

    async fn order_payments(&self, order_id: &str) -> Result<Vec<GatewayPayment>, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/orders/{}/payments", self.base_url, order_id))
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;

        Self::read_json(resp).await
    }
}

/// Checks `x-webhook-signature = base64(HMAC-SHA256(timestamp + raw_body))`.
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let mac = self.mac(timestamp, body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = BASE64.decode(signature.trim()) else {
            return false;
        };
        self.mac(timestamp, body).verify_slice(&expected).is_ok()
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Hmac<Sha256> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(timestamp.as_bytes());
        mac.update(body);
        mac
    }
}
