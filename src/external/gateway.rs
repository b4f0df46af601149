use crate::config::GatewayConfig;
use crate::error::AppResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Gateway HTTP calls get a hard deadline so a stuck verify cannot starve
/// the sweep or a handler.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

pub const CODE_SUCCESS: i64 = 100;
/// Already verified at the gateway on an earlier call; still a success.
pub const CODE_ALREADY_VERIFIED: i64 = 101;

/// Outcome of a well-formed "create payment request" response.
///
/// `code != 100` is a business failure, not a transport error; the caller
/// decides what to do with it. `authority` is only present on success.
#[derive(Debug, Clone)]
pub struct CreateRequestOutcome {
    pub code: i64,
    pub message: String,
    pub authority: Option<String>,
}

impl CreateRequestOutcome {
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

/// Outcome of a well-formed "verify" response.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub code: i64,
    pub message: String,
    pub ref_id: Option<String>,
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS || self.code == CODE_ALREADY_VERIFIED
    }
}

/// Seam between the payment service and the gateway's HTTP API.
///
/// Transport failures (timeout, connection, malformed JSON) are `Err`;
/// business-level non-success codes come back as `Ok` outcomes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_request(
        &self,
        amount: i64,
        description: &str,
        order_id: i64,
    ) -> AppResult<CreateRequestOutcome>;

    async fn verify(&self, amount: i64, authority: &str) -> AppResult<VerifyOutcome>;

    /// User-facing page for a created payment attempt.
    fn payment_url(&self, authority: &str) -> String;
}

#[derive(Debug, Serialize)]
struct CreateRequestBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    currency: &'a str,
    description: &'a str,
    callback_url: &'a str,
    metadata: Value,
}

#[derive(Debug, Serialize)]
struct VerifyRequestBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    authority: &'a str,
}

/// Gateway responses put the result under `data` on success and under
/// `errors` on failure; either field may be absent or an empty array.
#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    errors: Value,
}

impl GatewayEnvelope {
    fn code(&self) -> i64 {
        self.data
            .get("code")
            .and_then(Value::as_i64)
            .or_else(|| self.errors.get("code").and_then(Value::as_i64))
            .unwrap_or(-1)
    }

    fn message(&self) -> String {
        self.data
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| self.errors.get("message").and_then(Value::as_str))
            .unwrap_or("unrecognized gateway response")
            .to_string()
    }

    fn field(&self, name: &str) -> Option<String> {
        match self.data.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            // Numeric ref_id shows up on some gateway versions.
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ZarinpalClient {
    client: Client,
    config: GatewayConfig,
}

impl ZarinpalClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalClient {
    async fn create_request(
        &self,
        amount: i64,
        description: &str,
        order_id: i64,
    ) -> AppResult<CreateRequestOutcome> {
        let url = format!("{}/request.json", self.config.base_url);
        let body = CreateRequestBody {
            merchant_id: &self.config.merchant_id,
            amount,
            currency: &self.config.currency,
            description,
            callback_url: &self.config.callback_url,
            metadata: json!({ "order_id": order_id.to_string() }),
        };

        let response = self
            .client
            .post(&url)
            .timeout(GATEWAY_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let envelope: GatewayEnvelope = response.json().await?;
        Ok(decode_create(&envelope))
    }

    async fn verify(&self, amount: i64, authority: &str) -> AppResult<VerifyOutcome> {
        let url = format!("{}/verify.json", self.config.base_url);
        let body = VerifyRequestBody {
            merchant_id: &self.config.merchant_id,
            amount,
            authority,
        };

        let response = self
            .client
            .post(&url)
            .timeout(GATEWAY_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let envelope: GatewayEnvelope = response.json().await?;
        let outcome = decode_verify(&envelope);
        log::debug!(
            "Gateway verify for authority {}: code={} ref_id={:?}",
            authority,
            outcome.code,
            outcome.ref_id
        );
        Ok(outcome)
    }

    fn payment_url(&self, authority: &str) -> String {
        format!("{}/{}", self.config.start_pay_url, authority)
    }
}

fn decode_create(envelope: &GatewayEnvelope) -> CreateRequestOutcome {
    CreateRequestOutcome {
        code: envelope.code(),
        message: envelope.message(),
        authority: envelope.field("authority"),
    }
}

fn decode_verify(envelope: &GatewayEnvelope) -> VerifyOutcome {
    VerifyOutcome {
        code: envelope.code(),
        message: envelope.message(),
        ref_id: envelope.field("ref_id"),
    }
}
