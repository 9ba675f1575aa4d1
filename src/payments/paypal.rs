use std::str::FromStr;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};

const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";
const LIVE_API_BASE: &str = "https://api-m.paypal.com";

/// Margin subtracted from a token's lifetime so we refresh before PayPal
/// stops accepting it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Which PayPal environment the configured credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaypalEnv {
    Sandbox,
    Live,
}

impl PaypalEnv {
    pub fn api_base(&self) -> &'static str {
        match self {
            PaypalEnv::Sandbox => SANDBOX_API_BASE,
            PaypalEnv::Live => LIVE_API_BASE,
        }
    }
}

impl FromStr for PaypalEnv {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(PaypalEnv::Sandbox),
            "live" | "production" => Ok(PaypalEnv::Live),
            other => Err(format!("unknown PayPal environment: {}", other)),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    reference_id: String,
    amount: PurchaseAmount,
}

#[derive(Debug, Serialize)]
struct PurchaseAmount {
    currency_code: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
}

/// Result of a capture call, reduced to what reconciliation needs.
#[derive(Debug, Deserialize)]
pub struct CaptureResult {
    pub id: String,
    pub status: String,
    pub payer: Option<PaypalPayer>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalPayer {
    pub payer_id: Option<String>,
}

impl CaptureResult {
    pub fn completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    pub fn payer_id(&self) -> Option<String> {
        self.payer.as_ref().and_then(|p| p.payer_id.clone())
    }
}

#[derive(Debug, Serialize)]
struct VerifySignatureRequest<'a> {
    transmission_id: &'a str,
    transmission_time: &'a str,
    cert_url: &'a str,
    auth_algo: &'a str,
    transmission_sig: &'a str,
    webhook_id: &'a str,
    webhook_event: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VerifySignatureResponse {
    verification_status: String,
}

/// The five `paypal-*` headers identifying one webhook transmission.
#[derive(Debug)]
pub struct PaypalTransmission<'a> {
    pub transmission_id: &'a str,
    pub transmission_time: &'a str,
    pub transmission_sig: &'a str,
    pub cert_url: &'a str,
    pub auth_algo: &'a str,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct PaypalClient {
    client: Client,
    client_id: String,
    client_secret: String,
    webhook_id: String,
    api_base: &'static str,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl PaypalClient {
    pub fn new(client_id: &str, client_secret: &str, webhook_id: &str, env: PaypalEnv) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            webhook_id: webhook_id.to_string(),
            api_base: env.api_base(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns a cached OAuth token, fetching a fresh one when the cache is
    /// empty or inside the expiry margin.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > chrono::Utc::now().timestamp() {
                    return Ok(token.access_token.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::ProviderAuth(format!("PayPal token request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderAuth(format!(
                "PayPal token request failed: {}",
                error_text
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::ProviderAuth(format!("Failed to parse PayPal token response: {}", e))
        })?;

        let expires_at =
            chrono::Utc::now().timestamp() + token.expires_in - TOKEN_EXPIRY_MARGIN_SECS;
        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }

    /// Sends a bearer-authorized request, retrying once with a fresh token
    /// when PayPal rejects the cached one as expired.
    async fn send_authorized(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|e| AppError::ProviderRequest(format!("PayPal API error: {}", e)))?;

        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let token = self.refresh_token().await?;
        build(&token)
            .send()
            .await
            .map_err(|e| AppError::ProviderRequest(format!("PayPal API error: {}", e)))
    }

    /// Create a PayPal order with CAPTURE intent for one store order.
    ///
    /// The amount is passed in cents and sent as the decimal string PayPal
    /// expects; the store order id travels as the purchase unit reference.
    pub async fn create_order(&self, amount_cents: i64, order_id: &str) -> Result<PaypalOrder> {
        let request = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: order_id.to_string(),
                amount: PurchaseAmount {
                    currency_code: "EUR",
                    value: format_euro_value(amount_cents),
                },
            }],
        };

        let url = format!("{}/v2/checkout/orders", self.api_base);
        let response = self
            .send_authorized(|token| self.client.post(&url).bearer_auth(token).json(&request))
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderRequest(format!(
                "PayPal API error: {}",
                error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ProviderRequest(format!("Failed to parse PayPal response: {}", e))
        })
    }

    /// Capture a PayPal order the customer has approved in the popup.
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<CaptureResult> {
        let url = format!(
            "{}/v2/checkout/orders/{}/capture",
            self.api_base, paypal_order_id
        );
        let response = self
            .send_authorized(|token| {
                // Capture has no body but PayPal still requires the content type.
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Content-Type", "application/json")
            })
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderCapture(format!(
                "PayPal capture failed: {}",
                error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ProviderCapture(format!("Failed to parse PayPal capture response: {}", e))
        })
    }

    /// Ask PayPal to verify a webhook delivery. The five transmission headers
    /// plus the exact event body are round-tripped to the verification
    /// endpoint; anything other than an explicit SUCCESS counts as invalid.
    pub async fn verify_webhook_signature(
        &self,
        transmission: &PaypalTransmission<'_>,
        event_body: &serde_json::Value,
    ) -> Result<bool> {
        let request = VerifySignatureRequest {
            transmission_id: transmission.transmission_id,
            transmission_time: transmission.transmission_time,
            cert_url: transmission.cert_url,
            auth_algo: transmission.auth_algo,
            transmission_sig: transmission.transmission_sig,
            webhook_id: &self.webhook_id,
            webhook_event: event_body,
        };

        let url = format!("{}/v1/notifications/verify-webhook-signature", self.api_base);
        let response = self
            .send_authorized(|token| self.client.post(&url).bearer_auth(token).json(&request))
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderRequest(format!(
                "PayPal verification error: {}",
                error_text
            )));
        }

        let result: VerifySignatureResponse = response.json().await.map_err(|e| {
            AppError::ProviderRequest(format!(
                "Failed to parse PayPal verification response: {}",
                e
            ))
        })?;

        Ok(result.verification_status == "SUCCESS")
    }
}

/// Formats a cent amount as the decimal string PayPal expects ("54.80").
fn format_euro_value(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Generic PayPal webhook event - resource is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct PaypalWebhookEvent {
    pub id: String,
    pub event_type: String,
    pub resource: serde_json::Value,
}

// ============ PAYMENT.CAPTURE.COMPLETED / PAYMENT.CAPTURE.DENIED ============

#[derive(Debug, Deserialize)]
pub struct PaypalCaptureResource {
    pub id: String,
    pub status: Option<String>,
    pub supplementary_data: Option<PaypalSupplementaryData>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalSupplementaryData {
    pub related_ids: Option<PaypalRelatedIds>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalRelatedIds {
    pub order_id: Option<String>,
}

impl PaypalCaptureResource {
    /// The checkout order id this capture belongs to. Capture events carry it
    /// in supplementary data; the capture's own id is the fallback for
    /// payloads that omit it.
    pub fn checkout_order_id(&self) -> &str {
        self.supplementary_data
            .as_ref()
            .and_then(|s| s.related_ids.as_ref())
            .and_then(|r| r.order_id.as_deref())
            .unwrap_or(&self.id)
    }
}
