use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::BillingProviderPort,
    domain::entities::provider_event::{InvoiceObject, SubscriptionObject},
};

/// Read-only Stripe API client used to fill in data an event does not embed.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: Url,
}

impl StripeClient {
    pub fn new(
        secret_key: SecretString,
        mut api_base: Url,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        // Url::join drops the last segment unless the base ends with a slash.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InfraError::HttpClient)?;
        Ok(Self {
            client,
            secret_key,
            api_base,
        })
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str, id: &str) -> AppResult<T> {
        if id.is_empty() || id.contains('/') {
            return Err(AppError::InvalidInput(format!("Invalid {resource} id")));
        }
        let url = self
            .api_base
            .join(&format!("{resource}/{id}"))
            .map_err(|e| AppError::Internal(format!("Invalid Stripe URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error.message.or(e.error.error_type))
                .unwrap_or_else(|| status.to_string());
            tracing::error!(status = %status, message = %message, "Stripe API error");

            return Err(match status {
                StatusCode::NOT_FOUND => AppError::NotFound,
                StatusCode::BAD_REQUEST => {
                    AppError::InvalidInput(format!("Stripe error: {}", message))
                }
                _ => AppError::Provider(format!("Stripe API error: {} - {}", status, message)),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe response");
            AppError::Provider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl BillingProviderPort for StripeClient {
    async fn fetch_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject> {
        self.get("subscriptions", subscription_id).await
    }

    async fn fetch_invoice(&self, invoice_id: &str) -> AppResult<InvoiceObject> {
        self.get("invoices", invoice_id).await
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}
