use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Checks the `stripe-signature` header against the exact request bytes.
///
/// Every failure is reported as [`AppError::InvalidSignature`]; the reason is
/// only logged.
#[derive(Debug, Clone, Copy)]
pub struct WebhookVerifier {
    tolerance_secs: i64,
}

impl Default for WebhookVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE_TOLERANCE)
    }
}

impl WebhookVerifier {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance_secs: i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        secret: &SecretString,
        now: i64,
    ) -> AppResult<()> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            debug!("Webhook secret not configured");
            return Err(AppError::InvalidSignature);
        }
        let Some(header) = signature_header else {
            debug!("Missing stripe-signature header");
            return Err(AppError::InvalidSignature);
        };

        // "t=timestamp,v1=signature,v1=..."
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            debug!("Missing timestamp in signature header");
            return Err(AppError::InvalidSignature);
        };
        let Ok(ts) = timestamp.parse::<i64>() else {
            debug!(timestamp, "Unparseable signature timestamp");
            return Err(AppError::InvalidSignature);
        };
        if now.saturating_sub(ts).saturating_abs() > self.tolerance_secs {
            debug!(timestamp = ts, now, "Signature timestamp outside tolerance");
            return Err(AppError::InvalidSignature);
        }

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            debug!(candidates = signatures.len(), "No matching v1 signature");
            return Err(AppError::InvalidSignature);
        }
        Ok(())
    }
}
