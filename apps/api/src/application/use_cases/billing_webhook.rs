//! Webhook ingestion: verify, deduplicate, route, record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::OwnerKind;
use secrecy::SecretString;
use strum::{AsRefStr, Display};
use tracing::{debug, error, info, instrument, warn};

use super::{
    bounded,
    subscription_reconciler::{Reconciliation, SubscriptionReconciler},
    webhook_verifier::WebhookVerifier,
};
use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        provider_event::{EventKind, ProviderEvent},
        webhook_event::{WebhookEventProfile, WebhookOutcome},
    },
};

/// Which endpoint received the event. Selects the signing secret only; both
/// share one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WebhookIngress {
    User,
    Team,
}

#[derive(Debug, Clone)]
pub struct RecordWebhookEventInput {
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
    pub owner_kind: Option<OwnerKind>,
    pub stripe_subscription_id: Option<String>,
    pub provider_created_at: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

/// Idempotency ledger keyed by provider event id.
#[async_trait]
pub trait WebhookEventRepoTrait: Send + Sync {
    async fn exists(&self, event_id: &str) -> AppResult<bool>;
    /// Insert once. Recording an id that is already present is a no-op.
    async fn record(&self, input: &RecordWebhookEventInput) -> AppResult<()>;
    /// Deferred events for a subscription, oldest provider timestamp first.
    async fn list_deferred(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Vec<WebhookEventProfile>>;
    /// Returns the number of rows removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Signing secrets for the two ingress endpoints.
#[derive(Clone)]
pub struct WebhookSecrets {
    pub user: SecretString,
    pub team: SecretString,
}

impl WebhookSecrets {
    fn for_ingress(&self, ingress: WebhookIngress) -> &SecretString {
        match ingress {
            WebhookIngress::User => &self.user,
            WebhookIngress::Team => &self.team,
        }
    }
}

/// Whether a handling error should make the provider redeliver (HTTP 500).
///
/// Transient store and provider failures are retried. Anything describing the
/// event itself will not change on redelivery and is acknowledged.
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::Database(_) => true,
        AppError::Timeout => true,
        AppError::Provider(_) => true,
        AppError::Internal(_) => true,

        AppError::InvalidSignature => false,
        AppError::MalformedEvent(_) => false,
        AppError::NotFound => false,
        AppError::InvalidInput(_) => false,
        AppError::ValidationError(_) => false,
        AppError::Unauthorized => false,
        AppError::UpgradeRequired { .. } => false,
    }
}

#[derive(Clone)]
pub struct BillingWebhookUseCases {
    verifier: WebhookVerifier,
    secrets: WebhookSecrets,
    ledger: Arc<dyn WebhookEventRepoTrait>,
    reconciler: Arc<SubscriptionReconciler>,
    store_timeout: Duration,
}

impl BillingWebhookUseCases {
    pub fn new(
        verifier: WebhookVerifier,
        secrets: WebhookSecrets,
        ledger: Arc<dyn WebhookEventRepoTrait>,
        reconciler: Arc<SubscriptionReconciler>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            secrets,
            ledger,
            reconciler,
            store_timeout,
        }
    }

    /// Handle one delivery.
    ///
    /// `Ok(())` means acknowledge (200). `Err(InvalidSignature)` means 400 with
    /// no effects; any other error is retryable and nothing was recorded.
    #[instrument(skip_all, fields(ingress = %ingress))]
    pub async fn handle(
        &self,
        ingress: WebhookIngress,
        signature: Option<&str>,
        payload: &[u8],
    ) -> AppResult<()> {
        self.verifier.verify(
            payload,
            signature,
            self.secrets.for_ingress(ingress),
            Utc::now().timestamp(),
        )?;

        let event: ProviderEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Verified webhook body is not an event, acknowledging");
                return Ok(());
            }
        };

        if bounded(self.store_timeout, self.ledger.exists(&event.id)).await? {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Duplicate webhook event, already handled"
            );
            return Ok(());
        }

        let (outcome, reconciliation) = match self.route(&event).await {
            Ok(reconciliation) => (reconciliation.outcome(), Some(reconciliation)),
            Err(e) if is_retryable_error(&e) => {
                error!(
                    error = %e,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retryable = true,
                    "Webhook processing failed, returning 500 for provider retry"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retryable = false,
                    "Webhook event rejected, acknowledging"
                );
                (WebhookOutcome::Rejected, None)
            }
        };

        if let Some(Reconciliation::Linked(sub)) = &reconciliation {
            if let Some(stripe_subscription_id) = sub.stripe_subscription_id.as_deref() {
                self.replay_deferred(sub.owner.kind, stripe_subscription_id)
                    .await?;
            }
        }

        let record = RecordWebhookEventInput {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            outcome,
            owner_kind: reconciliation.as_ref().and_then(Reconciliation::owner_kind),
            stripe_subscription_id: reconciliation
                .as_ref()
                .and_then(|r| r.stripe_subscription_id().map(str::to_string)),
            provider_created_at: event.created_at().unwrap_or_else(|_| Utc::now()),
            payload: match outcome {
                WebhookOutcome::Deferred => serde_json::from_slice(payload).ok(),
                _ => None,
            },
        };
        bounded(self.store_timeout, self.ledger.record(&record)).await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = %outcome,
            owner_kind = ?record.owner_kind,
            "Webhook event handled"
        );

        if outcome == WebhookOutcome::Deferred
            && let (Some(kind), Some(stripe_subscription_id)) =
                (record.owner_kind, record.stripe_subscription_id.as_deref())
        {
            self.replay_if_linked_meanwhile(&event.id, kind, stripe_subscription_id)
                .await;
        }
        Ok(())
    }

    /// A checkout may link the subscription between routing this event and
    /// recording it as deferred, in which case its replay did not see it.
    /// The event is already in the ledger, so a redelivery would be dropped
    /// as a duplicate: failures here are logged and the event stays deferred.
    async fn replay_if_linked_meanwhile(
        &self,
        event_id: &str,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) {
        let replayed = match self.reconciler.is_linked(kind, stripe_subscription_id).await {
            Ok(false) => return,
            Ok(true) => {
                info!(
                    %event_id,
                    %stripe_subscription_id,
                    "Subscription linked while event was being deferred, replaying"
                );
                self.replay_deferred(kind, stripe_subscription_id).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = replayed {
            error!(
                error = %e,
                %event_id,
                %stripe_subscription_id,
                "Replay after deferral failed, event stays deferred"
            );
        }
    }

    async fn route(&self, event: &ProviderEvent) -> AppResult<Reconciliation> {
        match event.kind() {
            EventKind::CheckoutSessionCompleted => self.reconciler.checkout_completed(event).await,
            EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
                self.reconciler.subscription_changed(event).await
            }
            EventKind::SubscriptionDeleted => self.reconciler.subscription_deleted(event).await,
            EventKind::InvoicePaymentSucceeded => {
                self.reconciler.invoice_payment_succeeded(event).await
            }
            EventKind::InvoicePaymentFailed => self.reconciler.invoice_payment_failed(event).await,
            EventKind::Unhandled(event_type) => {
                debug!(event_type, "Unhandled webhook event type");
                Ok(Reconciliation::Skipped("unhandled event type"))
            }
        }
    }

    /// Re-run deferred events for a freshly linked subscription, oldest first.
    ///
    /// Their ledger rows stay `deferred`; the guarded writes make a second
    /// replay harmless.
    async fn replay_deferred(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<()> {
        let deferred = bounded(
            self.store_timeout,
            self.ledger.list_deferred(kind, stripe_subscription_id),
        )
        .await?;

        for entry in deferred {
            let Some(payload) = entry.payload else {
                warn!(event_id = %entry.event_id, "Deferred event without payload, skipping replay");
                continue;
            };
            let event: ProviderEvent = match serde_json::from_value(payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(event_id = %entry.event_id, error = %e, "Deferred payload unreadable");
                    continue;
                }
            };
            match self.route(&event).await {
                Ok(result) => info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = %result.outcome(),
                    %stripe_subscription_id,
                    "Replayed deferred webhook event"
                ),
                Err(e) if is_retryable_error(&e) => return Err(e),
                Err(e) => warn!(
                    event_id = %event.id,
                    error = %e,
                    "Deferred webhook event rejected on replay"
                ),
            }
        }
        Ok(())
    }

    /// Drop ledger rows received before `now - retention`.
    #[instrument(skip(self))]
    pub async fn prune_ledger(&self, retention: chrono::Duration) -> AppResult<u64> {
        let cutoff = Utc::now() - retention;
        let removed = bounded(self.store_timeout, self.ledger.prune_older_than(cutoff)).await?;
        if removed > 0 {
            info!(removed, %cutoff, "Pruned webhook ledger");
        }
        Ok(removed)
    }
}
