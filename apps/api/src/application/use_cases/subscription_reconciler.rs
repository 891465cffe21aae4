//! Subscription state machine.
//!
//! Every write goes through a single-row conditional statement in the store;
//! the reconciler only decides which write to issue and how to report it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::{BillingCycle, Owner, OwnerKind, SubscriptionStatus};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{bounded, plan_registry::PlanRegistry};
use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::BillingProviderPort,
    domain::entities::{
        provider_event::{
            CheckoutSession, InvoiceObject, METADATA_PLAN_NAME, ProviderEvent,
            SubscriptionObject, owner_from_metadata, owner_kind_from_metadata,
        },
        subscription::SubscriptionProfile,
        webhook_event::WebhookOutcome,
    },
};

// ============================================================================
// Inputs
// ============================================================================

/// Provisional linkage written by checkout completion.
#[derive(Debug, Clone)]
pub struct CheckoutLink {
    pub owner: Owner,
    pub plan_name: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
}

/// Fields carried by a subscription created/updated event.
#[derive(Debug, Clone)]
pub struct ProviderSubscriptionUpdate {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    /// `None` keeps the stored plan.
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// `None` keeps the stored seat count.
    pub seats: Option<i32>,
    pub event_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionEventInput {
    pub owner_kind: OwnerKind,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: Option<SubscriptionStatus>,
    pub stripe_event_id: Option<String>,
    pub metadata: serde_json::Value,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Subscription rows, one table per owner kind.
///
/// Mutations are single conditional statements. A method returning `None`
/// means no row matched (missing, or rejected by the ordering guard).
#[async_trait]
pub trait SubscriptionRepoTrait: Send + Sync {
    async fn get_by_owner(&self, owner: Owner) -> AppResult<Option<SubscriptionProfile>>;

    async fn get_by_stripe_subscription_id(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>>;

    /// Upsert by owner. A different subscription id resets the row to a fresh
    /// provisional `active` linkage; the same id only fills the customer id.
    async fn link_checkout(&self, link: &CheckoutLink) -> AppResult<SubscriptionProfile>;

    /// Applied only when the row is not terminated and the update wins the
    /// `(period_end, event_at)` ordering (see
    /// [`SubscriptionProfile::accepts_update`]).
    async fn apply_provider_update(
        &self,
        kind: OwnerKind,
        update: &ProviderSubscriptionUpdate,
    ) -> AppResult<Option<SubscriptionProfile>>;

    /// Unconditional downgrade: plan = free, status = cancelled, first
    /// `cancelled_at` kept.
    async fn mark_deleted(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        free_plan_name: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>>;

    /// Guarded by [`SubscriptionProfile::accepts_invoice_event`].
    async fn mark_past_due(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>>;

    /// `past_due` becomes `active`; any other status is kept. Always advances
    /// `last_event_at` when the guard passes.
    async fn mark_payment_succeeded(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>>;
}

/// Append-only audit log of subscription transitions.
#[async_trait]
pub trait SubscriptionEventRepoTrait: Send + Sync {
    async fn create(&self, input: &CreateSubscriptionEventInput) -> AppResult<()>;
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Applied(SubscriptionProfile),
    /// Checkout linked an owner's row to a provider subscription.
    Linked(SubscriptionProfile),
    /// A row exists but the event is older than what it already reflects.
    Stale {
        owner_kind: OwnerKind,
        stripe_subscription_id: String,
    },
    /// No local row carries the subscription id yet.
    Deferred {
        owner_kind: OwnerKind,
        stripe_subscription_id: String,
    },
    /// Nothing to reconcile.
    Skipped(&'static str),
}

impl Reconciliation {
    pub fn outcome(&self) -> WebhookOutcome {
        match self {
            Reconciliation::Applied(_) | Reconciliation::Linked(_) => WebhookOutcome::Applied,
            Reconciliation::Stale { .. } | Reconciliation::Skipped(_) => WebhookOutcome::Ignored,
            Reconciliation::Deferred { .. } => WebhookOutcome::Deferred,
        }
    }

    pub fn owner_kind(&self) -> Option<OwnerKind> {
        match self {
            Reconciliation::Applied(sub) | Reconciliation::Linked(sub) => Some(sub.owner.kind),
            Reconciliation::Stale { owner_kind, .. }
            | Reconciliation::Deferred { owner_kind, .. } => Some(*owner_kind),
            Reconciliation::Skipped(_) => None,
        }
    }

    pub fn stripe_subscription_id(&self) -> Option<&str> {
        match self {
            Reconciliation::Applied(sub) | Reconciliation::Linked(sub) => {
                sub.stripe_subscription_id.as_deref()
            }
            Reconciliation::Stale {
                stripe_subscription_id,
                ..
            }
            | Reconciliation::Deferred {
                stripe_subscription_id,
                ..
            } => Some(stripe_subscription_id),
            Reconciliation::Skipped(_) => None,
        }
    }
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionReconciler {
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    events: Arc<dyn SubscriptionEventRepoTrait>,
    plans: Arc<PlanRegistry>,
    provider: Arc<dyn BillingProviderPort>,
    store_timeout: Duration,
}

impl SubscriptionReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        events: Arc<dyn SubscriptionEventRepoTrait>,
        plans: Arc<PlanRegistry>,
        provider: Arc<dyn BillingProviderPort>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            events,
            plans,
            provider,
            store_timeout,
        }
    }

    /// Whether a local row currently carries `stripe_subscription_id`.
    pub async fn is_linked(&self, kind: OwnerKind, stripe_subscription_id: &str) -> AppResult<bool> {
        let row = bounded(
            self.store_timeout,
            self.subscriptions
                .get_by_stripe_subscription_id(kind, stripe_subscription_id),
        )
        .await?;
        Ok(row.is_some())
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn checkout_completed(&self, event: &ProviderEvent) -> AppResult<Reconciliation> {
        let session: CheckoutSession = event.object()?;

        let Some(stripe_subscription_id) = session.subscription.clone() else {
            debug!(session_id = %session.id, "Checkout without subscription, nothing to link");
            return Ok(Reconciliation::Skipped("checkout without subscription"));
        };

        let owner = owner_from_metadata(&session.metadata, session.client_reference_id.as_deref())?;
        let plan_name = session
            .metadata
            .get(METADATA_PLAN_NAME)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::MalformedEvent("missing plan_name in metadata".into()))?;
        let plan = self
            .plans
            .get(plan_name)
            .await?
            .ok_or_else(|| AppError::MalformedEvent(format!("unknown plan {plan_name:?}")))?;

        let holder = bounded(
            self.store_timeout,
            self.subscriptions
                .get_by_stripe_subscription_id(owner.kind, &stripe_subscription_id),
        )
        .await?;
        if let Some(holder) = holder
            && holder.owner != owner
        {
            warn!(
                owner = %owner,
                holder = %holder.owner,
                %stripe_subscription_id,
                "Checkout names a subscription already linked to another owner"
            );
            return Err(AppError::InvalidInput(format!(
                "subscription {stripe_subscription_id} is linked to another owner"
            )));
        }

        let previous = bounded(self.store_timeout, self.subscriptions.get_by_owner(owner)).await?;

        let link = CheckoutLink {
            owner,
            plan_name: plan.name.clone(),
            stripe_subscription_id,
            stripe_customer_id: session.customer.clone(),
        };
        let linked = bounded(self.store_timeout, self.subscriptions.link_checkout(&link)).await?;

        info!(
            owner = %owner,
            plan = %linked.plan_name,
            stripe_subscription_id = %link.stripe_subscription_id,
            "Checkout linked subscription"
        );
        self.log_transition(
            event,
            &linked,
            previous.map(|p| p.status),
            json!({"session_id": session.id, "customer_id": session.customer}),
        )
        .await;

        Ok(Reconciliation::Linked(linked))
    }

    /// `customer.subscription.created` and `customer.subscription.updated`.
    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn subscription_changed(&self, event: &ProviderEvent) -> AppResult<Reconciliation> {
        let sub: SubscriptionObject = event.object()?;
        let created = event.created_at()?;
        let kind = owner_kind_from_metadata(&sub.metadata);

        let Some(existing) = bounded(
            self.store_timeout,
            self.subscriptions.get_by_stripe_subscription_id(kind, &sub.id),
        )
        .await?
        else {
            debug!(stripe_subscription_id = %sub.id, owner_kind = %kind, "No row yet, deferring");
            return Ok(Reconciliation::Deferred {
                owner_kind: kind,
                stripe_subscription_id: sub.id,
            });
        };

        let (current_period_start, current_period_end) = sub.period();
        let update = ProviderSubscriptionUpdate {
            stripe_subscription_id: sub.id.clone(),
            stripe_customer_id: sub.customer.clone(),
            plan_name: self.resolve_plan(&sub).await?,
            status: SubscriptionStatus::from_provider(&sub.status),
            billing_cycle: sub.billing_cycle(),
            current_period_start,
            current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            seats: match kind {
                OwnerKind::Team => sub.quantity(),
                OwnerKind::User => None,
            },
            event_at: created,
        };

        match bounded(
            self.store_timeout,
            self.subscriptions.apply_provider_update(kind, &update),
        )
        .await?
        {
            Some(updated) => {
                info!(
                    stripe_subscription_id = %sub.id,
                    owner_kind = %kind,
                    status = %updated.status,
                    plan = %updated.plan_name,
                    "Subscription updated from provider"
                );
                self.log_transition(
                    event,
                    &updated,
                    Some(existing.status),
                    json!({"stripe_status": sub.status, "period_end": current_period_end}),
                )
                .await;
                Ok(Reconciliation::Applied(updated))
            }
            None => {
                debug!(
                    stripe_subscription_id = %sub.id,
                    stored_period_end = ?existing.current_period_end,
                    incoming_period_end = ?current_period_end,
                    "Update lost the ordering guard"
                );
                Ok(Reconciliation::Stale {
                    owner_kind: kind,
                    stripe_subscription_id: sub.id,
                })
            }
        }
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn subscription_deleted(&self, event: &ProviderEvent) -> AppResult<Reconciliation> {
        let sub: SubscriptionObject = event.object()?;
        let created = event.created_at()?;
        let kind = owner_kind_from_metadata(&sub.metadata);

        let previous = bounded(
            self.store_timeout,
            self.subscriptions.get_by_stripe_subscription_id(kind, &sub.id),
        )
        .await?;

        let deleted = bounded(
            self.store_timeout,
            self.subscriptions
                .mark_deleted(kind, &sub.id, self.plans.free_plan_name(), created),
        )
        .await?;

        match deleted {
            Some(row) => {
                info!(
                    stripe_subscription_id = %sub.id,
                    owner_kind = %kind,
                    "Subscription deleted, downgraded to free"
                );
                self.log_transition(
                    event,
                    &row,
                    previous.map(|p| p.status),
                    json!({"stripe_status": sub.status}),
                )
                .await;
                Ok(Reconciliation::Applied(row))
            }
            None => Ok(Reconciliation::Deferred {
                owner_kind: kind,
                stripe_subscription_id: sub.id,
            }),
        }
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn invoice_payment_failed(&self, event: &ProviderEvent) -> AppResult<Reconciliation> {
        self.invoice_transition(event, InvoiceResult::Failed).await
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn invoice_payment_succeeded(
        &self,
        event: &ProviderEvent,
    ) -> AppResult<Reconciliation> {
        self.invoice_transition(event, InvoiceResult::Succeeded).await
    }

    async fn invoice_transition(
        &self,
        event: &ProviderEvent,
        result: InvoiceResult,
    ) -> AppResult<Reconciliation> {
        let created = event.created_at()?;
        let invoice: InvoiceObject = event.object()?;
        let Some((kind, stripe_subscription_id)) = self.invoice_target(&invoice).await? else {
            debug!("Invoice without subscription, nothing to reconcile");
            return Ok(Reconciliation::Skipped("invoice without subscription"));
        };

        let Some(existing) = bounded(
            self.store_timeout,
            self.subscriptions
                .get_by_stripe_subscription_id(kind, &stripe_subscription_id),
        )
        .await?
        else {
            return Ok(Reconciliation::Deferred {
                owner_kind: kind,
                stripe_subscription_id,
            });
        };

        if existing.is_terminated() {
            debug!(%stripe_subscription_id, "Invoice event for deleted subscription ignored");
            return Ok(Reconciliation::Stale {
                owner_kind: kind,
                stripe_subscription_id,
            });
        }

        let write = match result {
            InvoiceResult::Failed => {
                bounded(
                    self.store_timeout,
                    self.subscriptions
                        .mark_past_due(kind, &stripe_subscription_id, created),
                )
                .await?
            }
            InvoiceResult::Succeeded => {
                bounded(
                    self.store_timeout,
                    self.subscriptions.mark_payment_succeeded(
                        kind,
                        &stripe_subscription_id,
                        created,
                    ),
                )
                .await?
            }
        };

        match write {
            Some(updated) => {
                info!(
                    %stripe_subscription_id,
                    owner_kind = %kind,
                    previous_status = %existing.status,
                    status = %updated.status,
                    "Invoice event applied"
                );
                self.log_transition(event, &updated, Some(existing.status), json!({}))
                    .await;
                Ok(Reconciliation::Applied(updated))
            }
            None => Ok(Reconciliation::Stale {
                owner_kind: kind,
                stripe_subscription_id,
            }),
        }
    }

    /// Owner kind and subscription id for an invoice, asking the provider when
    /// the event does not embed them.
    async fn invoice_target(
        &self,
        invoice: &InvoiceObject,
    ) -> AppResult<Option<(OwnerKind, String)>> {
        let fetched;
        let source = match invoice.subscription_id() {
            Some(_) => invoice,
            None => {
                let Some(invoice_id) = invoice.id.as_deref() else {
                    return Ok(None);
                };
                fetched = self.provider.fetch_invoice(invoice_id).await?;
                &fetched
            }
        };
        let Some(subscription_id) = source.subscription_id() else {
            return Ok(None);
        };

        let kind = match source.subscription_metadata() {
            Some(metadata) => owner_kind_from_metadata(metadata),
            None => {
                let sub = self.provider.fetch_subscription(subscription_id).await?;
                owner_kind_from_metadata(&sub.metadata)
            }
        };
        Ok(Some((kind, subscription_id.to_string())))
    }

    /// Metadata `plan_name`, else the line item's price id, else unchanged.
    async fn resolve_plan(&self, sub: &SubscriptionObject) -> AppResult<Option<String>> {
        if let Some(name) = sub.metadata.get(METADATA_PLAN_NAME) {
            if self.plans.get(name).await?.is_some() {
                return Ok(Some(name.clone()));
            }
            warn!(plan = %name, stripe_subscription_id = %sub.id, "Unknown plan_name in metadata");
        }
        if let Some(price_id) = sub.price_id() {
            if let Some(plan) = self.plans.resolve_price(price_id).await? {
                return Ok(Some(plan.name));
            }
            warn!(
                price_id,
                stripe_subscription_id = %sub.id,
                "CONFIGURATION ERROR: no plan for price id, keeping current plan"
            );
        }
        Ok(None)
    }

    /// Audit logging is best effort and never fails the event.
    async fn log_transition(
        &self,
        event: &ProviderEvent,
        sub: &SubscriptionProfile,
        previous_status: Option<SubscriptionStatus>,
        metadata: serde_json::Value,
    ) {
        let input = CreateSubscriptionEventInput {
            owner_kind: sub.owner.kind,
            subscription_id: sub.id,
            event_type: event.event_type.clone(),
            previous_status,
            new_status: Some(sub.status),
            stripe_event_id: Some(event.id.clone()),
            metadata,
        };
        if let Err(e) = bounded(self.store_timeout, self.events.create(&input)).await {
            warn!(error = %e, event_id = %event.id, "Failed to log subscription event (non-critical)");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum InvoiceResult {
    Failed,
    Succeeded,
}
