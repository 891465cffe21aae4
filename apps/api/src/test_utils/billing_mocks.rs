//! In-memory mock implementations of the billing repository traits and the
//! provider port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::{BillingCycle, Owner, OwnerKind, SubscriptionStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_provider::BillingProviderPort,
        use_cases::{
            billing_webhook::{RecordWebhookEventInput, WebhookEventRepoTrait},
            plan_registry::{SubscriptionPlanRepoTrait, UpsertPlanInput},
            subscription_reconciler::{
                CheckoutLink, CreateSubscriptionEventInput, ProviderSubscriptionUpdate,
                SubscriptionEventRepoTrait, SubscriptionRepoTrait,
            },
            usage_meter::{UsageCounterRepoTrait, UsageKey},
        },
    },
    domain::entities::{
        plan::PlanProfile,
        provider_event::{InvoiceObject, SubscriptionObject},
        subscription::SubscriptionProfile,
        webhook_event::{WebhookEventProfile, WebhookOutcome},
    },
};

/// `GREATEST` as Postgres evaluates it: NULLs are ignored.
fn greatest(a: Option<DateTime<Utc>>, b: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(a.map_or(b, |a| a.max(b)))
}

// ============================================================================
// InMemorySubscriptionPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionPlanRepo {
    pub plans: Mutex<HashMap<String, PlanProfile>>,
}

impl InMemorySubscriptionPlanRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<PlanProfile>) -> Self {
        let map = plans.into_iter().map(|p| (p.name.clone(), p)).collect();
        Self {
            plans: Mutex::new(map),
        }
    }
}

#[async_trait]
impl SubscriptionPlanRepoTrait for InMemorySubscriptionPlanRepo {
    async fn get_by_name(&self, name: &str) -> AppResult<Option<PlanProfile>> {
        Ok(self.plans.lock().unwrap().get(name).cloned())
    }

    async fn get_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PlanProfile>> {
        let plans = self.plans.lock().unwrap();
        let mut matching: Vec<&PlanProfile> =
            plans.values().filter(|p| p.has_price_id(price_id)).collect();
        matching.sort_by_key(|p| (!p.is_active, p.created_at));
        Ok(matching.first().map(|p| (*p).clone()))
    }

    async fn list_active(&self) -> AppResult<Vec<PlanProfile>> {
        let mut plans: Vec<PlanProfile> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.price_monthly_cents
                .cmp(&b.price_monthly_cents)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(plans)
    }

    async fn upsert(&self, input: &UpsertPlanInput) -> AppResult<PlanProfile> {
        let mut plans = self.plans.lock().unwrap();
        let now = Utc::now();
        let (id, created_at) = plans
            .get(&input.name)
            .map(|p| (p.id, p.created_at))
            .unwrap_or((Uuid::new_v4(), now));
        let plan = PlanProfile {
            id,
            name: input.name.clone(),
            display_name: input.display_name.clone(),
            price_monthly_cents: input.price_monthly_cents,
            price_yearly_cents: input.price_yearly_cents,
            currency: input.currency.clone(),
            stripe_price_id_monthly: input.stripe_price_id_monthly.clone(),
            stripe_price_id_yearly: input.stripe_price_id_yearly.clone(),
            features: input.features.clone(),
            is_active: input.is_active,
            created_at,
            updated_at: now,
        };
        plans.insert(plan.name.clone(), plan.clone());
        Ok(plan)
    }

    async fn set_active(&self, name: &str, is_active: bool) -> AppResult<Option<PlanProfile>> {
        let mut plans = self.plans.lock().unwrap();
        Ok(plans.get_mut(name).map(|plan| {
            plan.is_active = is_active;
            plan.updated_at = Utc::now();
            plan.clone()
        }))
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Mirrors the guarded SQL statements of the Postgres adapter.
#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub rows: Mutex<HashMap<Owner, SubscriptionProfile>>,
    fail_next: Mutex<Option<AppError>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<SubscriptionProfile>) -> Self {
        let map = subscriptions.into_iter().map(|s| (s.owner, s)).collect();
        Self {
            rows: Mutex::new(map),
            fail_next: Mutex::new(None),
        }
    }

    pub fn get(&self, owner: Owner) -> Option<SubscriptionProfile> {
        self.rows.lock().unwrap().get(&owner).cloned()
    }

    /// Make the next repository call fail with `error`.
    pub fn fail_next_with(&self, error: AppError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    fn check_failure(&self) -> AppResult<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn update_by_stripe_id(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        apply: impl FnOnce(&mut SubscriptionProfile) -> bool,
    ) -> Option<SubscriptionProfile> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.values_mut().find(|s| {
            s.owner.kind == kind && s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id)
        })?;
        if !apply(row) {
            return None;
        }
        row.updated_at = Utc::now();
        Some(row.clone())
    }
}

#[async_trait]
impl SubscriptionRepoTrait for InMemorySubscriptionRepo {
    async fn get_by_owner(&self, owner: Owner) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(self.get(owner))
    }

    async fn get_by_stripe_subscription_id(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| {
                s.owner.kind == kind
                    && s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id)
            })
            .cloned())
    }

    async fn link_checkout(&self, link: &CheckoutLink) -> AppResult<SubscriptionProfile> {
        self.check_failure()?;
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();

        if let Some(row) = rows.get_mut(&link.owner)
            && row.stripe_subscription_id.as_deref() == Some(link.stripe_subscription_id.as_str())
        {
            if link.stripe_customer_id.is_some() {
                row.stripe_customer_id = link.stripe_customer_id.clone();
            }
            row.updated_at = now;
            return Ok(row.clone());
        }

        let held_elsewhere = rows.values().any(|r| {
            r.owner != link.owner
                && r.owner.kind == link.owner.kind
                && r.stripe_subscription_id.as_deref() == Some(link.stripe_subscription_id.as_str())
        });
        if held_elsewhere {
            return Err(AppError::InvalidInput(
                "A record with this value already exists".into(),
            ));
        }

        let (id, created_at) = rows
            .get(&link.owner)
            .map(|r| (r.id, r.created_at))
            .unwrap_or((Uuid::new_v4(), now));
        let row = SubscriptionProfile {
            id,
            owner: link.owner,
            plan_name: link.plan_name.clone(),
            stripe_subscription_id: Some(link.stripe_subscription_id.clone()),
            stripe_customer_id: link.stripe_customer_id.clone(),
            status: SubscriptionStatus::Active,
            billing_cycle: BillingCycle::Monthly,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            cancelled_at: None,
            seats: None,
            last_event_at: None,
            created_at,
            updated_at: now,
        };
        rows.insert(link.owner, row.clone());
        Ok(row)
    }

    async fn apply_provider_update(
        &self,
        kind: OwnerKind,
        update: &ProviderSubscriptionUpdate,
    ) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(
            self.update_by_stripe_id(kind, &update.stripe_subscription_id, |row| {
                if !row.accepts_update(update.current_period_end, update.event_at) {
                    return false;
                }
                if let Some(plan_name) = &update.plan_name {
                    row.plan_name = plan_name.clone();
                }
                if update.stripe_customer_id.is_some() {
                    row.stripe_customer_id = update.stripe_customer_id.clone();
                }
                row.status = update.status;
                row.billing_cycle = update.billing_cycle;
                row.current_period_start = update.current_period_start.or(row.current_period_start);
                row.current_period_end = update.current_period_end.or(row.current_period_end);
                row.cancel_at_period_end = update.cancel_at_period_end;
                row.last_event_at = greatest(row.last_event_at, update.event_at);
                if kind == OwnerKind::Team {
                    row.seats = update.seats.or(row.seats);
                }
                true
            }),
        )
    }

    async fn mark_deleted(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        free_plan_name: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(self.update_by_stripe_id(kind, stripe_subscription_id, |row| {
            row.status = SubscriptionStatus::Cancelled;
            row.plan_name = free_plan_name.to_string();
            row.cancel_at_period_end = false;
            row.cancelled_at = row.cancelled_at.or(Some(Utc::now()));
            row.last_event_at = greatest(row.last_event_at, event_at);
            true
        }))
    }

    async fn mark_past_due(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(self.update_by_stripe_id(kind, stripe_subscription_id, |row| {
            if !row.accepts_invoice_event(event_at) {
                return false;
            }
            row.status = SubscriptionStatus::PastDue;
            row.last_event_at = greatest(row.last_event_at, event_at);
            true
        }))
    }

    async fn mark_payment_succeeded(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        self.check_failure()?;
        Ok(self.update_by_stripe_id(kind, stripe_subscription_id, |row| {
            if !row.accepts_invoice_event(event_at) {
                return false;
            }
            if row.status == SubscriptionStatus::PastDue {
                row.status = SubscriptionStatus::Active;
            }
            row.last_event_at = greatest(row.last_event_at, event_at);
            true
        }))
    }
}

// ============================================================================
// InMemorySubscriptionEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionEventRepo {
    pub events: Mutex<Vec<CreateSubscriptionEventInput>>,
}

impl InMemorySubscriptionEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CreateSubscriptionEventInput> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionEventRepoTrait for InMemorySubscriptionEventRepo {
    async fn create(&self, input: &CreateSubscriptionEventInput) -> AppResult<()> {
        self.events.lock().unwrap().push(input.clone());
        Ok(())
    }
}

// ============================================================================
// InMemoryWebhookEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    pub rows: Mutex<HashMap<String, WebhookEventProfile>>,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_id: &str) -> Option<WebhookEventProfile> {
        self.rows.lock().unwrap().get(event_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Pretend a row arrived at `received_at`.
    pub fn backdate(&self, event_id: &str, received_at: DateTime<Utc>) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(event_id) {
            row.received_at = received_at;
        }
    }
}

#[async_trait]
impl WebhookEventRepoTrait for InMemoryWebhookEventRepo {
    async fn exists(&self, event_id: &str) -> AppResult<bool> {
        Ok(self.rows.lock().unwrap().contains_key(event_id))
    }

    async fn record(&self, input: &RecordWebhookEventInput) -> AppResult<()> {
        self.rows
            .lock()
            .unwrap()
            .entry(input.event_id.clone())
            .or_insert_with(|| WebhookEventProfile {
                event_id: input.event_id.clone(),
                event_type: input.event_type.clone(),
                outcome: input.outcome,
                owner_kind: input.owner_kind,
                stripe_subscription_id: input.stripe_subscription_id.clone(),
                provider_created_at: input.provider_created_at,
                payload: input.payload.clone(),
                received_at: Utc::now(),
            });
        Ok(())
    }

    async fn list_deferred(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Vec<WebhookEventProfile>> {
        let mut rows: Vec<WebhookEventProfile> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.outcome == WebhookOutcome::Deferred
                    && r.owner_kind == Some(kind)
                    && r.stripe_subscription_id.as_deref() == Some(stripe_subscription_id)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.provider_created_at, r.received_at));
        Ok(rows)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, r| r.received_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

// ============================================================================
// InMemoryUsageCounterRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUsageCounterRepo {
    pub counts: Mutex<HashMap<UsageKey, u64>>,
}

impl InMemoryUsageCounterRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageCounterRepoTrait for InMemoryUsageCounterRepo {
    async fn increment(&self, key: &UsageKey, _period_end: DateTime<Utc>) -> AppResult<u64> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn current(&self, key: &UsageKey) -> AppResult<u64> {
        Ok(self.counts.lock().unwrap().get(key).copied().unwrap_or(0))
    }

    async fn set_count(
        &self,
        key: &UsageKey,
        _period_end: DateTime<Utc>,
        count: u64,
    ) -> AppResult<u64> {
        self.counts.lock().unwrap().insert(key.clone(), count);
        Ok(count)
    }
}

// ============================================================================
// StubBillingProvider
// ============================================================================

/// Serves canned provider objects by id and counts lookups.
#[derive(Default)]
pub struct StubBillingProvider {
    subscriptions: Mutex<HashMap<String, Value>>,
    invoices: Mutex<HashMap<String, Value>>,
    subscription_fetches: AtomicUsize,
    invoice_fetches: AtomicUsize,
}

impl StubBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, object: Value) {
        let id = object["id"].as_str().unwrap_or_default().to_string();
        self.subscriptions.lock().unwrap().insert(id, object);
    }

    pub fn add_invoice(&self, object: Value) {
        let id = object["id"].as_str().unwrap_or_default().to_string();
        self.invoices.lock().unwrap().insert(id, object);
    }

    pub fn subscription_fetches(&self) -> usize {
        self.subscription_fetches.load(Ordering::SeqCst)
    }

    pub fn invoice_fetches(&self) -> usize {
        self.invoice_fetches.load(Ordering::SeqCst)
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: Option<Value>) -> AppResult<T> {
    let object = object.ok_or(AppError::NotFound)?;
    serde_json::from_value(object).map_err(|e| AppError::Provider(e.to_string()))
}

#[async_trait]
impl BillingProviderPort for StubBillingProvider {
    async fn fetch_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject> {
        self.subscription_fetches.fetch_add(1, Ordering::SeqCst);
        decode(self.subscriptions.lock().unwrap().get(subscription_id).cloned())
    }

    async fn fetch_invoice(&self, invoice_id: &str) -> AppResult<InvoiceObject> {
        self.invoice_fetches.fetch_add(1, Ordering::SeqCst);
        decode(self.invoices.lock().unwrap().get(invoice_id).cloned())
    }
}
