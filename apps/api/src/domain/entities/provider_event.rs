//! Payment provider (Stripe) event envelope and the payload objects the
//! reconciler reads from it.
//!
//! Only the fields needed for reconciliation are modeled; everything else in
//! the provider's JSON is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use donelog_types::{BillingCycle, Owner, OwnerKind};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};

pub type Metadata = HashMap<String, String>;

pub const METADATA_USER_ID: &str = "user_id";
pub const METADATA_TEAM_ID: &str = "team_id";
pub const METADATA_PLAN_NAME: &str = "plan_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    Unhandled(String),
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.payment_succeeded" | "invoice.paid" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            other => Self::Unhandled(other.to_string()),
        }
    }
}

/// Verified event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds at which the provider created the event.
    pub created: i64,
    pub data: ProviderEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    pub object: serde_json::Value,
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    pub fn created_at(&self) -> AppResult<DateTime<Utc>> {
        timestamp_to_utc(self.created)
            .ok_or_else(|| AppError::MalformedEvent(format!("invalid created {}", self.created)))
    }

    /// Decode `data.object` into the payload type for this event kind.
    pub fn object<T: DeserializeOwned>(&self) -> AppResult<T> {
        T::deserialize(&self.data.object).map_err(|e| {
            AppError::MalformedEvent(format!("{} object: {}", self.event_type, e))
        })
    }
}

pub fn timestamp_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// Table selection: a `team_id` entry makes the owner a team.
pub fn owner_kind_from_metadata(metadata: &Metadata) -> OwnerKind {
    if metadata.contains_key(METADATA_TEAM_ID) {
        OwnerKind::Team
    } else {
        OwnerKind::User
    }
}

/// Resolve the owner from metadata, falling back to `client_reference_id`
/// for users.
pub fn owner_from_metadata(
    metadata: &Metadata,
    client_reference_id: Option<&str>,
) -> AppResult<Owner> {
    let (kind, raw) = match owner_kind_from_metadata(metadata) {
        OwnerKind::Team => (OwnerKind::Team, metadata.get(METADATA_TEAM_ID).map(String::as_str)),
        OwnerKind::User => (
            OwnerKind::User,
            metadata
                .get(METADATA_USER_ID)
                .map(String::as_str)
                .or(client_reference_id),
        ),
    };
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::MalformedEvent("missing owner id in metadata".into()))?;
    let id = Uuid::parse_str(raw)
        .map_err(|_| AppError::MalformedEvent(format!("invalid {kind} id {raw:?}")))?;
    Ok(Owner { kind, id })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<ItemPrice>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPrice {
    pub id: String,
    #[serde(default)]
    pub recurring: Option<PriceRecurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecurring {
    pub interval: String,
}

impl SubscriptionObject {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }

    pub fn billing_cycle(&self) -> BillingCycle {
        self.first_item()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.recurring.as_ref())
            .map(|recurring| BillingCycle::from_interval(&recurring.interval))
            .unwrap_or_default()
    }

    pub fn quantity(&self) -> Option<i32> {
        self.first_item()
            .and_then(|item| item.quantity)
            .and_then(|q| i32::try_from(q).ok())
    }

    /// Period bounds, read from the subscription or (newer API versions)
    /// from its first item.
    pub fn period(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let item = self.first_item();
        let start = self
            .current_period_start
            .or_else(|| item.and_then(|i| i.current_period_start))
            .and_then(timestamp_to_utc);
        let end = self
            .current_period_end
            .or_else(|| item.and_then(|i| i.current_period_end))
            .and_then(timestamp_to_utc);
        (start, end)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl InvoiceObject {
    fn details(&self) -> Option<&SubscriptionDetails> {
        self.parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref())
            .or(self.subscription_details.as_ref())
    }

    /// Subscription id, inline or from the embedded subscription details.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or_else(|| self.details().and_then(|d| d.subscription.as_deref()))
    }

    /// Embedded subscription metadata, when the provider included any.
    pub fn subscription_metadata(&self) -> Option<&Metadata> {
        self.details()
            .and_then(|d| d.metadata.as_ref())
            .filter(|m| !m.is_empty())
    }
}
