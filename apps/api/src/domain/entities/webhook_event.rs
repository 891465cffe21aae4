use chrono::{DateTime, Utc};
use donelog_types::OwnerKind;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// How a webhook event was handled, as recorded in the idempotency ledger.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "webhook_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event changed (or confirmed) a subscription row.
    Applied,
    /// Unhandled kind, stale delivery or nothing to do.
    Ignored,
    /// No local row yet; kept for replay once checkout links the subscription.
    Deferred,
    /// Verified but unusable (bad metadata, unknown plan).
    Rejected,
}

/// A ledger row. Written once per provider event id and never updated.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventProfile {
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
    pub owner_kind: Option<OwnerKind>,
    pub stripe_subscription_id: Option<String>,
    pub provider_created_at: DateTime<Utc>,
    /// Full event body, kept only for deferred events.
    pub payload: Option<serde_json::Value>,
    pub received_at: DateTime<Utc>,
}
