use chrono::{DateTime, Utc};
use donelog_types::{BillingCycle, Owner, SubscriptionStatus};
use serde::Serialize;
use uuid::Uuid;

/// A user's or team's subscription row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionProfile {
    pub id: Uuid,
    pub owner: Owner,
    pub plan_name: String,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Seat count, teams only.
    pub seats: Option<i32>,
    /// Provider timestamp of the newest event applied to this row.
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionProfile {
    /// Deleted at the provider. Only checkout for a new subscription revives the row.
    pub fn is_terminated(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Linked by checkout but not yet described by a subscription event.
    pub fn is_provisional(&self) -> bool {
        self.current_period_start.is_none() || self.current_period_end.is_none()
    }

    /// Whether a subscription created/updated event may overwrite this row.
    ///
    /// `(incoming_end, created)` must be lexicographically at least
    /// `(current_period_end, last_event_at)`. A row without a period end always
    /// yields; an incoming event without one never beats a stored end.
    pub fn accepts_update(
        &self,
        incoming_period_end: Option<DateTime<Utc>>,
        created: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        match (self.current_period_end, incoming_period_end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(stored), Some(incoming)) => {
                incoming > stored
                    || (incoming == stored && self.last_event_at.is_none_or(|last| created >= last))
            }
        }
    }

    /// Whether an invoice event created at `created` may change this row.
    pub fn accepts_invoice_event(&self, created: DateTime<Utc>) -> bool {
        !self.is_terminated() && self.last_event_at.is_none_or(|last| created >= last)
    }
}
