use chrono::{DateTime, Utc};
use donelog_types::PlanFeatures;
use serde::Serialize;
use uuid::Uuid;

/// A catalog plan. Identity is the `name` slug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanProfile {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
    pub currency: String,
    pub stripe_price_id_monthly: Option<String>,
    pub stripe_price_id_yearly: Option<String>,
    pub features: PlanFeatures,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanProfile {
    pub fn has_price_id(&self, price_id: &str) -> bool {
        self.stripe_price_id_monthly.as_deref() == Some(price_id)
            || self.stripe_price_id_yearly.as_deref() == Some(price_id)
    }
}
