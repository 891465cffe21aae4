use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Internal subscription state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    #[default]
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    /// Map a provider status string onto the internal state.
    ///
    /// Anything the provider may invent later lands on `PastDue`, which never
    /// grants a fresh active state.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "trialing" => Self::Trialing,
            "active" => Self::Active,
            "past_due" | "unpaid" => Self::PastDue,
            "canceled" | "incomplete_expired" => Self::Cancelled,
            _ => Self::PastDue,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the owner is still entitled to the subscribed plan.
    pub fn grants_plan(&self) -> bool {
        !self.is_terminated()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// `year` is yearly, everything else monthly.
    pub fn from_interval(interval: &str) -> Self {
        if interval == "year" {
            Self::Yearly
        } else {
            Self::Monthly
        }
    }
}
