//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use donelog_types::{BillingCycle, Limit, Owner, PlanFeatures, SubscriptionStatus};
use uuid::Uuid;

use crate::domain::entities::{plan::PlanProfile, subscription::SubscriptionProfile};

/// Create a test plan with sensible defaults.
pub fn create_test_plan(name: &str, overrides: impl FnOnce(&mut PlanProfile)) -> PlanProfile {
    let mut plan = PlanProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        price_monthly_cents: 0,
        price_yearly_cents: 0,
        currency: "usd".to_string(),
        stripe_price_id_monthly: None,
        stripe_price_id_yearly: None,
        features: PlanFeatures::default(),
        is_active: true,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut plan);
    plan
}

/// The free/pro/team catalog the migrations seed.
pub fn standard_plans() -> Vec<PlanProfile> {
    vec![
        create_test_plan("free", |p| {
            p.display_name = "Free".to_string();
            p.features = PlanFeatures {
                messages: Some(Limit::Max(50)),
                tasks: Some(Limit::Max(10)),
                reports: Some(Limit::Max(3)),
                templates: Some(Limit::Max(3)),
                team_members: Some(Limit::Max(1)),
                ai_insights: Some(false),
                advanced_analytics: Some(false),
                priority_support: Some(false),
                export_formats: Some(vec!["csv".to_string()]),
                integrations: Some(vec![]),
            };
        }),
        create_test_plan("pro", |p| {
            p.display_name = "Pro".to_string();
            p.price_monthly_cents = 900;
            p.price_yearly_cents = 9_000;
            p.stripe_price_id_monthly = Some("price_pro_monthly".to_string());
            p.stripe_price_id_yearly = Some("price_pro_yearly".to_string());
            p.features = PlanFeatures {
                messages: Some(Limit::Unlimited),
                tasks: Some(Limit::Unlimited),
                reports: Some(Limit::Max(100)),
                templates: Some(Limit::Max(50)),
                team_members: Some(Limit::Max(1)),
                ai_insights: Some(true),
                advanced_analytics: Some(true),
                priority_support: Some(false),
                export_formats: Some(vec!["csv".to_string(), "pdf".to_string()]),
                integrations: Some(vec!["slack".to_string()]),
            };
        }),
        create_test_plan("team", |p| {
            p.display_name = "Team".to_string();
            p.price_monthly_cents = 2_900;
            p.price_yearly_cents = 29_000;
            p.stripe_price_id_monthly = Some("price_team_monthly".to_string());
            p.stripe_price_id_yearly = Some("price_team_yearly".to_string());
            p.features = PlanFeatures {
                messages: Some(Limit::Unlimited),
                tasks: Some(Limit::Unlimited),
                reports: Some(Limit::Unlimited),
                templates: Some(Limit::Unlimited),
                team_members: Some(Limit::Max(25)),
                ai_insights: Some(true),
                advanced_analytics: Some(true),
                priority_support: Some(true),
                export_formats: Some(vec![
                    "csv".to_string(),
                    "pdf".to_string(),
                    "json".to_string(),
                ]),
                integrations: Some(vec!["slack".to_string(), "github".to_string()]),
            };
        }),
    ]
}

/// Create a test subscription row for `owner` with sensible defaults:
/// an active monthly `pro` subscription linked by checkout but not yet
/// described by a subscription event.
pub fn create_test_subscription(
    owner: Owner,
    overrides: impl FnOnce(&mut SubscriptionProfile),
) -> SubscriptionProfile {
    let mut sub = SubscriptionProfile {
        id: Uuid::new_v4(),
        owner,
        plan_name: "pro".to_string(),
        stripe_subscription_id: Some("sub_test".to_string()),
        stripe_customer_id: Some("cus_test".to_string()),
        status: SubscriptionStatus::Active,
        billing_cycle: BillingCycle::Monthly,
        current_period_start: None,
        current_period_end: None,
        cancel_at_period_end: false,
        cancelled_at: None,
        seats: None,
        last_event_at: None,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut sub);
    sub
}

/// Fixed datetime for reproducible tests.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}
