//! Shared billing types for Donelog.
//!
//! This crate provides:
//! - The closed set of plan feature keys and their typed values (`PlanFeatures`)
//! - The pure feature gate (`has_feature`, `can_use`, `is_near_limit`, `evaluate`)
//! - Subscription status, billing cycle, owner and usage metric enums
//! - API error codes

mod errors;
mod features;
mod gate;
mod owner;
mod subscription;
mod usage;

pub use errors::{ErrorCode, FeatureError};
pub use features::{FeatureKey, FeatureKind, FeatureValue, Limit, PlanFeatures, UNLIMITED};
pub use gate::{GateDecision, WARNING_THRESHOLD_PERCENT, can_use, evaluate, has_feature, is_near_limit};
pub use owner::{Owner, OwnerKind};
pub use subscription::{BillingCycle, SubscriptionStatus};
pub use usage::UsageMetric;
