//! Pure feature gate.
//!
//! Every function here is synchronous, allocation-free and side-effect-free so
//! it can run on the request path (or in a UI) without suspension.

use serde::Serialize;

use crate::features::{FeatureKey, FeatureValue, Limit, PlanFeatures};

/// Usage at or above this percentage of a finite limit raises a warning.
pub const WARNING_THRESHOLD_PERCENT: u64 = 90;

/// Whether the plan grants `key` at all.
///
/// Flags return their value, limits are granted when unlimited or above zero,
/// lists when non-empty. Absent keys are denied.
pub fn has_feature(features: &PlanFeatures, key: FeatureKey) -> bool {
    match features.get(key) {
        Some(FeatureValue::Flag(enabled)) => enabled,
        Some(FeatureValue::Limit(Limit::Unlimited)) => true,
        Some(FeatureValue::Limit(Limit::Max(max))) => max > 0,
        Some(FeatureValue::List(items)) => !items.is_empty(),
        None => false,
    }
}

/// Whether one more use of `key` is allowed at `current_usage`.
///
/// Non-numeric keys ignore usage and delegate to [`has_feature`].
pub fn can_use(features: &PlanFeatures, key: FeatureKey, current_usage: u64) -> bool {
    match features.get(key) {
        Some(FeatureValue::Limit(limit)) => limit.allows(current_usage),
        _ => has_feature(features, key),
    }
}

/// Whether usage is close to (but still under) a finite limit.
pub fn is_near_limit(features: &PlanFeatures, key: FeatureKey, current_usage: u64) -> bool {
    match features.limit(key) {
        Some(Limit::Max(max)) => {
            current_usage < max
                && u128::from(current_usage) * 100
                    >= u128::from(max) * u128::from(WARNING_THRESHOLD_PERCENT)
        }
        _ => false,
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    /// Allowed, but close enough to the limit that the caller should warn.
    AllowedWithWarning { used: u64, limit: u64 },
    UpgradeRequired,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, GateDecision::UpgradeRequired)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, GateDecision::AllowedWithWarning { .. })
    }
}

pub fn evaluate(features: &PlanFeatures, key: FeatureKey, current_usage: u64) -> GateDecision {
    if !can_use(features, key, current_usage) {
        return GateDecision::UpgradeRequired;
    }
    match features.limit(key) {
        Some(Limit::Max(max)) if is_near_limit(features, key, current_usage) => {
            GateDecision::AllowedWithWarning {
                used: current_usage,
                limit: max,
            }
        }
        _ => GateDecision::Allowed,
    }
}
