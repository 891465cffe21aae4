use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::features::FeatureKey;

/// Metrics counted per period by the usage meter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsageMetric {
    Messages,
    Tasks,
    Reports,
}

impl UsageMetric {
    pub const ALL: [UsageMetric; 3] = [UsageMetric::Messages, UsageMetric::Tasks, UsageMetric::Reports];

    pub fn feature_key(self) -> FeatureKey {
        match self {
            UsageMetric::Messages => FeatureKey::Messages,
            UsageMetric::Tasks => FeatureKey::Tasks,
            UsageMetric::Reports => FeatureKey::Reports,
        }
    }

    /// The metered metric backing `key`, if any.
    pub fn for_feature(key: FeatureKey) -> Option<Self> {
        match key {
            FeatureKey::Messages => Some(UsageMetric::Messages),
            FeatureKey::Tasks => Some(UsageMetric::Tasks),
            FeatureKey::Reports => Some(UsageMetric::Reports),
            _ => None,
        }
    }
}
