use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::errors::FeatureError;

/// Stored integer meaning "no limit".
pub const UNLIMITED: i64 = -1;

/// Every feature a plan can grant or limit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKey {
    /// Chat messages logged per period.
    Messages,
    /// Tasks created per period.
    Tasks,
    /// Reports generated per period.
    Reports,
    /// Saved templates.
    Templates,
    /// Seats in a team.
    TeamMembers,
    AiInsights,
    AdvancedAnalytics,
    PrioritySupport,
    ExportFormats,
    Integrations,
}

/// Shape of the value carried by a feature key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Flag,
    Limit,
    List,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 10] = [
        FeatureKey::Messages,
        FeatureKey::Tasks,
        FeatureKey::Reports,
        FeatureKey::Templates,
        FeatureKey::TeamMembers,
        FeatureKey::AiInsights,
        FeatureKey::AdvancedAnalytics,
        FeatureKey::PrioritySupport,
        FeatureKey::ExportFormats,
        FeatureKey::Integrations,
    ];

    pub fn kind(self) -> FeatureKind {
        match self {
            FeatureKey::Messages
            | FeatureKey::Tasks
            | FeatureKey::Reports
            | FeatureKey::Templates
            | FeatureKey::TeamMembers => FeatureKind::Limit,
            FeatureKey::AiInsights | FeatureKey::AdvancedAnalytics | FeatureKey::PrioritySupport => {
                FeatureKind::Flag
            }
            FeatureKey::ExportFormats | FeatureKey::Integrations => FeatureKind::List,
        }
    }

    /// Parse a stored key, rejecting anything outside the known set.
    pub fn parse(key: &str) -> Result<Self, FeatureError> {
        key.parse::<FeatureKey>()
            .map_err(|_| FeatureError::UnknownKey(key.to_string()))
    }
}

/// A numeric plan limit.
///
/// Stored as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    Unlimited,
    Max(u64),
}

impl Limit {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    /// Whether one more unit may be consumed at `usage`.
    pub fn allows(self, usage: u64) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => usage < max,
        }
    }
}

impl TryFrom<i64> for Limit {
    type Error = FeatureError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            UNLIMITED => Ok(Limit::Unlimited),
            v if v >= 0 => Ok(Limit::Max(v as u64)),
            v => Err(FeatureError::InvalidLimit(v)),
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => UNLIMITED,
            Limit::Max(max) => i64::try_from(max).unwrap_or(i64::MAX),
        }
    }
}

/// Borrowed view of a single feature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue<'a> {
    Flag(bool),
    Limit(Limit),
    List(&'a [String]),
}

/// Typed feature map of a plan.
///
/// Absent entries deny access. Unknown keys in stored JSON are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanFeatures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_members: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_analytics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_formats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrations: Option<Vec<String>>,
}

impl PlanFeatures {
    pub fn get(&self, key: FeatureKey) -> Option<FeatureValue<'_>> {
        match key {
            FeatureKey::Messages => self.messages.map(FeatureValue::Limit),
            FeatureKey::Tasks => self.tasks.map(FeatureValue::Limit),
            FeatureKey::Reports => self.reports.map(FeatureValue::Limit),
            FeatureKey::Templates => self.templates.map(FeatureValue::Limit),
            FeatureKey::TeamMembers => self.team_members.map(FeatureValue::Limit),
            FeatureKey::AiInsights => self.ai_insights.map(FeatureValue::Flag),
            FeatureKey::AdvancedAnalytics => self.advanced_analytics.map(FeatureValue::Flag),
            FeatureKey::PrioritySupport => self.priority_support.map(FeatureValue::Flag),
            FeatureKey::ExportFormats => self.export_formats.as_deref().map(FeatureValue::List),
            FeatureKey::Integrations => self.integrations.as_deref().map(FeatureValue::List),
        }
    }

    /// The numeric limit for `key`, if the key is a limit and the plan sets it.
    pub fn limit(&self, key: FeatureKey) -> Option<Limit> {
        match self.get(key) {
            Some(FeatureValue::Limit(limit)) => Some(limit),
            _ => None,
        }
    }

    /// All features set on this plan, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureKey, FeatureValue<'_>)> + '_ {
        FeatureKey::ALL
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }
}
