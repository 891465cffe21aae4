use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use donelog_types::BillingCycle;
use serde::Serialize;

use super::subscription::SubscriptionProfile;

/// Half-open window `[start, end)` that usage is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsagePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsagePeriod {
    /// Calendar month (UTC) containing `now`.
    pub fn calendar_month(now: DateTime<Utc>) -> Self {
        let start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
        Self { start, end }
    }

    /// The counting window for an owner with (or without) a subscription row.
    ///
    /// - Monthly cycle with a known period containing `now`: the provider period.
    /// - Yearly cycle, or a monthly period that has lapsed without a renewal
    ///   event: the monthly window anchored at `current_period_start` that
    ///   contains `now`.
    /// - No row, a provisional row or a cancelled row: the calendar month.
    pub fn for_subscription(sub: Option<&SubscriptionProfile>, now: DateTime<Utc>) -> Self {
        let Some(sub) = sub else {
            return Self::calendar_month(now);
        };
        if !sub.status.grants_plan() || sub.is_terminated() {
            return Self::calendar_month(now);
        }
        let (Some(start), Some(end)) = (sub.current_period_start, sub.current_period_end) else {
            return Self::calendar_month(now);
        };

        if sub.billing_cycle == BillingCycle::Monthly && start <= now && now < end {
            return Self { start, end };
        }

        Self::monthly_window(start, now).unwrap_or_else(|| Self::calendar_month(now))
    }

    /// Monthly window anchored at `anchor` containing `now`.
    ///
    /// Each boundary is `anchor + n months` (never chained), so a period
    /// anchored on the 31st clamps to shorter months and returns to the 31st.
    fn monthly_window(anchor: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        if now < anchor {
            return None;
        }
        let months_between = (now.year() - anchor.year()) * 12 + now.month() as i32
            - anchor.month() as i32;
        let mut n = u32::try_from(months_between).ok()?;
        let mut start = anchor.checked_add_months(Months::new(n))?;
        if start > now {
            n = n.checked_sub(1)?;
            start = anchor.checked_add_months(Months::new(n))?;
        }
        let end = anchor.checked_add_months(Months::new(n + 1))?;
        Some(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}
