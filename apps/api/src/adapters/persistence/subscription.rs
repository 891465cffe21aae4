//! `user_subscriptions` and `team_subscriptions`.
//!
//! The two tables share a shape; the owner column and the team-only `seats`
//! column are the only differences. Every mutation is one conditional
//! statement so concurrent deliveries cannot interleave partial writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::{BillingCycle, Owner, OwnerKind, SubscriptionStatus};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_reconciler::{
        CheckoutLink, ProviderSubscriptionUpdate, SubscriptionRepoTrait,
    },
    domain::entities::subscription::SubscriptionProfile,
};

fn table(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::User => "user_subscriptions",
        OwnerKind::Team => "team_subscriptions",
    }
}

fn owner_col(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::User => "user_id",
        OwnerKind::Team => "team_id",
    }
}

fn select_cols(kind: OwnerKind) -> String {
    let seats = match kind {
        OwnerKind::User => "NULL::INTEGER",
        OwnerKind::Team => "seats",
    };
    format!(
        r#"
        id, {owner} AS owner_id, plan_name, stripe_subscription_id, stripe_customer_id,
        status, billing_cycle, current_period_start, current_period_end,
        cancel_at_period_end, cancelled_at, {seats} AS seats, last_event_at,
        created_at, updated_at
        "#,
        owner = owner_col(kind),
    )
}

fn row_to_profile(kind: OwnerKind, row: &sqlx::postgres::PgRow) -> SubscriptionProfile {
    let id: Uuid = row.get("id");
    let status: String = row.get("status");
    let billing_cycle: String = row.get("billing_cycle");

    SubscriptionProfile {
        id,
        owner: Owner {
            kind,
            id: row.get("owner_id"),
        },
        plan_name: row.get("plan_name"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        stripe_customer_id: row.get("stripe_customer_id"),
        status: status.parse().unwrap_or_else(|_| {
            tracing::warn!(subscription_id = %id, status = %status, "Unknown stored status");
            SubscriptionStatus::PastDue
        }),
        billing_cycle: billing_cycle.parse().unwrap_or_else(|_| {
            tracing::warn!(subscription_id = %id, billing_cycle = %billing_cycle, "Unknown stored billing cycle");
            BillingCycle::Monthly
        }),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        cancelled_at: row.get("cancelled_at"),
        seats: row.get("seats"),
        last_event_at: row.get("last_event_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl SubscriptionRepoTrait for PostgresPersistence {
    async fn get_by_owner(&self, owner: Owner) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE {} = $1",
            select_cols(owner.kind),
            table(owner.kind),
            owner_col(owner.kind)
        ))
        .bind(owner.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(|r| row_to_profile(owner.kind, &r)))
    }

    async fn get_by_stripe_subscription_id(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE stripe_subscription_id = $1",
            select_cols(kind),
            table(kind)
        ))
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(|r| row_to_profile(kind, &r)))
    }

    async fn link_checkout(&self, link: &CheckoutLink) -> AppResult<SubscriptionProfile> {
        let kind = link.owner.kind;
        // Postgres has no per-row variables in ON CONFLICT, so the relink test
        // is repeated for each column.
        let relinked = "s.stripe_subscription_id IS DISTINCT FROM EXCLUDED.stripe_subscription_id";
        let reset_seats = match kind {
            OwnerKind::User => String::new(),
            OwnerKind::Team => format!("seats = CASE WHEN {relinked} THEN NULL ELSE s.seats END,"),
        };

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO {table} AS s
                (id, {owner}, plan_name, stripe_subscription_id, stripe_customer_id,
                 status, billing_cycle, cancel_at_period_end)
            VALUES ($1, $2, $3, $4, $5, 'active', 'monthly', false)
            ON CONFLICT ({owner}) DO UPDATE SET
                plan_name = CASE WHEN {relinked} THEN EXCLUDED.plan_name ELSE s.plan_name END,
                status = CASE WHEN {relinked} THEN 'active' ELSE s.status END,
                billing_cycle = CASE WHEN {relinked} THEN 'monthly' ELSE s.billing_cycle END,
                current_period_start = CASE WHEN {relinked} THEN NULL ELSE s.current_period_start END,
                current_period_end = CASE WHEN {relinked} THEN NULL ELSE s.current_period_end END,
                cancel_at_period_end = CASE WHEN {relinked} THEN false ELSE s.cancel_at_period_end END,
                cancelled_at = CASE WHEN {relinked} THEN NULL ELSE s.cancelled_at END,
                last_event_at = CASE WHEN {relinked} THEN NULL ELSE s.last_event_at END,
                {reset_seats}
                stripe_customer_id = CASE WHEN {relinked}
                    THEN EXCLUDED.stripe_customer_id
                    ELSE COALESCE(EXCLUDED.stripe_customer_id, s.stripe_customer_id) END,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                updated_at = NOW()
            RETURNING {cols}
            "#,
            table = table(kind),
            owner = owner_col(kind),
            cols = select_cols(kind),
        ))
        .bind(Uuid::new_v4())
        .bind(link.owner.id)
        .bind(&link.plan_name)
        .bind(&link.stripe_subscription_id)
        .bind(&link.stripe_customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(kind, &row))
    }

    async fn apply_provider_update(
        &self,
        kind: OwnerKind,
        update: &ProviderSubscriptionUpdate,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let set_seats = match kind {
            OwnerKind::User => "",
            OwnerKind::Team => "seats = COALESCE($10, seats),",
        };

        // Lexicographic (period_end, last_event_at) guard; a row without a
        // period end always yields.
        let sql = format!(
            r#"
            UPDATE {table} SET
                plan_name = COALESCE($2, plan_name),
                stripe_customer_id = COALESCE($3, stripe_customer_id),
                status = $4,
                billing_cycle = $5,
                current_period_start = COALESCE($6, current_period_start),
                current_period_end = COALESCE($7, current_period_end),
                cancel_at_period_end = $8,
                last_event_at = GREATEST(last_event_at, $9),
                {set_seats}
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
              AND cancelled_at IS NULL
              AND (
                current_period_end IS NULL
                OR ($7::TIMESTAMPTZ IS NOT NULL AND (
                    $7 > current_period_end
                    OR ($7 = current_period_end
                        AND (last_event_at IS NULL OR $9 >= last_event_at))
                ))
              )
            RETURNING {cols}
            "#,
            table = table(kind),
            cols = select_cols(kind),
        );

        let mut query = sqlx::query(&sql)
            .bind(&update.stripe_subscription_id)
            .bind(&update.plan_name)
            .bind(&update.stripe_customer_id)
            .bind(update.status.as_ref())
            .bind(update.billing_cycle.as_ref())
            .bind(update.current_period_start)
            .bind(update.current_period_end)
            .bind(update.cancel_at_period_end)
            .bind(update.event_at);
        if kind == OwnerKind::Team {
            query = query.bind(update.seats);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|r| row_to_profile(kind, &r)))
    }

    async fn mark_deleted(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        free_plan_name: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE {table} SET
                status = 'cancelled',
                plan_name = $2,
                cancel_at_period_end = false,
                cancelled_at = COALESCE(cancelled_at, NOW()),
                last_event_at = GREATEST(last_event_at, $3),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING {cols}
            "#,
            table = table(kind),
            cols = select_cols(kind),
        ))
        .bind(stripe_subscription_id)
        .bind(free_plan_name)
        .bind(event_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|r| row_to_profile(kind, &r)))
    }

    async fn mark_past_due(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE {table} SET
                status = 'past_due',
                last_event_at = GREATEST(last_event_at, $2),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
              AND cancelled_at IS NULL
              AND (last_event_at IS NULL OR $2 >= last_event_at)
            RETURNING {cols}
            "#,
            table = table(kind),
            cols = select_cols(kind),
        ))
        .bind(stripe_subscription_id)
        .bind(event_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|r| row_to_profile(kind, &r)))
    }

    async fn mark_payment_succeeded(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
        event_at: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE {table} SET
                status = CASE WHEN status = 'past_due' THEN 'active' ELSE status END,
                last_event_at = GREATEST(last_event_at, $2),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
              AND cancelled_at IS NULL
              AND (last_event_at IS NULL OR $2 >= last_event_at)
            RETURNING {cols}
            "#,
            table = table(kind),
            cols = select_cols(kind),
        ))
        .bind(stripe_subscription_id)
        .bind(event_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|r| row_to_profile(kind, &r)))
    }
}
