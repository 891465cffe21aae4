//! Builders for signed provider webhook payloads.

use donelog_types::{Owner, OwnerKind};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value, json};
use sha2::Sha256;

use crate::domain::entities::provider_event::{
    METADATA_PLAN_NAME, METADATA_TEAM_ID, METADATA_USER_ID, ProviderEvent,
};

/// `Stripe-Signature` header value for `body` signed with `secret` at `timestamp`.
pub fn sign_webhook_payload(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

pub fn event_json(event_type: &str, event_id: &str, created: i64, object: Value) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": { "object": object },
    })
}

pub fn provider_event(event_type: &str, event_id: &str, created: i64, object: Value) -> ProviderEvent {
    serde_json::from_value(event_json(event_type, event_id, created, object)).unwrap()
}

/// Subscription metadata naming `owner` and, optionally, the plan.
pub fn owner_metadata(owner: Owner, plan_name: Option<&str>) -> Value {
    let mut metadata = Map::new();
    let key = match owner.kind {
        OwnerKind::User => METADATA_USER_ID,
        OwnerKind::Team => METADATA_TEAM_ID,
    };
    metadata.insert(key.to_string(), Value::String(owner.id.to_string()));
    if let Some(plan_name) = plan_name {
        metadata.insert(METADATA_PLAN_NAME.to_string(), Value::String(plan_name.to_string()));
    }
    Value::Object(metadata)
}

pub fn checkout_event_json(
    event_id: &str,
    created: i64,
    owner: Owner,
    plan_name: &str,
    stripe_subscription_id: &str,
) -> Value {
    event_json(
        "checkout.session.completed",
        event_id,
        created,
        json!({
            "id": format!("cs_{event_id}"),
            "object": "checkout.session",
            "mode": "subscription",
            "customer": "cus_test",
            "subscription": stripe_subscription_id,
            "metadata": owner_metadata(owner, Some(plan_name)),
        }),
    )
}

pub fn checkout_event(
    event_id: &str,
    created: i64,
    owner: Owner,
    plan_name: &str,
    stripe_subscription_id: &str,
) -> ProviderEvent {
    serde_json::from_value(checkout_event_json(
        event_id,
        created,
        owner,
        plan_name,
        stripe_subscription_id,
    ))
    .unwrap()
}

/// A subscription object on the monthly pro price with one seat.
pub fn subscription_object(
    stripe_subscription_id: &str,
    status: &str,
    period_start: i64,
    period_end: i64,
    metadata: Value,
) -> Value {
    json!({
        "id": stripe_subscription_id,
        "object": "subscription",
        "customer": "cus_test",
        "status": status,
        "current_period_start": period_start,
        "current_period_end": period_end,
        "cancel_at_period_end": false,
        "metadata": metadata,
        "items": {
            "object": "list",
            "data": [{
                "price": {"id": "price_pro_monthly", "recurring": {"interval": "month"}},
                "quantity": 1
            }]
        }
    })
}

pub fn subscription_event(
    event_type: &str,
    event_id: &str,
    created: i64,
    object: Value,
) -> ProviderEvent {
    provider_event(event_type, event_id, created, object)
}

/// An invoice carrying its subscription details the way current API
/// versions nest them.
pub fn invoice_object(stripe_subscription_id: &str, metadata: Value) -> Value {
    json!({
        "id": format!("in_{stripe_subscription_id}"),
        "object": "invoice",
        "customer": "cus_test",
        "parent": {
            "type": "subscription_details",
            "subscription_details": {
                "subscription": stripe_subscription_id,
                "metadata": metadata,
            }
        }
    })
}

pub fn invoice_event(
    event_type: &str,
    event_id: &str,
    created: i64,
    stripe_subscription_id: &str,
    metadata: Value,
) -> ProviderEvent {
    provider_event(
        event_type,
        event_id,
        created,
        invoice_object(stripe_subscription_id, metadata),
    )
}
