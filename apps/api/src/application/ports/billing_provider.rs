use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::provider_event::{InvoiceObject, SubscriptionObject},
};

/// Read access to the payment provider's API.
///
/// Used when an event does not carry everything the reconciler needs inline
/// (invoice events without embedded subscription details).
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    async fn fetch_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject>;

    async fn fetch_invoice(&self, invoice_id: &str) -> AppResult<InvoiceObject>;
}
