use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeleteOutcome, Subscription, SubscriptionRequest};

/// Operations the session layer needs from the subscription endpoints.
///
/// Implementations authenticate every call. [`SubscriptionClient`](crate::SubscriptionClient)
/// is the HTTP implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    /// Make sure a usable credential exists before a session starts, refreshing it if needed.
    async fn ensure_credentials(&self) -> Result<()>;

    /// Id of the user the credential belongs to.
    async fn current_user_id(&self) -> Result<String>;

    /// Create a subscription. Succeeds only when the provider accepts it.
    async fn register(&self, request: &SubscriptionRequest) -> Result<Subscription>;

    /// All subscriptions owned by the application, across every page.
    async fn list(&self) -> Result<Vec<Subscription>>;

    /// Delete a subscription by id.
    ///
    /// Status failures are reported through [`DeleteOutcome`]; only transport or
    /// authorization failures are errors.
    async fn delete(&self, id: &str) -> Result<DeleteOutcome>;
}
