//! Bulk deletion of subscriptions.

use futures::future::join_all;

use crate::api::SubscriptionApi;
use crate::error::Result;
use crate::types::{DeleteOutcome, Subscription};

/// Summary of a bulk deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Subscriptions selected for deletion
    pub attempted: usize,
    pub deleted: usize,
    pub already_gone: usize,
    /// Subscription ids that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every subscription the application owns.
pub async fn cleanup_all<A>(api: &A) -> Result<CleanupReport>
where
    A: SubscriptionApi + ?Sized,
{
    delete_matching(api, |_| true).await
}

/// Delete the subscriptions bound to one websocket session.
///
/// The provider's listing decides what exists; subscriptions of other sessions are left alone.
pub async fn cleanup_session<A>(api: &A, session_id: &str) -> Result<CleanupReport>
where
    A: SubscriptionApi + ?Sized,
{
    delete_matching(api, |subscription| subscription.is_bound_to(session_id)).await
}

async fn delete_matching<A, P>(api: &A, predicate: P) -> Result<CleanupReport>
where
    A: SubscriptionApi + ?Sized,
    P: Fn(&Subscription) -> bool,
{
    let targets: Vec<Subscription> = api.list().await?.into_iter().filter(|s| predicate(s)).collect();

    let mut report = CleanupReport {
        attempted: targets.len(),
        ..Default::default()
    };

    let outcomes = join_all(targets.iter().map(|s| api.delete(&s.id))).await;
    for (subscription, outcome) in targets.iter().zip(outcomes) {
        match outcome {
            Ok(DeleteOutcome::Deleted) => report.deleted += 1,
            Ok(DeleteOutcome::AlreadyGone) => report.already_gone += 1,
            Ok(DeleteOutcome::Failed(status)) => report
                .failed
                .push((subscription.id.clone(), format!("status {status}"))),
            Err(e) => {
                tracing::warn!(subscription_id = %subscription.id, error = %e, "failed to delete subscription");
                report.failed.push((subscription.id.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        deleted = report.deleted,
        already_gone = report.already_gone,
        failed = report.failed.len(),
        "subscription cleanup finished"
    );
    Ok(report)
}
