use tokio_util::sync::CancellationToken;
use tracing::warn;
use ytdig_core::{Channel, Session};

use crate::sync::engine::{SyncEngine, SyncError};

/// The channels the session's account subscribes to, refreshed first when
/// the stored snapshot is stale.
///
/// Without an authenticated session this fails with
/// [`SyncError::Unauthenticated`] and returns no data. A catalog that
/// rejects the bearer token at any step is reported the same way.
pub async fn current_subscriptions(
    engine: &SyncEngine,
    session: Option<&mut Session>,
    cancel: &CancellationToken,
) -> Result<Vec<Channel>, SyncError> {
    let Some(session) = session.filter(|session| session.is_authenticated()) else {
        return Err(SyncError::Unauthenticated);
    };

    match engine.sync(session, cancel).await {
        Ok(outcome) => Ok(outcome.channels),
        Err(err) if err.is_unauthenticated() => {
            warn!(error = %err, "catalog rejected the session");
            Err(SyncError::Unauthenticated)
        }
        Err(err) => Err(err),
    }
}
