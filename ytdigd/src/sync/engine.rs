use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ytdig_core::{CatalogError, Channel, Merge, Session, Video, YoutubeClient};

use super::association::AssociationManager;
use super::records::{Record, RecordRef, SUBSCRIPTIONS, User, VIDEOS};
use super::staleness::{StalenessPolicy, now_unix};
use super::store::{Lookup, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("session is not authenticated")]
    Unauthenticated,
    #[error("could not resolve the account's channel: {0}")]
    Identity(#[source] CatalogError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            SyncError::Unauthenticated => true,
            SyncError::Identity(err) | SyncError::Catalog(err) => err.is_unauthorized(),
            SyncError::Store(_) => false,
        }
    }
}

/// What a sync did. Skipped items were logged and left out of their
/// relation; they never abort the sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub refreshed: bool,
    pub cancelled: bool,
    pub channels_synced: usize,
    pub channels_skipped: usize,
    pub videos_synced: usize,
    pub videos_skipped: usize,
    pub failed_appends: usize,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// The user's subscriptions as stored after the sync.
    pub channels: Vec<Channel>,
}

pub struct SyncEngine {
    client: YoutubeClient,
    store: RecordStore,
    associations: AssociationManager,
    policy: StalenessPolicy,
}

impl SyncEngine {
    pub fn new(client: YoutubeClient, store: RecordStore) -> Self {
        let associations = store.associations();
        Self {
            client,
            store,
            associations,
            policy: StalenessPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bring the session user's subscription snapshot up to date if it is
    /// stale, then return what the store holds for it.
    ///
    /// Channels are processed one at a time and each channel's videos one at
    /// a time. Cancellation is checked between items: the item in flight
    /// finishes, nothing new starts, and relations not yet rebuilt keep their
    /// previous members.
    pub async fn sync(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        if !session.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }

        let mut user = self.load_or_create_user(session).await?;
        let mut report = SyncReport::default();

        if self
            .policy
            .is_stale_now(user.subscriptions_updated_at, user.requires_update)
        {
            report.refreshed = true;
            self.refresh(session, &mut user, &mut report, cancel).await?;
        } else {
            debug!(user_id = %user.id, "subscriptions are fresh");
        }

        let channels = self
            .associations
            .dereference::<Channel>(&user.record_ref(), SUBSCRIPTIONS)
            .await?;
        Ok(SyncOutcome { report, channels })
    }

    /// Set the force-refresh flag so the next sync pulls regardless of age.
    /// Returns false when the user has never synced.
    pub async fn request_refresh(&self, user_id: &str) -> Result<bool, StoreError> {
        let Lookup::Found(mut user) = self.store.lookup::<User>(user_id).await? else {
            return Ok(false);
        };
        if !user.requires_update {
            user.requires_update = true;
            user.updated_at = now_unix();
            self.store.replace(&user).await?;
        }
        Ok(true)
    }

    async fn load_or_create_user(&self, session: &Session) -> Result<User, StoreError> {
        let upserted = self
            .store
            .upsert_or_create(&User::from_session(&session.user, now_unix()))
            .await?;
        if upserted.created {
            info!(user_id = %upserted.record.id, "created user");
        }
        Ok(upserted.record)
    }

    async fn refresh(
        &self,
        session: &mut Session,
        user: &mut User,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let channel_id = self
            .client
            .resolve_channel_id(session)
            .await
            .map_err(SyncError::Identity)?;
        user.channel_id = Some(channel_id);

        let subscriptions = self.client.list_subscriptions(session).await?;
        info!(user_id = %user.id, count = subscriptions.len(), "fetched subscriptions");

        let mut members = Vec::with_capacity(subscriptions.len());
        for base in subscriptions {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let channel_id = base.id.clone();
            match self.sync_channel(session, base, report, cancel).await {
                Ok(Some(channel_ref)) => {
                    members.push(channel_ref);
                    report.channels_synced += 1;
                }
                Ok(None) => break,
                Err(SyncError::Catalog(err)) if err.is_item_scoped() => {
                    warn!(channel_id = %channel_id, error = %err, "skipping channel");
                    report.channels_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let now = now_unix();
        user.updated_at = now;
        if report.cancelled {
            warn!(
                user_id = %user.id,
                processed = members.len(),
                "sync cancelled, previous subscription list kept"
            );
            user.requires_update = true;
            self.store.replace(&*user).await?;
            return Ok(());
        }

        let appended = self
            .associations
            .rebuild(&user.record_ref(), SUBSCRIPTIONS, &members)
            .await?;
        report.failed_appends += members.len() - appended;

        user.requires_update = false;
        user.subscriptions_updated_at = Some(now);
        self.store.replace(&*user).await?;
        info!(
            user_id = %user.id,
            channels = appended,
            skipped = report.channels_skipped,
            videos = report.videos_synced,
            "subscriptions refreshed"
        );
        Ok(())
    }

    async fn sync_channel(
        &self,
        session: &Session,
        base: Channel,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<Option<RecordRef>, SyncError> {
        let detail = self.client.channel_details(session, &base.id).await?;
        let channel = self.persist(base.merge(detail)).await?;
        let channel_ref = channel.record_ref();

        let Some(playlist_id) = channel.upload_playlist_id.as_deref() else {
            debug!(channel_id = %channel.id, "channel has no upload playlist");
            return Ok(Some(channel_ref));
        };
        match self
            .sync_videos(session, &channel_ref, playlist_id, report, cancel)
            .await
        {
            Ok(true) => Ok(Some(channel_ref)),
            // Interrupted before the video list was rebuilt.
            Ok(false) => Ok(None),
            // The channel itself is stored; only its video list stays as it was.
            Err(SyncError::Catalog(err)) if err.is_item_scoped() => {
                warn!(channel_id = %channel.id, error = %err, "skipping channel videos");
                Ok(Some(channel_ref))
            }
            Err(err) => Err(err),
        }
    }

    async fn sync_videos(
        &self,
        session: &Session,
        channel_ref: &RecordRef,
        playlist_id: &str,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<bool, SyncError> {
        let listed = self.client.list_playlist_videos(session, playlist_id).await?;

        let mut members = Vec::with_capacity(listed.len());
        for base in listed {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(false);
            }
            let video_id = base.id.clone();
            match self.sync_video(session, base).await {
                Ok(video_ref) => {
                    members.push(video_ref);
                    report.videos_synced += 1;
                }
                Err(SyncError::Catalog(err)) if err.is_item_scoped() => {
                    warn!(channel = %channel_ref, video_id = %video_id, error = %err, "skipping video");
                    report.videos_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let appended = self
            .associations
            .rebuild(channel_ref, VIDEOS, &members)
            .await?;
        report.failed_appends += members.len() - appended;
        debug!(channel = %channel_ref, videos = appended, "channel videos rebuilt");
        Ok(true)
    }

    async fn sync_video(&self, session: &Session, base: Video) -> Result<RecordRef, SyncError> {
        let detail = self.client.video_details(session, &base.id).await?;
        let video = self.persist(base.merge(detail)).await?;
        Ok(video.record_ref())
    }

    /// Create `fetched`, or merge it over the stored record and write the
    /// result back when anything changed.
    async fn persist<T>(&self, fetched: T) -> Result<T, StoreError>
    where
        T: Record + Merge + Clone + PartialEq,
    {
        let upserted = self.store.upsert_or_create(&fetched).await?;
        if upserted.created {
            return Ok(upserted.record);
        }
        let stored = upserted.record;
        let merged = stored.clone().merge(fetched);
        if merged != stored {
            self.store.replace(&merged).await?;
        }
        Ok(merged)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
