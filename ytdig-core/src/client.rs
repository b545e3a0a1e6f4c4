use std::collections::HashSet;

use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::{
    Channel, ChannelItem, ItemPage, OwnChannelItem, PlaylistItem, SubscriptionItem, Video,
    VideoItem,
};
use crate::session::Session;

pub const DEFAULT_BASE_URL: &str = "https://youtube.googleapis.com";
/// Largest `maxResults` the catalog accepts on listing endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("catalog returned {code}: {message}")]
    Upstream { code: u16, message: String },
    #[error("pagination protocol violated: {0}")]
    Protocol(String),
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response carried no items for {0}")]
    MissingItem(String),
}

impl CatalogError {
    /// Errors confined to the single resource being fetched. A sync may skip
    /// that resource and carry on; every other error ends the sync.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            CatalogError::Upstream { .. } | CatalogError::Decode(_) | CatalogError::MissingItem(_)
        )
    }

    /// The catalog rejected the bearer token itself.
    pub fn is_unauthorized(&self) -> bool {
        self.upstream_status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            CatalogError::Upstream { code, .. } => StatusCode::from_u16(*code).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Read-only client for the subscription catalog.
///
/// The client holds no credentials: every call is authorized with the bearer
/// token of the [`Session`] it is given.
#[derive(Clone)]
pub struct YoutubeClient {
    http: Client,
    base_url: Url,
    page_size: u32,
    max_pages: usize,
}

impl YoutubeClient {
    pub fn new() -> Result<Self, CatalogError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// GET `url` with bearer authorization and decode the body.
    ///
    /// A body carrying an `error` object becomes [`CatalogError::Upstream`]
    /// whatever the HTTP status; a failure to get any response at all is
    /// [`CatalogError::Transport`].
    pub async fn fetch_authorized<T: DeserializeOwned>(
        &self,
        url: Url,
        access_token: &str,
    ) -> Result<T, CatalogError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(CatalogError::Upstream {
                    code: status.as_u16(),
                    message: body,
                });
            }
            Err(err) => return Err(CatalogError::Decode(err)),
        };

        if let Some(error) = value.get("error") {
            let payload = serde_json::from_value::<ErrorPayload>(error.clone()).unwrap_or_default();
            return Err(CatalogError::Upstream {
                code: payload.code.unwrap_or(status.as_u16()),
                message: payload.message.unwrap_or_else(|| error.to_string()),
            });
        }
        if !status.is_success() {
            return Err(CatalogError::Upstream {
                code: status.as_u16(),
                message: body,
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Follow `nextPageToken` until the listing is exhausted and return every
    /// item in response order.
    ///
    /// A token seen twice, or more than the configured number of pages, is a
    /// [`CatalogError::Protocol`] error.
    pub async fn list_paginated<T: DeserializeOwned>(
        &self,
        url: &Url,
        access_token: &str,
    ) -> Result<Vec<T>, CatalogError> {
        let mut items = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut page_token: Option<String> = None;

        for page_number in 1..=self.max_pages {
            let mut page_url = url.clone();
            if let Some(token) = &page_token {
                page_url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: ItemPage<T> = self.fetch_authorized(page_url, access_token).await?;
            debug!(
                path = url.path(),
                page = page_number,
                items = page.items.len(),
                "fetched page"
            );
            items.extend(page.items);

            let Some(token) = page.next_page_token.filter(|token| !token.is_empty()) else {
                return Ok(items);
            };
            if !seen_tokens.insert(token.clone()) {
                return Err(CatalogError::Protocol(format!(
                    "page token {token:?} repeated"
                )));
            }
            page_token = Some(token);
        }

        Err(CatalogError::Protocol(format!(
            "listing did not end within {} pages",
            self.max_pages
        )))
    }

    /// Return the signed-in account's own channel id, looking it up once and
    /// caching it on the session.
    pub async fn resolve_channel_id(&self, session: &mut Session) -> Result<String, CatalogError> {
        if let Some(channel_id) = session.channel_id.as_ref().filter(|id| !id.is_empty()) {
            return Ok(channel_id.clone());
        }

        let mut url = self.endpoint("/youtube/v3/channels")?;
        url.query_pairs_mut()
            .append_pair("part", "id")
            .append_pair("mine", "true");
        let page: ItemPage<OwnChannelItem> =
            self.fetch_authorized(url, &session.access_token).await?;
        let channel_id = page
            .items
            .into_iter()
            .next()
            .map(|item| item.id)
            .ok_or_else(|| CatalogError::MissingItem("own channel".to_string()))?;

        session.channel_id = Some(channel_id.clone());
        Ok(channel_id)
    }

    /// Every channel the signed-in account subscribes to, with snippet fields
    /// only.
    pub async fn list_subscriptions(
        &self,
        session: &mut Session,
    ) -> Result<Vec<Channel>, CatalogError> {
        let channel_id = self.resolve_channel_id(session).await?;
        let mut url = self.endpoint("/youtube/v3/subscriptions")?;
        url.query_pairs_mut()
            .append_pair("part", "snippet,contentDetails")
            .append_pair("maxResults", &self.page_size.to_string())
            .append_pair("channelId", &channel_id);
        let items: Vec<SubscriptionItem> =
            self.list_paginated(&url, &session.access_token).await?;
        Ok(items.into_iter().map(Channel::from).collect())
    }

    /// Statistics and the upload playlist of a single channel.
    pub async fn channel_details(
        &self,
        session: &Session,
        channel_id: &str,
    ) -> Result<Channel, CatalogError> {
        let mut url = self.endpoint("/youtube/v3/channels")?;
        url.query_pairs_mut()
            .append_pair("part", "snippet,contentDetails,statistics")
            .append_pair("id", channel_id);
        let page: ItemPage<ChannelItem> = self.fetch_authorized(url, &session.access_token).await?;
        page.items
            .into_iter()
            .next()
            .map(Channel::from)
            .ok_or_else(|| CatalogError::MissingItem(format!("channel {channel_id}")))
    }

    /// Every item of a playlist, with snippet and status fields only.
    pub async fn list_playlist_videos(
        &self,
        session: &Session,
        playlist_id: &str,
    ) -> Result<Vec<Video>, CatalogError> {
        let mut url = self.endpoint("/youtube/v3/playlistItems")?;
        url.query_pairs_mut()
            .append_pair("part", "id,contentDetails,snippet,status")
            .append_pair("maxResults", &self.page_size.to_string())
            .append_pair("playlistId", playlist_id);
        let items: Vec<PlaylistItem> = self.list_paginated(&url, &session.access_token).await?;
        Ok(items.into_iter().map(Video::from).collect())
    }

    /// Statistics, content details and topics of a single video.
    pub async fn video_details(
        &self,
        session: &Session,
        video_id: &str,
    ) -> Result<Video, CatalogError> {
        let mut url = self.endpoint("/youtube/v3/videos")?;
        url.query_pairs_mut()
            .append_pair("part", "snippet,contentDetails,statistics,topicDetails")
            .append_pair("id", video_id);
        let page: ItemPage<VideoItem> = self.fetch_authorized(url, &session.access_token).await?;
        page.items
            .into_iter()
            .next()
            .map(Video::from)
            .ok_or_else(|| CatalogError::MissingItem(format!("video {video_id}")))
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Ok(self.base_url.join(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_scoped_errors_are_skippable() {
        let upstream = CatalogError::Upstream {
            code: 403,
            message: "quotaExceeded".into(),
        };
        assert!(upstream.is_item_scoped());
        assert_eq!(upstream.upstream_status(), Some(StatusCode::FORBIDDEN));
        assert!(CatalogError::MissingItem("video v1".into()).is_item_scoped());
        assert!(!CatalogError::Protocol("loop".into()).is_item_scoped());
        assert!(
            CatalogError::Upstream {
                code: 401,
                message: "Invalid Credentials".into()
            }
            .is_unauthorized()
        );
    }

    #[test]
    fn page_size_is_clamped_to_catalog_limit() {
        let client = YoutubeClient::with_base_url("http://localhost")
            .unwrap()
            .with_page_size(500);
        assert_eq!(client.page_size, DEFAULT_PAGE_SIZE);
        let client = client.with_page_size(0);
        assert_eq!(client.page_size, 1);
    }
}
