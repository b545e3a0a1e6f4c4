use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Thumbnail set keyed the way the catalog keys it. Every size is optional:
/// the catalog only returns the sizes it has rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxres: Option<Thumbnail>,
}

/// Field-level combination of two partial shapes of the same record.
///
/// The merge is shallow and right-biased: every field present on `detail`
/// replaces the one on `self`, absent fields keep their current value. The
/// identity of `self` is kept.
pub trait Merge: Sized {
    fn merge(self, detail: Self) -> Self;
}

/// Canonical channel record.
///
/// Subscription listings fill the snippet fields, channel details fill the
/// counters and the upload playlist. [`Merge`] combines the two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_playlist_id: Option<String>,
}

impl Channel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl Merge for Channel {
    fn merge(self, detail: Channel) -> Channel {
        Channel {
            id: self.id,
            title: detail.title.or(self.title),
            description: detail.description.or(self.description),
            thumbnails: detail.thumbnails.or(self.thumbnails),
            custom_url: detail.custom_url.or(self.custom_url),
            published_at: detail.published_at.or(self.published_at),
            subscriber_count: detail.subscriber_count.or(self.subscriber_count),
            video_count: detail.video_count.or(self.video_count),
            view_count: detail.view_count.or(self.view_count),
            upload_playlist_id: detail.upload_playlist_id.or(self.upload_playlist_id),
        }
    }
}

/// Canonical video record. Playlist listings fill the snippet and status
/// fields, video details fill statistics, content details and topics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl Video {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl Merge for Video {
    fn merge(self, detail: Video) -> Video {
        Video {
            id: self.id,
            title: detail.title.or(self.title),
            description: detail.description.or(self.description),
            published_at: detail.published_at.or(self.published_at),
            thumbnails: detail.thumbnails.or(self.thumbnails),
            position: detail.position.or(self.position),
            privacy_status: detail.privacy_status.or(self.privacy_status),
            duration: detail.duration.or(self.duration),
            view_count: detail.view_count.or(self.view_count),
            like_count: detail.like_count.or(self.like_count),
            comment_count: detail.comment_count.or(self.comment_count),
            tags: detail.tags.or(self.tags),
            category_id: detail.category_id.or(self.category_id),
            topics: detail.topics.or(self.topics),
        }
    }
}

// Wire shapes. Only the fields the canonical records consume are declared.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnChannelItem {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItem {
    snippet: SubscriptionSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionSnippet {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnails: Option<Thumbnails>,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    channel_id: String,
}

impl From<SubscriptionItem> for Channel {
    fn from(item: SubscriptionItem) -> Self {
        let snippet = item.snippet;
        Channel {
            id: snippet.resource_id.channel_id,
            title: snippet.title,
            description: snippet.description,
            thumbnails: snippet.thumbnails,
            ..Channel::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelItem {
    id: String,
    #[serde(default)]
    snippet: Option<ChannelSnippet>,
    #[serde(default)]
    statistics: Option<ChannelStatistics>,
    #[serde(default)]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    #[serde(default)]
    custom_url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    #[serde(default, deserialize_with = "opt_count")]
    view_count: Option<u64>,
    #[serde(default, deserialize_with = "opt_count")]
    subscriber_count: Option<u64>,
    #[serde(default, deserialize_with = "opt_count")]
    video_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    #[serde(default)]
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    #[serde(default)]
    uploads: Option<String>,
}

impl From<ChannelItem> for Channel {
    fn from(item: ChannelItem) -> Self {
        let statistics = item.statistics.unwrap_or_default();
        let (custom_url, published_at) = item
            .snippet
            .map(|s| (s.custom_url, s.published_at))
            .unwrap_or_default();
        Channel {
            id: item.id,
            custom_url,
            published_at,
            subscriber_count: statistics.subscriber_count,
            video_count: statistics.video_count,
            view_count: statistics.view_count,
            upload_playlist_id: item
                .content_details
                .and_then(|d| d.related_playlists)
                .and_then(|p| p.uploads),
            ..Channel::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistItem {
    snippet: PlaylistItemSnippet,
    content_details: PlaylistItemContentDetails,
    #[serde(default)]
    status: Option<PlaylistItemStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Option<Thumbnails>,
    #[serde(default)]
    position: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemStatus {
    #[serde(default)]
    privacy_status: Option<String>,
}

impl From<PlaylistItem> for Video {
    fn from(item: PlaylistItem) -> Self {
        let snippet = item.snippet;
        Video {
            id: item.content_details.video_id,
            title: snippet.title,
            description: snippet.description,
            published_at: snippet.published_at,
            thumbnails: snippet.thumbnails,
            position: snippet.position,
            privacy_status: item.status.and_then(|s| s.privacy_status),
            ..Video::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Option<VideoSnippet>,
    #[serde(default)]
    content_details: Option<VideoContentDetails>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
    #[serde(default)]
    topic_details: Option<TopicDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "opt_count")]
    view_count: Option<u64>,
    #[serde(default, deserialize_with = "opt_count")]
    like_count: Option<u64>,
    #[serde(default, deserialize_with = "opt_count")]
    comment_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicDetails {
    #[serde(default)]
    topic_categories: Option<Vec<String>>,
}

impl From<VideoItem> for Video {
    fn from(item: VideoItem) -> Self {
        let snippet = item.snippet.unwrap_or_default();
        let statistics = item.statistics.unwrap_or_default();
        Video {
            id: item.id,
            duration: item.content_details.and_then(|d| d.duration),
            view_count: statistics.view_count,
            like_count: statistics.like_count,
            comment_count: statistics.comment_count,
            tags: snippet.tags,
            category_id: snippet.category_id,
            topics: item.topic_details.and_then(|t| t.topic_categories),
            ..Video::default()
        }
    }
}

/// Counters arrive as decimal strings (`"1024"`), occasionally as numbers.
fn opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(value)) => Ok(Some(value)),
        Some(Count::Text(value)) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
