use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ytdig_core::{Channel, SessionUser, Video};

use super::store::StoreError;

/// Relation on a [`User`] listing the channels it subscribes to.
pub const SUBSCRIPTIONS: &str = "subscriptions";
/// Relation on a [`Channel`] listing its uploaded videos.
pub const VIDEOS: &str = "videos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    User,
    Channel,
    Video,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::User => "user",
            Table::Channel => "channel",
            Table::Video => "video",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "user" => Ok(Table::User),
            "channel" => Ok(Table::Channel),
            "video" => Ok(Table::Video),
            other => Err(StoreError::InvalidTable(other.to_string())),
        }
    }
}

/// A `(table, id)` pair addressing one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub table: Table,
    pub id: String,
}

impl RecordRef {
    pub fn new(table: Table, id: impl Into<String>) -> Self {
        Self {
            table,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table.as_str(), self.id)
    }
}

/// A value persisted as a JSON document under `(TABLE, id)`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: Table;

    fn id(&self) -> &str;

    fn record_ref(&self) -> RecordRef {
        RecordRef::new(Self::TABLE, self.id())
    }
}

impl Record for Channel {
    const TABLE: Table = Table::Channel;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Video {
    const TABLE: Table = Table::Video;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Stored account. Its `subscriptions` relation lives in the association
/// table, keyed by this record's reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub subscriptions_updated_at: Option<i64>,
    pub requires_update: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// A first-seen user: no snapshot yet and flagged for refresh.
    pub fn from_session(user: &SessionUser, now: i64) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            channel_id: None,
            subscriptions_updated_at: None,
            requires_update: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for User {
    const TABLE: Table = Table::User;

    fn id(&self) -> &str {
        &self.id
    }
}
