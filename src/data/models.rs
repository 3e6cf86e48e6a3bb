//! Cache row models
//!
//! Rust structs representing cache tables. Status and user content are
//! tagged unions, one variant per backend, serialized into blob columns as
//! adjacently tagged JSON. Decoding never fails a page: unrecognized blobs
//! degrade to the `Unknown` variant.

use serde::{Deserialize, Serialize};

use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::{bluesky, mastodon, misskey, vvo, xqt};

// =============================================================================
// Status content
// =============================================================================

/// Protocol-specific status payload
///
/// Notification variants wrap the backend's notification object; Bluesky
/// notifications additionally carry the hydrated subject post resolved by
/// a secondary batched fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StatusContent {
    Mastodon(mastodon::Status),
    MastodonNotification(mastodon::Notification),
    Misskey(misskey::Note),
    MisskeyNotification(misskey::Notification),
    Bluesky(bluesky::PostView),
    BlueskyNotification {
        notification: bluesky::BskyNotification,
        reference: Option<bluesky::PostView>,
    },
    Xqt(xqt::Tweet),
    Vvo(vvo::Status),
    VvoComment(vvo::Comment),
    /// Payload shape this build does not recognize; preserved verbatim
    Unknown(serde_json::Value),
}

impl StatusContent {
    pub fn platform(&self) -> Option<PlatformType> {
        match self {
            Self::Mastodon(_) | Self::MastodonNotification(_) => Some(PlatformType::Mastodon),
            Self::Misskey(_) | Self::MisskeyNotification(_) => Some(PlatformType::Misskey),
            Self::Bluesky(_) | Self::BlueskyNotification { .. } => Some(PlatformType::Bluesky),
            Self::Xqt(_) => Some(PlatformType::Xqt),
            Self::Vvo(_) | Self::VvoComment(_) => Some(PlatformType::Vvo),
            Self::Unknown(_) => None,
        }
    }

    /// Decode a blob column. Total: malformed or unrecognized blobs become
    /// `Unknown` carrying the raw value instead of an error.
    pub fn from_blob(blob: &str) -> Self {
        match serde_json::from_str::<StatusContent>(blob) {
            Ok(content) => content,
            Err(_) => match serde_json::from_str::<serde_json::Value>(blob) {
                Ok(value) => StatusContent::Unknown(value),
                Err(_) => StatusContent::Unknown(serde_json::Value::String(blob.to_string())),
            },
        }
    }

    pub fn to_blob(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// User content
// =============================================================================

/// Protocol-specific user payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum UserContent {
    Mastodon(mastodon::Account),
    Misskey(misskey::UserLite),
    Bluesky(bluesky::ProfileView),
    Xqt(xqt::User),
    Vvo(vvo::User),
    Unknown(serde_json::Value),
}

impl UserContent {
    pub fn from_blob(blob: &str) -> Self {
        match serde_json::from_str::<UserContent>(blob) {
            Ok(content) => content,
            Err(_) => match serde_json::from_str::<serde_json::Value>(blob) {
                Ok(value) => UserContent::Unknown(value),
                Err(_) => UserContent::Unknown(serde_json::Value::String(blob.to_string())),
            },
        }
    }

    pub fn to_blob(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One cached status, owned by the account context that fetched it
#[derive(Debug, Clone)]
pub struct StatusRow {
    pub status_key: MicroblogKey,
    pub account_key: AccountKey,
    pub platform_type: PlatformType,
    pub user_key: Option<MicroblogKey>,
    pub content: StatusContent,
}

/// One cached user, shared across accounts and paging keys
#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_key: MicroblogKey,
    pub platform_type: PlatformType,
    pub name: String,
    pub handle: String,
    pub host: String,
    pub content: UserContent,
}

/// One feed membership entry. `sort_id` is assigned by the store and
/// establishes display order within a paging key; it is never the
/// backend's own ordering field.
#[derive(Debug, Clone)]
pub struct PagingTimelineRow {
    pub account_key: AccountKey,
    pub paging_key: String,
    pub status_key: MicroblogKey,
    pub sort_id: i64,
}

/// A normalized (status, author) pair produced by a mapper, ready for a
/// page write. `sort_offset` is set only by thread mediators that need
/// explicit placement around the focal post.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub status: StatusRow,
    pub user: Option<UserRow>,
    pub sort_offset: Option<i64>,
}

impl CachedEntry {
    pub fn new(status: StatusRow, user: Option<UserRow>) -> Self {
        Self {
            status,
            user,
            sort_offset: None,
        }
    }

    pub fn with_sort_offset(mut self, sort_offset: i64) -> Self {
        self.sort_offset = Some(sort_offset);
        self
    }
}

// =============================================================================
// Lists
// =============================================================================

/// Which list fields a backend can persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListMetaDataType {
    Title,
    Description,
    Avatar,
}

/// Backend-agnostic curated-list descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMetaData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub member_count: Option<i64>,
}

/// One cached list row
#[derive(Debug, Clone)]
pub struct ListRow {
    pub list_key: MicroblogKey,
    pub account_key: AccountKey,
    pub content: ListMetaData,
}

// =============================================================================
// Direct messages
// =============================================================================

/// Protocol-specific DM room payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RoomContent {
    Mastodon(mastodon::Conversation),
    Xqt(xqt::DmConversation),
    Vvo(vvo::MessageRoom),
    Unknown(serde_json::Value),
}

impl RoomContent {
    pub fn from_blob(blob: &str) -> Self {
        match serde_json::from_str::<RoomContent>(blob) {
            Ok(content) => content,
            Err(_) => match serde_json::from_str::<serde_json::Value>(blob) {
                Ok(value) => RoomContent::Unknown(value),
                Err(_) => RoomContent::Unknown(serde_json::Value::String(blob.to_string())),
            },
        }
    }

    pub fn to_blob(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Protocol-specific DM item payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MessageContent {
    Mastodon(mastodon::Status),
    Xqt(xqt::DmMessage),
    Vvo(vvo::Message),
    Unknown(serde_json::Value),
}

impl MessageContent {
    pub fn from_blob(blob: &str) -> Self {
        match serde_json::from_str::<MessageContent>(blob) {
            Ok(content) => content,
            Err(_) => match serde_json::from_str::<serde_json::Value>(blob) {
                Ok(value) => MessageContent::Unknown(value),
                Err(_) => MessageContent::Unknown(serde_json::Value::String(blob.to_string())),
            },
        }
    }

    pub fn to_blob(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One DM room row
#[derive(Debug, Clone)]
pub struct MessageRoomRow {
    pub room_key: MicroblogKey,
    pub account_key: AccountKey,
    pub content: RoomContent,
}

/// One DM item row. Rooms follow the same sort-id ordering invariant as
/// paging timelines.
#[derive(Debug, Clone)]
pub struct MessageItemRow {
    pub message_key: MicroblogKey,
    pub room_key: MicroblogKey,
    pub account_key: AccountKey,
    pub sort_id: i64,
    pub content: MessageContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_content_blob_roundtrip() {
        let content = StatusContent::Mastodon(mastodon::Status {
            id: Some("1".to_string()),
            uri: None,
            url: None,
            created_at: None,
            account: None,
            content: Some("<p>hi</p>".to_string()),
            spoiler_text: None,
            visibility: Some("public".to_string()),
            sensitive: None,
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            reblog: None,
            replies_count: None,
            reblogs_count: Some(2),
            favourites_count: Some(5),
            favourited: Some(false),
            reblogged: None,
            bookmarked: None,
            media_attachments: None,
            language: None,
            edited_at: None,
        });
        let blob = content.to_blob().unwrap();
        match StatusContent::from_blob(&blob) {
            StatusContent::Mastodon(status) => {
                assert_eq!(status.id.as_deref(), Some("1"));
                assert_eq!(status.favourites_count, Some(5));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_blob_degrades_to_unknown() {
        let blob = r#"{"kind":"frontier_net","data":{"post":"?"}}"#;
        match StatusContent::from_blob(blob) {
            StatusContent::Unknown(value) => {
                assert_eq!(value["kind"], "frontier_net");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn garbage_blob_degrades_to_unknown_string() {
        match StatusContent::from_blob("not json at all") {
            StatusContent::Unknown(serde_json::Value::String(s)) => {
                assert_eq!(s, "not json at all");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
