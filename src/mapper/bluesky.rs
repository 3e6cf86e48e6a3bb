//! Bluesky wire-to-row mapping
//!
//! Statuses are keyed by AT-URI, users by DID, both scoped to the
//! viewer's service host.

use crate::data::{CachedEntry, StatusContent, StatusRow, UserContent, UserRow};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::bluesky::{BskyNotification, FeedViewPost, PostView, ProfileView};

pub fn post_entry(account_key: &AccountKey, post: &PostView) -> Option<CachedEntry> {
    let uri = post.uri.clone()?;
    let user = post
        .author
        .as_ref()
        .and_then(|author| user_row(&account_key.host, author));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(uri, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Bluesky,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::Bluesky(post.clone()),
        },
        user,
    ))
}

pub fn feed_entry(account_key: &AccountKey, item: &FeedViewPost) -> Option<CachedEntry> {
    post_entry(account_key, item.post.as_ref()?)
}

/// Map a notification plus its hydrated subject post (resolved by a
/// secondary `get_posts` fetch before normalization).
pub fn notification_entry(
    account_key: &AccountKey,
    notification: &BskyNotification,
    reference: Option<&PostView>,
) -> Option<CachedEntry> {
    let uri = notification.uri.clone()?;
    let user = notification
        .author
        .as_ref()
        .and_then(|author| user_row(&account_key.host, author));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(uri, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Bluesky,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::BlueskyNotification {
                notification: notification.clone(),
                reference: reference.cloned(),
            },
        },
        user,
    ))
}

pub fn user_row(host: &str, profile: &ProfileView) -> Option<UserRow> {
    let did = profile.did.clone()?;
    Some(UserRow {
        user_key: MicroblogKey::new(did, host),
        platform_type: PlatformType::Bluesky,
        name: profile
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| profile.handle.clone())
            .unwrap_or_default(),
        handle: profile.handle.clone().unwrap_or_default(),
        host: host.to_string(),
        content: UserContent::Bluesky(profile.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_post_with_viewer_state() {
        let account = MicroblogKey::new("did:plc:me", "bsky.social");
        let post: PostView = serde_json::from_value(serde_json::json!({
            "uri": "at://did:plc:alice/app.bsky.feed.post/3k",
            "cid": "bafy...",
            "author": { "did": "did:plc:alice", "handle": "alice.bsky.social" },
            "likeCount": 7,
            "viewer": { "like": "at://did:plc:me/app.bsky.feed.like/abc" },
        }))
        .unwrap();
        let entry = post_entry(&account, &post).unwrap();
        assert_eq!(
            entry.status.status_key.id,
            "at://did:plc:alice/app.bsky.feed.post/3k"
        );
        let user = entry.user.unwrap();
        assert_eq!(user.user_key.id, "did:plc:alice");
        assert_eq!(user.name, "alice.bsky.social");
        match &entry.status.content {
            StatusContent::Bluesky(post) => {
                assert_eq!(
                    post.viewer.as_ref().unwrap().like.as_deref(),
                    Some("at://did:plc:me/app.bsky.feed.like/abc")
                );
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn notification_carries_hydrated_reference() {
        let account = MicroblogKey::new("did:plc:me", "bsky.social");
        let notification: BskyNotification = serde_json::from_value(serde_json::json!({
            "uri": "at://did:plc:alice/app.bsky.feed.like/xyz",
            "reason": "like",
            "reasonSubject": "at://did:plc:me/app.bsky.feed.post/1",
            "author": { "did": "did:plc:alice", "handle": "alice.bsky.social" },
        }))
        .unwrap();
        let subject: PostView = serde_json::from_value(serde_json::json!({
            "uri": "at://did:plc:me/app.bsky.feed.post/1",
        }))
        .unwrap();
        let entry = notification_entry(&account, &notification, Some(&subject)).unwrap();
        match &entry.status.content {
            StatusContent::BlueskyNotification { reference, .. } => {
                assert!(reference.is_some());
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
