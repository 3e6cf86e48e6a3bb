//! Misskey wire-to-row mapping

use crate::data::{CachedEntry, StatusContent, StatusRow, UserContent, UserRow};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::misskey::{Note, Notification, UserLite};

pub fn note_entry(account_key: &AccountKey, note: &Note) -> Option<CachedEntry> {
    let id = note.id.clone()?;
    let user = note
        .user
        .as_ref()
        .and_then(|user| user_row(&account_key.host, user));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Misskey,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::Misskey(note.clone()),
        },
        user,
    ))
}

pub fn notification_entry(
    account_key: &AccountKey,
    notification: &Notification,
) -> Option<CachedEntry> {
    let id = notification.id.clone()?;
    let user = notification
        .user
        .as_ref()
        .and_then(|user| user_row(&account_key.host, user));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Misskey,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::MisskeyNotification(notification.clone()),
        },
        user,
    ))
}

pub fn user_row(host: &str, user: &UserLite) -> Option<UserRow> {
    let id = user.id.clone()?;
    Some(UserRow {
        user_key: MicroblogKey::new(id, host),
        platform_type: PlatformType::Misskey,
        name: user
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| user.username.clone())
            .unwrap_or_default(),
        handle: user.username.clone().unwrap_or_default(),
        // Local users carry no host; they live on the viewer's instance.
        host: user.host.clone().unwrap_or_else(|| host.to_string()),
        content: UserContent::Misskey(user.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_note_with_renote_counts() {
        let account = MicroblogKey::new("me", "misskey.test");
        let note: Note = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "text": "hello",
            "renoteCount": 3,
            "reactions": { "👍": 2 },
            "myReaction": "👍",
            "user": { "id": "u1", "username": "alice", "host": null },
        }))
        .unwrap();
        let entry = note_entry(&account, &note).unwrap();
        assert_eq!(entry.status.status_key.id, "n1");
        let user = entry.user.unwrap();
        assert_eq!(user.host, "misskey.test");
        match &entry.status.content {
            StatusContent::Misskey(note) => {
                assert_eq!(note.my_reaction.as_deref(), Some("👍"));
                assert_eq!(note.renote_count, Some(3));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn note_without_id_is_skipped() {
        let account = MicroblogKey::new("me", "misskey.test");
        let note: Note = serde_json::from_value(serde_json::json!({ "text": "x" })).unwrap();
        assert!(note_entry(&account, &note).is_none());
    }
}
