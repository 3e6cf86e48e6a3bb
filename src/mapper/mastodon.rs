//! Mastodon wire-to-row mapping

use crate::data::{CachedEntry, StatusContent, StatusRow, UserContent, UserRow};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::mastodon::{Account, Notification, Status};

/// Map one status into a cache entry. Returns `None` when the status has
/// no ID to key it by.
pub fn status_entry(account_key: &AccountKey, status: &Status) -> Option<CachedEntry> {
    let id = status.id.clone()?;
    let user = status
        .account
        .as_ref()
        .and_then(|account| user_row(&account_key.host, account));
    let status = sanitize(status.clone());
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Mastodon,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::Mastodon(status),
        },
        user,
    ))
}

/// Map one notification into a cache entry keyed by the notification ID.
pub fn notification_entry(
    account_key: &AccountKey,
    notification: &Notification,
) -> Option<CachedEntry> {
    let id = notification.id.clone()?;
    let user = notification
        .account
        .as_ref()
        .and_then(|account| user_row(&account_key.host, account));
    let mut notification = notification.clone();
    notification.status = notification.status.map(sanitize);
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Mastodon,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::MastodonNotification(notification),
        },
        user,
    ))
}

/// Map an account into a user row. The row's `host` reflects the user's
/// home instance parsed from `acct`, while the key is scoped to the
/// instance the data was fetched from.
pub fn user_row(host: &str, account: &Account) -> Option<UserRow> {
    let id = account.id.clone()?;
    let remote_host = account
        .acct
        .as_deref()
        .and_then(|acct| acct.split_once('@').map(|(_, host)| host.to_string()))
        .unwrap_or_else(|| host.to_string());
    Some(UserRow {
        user_key: MicroblogKey::new(id, host),
        platform_type: PlatformType::Mastodon,
        name: account
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| account.username.clone())
            .unwrap_or_default(),
        handle: account.username.clone().unwrap_or_default(),
        host: remote_host,
        content: UserContent::Mastodon(account.clone()),
    })
}

fn sanitize(mut status: Status) -> Status {
    if let Some(content) = &status.content {
        status.content = Some(super::sanitize_html(content));
    }
    if let Some(reblog) = status.reblog.take() {
        status.reblog = Some(Box::new(sanitize(*reblog)));
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_status(id: Option<&str>) -> Status {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "content": "<p>hello <script>alert(1)</script>world</p>",
            "account": {
                "id": "u1",
                "username": "alice",
                "acct": "alice@remote.example",
                "display_name": "Alice",
            },
            "favourites_count": 5,
            "favourited": false,
        }))
        .unwrap()
    }

    #[test]
    fn maps_status_and_author() {
        let account = MicroblogKey::new("me", "mastodon.test");
        let entry = status_entry(&account, &wire_status(Some("42"))).unwrap();
        assert_eq!(entry.status.status_key.id, "42");
        assert_eq!(entry.status.status_key.host, "mastodon.test");
        let user = entry.user.unwrap();
        assert_eq!(user.user_key.id, "u1");
        assert_eq!(user.host, "remote.example");
        assert_eq!(user.handle, "alice");
        match &entry.status.content {
            StatusContent::Mastodon(status) => {
                let content = status.content.as_deref().unwrap();
                assert!(!content.contains("script"));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn status_without_id_is_skipped() {
        let account = MicroblogKey::new("me", "mastodon.test");
        assert!(status_entry(&account, &wire_status(None)).is_none());
    }

    #[test]
    fn local_account_keeps_instance_host() {
        let account: Account = serde_json::from_value(serde_json::json!({
            "id": "u2",
            "username": "bob",
            "acct": "bob",
        }))
        .unwrap();
        let user = user_row("mastodon.test", &account).unwrap();
        assert_eq!(user.host, "mastodon.test");
        assert_eq!(user.name, "bob");
    }
}
