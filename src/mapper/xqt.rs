//! XQT wire-to-row mapping

use crate::data::{CachedEntry, StatusContent, StatusRow, UserContent, UserRow};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::xqt::{Tweet, User};

pub fn tweet_entry(account_key: &AccountKey, tweet: &Tweet) -> Option<CachedEntry> {
    let id = tweet.id_str.clone()?;
    let user = tweet
        .user
        .as_ref()
        .and_then(|user| user_row(&account_key.host, user));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Xqt,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::Xqt(tweet.clone()),
        },
        user,
    ))
}

pub fn user_row(host: &str, user: &User) -> Option<UserRow> {
    let id = user.id_str.clone()?;
    Some(UserRow {
        user_key: MicroblogKey::new(id, host),
        platform_type: PlatformType::Xqt,
        name: user
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| user.screen_name.clone())
            .unwrap_or_default(),
        handle: user.screen_name.clone().unwrap_or_default(),
        host: host.to_string(),
        content: UserContent::Xqt(user.clone()),
    })
}

/// Split a flattened thread page around the focal tweet.
///
/// The detail endpoint returns ancestors above and replies below the focal
/// tweet in display order; `None` when the focal tweet is absent from the
/// page.
pub fn split_thread(
    account_key: &AccountKey,
    tweets: &[Tweet],
    focal_id: &str,
) -> Option<(Vec<CachedEntry>, CachedEntry, Vec<CachedEntry>)> {
    let focal_index = tweets
        .iter()
        .position(|tweet| tweet.id_str.as_deref() == Some(focal_id))?;
    let focal = tweet_entry(account_key, &tweets[focal_index])?;
    let ancestors = tweets[..focal_index]
        .iter()
        .filter_map(|tweet| tweet_entry(account_key, tweet))
        .collect();
    let replies = tweets[focal_index + 1..]
        .iter()
        .filter_map(|tweet| tweet_entry(account_key, tweet))
        .collect();
    Some((ancestors, focal, replies))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(id: &str) -> Tweet {
        serde_json::from_value(serde_json::json!({
            "id_str": id,
            "full_text": format!("tweet {id}"),
            "user": { "id_str": "u1", "screen_name": "alice", "name": "Alice" },
            "favorite_count": 1,
            "favorited": false,
        }))
        .unwrap()
    }

    #[test]
    fn maps_tweet_and_author() {
        let account = MicroblogKey::new("me", "xqt.test");
        let entry = tweet_entry(&account, &tweet("100")).unwrap();
        assert_eq!(entry.status.status_key.id, "100");
        assert_eq!(entry.user.as_ref().unwrap().handle, "alice");
    }

    #[test]
    fn splits_thread_around_focal() {
        let account = MicroblogKey::new("me", "xqt.test");
        let tweets = vec![tweet("1"), tweet("2"), tweet("3"), tweet("4")];
        let (ancestors, focal, replies) = split_thread(&account, &tweets, "2").unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(focal.status.status_key.id, "2");
        assert_eq!(replies.len(), 2);
    }

    #[test]
    fn missing_focal_yields_none() {
        let account = MicroblogKey::new("me", "xqt.test");
        assert!(split_thread(&account, &[tweet("1")], "404").is_none());
    }
}
