//! VVO wire-to-row mapping

use crate::data::{
    CachedEntry, MessageContent, RoomContent, StatusContent, StatusRow, UserContent, UserRow,
};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::vvo::{Comment, Message, MessageRoom, Status, User};

pub fn status_entry(account_key: &AccountKey, status: &Status) -> Option<CachedEntry> {
    let id = status.id.clone()?;
    let user = status
        .user
        .as_ref()
        .and_then(|user| user_row(&account_key.host, user));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Vvo,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::Vvo(status.clone()),
        },
        user,
    ))
}

pub fn comment_entry(account_key: &AccountKey, comment: &Comment) -> Option<CachedEntry> {
    let id = comment.id.clone()?;
    let user = comment
        .user
        .as_ref()
        .and_then(|user| user_row(&account_key.host, user));
    Some(CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, &account_key.host),
            account_key: account_key.clone(),
            platform_type: PlatformType::Vvo,
            user_key: user.as_ref().map(|u| u.user_key.clone()),
            content: StatusContent::VvoComment(comment.clone()),
        },
        user,
    ))
}

pub fn user_row(host: &str, user: &User) -> Option<UserRow> {
    let id = user.id?;
    Some(UserRow {
        user_key: MicroblogKey::new(id.to_string(), host),
        platform_type: PlatformType::Vvo,
        name: user.screen_name.clone().unwrap_or_default(),
        handle: user.screen_name.clone().unwrap_or_default(),
        host: host.to_string(),
        content: UserContent::Vvo(user.clone()),
    })
}

/// A DM room row keyed by the peer user's ID.
pub fn room_row(
    account_key: &AccountKey,
    room: &MessageRoom,
) -> Option<crate::data::MessageRoomRow> {
    let peer_id = room.user.as_ref().and_then(|user| user.id)?;
    Some(crate::data::MessageRoomRow {
        room_key: MicroblogKey::new(peer_id.to_string(), &account_key.host),
        account_key: account_key.clone(),
        content: RoomContent::Vvo(room.clone()),
    })
}

/// A DM item keyed by the message ID.
pub fn message_item(
    account_key: &AccountKey,
    message: &Message,
) -> Option<(MicroblogKey, MessageContent)> {
    let id = message.id?;
    Some((
        MicroblogKey::new(id.to_string(), &account_key.host),
        MessageContent::Vvo(message.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_with_numeric_author_id() {
        let account = MicroblogKey::new("me", "vvo.test");
        let status: Status = serde_json::from_value(serde_json::json!({
            "id": "5001",
            "text": "hello",
            "attitudes_count": 12,
            "favorited": true,
            "user": { "id": 77, "screen_name": "阿丽" },
        }))
        .unwrap();
        let entry = status_entry(&account, &status).unwrap();
        assert_eq!(entry.status.status_key.id, "5001");
        assert_eq!(entry.user.as_ref().unwrap().user_key.id, "77");
    }

    #[test]
    fn room_without_peer_is_skipped() {
        let account = MicroblogKey::new("me", "vvo.test");
        let room: MessageRoom =
            serde_json::from_value(serde_json::json!({ "text": "hi" })).unwrap();
        assert!(room_row(&account, &room).is_none());
    }
}
