//! Direct-message synchronization
//!
//! Rooms and their items follow the timeline write path in miniature:
//! refresh replaces, append walks older pages, sort IDs order items within
//! a room. Coalescing is per room key, so two views of the same
//! conversation never race a double fetch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::{CacheStore, MessageContent, MessageItemRow, MessageRoomRow, RoomContent};
use crate::error::{EngineError, Result};
use crate::mapper::vvo as vvo_mapper;
use crate::model::{AccountKey, MicroblogKey};
use crate::network::{mastodon, vvo, xqt};
use crate::paging::Cursor;
use tokio::sync::Mutex;

/// One fetched page of room items plus the cursor for older pages
#[derive(Debug, Default)]
pub struct RoomItemPage {
    pub items: Vec<(MicroblogKey, MessageContent)>,
    pub next_cursor: Option<Cursor>,
}

/// Backend contract for direct messages
#[async_trait]
pub trait RoomLoader: Send + Sync {
    /// The room roster, newest activity first.
    async fn rooms(&self, page_size: usize) -> Result<Vec<MessageRoomRow>>;

    /// One page of a room's items; `cursor` walks to older pages.
    async fn room_items(
        &self,
        room_key: &MicroblogKey,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<RoomItemPage>;
}

/// Drives one account's direct messages through a loader.
pub struct DirectMessageHandler {
    store: Arc<CacheStore>,
    loader: Arc<dyn RoomLoader>,
    account_key: AccountKey,
    in_flight: Mutex<HashSet<String>>,
    cursors: Mutex<HashMap<String, Option<Cursor>>>,
}

impl DirectMessageHandler {
    pub fn new(
        store: Arc<CacheStore>,
        loader: Arc<dyn RoomLoader>,
        account_key: AccountKey,
    ) -> Self {
        Self {
            store,
            loader,
            account_key,
            in_flight: Mutex::new(HashSet::new()),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh the room roster. Concurrent calls coalesce.
    pub async fn refresh_rooms(&self, page_size: usize) -> Result<()> {
        const ROSTER: &str = "\u{0}roster";
        if !self.in_flight.lock().await.insert(ROSTER.to_string()) {
            return Ok(());
        }
        let result = async {
            let rooms = self.loader.rooms(page_size).await?;
            self.store.replace_rooms(&self.account_key, &rooms).await
        }
        .await;
        self.in_flight.lock().await.remove(ROSTER);
        result
    }

    /// Refresh one room's items: fetch the newest page and replace.
    pub async fn refresh_room(&self, room_key: &MicroblogKey, page_size: usize) -> Result<()> {
        let key = room_key.to_string();
        if !self.in_flight.lock().await.insert(key.clone()) {
            return Ok(());
        }
        let result = async {
            let page = self.loader.room_items(room_key, page_size, None).await?;
            self.store
                .replace_room_items(&self.account_key, room_key, &page.items)
                .await?;
            self.cursors
                .lock()
                .await
                .insert(key.clone(), page.next_cursor);
            Ok(())
        }
        .await;
        self.in_flight.lock().await.remove(&key);
        result
    }

    /// Load the next (older) page of a room.
    pub async fn load_more_room(&self, room_key: &MicroblogKey, page_size: usize) -> Result<()> {
        let key = room_key.to_string();
        let cursor = match self.cursors.lock().await.get(&key) {
            Some(Some(cursor)) => cursor.clone(),
            // No cursor recorded: either never refreshed or exhausted.
            _ => return Ok(()),
        };
        if !self.in_flight.lock().await.insert(key.clone()) {
            return Ok(());
        }
        let result = async {
            let page = self
                .loader
                .room_items(room_key, page_size, Some(&cursor))
                .await?;
            self.store
                .append_room_items(&self.account_key, room_key, &page.items)
                .await?;
            self.cursors
                .lock()
                .await
                .insert(key.clone(), page.next_cursor);
            Ok(())
        }
        .await;
        self.in_flight.lock().await.remove(&key);
        result
    }

    pub async fn rooms(&self) -> Result<Vec<MessageRoomRow>> {
        self.store.rooms(&self.account_key).await
    }

    pub async fn room_items(&self, room_key: &MicroblogKey) -> Result<Vec<MessageItemRow>> {
        self.store.room_items(&self.account_key, room_key).await
    }
}

// =============================================================================
// Mastodon
// =============================================================================

/// Conversations double as DM rooms. The API exposes only the latest
/// status per conversation, so a room's item page is that status alone.
pub struct MastodonRoomLoader {
    pub client: Arc<mastodon::MastodonClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl RoomLoader for MastodonRoomLoader {
    async fn rooms(&self, page_size: usize) -> Result<Vec<MessageRoomRow>> {
        let conversations = self.client.conversations(page_size, None).await?;
        Ok(conversations
            .into_iter()
            .filter_map(|conversation| {
                let id = conversation.id.clone()?;
                Some(MessageRoomRow {
                    room_key: MicroblogKey::new(id, &self.account_key.host),
                    account_key: self.account_key.clone(),
                    content: RoomContent::Mastodon(conversation),
                })
            })
            .collect())
    }

    async fn room_items(
        &self,
        room_key: &MicroblogKey,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<RoomItemPage> {
        if cursor.is_some() {
            return Ok(RoomItemPage::default());
        }
        let conversations = self.client.conversations(page_size, None).await?;
        let conversation = conversations
            .into_iter()
            .find(|c| c.id.as_deref() == Some(room_key.id.as_str()))
            .ok_or(EngineError::NotFound)?;
        let items = conversation
            .last_status
            .and_then(|status| {
                let id = status.id.clone()?;
                Some((
                    MicroblogKey::new(id, &self.account_key.host),
                    MessageContent::Mastodon(status),
                ))
            })
            .into_iter()
            .collect();
        Ok(RoomItemPage {
            items,
            next_cursor: None,
        })
    }
}

// =============================================================================
// XQT
// =============================================================================

pub struct XqtRoomLoader {
    pub client: Arc<xqt::XqtClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl RoomLoader for XqtRoomLoader {
    async fn rooms(&self, _page_size: usize) -> Result<Vec<MessageRoomRow>> {
        let inbox = self.client.inbox_initial_state().await?;
        Ok(inbox
            .conversations
            .into_iter()
            .filter_map(|conversation| {
                let id = conversation.conversation_id.clone()?;
                Some(MessageRoomRow {
                    room_key: MicroblogKey::new(id, &self.account_key.host),
                    account_key: self.account_key.clone(),
                    content: RoomContent::Xqt(conversation),
                })
            })
            .collect())
    }

    async fn room_items(
        &self,
        room_key: &MicroblogKey,
        _page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<RoomItemPage> {
        let page = self
            .client
            .dm_conversation(&room_key.id, cursor.map(|c| c.as_str()))
            .await?;
        Ok(RoomItemPage {
            items: page
                .messages
                .into_iter()
                .filter_map(|message| {
                    let id = message.id.clone()?;
                    Some((
                        MicroblogKey::new(id, &self.account_key.host),
                        MessageContent::Xqt(message),
                    ))
                })
                .collect(),
            next_cursor: page.next_cursor.map(Cursor::new),
        })
    }
}

// =============================================================================
// VVO
// =============================================================================

pub struct VvoRoomLoader {
    pub client: Arc<vvo::VvoClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl RoomLoader for VvoRoomLoader {
    async fn rooms(&self, _page_size: usize) -> Result<Vec<MessageRoomRow>> {
        let rooms = self.client.message_rooms(1).await?;
        Ok(rooms
            .iter()
            .filter_map(|room| vvo_mapper::room_row(&self.account_key, room))
            .collect())
    }

    async fn room_items(
        &self,
        room_key: &MicroblogKey,
        _page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<RoomItemPage> {
        let uid = room_key.id.parse::<i64>().map_err(|_| {
            EngineError::Protocol(format!("vvo room key is not numeric: {}", room_key.id))
        })?;
        let since_id = cursor.and_then(Cursor::as_i64).unwrap_or(0);
        let messages = self.client.chat(uid, since_id).await?;
        let next_cursor = messages
            .iter()
            .filter_map(|message| message.id)
            .min()
            .filter(|_| !messages.is_empty())
            .map(|id| Cursor::new(id.to_string()));
        Ok(RoomItemPage {
            items: messages
                .iter()
                .filter_map(|message| vvo_mapper::message_item(&self.account_key, message))
                .collect(),
            next_cursor,
        })
    }
}
