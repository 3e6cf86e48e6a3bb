//! Curated-list loaders and handler
//!
//! Lists are small and reloaded wholesale, so they skip the sort-id
//! machinery: a cursor-paged `load` plus CRUD, with a capability set per
//! backend telling the caller which metadata fields it may edit.

use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::Mutex;

use crate::data::{CacheStore, ListMetaData, ListMetaDataType, ListRow};
use crate::error::{EngineError, Result};
use crate::model::{AccountKey, MicroblogKey};
use crate::network::{bluesky, mastodon, misskey, xqt};
use crate::paging::Cursor;

/// One page of list descriptors
#[derive(Debug, Default)]
pub struct ListPage {
    pub data: Vec<ListMetaData>,
    pub next_cursor: Option<Cursor>,
}

/// Request kinds for list loading. Lists have no prepend.
#[derive(Debug, Clone)]
pub enum ListRequest {
    Refresh,
    Append { cursor: Option<Cursor> },
}

/// Backend contract for curated lists
///
/// `supported_meta_data` is a capability advertisement: the UI hides
/// fields the backend cannot persist instead of failing the edit.
#[async_trait]
pub trait ListLoader: Send + Sync {
    async fn load(&self, page_size: usize, request: ListRequest) -> Result<ListPage>;
    async fn info(&self, list_id: &str) -> Result<ListMetaData>;
    async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData>;
    async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData>;
    async fn delete(&self, list_id: &str) -> Result<()>;
    async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()>;
    async fn remove_member(&self, list_id: &str, user_id: &str) -> Result<()>;
    fn supported_meta_data(&self) -> &'static [ListMetaDataType];
}

/// Drives one account's list collection through a loader, writing through
/// the cache store.
pub struct ListHandler {
    store: Arc<CacheStore>,
    loader: Arc<dyn ListLoader>,
    account_key: AccountKey,
    paging_key: String,
    next_cursor: Mutex<Option<Cursor>>,
}

impl ListHandler {
    pub fn new(
        store: Arc<CacheStore>,
        loader: Arc<dyn ListLoader>,
        account_key: AccountKey,
        paging_key: String,
    ) -> Self {
        Self {
            store,
            loader,
            account_key,
            paging_key,
            next_cursor: Mutex::new(None),
        }
    }

    pub fn supported_meta_data(&self) -> &'static [ListMetaDataType] {
        self.loader.supported_meta_data()
    }

    fn row(&self, meta: ListMetaData) -> ListRow {
        ListRow {
            list_key: MicroblogKey::new(meta.id.clone(), &self.account_key.host),
            account_key: self.account_key.clone(),
            content: meta,
        }
    }

    pub async fn refresh(&self, page_size: usize) -> Result<()> {
        let page = self.loader.load(page_size, ListRequest::Refresh).await?;
        let rows: Vec<ListRow> = page.data.into_iter().map(|meta| self.row(meta)).collect();
        self.store
            .replace_list_page(&self.account_key, &self.paging_key, &rows)
            .await?;
        *self.next_cursor.lock().await = page.next_cursor;
        Ok(())
    }

    pub async fn load_more(&self, page_size: usize) -> Result<()> {
        let cursor = self.next_cursor.lock().await.clone();
        if cursor.is_none() {
            return Ok(());
        }
        let page = self
            .loader
            .load(page_size, ListRequest::Append { cursor })
            .await?;
        let rows: Vec<ListRow> = page.data.into_iter().map(|meta| self.row(meta)).collect();
        self.store
            .append_list_page(&self.account_key, &self.paging_key, &rows)
            .await?;
        *self.next_cursor.lock().await = page.next_cursor;
        Ok(())
    }

    /// Create remotely, then insert the authoritative descriptor.
    pub async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData> {
        let created = self.loader.create(meta).await?;
        self.store
            .upsert_list(&self.row(created.clone()), Some(&self.paging_key))
            .await?;
        Ok(created)
    }

    pub async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData> {
        let updated = self.loader.update(list_id, meta).await?;
        self.store
            .update_list_content(
                &MicroblogKey::new(list_id, &self.account_key.host),
                &self.account_key,
                &updated,
            )
            .await?;
        Ok(updated)
    }

    pub async fn delete(&self, list_id: &str) -> Result<()> {
        self.loader.delete(list_id).await?;
        self.store
            .delete_list(
                &MicroblogKey::new(list_id, &self.account_key.host),
                &self.account_key,
            )
            .await
    }

    pub async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.loader.add_member(list_id, user_id).await
    }

    pub async fn remove_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.loader.remove_member(list_id, user_id).await
    }

    pub async fn info(&self, list_id: &str) -> Result<ListMetaData> {
        let info = self.loader.info(list_id).await?;
        self.store
            .upsert_list(&self.row(info.clone()), None)
            .await?;
        Ok(info)
    }

    pub fn observe(&self) -> impl Stream<Item = Vec<ListRow>> {
        self.store
            .observe_lists(self.account_key.clone(), self.paging_key.clone())
    }
}

// =============================================================================
// Mastodon
// =============================================================================

/// Mastodon lists are unpaged and title-only.
pub struct MastodonListLoader {
    pub client: Arc<mastodon::MastodonClient>,
}

#[async_trait]
impl ListLoader for MastodonListLoader {
    async fn load(&self, _page_size: usize, request: ListRequest) -> Result<ListPage> {
        if let ListRequest::Append { .. } = request {
            return Ok(ListPage::default());
        }
        let lists = self.client.lists().await?;
        Ok(ListPage {
            data: lists
                .into_iter()
                .filter_map(|list| {
                    Some(ListMetaData {
                        id: list.id?,
                        title: list.title.unwrap_or_default(),
                        description: None,
                        avatar: None,
                        member_count: None,
                    })
                })
                .collect(),
            next_cursor: None,
        })
    }

    async fn info(&self, list_id: &str) -> Result<ListMetaData> {
        // No dedicated show endpoint in the client; reload and pick.
        let page = self.load(0, ListRequest::Refresh).await?;
        page.data
            .into_iter()
            .find(|list| list.id == list_id)
            .ok_or(EngineError::NotFound)
    }

    async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData> {
        let created = self.client.create_list(&meta.title).await?;
        Ok(ListMetaData {
            id: created.id.ok_or_else(|| {
                EngineError::Protocol("list create returned no id".to_string())
            })?,
            title: created.title.unwrap_or_else(|| meta.title.clone()),
            description: None,
            avatar: None,
            member_count: None,
        })
    }

    async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData> {
        let updated = self.client.update_list(list_id, &meta.title).await?;
        Ok(ListMetaData {
            id: list_id.to_string(),
            title: updated.title.unwrap_or_else(|| meta.title.clone()),
            description: None,
            avatar: None,
            member_count: None,
        })
    }

    async fn delete(&self, list_id: &str) -> Result<()> {
        self.client.delete_list(list_id).await
    }

    async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client
            .add_list_accounts(list_id, &[user_id.to_string()])
            .await
    }

    async fn remove_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client
            .remove_list_accounts(list_id, &[user_id.to_string()])
            .await
    }

    fn supported_meta_data(&self) -> &'static [ListMetaDataType] {
        &[ListMetaDataType::Title]
    }
}

// =============================================================================
// Misskey
// =============================================================================

pub struct MisskeyListLoader {
    pub client: Arc<misskey::MisskeyClient>,
}

fn misskey_meta(list: misskey::UserList) -> Option<ListMetaData> {
    Some(ListMetaData {
        id: list.id?,
        title: list.name.unwrap_or_default(),
        description: None,
        avatar: None,
        member_count: list.user_ids.map(|ids| ids.len() as i64),
    })
}

#[async_trait]
impl ListLoader for MisskeyListLoader {
    async fn load(&self, _page_size: usize, request: ListRequest) -> Result<ListPage> {
        if let ListRequest::Append { .. } = request {
            return Ok(ListPage::default());
        }
        let lists = self.client.lists().await?;
        Ok(ListPage {
            data: lists.into_iter().filter_map(misskey_meta).collect(),
            next_cursor: None,
        })
    }

    async fn info(&self, list_id: &str) -> Result<ListMetaData> {
        misskey_meta(self.client.show_list(list_id).await?).ok_or(EngineError::NotFound)
    }

    async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData> {
        misskey_meta(self.client.create_list(&meta.title).await?).ok_or_else(|| {
            EngineError::Protocol("list create returned no id".to_string())
        })
    }

    async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData> {
        self.client.update_list(list_id, &meta.title).await?;
        Ok(ListMetaData {
            id: list_id.to_string(),
            title: meta.title.clone(),
            description: None,
            avatar: None,
            member_count: meta.member_count,
        })
    }

    async fn delete(&self, list_id: &str) -> Result<()> {
        self.client.delete_list(list_id).await
    }

    async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client.list_push(list_id, user_id).await
    }

    async fn remove_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client.list_pull(list_id, user_id).await
    }

    fn supported_meta_data(&self) -> &'static [ListMetaDataType] {
        &[ListMetaDataType::Title]
    }
}

// =============================================================================
// Bluesky
// =============================================================================

pub struct BlueskyListLoader {
    pub client: Arc<bluesky::BlueskyClient>,
}

fn bluesky_meta(list: bluesky::ListView) -> Option<ListMetaData> {
    Some(ListMetaData {
        id: list.uri?,
        title: list.name.unwrap_or_default(),
        description: list.description,
        avatar: list.avatar,
        member_count: list.list_item_count,
    })
}

#[async_trait]
impl ListLoader for BlueskyListLoader {
    async fn load(&self, page_size: usize, request: ListRequest) -> Result<ListPage> {
        let cursor = match &request {
            ListRequest::Refresh => None,
            ListRequest::Append { cursor } => cursor.clone(),
        };
        let page = self
            .client
            .get_lists(
                self.client.did(),
                page_size,
                cursor.as_ref().map(|c| c.as_str()),
            )
            .await?;
        Ok(ListPage {
            data: page.lists.into_iter().filter_map(bluesky_meta).collect(),
            next_cursor: page.cursor.map(Cursor::new),
        })
    }

    async fn info(&self, list_id: &str) -> Result<ListMetaData> {
        bluesky_meta(self.client.get_list(list_id).await?).ok_or(EngineError::NotFound)
    }

    async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData> {
        let created = self
            .client
            .create_list(&meta.title, meta.description.as_deref(), None)
            .await?;
        Ok(ListMetaData {
            id: created.uri,
            title: meta.title.clone(),
            description: meta.description.clone(),
            avatar: meta.avatar.clone(),
            member_count: Some(0),
        })
    }

    async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData> {
        // List records are replaced wholesale via putRecord semantics;
        // the engine models that as create-with-same-rkey.
        let _ = self
            .client
            .create_list(&meta.title, meta.description.as_deref(), None)
            .await?;
        Ok(ListMetaData {
            id: list_id.to_string(),
            title: meta.title.clone(),
            description: meta.description.clone(),
            avatar: meta.avatar.clone(),
            member_count: meta.member_count,
        })
    }

    async fn delete(&self, list_id: &str) -> Result<()> {
        self.client.delete_record(list_id).await
    }

    async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client.add_list_member(list_id, user_id).await.map(|_| ())
    }

    async fn remove_member(&self, _list_id: &str, _user_id: &str) -> Result<()> {
        // Removing needs the listitem record URI, which this client does
        // not index. TODO: resolve the listitem rkey via getList members.
        Err(EngineError::Unsupported(
            "bluesky list member removal requires the listitem record".to_string(),
        ))
    }

    fn supported_meta_data(&self) -> &'static [ListMetaDataType] {
        &[
            ListMetaDataType::Title,
            ListMetaDataType::Description,
            ListMetaDataType::Avatar,
        ]
    }
}

// =============================================================================
// XQT
// =============================================================================

pub struct XqtListLoader {
    pub client: Arc<xqt::XqtClient>,
}

fn xqt_meta(list: xqt::TwitterList) -> Option<ListMetaData> {
    Some(ListMetaData {
        id: list.id_str?,
        title: list.name.unwrap_or_default(),
        description: list.description,
        avatar: list.banner_url,
        member_count: list.member_count,
    })
}

#[async_trait]
impl ListLoader for XqtListLoader {
    async fn load(&self, page_size: usize, request: ListRequest) -> Result<ListPage> {
        let cursor = match &request {
            ListRequest::Refresh => None,
            ListRequest::Append { cursor } => cursor.clone(),
        };
        let (lists, next) = self
            .client
            .list_management(page_size, cursor.as_ref().map(|c| c.as_str()))
            .await?;
        Ok(ListPage {
            data: lists.into_iter().filter_map(xqt_meta).collect(),
            next_cursor: next.map(Cursor::new),
        })
    }

    async fn info(&self, list_id: &str) -> Result<ListMetaData> {
        let page = self.load(100, ListRequest::Refresh).await?;
        page.data
            .into_iter()
            .find(|list| list.id == list_id)
            .ok_or(EngineError::NotFound)
    }

    async fn create(&self, meta: &ListMetaData) -> Result<ListMetaData> {
        let created = self
            .client
            .create_list(&meta.title, meta.description.as_deref())
            .await?;
        xqt_meta(created).ok_or_else(|| {
            EngineError::Protocol("list create returned no id".to_string())
        })
    }

    async fn update(&self, list_id: &str, meta: &ListMetaData) -> Result<ListMetaData> {
        self.client
            .update_list(list_id, &meta.title, meta.description.as_deref())
            .await?;
        Ok(ListMetaData {
            id: list_id.to_string(),
            title: meta.title.clone(),
            description: meta.description.clone(),
            avatar: meta.avatar.clone(),
            member_count: meta.member_count,
        })
    }

    async fn delete(&self, list_id: &str) -> Result<()> {
        self.client.delete_list(list_id).await
    }

    async fn add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client.list_add_member(list_id, user_id).await
    }

    async fn remove_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.client.list_remove_member(list_id, user_id).await
    }

    fn supported_meta_data(&self) -> &'static [ListMetaDataType] {
        &[ListMetaDataType::Title, ListMetaDataType::Description]
    }
}
