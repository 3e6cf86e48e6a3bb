//! Misskey feed mediators
//!
//! Pagination is `untilId` based; the cursor is the last note ID of the
//! page. Misskey has no `sinceId` paging on these endpoints, so prepend
//! reports end-of-pagination everywhere.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mapper::{flatten_thread, misskey as mapper};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::misskey::{MisskeyClient, Note};
use crate::paging::{Cursor, TimelineMediator, TimelinePage, TimelineRequest};

fn note_page(account_key: &AccountKey, notes: &[Note]) -> TimelinePage {
    TimelinePage {
        entries: notes
            .iter()
            .filter_map(|note| mapper::note_entry(account_key, note))
            .collect(),
        next_cursor: notes.last().and_then(|n| n.id.clone()).map(Cursor::new),
        prev_cursor: None,
        end_of_pagination: notes.is_empty(),
    }
}

fn until_id(cursor: &Option<Cursor>) -> Option<&str> {
    cursor.as_ref().map(|c| c.as_str())
}

/// Which stock timeline endpoint to hit
#[derive(Debug, Clone, Copy)]
pub enum TimelineKind {
    Home,
    Local,
    Global,
}

pub struct NoteTimelineMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub kind: TimelineKind,
}

#[async_trait]
impl TimelineMediator for NoteTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let notes = match self.kind {
            TimelineKind::Home => {
                self.client
                    .home_timeline(page_size, until_id(&cursor))
                    .await?
            }
            TimelineKind::Local => {
                self.client
                    .local_timeline(page_size, until_id(&cursor))
                    .await?
            }
            TimelineKind::Global => {
                self.client
                    .global_timeline(page_size, until_id(&cursor))
                    .await?
            }
        };
        Ok(note_page(&self.account_key, &notes))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

pub struct UserTimelineMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub user_key: MicroblogKey,
}

#[async_trait]
impl TimelineMediator for UserTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let notes = self
            .client
            .user_notes(&self.user_key.id, page_size, until_id(&cursor))
            .await?;
        Ok(note_page(&self.account_key, &notes))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

pub struct ListTimelineMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub list_id: String,
}

#[async_trait]
impl TimelineMediator for ListTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let notes = self
            .client
            .list_timeline(&self.list_id, page_size, until_id(&cursor))
            .await?;
        Ok(note_page(&self.account_key, &notes))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

pub struct SearchNoteMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub query: String,
}

#[async_trait]
impl TimelineMediator for SearchNoteMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let notes = self
            .client
            .search_notes(&self.query, page_size, until_id(&cursor))
            .await?;
        Ok(note_page(&self.account_key, &notes))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

pub struct NotificationMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub mentions_only: bool,
}

#[async_trait]
impl TimelineMediator for NotificationMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let notifications = self
            .client
            .notifications(page_size, until_id(&cursor), self.mentions_only)
            .await?;
        Ok(TimelinePage {
            entries: notifications
                .iter()
                .filter_map(|n| mapper::notification_entry(&self.account_key, n))
                .collect(),
            next_cursor: notifications
                .last()
                .and_then(|n| n.id.clone())
                .map(Cursor::new),
            prev_cursor: None,
            end_of_pagination: notifications.is_empty(),
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

/// Misskey's bookmark equivalent: `i/favorites`, which wraps each note in
/// a favorite envelope carrying its own cursor ID.
pub struct FavoriteTimelineMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for FavoriteTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let favorites = self
            .client
            .favorites(page_size, until_id(&cursor))
            .await?;
        Ok(TimelinePage {
            entries: favorites
                .iter()
                .filter_map(|favorite| favorite.note.as_ref())
                .filter_map(|note| mapper::note_entry(&self.account_key, note))
                .collect(),
            next_cursor: favorites.last().and_then(|f| f.id.clone()).map(Cursor::new),
            prev_cursor: None,
            end_of_pagination: favorites.is_empty(),
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}

/// Note detail: ancestors via `notes/conversation`, replies via
/// `notes/children`, flattened around the focal note.
pub struct StatusDetailMediator {
    pub client: Arc<MisskeyClient>,
    pub account_key: AccountKey,
    pub status_key: MicroblogKey,
    pub status_only: bool,
}

#[async_trait]
impl TimelineMediator for StatusDetailMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        match request {
            TimelineRequest::Refresh => {}
            TimelineRequest::Append { .. } | TimelineRequest::Prepend { .. } => {
                return Ok(TimelinePage::end());
            }
        }
        let focal = self.client.show_note(&self.status_key.id).await?;
        let Some(focal) = mapper::note_entry(&self.account_key, &focal) else {
            return Ok(TimelinePage::end());
        };
        if self.status_only {
            return Ok(TimelinePage {
                entries: vec![focal.with_sort_offset(0)],
                end_of_pagination: true,
                ..TimelinePage::default()
            });
        }
        // `notes/conversation` returns ancestors nearest-first; display
        // order needs the root first.
        let mut ancestors: Vec<Note> = self
            .client
            .conversation(&self.status_key.id, page_size)
            .await?;
        ancestors.reverse();
        let replies = self.client.children(&self.status_key.id, page_size).await?;
        Ok(TimelinePage {
            entries: flatten_thread(
                ancestors
                    .iter()
                    .filter_map(|note| mapper::note_entry(&self.account_key, note))
                    .collect(),
                focal,
                replies
                    .iter()
                    .filter_map(|note| mapper::note_entry(&self.account_key, note))
                    .collect(),
            ),
            end_of_pagination: true,
            ..TimelinePage::default()
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Misskey
    }
}
