//! Mastodon feed mediators
//!
//! Pagination is `max_id` based; the cursor for the next append is the last
//! status ID of the page. Home and notifications also support prepending
//! via `min_id`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mapper::{flatten_thread, mastodon as mapper};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::mastodon::{MastodonClient, Notification, Status};
use crate::paging::{Cursor, TimelineMediator, TimelinePage, TimelineRequest};

fn status_page(account_key: &AccountKey, statuses: &[Status]) -> TimelinePage {
    TimelinePage {
        entries: statuses
            .iter()
            .filter_map(|status| mapper::status_entry(account_key, status))
            .collect(),
        next_cursor: statuses.last().and_then(|s| s.id.clone()).map(Cursor::new),
        prev_cursor: statuses.first().and_then(|s| s.id.clone()).map(Cursor::new),
        end_of_pagination: statuses.is_empty(),
    }
}

fn notification_page(account_key: &AccountKey, notifications: &[Notification]) -> TimelinePage {
    TimelinePage {
        entries: notifications
            .iter()
            .filter_map(|n| mapper::notification_entry(account_key, n))
            .collect(),
        next_cursor: notifications
            .last()
            .and_then(|n| n.id.clone())
            .map(Cursor::new),
        prev_cursor: notifications
            .first()
            .and_then(|n| n.id.clone())
            .map(Cursor::new),
        end_of_pagination: notifications.is_empty(),
    }
}

fn max_id(cursor: &Option<Cursor>) -> Option<&str> {
    cursor.as_ref().map(|c| c.as_str())
}

/// Home timeline; the only Mastodon feed where prepend is meaningful.
pub struct HomeTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for HomeTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => {
                self.client.home_timeline(page_size, None, None).await?
            }
            TimelineRequest::Append { cursor } => {
                self.client
                    .home_timeline(page_size, max_id(cursor), None)
                    .await?
            }
            TimelineRequest::Prepend { cursor } => {
                let Some(cursor) = cursor else {
                    return Ok(TimelinePage::end());
                };
                self.client
                    .home_timeline(page_size, None, Some(cursor.as_str()))
                    .await?
            }
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

/// Local or federated public timeline.
pub struct PublicTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub local: bool,
}

#[async_trait]
impl TimelineMediator for PublicTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => {
                self.client
                    .public_timeline(self.local, page_size, None)
                    .await?
            }
            TimelineRequest::Append { cursor } => {
                self.client
                    .public_timeline(self.local, page_size, max_id(cursor))
                    .await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

pub struct UserTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub user_key: MicroblogKey,
    pub only_media: bool,
}

#[async_trait]
impl TimelineMediator for UserTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => {
                self.client
                    .user_timeline(&self.user_key.id, page_size, None, self.only_media)
                    .await?
            }
            TimelineRequest::Append { cursor } => {
                self.client
                    .user_timeline(&self.user_key.id, page_size, max_id(cursor), self.only_media)
                    .await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

pub struct NotificationMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub mentions_only: bool,
}

#[async_trait]
impl TimelineMediator for NotificationMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let notifications = match &request {
            TimelineRequest::Refresh => {
                self.client
                    .notifications(page_size, None, self.mentions_only)
                    .await?
            }
            TimelineRequest::Append { cursor } => {
                self.client
                    .notifications(page_size, max_id(cursor), self.mentions_only)
                    .await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(notification_page(&self.account_key, &notifications))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

/// Status search; pagination is offset based rather than `max_id` based,
/// so the cursor carries the running offset.
pub struct SearchStatusMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub query: String,
}

#[async_trait]
impl TimelineMediator for SearchStatusMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let offset = match &request {
            TimelineRequest::Refresh => 0,
            TimelineRequest::Append { cursor } => cursor
                .as_ref()
                .and_then(Cursor::as_i64)
                .unwrap_or(0)
                .max(0) as usize,
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let statuses = self
            .client
            .search_statuses(&self.query, page_size, offset)
            .await?;
        let mut page = status_page(&self.account_key, &statuses);
        page.next_cursor = if statuses.is_empty() {
            None
        } else {
            Some(Cursor::new((offset + statuses.len()).to_string()))
        };
        page.prev_cursor = None;
        Ok(page)
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

pub struct BookmarkTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for BookmarkTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => self.client.bookmarks(page_size, None).await?,
            TimelineRequest::Append { cursor } => {
                self.client.bookmarks(page_size, max_id(cursor)).await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

pub struct FavouriteTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for FavouriteTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => self.client.favourites(page_size, None).await?,
            TimelineRequest::Append { cursor } => {
                self.client.favourites(page_size, max_id(cursor)).await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

pub struct ListTimelineMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub list_id: String,
}

#[async_trait]
impl TimelineMediator for ListTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let statuses = match &request {
            TimelineRequest::Refresh => {
                self.client.list_timeline(&self.list_id, page_size, None).await?
            }
            TimelineRequest::Append { cursor } => {
                self.client
                    .list_timeline(&self.list_id, page_size, max_id(cursor))
                    .await?
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        Ok(status_page(&self.account_key, &statuses))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

/// Status detail: the focal post plus its thread context, flattened into
/// one explicitly sorted page. Single-shot; there is nothing to append.
pub struct StatusDetailMediator {
    pub client: Arc<MastodonClient>,
    pub account_key: AccountKey,
    pub status_key: MicroblogKey,
    /// Fetch only the focal status, skipping the thread fan-out
    pub status_only: bool,
}

#[async_trait]
impl TimelineMediator for StatusDetailMediator {
    async fn timeline(&self, _page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        match request {
            TimelineRequest::Refresh => {}
            TimelineRequest::Append { .. } | TimelineRequest::Prepend { .. } => {
                return Ok(TimelinePage::end());
            }
        }
        let focal = self.client.get_status(&self.status_key.id).await?;
        let Some(focal) = mapper::status_entry(&self.account_key, &focal) else {
            return Ok(TimelinePage::end());
        };
        if self.status_only {
            return Ok(TimelinePage {
                entries: vec![focal.with_sort_offset(0)],
                end_of_pagination: true,
                ..TimelinePage::default()
            });
        }
        let context = self.client.context(&self.status_key.id).await?;
        let ancestors = context
            .ancestors
            .iter()
            .filter_map(|status| mapper::status_entry(&self.account_key, status))
            .collect();
        let replies = context
            .descendants
            .iter()
            .filter_map(|status| mapper::status_entry(&self.account_key, status))
            .collect();
        Ok(TimelinePage {
            entries: flatten_thread(ancestors, focal, replies),
            end_of_pagination: true,
            ..TimelinePage::default()
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}
