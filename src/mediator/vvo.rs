//! VVO feed mediators
//!
//! Two paging idioms coexist: the home feed walks backwards with a numeric
//! `max_id`, container feeds (profiles, search, mentions) use a 1-based
//! page index. Both hide behind the opaque cursor as rendered integers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mapper::{flatten_thread, vvo as mapper};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::vvo::{Status, VvoClient};
use crate::paging::{Cursor, TimelineMediator, TimelinePage, TimelineRequest};

fn status_entries(account_key: &AccountKey, statuses: &[Status]) -> Vec<crate::data::CachedEntry> {
    statuses
        .iter()
        .filter_map(|status| mapper::status_entry(account_key, status))
        .collect()
}

/// Home feed: numeric `max_id` cursor from the response envelope.
pub struct HomeTimelineMediator {
    pub client: Arc<VvoClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for HomeTimelineMediator {
    async fn timeline(&self, _page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let max_id = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.as_ref().and_then(Cursor::as_i64),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let data = self.client.home_timeline(max_id).await?;
        let next = data.max_id.filter(|max_id| *max_id > 0);
        Ok(TimelinePage {
            entries: status_entries(&self.account_key, &data.statuses),
            end_of_pagination: next.is_none() || data.statuses.is_empty(),
            next_cursor: next.map(|max_id| Cursor::new(max_id.to_string())),
            prev_cursor: None,
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Vvo
    }
}

/// Which page-indexed feed to drive
#[derive(Debug, Clone)]
pub enum PagedKind {
    User(MicroblogKey),
    Search(String),
    Mentions,
}

/// Container feeds: 1-based page index carried in the cursor.
pub struct PagedTimelineMediator {
    pub client: Arc<VvoClient>,
    pub account_key: AccountKey,
    pub kind: PagedKind,
}

#[async_trait]
impl TimelineMediator for PagedTimelineMediator {
    async fn timeline(&self, _page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let page = match &request {
            TimelineRequest::Refresh => 1,
            TimelineRequest::Append { cursor } => {
                cursor.as_ref().and_then(Cursor::as_i64).unwrap_or(1).max(1)
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let statuses = match &self.kind {
            PagedKind::User(user_key) => {
                let uid = user_key.id.parse::<i64>().map_err(|_| {
                    crate::error::EngineError::Protocol(format!(
                        "vvo user id is not numeric: {}",
                        user_key.id
                    ))
                })?;
                self.client.user_timeline(uid, page).await?
            }
            PagedKind::Search(query) => self.client.search_timeline(query, page).await?,
            PagedKind::Mentions => self.client.mentions_at(page).await?,
        };
        Ok(TimelinePage {
            end_of_pagination: statuses.is_empty(),
            entries: status_entries(&self.account_key, &statuses),
            next_cursor: if statuses.is_empty() {
                None
            } else {
                Some(Cursor::new((page + 1).to_string()))
            },
            prev_cursor: None,
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Vvo
    }
}

/// Status detail: the focal status plus its comment flow below it. VVO
/// has no ancestor chain; reposts link to the original inside the status
/// payload instead.
pub struct StatusDetailMediator {
    pub client: Arc<VvoClient>,
    pub account_key: AccountKey,
    pub status_key: MicroblogKey,
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
        let (comments, _next) = self.client.hotflow(&self.status_key.id, 0).await?;
        Ok(TimelinePage {
            entries: flatten_thread(
                Vec::new(),
                focal,
                comments
                    .iter()
                    .filter_map(|comment| mapper::comment_entry(&self.account_key, comment))
                    .collect(),
            ),
            end_of_pagination: true,
            ..TimelinePage::default()
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Vvo
    }
}
