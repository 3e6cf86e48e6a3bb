//! XQT feed mediators
//!
//! Every GraphQL timeline shares the instruction-cursor idiom: the client
//! flattens instructions into tweets plus a bottom cursor, and exhaustion
//! is the absence of that cursor.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mapper::{flatten_thread, xqt as mapper};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::xqt::{TweetPage, XqtClient};
use crate::paging::{Cursor, TimelineMediator, TimelinePage, TimelineRequest};

fn tweet_page(account_key: &AccountKey, page: TweetPage) -> TimelinePage {
    TimelinePage {
        entries: page
            .tweets
            .iter()
            .filter_map(|tweet| mapper::tweet_entry(account_key, tweet))
            .collect(),
        end_of_pagination: page.next_cursor.is_none(),
        next_cursor: page.next_cursor.map(Cursor::new),
        prev_cursor: None,
    }
}

fn cursor_str(cursor: &Option<Cursor>) -> Option<&str> {
    cursor.as_ref().map(|c| c.as_str())
}

/// Which GraphQL timeline to drive
#[derive(Debug, Clone)]
pub enum FeedKind {
    Home,
    User(MicroblogKey),
    Bookmarks,
    Likes(MicroblogKey),
    Search(String),
    List(String),
    Mentions,
}

pub struct TweetTimelineMediator {
    pub client: Arc<XqtClient>,
    pub account_key: AccountKey,
    pub kind: FeedKind,
}

#[async_trait]
impl TimelineMediator for TweetTimelineMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let cursor = cursor_str(&cursor);
        let page = match &self.kind {
            FeedKind::Home => self.client.home_latest_timeline(page_size, cursor).await?,
            FeedKind::User(user_key) => {
                self.client.user_tweets(&user_key.id, page_size, cursor).await?
            }
            FeedKind::Bookmarks => self.client.bookmarks(page_size, cursor).await?,
            FeedKind::Likes(user_key) => {
                self.client.likes(&user_key.id, page_size, cursor).await?
            }
            FeedKind::Search(query) => {
                self.client.search_timeline(query, page_size, cursor).await?
            }
            FeedKind::List(list_id) => {
                self.client
                    .list_latest_tweets(list_id, page_size, cursor)
                    .await?
            }
            FeedKind::Mentions => self.client.mentions_timeline(page_size, cursor).await?,
        };
        Ok(tweet_page(&self.account_key, page))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Xqt
    }
}

/// Tweet detail: one page carries ancestors, the focal tweet and replies
/// in display order; the mediator splits around the focal ID and assigns
/// explicit offsets.
pub struct StatusDetailMediator {
    pub client: Arc<XqtClient>,
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
        let page = self.client.tweet_detail(&self.status_key.id, None).await?;
        let Some((ancestors, focal, replies)) =
            mapper::split_thread(&self.account_key, &page.tweets, &self.status_key.id)
        else {
            return Err(crate::error::EngineError::NotFound);
        };
        if self.status_only {
            return Ok(TimelinePage {
                entries: vec![focal.with_sort_offset(0)],
                end_of_pagination: true,
                ..TimelinePage::default()
            });
        }
        Ok(TimelinePage {
            entries: flatten_thread(ancestors, focal, replies),
            end_of_pagination: true,
            ..TimelinePage::default()
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Xqt
    }
}
