//! Bluesky feed mediators
//!
//! Pagination is opaque-cursor based: the backend hands back a cursor with
//! every page and exhaustion is signalled by its absence. The notification
//! mediator resolves subject posts through a secondary batched fetch
//! before normalization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mapper::{bluesky as mapper, flatten_thread};
use crate::model::{AccountKey, MicroblogKey, PlatformType};
use crate::network::bluesky::{BlueskyClient, FeedPage, PostView, ThreadNode};
use crate::paging::{Cursor, TimelineMediator, TimelinePage, TimelineRequest};

/// `getPosts` accepts at most 25 URIs per call.
const HYDRATION_BATCH: usize = 25;

fn feed_page(account_key: &AccountKey, page: FeedPage) -> TimelinePage {
    TimelinePage {
        entries: page
            .feed
            .iter()
            .filter_map(|item| mapper::feed_entry(account_key, item))
            .collect(),
        end_of_pagination: page.cursor.is_none(),
        next_cursor: page.cursor.map(Cursor::new),
        prev_cursor: None,
    }
}

fn cursor_str(cursor: &Option<Cursor>) -> Option<&str> {
    cursor.as_ref().map(|c| c.as_str())
}

/// Which feed endpoint to drive
#[derive(Debug, Clone)]
pub enum FeedKind {
    /// Following timeline
    Timeline,
    /// One author's posts
    Author(MicroblogKey),
    /// Posts the viewer liked
    Likes(MicroblogKey),
    /// Posts of a curated list, by list AT-URI
    List(String),
}

pub struct FeedMediator {
    pub client: Arc<BlueskyClient>,
    pub account_key: AccountKey,
    pub kind: FeedKind,
}

#[async_trait]
impl TimelineMediator for FeedMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let page = match &self.kind {
            FeedKind::Timeline => {
                self.client
                    .get_timeline(page_size, cursor_str(&cursor))
                    .await?
            }
            FeedKind::Author(user_key) => {
                self.client
                    .get_author_feed(&user_key.id, page_size, cursor_str(&cursor))
                    .await?
            }
            FeedKind::Likes(user_key) => {
                self.client
                    .get_actor_likes(&user_key.id, page_size, cursor_str(&cursor))
                    .await?
            }
            FeedKind::List(list_uri) => {
                self.client
                    .get_list_feed(list_uri, page_size, cursor_str(&cursor))
                    .await?
            }
        };
        Ok(feed_page(&self.account_key, page))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Bluesky
    }
}

pub struct SearchPostMediator {
    pub client: Arc<BlueskyClient>,
    pub account_key: AccountKey,
    pub query: String,
}

#[async_trait]
impl TimelineMediator for SearchPostMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let (posts, next) = self
            .client
            .search_posts(&self.query, page_size, cursor_str(&cursor))
            .await?;
        Ok(TimelinePage {
            entries: posts
                .iter()
                .filter_map(|post| mapper::post_entry(&self.account_key, post))
                .collect(),
            end_of_pagination: next.is_none(),
            next_cursor: next.map(Cursor::new),
            prev_cursor: None,
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Bluesky
    }
}

/// Notifications with reference hydration: like/repost notifications carry
/// only the subject's AT-URI, so the mediator batches a `getPosts` call
/// and attaches the hydrated posts before normalization.
pub struct NotificationMediator {
    pub client: Arc<BlueskyClient>,
    pub account_key: AccountKey,
}

#[async_trait]
impl TimelineMediator for NotificationMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let cursor = match &request {
            TimelineRequest::Refresh => None,
            TimelineRequest::Append { cursor } => cursor.clone(),
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let page = self
            .client
            .list_notifications(page_size, cursor_str(&cursor))
            .await?;

        let mut subject_uris: Vec<String> = page
            .notifications
            .iter()
            .filter_map(|n| n.reason_subject.clone())
            .collect();
        subject_uris.sort();
        subject_uris.dedup();

        let mut references: HashMap<String, PostView> = HashMap::new();
        for batch in subject_uris.chunks(HYDRATION_BATCH) {
            for post in self.client.get_posts(batch).await? {
                if let Some(uri) = post.uri.clone() {
                    references.insert(uri, post);
                }
            }
        }

        Ok(TimelinePage {
            entries: page
                .notifications
                .iter()
                .filter_map(|notification| {
                    let reference = notification
                        .reason_subject
                        .as_ref()
                        .and_then(|uri| references.get(uri));
                    mapper::notification_entry(&self.account_key, notification, reference)
                })
                .collect(),
            end_of_pagination: page.cursor.is_none(),
            next_cursor: page.cursor.map(Cursor::new),
            prev_cursor: None,
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Bluesky
    }
}

/// Post detail: walks the parent chain upward and takes the reply tree in
/// depth-first order below the focal post.
pub struct StatusDetailMediator {
    pub client: Arc<BlueskyClient>,
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
        let thread = self.client.get_post_thread(&self.status_key.id).await?;
        let ThreadNode::Post(focal_node) = thread else {
            // The focal post is gone or blocked upstream.
            return Err(crate::error::EngineError::NotFound);
        };
        let Some(focal) = focal_node
            .post
            .as_ref()
            .and_then(|post| mapper::post_entry(&self.account_key, post))
        else {
            return Ok(TimelinePage::end());
        };
        if self.status_only {
            return Ok(TimelinePage {
                entries: vec![focal.with_sort_offset(0)],
                end_of_pagination: true,
                ..TimelinePage::default()
            });
        }

        // Parent chain, nearest first; reverse into display order.
        let mut ancestors = Vec::new();
        let mut parent = focal_node.parent;
        while let Some(ThreadNode::Post(node)) = parent {
            if let Some(entry) = node
                .post
                .as_ref()
                .and_then(|post| mapper::post_entry(&self.account_key, post))
            {
                ancestors.push(entry);
            }
            parent = node.parent;
        }
        ancestors.reverse();

        let mut replies = Vec::new();
        collect_replies(&self.account_key, focal_node.replies, &mut replies);

        Ok(TimelinePage {
            entries: flatten_thread(ancestors, focal, replies),
            end_of_pagination: true,
            ..TimelinePage::default()
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Bluesky
    }
}

fn collect_replies(
    account_key: &AccountKey,
    nodes: Vec<ThreadNode>,
    out: &mut Vec<crate::data::CachedEntry>,
) {
    for node in nodes {
        if let ThreadNode::Post(node) = node {
            if let Some(entry) = node
                .post
                .as_ref()
                .and_then(|post| mapper::post_entry(account_key, post))
            {
                out.push(entry);
            }
            collect_replies(account_key, node.replies, out);
        }
    }
}
