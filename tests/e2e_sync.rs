//! End-to-end timeline synchronization scenarios
//!
//! Drives the public paging API against mock mediators and a real
//! in-memory cache store, covering the ordering, atomicity and staleness
//! guarantees the engine makes per paging key.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;

use roost::data::{CacheStore, CachedEntry, StatusContent, StatusRow};
use roost::error::Result;
use roost::mapper::flatten_thread;
use roost::model::{AccountKey, MicroblogKey, PlatformType};
use roost::paging::{
    Cursor, LoadOutcome, TimelineMediator, TimelinePage, TimelinePager, TimelineRequest,
};

fn account() -> AccountKey {
    MicroblogKey::new("me", "example.test")
}

fn entry(id: &str) -> CachedEntry {
    CachedEntry::new(
        StatusRow {
            status_key: MicroblogKey::new(id, "example.test"),
            account_key: account(),
            platform_type: PlatformType::Mastodon,
            user_key: None,
            content: StatusContent::Unknown(serde_json::json!({ "id": id })),
        },
        None,
    )
}

async fn new_pager(mediator: Arc<dyn TimelineMediator>) -> (Arc<CacheStore>, TimelinePager) {
    let store = Arc::new(CacheStore::connect_in_memory().await.unwrap());
    let pager = TimelinePager::new(
        Arc::clone(&store),
        mediator,
        account(),
        "home_me@example.test".to_string(),
        20,
    );
    (store, pager)
}

/// Serves numbered pages: refresh yields items 0..20 with a cursor,
/// append yields the next 20 past the cursor.
struct PagedMediator;

#[async_trait]
impl TimelineMediator for PagedMediator {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        let start = match &request {
            TimelineRequest::Refresh => 0,
            TimelineRequest::Append { cursor } => {
                cursor.as_ref().and_then(Cursor::as_i64).unwrap_or(0) as usize
            }
            TimelineRequest::Prepend { .. } => return Ok(TimelinePage::end()),
        };
        let entries: Vec<CachedEntry> = (start..start + page_size)
            .map(|i| entry(&format!("item-{i}")))
            .collect();
        Ok(TimelinePage {
            entries,
            next_cursor: Some(Cursor::new((start + page_size).to_string())),
            prev_cursor: None,
            end_of_pagination: false,
        })
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

#[tokio::test]
async fn refresh_then_append_builds_a_contiguous_feed() {
    let (store, pager) = new_pager(Arc::new(PagedMediator)).await;

    assert_eq!(pager.refresh().await.unwrap(), LoadOutcome::Completed);
    let rows = store
        .paging_rows(&account(), "home_me@example.test")
        .await
        .unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(
        rows.iter().map(|r| r.sort_id).collect::<Vec<i64>>(),
        (0..20).collect::<Vec<i64>>()
    );

    assert_eq!(pager.load_more().await.unwrap(), LoadOutcome::Completed);
    let rows = store
        .paging_rows(&account(), "home_me@example.test")
        .await
        .unwrap();
    assert_eq!(rows.len(), 40);
    assert_eq!(
        rows.iter().map(|r| r.sort_id).collect::<Vec<i64>>(),
        (0..40).collect::<Vec<i64>>()
    );

    let mut keys: Vec<String> = rows.iter().map(|r| r.status_key.to_string()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 40, "no duplicate status keys across pages");
}

#[tokio::test]
async fn observers_see_each_committed_page() {
    let (store, pager) = new_pager(Arc::new(PagedMediator)).await;
    let mut stream = Box::pin(
        store.observe_timeline(account(), "home_me@example.test".to_string()),
    );
    assert!(stream.next().await.unwrap().is_empty());

    pager.refresh().await.unwrap();
    assert_eq!(stream.next().await.unwrap().len(), 20);

    pager.load_more().await.unwrap();
    assert_eq!(stream.next().await.unwrap().len(), 40);
}

/// Mediator whose appends block until released, letting the test overlap
/// a refresh with an in-flight append deterministically.
struct GatedMediator {
    entered_append: Notify,
    release_append: Notify,
    refreshes: AtomicUsize,
}

#[async_trait]
impl TimelineMediator for GatedMediator {
    async fn timeline(&self, _page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        match request {
            TimelineRequest::Refresh => {
                let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(TimelinePage {
                    entries: vec![entry(&format!("fresh-{n}"))],
                    next_cursor: Some(Cursor::new("next")),
                    prev_cursor: None,
                    end_of_pagination: false,
                })
            }
            TimelineRequest::Append { .. } => {
                self.entered_append.notify_one();
                self.release_append.notified().await;
                Ok(TimelinePage {
                    entries: vec![entry("stale-append")],
                    next_cursor: None,
                    prev_cursor: None,
                    end_of_pagination: true,
                })
            }
            TimelineRequest::Prepend { .. } => Ok(TimelinePage::end()),
        }
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

#[tokio::test]
async fn append_overtaken_by_refresh_is_discarded() {
    let mediator = Arc::new(GatedMediator {
        entered_append: Notify::new(),
        release_append: Notify::new(),
        refreshes: AtomicUsize::new(0),
    });
    let store = Arc::new(CacheStore::connect_in_memory().await.unwrap());
    let pager = Arc::new(TimelinePager::new(
        Arc::clone(&store),
        mediator.clone() as Arc<dyn TimelineMediator>,
        account(),
        "home_me@example.test".to_string(),
        20,
    ));

    pager.refresh().await.unwrap();

    let append_pager = Arc::clone(&pager);
    let append = tokio::spawn(async move { append_pager.load_more().await });
    // Wait until the append is parked at its gate, then refresh over it.
    mediator.entered_append.notified().await;

    pager.refresh().await.unwrap();
    mediator.release_append.notify_one();

    assert_eq!(append.await.unwrap().unwrap(), LoadOutcome::Discarded);

    let rows = store
        .paging_rows(&account(), "home_me@example.test")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status_key.id, "fresh-1");
}

/// Serves a fixed reply thread around a focal post.
struct ThreadMediator;

#[async_trait]
impl TimelineMediator for ThreadMediator {
    async fn timeline(&self, _page_size: usize, request: TimelineRequest) -> Result<TimelinePage> {
        match request {
            TimelineRequest::Refresh => Ok(TimelinePage {
                entries: flatten_thread(
                    vec![entry("ancestor-1"), entry("ancestor-2")],
                    entry("focal"),
                    vec![entry("reply-1"), entry("reply-2"), entry("reply-3")],
                ),
                next_cursor: None,
                prev_cursor: None,
                end_of_pagination: true,
            }),
            _ => Ok(TimelinePage::end()),
        }
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

#[tokio::test]
async fn thread_detail_orders_ancestors_focal_replies() {
    let (store, pager) = new_pager(Arc::new(ThreadMediator)).await;
    pager.refresh().await.unwrap();

    let items = store
        .timeline_items(&account(), "home_me@example.test")
        .await
        .unwrap();
    let order: Vec<&str> = items
        .iter()
        .map(|item| item.status.status_key.id.as_str())
        .collect();
    assert_eq!(
        order,
        vec!["ancestor-1", "ancestor-2", "focal", "reply-1", "reply-2", "reply-3"]
    );
    assert!(items[0].sort_id < items[2].sort_id);
    assert_eq!(items[2].sort_id, 0);
}

/// A mediator that always fails, for error-state behavior.
struct BrokenMediator;

#[async_trait]
impl TimelineMediator for BrokenMediator {
    async fn timeline(&self, _page_size: usize, _request: TimelineRequest) -> Result<TimelinePage> {
        Err(roost::error::EngineError::Transport(
            "connection refused".to_string(),
        ))
    }

    fn platform(&self) -> PlatformType {
        PlatformType::Mastodon
    }
}

#[tokio::test]
async fn errors_surface_as_state_without_touching_cache() {
    let (store, pager) = new_pager(Arc::new(PagedMediator)).await;
    pager.refresh().await.unwrap();

    let broken = TimelinePager::new(
        Arc::clone(&store),
        Arc::new(BrokenMediator),
        account(),
        "home_me@example.test".to_string(),
        20,
    );
    assert!(broken.refresh().await.is_err());

    // Cached content from the earlier pager is intact: stale but present.
    assert_eq!(
        store
            .timeline_count(&account(), "home_me@example.test")
            .await
            .unwrap(),
        20
    );
}
