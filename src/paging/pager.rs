//! Per-key paging state machine
//!
//! State per paging key: `Idle -> Loading(kind) -> {Idle | Error}`. A
//! concurrent request of the same kind while one is in flight is coalesced,
//! not queued. Append and prepend are also ignored while any fetch is in
//! flight; refresh may overtake a running append, whose result is then
//! discarded via the generation counter when it completes.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Cursor, RequestKind, TimelineMediator, TimelinePage, TimelineRequest};
use crate::data::{CacheStore, TimelineItem};
use crate::error::{EngineError, Result};
use crate::metrics::{ERRORS_TOTAL, REMOTE_FETCHES_TOTAL};
use crate::model::AccountKey;

/// Observable paging state for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerState {
    Idle,
    Loading(RequestKind),
    Error {
        kind: RequestKind,
        message: String,
        retryable: bool,
    },
}

/// What a load request actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched and committed a page
    Completed,
    /// An equivalent fetch was already in flight; nothing was issued
    Coalesced,
    /// The mediator previously signalled no more pages in this direction
    EndOfPagination,
    /// The fetch completed but a refresh had committed in the meantime;
    /// the stale page was dropped without touching the cache
    Discarded,
}

#[derive(Debug, Default)]
struct InFlight {
    refresh: bool,
    append: bool,
    prepend: bool,
}

impl InFlight {
    fn get(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Refresh => self.refresh,
            RequestKind::Append => self.append,
            RequestKind::Prepend => self.prepend,
        }
    }

    fn set(&mut self, kind: RequestKind, value: bool) {
        match kind {
            RequestKind::Refresh => self.refresh = value,
            RequestKind::Append => self.append = value,
            RequestKind::Prepend => self.prepend = value,
        }
    }

    fn any(&self) -> bool {
        self.refresh || self.append || self.prepend
    }
}

struct PagerInner {
    state: PagerState,
    next_cursor: Option<Cursor>,
    prev_cursor: Option<Cursor>,
    end_reached: bool,
    prepend_done: bool,
    /// Bumped when a refresh commits; append results from an older
    /// generation are discarded instead of committed
    generation: u64,
    in_flight: InFlight,
}

/// Paging driver for one `(account, paging key)` pair
///
/// Exposes `refresh`/`load_more`/`prepend` triggers plus a reactive view
/// backed by the cache store. At most one fetch of each kind is in flight
/// at a time; end-of-pagination is sticky until the next refresh.
pub struct TimelinePager {
    store: Arc<CacheStore>,
    mediator: Arc<dyn TimelineMediator>,
    account_key: AccountKey,
    paging_key: String,
    page_size: usize,
    inner: Mutex<PagerInner>,
    cancel: CancellationToken,
}

impl TimelinePager {
    pub fn new(
        store: Arc<CacheStore>,
        mediator: Arc<dyn TimelineMediator>,
        account_key: AccountKey,
        paging_key: String,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            mediator,
            account_key,
            paging_key,
            page_size: page_size.clamp(1, 100),
            inner: Mutex::new(PagerInner {
                state: PagerState::Idle,
                next_cursor: None,
                prev_cursor: None,
                end_reached: false,
                prepend_done: false,
                generation: 0,
                in_flight: InFlight::default(),
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn paging_key(&self) -> &str {
        &self.paging_key
    }

    /// Cancel any in-flight fetch. Called when the owning UI scope goes
    /// away or the active account switches. The cache is never left
    /// partially written: cancellation is checked before commit, not
    /// during one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn state(&self) -> PagerState {
        self.inner.lock().await.state.clone()
    }

    /// Discard prior entries for this key, fetch the newest page, reset
    /// cursor state.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        self.load(RequestKind::Refresh).await
    }

    /// Fetch the next page below the loaded window. No-op once the
    /// mediator signalled end-of-pagination, until the next refresh.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        self.load(RequestKind::Append).await
    }

    /// Fetch newer items above the current top. Backends without a prepend
    /// cursor report end-of-pagination immediately.
    pub async fn prepend(&self) -> Result<LoadOutcome> {
        self.load(RequestKind::Prepend).await
    }

    /// Reactive view of this key, backed by the cache store.
    pub fn observe(&self) -> impl Stream<Item = Vec<TimelineItem>> {
        self.store
            .observe_timeline(self.account_key.clone(), self.paging_key.clone())
    }

    async fn load(&self, kind: RequestKind) -> Result<LoadOutcome> {
        let (request, generation) = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight.get(kind) {
                return Ok(LoadOutcome::Coalesced);
            }
            match kind {
                RequestKind::Append if inner.end_reached => {
                    return Ok(LoadOutcome::EndOfPagination);
                }
                RequestKind::Prepend if inner.prepend_done => {
                    return Ok(LoadOutcome::EndOfPagination);
                }
                // A refresh may overtake a running append; other kinds
                // wait out whatever is in flight.
                RequestKind::Append | RequestKind::Prepend if inner.in_flight.any() => {
                    return Ok(LoadOutcome::Coalesced);
                }
                _ => {}
            }
            let request = match kind {
                RequestKind::Refresh => TimelineRequest::Refresh,
                RequestKind::Append => TimelineRequest::Append {
                    cursor: inner.next_cursor.clone(),
                },
                RequestKind::Prepend => TimelineRequest::Prepend {
                    cursor: inner.prev_cursor.clone(),
                },
            };
            inner.in_flight.set(kind, true);
            inner.state = PagerState::Loading(kind);
            (request, inner.generation)
        };

        let fetched = tokio::select! {
            page = self.mediator.timeline(self.page_size, request) => page,
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
        };

        let mut inner = self.inner.lock().await;
        inner.in_flight.set(kind, false);

        let page = match fetched {
            Ok(page) => page,
            Err(error) => {
                REMOTE_FETCHES_TOTAL
                    .with_label_values(&[
                        self.mediator.platform().as_str(),
                        kind.as_str(),
                        "error",
                    ])
                    .inc();
                ERRORS_TOTAL
                    .with_label_values(&[error.kind(), self.mediator.platform().as_str()])
                    .inc();
                tracing::warn!(
                    paging_key = %self.paging_key,
                    request = kind.as_str(),
                    error = %error,
                    "Timeline fetch failed"
                );
                inner.state = if matches!(error, EngineError::Cancelled) {
                    PagerState::Idle
                } else {
                    PagerState::Error {
                        kind,
                        message: error.to_string(),
                        retryable: error.is_retryable(),
                    }
                };
                return Err(error);
            }
        };

        // A refresh committed while this fetch was in flight: the page is
        // stale and must not touch the cache.
        if kind != RequestKind::Refresh && inner.generation != generation {
            inner.state = PagerState::Idle;
            return Ok(LoadOutcome::Discarded);
        }
        if self.cancel.is_cancelled() {
            inner.state = PagerState::Idle;
            return Err(EngineError::Cancelled);
        }

        match kind {
            RequestKind::Refresh => {
                if page.is_explicitly_sorted() {
                    self.store
                        .replace_thread(&self.account_key, &self.paging_key, &page.entries)
                        .await?;
                } else {
                    self.store
                        .replace_page(&self.account_key, &self.paging_key, &page.entries)
                        .await?;
                }
                inner.next_cursor = page.next_cursor;
                inner.prev_cursor = page.prev_cursor;
                inner.end_reached = page.end_of_pagination;
                inner.prepend_done = false;
                inner.generation += 1;
            }
            RequestKind::Append => {
                self.store
                    .append_page(&self.account_key, &self.paging_key, &page.entries)
                    .await?;
                inner.next_cursor = page.next_cursor;
                inner.end_reached = page.end_of_pagination;
            }
            RequestKind::Prepend => {
                self.store
                    .prepend_page(&self.account_key, &self.paging_key, &page.entries)
                    .await?;
                if page.prev_cursor.is_some() {
                    inner.prev_cursor = page.prev_cursor;
                }
                inner.prepend_done = page.end_of_pagination;
            }
        }
        inner.state = PagerState::Idle;
        REMOTE_FETCHES_TOTAL
            .with_label_values(&[
                self.mediator.platform().as_str(),
                kind.as_str(),
                "success",
            ])
            .inc();
        Ok(LoadOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CachedEntry, StatusContent, StatusRow};
    use crate::model::{MicroblogKey, PlatformType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

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

    /// Mediator that counts fetches and waits before responding, so tests
    /// can race requests against each other deterministically.
    struct SlowMediator {
        fetches: AtomicUsize,
        delay: Duration,
        per_page: usize,
    }

    #[async_trait]
    impl TimelineMediator for SlowMediator {
        async fn timeline(
            &self,
            _page_size: usize,
            request: TimelineRequest,
        ) -> crate::error::Result<TimelinePage> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let entries = (0..self.per_page)
                .map(|i| entry(&format!("s{}-{}", n, i)))
                .collect();
            Ok(TimelinePage {
                entries,
                next_cursor: Some(Cursor::new(format!("c{n}"))),
                prev_cursor: None,
                end_of_pagination: matches!(request, TimelineRequest::Prepend { .. }),
            })
        }

        fn platform(&self) -> PlatformType {
            PlatformType::Mastodon
        }
    }

    async fn pager_with(mediator: Arc<dyn TimelineMediator>) -> (Arc<CacheStore>, TimelinePager) {
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

    #[tokio::test]
    async fn concurrent_refreshes_fetch_once() {
        let mediator = Arc::new(SlowMediator {
            fetches: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            per_page: 3,
        });
        let (store, pager) = pager_with(mediator.clone()).await;

        let (first, second) = tokio::join!(pager.refresh(), pager.refresh());
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.contains(&LoadOutcome::Completed));
        assert!(outcomes.contains(&LoadOutcome::Coalesced));
        assert_eq!(mediator.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            store
                .timeline_count(&account(), "home_me@example.test")
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn append_after_end_is_a_no_op() {
        struct EndMediator;
        #[async_trait]
        impl TimelineMediator for EndMediator {
            async fn timeline(
                &self,
                _page_size: usize,
                _request: TimelineRequest,
            ) -> crate::error::Result<TimelinePage> {
                Ok(TimelinePage {
                    entries: vec![entry("only")],
                    next_cursor: None,
                    prev_cursor: None,
                    end_of_pagination: true,
                })
            }
            fn platform(&self) -> PlatformType {
                PlatformType::Mastodon
            }
        }
        let (_store, pager) = pager_with(Arc::new(EndMediator)).await;
        pager.refresh().await.unwrap();
        assert_eq!(
            pager.load_more().await.unwrap(),
            LoadOutcome::EndOfPagination
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_existing_entries() {
        struct FlakyMediator {
            fetches: AtomicUsize,
        }
        #[async_trait]
        impl TimelineMediator for FlakyMediator {
            async fn timeline(
                &self,
                _page_size: usize,
                _request: TimelineRequest,
            ) -> crate::error::Result<TimelinePage> {
                if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(TimelinePage {
                        entries: vec![entry("kept-1"), entry("kept-2")],
                        next_cursor: None,
                        prev_cursor: None,
                        end_of_pagination: true,
                    })
                } else {
                    Err(EngineError::Transport("connection reset".to_string()))
                }
            }
            fn platform(&self) -> PlatformType {
                PlatformType::Mastodon
            }
        }
        let (store, pager) = pager_with(Arc::new(FlakyMediator {
            fetches: AtomicUsize::new(0),
        }))
        .await;
        pager.refresh().await.unwrap();
        assert!(pager.refresh().await.is_err());
        assert_eq!(
            store
                .timeline_count(&account(), "home_me@example.test")
                .await
                .unwrap(),
            2
        );
        match pager.state().await {
            PagerState::Error { kind, retryable, .. } => {
                assert_eq!(kind, RequestKind::Refresh);
                assert!(retryable);
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_cache_untouched() {
        let mediator = Arc::new(SlowMediator {
            fetches: AtomicUsize::new(0),
            delay: Duration::from_secs(5),
            per_page: 3,
        });
        let (store, pager) = pager_with(mediator).await;
        let refresh = pager.refresh();
        tokio::pin!(refresh);
        tokio::select! {
            _ = &mut refresh => panic!("refresh should not complete"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => pager.cancel(),
        }
        assert!(matches!(refresh.await, Err(EngineError::Cancelled)));
        assert_eq!(
            store
                .timeline_count(&account(), "home_me@example.test")
                .await
                .unwrap(),
            0
        );
    }
}
