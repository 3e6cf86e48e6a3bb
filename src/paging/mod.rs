//! Backend-agnostic paging engine
//!
//! A [`TimelinePager`] drives one paging key: it turns UI refresh/scroll
//! signals into mediator fetches, commits fetched pages to the cache store,
//! and tracks cursor and end-of-pagination state. Mediators only fetch and
//! normalize; all cache commits happen here so refresh atomicity, stale
//! discard, and cancellation live in one place.

mod pager;

pub use pager::{LoadOutcome, PagerState, TimelinePager};

use async_trait::async_trait;

use crate::data::CachedEntry;
use crate::error::Result;
use crate::model::PlatformType;

/// Opaque pagination cursor
///
/// Backends hide their idiom behind this: opaque strings, `max_id` style
/// IDs, or numeric offsets rendered to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a numeric cursor; `None` when the cursor is not numeric.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The three request kinds of the mediator contract
#[derive(Debug, Clone)]
pub enum TimelineRequest {
    /// Fetch the newest page; prior entries for the key will be discarded
    Refresh,
    /// Fetch the next page below the loaded window
    Append { cursor: Option<Cursor> },
    /// Fetch newer items above the current top
    Prepend { cursor: Option<Cursor> },
}

impl TimelineRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Refresh => RequestKind::Refresh,
            Self::Append { .. } => RequestKind::Append,
            Self::Prepend { .. } => RequestKind::Prepend,
        }
    }
}

/// Request kind without cursor payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Refresh,
    Append,
    Prepend,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Append => "append",
            Self::Prepend => "prepend",
        }
    }
}

/// One fetched, normalized page
#[derive(Debug, Default)]
pub struct TimelinePage {
    /// Normalized entries in backend order (newest first for feeds)
    pub entries: Vec<CachedEntry>,
    /// Cursor for the next `Append`, `None` when the backend is exhausted
    pub next_cursor: Option<Cursor>,
    /// Cursor for a later `Prepend`, where the backend supports one
    pub prev_cursor: Option<Cursor>,
    /// Sticky until the next `Refresh`
    pub end_of_pagination: bool,
}

impl TimelinePage {
    /// A page signalling "nothing above/below, stop asking".
    pub fn end() -> Self {
        Self {
            end_of_pagination: true,
            ..Self::default()
        }
    }

    /// Whether every entry carries an explicit sort offset (thread pages).
    pub(crate) fn is_explicitly_sorted(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.sort_offset.is_some())
    }
}

/// Remote mediator contract, one implementation per (backend, feed kind)
///
/// Implementations translate the request into the backend's own paging
/// idiom, call the injected client, and map the response through the
/// backend's normalization mapper. Errors are returned, never thrown past
/// this boundary.
#[async_trait]
pub trait TimelineMediator: Send + Sync {
    async fn timeline(&self, page_size: usize, request: TimelineRequest) -> Result<TimelinePage>;

    /// Platform label for metrics and logs.
    fn platform(&self) -> PlatformType;
}
