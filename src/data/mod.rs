//! Cache store layer
//!
//! The single source of truth for UI consumption. Rows are written only by
//! mediators (through the mappers) and the mutation engine; the UI reads
//! them through reactive subscriptions.

mod models;
mod store;

#[cfg(test)]
mod store_test;

pub use models::*;
pub use store::{CacheStore, ChangeEvent, TimelineItem};
