//! Remote mediators, one module per backend
//!
//! Each mediator implements the three-request contract for one feed kind:
//! translate the request into the backend's paging idiom, call the injected
//! client, normalize through the backend's mapper. Commits are the paging
//! engine's job, so a mediator failure can never leave the cache half
//! written.

pub mod bluesky;
pub mod mastodon;
pub mod misskey;
pub mod vvo;
pub mod xqt;
