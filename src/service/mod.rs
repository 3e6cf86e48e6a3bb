//! Service layer
//!
//! Optimistic mutations, list handling, direct messages, and the
//! per-account facade that wires clients, pagers and actions together.

pub mod account;
pub mod list;
pub mod message;
pub mod status;
