//! Backend HTTP clients and wire models
//!
//! One module per protocol. Each client owns a `reqwest::Client` plus the
//! instance base URL and credentials, injected at construction. Wire models
//! are deliberately `Option`-heavy: backends omit and rename fields across
//! versions, and a missing field must never fail a whole page.

pub mod bluesky;
pub mod mastodon;
pub mod misskey;
pub mod vvo;
pub mod xqt;

use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{EngineError, Result};

/// Build the shared reqwest client from network configuration.
pub fn build_http_client(config: &NetworkConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| EngineError::Internal(e.into()))
}

/// Check an HTTP response status and classify failures.
///
/// Success passes the response through for body decoding; error statuses
/// are mapped onto the engine taxonomy without reading the body.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status.as_u16() {
        401 | 403 => EngineError::Auth,
        404 => EngineError::NotFound,
        code if status.is_server_error() => {
            EngineError::Transport(format!("backend returned {code}"))
        }
        code => EngineError::Protocol(format!("backend returned {code}")),
    })
}
