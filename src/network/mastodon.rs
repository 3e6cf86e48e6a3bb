//! Mastodon API client and wire models
//!
//! Pagination is `max_id`/`min_id` based: `max_id` walks backwards in time,
//! `min_id` fetches newer items above the current top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check_status;
use crate::error::Result;

// =============================================================================
// Wire models
// =============================================================================

/// Account as returned by the Mastodon API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<String>,
    pub username: Option<String>,
    pub acct: Option<String>,
    pub display_name: Option<String>,
    pub note: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub header: Option<String>,
    pub locked: Option<bool>,
    pub bot: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub followers_count: Option<i64>,
    pub following_count: Option<i64>,
    pub statuses_count: Option<i64>,
}

/// Status (post/toot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: Option<String>,
    pub uri: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub account: Option<Account>,
    pub content: Option<String>,
    pub spoiler_text: Option<String>,
    pub visibility: Option<String>,
    pub sensitive: Option<bool>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    pub reblog: Option<Box<Status>>,
    pub replies_count: Option<i64>,
    pub reblogs_count: Option<i64>,
    pub favourites_count: Option<i64>,
    pub favourited: Option<bool>,
    pub reblogged: Option<bool>,
    pub bookmarked: Option<bool>,
    pub media_attachments: Option<Vec<MediaAttachment>>,
    pub language: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Media attached to a status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub preview_url: Option<String>,
    pub description: Option<String>,
    pub blurhash: Option<String>,
}

/// Notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub account: Option<Account>,
    pub status: Option<Status>,
}

/// Thread context for a status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub ancestors: Vec<Status>,
    pub descendants: Vec<Status>,
}

/// Curated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub id: Option<String>,
    pub title: Option<String>,
    pub replies_policy: Option<String>,
}

/// Direct-message conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub unread: Option<bool>,
    pub accounts: Option<Vec<Account>>,
    pub last_status: Option<Status>,
}

/// Relationship with another account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Option<String>,
    pub following: Option<bool>,
    pub followed_by: Option<bool>,
    pub blocking: Option<bool>,
    pub muting: Option<bool>,
    pub requested: Option<bool>,
}

/// Request body for posting a status
#[derive(Debug, Clone, Serialize)]
pub struct PostStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoiler_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for one Mastodon instance
pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(http: reqwest::Client, instance: &str, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: format!("https://{}", instance.trim_end_matches('/')),
            access_token: access_token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path_and_query))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    async fn post_empty<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    fn page_query(limit: usize, max_id: Option<&str>, min_id: Option<&str>) -> String {
        let mut query = format!("?limit={limit}");
        if let Some(max_id) = max_id {
            query.push_str(&format!("&max_id={max_id}"));
        }
        if let Some(min_id) = min_id {
            query.push_str(&format!("&min_id={min_id}"));
        }
        query
    }

    // -- Timelines ----------------------------------------------------------

    pub async fn home_timeline(
        &self,
        limit: usize,
        max_id: Option<&str>,
        min_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/timelines/home{}",
            Self::page_query(limit, max_id, min_id)
        ))
        .await
    }

    pub async fn public_timeline(
        &self,
        local: bool,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/timelines/public{}&local={local}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn user_timeline(
        &self,
        user_id: &str,
        limit: usize,
        max_id: Option<&str>,
        only_media: bool,
    ) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/accounts/{user_id}/statuses{}&only_media={only_media}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn list_timeline(
        &self,
        list_id: &str,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/timelines/list/{list_id}{}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn bookmarks(&self, limit: usize, max_id: Option<&str>) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/bookmarks{}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn favourites(&self, limit: usize, max_id: Option<&str>) -> Result<Vec<Status>> {
        self.get_json(&format!(
            "/api/v1/favourites{}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn notifications(
        &self,
        limit: usize,
        max_id: Option<&str>,
        mentions_only: bool,
    ) -> Result<Vec<Notification>> {
        let mut path = format!(
            "/api/v1/notifications{}",
            Self::page_query(limit, max_id, None)
        );
        if mentions_only {
            path.push_str("&types[]=mention");
        }
        self.get_json(&path).await
    }

    pub async fn search_statuses(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Status>> {
        #[derive(Deserialize)]
        struct SearchResult {
            statuses: Vec<Status>,
        }
        let encoded = urlencoding::encode(query);
        let result: SearchResult = self
            .get_json(&format!(
                "/api/v2/search?q={encoded}&type=statuses&limit={limit}&offset={offset}"
            ))
            .await?;
        Ok(result.statuses)
    }

    pub async fn conversations(
        &self,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<Conversation>> {
        self.get_json(&format!(
            "/api/v1/conversations{}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    // -- Single entities ----------------------------------------------------

    pub async fn get_status(&self, id: &str) -> Result<Status> {
        self.get_json(&format!("/api/v1/statuses/{id}")).await
    }

    pub async fn context(&self, id: &str) -> Result<Context> {
        self.get_json(&format!("/api/v1/statuses/{id}/context"))
            .await
    }

    pub async fn lookup_user(&self, id: &str) -> Result<Account> {
        self.get_json(&format!("/api/v1/accounts/{id}")).await
    }

    // -- Status actions -----------------------------------------------------

    pub async fn favourite(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/favourite"))
            .await
    }

    pub async fn unfavourite(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/unfavourite"))
            .await
    }

    pub async fn reblog(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/reblog"))
            .await
    }

    pub async fn unreblog(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/unreblog"))
            .await
    }

    pub async fn bookmark(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/bookmark"))
            .await
    }

    pub async fn unbookmark(&self, id: &str) -> Result<Status> {
        self.post_empty(&format!("/api/v1/statuses/{id}/unbookmark"))
            .await
    }

    pub async fn delete_status(&self, id: &str) -> Result<Status> {
        let response = self
            .http
            .delete(format!("{}/api/v1/statuses/{id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    /// Post a new status. The idempotency key prevents duplicate posts on
    /// retried requests.
    pub async fn post_status(&self, idempotency_key: &str, body: &PostStatus) -> Result<Status> {
        let response = self
            .http
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&self.access_token)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    // -- Relationships ------------------------------------------------------

    pub async fn follow(&self, user_id: &str) -> Result<Relationship> {
        self.post_empty(&format!("/api/v1/accounts/{user_id}/follow"))
            .await
    }

    pub async fn unfollow(&self, user_id: &str) -> Result<Relationship> {
        self.post_empty(&format!("/api/v1/accounts/{user_id}/unfollow"))
            .await
    }

    // -- Lists --------------------------------------------------------------

    pub async fn lists(&self) -> Result<Vec<List>> {
        self.get_json("/api/v1/lists").await
    }

    pub async fn create_list(&self, title: &str) -> Result<List> {
        self.post_json("/api/v1/lists", &serde_json::json!({ "title": title }))
            .await
    }

    pub async fn update_list(&self, id: &str, title: &str) -> Result<List> {
        let response = self
            .http
            .put(format!("{}/api/v1/lists/{id}", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    pub async fn delete_list(&self, id: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/api/v1/lists/{id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    pub async fn list_accounts(
        &self,
        list_id: &str,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<Account>> {
        self.get_json(&format!(
            "/api/v1/lists/{list_id}/accounts{}",
            Self::page_query(limit, max_id, None)
        ))
        .await
    }

    pub async fn add_list_accounts(&self, list_id: &str, account_ids: &[String]) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/api/v1/lists/{list_id}/accounts"),
                &serde_json::json!({ "account_ids": account_ids }),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_list_accounts(&self, list_id: &str, account_ids: &[String]) -> Result<()> {
        let response = self
            .http
            .delete(format!(
                "{}/api/v1/lists/{list_id}/accounts",
                self.base_url
            ))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "account_ids": account_ids }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }
}
