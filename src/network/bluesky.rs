//! Bluesky (AT Protocol) XRPC client and wire models
//!
//! Pagination is opaque-cursor based. Likes and reposts are repo records:
//! creating one returns the record's AT-URI, which the viewer state carries
//! and which is needed later to undo the action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check_status;
use crate::error::Result;

// =============================================================================
// Wire models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub did: Option<String>,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub viewer: Option<ProfileViewerState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewerState {
    pub following: Option<String>,
    pub followed_by: Option<String>,
    pub muted: Option<bool>,
    pub blocked_by: Option<bool>,
}

/// Hydrated post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: Option<String>,
    pub cid: Option<String>,
    pub author: Option<ProfileView>,
    /// The raw `app.bsky.feed.post` record (text, reply refs, facets)
    pub record: Option<serde_json::Value>,
    pub reply_count: Option<i64>,
    pub repost_count: Option<i64>,
    pub like_count: Option<i64>,
    pub quote_count: Option<i64>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub viewer: Option<PostViewerState>,
}

/// Viewer state: AT-URIs of the viewer's own like/repost records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostViewerState {
    pub like: Option<String>,
    pub repost: Option<String>,
    pub bookmarked: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    pub post: Option<PostView>,
    pub reason: Option<serde_json::Value>,
    pub reply: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub feed: Vec<FeedViewPost>,
    pub cursor: Option<String>,
}

/// A node of a post thread. Parents and replies may be missing or blocked;
/// those shapes carry a `$type` discriminator we do not enumerate, so they
/// fall into `Other` and are skipped rather than failing the thread.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThreadNode {
    Post(Box<ThreadViewPost>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadViewPost {
    pub post: Option<PostView>,
    pub parent: Option<ThreadNode>,
    #[serde(default)]
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BskyNotification {
    pub uri: Option<String>,
    pub cid: Option<String>,
    pub author: Option<ProfileView>,
    /// like, repost, follow, mention, reply, quote
    pub reason: Option<String>,
    /// AT-URI of the subject post for like/repost/quote
    pub reason_subject: Option<String>,
    pub is_read: Option<bool>,
    pub indexed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<BskyNotification>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub uri: Option<String>,
    pub cid: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub list_item_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub lists: Vec<ListView>,
    pub cursor: Option<String>,
}

/// Result of `com.atproto.repo.createRecord`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRecord {
    pub uri: String,
    pub cid: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for one Bluesky PDS
pub struct BlueskyClient {
    http: reqwest::Client,
    base_url: String,
    access_jwt: String,
    /// The session's own DID, used as repo for record writes
    did: String,
}

impl BlueskyClient {
    pub fn new(
        http: reqwest::Client,
        service: &str,
        access_jwt: impl Into<String>,
        did: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: format!("https://{}", service.trim_end_matches('/')),
            access_jwt: access_jwt.into(),
            did: did.into(),
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(format!("{}/xrpc/{method}", self.base_url))
            .bearer_auth(&self.access_jwt)
            .query(params)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    async fn procedure<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/xrpc/{method}", self.base_url))
            .bearer_auth(&self.access_jwt)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    fn page_params(limit: usize, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        params
    }

    // -- Feeds --------------------------------------------------------------

    pub async fn get_timeline(&self, limit: usize, cursor: Option<&str>) -> Result<FeedPage> {
        self.query("app.bsky.feed.getTimeline", &Self::page_params(limit, cursor))
            .await
    }

    pub async fn get_author_feed(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<FeedPage> {
        let mut params = Self::page_params(limit, cursor);
        params.push(("actor", actor.to_string()));
        self.query("app.bsky.feed.getAuthorFeed", &params).await
    }

    pub async fn get_actor_likes(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<FeedPage> {
        let mut params = Self::page_params(limit, cursor);
        params.push(("actor", actor.to_string()));
        self.query("app.bsky.feed.getActorLikes", &params).await
    }

    pub async fn get_list_feed(
        &self,
        list_uri: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<FeedPage> {
        let mut params = Self::page_params(limit, cursor);
        params.push(("list", list_uri.to_string()));
        self.query("app.bsky.feed.getListFeed", &params).await
    }

    pub async fn search_posts(
        &self,
        query: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<(Vec<PostView>, Option<String>)> {
        #[derive(Deserialize)]
        struct SearchPage {
            posts: Vec<PostView>,
            cursor: Option<String>,
        }
        let mut params = Self::page_params(limit, cursor);
        params.push(("q", query.to_string()));
        let page: SearchPage = self.query("app.bsky.feed.searchPosts", &params).await?;
        Ok((page.posts, page.cursor))
    }

    pub async fn get_post_thread(&self, uri: &str) -> Result<ThreadNode> {
        #[derive(Deserialize)]
        struct ThreadResponse {
            thread: ThreadNode,
        }
        let response: ThreadResponse = self
            .query(
                "app.bsky.feed.getPostThread",
                &[("uri", uri.to_string())],
            )
            .await?;
        Ok(response.thread)
    }

    /// Batched hydration of up to 25 posts by AT-URI.
    pub async fn get_posts(&self, uris: &[String]) -> Result<Vec<PostView>> {
        #[derive(Deserialize)]
        struct PostsResponse {
            posts: Vec<PostView>,
        }
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<(&str, String)> =
            uris.iter().map(|uri| ("uris", uri.clone())).collect();
        let response: PostsResponse = self.query("app.bsky.feed.getPosts", &params).await?;
        Ok(response.posts)
    }

    pub async fn list_notifications(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<NotificationPage> {
        self.query(
            "app.bsky.notification.listNotifications",
            &Self::page_params(limit, cursor),
        )
        .await
    }

    // -- Record writes ------------------------------------------------------

    pub async fn create_record(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<CreatedRecord> {
        self.procedure(
            "com.atproto.repo.createRecord",
            &serde_json::json!({
                "repo": self.did,
                "collection": collection,
                "record": record,
            }),
        )
        .await
    }

    /// Delete a record by its AT-URI (`at://did/collection/rkey`).
    pub async fn delete_record(&self, uri: &str) -> Result<()> {
        let mut parts = uri.trim_start_matches("at://").splitn(3, '/');
        let repo = parts.next().unwrap_or_default();
        let collection = parts.next().unwrap_or_default();
        let rkey = parts.next().unwrap_or_default();
        let _: serde_json::Value = self
            .procedure(
                "com.atproto.repo.deleteRecord",
                &serde_json::json!({
                    "repo": repo,
                    "collection": collection,
                    "rkey": rkey,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn like(&self, uri: &str, cid: &str) -> Result<CreatedRecord> {
        self.create_record(
            "app.bsky.feed.like",
            serde_json::json!({
                "$type": "app.bsky.feed.like",
                "subject": { "uri": uri, "cid": cid },
                "createdAt": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    pub async fn repost(&self, uri: &str, cid: &str) -> Result<CreatedRecord> {
        self.create_record(
            "app.bsky.feed.repost",
            serde_json::json!({
                "$type": "app.bsky.feed.repost",
                "subject": { "uri": uri, "cid": cid },
                "createdAt": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    pub async fn create_post(
        &self,
        text: &str,
        reply: Option<serde_json::Value>,
    ) -> Result<CreatedRecord> {
        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339(),
        });
        if let Some(reply) = reply {
            record["reply"] = reply;
        }
        self.create_record("app.bsky.feed.post", record).await
    }

    // -- Lists --------------------------------------------------------------

    pub async fn get_lists(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ListPage> {
        let mut params = Self::page_params(limit, cursor);
        params.push(("actor", actor.to_string()));
        self.query("app.bsky.graph.getLists", &params).await
    }

    pub async fn get_list(&self, list_uri: &str) -> Result<ListView> {
        #[derive(Deserialize)]
        struct ListResponse {
            list: ListView,
        }
        let response: ListResponse = self
            .query("app.bsky.graph.getList", &[("list", list_uri.to_string())])
            .await?;
        Ok(response.list)
    }

    pub async fn create_list(
        &self,
        name: &str,
        description: Option<&str>,
        avatar: Option<serde_json::Value>,
    ) -> Result<CreatedRecord> {
        let mut record = serde_json::json!({
            "$type": "app.bsky.graph.list",
            "purpose": "app.bsky.graph.defs#curatelist",
            "name": name,
            "createdAt": Utc::now().to_rfc3339(),
        });
        if let Some(description) = description {
            record["description"] = description.into();
        }
        if let Some(avatar) = avatar {
            record["avatar"] = avatar;
        }
        self.create_record("app.bsky.graph.list", record).await
    }

    pub async fn add_list_member(&self, list_uri: &str, did: &str) -> Result<CreatedRecord> {
        self.create_record(
            "app.bsky.graph.listitem",
            serde_json::json!({
                "$type": "app.bsky.graph.listitem",
                "subject": did,
                "list": list_uri,
                "createdAt": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    // -- Relationships ------------------------------------------------------

    pub async fn follow(&self, did: &str) -> Result<CreatedRecord> {
        self.create_record(
            "app.bsky.graph.follow",
            serde_json::json!({
                "$type": "app.bsky.graph.follow",
                "subject": did,
                "createdAt": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    pub async fn get_profile(&self, actor: &str) -> Result<ProfileView> {
        self.query("app.bsky.actor.getProfile", &[("actor", actor.to_string())])
            .await
    }
}
