//! VVO mobile API client and wire models
//!
//! Pagination is numeric: timelines walk backwards with an i64 `max_id`,
//! container feeds use a 1-based `page` index. Responses wrap payloads in
//! an `ok`/`data` envelope.

use serde::{Deserialize, Serialize};

use super::check_status;
use crate::error::{EngineError, Result};

// =============================================================================
// Wire models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub screen_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub description: Option<String>,
    pub verified: Option<bool>,
    pub follow_me: Option<bool>,
    pub following: Option<bool>,
    pub followers_count: Option<serde_json::Value>,
    pub statuses_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Numeric ID as string
    pub id: Option<String>,
    /// Base62 message ID used by some endpoints
    pub bid: Option<String>,
    pub text: Option<String>,
    pub raw_text: Option<String>,
    pub created_at: Option<String>,
    pub user: Option<User>,
    pub source: Option<String>,
    pub reposts_count: Option<i64>,
    pub comments_count: Option<i64>,
    pub attitudes_count: Option<i64>,
    /// Whether the viewer has liked this
    pub favorited: Option<bool>,
    pub retweeted_status: Option<Box<Status>>,
    pub pics: Option<serde_json::Value>,
    pub page_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<String>,
    pub user: Option<User>,
    pub like_count: Option<i64>,
    pub liked: Option<bool>,
    pub reply_comment: Option<Box<Comment>>,
}

/// Timeline envelope: statuses plus the next numeric cursor
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineData {
    #[serde(default)]
    pub statuses: Vec<Status>,
    pub max_id: Option<i64>,
}

/// A direct-message room summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRoom {
    pub unread_count: Option<i64>,
    pub user: Option<User>,
    pub scheme: Option<String>,
    pub text: Option<String>,
    pub updated_at: Option<String>,
}

/// One direct message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub sender_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub text: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    ok: Option<i64>,
    data: Option<T>,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for the VVO mobile API
pub struct VvoClient {
    http: reqwest::Client,
    base_url: String,
    cookie: String,
    /// XSRF token required by mutation endpoints
    st: String,
}

impl VvoClient {
    pub fn new(
        http: reqwest::Client,
        host: &str,
        cookie: impl Into<String>,
        st: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: format!("https://{}", host.trim_end_matches('/')),
            cookie: cookie.into(),
            st: st.into(),
        }
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("Cookie", &self.cookie)
            .send()
            .await?;
        let envelope: Envelope<T> = check_status(response)?.json().await?;
        if envelope.ok != Some(1) {
            return Err(EngineError::Protocol("vvo response not ok".to_string()));
        }
        envelope
            .data
            .ok_or_else(|| EngineError::Protocol("vvo response missing data".to_string()))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        let mut form: Vec<(&str, &str)> = form.to_vec();
        form.push(("st", self.st.as_str()));
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Cookie", &self.cookie)
            .form(&form)
            .send()
            .await?;
        let envelope: Envelope<T> = check_status(response)?.json().await?;
        if envelope.ok != Some(1) {
            return Err(EngineError::Protocol("vvo response not ok".to_string()));
        }
        envelope
            .data
            .ok_or_else(|| EngineError::Protocol("vvo response missing data".to_string()))
    }

    // -- Timelines ----------------------------------------------------------

    pub async fn home_timeline(&self, max_id: Option<i64>) -> Result<TimelineData> {
        let query = match max_id {
            Some(max_id) => format!("?max_id={max_id}"),
            None => String::new(),
        };
        self.get_data(&format!("/feed/friends{query}")).await
    }

    /// Container feeds (user profiles, search) paginate by 1-based page.
    pub async fn container_timeline(&self, container_id: &str, page: i64) -> Result<Vec<Status>> {
        #[derive(Deserialize)]
        struct ContainerData {
            #[serde(default)]
            cards: Vec<serde_json::Value>,
        }
        let encoded = urlencoding::encode(container_id);
        let data: ContainerData = self
            .get_data(&format!(
                "/api/container/getIndex?containerid={encoded}&page={page}"
            ))
            .await?;
        let statuses = data
            .cards
            .into_iter()
            .filter_map(|card| {
                card.pointer("/mblog")
                    .and_then(|raw| serde_json::from_value::<Status>(raw.clone()).ok())
            })
            .collect();
        Ok(statuses)
    }

    pub async fn user_timeline(&self, uid: i64, page: i64) -> Result<Vec<Status>> {
        self.container_timeline(&format!("107603{uid}"), page).await
    }

    pub async fn search_timeline(&self, query: &str, page: i64) -> Result<Vec<Status>> {
        let encoded = urlencoding::encode(query);
        self.container_timeline(&format!("100103type=1&q={encoded}"), page)
            .await
    }

    pub async fn get_status(&self, id: &str) -> Result<Status> {
        self.get_data(&format!("/statuses/show?id={id}")).await
    }

    /// Comment flow below a status; `max_id = 0` fetches the first page.
    pub async fn hotflow(&self, mid: &str, max_id: i64) -> Result<(Vec<Comment>, i64)> {
        #[derive(Deserialize)]
        struct HotflowData {
            #[serde(default)]
            data: Vec<Comment>,
            max_id: Option<i64>,
        }
        let data: HotflowData = self
            .get_data(&format!(
                "/comments/hotflow?id={mid}&mid={mid}&max_id={max_id}"
            ))
            .await?;
        Ok((data.data, data.max_id.unwrap_or(0)))
    }

    /// Mention notifications (statuses mentioning the viewer).
    pub async fn mentions_at(&self, page: i64) -> Result<Vec<Status>> {
        self.get_data(&format!("/message/mentionsAt?page={page}"))
            .await
    }

    // -- Direct messages ----------------------------------------------------

    pub async fn message_rooms(&self, page: i64) -> Result<Vec<MessageRoom>> {
        self.get_data(&format!("/message/msglist?page={page}")).await
    }

    pub async fn chat(&self, uid: i64, since_id: i64) -> Result<Vec<Message>> {
        #[derive(Deserialize)]
        struct ChatData {
            #[serde(default)]
            msgs: Vec<Message>,
        }
        let data: ChatData = self
            .get_data(&format!(
                "/im/chat?uid={uid}&since_id={since_id}&count=20"
            ))
            .await?;
        Ok(data.msgs)
    }

    // -- Status actions -----------------------------------------------------

    pub async fn like(&self, id: &str) -> Result<Status> {
        self.post_form("/api/attitudes/create", &[("id", id), ("attitude", "heart")])
            .await
    }

    pub async fn unlike(&self, id: &str) -> Result<Status> {
        self.post_form(
            "/api/attitudes/destroy",
            &[("id", id), ("attitude", "heart")],
        )
        .await
    }

    pub async fn repost(&self, id: &str, content: &str) -> Result<Status> {
        self.post_form("/api/statuses/repost", &[("id", id), ("content", content)])
            .await
    }

    pub async fn update_status(&self, content: &str) -> Result<Status> {
        self.post_form("/api/statuses/update", &[("content", content)])
            .await
    }

    pub async fn comment(&self, id: &str, content: &str) -> Result<Comment> {
        self.post_form("/api/comments/create", &[("id", id), ("content", content)])
            .await
    }

    pub async fn delete_status(&self, mid: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_form("/profile/delMyblog", &[("mid", mid)])
            .await?;
        Ok(())
    }

    // -- Relationships ------------------------------------------------------

    pub async fn follow(&self, uid: i64) -> Result<()> {
        let uid = uid.to_string();
        let _: serde_json::Value = self
            .post_form("/api/friendships/create", &[("uid", uid.as_str())])
            .await?;
        Ok(())
    }

    pub async fn unfollow(&self, uid: i64) -> Result<()> {
        let uid = uid.to_string();
        let _: serde_json::Value = self
            .post_form("/api/friendships/destory", &[("uid", uid.as_str())])
            .await?;
        Ok(())
    }
}
