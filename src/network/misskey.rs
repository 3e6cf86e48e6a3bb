//! Misskey API client and wire models
//!
//! Every endpoint is a POST with the access token in the JSON body (`i`).
//! Pagination is `untilId` based: pass the last seen note ID to walk
//! backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::check_status;
use crate::error::Result;

// =============================================================================
// Wire models
// =============================================================================

/// User as embedded in notes and notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLite {
    pub id: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    /// Remote host, `None` for local users
    pub host: Option<String>,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub is_bot: Option<bool>,
    pub is_following: Option<bool>,
}

/// Note (post)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub cw: Option<String>,
    pub user: Option<UserLite>,
    pub user_id: Option<String>,
    pub visibility: Option<String>,
    pub reply_id: Option<String>,
    pub renote_id: Option<String>,
    pub renote: Option<Box<Note>>,
    pub reply: Option<Box<Note>>,
    pub renote_count: Option<i64>,
    pub replies_count: Option<i64>,
    /// Reaction emoji -> count
    pub reactions: Option<HashMap<String, i64>>,
    /// The reaction the viewer placed, if any
    pub my_reaction: Option<String>,
    pub files: Option<Vec<DriveFile>>,
}

/// Drive file attached to a note
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub comment: Option<String>,
}

/// Notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<UserLite>,
    pub note: Option<Note>,
    pub reaction: Option<String>,
}

/// User list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub id: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub user_ids: Option<Vec<String>>,
}

/// Bookmark entry (`i/favorites` wraps the note)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Option<String>,
    pub note: Option<Note>,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for one Misskey instance
pub struct MisskeyClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MisskeyClient {
    pub fn new(http: reqwest::Client, instance: &str, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: format!("https://{}", instance.trim_end_matches('/')),
            access_token: access_token.into(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        mut body: serde_json::Value,
    ) -> Result<T> {
        if let Some(map) = body.as_object_mut() {
            map.insert("i".to_string(), self.access_token.clone().into());
        }
        let response = self
            .http
            .post(format!("{}/api/{endpoint}", self.base_url))
            .json(&body)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    fn page_body(limit: usize, until_id: Option<&str>) -> serde_json::Value {
        match until_id {
            Some(until_id) => serde_json::json!({ "limit": limit, "untilId": until_id }),
            None => serde_json::json!({ "limit": limit }),
        }
    }

    // -- Timelines ----------------------------------------------------------

    pub async fn home_timeline(
        &self,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        self.call("notes/timeline", Self::page_body(limit, until_id))
            .await
    }

    pub async fn local_timeline(
        &self,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        self.call("notes/local-timeline", Self::page_body(limit, until_id))
            .await
    }

    pub async fn global_timeline(
        &self,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        self.call("notes/global-timeline", Self::page_body(limit, until_id))
            .await
    }

    pub async fn user_notes(
        &self,
        user_id: &str,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        let mut body = Self::page_body(limit, until_id);
        body["userId"] = user_id.into();
        self.call("users/notes", body).await
    }

    pub async fn list_timeline(
        &self,
        list_id: &str,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        let mut body = Self::page_body(limit, until_id);
        body["listId"] = list_id.into();
        self.call("notes/user-list-timeline", body).await
    }

    pub async fn search_notes(
        &self,
        query: &str,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Note>> {
        let mut body = Self::page_body(limit, until_id);
        body["query"] = query.into();
        self.call("notes/search", body).await
    }

    pub async fn notifications(
        &self,
        limit: usize,
        until_id: Option<&str>,
        mentions_only: bool,
    ) -> Result<Vec<Notification>> {
        let mut body = Self::page_body(limit, until_id);
        if mentions_only {
            body["includeTypes"] = serde_json::json!(["mention", "reply", "quote"]);
        }
        self.call("i/notifications", body).await
    }

    pub async fn favorites(
        &self,
        limit: usize,
        until_id: Option<&str>,
    ) -> Result<Vec<Favorite>> {
        self.call("i/favorites", Self::page_body(limit, until_id))
            .await
    }

    // -- Thread -------------------------------------------------------------

    pub async fn show_note(&self, note_id: &str) -> Result<Note> {
        self.call("notes/show", serde_json::json!({ "noteId": note_id }))
            .await
    }

    /// Ancestors of a note, nearest first.
    pub async fn conversation(&self, note_id: &str, limit: usize) -> Result<Vec<Note>> {
        self.call(
            "notes/conversation",
            serde_json::json!({ "noteId": note_id, "limit": limit }),
        )
        .await
    }

    /// Direct replies below a note.
    pub async fn children(&self, note_id: &str, limit: usize) -> Result<Vec<Note>> {
        self.call(
            "notes/children",
            serde_json::json!({ "noteId": note_id, "limit": limit }),
        )
        .await
    }

    // -- Note actions -------------------------------------------------------

    pub async fn create_reaction(&self, note_id: &str, reaction: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "notes/reactions/create",
                serde_json::json!({ "noteId": note_id, "reaction": reaction }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn delete_reaction(&self, note_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "notes/reactions/delete",
                serde_json::json!({ "noteId": note_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn renote(&self, note_id: &str) -> Result<Note> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            created_note: Note,
        }
        let created: Created = self
            .call(
                "notes/create",
                serde_json::json!({ "renoteId": note_id }),
            )
            .await?;
        Ok(created.created_note)
    }

    pub async fn unrenote(&self, note_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("notes/unrenote", serde_json::json!({ "noteId": note_id }))
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn create_favorite(&self, note_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "notes/favorites/create",
                serde_json::json!({ "noteId": note_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn delete_favorite(&self, note_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "notes/favorites/delete",
                serde_json::json!({ "noteId": note_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn create_note(
        &self,
        text: &str,
        reply_id: Option<&str>,
        cw: Option<&str>,
        visibility: Option<&str>,
    ) -> Result<Note> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            created_note: Note,
        }
        let mut body = serde_json::json!({ "text": text });
        if let Some(reply_id) = reply_id {
            body["replyId"] = reply_id.into();
        }
        if let Some(cw) = cw {
            body["cw"] = cw.into();
        }
        if let Some(visibility) = visibility {
            body["visibility"] = visibility.into();
        }
        let created: Created = self.call("notes/create", body).await?;
        Ok(created.created_note)
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("notes/delete", serde_json::json!({ "noteId": note_id }))
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    // -- Relationships ------------------------------------------------------

    pub async fn follow(&self, user_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "following/create",
                serde_json::json!({ "userId": user_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn unfollow(&self, user_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "following/delete",
                serde_json::json!({ "userId": user_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    // -- Lists --------------------------------------------------------------

    pub async fn lists(&self) -> Result<Vec<UserList>> {
        self.call("users/lists/list", serde_json::json!({})).await
    }

    pub async fn show_list(&self, list_id: &str) -> Result<UserList> {
        self.call(
            "users/lists/show",
            serde_json::json!({ "listId": list_id }),
        )
        .await
    }

    pub async fn create_list(&self, name: &str) -> Result<UserList> {
        self.call("users/lists/create", serde_json::json!({ "name": name }))
            .await
    }

    pub async fn update_list(&self, list_id: &str, name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "users/lists/update",
                serde_json::json!({ "listId": list_id, "name": name }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "users/lists/delete",
                serde_json::json!({ "listId": list_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn list_push(&self, list_id: &str, user_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "users/lists/push",
                serde_json::json!({ "listId": list_id, "userId": user_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn list_pull(&self, list_id: &str, user_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "users/lists/pull",
                serde_json::json!({ "listId": list_id, "userId": user_id }),
            )
            .await
            .or_else(empty_body_ok)?;
        Ok(())
    }

    pub async fn show_user(&self, user_id: &str) -> Result<UserLite> {
        self.call("users/show", serde_json::json!({ "userId": user_id }))
            .await
    }
}

/// Misskey returns `204 No Content` for many mutation endpoints; treat a
/// body-decode failure on an otherwise successful call as success.
fn empty_body_ok(err: crate::error::EngineError) -> Result<serde_json::Value> {
    match err {
        crate::error::EngineError::Protocol(_) | crate::error::EngineError::Serialization(_) => {
            Ok(serde_json::Value::Null)
        }
        other => Err(other),
    }
}
