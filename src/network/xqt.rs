//! XQT GraphQL client and wire models
//!
//! Timeline responses arrive as instruction lists mixing tweets, users and
//! cursor entries. The client flattens them into a `TweetPage` so mediators
//! only see tweets plus the bottom cursor.

use serde::{Deserialize, Serialize};

use super::check_status;
use crate::error::Result;

// =============================================================================
// Wire models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id_str: Option<String>,
    pub name: Option<String>,
    pub screen_name: Option<String>,
    pub description: Option<String>,
    pub profile_image_url_https: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub statuses_count: Option<i64>,
    pub following: Option<bool>,
    pub followed_by: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id_str: Option<String>,
    pub full_text: Option<String>,
    pub created_at: Option<String>,
    pub user: Option<User>,
    pub conversation_id_str: Option<String>,
    pub in_reply_to_status_id_str: Option<String>,
    pub favorite_count: Option<i64>,
    pub favorited: Option<bool>,
    pub retweet_count: Option<i64>,
    pub retweeted: Option<bool>,
    pub bookmark_count: Option<i64>,
    pub bookmarked: Option<bool>,
    pub reply_count: Option<i64>,
    pub quote_count: Option<i64>,
    pub retweeted_status: Option<Box<Tweet>>,
    pub quoted_status: Option<Box<Tweet>>,
    pub entities: Option<serde_json::Value>,
}

/// A flattened page of tweets plus the bottom cursor
#[derive(Debug, Clone, Default)]
pub struct TweetPage {
    pub tweets: Vec<Tweet>,
    pub next_cursor: Option<String>,
}

/// One timeline instruction as returned by the GraphQL endpoints
#[derive(Debug, Clone, Deserialize)]
struct Instruction {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
struct Entry {
    #[serde(rename = "entryId")]
    entry_id: Option<String>,
    content: Option<serde_json::Value>,
}

/// Direct-message inbox state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmConversation {
    pub conversation_id: Option<String>,
    pub participants: Option<Vec<User>>,
    pub last_read_event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmMessage {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DmPage {
    pub conversations: Vec<DmConversation>,
    pub messages: Vec<DmMessage>,
    pub users: Vec<User>,
    pub next_cursor: Option<String>,
}

/// Curated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterList {
    pub id_str: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub member_count: Option<i64>,
    pub banner_url: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for the XQT GraphQL API
pub struct XqtClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
    csrf_token: String,
}

impl XqtClient {
    pub fn new(
        http: reqwest::Client,
        host: &str,
        bearer_token: impl Into<String>,
        csrf_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: format!("https://{}", host.trim_end_matches('/')),
            bearer_token: bearer_token.into(),
            csrf_token: csrf_token.into(),
        }
    }

    async fn graphql(&self, operation: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/i/api/graphql/{operation}", self.base_url))
            .bearer_auth(&self.bearer_token)
            .header("x-csrf-token", &self.csrf_token)
            .query(&[("variables", variables.to_string())])
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    /// Flatten an instruction list into tweets plus the bottom cursor.
    ///
    /// Entries that are not tweet items (modules, prompts, unknown shapes)
    /// are skipped; a cursor-bottom entry yields the next cursor.
    fn flatten_instructions(instructions: &serde_json::Value) -> TweetPage {
        let mut page = TweetPage::default();
        let Ok(instructions) =
            serde_json::from_value::<Vec<Instruction>>(instructions.clone())
        else {
            return page;
        };
        for instruction in instructions {
            if instruction.kind.as_deref() == Some("TimelineAddEntries") {
                for entry in instruction.entries {
                    let Some(content) = entry.content else { continue };
                    let entry_id = entry.entry_id.unwrap_or_default();
                    if entry_id.starts_with("cursor-bottom") {
                        if let Some(value) = content
                            .pointer("/value")
                            .or_else(|| content.pointer("/content/value"))
                            .and_then(|v| v.as_str())
                        {
                            page.next_cursor = Some(value.to_string());
                        }
                        continue;
                    }
                    let result = content
                        .pointer("/itemContent/tweet_results/result/legacy")
                        .or_else(|| content.pointer("/itemContent/tweet_results/result/tweet/legacy"));
                    if let Some(legacy) = result {
                        let user = content
                            .pointer("/itemContent/tweet_results/result/core/user_results/result/legacy")
                            .and_then(|u| serde_json::from_value::<User>(u.clone()).ok());
                        if let Ok(mut tweet) = serde_json::from_value::<Tweet>(legacy.clone()) {
                            if tweet.user.is_none() {
                                tweet.user = user;
                            }
                            page.tweets.push(tweet);
                        }
                    }
                }
            }
        }
        page
    }

    async fn timeline(
        &self,
        operation: &str,
        instruction_path: &str,
        variables: serde_json::Value,
    ) -> Result<TweetPage> {
        let response = self.graphql(operation, variables).await?;
        let instructions = response
            .pointer(instruction_path)
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        Ok(Self::flatten_instructions(&instructions))
    }

    // -- Timelines ----------------------------------------------------------

    pub async fn home_latest_timeline(
        &self,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        self.timeline(
            "HomeLatestTimeline",
            "/data/home/home_timeline_urt/instructions",
            timeline_variables(count, cursor),
        )
        .await
    }

    pub async fn user_tweets(
        &self,
        user_id: &str,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        let mut variables = timeline_variables(count, cursor);
        variables["userId"] = user_id.into();
        self.timeline(
            "UserTweets",
            "/data/user/result/timeline_v2/timeline/instructions",
            variables,
        )
        .await
    }

    pub async fn tweet_detail(&self, focal_id: &str, cursor: Option<&str>) -> Result<TweetPage> {
        let mut variables = serde_json::json!({ "focalTweetId": focal_id });
        if let Some(cursor) = cursor {
            variables["cursor"] = cursor.into();
        }
        self.timeline(
            "TweetDetail",
            "/data/threaded_conversation_with_injections_v2/instructions",
            variables,
        )
        .await
    }

    pub async fn search_timeline(
        &self,
        query: &str,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        let mut variables = timeline_variables(count, cursor);
        variables["rawQuery"] = query.into();
        variables["product"] = "Latest".into();
        self.timeline(
            "SearchTimeline",
            "/data/search_by_raw_query/search_timeline/timeline/instructions",
            variables,
        )
        .await
    }

    pub async fn bookmarks(&self, count: usize, cursor: Option<&str>) -> Result<TweetPage> {
        self.timeline(
            "Bookmarks",
            "/data/bookmark_timeline_v2/timeline/instructions",
            timeline_variables(count, cursor),
        )
        .await
    }

    pub async fn likes(
        &self,
        user_id: &str,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        let mut variables = timeline_variables(count, cursor);
        variables["userId"] = user_id.into();
        self.timeline(
            "Likes",
            "/data/user/result/timeline_v2/timeline/instructions",
            variables,
        )
        .await
    }

    pub async fn list_latest_tweets(
        &self,
        list_id: &str,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        let mut variables = timeline_variables(count, cursor);
        variables["listId"] = list_id.into();
        self.timeline(
            "ListLatestTweetsTimeline",
            "/data/list/tweets_timeline/timeline/instructions",
            variables,
        )
        .await
    }

    /// Mentions arrive through the v1.1 notification timeline.
    pub async fn mentions_timeline(
        &self,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage> {
        let mut params = vec![("count", count.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        let response = self
            .http
            .get(format!(
                "{}/i/api/2/notifications/mentions.json",
                self.base_url
            ))
            .bearer_auth(&self.bearer_token)
            .header("x-csrf-token", &self.csrf_token)
            .query(&params)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response)?.json().await?;
        let mut page = TweetPage::default();
        if let Some(tweets) = body.pointer("/globalObjects/tweets").and_then(|t| t.as_object()) {
            let users = body
                .pointer("/globalObjects/users")
                .and_then(|u| u.as_object())
                .cloned()
                .unwrap_or_default();
            for (_, raw) in tweets {
                if let Ok(mut tweet) = serde_json::from_value::<Tweet>(raw.clone()) {
                    let user_id = raw.pointer("/user_id_str").and_then(|v| v.as_str());
                    if let Some(user_raw) = user_id.and_then(|id| users.get(id)) {
                        tweet.user = serde_json::from_value(user_raw.clone()).ok();
                    }
                    page.tweets.push(tweet);
                }
            }
        }
        page.next_cursor = body
            .pointer("/cursor/bottom")
            .and_then(|v| v.as_str())
            .map(ToString::to_string);
        Ok(page)
    }

    // -- Direct messages ----------------------------------------------------

    pub async fn inbox_initial_state(&self) -> Result<DmPage> {
        let response = self
            .http
            .get(format!(
                "{}/i/api/1.1/dm/inbox_initial_state.json",
                self.base_url
            ))
            .bearer_auth(&self.bearer_token)
            .header("x-csrf-token", &self.csrf_token)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response)?.json().await?;
        Ok(parse_inbox(&body))
    }

    pub async fn dm_conversation(
        &self,
        conversation_id: &str,
        max_id: Option<&str>,
    ) -> Result<DmPage> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(max_id) = max_id {
            params.push(("max_id", max_id.to_string()));
        }
        let response = self
            .http
            .get(format!(
                "{}/i/api/1.1/dm/conversation/{conversation_id}.json",
                self.base_url
            ))
            .bearer_auth(&self.bearer_token)
            .header("x-csrf-token", &self.csrf_token)
            .query(&params)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response)?.json().await?;
        Ok(parse_inbox(&body))
    }

    // -- Tweet actions ------------------------------------------------------

    async fn mutation(&self, operation: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/i/api/graphql/{operation}", self.base_url))
            .bearer_auth(&self.bearer_token)
            .header("x-csrf-token", &self.csrf_token)
            .json(&serde_json::json!({ "variables": variables }))
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    pub async fn favorite_tweet(&self, id: &str) -> Result<()> {
        self.mutation("FavoriteTweet", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn unfavorite_tweet(&self, id: &str) -> Result<()> {
        self.mutation("UnfavoriteTweet", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn retweet(&self, id: &str) -> Result<()> {
        self.mutation("CreateRetweet", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn unretweet(&self, id: &str) -> Result<()> {
        self.mutation("DeleteRetweet", serde_json::json!({ "source_tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn bookmark_tweet(&self, id: &str) -> Result<()> {
        self.mutation("CreateBookmark", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn unbookmark_tweet(&self, id: &str) -> Result<()> {
        self.mutation("DeleteBookmark", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn delete_tweet(&self, id: &str) -> Result<()> {
        self.mutation("DeleteTweet", serde_json::json!({ "tweet_id": id }))
            .await?;
        Ok(())
    }

    pub async fn create_tweet(&self, text: &str, reply_to: Option<&str>) -> Result<()> {
        let mut variables = serde_json::json!({ "tweet_text": text });
        if let Some(reply_to) = reply_to {
            variables["reply"] = serde_json::json!({
                "in_reply_to_tweet_id": reply_to,
                "exclude_reply_user_ids": [],
            });
        }
        self.mutation("CreateTweet", variables).await?;
        Ok(())
    }

    // -- Lists --------------------------------------------------------------

    pub async fn list_management(&self, count: usize, cursor: Option<&str>) -> Result<(Vec<TwitterList>, Option<String>)> {
        let response = self
            .graphql(
                "ListsManagementPageTimeline",
                timeline_variables(count, cursor),
            )
            .await?;
        let mut lists = Vec::new();
        let mut next_cursor = None;
        if let Some(instructions) = response
            .pointer("/data/viewer/list_management_timeline/timeline/instructions")
            .and_then(|v| v.as_array())
        {
            for instruction in instructions {
                let Some(entries) = instruction.pointer("/entries").and_then(|v| v.as_array())
                else {
                    continue;
                };
                for entry in entries {
                    let entry_id = entry
                        .pointer("/entryId")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    if entry_id.starts_with("cursor-bottom") {
                        next_cursor = entry
                            .pointer("/content/value")
                            .and_then(|v| v.as_str())
                            .map(ToString::to_string);
                        continue;
                    }
                    if let Some(list) = entry
                        .pointer("/content/itemContent/list")
                        .and_then(|l| serde_json::from_value::<TwitterList>(l.clone()).ok())
                    {
                        lists.push(list);
                    }
                }
            }
        }
        Ok((lists, next_cursor))
    }

    pub async fn create_list(&self, name: &str, description: Option<&str>) -> Result<TwitterList> {
        let response = self
            .mutation(
                "CreateList",
                serde_json::json!({
                    "name": name,
                    "description": description.unwrap_or_default(),
                    "isPrivate": false,
                }),
            )
            .await?;
        response
            .pointer("/data/list")
            .and_then(|l| serde_json::from_value(l.clone()).ok())
            .ok_or_else(|| {
                crate::error::EngineError::Protocol("CreateList returned no list".to_string())
            })
    }

    pub async fn update_list(
        &self,
        list_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        self.mutation(
            "UpdateList",
            serde_json::json!({
                "listId": list_id,
                "name": name,
                "description": description.unwrap_or_default(),
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.mutation("DeleteList", serde_json::json!({ "listId": list_id }))
            .await?;
        Ok(())
    }

    pub async fn list_add_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.mutation(
            "ListAddMember",
            serde_json::json!({ "listId": list_id, "userId": user_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn list_remove_member(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.mutation(
            "ListRemoveMember",
            serde_json::json!({ "listId": list_id, "userId": user_id }),
        )
        .await?;
        Ok(())
    }
}

fn timeline_variables(count: usize, cursor: Option<&str>) -> serde_json::Value {
    let mut variables = serde_json::json!({
        "count": count,
        "includePromotedContent": false,
        "latestControlAvailable": false,
    });
    if let Some(cursor) = cursor {
        variables["cursor"] = cursor.into();
    }
    variables
}

fn parse_inbox(body: &serde_json::Value) -> DmPage {
    let mut page = DmPage::default();
    let state = body
        .pointer("/inbox_initial_state")
        .or_else(|| body.pointer("/conversation_timeline"))
        .unwrap_or(body);
    if let Some(conversations) = state.pointer("/conversations").and_then(|c| c.as_object()) {
        for (id, raw) in conversations {
            let mut conversation: DmConversation =
                serde_json::from_value(raw.clone()).unwrap_or(DmConversation {
                    conversation_id: None,
                    participants: None,
                    last_read_event_id: None,
                });
            conversation.conversation_id.get_or_insert_with(|| id.clone());
            page.conversations.push(conversation);
        }
    }
    if let Some(users) = state.pointer("/users").and_then(|u| u.as_object()) {
        for (_, raw) in users {
            if let Ok(user) = serde_json::from_value::<User>(raw.clone()) {
                page.users.push(user);
            }
        }
    }
    if let Some(entries) = state.pointer("/entries").and_then(|e| e.as_array()) {
        for entry in entries {
            if let Some(message) = entry.pointer("/message") {
                let text = message
                    .pointer("/message_data/text")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                let sender = message
                    .pointer("/message_data/sender_id")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                page.messages.push(DmMessage {
                    id: message
                        .pointer("/id")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                    conversation_id: message
                        .pointer("/conversation_id")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                    sender_id: sender,
                    text,
                    time: message
                        .pointer("/time")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                });
            }
        }
    }
    page.next_cursor = state
        .pointer("/min_entry_id")
        .and_then(|v| v.as_str())
        .map(ToString::to_string);
    page
}
