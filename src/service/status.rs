//! Optimistic status mutations
//!
//! Every reactive action follows the same sequence: write the toggled
//! state to the cache synchronously, issue the remote call, then either
//! reconcile the row with whatever authoritative state the backend
//! returned or restore the exact pre-mutation snapshot. Counters are
//! clamped at zero to tolerate backend undercounting races.
//!
//! Delete is simpler: the row and its feed memberships are removed first,
//! then the remote delete fires best-effort with no rollback.

use std::future::Future;
use std::sync::Arc;

use crate::data::{CacheStore, StatusContent, UserContent};
use crate::error::{EngineError, Result};
use crate::metrics::{MUTATIONS_TOTAL, MUTATION_ROLLBACKS_TOTAL};
use crate::model::{AccountKey, MicroblogKey};
use crate::network::{bluesky, mastodon, misskey, vvo, xqt};

/// Run one optimistic mutation against a status row.
///
/// `apply` computes the optimistic state inside the row's keyed
/// read-modify-write transaction; `remote` performs the network call. On
/// remote failure the pre-mutation snapshot is written back through the
/// same keyed transaction pattern, so two simultaneous actions on one
/// status serialize instead of interleaving.
pub(crate) async fn optimistic_mutation<A, F, Fut, R>(
    store: &CacheStore,
    status_key: &MicroblogKey,
    account_key: &AccountKey,
    action: &'static str,
    apply: A,
    remote: F,
) -> Result<R>
where
    A: FnOnce(StatusContent) -> StatusContent,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let snapshot = store
        .update_status(status_key, account_key, apply)
        .await?
        .ok_or(EngineError::NotFound)?;

    match remote().await {
        Ok(result) => {
            MUTATIONS_TOTAL
                .with_label_values(&[action, "success"])
                .inc();
            Ok(result)
        }
        Err(error) => {
            store
                .write_status_content(status_key, account_key, &snapshot)
                .await?;
            MUTATIONS_TOTAL.with_label_values(&[action, "error"]).inc();
            MUTATION_ROLLBACKS_TOTAL.with_label_values(&[action]).inc();
            tracing::warn!(
                status_key = %status_key,
                action,
                error = %error,
                "Mutation failed, rolled back"
            );
            Err(error)
        }
    }
}

fn increment(count: Option<i64>) -> Option<i64> {
    count.map(|c| c + 1)
}

fn decrement(count: Option<i64>) -> Option<i64> {
    count.map(|c| (c - 1).max(0))
}

// =============================================================================
// Mastodon
// =============================================================================

pub struct MastodonStatusActions {
    pub store: Arc<CacheStore>,
    pub client: Arc<mastodon::MastodonClient>,
    pub account_key: AccountKey,
}

impl MastodonStatusActions {
    /// Toggle favourite. `liked` is the state the UI currently shows.
    pub async fn like(&self, status_key: &MicroblogKey, liked: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        let result = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "like",
            move |content| match content {
                StatusContent::Mastodon(mut status) => {
                    status.favourited = Some(!liked);
                    status.favourites_count = if liked {
                        decrement(status.favourites_count)
                    } else {
                        increment(status.favourites_count)
                    };
                    StatusContent::Mastodon(status)
                }
                other => other,
            },
            move || async move {
                if liked {
                    client.unfavourite(&id).await
                } else {
                    client.favourite(&id).await
                }
            },
        )
        .await?;
        // The backend returned the authoritative status; keep it.
        self.store
            .write_status_content(
                status_key,
                &self.account_key,
                &StatusContent::Mastodon(result),
            )
            .await
    }

    pub async fn repost(&self, status_key: &MicroblogKey, reblogged: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        let result = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "repost",
            move |content| match content {
                StatusContent::Mastodon(mut status) => {
                    status.reblogged = Some(!reblogged);
                    status.reblogs_count = if reblogged {
                        decrement(status.reblogs_count)
                    } else {
                        increment(status.reblogs_count)
                    };
                    StatusContent::Mastodon(status)
                }
                other => other,
            },
            move || async move {
                if reblogged {
                    client.unreblog(&id).await
                } else {
                    client.reblog(&id).await
                }
            },
        )
        .await?;
        // Reblogging returns the wrapper status; the original travels in
        // its `reblog` field.
        let authoritative = result.reblog.clone().map(|b| *b).unwrap_or(result);
        self.store
            .write_status_content(
                status_key,
                &self.account_key,
                &StatusContent::Mastodon(authoritative),
            )
            .await
    }

    pub async fn bookmark(&self, status_key: &MicroblogKey, bookmarked: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        let result = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "bookmark",
            move |content| match content {
                StatusContent::Mastodon(mut status) => {
                    status.bookmarked = Some(!bookmarked);
                    StatusContent::Mastodon(status)
                }
                other => other,
            },
            move || async move {
                if bookmarked {
                    client.unbookmark(&id).await
                } else {
                    client.bookmark(&id).await
                }
            },
        )
        .await?;
        self.store
            .write_status_content(
                status_key,
                &self.account_key,
                &StatusContent::Mastodon(result),
            )
            .await
    }

    /// Remove the status from the cache, then fire the remote delete.
    /// Deletion is not rolled back on failure.
    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        self.store
            .delete_status(status_key, &self.account_key)
            .await?;
        if let Err(error) = self.client.delete_status(&status_key.id).await {
            tracing::warn!(status_key = %status_key, error = %error, "Remote delete failed");
        }
        Ok(())
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        let idempotency_key = ulid::Ulid::new().to_string();
        self.client
            .post_status(
                &idempotency_key,
                &mastodon::PostStatus {
                    status: data.content.clone(),
                    in_reply_to_id: data.in_reply_to.as_ref().map(|key| key.id.clone()),
                    visibility: data.visibility.clone(),
                    spoiler_text: data.content_warning.clone(),
                    sensitive: data.sensitive,
                    language: data.language.clone(),
                },
            )
            .await?;
        Ok(())
    }

    /// Mastodon relationship state lives outside the account payload, so
    /// follow has no optimistic cache write.
    pub async fn follow(&self, user_key: &MicroblogKey, following: bool) -> Result<()> {
        if following {
            self.client.unfollow(&user_key.id).await?;
        } else {
            self.client.follow(&user_key.id).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Misskey
// =============================================================================

/// Reaction placed by the like action.
const DEFAULT_REACTION: &str = "\u{2764}";

pub struct MisskeyStatusActions {
    pub store: Arc<CacheStore>,
    pub client: Arc<misskey::MisskeyClient>,
    pub account_key: AccountKey,
}

impl MisskeyStatusActions {
    /// Toggle the viewer's reaction. Misskey returns no payload, so the
    /// optimistic state stands on success.
    pub async fn like(&self, status_key: &MicroblogKey, reacted: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "like",
            move |content| match content {
                StatusContent::Misskey(mut note) => {
                    if reacted {
                        if let (Some(reactions), Some(mine)) =
                            (note.reactions.as_mut(), note.my_reaction.clone())
                        {
                            if let Some(count) = reactions.get_mut(&mine) {
                                *count = (*count - 1).max(0);
                            }
                        }
                        note.my_reaction = None;
                    } else {
                        note.my_reaction = Some(DEFAULT_REACTION.to_string());
                        if let Some(reactions) = note.reactions.as_mut() {
                            *reactions.entry(DEFAULT_REACTION.to_string()).or_insert(0) += 1;
                        }
                    }
                    StatusContent::Misskey(note)
                }
                other => other,
            },
            move || async move {
                if reacted {
                    client.delete_reaction(&id).await
                } else {
                    client.create_reaction(&id, DEFAULT_REACTION).await
                }
            },
        )
        .await
    }

    pub async fn repost(&self, status_key: &MicroblogKey, renoted: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "repost",
            move |content| match content {
                StatusContent::Misskey(mut note) => {
                    note.renote_count = if renoted {
                        decrement(note.renote_count)
                    } else {
                        increment(note.renote_count)
                    };
                    StatusContent::Misskey(note)
                }
                other => other,
            },
            move || async move {
                if renoted {
                    client.unrenote(&id).await
                } else {
                    client.renote(&id).await.map(|_| ())
                }
            },
        )
        .await
    }

    /// Misskey bookmarks (`i/favorites`) carry no flag on the note, so
    /// there is nothing to write optimistically.
    pub async fn bookmark(&self, status_key: &MicroblogKey, bookmarked: bool) -> Result<()> {
        if bookmarked {
            self.client.delete_favorite(&status_key.id).await
        } else {
            self.client.create_favorite(&status_key.id).await
        }
    }

    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        self.store
            .delete_status(status_key, &self.account_key)
            .await?;
        if let Err(error) = self.client.delete_note(&status_key.id).await {
            tracing::warn!(status_key = %status_key, error = %error, "Remote delete failed");
        }
        Ok(())
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        self.client
            .create_note(
                &data.content,
                data.in_reply_to.as_ref().map(|key| key.id.as_str()),
                data.content_warning.as_deref(),
                data.visibility.as_deref(),
            )
            .await?;
        Ok(())
    }

    pub async fn follow(&self, user_key: &MicroblogKey, following: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = user_key.id.clone();
        let snapshot = self
            .store
            .update_user(user_key, |content| match content {
                UserContent::Misskey(mut user) => {
                    user.is_following = Some(!following);
                    UserContent::Misskey(user)
                }
                other => other,
            })
            .await?;
        let result = if following {
            client.unfollow(&id).await
        } else {
            client.follow(&id).await
        };
        if let (Err(error), Some(snapshot)) = (&result, snapshot) {
            tracing::warn!(user_key = %user_key, error = %error, "Follow failed, rolled back");
            self.store.write_user_content(user_key, &snapshot).await?;
        }
        result
    }
}

// =============================================================================
// Bluesky
// =============================================================================

pub struct BlueskyStatusActions {
    pub store: Arc<CacheStore>,
    pub client: Arc<bluesky::BlueskyClient>,
    pub account_key: AccountKey,
}

impl BlueskyStatusActions {
    /// Toggle like. `liked_uri` is the viewer's existing like-record URI;
    /// its presence means the post is currently liked and it is the handle
    /// needed to undo the like.
    pub async fn like(&self, status_key: &MicroblogKey, liked_uri: Option<&str>) -> Result<()> {
        let client = Arc::clone(&self.client);
        let uri = status_key.id.clone();
        let liked = liked_uri.is_some();
        let undo_uri = liked_uri.map(ToString::to_string);
        let cid = self.post_cid(status_key).await?;

        let created = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "like",
            move |content| match content {
                StatusContent::Bluesky(mut post) => {
                    let viewer = post.viewer.get_or_insert_with(|| bluesky::PostViewerState {
                        like: None,
                        repost: None,
                        bookmarked: None,
                    });
                    if liked {
                        viewer.like = None;
                        post.like_count = decrement(post.like_count);
                    } else {
                        // Placeholder until the record URI comes back.
                        viewer.like = Some(String::new());
                        post.like_count = increment(post.like_count);
                    }
                    StatusContent::Bluesky(post)
                }
                other => other,
            },
            move || async move {
                match undo_uri {
                    Some(undo_uri) => client.delete_record(&undo_uri).await.map(|_| None),
                    None => client.like(&uri, &cid).await.map(Some),
                }
            },
        )
        .await?;

        // Reconcile the placeholder with the authoritative record URI.
        if let Some(record) = created {
            self.store
                .update_status(status_key, &self.account_key, |content| match content {
                    StatusContent::Bluesky(mut post) => {
                        if let Some(viewer) = post.viewer.as_mut() {
                            viewer.like = Some(record.uri.clone());
                        }
                        StatusContent::Bluesky(post)
                    }
                    other => other,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn repost(&self, status_key: &MicroblogKey, repost_uri: Option<&str>) -> Result<()> {
        let client = Arc::clone(&self.client);
        let uri = status_key.id.clone();
        let reposted = repost_uri.is_some();
        let undo_uri = repost_uri.map(ToString::to_string);
        let cid = self.post_cid(status_key).await?;

        let created = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "repost",
            move |content| match content {
                StatusContent::Bluesky(mut post) => {
                    let viewer = post.viewer.get_or_insert_with(|| bluesky::PostViewerState {
                        like: None,
                        repost: None,
                        bookmarked: None,
                    });
                    if reposted {
                        viewer.repost = None;
                        post.repost_count = decrement(post.repost_count);
                    } else {
                        viewer.repost = Some(String::new());
                        post.repost_count = increment(post.repost_count);
                    }
                    StatusContent::Bluesky(post)
                }
                other => other,
            },
            move || async move {
                match undo_uri {
                    Some(undo_uri) => client.delete_record(&undo_uri).await.map(|_| None),
                    None => client.repost(&uri, &cid).await.map(Some),
                }
            },
        )
        .await?;

        if let Some(record) = created {
            self.store
                .update_status(status_key, &self.account_key, |content| match content {
                    StatusContent::Bluesky(mut post) => {
                        if let Some(viewer) = post.viewer.as_mut() {
                            viewer.repost = Some(record.uri.clone());
                        }
                        StatusContent::Bluesky(post)
                    }
                    other => other,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        self.store
            .delete_status(status_key, &self.account_key)
            .await?;
        if let Err(error) = self.client.delete_record(&status_key.id).await {
            tracing::warn!(status_key = %status_key, error = %error, "Remote delete failed");
        }
        Ok(())
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        let reply = match &data.in_reply_to {
            Some(parent_key) => {
                let parent = self
                    .store
                    .get_status(parent_key, &self.account_key)
                    .await?
                    .ok_or(EngineError::NotFound)?;
                match parent.content {
                    StatusContent::Bluesky(post) => {
                        let uri = post.uri.ok_or(EngineError::NotFound)?;
                        let cid = post.cid.ok_or(EngineError::NotFound)?;
                        let reference = serde_json::json!({ "uri": uri, "cid": cid });
                        Some(serde_json::json!({ "root": reference.clone(), "parent": reference }))
                    }
                    _ => None,
                }
            }
            None => None,
        };
        self.client.create_post(&data.content, reply).await?;
        Ok(())
    }

    pub async fn follow(&self, user_key: &MicroblogKey, following_uri: Option<&str>) -> Result<()> {
        let client = Arc::clone(&self.client);
        let did = user_key.id.clone();
        let undo_uri = following_uri.map(ToString::to_string);
        let following = following_uri.is_some();
        let snapshot = self
            .store
            .update_user(user_key, |content| match content {
                UserContent::Bluesky(mut profile) => {
                    let viewer =
                        profile
                            .viewer
                            .get_or_insert_with(|| bluesky::ProfileViewerState {
                                following: None,
                                followed_by: None,
                                muted: None,
                                blocked_by: None,
                            });
                    viewer.following = if following { None } else { Some(String::new()) };
                    UserContent::Bluesky(profile)
                }
                other => other,
            })
            .await?;
        let result = match undo_uri {
            Some(undo_uri) => client.delete_record(&undo_uri).await.map(|_| None),
            None => client.follow(&did).await.map(Some),
        };
        match result {
            Ok(Some(record)) => {
                self.store
                    .update_user(user_key, |content| match content {
                        UserContent::Bluesky(mut profile) => {
                            if let Some(viewer) = profile.viewer.as_mut() {
                                viewer.following = Some(record.uri.clone());
                            }
                            UserContent::Bluesky(profile)
                        }
                        other => other,
                    })
                    .await?;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => {
                if let Some(snapshot) = snapshot {
                    self.store.write_user_content(user_key, &snapshot).await?;
                }
                Err(error)
            }
        }
    }

    /// The subject CID is required by like/repost record writes.
    async fn post_cid(&self, status_key: &MicroblogKey) -> Result<String> {
        let row = self
            .store
            .get_status(status_key, &self.account_key)
            .await?
            .ok_or(EngineError::NotFound)?;
        match row.content {
            StatusContent::Bluesky(post) => post.cid.ok_or_else(|| {
                EngineError::Protocol("cached post is missing its cid".to_string())
            }),
            _ => Err(EngineError::Protocol(
                "status is not a bluesky post".to_string(),
            )),
        }
    }
}

// =============================================================================
// XQT
// =============================================================================

pub struct XqtStatusActions {
    pub store: Arc<CacheStore>,
    pub client: Arc<xqt::XqtClient>,
    pub account_key: AccountKey,
}

impl XqtStatusActions {
    pub async fn like(&self, status_key: &MicroblogKey, liked: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "like",
            move |content| match content {
                StatusContent::Xqt(mut tweet) => {
                    tweet.favorited = Some(!liked);
                    tweet.favorite_count = if liked {
                        decrement(tweet.favorite_count)
                    } else {
                        increment(tweet.favorite_count)
                    };
                    StatusContent::Xqt(tweet)
                }
                other => other,
            },
            move || async move {
                if liked {
                    client.unfavorite_tweet(&id).await
                } else {
                    client.favorite_tweet(&id).await
                }
            },
        )
        .await
    }

    pub async fn repost(&self, status_key: &MicroblogKey, retweeted: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "repost",
            move |content| match content {
                StatusContent::Xqt(mut tweet) => {
                    tweet.retweeted = Some(!retweeted);
                    tweet.retweet_count = if retweeted {
                        decrement(tweet.retweet_count)
                    } else {
                        increment(tweet.retweet_count)
                    };
                    StatusContent::Xqt(tweet)
                }
                other => other,
            },
            move || async move {
                if retweeted {
                    client.unretweet(&id).await
                } else {
                    client.retweet(&id).await
                }
            },
        )
        .await
    }

    pub async fn bookmark(&self, status_key: &MicroblogKey, bookmarked: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "bookmark",
            move |content| match content {
                StatusContent::Xqt(mut tweet) => {
                    tweet.bookmarked = Some(!bookmarked);
                    tweet.bookmark_count = if bookmarked {
                        decrement(tweet.bookmark_count)
                    } else {
                        increment(tweet.bookmark_count)
                    };
                    StatusContent::Xqt(tweet)
                }
                other => other,
            },
            move || async move {
                if bookmarked {
                    client.unbookmark_tweet(&id).await
                } else {
                    client.bookmark_tweet(&id).await
                }
            },
        )
        .await
    }

    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        self.store
            .delete_status(status_key, &self.account_key)
            .await?;
        if let Err(error) = self.client.delete_tweet(&status_key.id).await {
            tracing::warn!(status_key = %status_key, error = %error, "Remote delete failed");
        }
        Ok(())
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        self.client
            .create_tweet(
                &data.content,
                data.in_reply_to.as_ref().map(|key| key.id.as_str()),
            )
            .await
    }
}

// =============================================================================
// VVO
// =============================================================================

pub struct VvoStatusActions {
    pub store: Arc<CacheStore>,
    pub client: Arc<vvo::VvoClient>,
    pub account_key: AccountKey,
}

impl VvoStatusActions {
    pub async fn like(&self, status_key: &MicroblogKey, liked: bool) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        let result = optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "like",
            move |content| match content {
                StatusContent::Vvo(mut status) => {
                    status.favorited = Some(!liked);
                    status.attitudes_count = if liked {
                        decrement(status.attitudes_count)
                    } else {
                        increment(status.attitudes_count)
                    };
                    StatusContent::Vvo(status)
                }
                other => other,
            },
            move || async move {
                if liked {
                    client.unlike(&id).await
                } else {
                    client.like(&id).await
                }
            },
        )
        .await?;
        self.store
            .write_status_content(status_key, &self.account_key, &StatusContent::Vvo(result))
            .await
    }

    pub async fn repost(&self, status_key: &MicroblogKey, content: &str) -> Result<()> {
        let client = Arc::clone(&self.client);
        let id = status_key.id.clone();
        let content = content.to_string();
        optimistic_mutation(
            &self.store,
            status_key,
            &self.account_key,
            "repost",
            |row_content| match row_content {
                StatusContent::Vvo(mut status) => {
                    status.reposts_count = increment(status.reposts_count);
                    StatusContent::Vvo(status)
                }
                other => other,
            },
            move || async move { client.repost(&id, &content).await.map(|_| ()) },
        )
        .await
    }

    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        self.store
            .delete_status(status_key, &self.account_key)
            .await?;
        if let Err(error) = self.client.delete_status(&status_key.id).await {
            tracing::warn!(status_key = %status_key, error = %error, "Remote delete failed");
        }
        Ok(())
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        match &data.in_reply_to {
            Some(parent) => {
                self.client.comment(&parent.id, &data.content).await?;
            }
            None => {
                self.client.update_status(&data.content).await?;
            }
        }
        Ok(())
    }

    pub async fn follow(&self, user_key: &MicroblogKey, following: bool) -> Result<()> {
        let uid = user_key.id.parse::<i64>().map_err(|_| {
            EngineError::Protocol(format!("vvo user id is not numeric: {}", user_key.id))
        })?;
        let client = Arc::clone(&self.client);
        let snapshot = self
            .store
            .update_user(user_key, |content| match content {
                UserContent::Vvo(mut user) => {
                    user.following = Some(!following);
                    UserContent::Vvo(user)
                }
                other => other,
            })
            .await?;
        let result = if following {
            client.unfollow(uid).await
        } else {
            client.follow(uid).await
        };
        if let (Err(error), Some(snapshot)) = (&result, snapshot) {
            tracing::warn!(user_key = %user_key, error = %error, "Follow failed, rolled back");
            self.store.write_user_content(user_key, &snapshot).await?;
        }
        result
    }
}

// =============================================================================
// Compose payload
// =============================================================================

/// Backend-agnostic compose payload
#[derive(Debug, Clone, Default)]
pub struct ComposeData {
    pub content: String,
    pub in_reply_to: Option<MicroblogKey>,
    pub visibility: Option<String>,
    pub content_warning: Option<String>,
    pub sensitive: Option<bool>,
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatusRow;
    use crate::model::PlatformType;

    fn account() -> AccountKey {
        MicroblogKey::new("me", "mastodon.test")
    }

    fn key() -> MicroblogKey {
        MicroblogKey::new("42", "mastodon.test")
    }

    async fn seeded_store(favourited: bool, count: i64) -> Arc<CacheStore> {
        let store = Arc::new(CacheStore::connect_in_memory().await.unwrap());
        let status: mastodon::Status = serde_json::from_value(serde_json::json!({
            "id": "42",
            "content": "<p>post</p>",
            "favourited": favourited,
            "favourites_count": count,
        }))
        .unwrap();
        store
            .upsert_status(&StatusRow {
                status_key: key(),
                account_key: account(),
                platform_type: PlatformType::Mastodon,
                user_key: None,
                content: StatusContent::Mastodon(status),
            })
            .await
            .unwrap();
        store
    }

    fn read_like_state(content: &StatusContent) -> (bool, i64) {
        match content {
            StatusContent::Mastodon(status) => (
                status.favourited.unwrap_or(false),
                status.favourites_count.unwrap_or(0),
            ),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    fn toggle_like(liked: bool) -> impl FnOnce(StatusContent) -> StatusContent {
        move |content| match content {
            StatusContent::Mastodon(mut status) => {
                status.favourited = Some(!liked);
                status.favourites_count = if liked {
                    decrement(status.favourites_count)
                } else {
                    increment(status.favourites_count)
                };
                StatusContent::Mastodon(status)
            }
            other => other,
        }
    }

    #[tokio::test]
    async fn like_applies_optimistically_and_sticks_on_success() {
        let store = seeded_store(false, 5).await;
        optimistic_mutation(&store, &key(), &account(), "like", toggle_like(false), || async {
            Ok(())
        })
        .await
        .unwrap();
        let row = store.get_status(&key(), &account()).await.unwrap().unwrap();
        assert_eq!(read_like_state(&row.content), (true, 6));
    }

    #[tokio::test]
    async fn failed_like_reverts_to_exact_snapshot() {
        let store = seeded_store(false, 5).await;
        let result = optimistic_mutation(
            &store,
            &key(),
            &account(),
            "like",
            toggle_like(false),
            || async { Err::<(), _>(EngineError::Transport("offline".to_string())) },
        )
        .await;
        assert!(result.is_err());
        let row = store.get_status(&key(), &account()).await.unwrap().unwrap();
        assert_eq!(read_like_state(&row.content), (false, 5));
    }

    #[tokio::test]
    async fn repeated_unlike_never_goes_negative() {
        let store = seeded_store(true, 0).await;
        for _ in 0..3 {
            let _ = optimistic_mutation(
                &store,
                &key(),
                &account(),
                "like",
                toggle_like(true),
                || async { Err::<(), _>(EngineError::Transport("offline".to_string())) },
            )
            .await;
            let _ = optimistic_mutation(
                &store,
                &key(),
                &account(),
                "like",
                toggle_like(true),
                || async { Ok(()) },
            )
            .await;
        }
        let row = store.get_status(&key(), &account()).await.unwrap().unwrap();
        let (_, count) = read_like_state(&row.content);
        assert!(count >= 0);
    }

    #[tokio::test]
    async fn mutation_on_missing_row_is_not_found() {
        let store = Arc::new(CacheStore::connect_in_memory().await.unwrap());
        let result = optimistic_mutation(
            &store,
            &key(),
            &account(),
            "like",
            toggle_like(false),
            || async { Ok(()) },
        )
        .await;
        assert!(matches!(result, Err(EngineError::NotFound)));
    }
}
