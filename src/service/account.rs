//! Per-account data source
//!
//! One instance per signed-in account. Owns that account's backend client,
//! builds the right mediator for each feed kind, and caches one pager per
//! paging key so repeated UI subscriptions share in-flight state. All
//! dependencies arrive through the constructor; there is no ambient
//! lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::Stream;

use crate::data::{
    CacheStore, StatusContent, StatusRow, TimelineItem, UserContent, UserRow,
};
use crate::error::{EngineError, Result};
use crate::mapper;
use crate::mediator::{bluesky as bsky_med, mastodon as masto_med, misskey as misskey_med, vvo as vvo_med, xqt as xqt_med};
use crate::model::{paging_key, AccountKey, MicroblogKey, PlatformType};
use crate::network::{bluesky, mastodon, misskey, vvo, xqt};
use crate::paging::{TimelineMediator, TimelinePager};
use crate::service::list::{
    BlueskyListLoader, ListHandler, MastodonListLoader, MisskeyListLoader, XqtListLoader,
};
use crate::service::message::{
    DirectMessageHandler, MastodonRoomLoader, VvoRoomLoader, XqtRoomLoader,
};
use crate::service::status::{
    BlueskyStatusActions, ComposeData, MastodonStatusActions, MisskeyStatusActions,
    VvoStatusActions, XqtStatusActions,
};

/// The authenticated client for one backend account
#[derive(Clone)]
pub enum BackendClient {
    Mastodon(Arc<mastodon::MastodonClient>),
    Misskey(Arc<misskey::MisskeyClient>),
    Bluesky(Arc<bluesky::BlueskyClient>),
    Xqt(Arc<xqt::XqtClient>),
    Vvo(Arc<vvo::VvoClient>),
}

impl BackendClient {
    pub fn platform(&self) -> PlatformType {
        match self {
            Self::Mastodon(_) => PlatformType::Mastodon,
            Self::Misskey(_) => PlatformType::Misskey,
            Self::Bluesky(_) => PlatformType::Bluesky,
            Self::Xqt(_) => PlatformType::Xqt,
            Self::Vvo(_) => PlatformType::Vvo,
        }
    }
}

/// Engine facade for one account
pub struct AccountDataSource {
    store: Arc<CacheStore>,
    account_key: AccountKey,
    client: BackendClient,
    page_size: usize,
    pagers: Mutex<HashMap<String, Arc<TimelinePager>>>,
}

impl AccountDataSource {
    pub fn new(
        store: Arc<CacheStore>,
        account_key: AccountKey,
        client: BackendClient,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            account_key,
            client,
            page_size,
            pagers: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> PlatformType {
        self.client.platform()
    }

    pub fn account_key(&self) -> &AccountKey {
        &self.account_key
    }

    /// Cancel every in-flight fetch for this account, e.g. when the user
    /// switches accounts. Pagers are dropped; the cached rows stay.
    pub fn cancel_all(&self) {
        let mut pagers = self.pagers.lock().expect("pager map poisoned");
        for pager in pagers.values() {
            pager.cancel();
        }
        pagers.clear();
    }

    fn pager_for(
        &self,
        paging_key: String,
        build: impl FnOnce() -> Arc<dyn TimelineMediator>,
    ) -> Arc<TimelinePager> {
        let mut pagers = self.pagers.lock().expect("pager map poisoned");
        pagers
            .entry(paging_key.clone())
            .or_insert_with(|| {
                Arc::new(TimelinePager::new(
                    Arc::clone(&self.store),
                    build(),
                    self.account_key.clone(),
                    paging_key,
                    self.page_size,
                ))
            })
            .clone()
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    pub fn home_timeline(&self) -> Arc<TimelinePager> {
        let key = paging_key::home(&self.account_key);
        self.pager_for(key, || match &self.client {
            BackendClient::Mastodon(client) => Arc::new(masto_med::HomeTimelineMediator {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
            }),
            BackendClient::Misskey(client) => Arc::new(misskey_med::NoteTimelineMediator {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
                kind: misskey_med::TimelineKind::Home,
            }),
            BackendClient::Bluesky(client) => Arc::new(bsky_med::FeedMediator {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
                kind: bsky_med::FeedKind::Timeline,
            }),
            BackendClient::Xqt(client) => Arc::new(xqt_med::TweetTimelineMediator {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
                kind: xqt_med::FeedKind::Home,
            }),
            BackendClient::Vvo(client) => Arc::new(vvo_med::HomeTimelineMediator {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
            }),
        })
    }

    /// Instance-local or federated/global firehose, where the backend has
    /// one.
    pub fn public_timeline(&self, local: bool) -> Result<Arc<TimelinePager>> {
        let key = if local {
            paging_key::local(&self.account_key)
        } else {
            paging_key::public(&self.account_key)
        };
        match &self.client {
            BackendClient::Mastodon(client) => {
                let client = Arc::clone(client);
                let account_key = self.account_key.clone();
                Ok(self.pager_for(key, move || {
                    Arc::new(masto_med::PublicTimelineMediator {
                        client,
                        account_key,
                        local,
                    })
                }))
            }
            BackendClient::Misskey(client) => {
                let client = Arc::clone(client);
                let account_key = self.account_key.clone();
                Ok(self.pager_for(key, move || {
                    Arc::new(misskey_med::NoteTimelineMediator {
                        client,
                        account_key,
                        kind: if local {
                            misskey_med::TimelineKind::Local
                        } else {
                            misskey_med::TimelineKind::Global
                        },
                    })
                }))
            }
            _ => Err(EngineError::Unsupported(format!(
                "{} has no public timeline",
                self.platform()
            ))),
        }
    }

    pub fn notification(&self, mentions_only: bool) -> Result<Arc<TimelinePager>> {
        let key = if mentions_only {
            paging_key::mention(&self.account_key)
        } else {
            paging_key::notification(&self.account_key)
        };
        let account_key = self.account_key.clone();
        match &self.client {
            BackendClient::Mastodon(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(masto_med::NotificationMediator {
                        client,
                        account_key,
                        mentions_only,
                    })
                }))
            }
            BackendClient::Misskey(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(misskey_med::NotificationMediator {
                        client,
                        account_key,
                        mentions_only,
                    })
                }))
            }
            BackendClient::Bluesky(client) => {
                if mentions_only {
                    return Err(EngineError::Unsupported(
                        "bluesky notifications cannot be filtered to mentions".to_string(),
                    ));
                }
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(bsky_med::NotificationMediator {
                        client,
                        account_key,
                    })
                }))
            }
            BackendClient::Xqt(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(xqt_med::TweetTimelineMediator {
                        client,
                        account_key,
                        kind: xqt_med::FeedKind::Mentions,
                    })
                }))
            }
            BackendClient::Vvo(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(vvo_med::PagedTimelineMediator {
                        client,
                        account_key,
                        kind: vvo_med::PagedKind::Mentions,
                    })
                }))
            }
        }
    }

    pub fn user_timeline(&self, user_key: MicroblogKey) -> Arc<TimelinePager> {
        let key = paging_key::user_timeline(&self.account_key, &user_key);
        let account_key = self.account_key.clone();
        self.pager_for(key, move || match &self.client {
            BackendClient::Mastodon(client) => Arc::new(masto_med::UserTimelineMediator {
                client: Arc::clone(client),
                account_key,
                user_key,
                only_media: false,
            }),
            BackendClient::Misskey(client) => Arc::new(misskey_med::UserTimelineMediator {
                client: Arc::clone(client),
                account_key,
                user_key,
            }),
            BackendClient::Bluesky(client) => Arc::new(bsky_med::FeedMediator {
                client: Arc::clone(client),
                account_key,
                kind: bsky_med::FeedKind::Author(user_key),
            }),
            BackendClient::Xqt(client) => Arc::new(xqt_med::TweetTimelineMediator {
                client: Arc::clone(client),
                account_key,
                kind: xqt_med::FeedKind::User(user_key),
            }),
            BackendClient::Vvo(client) => Arc::new(vvo_med::PagedTimelineMediator {
                client: Arc::clone(client),
                account_key,
                kind: vvo_med::PagedKind::User(user_key),
            }),
        })
    }

    pub fn search_statuses(&self, query: &str) -> Arc<TimelinePager> {
        let key = paging_key::search(&self.account_key, query);
        let account_key = self.account_key.clone();
        let query = query.to_string();
        self.pager_for(key, move || match &self.client {
            BackendClient::Mastodon(client) => Arc::new(masto_med::SearchStatusMediator {
                client: Arc::clone(client),
                account_key,
                query,
            }),
            BackendClient::Misskey(client) => Arc::new(misskey_med::SearchNoteMediator {
                client: Arc::clone(client),
                account_key,
                query,
            }),
            BackendClient::Bluesky(client) => Arc::new(bsky_med::SearchPostMediator {
                client: Arc::clone(client),
                account_key,
                query,
            }),
            BackendClient::Xqt(client) => Arc::new(xqt_med::TweetTimelineMediator {
                client: Arc::clone(client),
                account_key,
                kind: xqt_med::FeedKind::Search(query),
            }),
            BackendClient::Vvo(client) => Arc::new(vvo_med::PagedTimelineMediator {
                client: Arc::clone(client),
                account_key,
                kind: vvo_med::PagedKind::Search(query),
            }),
        })
    }

    /// The focal status with its reply thread above and below.
    pub fn status_detail(&self, status_key: MicroblogKey, status_only: bool) -> Arc<TimelinePager> {
        let key = paging_key::status_detail(&self.account_key, &status_key);
        let account_key = self.account_key.clone();
        self.pager_for(key, move || match &self.client {
            BackendClient::Mastodon(client) => Arc::new(masto_med::StatusDetailMediator {
                client: Arc::clone(client),
                account_key,
                status_key,
                status_only,
            }),
            BackendClient::Misskey(client) => Arc::new(misskey_med::StatusDetailMediator {
                client: Arc::clone(client),
                account_key,
                status_key,
                status_only,
            }),
            BackendClient::Bluesky(client) => Arc::new(bsky_med::StatusDetailMediator {
                client: Arc::clone(client),
                account_key,
                status_key,
                status_only,
            }),
            BackendClient::Xqt(client) => Arc::new(xqt_med::StatusDetailMediator {
                client: Arc::clone(client),
                account_key,
                status_key,
                status_only,
            }),
            BackendClient::Vvo(client) => Arc::new(vvo_med::StatusDetailMediator {
                client: Arc::clone(client),
                account_key,
                status_key,
                status_only,
            }),
        })
    }

    pub fn list_timeline(&self, list_id: &str) -> Result<Arc<TimelinePager>> {
        let key = paging_key::list_timeline(&self.account_key, list_id);
        let account_key = self.account_key.clone();
        let list_id = list_id.to_string();
        match &self.client {
            BackendClient::Mastodon(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(masto_med::ListTimelineMediator {
                        client,
                        account_key,
                        list_id,
                    })
                }))
            }
            BackendClient::Misskey(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(misskey_med::ListTimelineMediator {
                        client,
                        account_key,
                        list_id,
                    })
                }))
            }
            BackendClient::Bluesky(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(bsky_med::FeedMediator {
                        client,
                        account_key,
                        kind: bsky_med::FeedKind::List(list_id),
                    })
                }))
            }
            BackendClient::Xqt(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(xqt_med::TweetTimelineMediator {
                        client,
                        account_key,
                        kind: xqt_med::FeedKind::List(list_id),
                    })
                }))
            }
            BackendClient::Vvo(_) => Err(EngineError::Unsupported(
                "vvo has no curated lists".to_string(),
            )),
        }
    }

    pub fn bookmarks(&self) -> Result<Arc<TimelinePager>> {
        let key = paging_key::bookmarks(&self.account_key);
        let account_key = self.account_key.clone();
        match &self.client {
            BackendClient::Mastodon(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(masto_med::BookmarkTimelineMediator {
                        client,
                        account_key,
                    })
                }))
            }
            BackendClient::Misskey(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(misskey_med::FavoriteTimelineMediator {
                        client,
                        account_key,
                    })
                }))
            }
            BackendClient::Xqt(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(xqt_med::TweetTimelineMediator {
                        client,
                        account_key,
                        kind: xqt_med::FeedKind::Bookmarks,
                    })
                }))
            }
            BackendClient::Bluesky(_) | BackendClient::Vvo(_) => Err(EngineError::Unsupported(
                format!("{} has no bookmark timeline", self.platform()),
            )),
        }
    }

    pub fn favourites(&self) -> Result<Arc<TimelinePager>> {
        let key = paging_key::favourites(&self.account_key);
        let account_key = self.account_key.clone();
        match &self.client {
            BackendClient::Mastodon(client) => {
                let client = Arc::clone(client);
                Ok(self.pager_for(key, move || {
                    Arc::new(masto_med::FavouriteTimelineMediator {
                        client,
                        account_key,
                    })
                }))
            }
            BackendClient::Bluesky(client) => {
                let client = Arc::clone(client);
                let did = MicroblogKey::new(client.did().to_string(), &self.account_key.host);
                Ok(self.pager_for(key, move || {
                    Arc::new(bsky_med::FeedMediator {
                        client,
                        account_key,
                        kind: bsky_med::FeedKind::Likes(did),
                    })
                }))
            }
            BackendClient::Xqt(client) => {
                let client = Arc::clone(client);
                let user = self.account_key.clone();
                Ok(self.pager_for(key, move || {
                    Arc::new(xqt_med::TweetTimelineMediator {
                        client,
                        account_key,
                        kind: xqt_med::FeedKind::Likes(user),
                    })
                }))
            }
            BackendClient::Misskey(_) | BackendClient::Vvo(_) => Err(EngineError::Unsupported(
                format!("{} has no likes timeline", self.platform()),
            )),
        }
    }

    // =========================================================================
    // Reactive reads
    // =========================================================================

    pub fn observe_timeline(&self, paging_key: &str) -> impl Stream<Item = Vec<TimelineItem>> {
        self.store
            .observe_timeline(self.account_key.clone(), paging_key.to_string())
    }

    pub fn observe_status(&self, status_key: MicroblogKey) -> impl Stream<Item = Option<StatusRow>> {
        self.store
            .observe_status(status_key, self.account_key.clone())
    }

    pub fn observe_user(&self, user_key: MicroblogKey) -> impl Stream<Item = Option<UserRow>> {
        self.store.observe_user(user_key)
    }

    /// Fetch one status into the cache, for deep links into uncached posts.
    pub async fn fetch_status(&self, status_key: &MicroblogKey) -> Result<()> {
        let entry = match &self.client {
            BackendClient::Mastodon(client) => {
                let status = client.get_status(&status_key.id).await?;
                mapper::mastodon::status_entry(&self.account_key, &status)
            }
            BackendClient::Misskey(client) => {
                let note = client.show_note(&status_key.id).await?;
                mapper::misskey::note_entry(&self.account_key, &note)
            }
            BackendClient::Bluesky(client) => {
                let posts = client.get_posts(&[status_key.id.clone()]).await?;
                posts
                    .first()
                    .and_then(|post| mapper::bluesky::post_entry(&self.account_key, post))
            }
            BackendClient::Xqt(client) => {
                let page = client.tweet_detail(&status_key.id, None).await?;
                page.tweets
                    .iter()
                    .find(|tweet| tweet.id_str.as_deref() == Some(status_key.id.as_str()))
                    .and_then(|tweet| mapper::xqt::tweet_entry(&self.account_key, tweet))
            }
            BackendClient::Vvo(client) => {
                let status = client.get_status(&status_key.id).await?;
                mapper::vvo::status_entry(&self.account_key, &status)
            }
        };
        let entry = entry.ok_or(EngineError::NotFound)?;
        if let Some(user) = &entry.user {
            self.store.upsert_user(user).await?;
        }
        self.store.upsert_status(&entry.status).await
    }

    /// Fetch one user profile into the cache.
    pub async fn fetch_user(&self, user_key: &MicroblogKey) -> Result<()> {
        let row = match &self.client {
            BackendClient::Mastodon(client) => {
                let account = client.lookup_user(&user_key.id).await?;
                mapper::mastodon::user_row(&self.account_key.host, &account)
            }
            BackendClient::Misskey(client) => {
                let user = client.show_user(&user_key.id).await?;
                mapper::misskey::user_row(&self.account_key.host, &user)
            }
            BackendClient::Bluesky(client) => {
                let profile = client.get_profile(&user_key.id).await?;
                mapper::bluesky::user_row(&self.account_key.host, &profile)
            }
            BackendClient::Xqt(_) | BackendClient::Vvo(_) => {
                return Err(EngineError::Unsupported(format!(
                    "{} has no profile lookup in this client",
                    self.platform()
                )));
            }
        };
        let row = row.ok_or(EngineError::NotFound)?;
        self.store.upsert_user(&row).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    async fn current_content(&self, status_key: &MicroblogKey) -> Result<StatusContent> {
        Ok(self
            .store
            .get_status(status_key, &self.account_key)
            .await?
            .ok_or(EngineError::NotFound)?
            .content)
    }

    /// Toggle like/favourite/reaction on a status. The current state is
    /// read from the cache, so callers never pass stale flags.
    pub async fn like(&self, status_key: &MicroblogKey) -> Result<()> {
        let content = self.current_content(status_key).await?;
        match (&self.client, content) {
            (BackendClient::Mastodon(client), StatusContent::Mastodon(status)) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .like(status_key, status.favourited.unwrap_or(false))
                .await
            }
            (BackendClient::Misskey(client), StatusContent::Misskey(note)) => {
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .like(status_key, note.my_reaction.is_some())
                .await
            }
            (BackendClient::Bluesky(client), StatusContent::Bluesky(post)) => {
                let liked_uri = post
                    .viewer
                    .as_ref()
                    .and_then(|viewer| viewer.like.clone())
                    .filter(|uri| !uri.is_empty());
                BlueskyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .like(status_key, liked_uri.as_deref())
                .await
            }
            (BackendClient::Xqt(client), StatusContent::Xqt(tweet)) => {
                XqtStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .like(status_key, tweet.favorited.unwrap_or(false))
                .await
            }
            (BackendClient::Vvo(client), StatusContent::Vvo(status)) => {
                VvoStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .like(status_key, status.favorited.unwrap_or(false))
                .await
            }
            _ => Err(EngineError::Protocol(
                "cached status does not match this account's backend".to_string(),
            )),
        }
    }

    pub async fn repost(&self, status_key: &MicroblogKey) -> Result<()> {
        let content = self.current_content(status_key).await?;
        match (&self.client, content) {
            (BackendClient::Mastodon(client), StatusContent::Mastodon(status)) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .repost(status_key, status.reblogged.unwrap_or(false))
                .await
            }
            (BackendClient::Misskey(client), StatusContent::Misskey(_)) => {
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                // A renote's undo needs the viewer's renote ID, which the
                // timeline payload does not carry; treat repost as one-way.
                .repost(status_key, false)
                .await
            }
            (BackendClient::Bluesky(client), StatusContent::Bluesky(post)) => {
                let repost_uri = post
                    .viewer
                    .as_ref()
                    .and_then(|viewer| viewer.repost.clone())
                    .filter(|uri| !uri.is_empty());
                BlueskyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .repost(status_key, repost_uri.as_deref())
                .await
            }
            (BackendClient::Xqt(client), StatusContent::Xqt(tweet)) => {
                XqtStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .repost(status_key, tweet.retweeted.unwrap_or(false))
                .await
            }
            (BackendClient::Vvo(client), StatusContent::Vvo(_)) => {
                VvoStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .repost(status_key, "")
                .await
            }
            _ => Err(EngineError::Protocol(
                "cached status does not match this account's backend".to_string(),
            )),
        }
    }

    pub async fn bookmark(&self, status_key: &MicroblogKey) -> Result<()> {
        let content = self.current_content(status_key).await?;
        match (&self.client, content) {
            (BackendClient::Mastodon(client), StatusContent::Mastodon(status)) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .bookmark(status_key, status.bookmarked.unwrap_or(false))
                .await
            }
            (BackendClient::Misskey(client), StatusContent::Misskey(_)) => {
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .bookmark(status_key, false)
                .await
            }
            (BackendClient::Xqt(client), StatusContent::Xqt(tweet)) => {
                XqtStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .bookmark(status_key, tweet.bookmarked.unwrap_or(false))
                .await
            }
            (BackendClient::Bluesky(_), _) | (BackendClient::Vvo(_), _) => {
                Err(EngineError::Unsupported(format!(
                    "{} has no bookmarks",
                    self.platform()
                )))
            }
            _ => Err(EngineError::Protocol(
                "cached status does not match this account's backend".to_string(),
            )),
        }
    }

    /// Delete the viewer's own status: cache first, then remote.
    pub async fn delete(&self, status_key: &MicroblogKey) -> Result<()> {
        match &self.client {
            BackendClient::Mastodon(client) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .delete(status_key)
                .await
            }
            BackendClient::Misskey(client) => {
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .delete(status_key)
                .await
            }
            BackendClient::Bluesky(client) => {
                BlueskyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .delete(status_key)
                .await
            }
            BackendClient::Xqt(client) => {
                XqtStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .delete(status_key)
                .await
            }
            BackendClient::Vvo(client) => {
                VvoStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .delete(status_key)
                .await
            }
        }
    }

    pub async fn compose(&self, data: &ComposeData) -> Result<()> {
        match &self.client {
            BackendClient::Mastodon(client) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .compose(data)
                .await
            }
            BackendClient::Misskey(client) => {
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .compose(data)
                .await
            }
            BackendClient::Bluesky(client) => {
                BlueskyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .compose(data)
                .await
            }
            BackendClient::Xqt(client) => {
                XqtStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .compose(data)
                .await
            }
            BackendClient::Vvo(client) => {
                VvoStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .compose(data)
                .await
            }
        }
    }

    /// Toggle follow on a user, optimistically where the backend carries
    /// relation state in its user payload.
    pub async fn follow(&self, user_key: &MicroblogKey) -> Result<()> {
        let current = self.store.get_user(user_key).await?;
        match &self.client {
            BackendClient::Mastodon(client) => {
                MastodonStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .follow(user_key, false)
                .await
            }
            BackendClient::Misskey(client) => {
                let following = matches!(
                    current.map(|row| row.content),
                    Some(UserContent::Misskey(user)) if user.is_following == Some(true)
                );
                MisskeyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .follow(user_key, following)
                .await
            }
            BackendClient::Bluesky(client) => {
                let following_uri = match current.map(|row| row.content) {
                    Some(UserContent::Bluesky(profile)) => profile
                        .viewer
                        .and_then(|viewer| viewer.following)
                        .filter(|uri| !uri.is_empty()),
                    _ => None,
                };
                BlueskyStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .follow(user_key, following_uri.as_deref())
                .await
            }
            BackendClient::Vvo(client) => {
                let following = matches!(
                    current.map(|row| row.content),
                    Some(UserContent::Vvo(user)) if user.following == Some(true)
                );
                VvoStatusActions {
                    store: Arc::clone(&self.store),
                    client: Arc::clone(client),
                    account_key: self.account_key.clone(),
                }
                .follow(user_key, following)
                .await
            }
            BackendClient::Xqt(_) => Err(EngineError::Unsupported(
                "xqt follow is not wired in this client".to_string(),
            )),
        }
    }

    // =========================================================================
    // Lists and direct messages
    // =========================================================================

    pub fn lists(&self) -> Result<ListHandler> {
        let loader: Arc<dyn crate::service::list::ListLoader> = match &self.client {
            BackendClient::Mastodon(client) => Arc::new(MastodonListLoader {
                client: Arc::clone(client),
            }),
            BackendClient::Misskey(client) => Arc::new(MisskeyListLoader {
                client: Arc::clone(client),
            }),
            BackendClient::Bluesky(client) => Arc::new(BlueskyListLoader {
                client: Arc::clone(client),
            }),
            BackendClient::Xqt(client) => Arc::new(XqtListLoader {
                client: Arc::clone(client),
            }),
            BackendClient::Vvo(_) => {
                return Err(EngineError::Unsupported(
                    "vvo has no curated lists".to_string(),
                ));
            }
        };
        Ok(ListHandler::new(
            Arc::clone(&self.store),
            loader,
            self.account_key.clone(),
            paging_key::lists(&self.account_key),
        ))
    }

    pub fn messages(&self) -> Result<DirectMessageHandler> {
        let loader: Arc<dyn crate::service::message::RoomLoader> = match &self.client {
            BackendClient::Mastodon(client) => Arc::new(MastodonRoomLoader {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
            }),
            BackendClient::Xqt(client) => Arc::new(XqtRoomLoader {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
            }),
            BackendClient::Vvo(client) => Arc::new(VvoRoomLoader {
                client: Arc::clone(client),
                account_key: self.account_key.clone(),
            }),
            BackendClient::Misskey(_) | BackendClient::Bluesky(_) => {
                return Err(EngineError::Unsupported(format!(
                    "{} has no direct messages",
                    self.platform()
                )));
            }
        };
        Ok(DirectMessageHandler::new(
            Arc::clone(&self.store),
            loader,
            self.account_key.clone(),
        ))
    }

    // =========================================================================
    // Notification badge
    // =========================================================================

    fn seen_setting_key(&self) -> String {
        format!("notifications_seen_{}", self.account_key)
    }

    /// Record the newest cached notification as seen.
    pub async fn mark_notifications_seen(&self) -> Result<()> {
        let key = paging_key::notification(&self.account_key);
        let rows = self.store.paging_rows(&self.account_key, &key).await?;
        if let Some(newest) = rows.first() {
            self.store
                .set_setting(&self.seen_setting_key(), &newest.status_key.to_string())
                .await?;
        }
        Ok(())
    }

    /// Cached notifications newer than the last seen marker. Everything
    /// counts until the first mark.
    pub async fn unread_notification_count(&self) -> Result<i64> {
        let key = paging_key::notification(&self.account_key);
        let rows = self.store.paging_rows(&self.account_key, &key).await?;
        let seen = self.store.get_setting(&self.seen_setting_key()).await?;
        let Some(seen) = seen else {
            return Ok(rows.len() as i64);
        };
        let seen_sort = rows
            .iter()
            .find(|row| row.status_key.to_string() == seen)
            .map(|row| row.sort_id);
        Ok(match seen_sort {
            Some(seen_sort) => rows.iter().filter(|row| row.sort_id < seen_sort).count() as i64,
            None => rows.len() as i64,
        })
    }
}
