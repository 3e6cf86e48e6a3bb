//! SQLite cache store
//!
//! All cache access goes through this module. Writes are transactional so a
//! failed or cancelled fetch never leaves a page half-applied; readers
//! subscribe to a broadcast channel and re-query on invalidation instead of
//! polling.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use futures::Stream;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tokio::sync::{broadcast, Mutex};

use super::models::*;
use crate::error::Result;
use crate::metrics::CACHE_TRANSACTIONS_TOTAL;
use crate::model::{AccountKey, MicroblogKey, PlatformType};

/// Capacity of the change-notification channel. Slow subscribers observe a
/// lag error and re-query, so dropped events are safe.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Cache invalidation event
///
/// Keys are carried in string form; subscribers match on the parts they
/// care about and re-read from the store.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Timeline {
        account_key: String,
        paging_key: String,
    },
    Status {
        status_key: String,
    },
    User {
        user_key: String,
    },
    List {
        account_key: String,
        paging_key: String,
    },
    Room {
        account_key: String,
        room_key: String,
    },
    RoomList {
        account_key: String,
    },
}

/// One timeline entry joined with its status and author rows
#[derive(Debug, Clone)]
pub struct TimelineItem {
    pub sort_id: i64,
    pub status: StatusRow,
    pub user: Option<UserRow>,
}

/// Cache store over a SQLite pool
///
/// Shared by all mediators and the mutation engine. Only the paging engine
/// writes `paging_timeline` rows for its own paging key; any component may
/// update a status row, but only through [`CacheStore::update_status`] so
/// concurrent mutations on the same key serialize.
pub struct CacheStore {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<ChangeEvent>,
    status_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    /// Open (or create) the cache database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        init_schema(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        tracing::debug!("Cache store initialized");
        Ok(Self {
            pool,
            changes,
            status_locks: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to cache invalidation events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn notify(&self, event: ChangeEvent) {
        // No receivers is fine; the UI may not be observing yet.
        let _ = self.changes.send(event);
    }

    async fn lock_for(
        locks: &Mutex<HashMap<String, Arc<Mutex<()>>>>,
        key: &str,
    ) -> Arc<Mutex<()>> {
        let mut map = locks.lock().await;
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Timeline pages
    // =========================================================================

    /// Replace a paging key's entries with a fresh page.
    ///
    /// Clear and insert happen in one transaction: a failure rolls the
    /// whole page back, so the feed is never left half-cleared. Sort IDs
    /// restart at 0.
    pub async fn replace_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        entries: &[CachedEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM paging_timeline WHERE account_key = ? AND paging_key = ?")
            .bind(account_key.to_string())
            .bind(paging_key)
            .execute(&mut *tx)
            .await?;
        let inserted =
            insert_entries(&mut tx, account_key, paging_key, entries, 0, &HashSet::new()).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["replace_page"])
            .inc();
        self.notify(ChangeEvent::Timeline {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(inserted)
    }

    /// Append a page below the current window.
    ///
    /// Status keys already present under this paging key are skipped, so a
    /// backend returning overlapping pages introduces neither duplicates
    /// nor sort-id gaps.
    pub async fn append_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        entries: &[CachedEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let existing = existing_status_keys(&mut tx, account_key, paging_key).await?;
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_id) + 1, 0) FROM paging_timeline
             WHERE account_key = ? AND paging_key = ?",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .fetch_one(&mut *tx)
        .await?;
        let inserted = insert_entries(&mut tx, account_key, paging_key, entries, next, &existing).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["append_page"])
            .inc();
        self.notify(ChangeEvent::Timeline {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(inserted)
    }

    /// Prepend a page above the current top.
    ///
    /// New entries receive sort IDs below the current minimum, preserving
    /// their own relative order.
    pub async fn prepend_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        entries: &[CachedEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let existing = existing_status_keys(&mut tx, account_key, paging_key).await?;
        let fresh: Vec<&CachedEntry> = {
            let mut seen = existing.clone();
            entries
                .iter()
                .filter(|entry| seen.insert(entry.status.status_key.to_string()))
                .collect()
        };
        let min: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MIN(sort_id), 0) FROM paging_timeline
             WHERE account_key = ? AND paging_key = ?",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .fetch_one(&mut *tx)
        .await?;
        let mut sort_id = min - fresh.len() as i64;
        let mut inserted = 0;
        for entry in fresh {
            upsert_status_tx(&mut tx, &entry.status).await?;
            if let Some(user) = &entry.user {
                upsert_user_tx(&mut tx, user).await?;
            }
            insert_paging_row(&mut tx, account_key, paging_key, &entry.status.status_key, sort_id)
                .await?;
            sort_id += 1;
            inserted += 1;
        }
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["prepend_page"])
            .inc();
        self.notify(ChangeEvent::Timeline {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(inserted)
    }

    /// Replace a paging key with a flattened thread.
    ///
    /// Every entry must carry an explicit sort offset; ancestors are
    /// negative, the focal post zero, replies positive, so the joined read
    /// orders ancestors above the focal post and replies below it.
    pub async fn replace_thread(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        entries: &[CachedEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM paging_timeline WHERE account_key = ? AND paging_key = ?")
            .bind(account_key.to_string())
            .bind(paging_key)
            .execute(&mut *tx)
            .await?;
        let mut inserted = 0;
        let mut seen = HashSet::new();
        for entry in entries {
            let sort_id = entry.sort_offset.unwrap_or(inserted as i64);
            if !seen.insert(entry.status.status_key.to_string()) {
                continue;
            }
            upsert_status_tx(&mut tx, &entry.status).await?;
            if let Some(user) = &entry.user {
                upsert_user_tx(&mut tx, user).await?;
            }
            insert_paging_row(&mut tx, account_key, paging_key, &entry.status.status_key, sort_id)
                .await?;
            inserted += 1;
        }
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["replace_thread"])
            .inc();
        self.notify(ChangeEvent::Timeline {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(inserted)
    }

    /// Number of entries cached under a paging key.
    pub async fn timeline_count(&self, account_key: &AccountKey, paging_key: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM paging_timeline WHERE account_key = ? AND paging_key = ?",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .fetch_one(&self.pool)
        .await?)
    }

    /// One window of a paging key, joined to status and author rows,
    /// ordered by sort ID.
    pub async fn timeline_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimelineItem>> {
        let rows = sqlx::query(
            "SELECT p.sort_id, s.status_key, s.account_key, s.platform_type, s.user_key, s.content,
                    u.user_key AS u_key, u.platform_type AS u_platform, u.name, u.handle, u.host,
                    u.content AS u_content
             FROM paging_timeline p
             JOIN status s ON s.status_key = p.status_key AND s.account_key = p.account_key
             LEFT JOIN user u ON u.user_key = s.user_key
             WHERE p.account_key = ? AND p.paging_key = ?
             ORDER BY p.sort_id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(timeline_item_from_row).collect()
    }

    /// All entries of a paging key in display order.
    pub async fn timeline_items(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
    ) -> Result<Vec<TimelineItem>> {
        self.timeline_page(account_key, paging_key, i64::MAX, 0).await
    }

    /// Raw paging rows for a key, in sort order. Mostly useful in tests
    /// and for cursor recovery.
    pub async fn paging_rows(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
    ) -> Result<Vec<PagingTimelineRow>> {
        let rows = sqlx::query(
            "SELECT account_key, paging_key, status_key, sort_id FROM paging_timeline
             WHERE account_key = ? AND paging_key = ?
             ORDER BY sort_id ASC",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(PagingTimelineRow {
                    account_key: parse_key(row.get("account_key"))?,
                    paging_key: row.get("paging_key"),
                    status_key: parse_key(row.get("status_key"))?,
                    sort_id: row.get("sort_id"),
                })
            })
            .collect()
    }

    // =========================================================================
    // Statuses
    // =========================================================================

    pub async fn get_status(
        &self,
        status_key: &MicroblogKey,
        account_key: &AccountKey,
    ) -> Result<Option<StatusRow>> {
        let row = sqlx::query(
            "SELECT status_key, account_key, platform_type, user_key, content FROM status
             WHERE status_key = ? AND account_key = ?",
        )
        .bind(status_key.to_string())
        .bind(account_key.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(status_row_from_row).transpose()
    }

    /// Insert or update a single status row outside a page write.
    pub async fn upsert_status(&self, status: &StatusRow) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_status_tx(&mut tx, status).await?;
        tx.commit().await?;
        self.notify(ChangeEvent::Status {
            status_key: status.status_key.to_string(),
        });
        Ok(())
    }

    /// Read-modify-write a status row under its per-key lock.
    ///
    /// Returns the pre-mutation content when the row existed, which the
    /// mutation engine keeps as its rollback snapshot. Concurrent calls on
    /// the same key serialize; calls on different keys do not contend.
    pub async fn update_status<F>(
        &self,
        status_key: &MicroblogKey,
        account_key: &AccountKey,
        update: F,
    ) -> Result<Option<StatusContent>>
    where
        F: FnOnce(StatusContent) -> StatusContent,
    {
        let lock = Self::lock_for(&self.status_locks, &status_key.to_string()).await;
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT content FROM status WHERE status_key = ? AND account_key = ?",
        )
        .bind(status_key.to_string())
        .bind(account_key.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let previous = StatusContent::from_blob(row.get("content"));
        let updated = update(previous.clone());
        sqlx::query("UPDATE status SET content = ? WHERE status_key = ? AND account_key = ?")
            .bind(updated.to_blob()?)
            .bind(status_key.to_string())
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["update_status"])
            .inc();
        self.notify(ChangeEvent::Status {
            status_key: status_key.to_string(),
        });
        Ok(Some(previous))
    }

    /// Overwrite a status row's content under its per-key lock.
    ///
    /// Rollback and reconcile writes use this so they serialize with any
    /// concurrent optimistic update on the same key.
    pub async fn write_status_content(
        &self,
        status_key: &MicroblogKey,
        account_key: &AccountKey,
        content: &StatusContent,
    ) -> Result<()> {
        let lock = Self::lock_for(&self.status_locks, &status_key.to_string()).await;
        let _guard = lock.lock().await;
        sqlx::query("UPDATE status SET content = ? WHERE status_key = ? AND account_key = ?")
            .bind(content.to_blob()?)
            .bind(status_key.to_string())
            .bind(account_key.to_string())
            .execute(&self.pool)
            .await?;
        self.notify(ChangeEvent::Status {
            status_key: status_key.to_string(),
        });
        Ok(())
    }

    /// Remove a status row and its membership in every feed.
    pub async fn delete_status(
        &self,
        status_key: &MicroblogKey,
        account_key: &AccountKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM status WHERE status_key = ? AND account_key = ?")
            .bind(status_key.to_string())
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM paging_timeline WHERE status_key = ? AND account_key = ?")
            .bind(status_key.to_string())
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["delete_status"])
            .inc();
        self.notify(ChangeEvent::Status {
            status_key: status_key.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn get_user(&self, user_key: &MicroblogKey) -> Result<Option<UserRow>> {
        let row = sqlx::query(
            "SELECT user_key, platform_type, name, handle, host, content FROM user
             WHERE user_key = ?",
        )
        .bind(user_key.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_row_from_row).transpose()
    }

    pub async fn upsert_user(&self, user: &UserRow) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_user_tx(&mut tx, user).await?;
        tx.commit().await?;
        self.notify(ChangeEvent::User {
            user_key: user.user_key.to_string(),
        });
        Ok(())
    }

    /// Read-modify-write a user row under its per-key lock, for optimistic
    /// relation updates (follow/unfollow).
    pub async fn update_user<F>(&self, user_key: &MicroblogKey, update: F) -> Result<Option<UserContent>>
    where
        F: FnOnce(UserContent) -> UserContent,
    {
        let lock = Self::lock_for(&self.user_locks, &user_key.to_string()).await;
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT content FROM user WHERE user_key = ?")
            .bind(user_key.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let previous = UserContent::from_blob(row.get("content"));
        let updated = update(previous.clone());
        sqlx::query("UPDATE user SET content = ? WHERE user_key = ?")
            .bind(updated.to_blob()?)
            .bind(user_key.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.notify(ChangeEvent::User {
            user_key: user_key.to_string(),
        });
        Ok(Some(previous))
    }

    pub async fn write_user_content(
        &self,
        user_key: &MicroblogKey,
        content: &UserContent,
    ) -> Result<()> {
        let lock = Self::lock_for(&self.user_locks, &user_key.to_string()).await;
        let _guard = lock.lock().await;
        sqlx::query("UPDATE user SET content = ? WHERE user_key = ?")
            .bind(content.to_blob()?)
            .bind(user_key.to_string())
            .execute(&self.pool)
            .await?;
        self.notify(ChangeEvent::User {
            user_key: user_key.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Replace a list paging key with a fresh page of lists.
    pub async fn replace_list_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        lists: &[ListRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM list_paging WHERE account_key = ? AND paging_key = ?")
            .bind(account_key.to_string())
            .bind(paging_key)
            .execute(&mut *tx)
            .await?;
        insert_lists_tx(&mut tx, account_key, paging_key, lists).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["replace_list_page"])
            .inc();
        self.notify(ChangeEvent::List {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(())
    }

    /// Append a page of lists to a list paging key.
    pub async fn append_list_page(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
        lists: &[ListRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_lists_tx(&mut tx, account_key, paging_key, lists).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["append_list_page"])
            .inc();
        self.notify(ChangeEvent::List {
            account_key: account_key.to_string(),
            paging_key: paging_key.to_string(),
        });
        Ok(())
    }

    /// Insert or update a single list, optionally attaching it to a paging key.
    pub async fn upsert_list(&self, list: &ListRow, paging_key: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO list (list_key, account_key, content) VALUES (?, ?, ?)
             ON CONFLICT (list_key, account_key) DO UPDATE SET content = excluded.content",
        )
        .bind(list.list_key.to_string())
        .bind(list.account_key.to_string())
        .bind(serde_json::to_string(&list.content)?)
        .execute(&mut *tx)
        .await?;
        if let Some(paging_key) = paging_key {
            sqlx::query(
                "INSERT INTO list_paging (account_key, paging_key, list_key) VALUES (?, ?, ?)
                 ON CONFLICT (account_key, paging_key, list_key) DO NOTHING",
            )
            .bind(list.account_key.to_string())
            .bind(paging_key)
            .bind(list.list_key.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.notify(ChangeEvent::List {
            account_key: list.account_key.to_string(),
            paging_key: paging_key.unwrap_or("").to_string(),
        });
        Ok(())
    }

    pub async fn update_list_content(
        &self,
        list_key: &MicroblogKey,
        account_key: &AccountKey,
        content: &ListMetaData,
    ) -> Result<()> {
        sqlx::query("UPDATE list SET content = ? WHERE list_key = ? AND account_key = ?")
            .bind(serde_json::to_string(content)?)
            .bind(list_key.to_string())
            .bind(account_key.to_string())
            .execute(&self.pool)
            .await?;
        self.notify(ChangeEvent::List {
            account_key: account_key.to_string(),
            paging_key: String::new(),
        });
        Ok(())
    }

    /// Remove a list and its paging memberships.
    pub async fn delete_list(
        &self,
        list_key: &MicroblogKey,
        account_key: &AccountKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM list WHERE list_key = ? AND account_key = ?")
            .bind(list_key.to_string())
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM list_paging WHERE list_key = ? AND account_key = ?")
            .bind(list_key.to_string())
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.notify(ChangeEvent::List {
            account_key: account_key.to_string(),
            paging_key: String::new(),
        });
        Ok(())
    }

    pub async fn get_list(
        &self,
        list_key: &MicroblogKey,
        account_key: &AccountKey,
    ) -> Result<Option<ListRow>> {
        let row = sqlx::query(
            "SELECT list_key, account_key, content FROM list
             WHERE list_key = ? AND account_key = ?",
        )
        .bind(list_key.to_string())
        .bind(account_key.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(list_row_from_row).transpose()
    }

    /// Lists attached to a paging key, in insertion order.
    pub async fn lists_for_paging(
        &self,
        account_key: &AccountKey,
        paging_key: &str,
    ) -> Result<Vec<ListRow>> {
        let rows = sqlx::query(
            "SELECT l.list_key, l.account_key, l.content
             FROM list_paging p
             JOIN list l ON l.list_key = p.list_key AND l.account_key = p.account_key
             WHERE p.account_key = ? AND p.paging_key = ?
             ORDER BY p.rowid ASC",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(list_row_from_row).collect()
    }

    // =========================================================================
    // Direct messages
    // =========================================================================

    /// Replace the room roster for an account.
    pub async fn replace_rooms(
        &self,
        account_key: &AccountKey,
        rooms: &[MessageRoomRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM message_room WHERE account_key = ?")
            .bind(account_key.to_string())
            .execute(&mut *tx)
            .await?;
        for room in rooms {
            upsert_room_tx(&mut tx, room).await?;
        }
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["replace_rooms"])
            .inc();
        self.notify(ChangeEvent::RoomList {
            account_key: account_key.to_string(),
        });
        Ok(())
    }

    pub async fn upsert_room(&self, room: &MessageRoomRow) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_room_tx(&mut tx, room).await?;
        tx.commit().await?;
        self.notify(ChangeEvent::RoomList {
            account_key: room.account_key.to_string(),
        });
        Ok(())
    }

    pub async fn rooms(&self, account_key: &AccountKey) -> Result<Vec<MessageRoomRow>> {
        let rows = sqlx::query(
            "SELECT room_key, account_key, content FROM message_room WHERE account_key = ?
             ORDER BY rowid ASC",
        )
        .bind(account_key.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(room_row_from_row).collect()
    }

    /// Replace a room's items with a fresh page. Sort IDs restart at 0.
    pub async fn replace_room_items(
        &self,
        account_key: &AccountKey,
        room_key: &MicroblogKey,
        items: &[(MicroblogKey, MessageContent)],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM message_item WHERE account_key = ? AND room_key = ?")
            .bind(account_key.to_string())
            .bind(room_key.to_string())
            .execute(&mut *tx)
            .await?;
        let inserted =
            insert_message_items(&mut tx, account_key, room_key, items, 0, &HashSet::new()).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["replace_room_items"])
            .inc();
        self.notify(ChangeEvent::Room {
            account_key: account_key.to_string(),
            room_key: room_key.to_string(),
        });
        Ok(inserted)
    }

    /// Append older items below a room's current window, with the same
    /// dedupe and monotonic sort-id rules as timeline appends.
    pub async fn append_room_items(
        &self,
        account_key: &AccountKey,
        room_key: &MicroblogKey,
        items: &[(MicroblogKey, MessageContent)],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let existing: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT message_key FROM message_item WHERE account_key = ? AND room_key = ?",
        )
        .bind(account_key.to_string())
        .bind(room_key.to_string())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_id) + 1, 0) FROM message_item
             WHERE account_key = ? AND room_key = ?",
        )
        .bind(account_key.to_string())
        .bind(room_key.to_string())
        .fetch_one(&mut *tx)
        .await?;
        let inserted =
            insert_message_items(&mut tx, account_key, room_key, items, next, &existing).await?;
        tx.commit().await?;
        CACHE_TRANSACTIONS_TOTAL
            .with_label_values(&["append_room_items"])
            .inc();
        self.notify(ChangeEvent::Room {
            account_key: account_key.to_string(),
            room_key: room_key.to_string(),
        });
        Ok(inserted)
    }

    pub async fn room_items(
        &self,
        account_key: &AccountKey,
        room_key: &MicroblogKey,
    ) -> Result<Vec<MessageItemRow>> {
        let rows = sqlx::query(
            "SELECT message_key, room_key, account_key, sort_id, content FROM message_item
             WHERE account_key = ? AND room_key = ?
             ORDER BY sort_id ASC",
        )
        .bind(account_key.to_string())
        .bind(room_key.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(message_item_from_row).collect()
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Key-value settings, used for per-account markers such as the last
    /// seen notification.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO setting (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM setting WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Observe a paging key as a stream of full snapshots.
    ///
    /// Emits the current state immediately, then a fresh snapshot whenever
    /// the key's entries or any status row change. A lagged subscriber
    /// simply re-queries, so missed events cannot be observed as staleness.
    pub fn observe_timeline(
        self: &Arc<Self>,
        account_key: AccountKey,
        paging_key: String,
    ) -> impl Stream<Item = Vec<TimelineItem>> {
        let store = Arc::clone(self);
        let rx = self.subscribe();
        futures::stream::unfold(
            ObserveState {
                store,
                rx,
                account_key,
                key: paging_key,
                primed: false,
            },
            |mut state| async move {
                if !state.primed {
                    state.primed = true;
                    let snapshot = state
                        .store
                        .timeline_items(&state.account_key, &state.key)
                        .await
                        .unwrap_or_default();
                    return Some((snapshot, state));
                }
                loop {
                    match state.rx.recv().await {
                        Ok(event) => {
                            let relevant = match &event {
                                ChangeEvent::Timeline {
                                    account_key,
                                    paging_key,
                                } => {
                                    *paging_key == state.key
                                        && *account_key == state.account_key.to_string()
                                }
                                // A status mutation may touch any feed the
                                // status appears in; membership is unknown
                                // here, so re-query.
                                ChangeEvent::Status { .. } | ChangeEvent::User { .. } => true,
                                _ => false,
                            };
                            if relevant {
                                let snapshot = state
                                    .store
                                    .timeline_items(&state.account_key, &state.key)
                                    .await
                                    .unwrap_or_default();
                                return Some((snapshot, state));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let snapshot = state
                                .store
                                .timeline_items(&state.account_key, &state.key)
                                .await
                                .unwrap_or_default();
                            return Some((snapshot, state));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )
    }

    /// Observe a single status row.
    pub fn observe_status(
        self: &Arc<Self>,
        status_key: MicroblogKey,
        account_key: AccountKey,
    ) -> impl Stream<Item = Option<StatusRow>> {
        let store = Arc::clone(self);
        let rx = self.subscribe();
        futures::stream::unfold(
            (store, rx, status_key, account_key, false),
            |(store, mut rx, status_key, account_key, primed)| async move {
                if !primed {
                    let row = store.get_status(&status_key, &account_key).await.ok().flatten();
                    return Some((row, (store, rx, status_key, account_key, true)));
                }
                loop {
                    match rx.recv().await {
                        Ok(ChangeEvent::Status { status_key: key })
                            if key == status_key.to_string() =>
                        {
                            let row =
                                store.get_status(&status_key, &account_key).await.ok().flatten();
                            return Some((row, (store, rx, status_key, account_key, true)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let row =
                                store.get_status(&status_key, &account_key).await.ok().flatten();
                            return Some((row, (store, rx, status_key, account_key, true)));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )
    }

    /// Observe a single user row.
    pub fn observe_user(
        self: &Arc<Self>,
        user_key: MicroblogKey,
    ) -> impl Stream<Item = Option<UserRow>> {
        let store = Arc::clone(self);
        let rx = self.subscribe();
        futures::stream::unfold(
            (store, rx, user_key, false),
            |(store, mut rx, user_key, primed)| async move {
                if !primed {
                    let row = store.get_user(&user_key).await.ok().flatten();
                    return Some((row, (store, rx, user_key, true)));
                }
                loop {
                    match rx.recv().await {
                        Ok(ChangeEvent::User { user_key: key }) if key == user_key.to_string() => {
                            let row = store.get_user(&user_key).await.ok().flatten();
                            return Some((row, (store, rx, user_key, true)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let row = store.get_user(&user_key).await.ok().flatten();
                            return Some((row, (store, rx, user_key, true)));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )
    }

    /// Observe the lists attached to a paging key.
    pub fn observe_lists(
        self: &Arc<Self>,
        account_key: AccountKey,
        paging_key: String,
    ) -> impl Stream<Item = Vec<ListRow>> {
        let store = Arc::clone(self);
        let rx = self.subscribe();
        futures::stream::unfold(
            (store, rx, account_key, paging_key, false),
            |(store, mut rx, account_key, paging_key, primed)| async move {
                if !primed {
                    let rows = store
                        .lists_for_paging(&account_key, &paging_key)
                        .await
                        .unwrap_or_default();
                    return Some((rows, (store, rx, account_key, paging_key, true)));
                }
                loop {
                    match rx.recv().await {
                        Ok(ChangeEvent::List { account_key: event_account, .. })
                            if event_account == account_key.to_string() =>
                        {
                            let rows = store
                                .lists_for_paging(&account_key, &paging_key)
                                .await
                                .unwrap_or_default();
                            return Some((rows, (store, rx, account_key, paging_key, true)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let rows = store
                                .lists_for_paging(&account_key, &paging_key)
                                .await
                                .unwrap_or_default();
                            return Some((rows, (store, rx, account_key, paging_key, true)));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )
    }
}

struct ObserveState {
    store: Arc<CacheStore>,
    rx: broadcast::Receiver<ChangeEvent>,
    account_key: AccountKey,
    key: String,
    primed: bool,
}

// =============================================================================
// Schema and row helpers
// =============================================================================

async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS status (
            status_key TEXT NOT NULL,
            account_key TEXT NOT NULL,
            platform_type TEXT NOT NULL,
            user_key TEXT,
            content TEXT NOT NULL,
            PRIMARY KEY (status_key, account_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user (
            user_key TEXT PRIMARY KEY,
            platform_type TEXT NOT NULL,
            name TEXT NOT NULL,
            handle TEXT NOT NULL,
            host TEXT NOT NULL,
            content TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS paging_timeline (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_key TEXT NOT NULL,
            paging_key TEXT NOT NULL,
            status_key TEXT NOT NULL,
            sort_id INTEGER NOT NULL,
            UNIQUE (account_key, paging_key, status_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_paging_timeline_page
         ON paging_timeline (account_key, paging_key, sort_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS list (
            list_key TEXT NOT NULL,
            account_key TEXT NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (list_key, account_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS list_paging (
            account_key TEXT NOT NULL,
            paging_key TEXT NOT NULL,
            list_key TEXT NOT NULL,
            PRIMARY KEY (account_key, paging_key, list_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message_room (
            room_key TEXT NOT NULL,
            account_key TEXT NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (room_key, account_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message_item (
            message_key TEXT NOT NULL,
            room_key TEXT NOT NULL,
            account_key TEXT NOT NULL,
            sort_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (message_key, account_key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_message_item_room
         ON message_item (account_key, room_key, sort_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS setting (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn existing_status_keys(
    tx: &mut Transaction<'_, Sqlite>,
    account_key: &AccountKey,
    paging_key: &str,
) -> Result<HashSet<String>> {
    Ok(sqlx::query_scalar::<_, String>(
        "SELECT status_key FROM paging_timeline WHERE account_key = ? AND paging_key = ?",
    )
    .bind(account_key.to_string())
    .bind(paging_key)
    .fetch_all(&mut **tx)
    .await?
    .into_iter()
    .collect())
}

/// Insert entries sequentially from `start_sort_id`, skipping status keys
/// in `existing` and duplicates within the batch itself.
async fn insert_entries(
    tx: &mut Transaction<'_, Sqlite>,
    account_key: &AccountKey,
    paging_key: &str,
    entries: &[CachedEntry],
    start_sort_id: i64,
    existing: &HashSet<String>,
) -> Result<usize> {
    let mut seen = existing.clone();
    let mut sort_id = start_sort_id;
    let mut inserted = 0;
    for entry in entries {
        upsert_status_tx(tx, &entry.status).await?;
        if let Some(user) = &entry.user {
            upsert_user_tx(tx, user).await?;
        }
        if !seen.insert(entry.status.status_key.to_string()) {
            continue;
        }
        insert_paging_row(tx, account_key, paging_key, &entry.status.status_key, sort_id).await?;
        sort_id += 1;
        inserted += 1;
    }
    Ok(inserted)
}

async fn insert_paging_row(
    tx: &mut Transaction<'_, Sqlite>,
    account_key: &AccountKey,
    paging_key: &str,
    status_key: &MicroblogKey,
    sort_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO paging_timeline (account_key, paging_key, status_key, sort_id)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (account_key, paging_key, status_key) DO NOTHING",
    )
    .bind(account_key.to_string())
    .bind(paging_key)
    .bind(status_key.to_string())
    .bind(sort_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_status_tx(tx: &mut Transaction<'_, Sqlite>, status: &StatusRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO status (status_key, account_key, platform_type, user_key, content)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (status_key, account_key) DO UPDATE SET
             platform_type = excluded.platform_type,
             user_key = excluded.user_key,
             content = excluded.content",
    )
    .bind(status.status_key.to_string())
    .bind(status.account_key.to_string())
    .bind(status.platform_type.as_str())
    .bind(status.user_key.as_ref().map(ToString::to_string))
    .bind(status.content.to_blob()?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_user_tx(tx: &mut Transaction<'_, Sqlite>, user: &UserRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO user (user_key, platform_type, name, handle, host, content)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_key) DO UPDATE SET
             platform_type = excluded.platform_type,
             name = excluded.name,
             handle = excluded.handle,
             host = excluded.host,
             content = excluded.content",
    )
    .bind(user.user_key.to_string())
    .bind(user.platform_type.as_str())
    .bind(&user.name)
    .bind(&user.handle)
    .bind(&user.host)
    .bind(user.content.to_blob()?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_lists_tx(
    tx: &mut Transaction<'_, Sqlite>,
    account_key: &AccountKey,
    paging_key: &str,
    lists: &[ListRow],
) -> Result<()> {
    for list in lists {
        sqlx::query(
            "INSERT INTO list (list_key, account_key, content) VALUES (?, ?, ?)
             ON CONFLICT (list_key, account_key) DO UPDATE SET content = excluded.content",
        )
        .bind(list.list_key.to_string())
        .bind(list.account_key.to_string())
        .bind(serde_json::to_string(&list.content)?)
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            "INSERT INTO list_paging (account_key, paging_key, list_key) VALUES (?, ?, ?)
             ON CONFLICT (account_key, paging_key, list_key) DO NOTHING",
        )
        .bind(account_key.to_string())
        .bind(paging_key)
        .bind(list.list_key.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn upsert_room_tx(tx: &mut Transaction<'_, Sqlite>, room: &MessageRoomRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO message_room (room_key, account_key, content) VALUES (?, ?, ?)
         ON CONFLICT (room_key, account_key) DO UPDATE SET content = excluded.content",
    )
    .bind(room.room_key.to_string())
    .bind(room.account_key.to_string())
    .bind(room.content.to_blob()?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_message_items(
    tx: &mut Transaction<'_, Sqlite>,
    account_key: &AccountKey,
    room_key: &MicroblogKey,
    items: &[(MicroblogKey, MessageContent)],
    start_sort_id: i64,
    existing: &HashSet<String>,
) -> Result<usize> {
    let mut seen = existing.clone();
    let mut sort_id = start_sort_id;
    let mut inserted = 0;
    for (message_key, content) in items {
        if !seen.insert(message_key.to_string()) {
            continue;
        }
        sqlx::query(
            "INSERT INTO message_item (message_key, room_key, account_key, sort_id, content)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (message_key, account_key) DO UPDATE SET content = excluded.content",
        )
        .bind(message_key.to_string())
        .bind(room_key.to_string())
        .bind(account_key.to_string())
        .bind(sort_id)
        .bind(content.to_blob()?)
        .execute(&mut **tx)
        .await?;
        sort_id += 1;
        inserted += 1;
    }
    Ok(inserted)
}

fn parse_key(raw: String) -> Result<MicroblogKey> {
    MicroblogKey::from_str(&raw)
        .map_err(|_| crate::error::EngineError::Protocol(format!("malformed key in cache: {raw}")))
}

fn parse_platform(raw: String) -> PlatformType {
    PlatformType::from_str(&raw).unwrap_or(PlatformType::Mastodon)
}

fn status_row_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StatusRow> {
    let user_key: Option<String> = row.get("user_key");
    Ok(StatusRow {
        status_key: parse_key(row.get("status_key"))?,
        account_key: parse_key(row.get("account_key"))?,
        platform_type: parse_platform(row.get("platform_type")),
        user_key: user_key.map(parse_key).transpose()?,
        content: StatusContent::from_blob(row.get("content")),
    })
}

fn user_row_from_row(row: sqlx::sqlite::SqliteRow) -> Result<UserRow> {
    Ok(UserRow {
        user_key: parse_key(row.get("user_key"))?,
        platform_type: parse_platform(row.get("platform_type")),
        name: row.get("name"),
        handle: row.get("handle"),
        host: row.get("host"),
        content: UserContent::from_blob(row.get("content")),
    })
}

fn list_row_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ListRow> {
    let content: String = row.get("content");
    Ok(ListRow {
        list_key: parse_key(row.get("list_key"))?,
        account_key: parse_key(row.get("account_key"))?,
        content: serde_json::from_str(&content)?,
    })
}

fn room_row_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MessageRoomRow> {
    Ok(MessageRoomRow {
        room_key: parse_key(row.get("room_key"))?,
        account_key: parse_key(row.get("account_key"))?,
        content: RoomContent::from_blob(row.get("content")),
    })
}

fn message_item_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MessageItemRow> {
    Ok(MessageItemRow {
        message_key: parse_key(row.get("message_key"))?,
        room_key: parse_key(row.get("room_key"))?,
        account_key: parse_key(row.get("account_key"))?,
        sort_id: row.get("sort_id"),
        content: MessageContent::from_blob(row.get("content")),
    })
}

fn timeline_item_from_row(row: sqlx::sqlite::SqliteRow) -> Result<TimelineItem> {
    let user_key: Option<String> = row.get("u_key");
    let user = match user_key {
        Some(key) => Some(UserRow {
            user_key: parse_key(key)?,
            platform_type: parse_platform(row.get("u_platform")),
            name: row.get("name"),
            handle: row.get("handle"),
            host: row.get("host"),
            content: UserContent::from_blob(row.get("u_content")),
        }),
        None => None,
    };
    let status_user_key: Option<String> = row.get("user_key");
    Ok(TimelineItem {
        sort_id: row.get("sort_id"),
        status: StatusRow {
            status_key: parse_key(row.get("status_key"))?,
            account_key: parse_key(row.get("account_key"))?,
            platform_type: parse_platform(row.get("platform_type")),
            user_key: status_user_key.map(parse_key).transpose()?,
            content: StatusContent::from_blob(row.get("content")),
        },
        user,
    })
}
