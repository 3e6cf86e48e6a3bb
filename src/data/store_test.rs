//! Cache store tests

use std::sync::Arc;

use futures::StreamExt;
use tempfile::TempDir;

use super::*;
use crate::model::{MicroblogKey, PlatformType};

fn account() -> MicroblogKey {
    MicroblogKey::new("me", "example.test")
}

fn entry(id: &str) -> CachedEntry {
    let status_key = MicroblogKey::new(id, "example.test");
    let user_key = MicroblogKey::new("author", "example.test");
    CachedEntry::new(
        StatusRow {
            status_key,
            account_key: account(),
            platform_type: PlatformType::Mastodon,
            user_key: Some(user_key.clone()),
            content: StatusContent::Unknown(serde_json::json!({ "id": id })),
        },
        Some(UserRow {
            user_key,
            platform_type: PlatformType::Mastodon,
            name: "Author".to_string(),
            handle: "author".to_string(),
            host: "example.test".to_string(),
            content: UserContent::Unknown(serde_json::Value::Null),
        }),
    )
}

fn entries(prefix: &str, n: usize) -> Vec<CachedEntry> {
    (0..n).map(|i| entry(&format!("{prefix}{i}"))).collect()
}

#[tokio::test]
async fn connects_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache.db");
    let store = CacheStore::connect(&db_path).await.unwrap();
    store
        .replace_page(&account(), "home", &entries("s", 3))
        .await
        .unwrap();
    assert_eq!(store.timeline_count(&account(), "home").await.unwrap(), 3);
}

#[tokio::test]
async fn refresh_then_append_yields_contiguous_sort_ids() {
    let store = CacheStore::connect_in_memory().await.unwrap();

    let inserted = store
        .replace_page(&account(), "home", &entries("a", 20))
        .await
        .unwrap();
    assert_eq!(inserted, 20);

    let inserted = store
        .append_page(&account(), "home", &entries("b", 20))
        .await
        .unwrap();
    assert_eq!(inserted, 20);

    let rows = store.paging_rows(&account(), "home").await.unwrap();
    assert_eq!(rows.len(), 40);
    let sort_ids: Vec<i64> = rows.iter().map(|row| row.sort_id).collect();
    assert_eq!(sort_ids, (0..40).collect::<Vec<i64>>());

    let mut keys: Vec<String> = rows.iter().map(|row| row.status_key.to_string()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 40, "no duplicate status keys");
}

#[tokio::test]
async fn duplicate_appends_introduce_no_gaps() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &entries("s", 5))
        .await
        .unwrap();

    // Overlapping page: s3, s4 again plus two new ones.
    let overlap = vec![entry("s3"), entry("s4"), entry("n0"), entry("n1")];
    let inserted = store.append_page(&account(), "home", &overlap).await.unwrap();
    assert_eq!(inserted, 2);

    let rows = store.paging_rows(&account(), "home").await.unwrap();
    let sort_ids: Vec<i64> = rows.iter().map(|row| row.sort_id).collect();
    assert_eq!(sort_ids, (0..7).collect::<Vec<i64>>());
}

#[tokio::test]
async fn refresh_clears_before_reinserting() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &entries("old", 10))
        .await
        .unwrap();
    store
        .replace_page(&account(), "home", &entries("new", 4))
        .await
        .unwrap();

    let rows = store.paging_rows(&account(), "home").await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows
        .iter()
        .all(|row| row.status_key.id.starts_with("new")));
    assert_eq!(rows[0].sort_id, 0);
}

#[tokio::test]
async fn prepend_sorts_above_existing_entries() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &entries("base", 3))
        .await
        .unwrap();
    store
        .prepend_page(&account(), "home", &[entry("newer1"), entry("newer0")])
        .await
        .unwrap();

    let rows = store.paging_rows(&account(), "home").await.unwrap();
    let order: Vec<&str> = rows.iter().map(|row| row.status_key.id.as_str()).collect();
    assert_eq!(order, vec!["newer1", "newer0", "base0", "base1", "base2"]);
    assert!(rows[0].sort_id < 0);
}

#[tokio::test]
async fn thread_orders_around_focal_post() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    let entries = vec![
        entry("anc0").with_sort_offset(-2),
        entry("anc1").with_sort_offset(-1),
        entry("focal").with_sort_offset(0),
        entry("r0").with_sort_offset(1),
        entry("r1").with_sort_offset(2),
        entry("r2").with_sort_offset(3),
    ];
    store
        .replace_thread(&account(), "detail", &entries)
        .await
        .unwrap();

    let rows = store.paging_rows(&account(), "detail").await.unwrap();
    let order: Vec<&str> = rows.iter().map(|row| row.status_key.id.as_str()).collect();
    assert_eq!(order, vec!["anc0", "anc1", "focal", "r0", "r1", "r2"]);
}

#[tokio::test]
async fn shared_status_survives_other_feeds_refresh() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &[entry("shared")])
        .await
        .unwrap();
    store
        .replace_page(&account(), "bookmarks", &[entry("shared")])
        .await
        .unwrap();

    store.replace_page(&account(), "home", &[]).await.unwrap();

    assert_eq!(store.timeline_count(&account(), "home").await.unwrap(), 0);
    assert_eq!(
        store.timeline_count(&account(), "bookmarks").await.unwrap(),
        1
    );
    // The status row itself is shared and still present.
    assert!(store
        .get_status(&MicroblogKey::new("shared", "example.test"), &account())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn delete_status_removes_every_feed_membership() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &[entry("gone"), entry("kept")])
        .await
        .unwrap();
    store
        .replace_page(&account(), "user_feed", &[entry("gone")])
        .await
        .unwrap();

    store
        .delete_status(&MicroblogKey::new("gone", "example.test"), &account())
        .await
        .unwrap();

    assert_eq!(store.timeline_count(&account(), "home").await.unwrap(), 1);
    assert_eq!(
        store.timeline_count(&account(), "user_feed").await.unwrap(),
        0
    );
    assert!(store
        .get_status(&MicroblogKey::new("gone", "example.test"), &account())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_status_returns_previous_content() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    store
        .replace_page(&account(), "home", &[entry("s")])
        .await
        .unwrap();
    let key = MicroblogKey::new("s", "example.test");

    let previous = store
        .update_status(&key, &account(), |_| {
            StatusContent::Unknown(serde_json::json!({ "updated": true }))
        })
        .await
        .unwrap()
        .expect("row exists");
    match previous {
        StatusContent::Unknown(value) => assert_eq!(value["id"], "s"),
        other => panic!("unexpected content: {other:?}"),
    }

    let row = store.get_status(&key, &account()).await.unwrap().unwrap();
    match row.content {
        StatusContent::Unknown(value) => assert_eq!(value["updated"], true),
        other => panic!("unexpected content: {other:?}"),
    }
}

#[tokio::test]
async fn update_missing_status_is_none() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    let result = store
        .update_status(
            &MicroblogKey::new("nope", "example.test"),
            &account(),
            |content| content,
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn user_upsert_is_last_write_wins() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    let key = MicroblogKey::new("u", "example.test");
    let mut user = UserRow {
        user_key: key.clone(),
        platform_type: PlatformType::Mastodon,
        name: "Before".to_string(),
        handle: "user".to_string(),
        host: "example.test".to_string(),
        content: UserContent::Unknown(serde_json::Value::Null),
    };
    store.upsert_user(&user).await.unwrap();
    user.name = "After".to_string();
    store.upsert_user(&user).await.unwrap();

    let row = store.get_user(&key).await.unwrap().unwrap();
    assert_eq!(row.name, "After");
}

#[tokio::test]
async fn observe_timeline_emits_snapshot_then_updates() {
    let store = Arc::new(CacheStore::connect_in_memory().await.unwrap());
    let mut stream =
        Box::pin(store.observe_timeline(account(), "home".to_string()));

    let initial = stream.next().await.unwrap();
    assert!(initial.is_empty());

    store
        .replace_page(&account(), "home", &entries("s", 2))
        .await
        .unwrap();
    let updated = stream.next().await.unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].status.status_key.id, "s0");
    assert!(updated[0].user.is_some());
}

#[tokio::test]
async fn list_pages_replace_and_append() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    let row = |id: &str| ListRow {
        list_key: MicroblogKey::new(id, "example.test"),
        account_key: account(),
        content: ListMetaData {
            id: id.to_string(),
            title: format!("List {id}"),
            description: None,
            avatar: None,
            member_count: Some(0),
        },
    };

    store
        .replace_list_page(&account(), "lists", &[row("l1"), row("l2")])
        .await
        .unwrap();
    store
        .append_list_page(&account(), "lists", &[row("l3")])
        .await
        .unwrap();

    let lists = store.lists_for_paging(&account(), "lists").await.unwrap();
    assert_eq!(lists.len(), 3);
    assert_eq!(lists[2].content.title, "List l3");

    store
        .delete_list(&MicroblogKey::new("l2", "example.test"), &account())
        .await
        .unwrap();
    let lists = store.lists_for_paging(&account(), "lists").await.unwrap();
    assert_eq!(lists.len(), 2);
}

#[tokio::test]
async fn room_items_follow_sort_id_invariant() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    let room_key = MicroblogKey::new("peer", "example.test");
    let item = |id: &str| {
        (
            MicroblogKey::new(id, "example.test"),
            MessageContent::Unknown(serde_json::json!({ "id": id })),
        )
    };

    store
        .replace_room_items(&account(), &room_key, &[item("m0"), item("m1")])
        .await
        .unwrap();
    store
        .append_room_items(&account(), &room_key, &[item("m1"), item("m2")])
        .await
        .unwrap();

    let items = store.room_items(&account(), &room_key).await.unwrap();
    assert_eq!(items.len(), 3);
    let sort_ids: Vec<i64> = items.iter().map(|item| item.sort_id).collect();
    assert_eq!(sort_ids, vec![0, 1, 2]);
}

#[tokio::test]
async fn settings_roundtrip() {
    let store = CacheStore::connect_in_memory().await.unwrap();
    assert!(store.get_setting("missing").await.unwrap().is_none());
    store.set_setting("seen", "abc").await.unwrap();
    store.set_setting("seen", "def").await.unwrap();
    assert_eq!(store.get_setting("seen").await.unwrap().unwrap(), "def");
}
