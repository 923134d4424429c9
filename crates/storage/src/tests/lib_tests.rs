use super::*;

use portal::PortalRegistry;
use shared::domain::{Portal, PortalKey, RoomId};
use uuid::Uuid;

async fn storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

fn group_row(chat_id: &str, mxid: Option<&str>) -> PortalRow {
    PortalRow {
        chat_id: chat_id.into(),
        receiver: String::new(),
        mxid: mxid.map(Into::into),
        name: None,
        encrypted: false,
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn health_check_reports_closed_pool_as_unavailable() {
    let storage = storage().await;
    storage.pool().close().await;

    let error = storage.health_check().await.expect_err("closed pool");
    assert!(matches!(error, PortalError::Unavailable(_)));
}

#[tokio::test]
async fn registry_operations_on_closed_pool_are_unavailable() {
    let storage = storage().await;
    storage.pool().close().await;
    let registry = PortalRegistry::new(storage);
    let portal = Portal::pending(PortalKey::group("g-1"), None);

    assert!(matches!(
        registry.create(&portal).await,
        Err(PortalError::Unavailable(_))
    ));
    assert!(matches!(
        registry.save(&portal).await,
        Err(PortalError::Unavailable(_))
    ));
    assert!(matches!(
        registry.find_by_chat(&portal.key).await,
        Err(PortalError::Unavailable(_))
    ));
    assert!(matches!(
        registry.all_with_room().await,
        Err(PortalError::Unavailable(_))
    ));
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("portals.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn insert_maps_primary_key_violation_to_conflict() {
    let storage = storage().await;
    let row = group_row("g-1", None);
    storage.insert(&row).await.expect("first insert");

    match storage.insert(&row).await {
        Err(PortalError::Conflict { chat_id, receiver }) => {
            assert_eq!(chat_id, "g-1");
            assert_eq!(receiver, "");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn update_reports_matched_rows() {
    let storage = storage().await;
    let mut row = group_row("g-1", None);
    storage.insert(&row).await.expect("insert");

    row.mxid = Some("!g:example.org".into());
    row.encrypted = true;
    assert_eq!(storage.update(&row).await.expect("update"), 1);
    assert_eq!(
        storage.update(&group_row("missing", None)).await.expect("update"),
        0
    );

    let stored = storage
        .select_by_key("g-1", "")
        .await
        .expect("select")
        .expect("row");
    assert_eq!(stored, row);
}

#[tokio::test]
async fn update_overwrites_encrypted_flag() {
    let storage = storage().await;
    let mut row = group_row("g-1", Some("!g:example.org"));
    row.encrypted = true;
    storage.insert(&row).await.expect("insert");

    row.encrypted = false;
    storage.update(&row).await.expect("update");

    let stored = storage
        .select_by_mxid("!g:example.org")
        .await
        .expect("select")
        .expect("row");
    assert!(!stored.encrypted);
}

#[tokio::test]
async fn private_selection_skips_group_rows_with_same_chat_id() {
    let storage = storage().await;
    storage.insert(&group_row("shared", None)).await.expect("group");
    storage
        .insert(&PortalRow {
            receiver: "alice".into(),
            ..group_row("shared", None)
        })
        .await
        .expect("private");

    let rows = storage
        .select_private_by_chat_id("shared")
        .await
        .expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].receiver, "alice");
}

#[tokio::test]
async fn registry_round_trips_portals_through_sqlite() {
    let registry = PortalRegistry::new(storage().await);
    let recipient = Uuid::new_v4();
    let portal = Portal {
        key: PortalKey::private(recipient, "alice").expect("key"),
        mxid: Some(RoomId::from("!dm:example.org")),
        name: Some("Bob".into()),
        encrypted: true,
    };
    registry.create(&portal).await.expect("create");

    let by_chat = registry
        .find_by_chat(&portal.key)
        .await
        .expect("find")
        .expect("portal");
    assert_eq!(by_chat, portal);

    let by_room = registry
        .find_by_room(&RoomId::from("!dm:example.org"))
        .await
        .expect("find")
        .expect("portal");
    assert_eq!(by_room, portal);
}

#[tokio::test]
async fn registry_rejects_corrupt_private_row() {
    let storage = storage().await;
    storage
        .insert(&PortalRow {
            receiver: "alice".into(),
            ..group_row("not-a-uuid", Some("!bad:example.org"))
        })
        .await
        .expect("raw insert");

    let registry = PortalRegistry::new(storage);
    let error = registry
        .find_by_room(&RoomId::from("!bad:example.org"))
        .await
        .expect_err("corrupt row");
    assert!(matches!(error, PortalError::InvalidRecord(_)));
}

#[test]
fn memory_url_has_no_sqlite_path() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/portals.db?mode=rwc"),
        Some(PathBuf::from("./data/portals.db"))
    );
}
