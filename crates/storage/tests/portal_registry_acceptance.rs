use portal::PortalRegistry;
use shared::domain::{Portal, PortalKey, RoomId};
use storage::Storage;
use uuid::Uuid;

async fn registry() -> PortalRegistry<Storage> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    PortalRegistry::new(storage)
}

#[tokio::test]
async fn group_portal_lifecycle_acceptance() {
    let registry = registry().await;
    let key = PortalKey::group("g-uuid-1");
    let mut portal = Portal::pending(key.clone(), None);
    registry.create(&portal).await.expect("create group portal");

    let found = registry
        .find_by_chat(&key)
        .await
        .expect("find")
        .expect("group portal exists");
    assert_eq!(found, portal);

    portal.name = Some("Team Chat".into());
    registry.save(&portal).await.expect("rename");

    let renamed = registry
        .find_by_chat(&key)
        .await
        .expect("find")
        .expect("group portal exists");
    assert_eq!(renamed.name.as_deref(), Some("Team Chat"));

    let error = registry
        .create(&Portal::pending(key.clone(), None))
        .await
        .expect_err("duplicate create");
    assert!(error.is_conflict());
}

#[tokio::test]
async fn private_portal_fan_out_acceptance() {
    let registry = registry().await;
    let bob = Uuid::new_v4();
    let with_alice = Portal::pending(PortalKey::private(bob, "alice").expect("key"), None);
    let with_carol = Portal::pending(PortalKey::private(bob, "carol").expect("key"), None);
    registry.create(&with_alice).await.expect("alice portal");
    registry.create(&with_carol).await.expect("carol portal");
    registry
        .create(&Portal::pending(PortalKey::group("g-uuid-1"), None))
        .await
        .expect("group portal");

    let mut with_bob = registry
        .find_private_chats_with(bob)
        .await
        .expect("private chats with bob");
    with_bob.sort_by(|a, b| a.key.receiver().cmp(b.key.receiver()));
    assert_eq!(with_bob, vec![with_alice.clone(), with_carol]);

    let of_alice = registry
        .find_private_chats_of("alice")
        .await
        .expect("private chats of alice");
    assert_eq!(of_alice, vec![with_alice]);
}

#[tokio::test]
async fn startup_reconciliation_sees_only_bridged_rooms() {
    let registry = registry().await;
    let mut bridged = registry
        .resolve(&PortalKey::group("bridged"), Some("Bridged".into()))
        .await
        .expect("resolve bridged");
    registry
        .resolve(&PortalKey::group("pending"), None)
        .await
        .expect("resolve pending");

    bridged.mxid = Some(RoomId::from("!bridged:example.org"));
    bridged.encrypted = true;
    registry.save(&bridged).await.expect("attach room");

    let rooms = registry.all_with_room().await.expect("all with room");
    assert_eq!(rooms, vec![bridged]);
}

#[tokio::test]
async fn save_without_create_leaves_table_untouched() {
    let registry = registry().await;
    let ghost = Portal {
        key: PortalKey::group("ghost"),
        mxid: Some(RoomId::from("!ghost:example.org")),
        name: Some("Ghost".into()),
        encrypted: true,
    };
    registry.save(&ghost).await.expect("save is a no-op");

    assert!(registry
        .find_by_chat(&ghost.key)
        .await
        .expect("find")
        .is_none());
    assert!(registry.all_with_room().await.expect("all").is_empty());
}
