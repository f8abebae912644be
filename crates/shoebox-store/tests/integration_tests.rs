//! Integration tests for shoebox-store
//!
//! These tests verify the full persistence cycle for photos, rule sets,
//! quota limits, watermarks and the audit log.

use shoebox_domain::{
    Action, AlbumId, AuditEvent, AuditSink, CasOutcome, LifecycleStore, OwnerId, Photo, PhotoId,
    Rule, RuleScope, RuleSet, StorageTier, TransitionRecord,
};
use shoebox_store::{SqliteStore, StoreError};

fn memory_store() -> SqliteStore {
    SqliteStore::new(":memory:").expect("in-memory store")
}

#[test]
fn test_store_initialization() {
    let store = SqliteStore::new(":memory:");
    assert!(store.is_ok(), "Store should initialize successfully");
}

#[test]
fn test_insert_and_get_photo() {
    let store = memory_store();
    let album = AlbumId::new();
    let photo = Photo::uploaded(OwnerId::new(), 4_000_000, 20_000, 1_700_000_000).in_albums([album]);

    store.insert_photo(&photo).unwrap();

    let loaded = store.get_photo(photo.id).unwrap().expect("photo should exist");
    assert_eq!(loaded, photo);
    assert!(loaded.album_ids.contains(&album));
}

#[test]
fn test_get_missing_photo() {
    let store = memory_store();
    assert!(store.get_photo(PhotoId::new()).unwrap().is_none());
}

#[test]
fn test_duplicate_photo_rejected() {
    let store = memory_store();
    let photo = Photo::uploaded(OwnerId::new(), 1, 1, 0);
    store.insert_photo(&photo).unwrap();

    match store.insert_photo(&photo) {
        Err(StoreError::Duplicate(_)) => {}
        other => panic!("Expected Duplicate, got {:?}", other),
    }
}

#[test]
fn test_compare_and_swap_applies_on_matching_version() {
    let store = memory_store();
    let photo = Photo::uploaded(OwnerId::new(), 100, 10, 0);
    store.insert_photo(&photo).unwrap();

    let mut next = photo.clone();
    next.storage_tier = StorageTier::Cold;
    next.frozen = true;
    next.version = 1;

    assert_eq!(store.compare_and_swap(&next, 0).unwrap(), CasOutcome::Applied);
    assert_eq!(store.get_photo(photo.id).unwrap().unwrap(), next);
}

#[test]
fn test_compare_and_swap_detects_stale_version() {
    let store = memory_store();
    let photo = Photo::uploaded(OwnerId::new(), 100, 10, 0);
    store.insert_photo(&photo).unwrap();

    let mut first = photo.clone();
    first.frozen = true;
    first.version = 1;
    assert_eq!(store.compare_and_swap(&first, 0).unwrap(), CasOutcome::Applied);

    // A second writer that also read version 0 loses
    let mut second = photo.clone();
    second.storage_tier = StorageTier::Cold;
    second.version = 1;
    assert_eq!(
        store.compare_and_swap(&second, 0).unwrap(),
        CasOutcome::VersionMismatch
    );

    let stored = store.get_photo(photo.id).unwrap().unwrap();
    assert!(stored.frozen);
    assert_eq!(stored.storage_tier, StorageTier::Standard);
}

#[test]
fn test_compare_and_swap_requires_version_bump() {
    let store = memory_store();
    let photo = Photo::uploaded(OwnerId::new(), 100, 10, 0);
    store.insert_photo(&photo).unwrap();

    assert!(matches!(
        store.compare_and_swap(&photo, 0),
        Err(StoreError::InvalidData(_))
    ));
}

#[test]
fn test_photos_for_owner_and_owners() {
    let store = memory_store();
    let (alice, bob) = (OwnerId::new(), OwnerId::new());
    let album = AlbumId::new();

    store.insert_photo(&Photo::uploaded(alice, 1, 1, 0).in_albums([album])).unwrap();
    store.insert_photo(&Photo::uploaded(alice, 2, 2, 0)).unwrap();
    store.insert_photo(&Photo::uploaded(bob, 3, 3, 0)).unwrap();

    let photos = store.photos_for_owner(alice).unwrap();
    assert_eq!(photos.len(), 2);
    assert_eq!(photos.iter().filter(|p| p.album_ids.contains(&album)).count(), 1);

    let mut owners = store.owners().unwrap();
    owners.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(owners, expected);
}

#[test]
fn test_rule_set_roundtrip_preserves_order() {
    let store = memory_store();
    let owner = OwnerId::new();
    let rule_set = RuleSet::new(
        owner,
        RuleScope::Album(AlbumId::new()),
        vec![
            Rule::new(30, Action::MoveToColdTier),
            Rule::new(90, Action::MoveToColdTier),
            Rule::new(365, Action::Delete),
        ],
    );

    store.insert_rule_set(&rule_set).unwrap();

    assert_eq!(store.get_rule_set(rule_set.id).unwrap(), Some(rule_set.clone()));
    assert_eq!(store.rule_sets_for_owner(owner).unwrap(), vec![rule_set]);
    assert!(store.rule_sets_for_owner(OwnerId::new()).unwrap().is_empty());
}

#[test]
fn test_update_rule_set() {
    let store = memory_store();
    let mut rule_set = RuleSet::new(
        OwnerId::new(),
        RuleScope::Global,
        vec![Rule::new(30, Action::MoveToColdTier)],
    );
    store.insert_rule_set(&rule_set).unwrap();

    rule_set.rules = vec![Rule::new(10, Action::Delete)];
    assert!(store.update_rule_set(&rule_set).unwrap());
    assert_eq!(store.get_rule_set(rule_set.id).unwrap(), Some(rule_set));

    let missing = RuleSet::new(OwnerId::new(), RuleScope::Global, vec![]);
    assert!(!store.update_rule_set(&missing).unwrap());
}

#[test]
fn test_store_keeps_invalid_rule_sets_verbatim() {
    // The store does not validate; the scheduler re-checks what it reads
    let store = memory_store();
    let rule_set = RuleSet::new(
        OwnerId::new(),
        RuleScope::Global,
        vec![Rule::new(180, Action::Delete), Rule::new(-1, Action::MoveToColdTier)],
    );
    store.insert_rule_set(&rule_set).unwrap();
    assert_eq!(store.get_rule_set(rule_set.id).unwrap(), Some(rule_set));
}

#[test]
fn test_quota_limits_and_watermarks() {
    let store = memory_store();
    let owner = OwnerId::new();

    assert_eq!(store.quota_limit(owner).unwrap(), None);
    store.set_quota_limit(owner, 5_000).unwrap();
    store.set_quota_limit(owner, 10_000).unwrap();
    assert_eq!(store.quota_limit(owner).unwrap(), Some(10_000));

    assert_eq!(store.last_run_at(owner).unwrap(), None);
    store.record_run(owner, 42).unwrap();
    store.record_run(owner, 43).unwrap();
    assert_eq!(store.last_run_at(owner).unwrap(), Some(43));
}

#[test]
fn test_audit_trail() {
    let store = memory_store();
    let photo_id = PhotoId::new();
    let events = vec![
        AuditEvent::Transition(TransitionRecord {
            photo_id,
            from_tier: StorageTier::Standard,
            to_tier: StorageTier::Cold,
            timestamp: 10,
            rule_id: Some(shoebox_domain::RuleId::new()),
        }),
        AuditEvent::FreezeChanged {
            photo_id,
            frozen: true,
            timestamp: 11,
        },
        AuditEvent::Failure {
            photo_id,
            kind: "collaborator_unavailable".to_string(),
            detail: "timed out".to_string(),
            timestamp: 12,
        },
    ];

    for event in &events {
        store.record(event);
    }
    store.record(&AuditEvent::FreezeChanged {
        photo_id: PhotoId::new(),
        frozen: false,
        timestamp: 13,
    });

    assert_eq!(store.audit_trail(photo_id).unwrap(), events);
}

#[test]
fn test_on_disk_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shoebox.db");
    let photo = Photo::uploaded(OwnerId::new(), 10, 1, 0);

    {
        let store = SqliteStore::new(&path).unwrap();
        store.insert_photo(&photo).unwrap();
    }

    let reopened = SqliteStore::new(&path).unwrap();
    assert_eq!(reopened.get_photo(photo.id).unwrap(), Some(photo));
}
