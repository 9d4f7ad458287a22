//! GET / PEEK / ATTEMPT semantics and object lifecycle.

use serde::{Deserialize, Serialize};
use tsodb_core::{
    AccessMode, AppId, CoreError, ManagedObject, ObjectId, ObjectRef, ObjectStore,
    TransactionState,
};

const APP: AppId = AppId::new(3);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Player {
    name: String,
    hp: i32,
    inventory: Vec<ObjectRef<Item>>,
}

impl ManagedObject for Player {
    const TYPE_TAG: &'static str = "test.Player";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    label: String,
}

impl ManagedObject for Item {
    const TYPE_TAG: &'static str = "test.Item";
}

fn player(name: &str) -> Player {
    Player {
        name: name.to_string(),
        hp: 100,
        inventory: Vec::new(),
    }
}

fn store_with_player() -> (ObjectStore, ObjectRef<Player>) {
    let store = ObjectStore::open_in_memory(APP);
    let mut txn = store.new_transaction(APP).unwrap();
    let p = txn.create(player("ayla")).unwrap();
    txn.commit().unwrap();
    (store, p)
}

#[test]
fn create_commit_then_get_round_trips() {
    let store = ObjectStore::open_in_memory(APP);

    let mut txn = store.new_transaction(APP).unwrap();
    let sword = txn.create(Item { label: "sword".into() }).unwrap();
    let mut hero = player("brin");
    hero.inventory.push(sword);
    let hero_ref = txn.create(hero.clone()).unwrap();
    assert_eq!(txn.create_count(), 2);
    txn.commit().unwrap();

    let mut txn = store.new_transaction(APP).unwrap();
    let loaded = txn.lookup(hero_ref, AccessMode::Get).unwrap();
    assert_eq!(loaded, hero);
    let item = txn.lookup(loaded.inventory[0], AccessMode::Get).unwrap();
    assert_eq!(item.label, "sword");
    assert_eq!(store.object_count().unwrap(), 2);
}

#[test]
fn created_object_is_invisible_before_commit() {
    let store = ObjectStore::open_in_memory(APP);
    let mut creator = store.new_transaction(APP).unwrap();
    let item = creator.create(Item { label: "gem".into() }).unwrap();

    // The creator sees its staged value.
    assert_eq!(creator.lookup(item, AccessMode::Get).unwrap().label, "gem");

    let mut other = store.new_transaction(APP).unwrap();
    let err = other.lookup(item, AccessMode::Peek).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn peek_never_sees_uncommitted_writes() {
    let (store, p) = store_with_player();

    let mut writer = store.new_transaction(APP).unwrap();
    writer.modify(p, |pl| pl.hp = 1).unwrap();

    let mut reader = store.new_transaction(APP).unwrap();
    assert_eq!(reader.lookup(p, AccessMode::Peek).unwrap().hp, 100);
    // Not even the writer's own PEEK sees its staged value.
    assert_eq!(writer.lookup(p, AccessMode::Peek).unwrap().hp, 100);
    assert_eq!(writer.lookup(p, AccessMode::Get).unwrap().hp, 1);

    // PEEK takes no lock and records no read.
    assert_eq!(reader.read_count(), 0);
    assert_eq!(reader.access_mode(p.id()), None);
    assert_eq!(store.lock_holder(p.id()), Some(writer.id()));

    writer.commit().unwrap();
    assert_eq!(reader.lookup(p, AccessMode::Peek).unwrap().hp, 1);
}

#[test]
fn peek_does_not_block_on_held_object() {
    let (store, p) = store_with_player();
    let mut younger_holder = store.new_transaction(APP).unwrap();
    let mut older_peeker = store.new_transaction(APP).unwrap();
    younger_holder.lookup(p, AccessMode::Get).unwrap();

    older_peeker.lookup(p, AccessMode::Peek).unwrap();
    // A PEEK never wounds.
    assert!(younger_holder.is_active());
}

#[test]
fn attempt_on_held_object_fails_immediately() {
    let (store, p) = store_with_player();

    let mut older = store.new_transaction(APP).unwrap();
    let mut younger = store.new_transaction(APP).unwrap();
    let other = {
        let mut txn = store.new_transaction(APP).unwrap();
        let item = txn.create(Item { label: "cup".into() }).unwrap();
        txn.commit().unwrap();
        item
    };

    younger.lookup(p, AccessMode::Get).unwrap();
    older.lookup(other, AccessMode::Get).unwrap();

    let err = older.lookup(p, AccessMode::Attempt).unwrap_err();
    assert!(matches!(err, CoreError::LockConflict { object } if object == p.id()));

    // The attempting transaction is abandoned and its locks are gone; the
    // holder is untouched, even though it is younger.
    assert_eq!(older.state(), TransactionState::Aborted);
    assert_eq!(store.lock_holder(other.id()), None);
    assert!(younger.is_active());
    assert_eq!(store.stats().lock_conflicts, 1);
}

#[test]
fn attempt_on_free_object_locks_it() {
    let (store, p) = store_with_player();
    let mut txn = store.new_transaction(APP).unwrap();
    let value = txn.lookup(p, AccessMode::Attempt).unwrap();
    assert_eq!(value.name, "ayla");
    assert_eq!(txn.access_mode(p.id()), Some(AccessMode::Attempt));
    assert_eq!(store.lock_holder(p.id()), Some(txn.id()));

    txn.update(p, Player { hp: 7, ..value }).unwrap();
    txn.commit().unwrap();
}

#[test]
fn destroy_then_lookup_is_not_found() {
    let store = ObjectStore::open_in_memory(APP);

    let mut t1 = store.new_transaction(APP).unwrap();
    let item = t1.create(Item { label: "torch".into() }).unwrap();
    t1.commit().unwrap();

    let mut t2 = store.new_transaction(APP).unwrap();
    t2.destroy(item).unwrap();
    assert_eq!(t2.delete_count(), 1);

    // Until commit, PEEK readers still see it.
    let mut peeker = store.new_transaction(APP).unwrap();
    assert_eq!(peeker.lookup(item, AccessMode::Peek).unwrap().label, "torch");
    // The destroyer does not.
    let err = t2.lookup(item, AccessMode::Get).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    t2.commit().unwrap();

    let mut t3 = store.new_transaction(APP).unwrap();
    let err = t3.lookup(item, AccessMode::Get).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { object } if object == item.id()));
    assert_eq!(store.object_count().unwrap(), 0);
}

#[test]
fn destroying_own_creation_leaves_nothing() {
    let store = ObjectStore::open_in_memory(APP);
    let mut txn = store.new_transaction(APP).unwrap();
    let item = txn.create(Item { label: "dust".into() }).unwrap();
    txn.destroy(item).unwrap();
    assert_eq!(txn.create_count(), 0);
    assert_eq!(txn.delete_count(), 0);
    txn.commit().unwrap();
    assert_eq!(store.object_count().unwrap(), 0);
}

#[test]
fn destroyed_creation_stays_destroyed() {
    let store = ObjectStore::open_in_memory(APP);
    let mut txn = store.new_transaction(APP).unwrap();
    let item = txn.create(Item { label: "ember".into() }).unwrap();
    txn.destroy(item).unwrap();

    let err = txn.update(item, Item { label: "relit".into() }).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    assert!(matches!(
        txn.modify(item, |i| i.label.push('!')),
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        txn.lookup(item, AccessMode::Get),
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(txn.write_count() + txn.create_count(), 0);
    txn.commit().unwrap();

    assert_eq!(store.object_count().unwrap(), 0);
    let mut check = store.new_transaction(APP).unwrap();
    assert!(matches!(
        check.lookup(item, AccessMode::Peek),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn destroyed_object_cannot_be_updated() {
    let (store, p) = store_with_player();
    let mut txn = store.new_transaction(APP).unwrap();
    txn.destroy(p).unwrap();
    assert!(matches!(
        txn.update(p, player("ghost")),
        Err(CoreError::NotFound { .. })
    ));
    txn.commit().unwrap();
    assert_eq!(store.object_count().unwrap(), 0);
}

#[test]
fn missing_object_stays_locked_until_transaction_ends() {
    let store = ObjectStore::open_in_memory(APP);
    let ghost: ObjectRef<Item> = ObjectRef::new(ObjectId::random());
    let mut txn = store.new_transaction(APP).unwrap();

    assert!(matches!(
        txn.lookup(ghost, AccessMode::Get),
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(store.lock_holder(ghost.id()), Some(txn.id()));
    assert_eq!(txn.read_count(), 1);

    txn.abort();
    assert_eq!(store.lock_holder(ghost.id()), None);
}

#[test]
fn missing_object_is_not_found_not_conflict() {
    let store = ObjectStore::open_in_memory(APP);
    let ghost: ObjectRef<Item> = ObjectRef::new(ObjectId::random());
    let mut txn = store.new_transaction(APP).unwrap();

    for mode in [AccessMode::Get, AccessMode::Peek, AccessMode::Attempt] {
        let err = txn.lookup(ghost, mode).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
    assert!(txn.is_active());
}

#[test]
fn wrong_type_is_type_mismatch() {
    let (store, p) = store_with_player();
    let as_item: ObjectRef<Item> = ObjectRef::new(p.id());
    let mut txn = store.new_transaction(APP).unwrap();
    let err = txn.lookup(as_item, AccessMode::Peek).unwrap_err();
    assert!(matches!(
        err,
        CoreError::TypeMismatch { ref expected, ref found, .. }
            if expected == "test.Item" && found == "test.Player"
    ));
    let err = txn.destroy(as_item).unwrap_err();
    assert!(matches!(err, CoreError::TypeMismatch { .. }));
}

#[test]
fn update_requires_a_lock() {
    let (store, p) = store_with_player();
    let mut txn = store.new_transaction(APP).unwrap();

    let peeked = txn.lookup(p, AccessMode::Peek).unwrap();
    let err = txn.update(p, peeked).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));

    let got = txn.lookup(p, AccessMode::Get).unwrap();
    txn.update(p, Player { hp: 50, ..got }).unwrap();
    assert_eq!(txn.write_count(), 1);
    txn.commit().unwrap();

    let mut check = store.new_transaction(APP).unwrap();
    assert_eq!(check.lookup(p, AccessMode::Peek).unwrap().hp, 50);
}

#[test]
fn modify_returns_closure_result() {
    let (store, p) = store_with_player();
    let mut txn = store.new_transaction(APP).unwrap();
    let old_hp = txn
        .modify(p, |pl| {
            let old = pl.hp;
            pl.hp -= 30;
            old
        })
        .unwrap();
    assert_eq!(old_hp, 100);
    assert_eq!(txn.lookup(p, AccessMode::Get).unwrap().hp, 70);
}

#[test]
fn references_survive_across_transactions() {
    let (store, p) = store_with_player();
    for expected in [100, 90, 80] {
        let mut txn = store.new_transaction(APP).unwrap();
        let hp = txn.modify(p, |pl| {
            let seen = pl.hp;
            pl.hp -= 10;
            seen
        });
        assert_eq!(hp.unwrap(), expected);
        txn.commit().unwrap();
    }
}
