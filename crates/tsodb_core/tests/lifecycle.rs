//! Commit, abort and store-level behavior.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tsodb_core::{
    AccessMode, AppId, CoreError, ManagedObject, ObjectId, ObjectRef, ObjectStore, StoreConfig,
    TransactionState,
};
use tsodb_storage::{BackingStore, FileBackend, InMemoryBackend};
use tsodb_testkit::FaultyBackend;

const APP: AppId = AppId::new(11);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Room {
    title: String,
    visitors: u32,
}

impl ManagedObject for Room {
    const TYPE_TAG: &'static str = "test.Room";
}

fn room(title: &str) -> Room {
    Room {
        title: title.to_string(),
        visitors: 0,
    }
}

#[test]
fn abort_twice_is_abort_once() {
    let store = ObjectStore::open_in_memory(APP);
    let mut setup = store.new_transaction(APP).unwrap();
    let r = setup.create(room("hall")).unwrap();
    setup.commit().unwrap();

    let mut txn = store.new_transaction(APP).unwrap();
    txn.modify(r, |room| room.visitors = 9).unwrap();
    txn.abort();
    txn.abort();

    assert_eq!(txn.state(), TransactionState::Aborted);
    assert_eq!(store.lock_holder(r.id()), None);
    assert_eq!(store.active_count(), 0);
    assert_eq!(store.stats().transactions_aborted, 1);

    let err = txn.commit().unwrap_err();
    assert!(matches!(
        err,
        CoreError::TransactionClosed {
            state: TransactionState::Aborted,
            ..
        }
    ));

    let mut check = store.new_transaction(APP).unwrap();
    assert_eq!(check.lookup(r, AccessMode::Peek).unwrap().visitors, 0);
}

#[test]
fn abort_after_interrupt_is_noop() {
    let store = ObjectStore::open_in_memory(APP);
    let mut txn = store.new_transaction(APP).unwrap();
    assert!(store.interrupt(txn.id()));
    txn.abort();
    assert_eq!(txn.state(), TransactionState::Interrupted);
    assert_eq!(store.stats().transactions_aborted, 0);
    assert_eq!(store.active_count(), 0);
}

#[test]
fn operations_after_commit_are_rejected() {
    let store = ObjectStore::open_in_memory(APP);
    let mut txn = store.new_transaction(APP).unwrap();
    txn.commit().unwrap();
    let err = txn.create(room("late")).unwrap_err();
    assert!(matches!(err, CoreError::TransactionClosed { .. }));
    txn.abort();
    assert_eq!(txn.state(), TransactionState::Committed);
}

#[test]
fn dropped_transaction_releases_locks() {
    let store = ObjectStore::open_in_memory(APP);
    let r = store
        .transaction(|txn| txn.create(room("cellar")))
        .unwrap();

    {
        let mut txn = store.new_transaction(APP).unwrap();
        txn.lookup(r, AccessMode::Get).unwrap();
        assert!(store.lock_holder(r.id()).is_some());
    }

    assert_eq!(store.lock_holder(r.id()), None);
    assert_eq!(store.active_count(), 0);
}

#[test]
fn clear_all_invalidates_in_flight_transactions() {
    let store = ObjectStore::open_in_memory(APP);
    let r = store.transaction(|txn| txn.create(room("attic"))).unwrap();

    let mut before = store.new_transaction(APP).unwrap();
    before.modify(r, |room| room.visitors += 1).unwrap();

    assert_eq!(store.clear_all().unwrap(), 1);
    assert_eq!(store.object_count().unwrap(), 0);

    let err = before.commit().unwrap_err();
    assert!(matches!(err, CoreError::CommitConflict { .. }));
    assert!(err.is_retryable());
    assert_eq!(before.state(), TransactionState::Aborted);
    assert_eq!(store.object_count().unwrap(), 0);

    // A fresh transaction works against the empty store.
    let mut after = store.new_transaction(APP).unwrap();
    assert!(matches!(
        after.lookup(r, AccessMode::Get),
        Err(CoreError::NotFound { .. })
    ));
    after.create(room("new attic")).unwrap();
    after.commit().unwrap();
    assert_eq!(store.stats().commit_conflicts, 1);
}

#[test]
fn named_objects_are_unique() {
    let store = ObjectStore::open_in_memory(APP);

    let mut t1 = store.new_transaction(APP).unwrap();
    let lobby = t1.create_named("lobby", room("Lobby")).unwrap();
    assert!(matches!(
        t1.create_named("lobby", room("Other")),
        Err(CoreError::NameAlreadyBound { .. })
    ));
    assert_eq!(t1.find::<Room>("lobby").unwrap(), Some(lobby));
    t1.commit().unwrap();

    let mut t2 = store.new_transaction(APP).unwrap();
    let found = t2.find::<Room>("lobby").unwrap().unwrap();
    assert_eq!(found, lobby);
    assert_eq!(t2.lookup(found, AccessMode::Get).unwrap().title, "Lobby");
    assert!(matches!(
        t2.create_named("lobby", room("Again")),
        Err(CoreError::NameAlreadyBound { .. })
    ));
    assert_eq!(t2.find::<Room>("nowhere").unwrap(), None);

    // Destroy and rebind within one transaction.
    t2.destroy(found).unwrap();
    assert_eq!(t2.find::<Room>("lobby").unwrap(), None);
    t2.create_named("lobby", room("Rebuilt")).unwrap();
    t2.commit().unwrap();

    let mut t3 = store.new_transaction(APP).unwrap();
    assert_eq!(t3.lookup(lobby, AccessMode::Peek).unwrap().title, "Rebuilt");
    assert_eq!(store.object_count().unwrap(), 1);
}

#[test]
fn deferred_actions_run_only_after_commit() {
    let store = ObjectStore::open_in_memory(APP);
    let sent = Arc::new(AtomicUsize::new(0));

    let mut aborted = store.new_transaction(APP).unwrap();
    let counter = Arc::clone(&sent);
    aborted
        .defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    aborted.abort();
    assert_eq!(sent.load(Ordering::SeqCst), 0);

    let mut committed = store.new_transaction(APP).unwrap();
    let r = committed.create(room("plaza")).unwrap();
    let counter = Arc::clone(&sent);
    let observer = store.clone();
    committed
        .defer(move || {
            // Locks are released before deferred actions run.
            assert_eq!(observer.lock_holder(r.id()), None);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    committed.commit().unwrap();
    assert_eq!(sent.load(Ordering::SeqCst), 1);
}

#[test]
fn store_failure_halts_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let store = ObjectStore::open(APP, backend.clone(), StoreConfig::default());

    let r = store.transaction(|txn| txn.create(room("vault"))).unwrap();

    backend.set_failing(true);
    let mut txn = store.new_transaction(APP).unwrap();
    txn.modify(r, |room| room.visitors = 1).unwrap();
    let err = txn.commit().unwrap_err();

    assert!(matches!(err, CoreError::StoreFailure(_)));
    assert!(err.is_fatal());
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert_eq!(store.lock_holder(r.id()), None);
    assert!(store.is_halted());
    assert!(matches!(
        store.new_transaction(APP),
        Err(CoreError::StoreHalted)
    ));
    assert_eq!(store.stats().store_failures, 1);
}

#[test]
fn store_failure_without_halt_keeps_serving() {
    let backend = Arc::new(FaultyBackend::new());
    let config = StoreConfig::default().halt_on_store_failure(false);
    let store = ObjectStore::open(APP, backend.clone(), config);

    backend.set_failing(true);
    let result = store.transaction(|txn| txn.create(room("tmp")));
    assert!(matches!(result, Err(CoreError::StoreFailure(_))));

    backend.set_failing(false);
    assert!(!store.is_halted());
    store.transaction(|txn| txn.create(room("tmp"))).unwrap();
    assert_eq!(store.object_count().unwrap(), 1);
}

#[test]
fn read_failure_halts_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let store = ObjectStore::open(APP, backend.clone(), StoreConfig::default());
    let r = store.transaction(|txn| txn.create(room("well"))).unwrap();

    let mut txn = store.new_transaction(APP).unwrap();
    backend.set_failing_reads(true);
    let err = txn.lookup(r, AccessMode::Get).unwrap_err();
    assert!(matches!(err, CoreError::StoreFailure(_)));
    assert!(err.is_fatal());
    assert!(store.is_halted());
    assert_eq!(store.stats().store_failures, 1);

    // Reads stay refused once halted, even with a healthy backend again.
    backend.set_failing_reads(false);
    assert!(matches!(
        txn.lookup(r, AccessMode::Peek),
        Err(CoreError::StoreHalted)
    ));
    assert!(matches!(txn.commit(), Err(CoreError::StoreHalted)));
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(matches!(
        store.new_transaction(APP),
        Err(CoreError::StoreHalted)
    ));
    assert_eq!(backend.failed_reads(), 1);
}

#[test]
fn read_failure_during_commit_validation_halts_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let store = ObjectStore::open(APP, backend.clone(), StoreConfig::default());
    let r = store.transaction(|txn| txn.create(room("forge"))).unwrap();

    let mut txn = store.new_transaction(APP).unwrap();
    txn.modify(r, |room| room.visitors = 2).unwrap();
    backend.set_failing_reads(true);
    let err = txn.commit().unwrap_err();

    assert!(matches!(err, CoreError::StoreFailure(_)));
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(store.is_halted());
    assert_eq!(backend.failed_writes(), 0);
}

#[test]
fn corrupted_record_halts_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let store = ObjectStore::open(APP, backend.clone(), StoreConfig::default());
    let damaged: ObjectRef<Room> = ObjectRef::new(ObjectId::random());
    backend.put_raw(APP.as_u64(), *damaged.id().as_bytes(), vec![0xFF, 0x00]);

    let mut txn = store.new_transaction(APP).unwrap();
    let err = txn.lookup(damaged, AccessMode::Peek).unwrap_err();
    assert!(matches!(err, CoreError::Corrupted { .. }));
    assert!(err.is_fatal());
    assert!(store.is_halted());
    assert_eq!(store.stats().store_failures, 1);
}

#[test]
fn failed_clear_halts_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let store = ObjectStore::open(APP, backend.clone(), StoreConfig::default());
    store.transaction(|txn| txn.create(room("loft"))).unwrap();

    backend.set_failing(true);
    assert!(matches!(store.clear_all(), Err(CoreError::StoreFailure(_))));
    assert!(store.is_halted());
    backend.set_failing(false);
    assert!(matches!(store.clear_all(), Err(CoreError::StoreHalted)));
}

#[test]
fn applications_sharing_a_backend_are_isolated() {
    let backend: Arc<dyn BackingStore> = Arc::new(InMemoryBackend::new());
    let app_a = ObjectStore::open(AppId::new(1), Arc::clone(&backend), StoreConfig::default());
    let app_b = ObjectStore::open(AppId::new(2), Arc::clone(&backend), StoreConfig::default());

    let r = app_a.transaction(|txn| txn.create(room("a"))).unwrap();
    app_b.transaction(|txn| txn.create(room("b"))).unwrap();

    let mut txn = app_b.new_transaction(AppId::new(2)).unwrap();
    assert!(matches!(
        txn.lookup(r, AccessMode::Peek),
        Err(CoreError::NotFound { .. })
    ));

    app_a.clear_all().unwrap();
    assert_eq!(app_a.object_count().unwrap(), 0);
    assert_eq!(app_b.object_count().unwrap(), 1);
}

#[test]
fn committed_objects_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("world.tsodb");

    let (kept, dropped): (ObjectRef<Room>, ObjectRef<Room>) = {
        let backend = Arc::new(FileBackend::open(&path).unwrap());
        let store = ObjectStore::open(APP, backend, StoreConfig::default());
        let kept = store.transaction(|txn| txn.create(room("keep"))).unwrap();
        let dropped = store.transaction(|txn| txn.create(room("drop"))).unwrap();
        store.transaction(|txn| txn.destroy(dropped)).unwrap();
        store
            .transaction(|txn| txn.modify(kept, |room| room.visitors = 3))
            .unwrap();

        let mut uncommitted = store.new_transaction(APP).unwrap();
        uncommitted.modify(kept, |room| room.visitors = 1000).unwrap();
        uncommitted.abort();
        (kept, dropped)
    };

    let backend = Arc::new(FileBackend::open(&path).unwrap());
    let store = ObjectStore::open(APP, backend, StoreConfig::default());
    let mut txn = store.new_transaction(APP).unwrap();
    let loaded = txn.lookup(kept, AccessMode::Get).unwrap();
    assert_eq!(loaded, Room { title: "keep".into(), visitors: 3 });
    assert!(matches!(
        txn.lookup(dropped, AccessMode::Get),
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(store.object_ids().unwrap(), vec![kept.id()]);
    // Sequence numbers restart with each open.
    assert_eq!(store.committed_seq().as_u64(), 0);
}
