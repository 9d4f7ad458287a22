//! The transaction API used by task code.

use crate::error::{CoreError, CoreResult};
use crate::lock::LockMode;
use crate::object::{ManagedObject, ObjectId, ObjectRecord, ObjectRef};
use crate::store::StoreInner;
use crate::transaction::state::{Staged, StagedObject, WorkingSet};
use crate::transaction::{AccessMode, TransactionState, TxnHandle};
use crate::types::{SequenceNumber, Timestamp, TransactionId};
use std::sync::Arc;

type DeferredAction = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work over persistent objects.
///
/// A transaction is created by [`ObjectStore::new_transaction`] for one
/// execution attempt of a task and is never reused. It locks every object it
/// looks up with GET or ATTEMPT, stages its changes privately, and applies
/// them all at once on [`commit`](Self::commit).
///
/// A transaction may be wounded at any time by an older one. From then on
/// every operation fails with [`CoreError::Interrupted`] and the task should
/// be rerun on a fresh transaction.
///
/// Dropping an unfinished transaction aborts it.
///
/// [`ObjectStore::new_transaction`]: crate::ObjectStore::new_transaction
pub struct Transaction {
    handle: Arc<TxnHandle>,
    store: Arc<StoreInner>,
    epoch: u64,
    set: WorkingSet,
    deferred: Vec<DeferredAction>,
    /// Locks released and registry entry removed.
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(handle: Arc<TxnHandle>, store: Arc<StoreInner>, epoch: u64) -> Self {
        Self {
            handle,
            store,
            epoch,
            set: WorkingSet::default(),
            deferred: Vec::new(),
            finished: false,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.handle.id()
    }

    /// Returns the ordering timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.handle.timestamp()
    }

    /// Returns the current state. May change under a running task when an
    /// older transaction wounds this one.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.handle.state()
    }

    /// Checks if the transaction can still perform operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Returns the mode `id` was first locked with, if this transaction
    /// looked it up with GET or ATTEMPT.
    #[must_use]
    pub fn access_mode(&self, id: ObjectId) -> Option<AccessMode> {
        self.set.access_mode(id)
    }

    /// Number of objects in the read set.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.set.read_count()
    }

    /// Number of staged updates to existing objects.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.set.write_count()
    }

    /// Number of staged new objects.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.set.create_count()
    }

    /// Number of staged deletions.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.set.delete_count()
    }

    /// Resolves `reference` with the given access mode.
    ///
    /// - [`AccessMode::Get`] locks the object, waiting for an older holder or
    ///   wounding a younger one.
    /// - [`AccessMode::Peek`] returns the last committed value without
    ///   locking. It never sees uncommitted changes, including this
    ///   transaction's own.
    /// - [`AccessMode::Attempt`] locks the object only if it is free. If it
    ///   is held, this transaction is aborted and `LockConflict` returned.
    ///
    /// With GET and ATTEMPT, an object this transaction created or updated
    /// resolves to the staged value, and one it destroyed is `NotFound`.
    ///
    /// GET and ATTEMPT keep the lock even when the object turns out not to
    /// exist, until the transaction ends. The absence is part of the read
    /// set, so no other transaction can create that ID (a named object, for
    /// instance) underneath this one.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the object does not exist
    /// - `TypeMismatch` if the object is not a `T`
    /// - `LockConflict` for ATTEMPT on a held object
    /// - `Interrupted` if this transaction was wounded
    /// - `StoreFailure` or `Corrupted` if the backing store cannot produce
    ///   the record; the store halts
    pub fn lookup<T: ManagedObject>(
        &mut self,
        reference: ObjectRef<T>,
        mode: AccessMode,
    ) -> CoreResult<T> {
        self.ensure_active()?;
        let id = reference.id();

        if mode == AccessMode::Peek {
            let record = self
                .store
                .read_record(id)?
                .ok_or_else(|| CoreError::not_found(id))?;
            return decode::<T>(id, &record.type_tag, &record.payload);
        }

        self.acquire(id, mode)?;
        match self.set.staged(id) {
            Some(Staged::Value(staged)) => decode::<T>(id, staged.type_tag, &staged.payload),
            Some(Staged::Deleted) => Err(CoreError::not_found(id)),
            None => {
                let record = self.read_committed(id)?.ok_or_else(|| CoreError::not_found(id))?;
                decode::<T>(id, &record.type_tag, &record.payload)
            }
        }
    }

    /// Stages a new value for an object this transaction holds.
    ///
    /// The object must have been locked with GET or ATTEMPT, or created by
    /// this transaction.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the object is not held
    /// - `NotFound` if the object does not exist or was destroyed
    /// - `Codec` if `value` cannot be encoded
    pub fn update<T: ManagedObject>(&mut self, reference: ObjectRef<T>, value: T) -> CoreResult<()> {
        self.ensure_active()?;
        let id = reference.id();
        if !self.set.holds(id) {
            return Err(CoreError::invalid_operation(format!(
                "object {id} must be locked before it is updated"
            )));
        }
        match self.set.staged(id) {
            Some(Staged::Deleted) => return Err(CoreError::not_found(id)),
            Some(Staged::Value(_)) => {}
            None => {
                // Held but nothing staged: either a committed object or one
                // this transaction created and then destroyed.
                let exists = match self.set.observed(id) {
                    Some(version) => version.is_some(),
                    None => self.read_committed(id)?.is_some(),
                };
                if !exists {
                    return Err(CoreError::not_found(id));
                }
            }
        }
        let staged = stage::<T>(&value)?;
        self.set.stage_write(id, staged);
        Ok(())
    }

    /// Locks `reference` with GET, applies `f` to its value and stages the
    /// result. Returns whatever `f` returns.
    ///
    /// # Errors
    ///
    /// Fails like [`lookup`](Self::lookup) and [`update`](Self::update).
    pub fn modify<T, R, F>(&mut self, reference: ObjectRef<T>, f: F) -> CoreResult<R>
    where
        T: ManagedObject,
        F: FnOnce(&mut T) -> R,
    {
        let mut value = self.lookup(reference, AccessMode::Get)?;
        let out = f(&mut value);
        self.update(reference, value)?;
        Ok(out)
    }

    /// Creates a new persistent object.
    ///
    /// The object is locked by this transaction and invisible to every other
    /// transaction until commit.
    ///
    /// # Errors
    ///
    /// - `Codec` if `value` cannot be encoded
    /// - `Interrupted` if this transaction was wounded
    pub fn create<T: ManagedObject>(&mut self, value: T) -> CoreResult<ObjectRef<T>> {
        self.ensure_active()?;
        let staged = stage::<T>(&value)?;
        let id = ObjectId::random();
        self.acquire(id, AccessMode::Get)?;
        self.set.stage_create(id, staged);
        Ok(ObjectRef::new(id))
    }

    /// Creates a new persistent object bound to `name`.
    ///
    /// Two transactions creating the same name contend on the same lock;
    /// only one of them can commit the binding.
    ///
    /// # Errors
    ///
    /// - `NameAlreadyBound` if an object with this name exists
    /// - `Codec` if `value` cannot be encoded
    pub fn create_named<T: ManagedObject>(&mut self, name: &str, value: T) -> CoreResult<ObjectRef<T>> {
        self.ensure_active()?;
        let staged = stage::<T>(&value)?;
        let id = ObjectId::for_name(name);
        self.acquire(id, AccessMode::Get)?;

        match self.set.staged(id) {
            Some(Staged::Value(_)) => {
                return Err(CoreError::NameAlreadyBound {
                    name: name.to_string(),
                });
            }
            // Destroyed earlier in this transaction: rebind over it.
            Some(Staged::Deleted) => self.set.stage_write(id, staged),
            None => {
                if self.read_committed(id)?.is_some() {
                    return Err(CoreError::NameAlreadyBound {
                        name: name.to_string(),
                    });
                }
                self.set.stage_create(id, staged);
            }
        }
        Ok(ObjectRef::new(id))
    }

    /// Finds the object bound to `name` without locking it.
    ///
    /// Sees this transaction's own staged binding changes. Resolve the
    /// returned reference with [`lookup`](Self::lookup) to read it.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if the bound object is not a `T`
    pub fn find<T: ManagedObject>(&mut self, name: &str) -> CoreResult<Option<ObjectRef<T>>> {
        self.ensure_active()?;
        let id = ObjectId::for_name(name);
        let tag = match self.set.staged(id) {
            Some(Staged::Value(staged)) => Some(staged.type_tag.to_string()),
            Some(Staged::Deleted) => None,
            None => self.store.read_record(id)?.map(|record| record.type_tag),
        };
        match tag {
            Some(tag) if tag != T::TYPE_TAG => Err(type_mismatch::<T>(id, &tag)),
            Some(_) => Ok(Some(ObjectRef::new(id))),
            None => Ok(None),
        }
    }

    /// Destroys a persistent object.
    ///
    /// Takes the exclusive lock like GET. Until commit, other transactions
    /// still find the object with PEEK. Destroying an object created by this
    /// transaction simply forgets it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the object does not exist or was already destroyed
    /// - `TypeMismatch` if the object is not a `T`
    pub fn destroy<T: ManagedObject>(&mut self, reference: ObjectRef<T>) -> CoreResult<()> {
        self.ensure_active()?;
        let id = reference.id();
        self.acquire(id, AccessMode::Get)?;

        let tag = match self.set.staged(id) {
            Some(Staged::Deleted) => return Err(CoreError::not_found(id)),
            Some(Staged::Value(staged)) => staged.type_tag.to_string(),
            None => {
                self.read_committed(id)?
                    .ok_or_else(|| CoreError::not_found(id))?
                    .type_tag
            }
        };
        if tag != T::TYPE_TAG {
            return Err(type_mismatch::<T>(id, &tag));
        }

        self.set.stage_delete(id);
        Ok(())
    }

    /// Queues `action` to run after this transaction commits.
    ///
    /// Actions run in the order they were deferred, on the committing thread,
    /// after all locks are released. They are dropped unrun if the
    /// transaction does not commit.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` or `TransactionClosed` if the transaction is not
    /// active.
    pub fn defer<F>(&mut self, action: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_active()?;
        self.deferred.push(Box::new(action));
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// Validates that nothing this transaction read has changed and that
    /// the store was not cleared since it began, then applies every staged
    /// create, update and delete in one atomic batch. Locks are released,
    /// and deferred actions run, only after the batch is applied.
    ///
    /// Returns the sequence number of the commit.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if this transaction was wounded
    /// - `CommitConflict` if validation failed; nothing was applied
    /// - `StoreFailure` if the backing store failed; nothing was applied
    /// - `TransactionClosed` if the transaction already finished
    ///
    /// On every error the transaction ends up aborted or interrupted.
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        if let Err(state) = self.handle.begin_commit() {
            return Err(self.closed_error(state));
        }

        match self.store.commit_changes(self.id(), self.epoch, &self.set) {
            Ok(seq) => {
                let written = self.set.write_count() + self.set.create_count();
                let deleted = self.set.delete_count();
                self.store.locks.release_all(self.id());
                self.handle.mark_committed();
                self.store.unregister(self.id());
                self.store.stats.record_commit(written, deleted);
                self.set.clear();
                self.finished = true;
                tracing::debug!(txn = %self.id(), %seq, written, deleted, "transaction committed");

                for action in self.deferred.drain(..) {
                    action();
                }
                Ok(seq)
            }
            Err(e) => {
                if matches!(e, CoreError::CommitConflict { .. }) {
                    self.store.stats.record_commit_conflict();
                    tracing::debug!(txn = %self.id(), error = %e, "commit rejected");
                }
                self.abort();
                Err(e)
            }
        }
    }

    /// Aborts the transaction, discarding every staged change and releasing
    /// all locks.
    ///
    /// Aborting an aborted, interrupted or committed transaction does
    /// nothing.
    pub fn abort(&mut self) {
        if self.handle.mark_aborted() {
            self.store.stats.record_abort();
            tracing::debug!(txn = %self.id(), "transaction aborted");
        }
        self.finish();
    }

    /// Releases locks and unregisters. Runs once per transaction.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.store.locks.release_all(self.id());
        self.store.unregister(self.id());
        self.set.clear();
        self.deferred.clear();
    }

    fn ensure_active(&mut self) -> CoreResult<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            other => Err(self.closed_error(other)),
        }
    }

    fn closed_error(&mut self, state: TransactionState) -> CoreError {
        if state == TransactionState::Interrupted {
            self.finish();
            CoreError::interrupted(self.id())
        } else {
            CoreError::TransactionClosed {
                txn: self.id(),
                state,
            }
        }
    }

    /// Locks `id`. An ATTEMPT conflict abandons the transaction.
    fn acquire(&mut self, id: ObjectId, mode: AccessMode) -> CoreResult<()> {
        let lock_mode = match mode {
            AccessMode::Attempt => LockMode::Try,
            AccessMode::Get | AccessMode::Peek => LockMode::Wait,
        };
        match self.store.locks.acquire(&self.handle, id, lock_mode) {
            Ok(_) => {
                self.set.record_access(id, mode);
                Ok(())
            }
            Err(e @ CoreError::LockConflict { .. }) => {
                tracing::debug!(txn = %self.id(), object = %id, "attempt refused, abandoning");
                self.abort();
                Err(e)
            }
            Err(e @ CoreError::Interrupted { .. }) => {
                self.finish();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the committed record of a locked object and records its version.
    fn read_committed(&mut self, id: ObjectId) -> CoreResult<Option<ObjectRecord>> {
        let record = self.store.read_record(id)?;
        self.set.record_read(id, record.as_ref().map(|r| r.version));
        Ok(record)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("timestamp", &self.timestamp())
            .field("state", &self.state())
            .field("reads", &self.set.read_count())
            .field("writes", &self.set.write_count())
            .field("creates", &self.set.create_count())
            .field("deletes", &self.set.delete_count())
            .finish_non_exhaustive()
    }
}

fn stage<T: ManagedObject>(value: &T) -> CoreResult<StagedObject> {
    Ok(StagedObject {
        type_tag: T::TYPE_TAG,
        payload: tsodb_codec::to_cbor(value)?,
    })
}

fn decode<T: ManagedObject>(id: ObjectId, tag: &str, payload: &[u8]) -> CoreResult<T> {
    if tag != T::TYPE_TAG {
        return Err(type_mismatch::<T>(id, tag));
    }
    Ok(tsodb_codec::from_cbor(payload)?)
}

fn type_mismatch<T: ManagedObject>(object: ObjectId, found: &str) -> CoreError {
    CoreError::TypeMismatch {
        object,
        expected: T::TYPE_TAG.to_string(),
        found: found.to_string(),
    }
}
