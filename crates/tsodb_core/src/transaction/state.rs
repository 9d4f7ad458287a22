//! Transaction state and working sets.

use crate::object::ObjectId;
use crate::transaction::AccessMode;
use crate::types::SequenceNumber;
use std::collections::{HashMap, HashSet};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction can perform operations.
    Active,
    /// Commit is validating and applying. Cannot be wounded.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
    /// Transaction was wounded by an older transaction.
    Interrupted,
}

impl TransactionState {
    /// Returns true if the transaction can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted | Self::Interrupted)
    }
}

/// An object value staged by a transaction, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagedObject {
    pub(crate) type_tag: &'static str,
    pub(crate) payload: Vec<u8>,
}

/// What a transaction has staged for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staged<'a> {
    Value(&'a StagedObject),
    Deleted,
}

/// Everything a transaction has touched.
///
/// The access map and read set describe what was looked up; the write,
/// create and delete sets describe what commit will apply. An ID is in at
/// most one of the three staging sets.
#[derive(Debug, Default)]
pub(crate) struct WorkingSet {
    access: HashMap<ObjectId, AccessMode>,
    /// Observed committed version; `None` means observed absent.
    reads: HashMap<ObjectId, Option<SequenceNumber>>,
    writes: HashMap<ObjectId, StagedObject>,
    creates: HashMap<ObjectId, StagedObject>,
    deletes: HashSet<ObjectId>,
}

impl WorkingSet {
    pub(crate) fn record_access(&mut self, id: ObjectId, mode: AccessMode) {
        self.access.entry(id).or_insert(mode);
    }

    pub(crate) fn access_mode(&self, id: ObjectId) -> Option<AccessMode> {
        self.access.get(&id).copied()
    }

    /// Returns true if this transaction holds the exclusive lock on `id`.
    pub(crate) fn holds(&self, id: ObjectId) -> bool {
        self.access.contains_key(&id) || self.creates.contains_key(&id)
    }

    /// Records the committed version seen for `id`. The first observation wins.
    pub(crate) fn record_read(&mut self, id: ObjectId, version: Option<SequenceNumber>) {
        self.reads.entry(id).or_insert(version);
    }

    pub(crate) fn observed(&self, id: ObjectId) -> Option<Option<SequenceNumber>> {
        self.reads.get(&id).copied()
    }

    pub(crate) fn staged(&self, id: ObjectId) -> Option<Staged<'_>> {
        if self.deletes.contains(&id) {
            return Some(Staged::Deleted);
        }
        self.creates
            .get(&id)
            .or_else(|| self.writes.get(&id))
            .map(Staged::Value)
    }

    pub(crate) fn stage_create(&mut self, id: ObjectId, object: StagedObject) {
        self.creates.insert(id, object);
    }

    /// Stages a new value. Objects created by this transaction stay creates.
    pub(crate) fn stage_write(&mut self, id: ObjectId, object: StagedObject) {
        self.deletes.remove(&id);
        if let Some(created) = self.creates.get_mut(&id) {
            *created = object;
        } else {
            self.writes.insert(id, object);
        }
    }

    /// Stages a deletion. Deleting a self-created object only forgets the
    /// create; returns whether a delete was staged.
    pub(crate) fn stage_delete(&mut self, id: ObjectId) -> bool {
        if self.creates.remove(&id).is_some() {
            return false;
        }
        self.writes.remove(&id);
        self.deletes.insert(id)
    }

    pub(crate) fn reads(&self) -> impl Iterator<Item = (&ObjectId, &Option<SequenceNumber>)> {
        self.reads.iter()
    }

    pub(crate) fn writes(&self) -> impl Iterator<Item = (&ObjectId, &StagedObject)> {
        self.writes.iter()
    }

    pub(crate) fn creates(&self) -> impl Iterator<Item = (&ObjectId, &StagedObject)> {
        self.creates.iter()
    }

    pub(crate) fn deletes(&self) -> impl Iterator<Item = &ObjectId> {
        self.deletes.iter()
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.len()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn create_count(&self) -> usize {
        self.creates.len()
    }

    pub(crate) fn delete_count(&self) -> usize {
        self.deletes.len()
    }

    pub(crate) fn has_changes(&self) -> bool {
        !(self.writes.is_empty() && self.creates.is_empty() && self.deletes.is_empty())
    }

    pub(crate) fn clear(&mut self) {
        self.access.clear();
        self.reads.clear();
        self.writes.clear();
        self.creates.clear();
        self.deletes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(payload: u8) -> StagedObject {
        StagedObject {
            type_tag: "test",
            payload: vec![payload],
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TransactionState::Active.is_terminal());
        assert!(!TransactionState::Committing.is_terminal());
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
        assert!(TransactionState::Interrupted.is_terminal());
    }

    #[test]
    fn first_read_wins() {
        let mut set = WorkingSet::default();
        let id = ObjectId::random();
        set.record_read(id, Some(SequenceNumber::new(3)));
        set.record_read(id, Some(SequenceNumber::new(9)));
        assert_eq!(set.observed(id), Some(Some(SequenceNumber::new(3))));
        assert_eq!(set.read_count(), 1);
    }

    #[test]
    fn write_to_created_object_stays_create() {
        let mut set = WorkingSet::default();
        let id = ObjectId::random();
        set.stage_create(id, obj(1));
        set.stage_write(id, obj(2));
        assert_eq!(set.create_count(), 1);
        assert_eq!(set.write_count(), 0);
        assert_eq!(set.staged(id), Some(Staged::Value(&obj(2))));
    }

    #[test]
    fn deleting_created_object_forgets_it() {
        let mut set = WorkingSet::default();
        let id = ObjectId::random();
        set.stage_create(id, obj(1));
        assert!(!set.stage_delete(id));
        assert!(set.staged(id).is_none());
        assert!(!set.has_changes());
    }

    #[test]
    fn delete_replaces_write() {
        let mut set = WorkingSet::default();
        let id = ObjectId::random();
        set.stage_write(id, obj(1));
        assert!(set.stage_delete(id));
        assert_eq!(set.staged(id), Some(Staged::Deleted));
        assert_eq!(set.write_count(), 0);
        assert_eq!(set.delete_count(), 1);
    }

    #[test]
    fn holds_tracks_access_and_creates() {
        let mut set = WorkingSet::default();
        let read = ObjectId::random();
        let made = ObjectId::random();
        set.record_access(read, AccessMode::Get);
        set.stage_create(made, obj(0));
        assert!(set.holds(read));
        assert!(set.holds(made));
        assert!(!set.holds(ObjectId::random()));
        set.clear();
        assert!(!set.holds(read));
    }
}
