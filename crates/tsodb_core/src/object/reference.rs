//! Typed object references.

use crate::object::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A type that can be stored as a persistent object.
///
/// The type tag is written into every record of the type and checked on
/// every lookup, so it must stay stable across releases of the game.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tsodb_core::ManagedObject;
///
/// #[derive(Serialize, Deserialize)]
/// struct Door {
///     open: bool,
/// }
///
/// impl ManagedObject for Door {
///     const TYPE_TAG: &'static str = "dungeon.Door";
/// }
/// ```
pub trait ManagedObject: Serialize + DeserializeOwned + Send + 'static {
    /// Stable name of the type.
    const TYPE_TAG: &'static str;
}

/// A reference to a persistent object of type `T`.
///
/// A reference is a plain value: it holds no lock and caches no state, and it
/// can be copied, stored inside other objects and resolved again in any later
/// transaction. Resolution happens through
/// [`Transaction::lookup`](crate::Transaction::lookup).
///
/// Serialized form is the bare object ID.
pub struct ObjectRef<T> {
    id: ObjectId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    /// Wraps an object ID.
    #[must_use]
    pub const fn new(id: ObjectId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the referenced object ID.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T: ManagedObject> ObjectRef<T> {
    /// Returns the type tag the referenced object must carry.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectRef<T> {}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.id)
    }
}

impl<T> Serialize for ObjectRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ObjectRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ObjectId::deserialize(deserializer).map(Self::new)
    }
}
