//! Persistent objects: identifiers, typed references and stored records.

mod id;
mod record;
mod reference;

pub use id::ObjectId;
pub use record::{ObjectRecord, RECORD_FORMAT};
pub use reference::{ManagedObject, ObjectRef};
