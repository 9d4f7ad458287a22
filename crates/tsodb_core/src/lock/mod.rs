//! Exclusive object locks with wound-wait conflict resolution.
//!
//! A GET request for an object held by another transaction is resolved by
//! age:
//!
//! - an **older** requester wounds the holder: the holder is interrupted and
//!   all of its locks are released before the request returns;
//! - a **younger** requester waits until the object is released;
//! - a holder that is already committing is never wounded; the requester
//!   waits for the commit to finish.
//!
//! Only younger transactions ever wait on older (or committing) ones, so no
//! wait cycle can form, and the oldest active transaction is never wounded,
//! so every transaction eventually runs to completion once it is retried
//! with its work.
//!
//! ATTEMPT requests never wait and never wound.

mod table;

pub(crate) use table::{LockGrant, LockMode, LockTable};
