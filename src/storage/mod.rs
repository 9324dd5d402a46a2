//! The embedded ordered key-value storage engine: key encoding, the
//! packed RR-set codec, the transactional facade, and backups.

pub mod backup;
pub mod codec;
pub mod engine;
pub mod key;

pub use codec::{Entry, EntryBuilder};
pub use engine::{Engine, Transaction};
