//! The single error type shared by every layer of the server.
//!
//! Grounded on the teacher's `GoatNsError`: one flat enum with `From`
//! impls for the crates it wraps, rather than a per-module error zoo.
//! The variant set follows the error-kind table in the design's error
//! handling section instead of the teacher's own variants, since this
//! server's failure domains (wire parsing, storage transactions,
//! replication) are different from a sqlite-backed web app's.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NsblastError {
    /// A DNS message failed to parse.
    #[error("malformed DNS message: {0}")]
    Malformed(String),

    /// A reply builder could not fit an RR and had to truncate.
    #[error("reply truncated")]
    Truncated,

    /// A key was not present where the caller required it.
    #[error("not found: {0}")]
    NotFound(String),

    /// A `write(is_new=true)` collided with an existing key.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A semantic invariant was violated (e.g. SOA rdata length changed
    /// on `replace_soa`, or `finish()` called twice on an EntryBuilder).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The storage engine rejected a commit.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Authorization failure. The server only ever raises this for the
    /// single shared-secret admin/cluster checks; a full authz model is
    /// an external collaborator.
    #[error("access denied: {0}")]
    Denied(String),

    /// An invariant internal to the codec or engine was broken. These
    /// should never be reachable from untrusted input; seeing one means
    /// a bug, not a bad request.
    #[error("internal error: {0}")]
    Internal(String),

    /// A bounded wait (NOTIFY deadline, replication keepalive) elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage engine error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<NsblastError> for std::io::Error {
    fn from(value: NsblastError) -> Self {
        match value {
            NsblastError::Io(err) => err,
            other => std::io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NsblastError>;
