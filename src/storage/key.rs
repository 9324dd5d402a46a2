//! On-disk key encoding for the RocksDB-backed storage engine.
//!
//! Grounded on `original_source/include/nsblast/ResourceIf.h`'s
//! `RealKey`: a one-byte class tag followed by a class-specific payload,
//! all sharing one keyspace (one RocksDB column family) so the classes
//! interleave sensibly under a single iterator. FQDN-namespaced classes
//! (`ENTRY`, `ZONE`, `DIFF`) encode labels in *reversed* order, each
//! terminated by a `0x00` byte. That gives two properties for free:
//! lexicographic key order walks a zone depth-first (apex, then every
//! descendant, in label order) and a zone's apex key is a byte-for-byte
//! prefix of every descendant's key, so "every record under this zone"
//! is a single RocksDB prefix scan.
//!
//! `ROLE` is carried as an unused placeholder discriminant: the original
//! reserves it for a role-based authorization table this server doesn't
//! implement (authn/authz is an external collaborator here), but keeping
//! the tag byte reserved avoids ever colliding with it if that surface
//! is added later.
//!
//! `TZONE` and `ZRR` are the two classes that deliberately do *not*
//! follow the reversed-label scheme above: both are tenant-scoped rather
//! than zone-scoped, and are addressed by a literal (non-reversed)
//! `tenant || '/' || fqdn` encoding instead, since nothing ever needs to
//! prefix-scan "every tenant row for every zone" in reversed order.

use crate::error::NsblastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Class {
    /// A zone's packed RR-set for one owner name.
    Entry = b'E',
    /// An IXFR diff journal entry, keyed by zone apex + SOA serial.
    Diff = b'D',
    /// A tenant record.
    Tenant = b'T',
    /// An admin user record.
    User = b'U',
    #[allow(dead_code)]
    /// Reserved for a role-based authorization table; unused here.
    Role = b'R',
    /// A zone's metadata (SOA cache, slave/primary config, allow-lists).
    Zone = b'Z',
    /// Tenant -> zone-apex membership, for "list this tenant's zones".
    TenantZone = b'z',
    /// A monotonically increasing transaction-log row.
    TrxId = b'X',
    /// A replication follower's last-applied trxid from a given primary.
    ReplCursor = b'C',
    /// One tenant's view of a single RRset (owner fqdn + type), for the
    /// REST RRset-enumeration surface: "every RRset this tenant owns at
    /// this name" without walking the whole `ENTRY` keyspace.
    Zrr = b'r',
}

impl TryFrom<u8> for Class {
    type Error = NsblastError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'E' => Ok(Class::Entry),
            b'D' => Ok(Class::Diff),
            b'T' => Ok(Class::Tenant),
            b'U' => Ok(Class::User),
            b'R' => Ok(Class::Role),
            b'Z' => Ok(Class::Zone),
            b'z' => Ok(Class::TenantZone),
            b'X' => Ok(Class::TrxId),
            b'C' => Ok(Class::ReplCursor),
            b'r' => Ok(Class::Zrr),
            other => Err(NsblastError::Internal(format!("unknown key class byte {other:#x}"))),
        }
    }
}

/// The class tag of an already-encoded key, or an error if the key is
/// empty or carries an unrecognized tag.
pub fn class_of(key: &[u8]) -> Result<Class, NsblastError> {
    let byte = *key.first().ok_or_else(|| NsblastError::Internal("empty storage key".into()))?;
    Class::try_from(byte)
}

fn reversed_label_bytes(fqdn: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    for label in crate::wire::label::fqdn_to_labels(fqdn).iter().rev() {
        buf.extend_from_slice(&label.to_ascii_lowercase());
        buf.push(0);
    }
    buf
}

fn class_fqdn_key(class: Class, fqdn: &str) -> Vec<u8> {
    let mut key = vec![class as u8];
    key.extend(reversed_label_bytes(fqdn));
    key
}

/// The inverse of [`reversed_label_bytes`]: recover the literal fqdn
/// from an `ENTRY`/`ZONE`/`DIFF`-style key's reversed, `0x00`-separated
/// label payload. Used to resolve a tenant-scoped index row (`ZRR`) for
/// an owner name discovered only as a raw key, e.g. while walking the
/// keys a zone delete just removed.
pub fn fqdn_of_entry_key(key: &[u8]) -> Option<String> {
    let payload = key.get(1..)?;
    let mut labels: Vec<&[u8]> = payload.split(|&b| b == 0).collect();
    // `split` on a trailing separator yields a trailing empty slice.
    if labels.last().is_some_and(|l| l.is_empty()) {
        labels.pop();
    }
    if labels.is_empty() {
        return None;
    }
    labels.reverse();
    let parts: Vec<&str> = labels.iter().map(|l| std::str::from_utf8(l).ok()).collect::<Option<_>>()?;
    Some(parts.join("."))
}

fn name_key(class: Class, name: &str) -> Vec<u8> {
    let mut key = vec![class as u8];
    key.extend_from_slice(name.to_ascii_lowercase().as_bytes());
    key
}

/// Key for an owner name's packed RR-set. Also serves as the prefix for
/// "every entry in this zone" when `fqdn` is the zone apex.
pub fn entry_key(fqdn: &str) -> Vec<u8> {
    class_fqdn_key(Class::Entry, fqdn)
}

/// Key for a zone's metadata row.
pub fn zone_key(apex: &str) -> Vec<u8> {
    class_fqdn_key(Class::Zone, apex)
}

/// Key for an IXFR diff journal row: the zone apex plus the SOA serial
/// the diff produces. Diffs for one zone sort in serial order, so a
/// range scan from a follower's known serial yields exactly the diffs
/// it's missing.
pub fn diff_key(zone_apex: &str, serial: u32) -> Vec<u8> {
    let mut key = class_fqdn_key(Class::Diff, zone_apex);
    key.extend_from_slice(&serial.to_be_bytes());
    key
}

pub fn tenant_key(tenant: &str) -> Vec<u8> {
    name_key(Class::Tenant, tenant)
}

pub fn user_key(user: &str) -> Vec<u8> {
    name_key(Class::User, user)
}

/// Key for one tenant/zone membership row: `tenant || '/' || fqdn`, the
/// fqdn kept in its literal (non-reversed) form since this class is
/// scoped by tenant, not by zone prefix.
fn tenant_scoped_key(class: Class, tenant: &str, fqdn: &str) -> Vec<u8> {
    let mut key = vec![class as u8];
    key.extend_from_slice(tenant.to_ascii_lowercase().as_bytes());
    key.push(b'/');
    key.extend_from_slice(fqdn.to_ascii_lowercase().as_bytes());
    key
}

fn tenant_scoped_prefix(class: Class, tenant: &str) -> Vec<u8> {
    let mut key = vec![class as u8];
    key.extend_from_slice(tenant.to_ascii_lowercase().as_bytes());
    key.push(b'/');
    key
}

/// Key for one tenant/zone membership row.
pub fn tenant_zone_key(tenant: &str, zone_apex: &str) -> Vec<u8> {
    tenant_scoped_key(Class::TenantZone, tenant, zone_apex)
}

/// Prefix matching every zone owned by `tenant`, for listing.
pub fn tenant_zone_prefix(tenant: &str) -> Vec<u8> {
    tenant_scoped_prefix(Class::TenantZone, tenant)
}

/// Key for one tenant's view of a single RRset, addressed by owner fqdn.
/// Encoded the same literal `tenant || '/' || fqdn` way as `TZONE`, not
/// the reversed-label scheme `ENTRY` uses.
pub fn zrr_key(tenant: &str, fqdn: &str) -> Vec<u8> {
    tenant_scoped_key(Class::Zrr, tenant, fqdn)
}

/// Prefix matching every RRset row owned by `tenant`, for enumeration.
pub fn zrr_prefix(tenant: &str) -> Vec<u8> {
    tenant_scoped_prefix(Class::Zrr, tenant)
}

/// Key for a transaction-log row. Rows sort in trxid order, so the
/// highest key under this prefix gives the last-assigned trxid on
/// startup, and a range scan from a follower's last-seen trxid yields
/// the entries it needs streamed.
pub fn trxid_key(trxid: u64) -> Vec<u8> {
    let mut key = vec![Class::TrxId as u8];
    key.extend_from_slice(&trxid.to_be_bytes());
    key
}

/// The bare `TRXID` class prefix, for seeking to the last row on
/// startup to recover the next trxid to assign.
pub fn trxid_prefix() -> Vec<u8> {
    vec![Class::TrxId as u8]
}

/// Key for a replication follower's last-applied trxid from `primary`,
/// addressed by its socket address string. Kept separate from this
/// engine's own `TRXID` sequence, which numbers local commits and has
/// no relationship to the primary's numbering.
pub fn repl_cursor_key(primary: &str) -> Vec<u8> {
    name_key(Class::ReplCursor, primary)
}

/// True if `candidate` names the zone apex itself or one of its
/// descendants, given `zone_apex`'s already-encoded entry-key prefix.
pub fn is_under_zone(zone_entry_prefix: &[u8], candidate_entry_key: &[u8]) -> bool {
    candidate_entry_key.starts_with(zone_entry_prefix)
}
