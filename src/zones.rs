//! Zone configuration: the in-memory record of which zones this server
//! hosts, whether each is a primary or a slave, and who to notify or
//! transfer from. Adapted from the teacher's `zones.rs`, which held a
//! flat `HashMap<LowerName, FileZone>`; the shape is kept, but zone data
//! itself now lives in the storage engine (an `Entry` per owner name)
//! rather than in this map — this map only carries the operational
//! metadata a zone needs that isn't part of its DNS data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneRole {
    /// This server is authoritative and the source of truth.
    Primary,
    /// This server mirrors a primary via AXFR/IXFR.
    Slave { primary: SocketAddr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub apex: String,
    /// The account this zone belongs to, for the tenant-scoped admin
    /// listing surface (`storage::key::Class::TenantZone`/`Zrr`).
    pub tenant: String,
    pub role: ZoneRole,
    /// Secondary servers to send NOTIFY to on commit, for a primary
    /// zone. Ignored for slave zones.
    pub notify_targets: Vec<SocketAddr>,
    /// Source addresses allowed to send this zone an AXFR/IXFR request.
    /// Empty means "allow from anywhere", matching an openly mirrored
    /// zone.
    pub allow_transfer_from: Vec<std::net::IpAddr>,
}

impl ZoneConfig {
    pub fn is_primary(&self) -> bool {
        matches!(self.role, ZoneRole::Primary)
    }

    pub fn is_slave(&self) -> bool {
        matches!(self.role, ZoneRole::Slave { .. })
    }

    pub fn primary_addr(&self) -> Option<SocketAddr> {
        match self.role {
            ZoneRole::Slave { primary } => Some(primary),
            ZoneRole::Primary => None,
        }
    }

    pub fn transfer_allowed_from(&self, addr: std::net::IpAddr) -> bool {
        self.allow_transfer_from.is_empty() || self.allow_transfer_from.contains(&addr)
    }
}

/// The set of zones this server currently knows about, keyed by apex.
/// Config-reload friendly: built fresh and swapped in wholesale rather
/// than mutated in place, mirroring the teacher's `CowCell`-backed
/// config pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSet {
    zones: HashMap<String, ZoneConfig>,
}

impl ZoneSet {
    pub fn insert(&mut self, zone: ZoneConfig) {
        self.zones.insert(zone.apex.to_ascii_lowercase(), zone);
    }

    pub fn get(&self, apex: &str) -> Option<&ZoneConfig> {
        self.zones.get(&apex.to_ascii_lowercase())
    }

    pub fn remove(&mut self, apex: &str) -> Option<ZoneConfig> {
        self.zones.remove(&apex.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneConfig> {
        self.zones.values()
    }

    pub fn primaries(&self) -> impl Iterator<Item = &ZoneConfig> {
        self.zones.values().filter(|z| z.is_primary())
    }

    pub fn slaves(&self) -> impl Iterator<Item = &ZoneConfig> {
        self.zones.values().filter(|z| z.is_slave())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(apex: &str) -> ZoneConfig {
        ZoneConfig {
            apex: apex.into(),
            tenant: "default".into(),
            role: ZoneRole::Primary,
            notify_targets: Vec::new(),
            allow_transfer_from: Vec::new(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut zones = ZoneSet::default();
        zones.insert(primary("Example.COM"));
        assert!(zones.get("example.com").is_some());
    }

    #[test]
    fn empty_allow_list_permits_any_source() {
        let zone = primary("example.com");
        assert!(zone.transfer_allowed_from("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn nonempty_allow_list_rejects_unlisted_source() {
        let mut zone = primary("example.com");
        zone.allow_transfer_from.push("203.0.113.5".parse().unwrap());
        assert!(!zone.transfer_allowed_from("198.51.100.1".parse().unwrap()));
    }
}
