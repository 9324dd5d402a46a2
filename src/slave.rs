//! AXFR/IXFR zone transfer client: the slave side of keeping a mirrored
//! zone in sync with its primary. `ZoneMerger` turns an IXFR response's
//! flat RR stream into add/remove sets; `SlaveSync` drives the full
//! check-serial -> transfer -> apply cycle against the storage engine.

use crate::enums::{RecordClass, RecordType};
use crate::error::NsblastError;
use crate::storage::codec::{Entry, EntryBuilder};
use crate::storage::engine::{Category, Engine};
use crate::storage::key;
use crate::wire::header::Header;
use crate::wire::rdata::{RData, SoaData};
use crate::wire::rr::{Question, ResourceRecord};
use crate::wire::Message;
use crate::zones::ZoneConfig;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{info, instrument};

/// An IXFR response decoded into what it adds and removes, per RFC 1995.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IxfrDiff {
    pub new_serial: u32,
    pub removals: Vec<ResourceRecord>,
    pub additions: Vec<ResourceRecord>,
}

pub struct ZoneMerger;

impl ZoneMerger {
    /// Parse an IXFR answer section into a diff. Returns `None` if the
    /// response isn't diff-shaped -- the primary is allowed to fall back
    /// to sending a full AXFR-style dump instead, which the caller
    /// should then treat as a zone replacement rather than a merge.
    pub fn parse_ixfr(answers: &[ResourceRecord]) -> Option<IxfrDiff> {
        if answers.len() < 2 {
            return None;
        }
        let RData::Soa(first_soa) = &answers[0].rdata else { return None };
        if answers[1].rtype != RecordType::SOA {
            return None;
        }
        let new_serial = first_soa.serial;
        if answers.len() == 2 {
            // SOA, SOA with nothing in between: already current.
            return Some(IxfrDiff { new_serial, removals: Vec::new(), additions: Vec::new() });
        }

        let mut removals = Vec::new();
        let mut additions = Vec::new();
        let mut deleting = true;
        for rr in &answers[2..] {
            if rr.rtype == RecordType::SOA {
                deleting = !deleting;
                continue;
            }
            if deleting {
                removals.push(rr.clone());
            } else {
                additions.push(rr.clone());
            }
        }
        Some(IxfrDiff { new_serial, removals, additions })
    }
}

fn group_by_owner(rrs: &[ResourceRecord]) -> BTreeMap<String, Vec<ResourceRecord>> {
    let mut map: BTreeMap<String, Vec<ResourceRecord>> = BTreeMap::new();
    for rr in rrs {
        map.entry(rr.name.clone()).or_default().push(rr.clone());
    }
    map
}

fn entry_from_rrs(owner: &str, rrs: &[ResourceRecord]) -> Result<Entry, NsblastError> {
    let mut builder = EntryBuilder::new(owner);
    for rr in rrs {
        match &rr.rdata {
            RData::Soa(soa) => {
                builder.create_soa(rr.ttl(), soa.clone())?;
            }
            other => {
                builder.create_rr(rr.rclass(), rr.ttl(), other.clone())?;
            }
        }
    }
    builder.finish()
}

/// True once the accumulated transfer answers begin and end with the
/// same SOA serial -- the RFC 5936/1995 signal that a (possibly
/// multi-message) transfer is complete.
fn transfer_complete(answers: &[ResourceRecord]) -> bool {
    if answers.len() < 2 {
        return false;
    }
    let (Some(first), Some(last)) = (answers.first(), answers.last()) else { return false };
    if first.rtype != RecordType::SOA || last.rtype != RecordType::SOA {
        return false;
    }
    match (&first.rdata, &last.rdata) {
        (RData::Soa(a), RData::Soa(b)) => a.serial == b.serial,
        _ => false,
    }
}

pub struct SlaveSync {
    engine: Arc<Engine>,
}

impl SlaveSync {
    pub fn new(engine: Arc<Engine>) -> Self {
        SlaveSync { engine }
    }

    #[instrument(skip(self, zone), fields(apex = %zone.apex))]
    pub async fn check_and_sync(&self, zone: &ZoneConfig) -> Result<Option<u32>, NsblastError> {
        let primary = zone
            .primary_addr()
            .ok_or_else(|| NsblastError::Constraint(format!("{} is not a slave zone", zone.apex)))?;

        let remote_serial = self.query_soa_serial(primary, &zone.apex).await?;
        let local_soa = self.local_soa(&zone.apex)?;
        if let Some(soa) = &local_soa {
            let ahead = remote_serial.wrapping_sub(soa.serial) as i32;
            if ahead <= 0 {
                return Ok(None);
            }
        }

        let qtype = if local_soa.is_some() { RecordType::IXFR } else { RecordType::AXFR };
        let answers = self.transfer(primary, &zone.apex, qtype, local_soa).await?;

        let new_serial = if qtype == RecordType::IXFR {
            match ZoneMerger::parse_ixfr(&answers) {
                Some(diff) => self.apply_diff(&zone.apex, diff)?,
                None => self.replace_zone(&zone.apex, &answers)?,
            }
        } else {
            self.replace_zone(&zone.apex, &answers)?
        };

        info!(new_serial, "slave zone synced");
        Ok(Some(new_serial))
    }

    fn local_soa(&self, apex: &str) -> Result<Option<SoaData>, NsblastError> {
        let txn = self.engine.begin();
        Ok(txn.read(&key::entry_key(apex), Category::Entry)?.map(|b| Entry::parse(&b)).transpose()?.and_then(|e| e.soa().cloned()))
    }

    async fn query_soa_serial(&self, primary: SocketAddr, apex: &str) -> Result<u32, NsblastError> {
        let bind_addr: SocketAddr = if primary.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(primary).await?;

        let header = Header { id: rand::random(), qdcount: 1, ..Header::default() };
        let query = Message {
            header,
            questions: vec![Question { qname: apex.to_string(), qtype: RecordType::SOA, qclass: RecordClass::Internet }],
            ..Message::default()
        };
        socket.send(&query.to_bytes_truncating(512)?).await?;

        let mut buf = [0u8; 512];
        let len = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
            .await
            .map_err(|_| NsblastError::Timeout(format!("SOA query to {primary} timed out")))??;
        let reply = Message::parse(&buf[..len])?;
        let rr = reply.answers.first().ok_or_else(|| NsblastError::Malformed("SOA query reply carried no answer".into()))?;
        match &rr.rdata {
            RData::Soa(soa) => Ok(soa.serial),
            _ => Err(NsblastError::Malformed("SOA query reply was not an SOA".into())),
        }
    }

    async fn transfer(
        &self,
        primary: SocketAddr,
        apex: &str,
        qtype: RecordType,
        local_soa: Option<SoaData>,
    ) -> Result<Vec<ResourceRecord>, NsblastError> {
        let stream = TcpStream::connect(primary).await?;
        let codec = LengthDelimitedCodec::builder().length_field_length(2).big_endian().new_codec();
        let mut framed = Framed::new(stream, codec);

        let mut header = Header { id: rand::random(), qdcount: 1, ..Header::default() };
        let mut authorities = Vec::new();
        if let Some(soa) = local_soa {
            header.nscount = 1;
            authorities.push(ResourceRecord::new(apex, RecordClass::Internet, 0, RData::Soa(soa)));
        }
        let query = Message {
            header,
            questions: vec![Question { qname: apex.to_string(), qtype, qclass: RecordClass::Internet }],
            authorities,
            ..Message::default()
        };
        framed.send(Bytes::from(query.to_bytes_truncating(u16::MAX as usize)?)).await?;

        let mut answers = Vec::new();
        while let Some(frame) = framed.next().await {
            let frame = frame?;
            let msg = Message::parse(&frame)?;
            answers.extend(msg.answers);
            if transfer_complete(&answers) {
                break;
            }
        }
        Ok(answers)
    }

    /// Discard everything under `apex` and rebuild it from a full RR
    /// dump. Used for AXFR and for an IXFR that fell back to one.
    fn replace_zone(&self, apex: &str, rrs: &[ResourceRecord]) -> Result<u32, NsblastError> {
        let grouped = group_by_owner(rrs);
        let txn = self.engine.begin();
        txn.remove_recursive(&key::entry_key(apex), Category::Entry)?;

        let mut new_serial = 0;
        for (owner, owner_rrs) in &grouped {
            let entry = entry_from_rrs(owner, owner_rrs)?;
            if owner == apex {
                new_serial = entry.soa().map(|s| s.serial).unwrap_or(0);
            }
            let k = key::entry_key(owner);
            txn.write(&k, &entry.to_bytes()?, false, Category::Entry)?;
        }
        txn.commit()?;
        Ok(new_serial)
    }

    /// Apply an incremental diff: remove the listed RRs from each
    /// affected owner's entry, add the listed ones, repacking only the
    /// entries the diff actually touched.
    fn apply_diff(&self, apex: &str, diff: IxfrDiff) -> Result<u32, NsblastError> {
        let removal_groups = group_by_owner(&diff.removals);
        let addition_groups = group_by_owner(&diff.additions);
        let mut owners: BTreeSet<String> = removal_groups.keys().cloned().collect();
        owners.extend(addition_groups.keys().cloned());

        let txn = self.engine.begin();
        for owner in owners {
            let k = key::entry_key(&owner);
            let mut rrs: Vec<ResourceRecord> = match txn.read(&k, Category::Entry)? {
                Some(bytes) => Entry::parse(&bytes)?.rrs,
                None => Vec::new(),
            };
            if let Some(to_remove) = removal_groups.get(&owner) {
                rrs.retain(|rr| !to_remove.contains(rr));
            }
            if let Some(to_add) = addition_groups.get(&owner) {
                rrs.extend(to_add.iter().cloned());
            }

            if rrs.is_empty() {
                txn.remove(&k, Category::Entry)?;
            } else {
                let entry = entry_from_rrs(&owner, &rrs)?;
                txn.write(&k, &entry.to_bytes()?, false, Category::Entry)?;
            }
        }
        let _ = apex;
        txn.commit()?;
        Ok(diff.new_serial)
    }
}
