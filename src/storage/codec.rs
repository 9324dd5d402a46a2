//! Packed on-disk encoding for one owner name's RR-set (an "Entry").
//!
//! Reuses `wire::rr::ResourceRecord`'s own (de)serialization rather than
//! inventing a parallel on-disk RR shape: every RR in an Entry shares the
//! same owner name, so writing each one through the same
//! `NameCompressor` used for wire messages means the second RR onward
//! collapses its name to a 2-byte pointer back at the first RR's literal
//! name automatically, with zero special-casing.
//!
//! A trailing, type-sorted index lets a caller ask "does this entry hold
//! an RR of type X" (`Entry::has_type`) without scanning every RR -- a
//! binary search over the index instead. The index is built once, at
//! pack time, since an `Entry` is immutable after `EntryBuilder::finish`.

use crate::enums::{RecordClass, RecordType};
use crate::error::NsblastError;
use crate::wire::label::{fqdn_to_labels, NameCompressor};
use crate::wire::rdata::{split_into_char_strings, RData, SoaData};
use crate::wire::rr::ResourceRecord;

const FORMAT_VERSION: u8 = 2;
/// version(1) + flags(1) + rr_count(2) + label_section_len(2) +
/// zone_suffix_len(1) + index_offset(4).
pub const HEADER_LEN: usize = 11;

const FLAG_HAS_SOA: u8 = 0b0000_0001;
const FLAG_HAS_NS: u8 = 0b0000_0010;
const FLAG_HAS_A: u8 = 0b0000_0100;
const FLAG_HAS_AAAA: u8 = 0b0000_1000;
const FLAG_HAS_CNAME: u8 = 0b0001_0000;
const FLAG_HAS_TXT: u8 = 0b0010_0000;
const FLAG_TOMBSTONE: u8 = 0b0100_0000;

/// Ordering bucket for a record type within a packed entry. Lower
/// buckets sort first, which keeps the record types a lookup asks for
/// most often (SOA, NS, the address types) clustered at the front of
/// the blob. Bucket 9 is a catch-all for the seldom-used text/ancillary
/// types (HINFO, RP, AFSDB); bucket 16 is reserved for meta/pseudo
/// record types that are never actually stored in an entry (OPT, ANY,
/// AXFR, IXFR) but still need a defined ordering so sorting is total.
fn type_priority(rtype: RecordType) -> u8 {
    match rtype {
        RecordType::SOA => 0,
        RecordType::NS => 1,
        RecordType::CNAME => 2,
        RecordType::A => 3,
        RecordType::AAAA => 4,
        RecordType::MX => 5,
        RecordType::TXT => 6,
        RecordType::SRV => 7,
        RecordType::PTR => 8,
        RecordType::HINFO | RecordType::RP | RecordType::AFSDB | RecordType::InvalidType => 9,
        RecordType::OPT | RecordType::ANY | RecordType::AXFR | RecordType::IXFR => 16,
    }
}

/// The wire-encoded byte length of `owner` as a name: each label's byte
/// count plus its length-prefix byte, plus the one-byte root
/// terminator. Matches what `ResourceRecord::write` would emit for this
/// name before any compression pointer kicks in.
fn encoded_name_len(owner: &str) -> usize {
    fqdn_to_labels(owner).iter().map(|l| l.len() + 1).sum::<usize>() + 1
}

fn pack(owner: &str, rrs: &[ResourceRecord], flags: u8) -> Result<Vec<u8>, NsblastError> {
    if rrs.len() > u16::MAX as usize {
        return Err(NsblastError::Constraint("too many RRs for one entry".into()));
    }
    let mut buf = vec![0u8; HEADER_LEN];

    let mut compressor = NameCompressor::new();
    let mut type_offsets: Vec<(u16, u32)> = Vec::new();
    let mut last_rtype: Option<RecordType> = None;
    for rr in rrs {
        if rr.name != owner {
            return Err(NsblastError::Internal(format!(
                "entry for {owner} holds an RR owned by {}",
                rr.name
            )));
        }
        if last_rtype != Some(rr.rtype) {
            type_offsets.push((u16::from(rr.rtype), buf.len() as u32));
            last_rtype = Some(rr.rtype);
        }
        rr.write(&mut buf, 0, &mut compressor);
    }

    let index_offset = buf.len() as u32;
    type_offsets.sort_unstable_by_key(|(rtype, _)| *rtype);
    buf.extend_from_slice(&(type_offsets.len() as u16).to_be_bytes());
    for (rtype, offset) in &type_offsets {
        buf.extend_from_slice(&rtype.to_be_bytes());
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    let label_section_len = encoded_name_len(owner) as u16;
    let zone_suffix_len = fqdn_to_labels(owner).len() as u8;

    buf[0] = FORMAT_VERSION;
    buf[1] = flags;
    buf[2..4].copy_from_slice(&(rrs.len() as u16).to_be_bytes());
    buf[4..6].copy_from_slice(&label_section_len.to_be_bytes());
    buf[6] = zone_suffix_len;
    buf[7..11].copy_from_slice(&index_offset.to_be_bytes());
    Ok(buf)
}

/// A parsed, immutable view of one owner name's packed RR-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub owner: String,
    flags: u8,
    pub rrs: Vec<ResourceRecord>,
    /// `(type, first-occurrence offset)`, sorted by type, for
    /// `has_type`'s binary search. Not re-derived from `rrs` on every
    /// call since an `Entry` is read far more often than it's built.
    index: Vec<(u16, u32)>,
}

impl Entry {
    pub fn parse(bytes: &[u8]) -> Result<Entry, NsblastError> {
        if bytes.len() < HEADER_LEN {
            return Err(NsblastError::Malformed("entry shorter than its header".into()));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(NsblastError::Internal(format!("unsupported entry format version {}", bytes[0])));
        }
        let flags = bytes[1];
        let rr_count = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let index_offset = u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;

        let mut offset = HEADER_LEN;
        let mut rrs = Vec::with_capacity(rr_count);
        for _ in 0..rr_count {
            let (rr, next) = ResourceRecord::parse(bytes, offset)?;
            rrs.push(rr);
            offset = next;
        }
        let owner = rrs
            .first()
            .map(|rr| rr.name.clone())
            .ok_or_else(|| NsblastError::Malformed("entry has no records".into()))?;

        if index_offset > bytes.len() || index_offset < offset.min(bytes.len()) {
            return Err(NsblastError::Malformed("entry index offset out of range".into()));
        }
        let index = parse_index(bytes, index_offset)?;

        Ok(Entry { owner, flags, rrs, index })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NsblastError> {
        pack(&self.owner, &self.rrs, self.flags)
    }

    pub fn has_soa(&self) -> bool {
        self.flags & FLAG_HAS_SOA != 0
    }

    pub fn has_ns(&self) -> bool {
        self.flags & FLAG_HAS_NS != 0
    }

    pub fn has_a(&self) -> bool {
        self.flags & FLAG_HAS_A != 0
    }

    pub fn has_aaaa(&self) -> bool {
        self.flags & FLAG_HAS_AAAA != 0
    }

    pub fn has_cname(&self) -> bool {
        self.flags & FLAG_HAS_CNAME != 0
    }

    pub fn has_txt(&self) -> bool {
        self.flags & FLAG_HAS_TXT != 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Whether this entry holds at least one RR of `rtype`, via a binary
    /// search over the packed index rather than a linear scan of `rrs`.
    pub fn has_type(&self, rtype: RecordType) -> bool {
        self.index.binary_search_by_key(&u16::from(rtype), |(t, _)| *t).is_ok()
    }

    pub fn soa(&self) -> Option<&SoaData> {
        self.rrs.iter().find_map(|rr| match &rr.rdata {
            RData::Soa(soa) => Some(soa),
            _ => None,
        })
    }

    /// Mark this entry as deleted without discarding its last-known RRs.
    /// Tombstones travel through the replication log the same as live
    /// entries so a follower can distinguish "never existed" from "was
    /// removed".
    pub fn tombstone(&mut self) {
        self.flags |= FLAG_TOMBSTONE;
    }

    /// Replace the entry's SOA rdata, keeping every other RR untouched.
    /// Errors if the entry carries no SOA to replace.
    pub fn replace_soa(&mut self, soa: SoaData, ttl: u32) -> Result<(), NsblastError> {
        let idx = self
            .rrs
            .iter()
            .position(|rr| rr.rtype == RecordType::SOA)
            .ok_or_else(|| NsblastError::Constraint("entry has no SOA to replace".into()))?;
        self.rrs[idx] = ResourceRecord::new(self.owner.clone(), RecordClass::Internet, ttl, RData::Soa(soa));
        Ok(())
    }

    /// Bump the SOA serial by one and return the new value. Used on
    /// every zone-apex commit so followers can detect a new version to
    /// transfer without the caller having to read-modify-write serials
    /// by hand.
    pub fn increment_soa_serial(&mut self) -> Result<u32, NsblastError> {
        let idx = self
            .rrs
            .iter()
            .position(|rr| rr.rtype == RecordType::SOA)
            .ok_or_else(|| NsblastError::Constraint("entry has no SOA to increment".into()))?;
        match &mut self.rrs[idx].rdata {
            RData::Soa(soa) => {
                soa.serial = soa.serial.wrapping_add(1);
                Ok(soa.serial)
            }
            _ => unreachable!("type_priority guarantees the SOA slot holds SOA rdata"),
        }
    }
}

fn parse_index(bytes: &[u8], index_offset: usize) -> Result<Vec<(u16, u32)>, NsblastError> {
    let count_bytes = bytes
        .get(index_offset..index_offset + 2)
        .ok_or_else(|| NsblastError::Malformed("entry index count truncated".into()))?;
    let count = u16::from_be_bytes([count_bytes[0], count_bytes[1]]) as usize;
    let mut offset = index_offset + 2;
    let mut index = Vec::with_capacity(count);
    for _ in 0..count {
        let entry_bytes = bytes
            .get(offset..offset + 6)
            .ok_or_else(|| NsblastError::Malformed("entry index row truncated".into()))?;
        let rtype = u16::from_be_bytes([entry_bytes[0], entry_bytes[1]]);
        let rr_offset = u32::from_be_bytes([entry_bytes[2], entry_bytes[3], entry_bytes[4], entry_bytes[5]]);
        index.push((rtype, rr_offset));
        offset += 6;
    }
    Ok(index)
}

/// Accumulates RRs for one owner name before packing them into an
/// [`Entry`]. Mirrors the teacher's builder-then-`finish()` style rather
/// than a constructor that takes every field up front.
pub struct EntryBuilder {
    owner: String,
    rrs: Vec<ResourceRecord>,
    has_soa: bool,
    has_ns: bool,
    has_a: bool,
    has_aaaa: bool,
    has_cname: bool,
    has_txt: bool,
    finished: bool,
}

impl EntryBuilder {
    pub fn new(owner: impl Into<String>) -> Self {
        EntryBuilder {
            owner: owner.into(),
            rrs: Vec::new(),
            has_soa: false,
            has_ns: false,
            has_a: false,
            has_aaaa: false,
            has_cname: false,
            has_txt: false,
            finished: false,
        }
    }

    fn push(&mut self, rclass: RecordClass, ttl: u32, rdata: RData) -> Result<&mut Self, NsblastError> {
        if self.finished {
            return Err(NsblastError::Constraint("entry builder already finished".into()));
        }
        match rdata.record_type() {
            RecordType::NS => self.has_ns = true,
            RecordType::A => self.has_a = true,
            RecordType::AAAA => self.has_aaaa = true,
            RecordType::TXT => self.has_txt = true,
            _ => {}
        }
        self.rrs.push(ResourceRecord::new(self.owner.clone(), rclass, ttl, rdata));
        Ok(self)
    }

    pub fn create_rr(&mut self, rclass: RecordClass, ttl: u32, rdata: RData) -> Result<&mut Self, NsblastError> {
        if rdata.record_type() == RecordType::SOA {
            return Err(NsblastError::Constraint("use create_soa for an SOA record".into()));
        }
        self.push(rclass, ttl, rdata)
    }

    pub fn create_soa(&mut self, ttl: u32, soa: SoaData) -> Result<&mut Self, NsblastError> {
        if self.has_soa {
            return Err(NsblastError::Constraint("entry already has an SOA".into()));
        }
        self.has_soa = true;
        self.push(RecordClass::Internet, ttl, RData::Soa(soa))
    }

    pub fn create_cname(&mut self, ttl: u32, target: impl Into<String>) -> Result<&mut Self, NsblastError> {
        self.has_cname = true;
        self.push(RecordClass::Internet, ttl, RData::Cname(target.into()))
    }

    pub fn create_ns(&mut self, ttl: u32, nameserver: impl Into<String>) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::Ns(nameserver.into()))
    }

    pub fn create_mx(&mut self, ttl: u32, preference: u16, exchange: impl Into<String>) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::Mx { preference, exchange: exchange.into() })
    }

    /// Splits `text` into RFC 1035 `<character-string>` chunks of at
    /// most 255 bytes each automatically.
    pub fn create_txt(&mut self, ttl: u32, text: &[u8]) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::Txt(split_into_char_strings(text)))
    }

    pub fn create_srv(
        &mut self,
        ttl: u32,
        priority: u16,
        weight: u16,
        port: u16,
        target: impl Into<String>,
    ) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::Srv { priority, weight, port, target: target.into() })
    }

    pub fn create_a(&mut self, ttl: u32, addr: std::net::Ipv4Addr) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::A(addr))
    }

    pub fn create_aaaa(&mut self, ttl: u32, addr: std::net::Ipv6Addr) -> Result<&mut Self, NsblastError> {
        self.push(RecordClass::Internet, ttl, RData::Aaaa(addr))
    }

    /// Sort RRs into their storage priority order and pack them. Errors
    /// if called more than once or if no RRs were ever added.
    pub fn finish(&mut self) -> Result<Entry, NsblastError> {
        if self.finished {
            return Err(NsblastError::Constraint("finish() called twice on the same entry builder".into()));
        }
        if self.rrs.is_empty() {
            return Err(NsblastError::Constraint("entry has no records to finish".into()));
        }
        self.finished = true;
        self.rrs.sort_by_key(|rr| type_priority(rr.rtype));

        let mut flags = 0u8;
        if self.has_soa {
            flags |= FLAG_HAS_SOA;
        }
        if self.has_ns {
            flags |= FLAG_HAS_NS;
        }
        if self.has_a {
            flags |= FLAG_HAS_A;
        }
        if self.has_aaaa {
            flags |= FLAG_HAS_AAAA;
        }
        if self.has_cname {
            flags |= FLAG_HAS_CNAME;
        }
        if self.has_txt {
            flags |= FLAG_HAS_TXT;
        }

        // Packing here (rather than lazily) surfaces any encoding error
        // at finish() time instead of on a later, harder-to-trace write.
        let bytes = pack(&self.owner, &self.rrs, flags)?;
        let index = parse_index(&bytes, u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize)?;

        Ok(Entry { owner: self.owner.clone(), flags, rrs: std::mem::take(&mut self.rrs), index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn soa() -> SoaData {
        SoaData {
            mname: "ns1.example.com".into(),
            rname: "hostmaster.example.com".into(),
            serial: 1,
            refresh: 3600,
            retry: 900,
            expire: 604800,
            minimum: 300,
        }
    }

    #[test]
    fn entry_roundtrips_soa_and_a() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_soa(3600, soa()).unwrap();
        builder.create_a(300, Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let entry = builder.finish().unwrap();
        assert!(entry.has_soa());
        assert!(entry.has_a());
        assert!(!entry.has_ns());

        let bytes = entry.to_bytes().unwrap();
        let parsed = Entry::parse(&bytes).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.soa().unwrap().serial, 1);
    }

    #[test]
    fn has_type_finds_every_stored_type_and_nothing_else() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_soa(3600, soa()).unwrap();
        builder.create_ns(3600, "ns1.example.com").unwrap();
        let entry = builder.finish().unwrap();
        assert!(entry.has_type(RecordType::SOA));
        assert!(entry.has_type(RecordType::NS));
        assert!(!entry.has_type(RecordType::A));
        assert!(!entry.has_type(RecordType::TXT));
    }

    #[test]
    fn rejects_second_soa() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_soa(3600, soa()).unwrap();
        assert!(builder.create_soa(3600, soa()).is_err());
    }

    #[test]
    fn rejects_double_finish() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_a(300, Ipv4Addr::new(1, 1, 1, 1)).unwrap();
        builder.finish().unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn rejects_empty_entry() {
        let mut builder = EntryBuilder::new("example.com");
        assert!(builder.finish().is_err());
    }

    #[test]
    fn replace_soa_keeps_other_rrs() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_soa(3600, soa()).unwrap();
        builder.create_ns(3600, "ns1.example.com").unwrap();
        let mut entry = builder.finish().unwrap();

        let mut new_soa = soa();
        new_soa.serial = 2;
        entry.replace_soa(new_soa, 3600).unwrap();

        assert_eq!(entry.soa().unwrap().serial, 2);
        assert!(entry.rrs.iter().any(|rr| rr.rtype == RecordType::NS));
    }

    #[test]
    fn increment_soa_serial_bumps_value() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_soa(3600, soa()).unwrap();
        let mut entry = builder.finish().unwrap();
        assert_eq!(entry.increment_soa_serial().unwrap(), 2);
        assert_eq!(entry.soa().unwrap().serial, 2);
    }

    #[test]
    fn txt_auto_splits_over_255_bytes() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_txt(300, &vec![b'a'; 300]).unwrap();
        let entry = builder.finish().unwrap();
        assert!(entry.has_txt());
        match &entry.rrs[0].rdata {
            RData::Txt(chunks) => assert_eq!(chunks.len(), 2),
            other => panic!("expected TXT rdata, got {other:?}"),
        }
    }

    #[test]
    fn owner_name_is_deduped_across_rrs() {
        let mut builder = EntryBuilder::new("www.example.com");
        builder.create_a(300, Ipv4Addr::new(1, 1, 1, 1)).unwrap();
        builder.create_a(300, Ipv4Addr::new(2, 2, 2, 2)).unwrap();
        let entry = builder.finish().unwrap();
        let bytes = entry.to_bytes().unwrap();
        // Second RR's owner name collapses to a 2-byte pointer instead
        // of repeating "www.example.com" (17 bytes on the wire) again.
        let naive_size = HEADER_LEN + 2 * (21 + 2 + 2 + 4 + 2 + 4);
        assert!(bytes.len() < naive_size);
    }

    #[test]
    fn tombstone_is_recorded_and_preserved_across_repacking() {
        let mut builder = EntryBuilder::new("example.com");
        builder.create_a(300, Ipv4Addr::new(1, 1, 1, 1)).unwrap();
        let mut entry = builder.finish().unwrap();
        entry.tombstone();
        let bytes = entry.to_bytes().unwrap();
        let parsed = Entry::parse(&bytes).unwrap();
        assert!(parsed.is_tombstone());
    }

    #[test]
    fn header_records_label_section_and_zone_suffix_lengths() {
        let mut builder = EntryBuilder::new("www.example.com");
        builder.create_a(300, Ipv4Addr::new(1, 1, 1, 1)).unwrap();
        let entry = builder.finish().unwrap();
        let bytes = entry.to_bytes().unwrap();
        let label_section_len = u16::from_be_bytes([bytes[4], bytes[5]]);
        let zone_suffix_len = bytes[6];
        // "www" + "example" + "com" + root terminator, each length-prefixed.
        assert_eq!(label_section_len, 3 + 1 + 7 + 1 + 3 + 1 + 1);
        assert_eq!(zone_suffix_len, 3);
    }
}
