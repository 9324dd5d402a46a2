//! Question and resource record framing.
//!
//! A `ResourceRecord` keeps its CLASS/TTL fields raw (`u16`/`u32`) rather
//! than typed, because the OPT pseudo-RR (RFC 6891) repurposes both: CLASS
//! becomes the requestor's UDP payload size and TTL is split into
//! extended-rcode/version/flags. Normal records get a typed `rclass()`
//! accessor; OPT records get `opt_*` accessors. This mirrors how the
//! teacher keeps `InternalResourceRecord` thin and pushes interpretation
//! out to accessor methods rather than a record-type union of structs.

use crate::enums::{RecordClass, RecordType};
use crate::error::NsblastError;
use crate::wire::label::{fqdn_to_labels, labels_to_fqdn, parse_labels, NameCompressor};
use crate::wire::rdata::RData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub qname: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn parse(buf: &[u8], offset: usize) -> Result<(Question, usize), NsblastError> {
        let (labels, next) = parse_labels(buf, offset)?;
        if next + 4 > buf.len() {
            return Err(NsblastError::Malformed("truncated question".into()));
        }
        let qtype = RecordType::from(u16::from_be_bytes([buf[next], buf[next + 1]]));
        let qclass = RecordClass::from(u16::from_be_bytes([buf[next + 2], buf[next + 3]]));
        Ok((
            Question { qname: labels_to_fqdn(&labels), qtype, qclass },
            next + 4,
        ))
    }

    pub fn write(&self, buf: &mut Vec<u8>, base: usize, compressor: &mut NameCompressor) {
        compressor.write_name(buf, base, &fqdn_to_labels(&self.qname));
        buf.extend_from_slice(&u16::from(self.qtype).to_be_bytes());
        buf.extend_from_slice(&u16::from(self.qclass).to_be_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    class_raw: u16,
    ttl_raw: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, rclass: RecordClass, ttl: u32, rdata: RData) -> Self {
        ResourceRecord {
            name: name.into(),
            rtype: rdata.record_type(),
            class_raw: rclass.into(),
            ttl_raw: ttl,
            rdata,
        }
    }

    /// Build the pseudo-RR that carries EDNS0 metadata: owner is the
    /// root, CLASS holds the requestor's UDP payload size, and TTL packs
    /// `extended_rcode << 24 | version << 16 | flags`.
    pub fn opt(udp_payload_size: u16, extended_rcode_high: u8, version: u8, do_bit: bool) -> Self {
        let flags: u16 = if do_bit { 0x8000 } else { 0 };
        ResourceRecord {
            name: ".".into(),
            rtype: RecordType::OPT,
            class_raw: udp_payload_size,
            ttl_raw: ((extended_rcode_high as u32) << 24) | ((version as u32) << 16) | flags as u32,
            rdata: RData::Opt {
                udp_payload_size,
                extended_rcode: extended_rcode_high,
                version,
                flags,
            },
        }
    }

    pub fn rclass(&self) -> RecordClass {
        RecordClass::from(self.class_raw)
    }

    pub fn ttl(&self) -> u32 {
        self.ttl_raw
    }

    pub fn is_opt(&self) -> bool {
        self.rtype == RecordType::OPT
    }

    pub fn opt_udp_payload_size(&self) -> u16 {
        self.class_raw
    }

    pub fn opt_extended_rcode_high(&self) -> u8 {
        (self.ttl_raw >> 24) as u8
    }

    pub fn opt_version(&self) -> u8 {
        (self.ttl_raw >> 16) as u8
    }

    pub fn opt_do_bit(&self) -> bool {
        self.ttl_raw & 0x8000 != 0
    }

    /// Parse one RR starting at `offset`. `is_question` callers should
    /// use [`Question::parse`] instead; this is for answer/authority/
    /// additional sections only.
    pub fn parse(buf: &[u8], offset: usize) -> Result<(ResourceRecord, usize), NsblastError> {
        let (labels, next) = parse_labels(buf, offset)?;
        if next + 10 > buf.len() {
            return Err(NsblastError::Malformed("truncated resource record".into()));
        }
        let rtype = RecordType::from(u16::from_be_bytes([buf[next], buf[next + 1]]));
        let class_raw = u16::from_be_bytes([buf[next + 2], buf[next + 3]]);
        let ttl_raw = u32::from_be_bytes([buf[next + 4], buf[next + 5], buf[next + 6], buf[next + 7]]);
        let rdlength = u16::from_be_bytes([buf[next + 8], buf[next + 9]]) as usize;
        let rdata_start = next + 10;
        let rdata_end = rdata_start
            .checked_add(rdlength)
            .ok_or_else(|| NsblastError::Malformed("rdlength overflow".into()))?;
        if rdata_end > buf.len() {
            return Err(NsblastError::Malformed("rdata runs past end of message".into()));
        }
        let rdata = RData::parse(rtype, buf, rdata_start, rdlength)?;
        Ok((
            ResourceRecord {
                name: labels_to_fqdn(&labels),
                rtype,
                class_raw,
                ttl_raw,
                rdata,
            },
            rdata_end,
        ))
    }

    pub fn write(&self, buf: &mut Vec<u8>, base: usize, compressor: &mut NameCompressor) {
        compressor.write_name(buf, base, &fqdn_to_labels(&self.name));
        buf.extend_from_slice(&u16::from(self.rtype).to_be_bytes());
        buf.extend_from_slice(&self.class_raw.to_be_bytes());
        buf.extend_from_slice(&self.ttl_raw.to_be_bytes());

        let rdlen_at = base + buf.len();
        buf.extend_from_slice(&[0, 0]);
        let rdata_base = base + buf.len();
        let before = buf.len();
        self.rdata.write(buf, rdata_base, compressor);
        let rdlen = (buf.len() - before) as u16;
        buf[rdlen_at - base..rdlen_at - base + 2].copy_from_slice(&rdlen.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn question_roundtrips() {
        let q = Question { qname: "example.com".into(), qtype: RecordType::A, qclass: RecordClass::Internet };
        let mut buf = Vec::new();
        let mut compressor = NameCompressor::new();
        q.write(&mut buf, 0, &mut compressor);
        let (parsed, next) = Question::parse(&buf, 0).unwrap();
        assert_eq!(parsed, q);
        assert_eq!(next, buf.len());
    }

    #[test]
    fn rr_roundtrips_with_rdlength() {
        let rr = ResourceRecord::new("example.com", RecordClass::Internet, 300, RData::A(Ipv4Addr::new(1, 2, 3, 4)));
        let mut buf = Vec::new();
        let mut compressor = NameCompressor::new();
        rr.write(&mut buf, 0, &mut compressor);
        let (parsed, next) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(parsed, rr);
        assert_eq!(next, buf.len());
    }

    #[test]
    fn opt_record_round_trips_fields() {
        let opt = ResourceRecord::opt(4096, 0, 0, true);
        let mut buf = Vec::new();
        let mut compressor = NameCompressor::new();
        opt.write(&mut buf, 0, &mut compressor);
        let (parsed, _) = ResourceRecord::parse(&buf, 0).unwrap();
        assert!(parsed.is_opt());
        assert_eq!(parsed.opt_udp_payload_size(), 4096);
        assert!(parsed.opt_do_bit());
    }

    #[test]
    fn rejects_truncated_rr_header() {
        let buf = vec![0];
        assert!(ResourceRecord::parse(&buf, 0).is_err());
    }
}
