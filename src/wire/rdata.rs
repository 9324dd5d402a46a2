//! Typed RDATA views.
//!
//! The teacher's `InternalResourceRecord`/`rdata.rs` pair owns its data as
//! an enum-per-type with named fields; that shape is kept here, but the
//! parsing/writing logic is new since the teacher never implements
//! compression-aware rdata (de)serialization. `RData::parse` takes the
//! *whole* message buffer (not just the rdata slice) because an embedded
//! domain name (an NS target, say) may carry a compression pointer back
//! into the message outside the RR's own rdata window.

use crate::enums::RecordType;
use crate::error::NsblastError;
use crate::wire::label::{fqdn_to_labels, labels_to_fqdn, parse_labels, NameCompressor};
use std::net::{Ipv4Addr, Ipv6Addr};

fn malformed(msg: impl Into<String>) -> NsblastError {
    NsblastError::Malformed(msg.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaData {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Cname(String),
    Soa(SoaData),
    Ptr(String),
    Mx { preference: u16, exchange: String },
    /// One or more RFC 1035 `<character-string>`s, concatenated to form
    /// the RR's text; each chunk is at most 255 bytes.
    Txt(Vec<Vec<u8>>),
    Srv { priority: u16, weight: u16, port: u16, target: String },
    Hinfo { cpu: String, os: String },
    Rp { mbox: String, txt: String },
    Afsdb { subtype: u16, hostname: String },
    Opt { udp_payload_size: u16, extended_rcode: u8, version: u8, flags: u16 },
}

impl RData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::AAAA,
            RData::Ns(_) => RecordType::NS,
            RData::Cname(_) => RecordType::CNAME,
            RData::Soa(_) => RecordType::SOA,
            RData::Ptr(_) => RecordType::PTR,
            RData::Mx { .. } => RecordType::MX,
            RData::Txt(_) => RecordType::TXT,
            RData::Srv { .. } => RecordType::SRV,
            RData::Hinfo { .. } => RecordType::HINFO,
            RData::Rp { .. } => RecordType::RP,
            RData::Afsdb { .. } => RecordType::AFSDB,
            RData::Opt { .. } => RecordType::OPT,
        }
    }

    /// Parse `len` bytes of rdata starting at `offset` within the full
    /// message `msg` (so embedded names can chase pointers outside the
    /// rdata window).
    pub fn parse(rtype: RecordType, msg: &[u8], offset: usize, len: usize) -> Result<RData, NsblastError> {
        let end = offset.checked_add(len).ok_or_else(|| malformed("rdata length overflow"))?;
        if end > msg.len() {
            return Err(malformed("rdata runs past end of message"));
        }
        let slice = &msg[offset..end];
        match rtype {
            RecordType::A => {
                if len != 4 {
                    return Err(malformed("A rdata must be 4 bytes"));
                }
                Ok(RData::A(Ipv4Addr::new(slice[0], slice[1], slice[2], slice[3])))
            }
            RecordType::AAAA => {
                if len != 16 {
                    return Err(malformed("AAAA rdata must be 16 bytes"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(slice);
                Ok(RData::Aaaa(Ipv6Addr::from(octets)))
            }
            RecordType::NS => Ok(RData::Ns(parse_name_at(msg, offset)?)),
            RecordType::CNAME => Ok(RData::Cname(parse_name_at(msg, offset)?)),
            RecordType::PTR => Ok(RData::Ptr(parse_name_at(msg, offset)?)),
            RecordType::SOA => {
                let (mname, next) = parse_labels(msg, offset)?;
                let (rname, next) = parse_labels(msg, next)?;
                if next + 20 > end {
                    return Err(malformed("truncated SOA rdata"));
                }
                let field = |at: usize| u32::from_be_bytes(msg[at..at + 4].try_into().unwrap());
                Ok(RData::Soa(SoaData {
                    mname: labels_to_fqdn(&mname),
                    rname: labels_to_fqdn(&rname),
                    serial: field(next),
                    refresh: field(next + 4),
                    retry: field(next + 8),
                    expire: field(next + 12),
                    minimum: field(next + 16),
                }))
            }
            RecordType::MX => {
                if len < 2 {
                    return Err(malformed("truncated MX rdata"));
                }
                let preference = u16::from_be_bytes([slice[0], slice[1]]);
                let exchange = parse_name_at(msg, offset + 2)?;
                Ok(RData::Mx { preference, exchange })
            }
            RecordType::SRV => {
                if len < 6 {
                    return Err(malformed("truncated SRV rdata"));
                }
                let priority = u16::from_be_bytes([slice[0], slice[1]]);
                let weight = u16::from_be_bytes([slice[2], slice[3]]);
                let port = u16::from_be_bytes([slice[4], slice[5]]);
                let target = parse_name_at(msg, offset + 6)?;
                Ok(RData::Srv { priority, weight, port, target })
            }
            RecordType::AFSDB => {
                if len < 2 {
                    return Err(malformed("truncated AFSDB rdata"));
                }
                let subtype = u16::from_be_bytes([slice[0], slice[1]]);
                let hostname = parse_name_at(msg, offset + 2)?;
                Ok(RData::Afsdb { subtype, hostname })
            }
            RecordType::TXT => {
                let mut chunks = Vec::new();
                let mut pos = 0;
                while pos < slice.len() {
                    let chunk_len = slice[pos] as usize;
                    pos += 1;
                    if pos + chunk_len > slice.len() {
                        return Err(malformed("truncated TXT character-string"));
                    }
                    chunks.push(slice[pos..pos + chunk_len].to_vec());
                    pos += chunk_len;
                }
                Ok(RData::Txt(chunks))
            }
            RecordType::HINFO => {
                let (cpu, pos) = read_char_string(slice, 0)?;
                let (os, _) = read_char_string(slice, pos)?;
                Ok(RData::Hinfo {
                    cpu: String::from_utf8_lossy(&cpu).into_owned(),
                    os: String::from_utf8_lossy(&os).into_owned(),
                })
            }
            RecordType::RP => {
                let (mbox, next) = parse_labels(msg, offset)?;
                let (txt, _) = parse_labels(msg, next)?;
                Ok(RData::Rp { mbox: labels_to_fqdn(&mbox), txt: labels_to_fqdn(&txt) })
            }
            RecordType::OPT => {
                // OPT rdata (options) is empty for the extended-rcode/
                // udp-size use covered by this server; the udp size and
                // extended rcode actually live in the OPT RR's
                // class/ttl fields, reconstructed by the caller.
                Ok(RData::Opt { udp_payload_size: 0, extended_rcode: 0, version: 0, flags: 0 })
            }
            other => Err(malformed(format!("unsupported rdata type {other}"))),
        }
    }

    /// Append this rdata's wire bytes to `buf`, using `compressor` for
    /// any embedded names. `base` is `buf`'s offset within the overall
    /// message/entry being built.
    pub fn write(&self, buf: &mut Vec<u8>, base: usize, compressor: &mut NameCompressor) {
        match self {
            RData::A(addr) => buf.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            RData::Ns(name) | RData::Cname(name) | RData::Ptr(name) => {
                compressor.write_name(buf, base, &fqdn_to_labels(name));
            }
            RData::Soa(soa) => {
                compressor.write_name(buf, base, &fqdn_to_labels(&soa.mname));
                compressor.write_name(buf, base, &fqdn_to_labels(&soa.rname));
                buf.extend_from_slice(&soa.serial.to_be_bytes());
                buf.extend_from_slice(&soa.refresh.to_be_bytes());
                buf.extend_from_slice(&soa.retry.to_be_bytes());
                buf.extend_from_slice(&soa.expire.to_be_bytes());
                buf.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            RData::Mx { preference, exchange } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                compressor.write_name(buf, base, &fqdn_to_labels(exchange));
            }
            RData::Srv { priority, weight, port, target } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                // RFC 2782: SRV targets are not compressed on the wire.
                for label in fqdn_to_labels(target) {
                    buf.push(label.len() as u8);
                    buf.extend_from_slice(&label);
                }
                buf.push(0);
            }
            RData::Afsdb { subtype, hostname } => {
                buf.extend_from_slice(&subtype.to_be_bytes());
                compressor.write_name(buf, base, &fqdn_to_labels(hostname));
            }
            RData::Txt(chunks) => {
                for chunk in chunks {
                    write_char_string(buf, chunk);
                }
            }
            RData::Hinfo { cpu, os } => {
                write_char_string(buf, cpu.as_bytes());
                write_char_string(buf, os.as_bytes());
            }
            RData::Rp { mbox, txt } => {
                // RP is specified to never use compression (RFC 1183 §2.2).
                for name in [mbox, txt] {
                    for label in fqdn_to_labels(name) {
                        buf.push(label.len() as u8);
                        buf.extend_from_slice(&label);
                    }
                    buf.push(0);
                }
            }
            RData::Opt { .. } => {}
        }
    }
}

fn parse_name_at(msg: &[u8], offset: usize) -> Result<String, NsblastError> {
    let (labels, _) = parse_labels(msg, offset)?;
    Ok(labels_to_fqdn(&labels))
}

fn read_char_string(buf: &[u8], pos: usize) -> Result<(Vec<u8>, usize), NsblastError> {
    let len = *buf.get(pos).ok_or_else(|| malformed("truncated character-string"))? as usize;
    let start = pos + 1;
    let end = start + len;
    if end > buf.len() {
        return Err(malformed("character-string runs past end of rdata"));
    }
    Ok((buf[start..end].to_vec(), end))
}

/// Build a TXT RR's character-string chunks from an arbitrary-length
/// payload, splitting at 255-byte boundaries.
pub fn split_into_char_strings(data: &[u8]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(255).map(|c| c.to_vec()).collect()
}

fn write_char_string(buf: &mut Vec<u8>, data: &[u8]) {
    let truncated = &data[..data.len().min(255)];
    buf.push(truncated.len() as u8);
    buf.extend_from_slice(truncated);
}

/// RFC 1035 §8's email-escaping convention for an SOA RNAME: the local
/// part's literal dots are escaped with a backslash before the `@` is
/// turned into the separating dot. Used only at the REST/zonefile text
/// boundary; the wire form always stores RNAME as plain labels.
pub fn escape_rname_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => format!("{}.{domain}", local.replace('.', "\\.")),
        None => email.to_string(),
    }
}
