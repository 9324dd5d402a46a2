//! DNS wire message framing: header + four record sections, with
//! compression-aware encoding and truncation handling.

pub mod header;
pub mod label;
pub mod rdata;
pub mod rr;

pub use header::{Header, HEADER_BYTES};
pub use rdata::{RData, SoaData};
pub use rr::{Question, ResourceRecord};

use crate::enums::Rcode;
use crate::error::NsblastError;
use label::NameCompressor;

/// RFC 1035's historical UDP ceiling, used as the default response
/// budget for clients that send no EDNS0 OPT record.
pub const DEFAULT_UDP_PAYLOAD: usize = 512;
/// A ceiling on the UDP payload size a client may advertise via OPT;
/// values above this are clamped rather than trusted verbatim.
pub const MAX_UDP_PAYLOAD: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    pub fn parse(buf: &[u8]) -> Result<Message, NsblastError> {
        let header = Header::parse(buf)?;
        let mut offset = HEADER_BYTES;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (q, next) = Question::parse(buf, offset)?;
            questions.push(q);
            offset = next;
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (rr, next) = ResourceRecord::parse(buf, offset)?;
            answers.push(rr);
            offset = next;
        }

        let mut authorities = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let (rr, next) = ResourceRecord::parse(buf, offset)?;
            authorities.push(rr);
            offset = next;
        }

        let mut additionals = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            let (rr, next) = ResourceRecord::parse(buf, offset)?;
            additionals.push(rr);
            offset = next;
        }

        Ok(Message { header, questions, answers, authorities, additionals })
    }

    /// The first OPT pseudo-RR among the additionals, if the sender
    /// included EDNS0 metadata.
    pub fn opt(&self) -> Option<&ResourceRecord> {
        self.additionals.iter().find(|rr| rr.is_opt())
    }

    /// The effective response size budget: the client's advertised OPT
    /// UDP payload size (clamped to a sane range), or the RFC 1035
    /// default if no OPT record was sent. TCP transport ignores this and
    /// relies on its own 2-byte length prefix instead.
    pub fn max_udp_payload(&self) -> usize {
        match self.opt() {
            Some(opt) => (opt.opt_udp_payload_size() as usize).clamp(DEFAULT_UDP_PAYLOAD, MAX_UDP_PAYLOAD),
            None => DEFAULT_UDP_PAYLOAD,
        }
    }

    /// Build an empty answer to `self` carrying just `rcode`, no
    /// records. Used for FORMERR/SERVFAIL/REFUSED/NXDOMAIN replies that
    /// don't echo any RRs back.
    pub fn error_response(request_header: Header, rcode: Rcode) -> Message {
        let mut header = request_header.as_answer();
        header.rcode = rcode;
        header.qdcount = 0;
        header.ancount = 0;
        header.nscount = 0;
        header.arcount = 0;
        Message { header, ..Message::default() }
    }

    /// Serialize, dropping whole RRs from the end of additionals (except
    /// any OPT record, which always survives), then authorities, then
    /// answers, until the message fits `max_size`. Sets the TC bit if
    /// anything had to be dropped. Mirrors RFC 1035 §4.1.1's "sections
    /// are truncated starting at the end" rule.
    pub fn to_bytes_truncating(&self, max_size: usize) -> Result<Vec<u8>, NsblastError> {
        let mut answers = self.answers.clone();
        let mut authorities = self.authorities.clone();
        let mut additionals = self.additionals.clone();
        let mut truncated = false;

        let mut bytes = build_once(self.header, &self.questions, &answers, &authorities, &additionals)?;
        while bytes.len() > max_size {
            truncated = true;
            if let Some(pos) = additionals.iter().rposition(|rr| !rr.is_opt()) {
                additionals.remove(pos);
            } else if !authorities.is_empty() {
                authorities.pop();
            } else if !answers.is_empty() {
                answers.pop();
            } else {
                // Header, questions and any surviving OPT record alone
                // already exceed the budget; nothing left to drop.
                break;
            }
            bytes = build_once(self.header, &self.questions, &answers, &authorities, &additionals)?;
        }

        if truncated {
            let mut header = self.header;
            header.truncated = true;
            bytes = build_once(header, &self.questions, &answers, &authorities, &additionals)?;
        }

        Ok(bytes)
    }
}

fn build_once(
    mut header: Header,
    questions: &[Question],
    answers: &[ResourceRecord],
    authorities: &[ResourceRecord],
    additionals: &[ResourceRecord],
) -> Result<Vec<u8>, NsblastError> {
    header.qdcount = questions.len() as u16;
    header.ancount = answers.len() as u16;
    header.nscount = authorities.len() as u16;
    header.arcount = additionals.len() as u16;

    let mut buf = header.to_bytes()?.to_vec();
    let mut compressor = NameCompressor::new();
    for q in questions {
        q.write(&mut buf, 0, &mut compressor);
    }
    for rr in answers.iter().chain(authorities).chain(additionals) {
        rr.write(&mut buf, 0, &mut compressor);
    }
    Ok(buf)
}
