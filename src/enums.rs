//! DNS protocol enumerations.
//!
//! Layout follows the teacher's `enums.rs`: primitive-enum wrappers driven
//! by `packed_struct` for the header bitfields (`OpCode`, `Rcode`,
//! `PacketType`), and plain `From`/`Display` impls for the record
//! type/class tables. `OpCode` deliberately has no catch-all discriminant:
//! `Header::unpack` failing on an opcode outside {0,1,2,4} is exactly the
//! `MalformedHeader` behavior the design calls for, so we get that
//! validation for free from `packed_struct`'s strictness instead of
//! hand-rolling it.

use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Eq, PartialEq, PrimitiveEnum_u8, Copy, Clone)]
pub enum OpCode {
    /// A standard query (QUERY).
    Query = 0,
    /// Obsolete inverse query, RFC 3425. Still header-valid, unsupported.
    IQuery = 1,
    /// Server status request (STATUS).
    Status = 2,
    /// RFC 1996 NOTIFY.
    Notify = 4,
}

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rcode {
    NoError = 0,
    FormatError = 1,
    ServFail = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
}

#[derive(Debug, PrimitiveEnum_u8, Clone, Copy, Eq, PartialEq)]
pub enum PacketType {
    Query = 0,
    Answer = 1,
}

impl From<bool> for PacketType {
    fn from(input: bool) -> Self {
        match input {
            false => Self::Query,
            true => Self::Answer,
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,
    PTR = 12,
    HINFO = 13,
    MX = 15,
    TXT = 16,
    RP = 17,
    AFSDB = 18,
    AAAA = 28,
    SRV = 33,
    /// Pseudo-RR: EDNS0 metadata, not a stored zone record type.
    OPT = 41,
    /// Query-only pseudo-type meaning "every type".
    ANY = 255,
    /// Query-only pseudo-type for a full zone transfer.
    AXFR = 252,
    /// Query-only pseudo-type for an incremental zone transfer.
    IXFR = 251,
    InvalidType,
}

impl From<u16> for RecordType {
    fn from(input: u16) -> Self {
        match input {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            13 => Self::HINFO,
            15 => Self::MX,
            16 => Self::TXT,
            17 => Self::RP,
            18 => Self::AFSDB,
            28 => Self::AAAA,
            33 => Self::SRV,
            41 => Self::OPT,
            251 => Self::IXFR,
            252 => Self::AXFR,
            255 => Self::ANY,
            _ => Self::InvalidType,
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> u16 {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::RP => 17,
            RecordType::AFSDB => 18,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::OPT => 41,
            RecordType::IXFR => 251,
            RecordType::AXFR => 252,
            RecordType::ANY => 255,
            RecordType::InvalidType => 0,
        }
    }
}

impl From<&str> for RecordType {
    fn from(input: &str) -> Self {
        match input.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "NS" => Self::NS,
            "CNAME" => Self::CNAME,
            "SOA" => Self::SOA,
            "PTR" => Self::PTR,
            "HINFO" => Self::HINFO,
            "MX" => Self::MX,
            "TXT" => Self::TXT,
            "RP" => Self::RP,
            "AFSDB" => Self::AFSDB,
            "AAAA" => Self::AAAA,
            "SRV" => Self::SRV,
            "OPT" => Self::OPT,
            "AXFR" => Self::AXFR,
            "IXFR" => Self::IXFR,
            "ANY" => Self::ANY,
            _ => Self::InvalidType,
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::PTR => "PTR",
            RecordType::HINFO => "HINFO",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::RP => "RP",
            RecordType::AFSDB => "AFSDB",
            RecordType::AAAA => "AAAA",
            RecordType::SRV => "SRV",
            RecordType::OPT => "OPT",
            RecordType::AXFR => "AXFR",
            RecordType::IXFR => "IXFR",
            RecordType::ANY => "ANY",
            RecordType::InvalidType => "INVALID",
        };
        f.write_str(s)
    }
}

impl RecordType {
    /// Types this server will resolve or accept as zone data. `ANY`,
    /// `AXFR` and `IXFR` are query-only and handled by dedicated code
    /// paths rather than the zone-data lookup, so they're excluded here.
    pub fn is_storable(self) -> bool {
        !matches!(
            self,
            RecordType::ANY | RecordType::AXFR | RecordType::IXFR | RecordType::InvalidType
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordClass {
    Internet = 1,
    CsNet = 2,
    Chaos = 3,
    Hesiod = 4,
    InvalidType = 0,
}

impl From<u16> for RecordClass {
    fn from(input: u16) -> Self {
        match input {
            1 => Self::Internet,
            2 => Self::CsNet,
            3 => Self::Chaos,
            4 => Self::Hesiod,
            _ => Self::InvalidType,
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> u16 {
        value as u16
    }
}

impl Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordClass::Internet => "IN",
            RecordClass::CsNet => "CS",
            RecordClass::Chaos => "CH",
            RecordClass::Hesiod => "HS",
            RecordClass::InvalidType => "INVALID",
        })
    }
}

/// QTYPE=ANY minimization policy, §4.5 of the design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnyResponseMode {
    All,
    #[default]
    Relevant,
    Hinfo,
}
