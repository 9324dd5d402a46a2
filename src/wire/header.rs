//! The 12-byte DNS message header, RFC 1035 §4.1.1.
//!
//! Kept on `packed_struct` exactly as the teacher's `Header` does — the
//! bitfield layout is identical down to the field order. The opcode
//! enum's strictness (see `enums::OpCode`) gives us "reject any opcode
//! outside {0,1,2,4}" for free; everything else the design's validation
//! list calls for is checked explicitly in `Header::parse`.

use crate::enums::{OpCode, PacketType, Rcode};
use crate::error::NsblastError;
use packed_struct::prelude::*;

pub const HEADER_BYTES: usize = 12;

#[derive(Debug, PackedStruct, PartialEq, Eq, Clone, Copy)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12")]
pub struct Header {
    #[packed_field(bits = "0..=15", endian = "msb")]
    pub id: u16,
    #[packed_field(bits = "16", ty = "enum")]
    pub qr: PacketType,
    #[packed_field(bits = "17..=20", ty = "enum")]
    pub opcode: OpCode,
    #[packed_field(bits = "21")]
    pub authoritative: bool,
    #[packed_field(bits = "22")]
    pub truncated: bool,
    #[packed_field(bits = "23")]
    pub recursion_desired: bool,
    #[packed_field(bits = "24")]
    pub recursion_available: bool,
    /// Reserved, must be 0 on input.
    #[packed_field(bits = "25")]
    pub z: bool,
    #[packed_field(bits = "26")]
    pub ad: bool,
    #[packed_field(bits = "27")]
    pub cd: bool,
    #[packed_field(bits = "28..=31", ty = "enum")]
    pub rcode: Rcode,
    #[packed_field(bits = "32..=47", endian = "msb")]
    pub qdcount: u16,
    #[packed_field(bits = "48..=63", endian = "msb")]
    pub ancount: u16,
    #[packed_field(bits = "64..=79", endian = "msb")]
    pub nscount: u16,
    #[packed_field(bits = "80..=95", endian = "msb")]
    pub arcount: u16,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            id: 0,
            qr: PacketType::Query,
            opcode: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            z: false,
            ad: false,
            cd: false,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }
}

impl Header {
    /// Parse and validate the header bytes per the design's §4.1 rules.
    pub fn parse(buf: &[u8]) -> Result<Header, NsblastError> {
        if buf.len() < HEADER_BYTES {
            return Err(NsblastError::Malformed("message shorter than header".into()));
        }
        let mut raw = [0u8; HEADER_BYTES];
        raw.copy_from_slice(&buf[..HEADER_BYTES]);
        let header = Header::unpack(&raw)
            .map_err(|e| NsblastError::Malformed(format!("bad header: {e}")))?;

        if header.z {
            return Err(NsblastError::Malformed("reserved Z bit set".into()));
        }

        if header.qr == PacketType::Query {
            if header.ancount != 0 {
                return Err(NsblastError::Malformed("query has nonzero ancount".into()));
            }
            if header.authoritative {
                return Err(NsblastError::Malformed("query has AA set".into()));
            }
            if header.recursion_available {
                return Err(NsblastError::Malformed("query has RA set".into()));
            }
            if header.rcode != Rcode::NoError {
                return Err(NsblastError::Malformed("query has nonzero rcode".into()));
            }
        }

        Ok(header)
    }

    pub fn to_bytes(self) -> Result<[u8; HEADER_BYTES], NsblastError> {
        self.pack()
            .map_err(|e| NsblastError::Internal(format!("failed to pack header: {e}")))
    }

    pub fn as_answer(mut self) -> Self {
        self.qr = PacketType::Answer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_bytes(opcode: u8) -> [u8; HEADER_BYTES] {
        let mut buf = [0u8; HEADER_BYTES];
        buf[2] = opcode << 3;
        buf[4] = 0;
        buf[5] = 1; // qdcount=1
        buf
    }

    #[test]
    fn accepts_standard_query() {
        let buf = query_bytes(0);
        let header = Header::parse(&buf).unwrap();
        assert_eq!(header.opcode, OpCode::Query);
        assert_eq!(header.qdcount, 1);
    }

    #[test]
    fn rejects_reserved_opcode() {
        let buf = query_bytes(5);
        assert!(Header::parse(&buf).is_err());
    }

    #[test]
    fn rejects_z_bit() {
        let mut buf = query_bytes(0);
        buf[3] |= 0b0100_0000;
        assert!(Header::parse(&buf).is_err());
    }

    #[test]
    fn rejects_query_with_nonzero_ancount() {
        let mut buf = query_bytes(0);
        buf[6] = 1;
        assert!(Header::parse(&buf).is_err());
    }

    #[test]
    fn round_trips() {
        let header = Header {
            id: 0xd601,
            qr: PacketType::Answer,
            opcode: OpCode::Query,
            authoritative: true,
            qdcount: 1,
            ancount: 1,
            ..Header::default()
        };
        let bytes = header.to_bytes().unwrap();
        let parsed = Header::unpack(&bytes).unwrap();
        assert_eq!(parsed, header);
    }
}
