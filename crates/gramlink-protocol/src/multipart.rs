//! Multipart fragment sub-header.
//!
//! Layout, 16 bytes, big-endian:
//!
//! ```text
//! +------+-------+-------+------+--------+---------+-------------+-----------+
//! | 0xFE | inner | flags | rsvd | msg_id | part_no | total_parts | total_len |
//! |  u8  |  u8   |  u8   |  u8  |  u32   |   u16   |     u16     |    u32    |
//! +------+-------+-------+------+--------+---------+-------------+-----------+
//! ```
//!
//! `part_no` counts from 1. `inner` and `flags` describe the original message so the
//! receiver can rebuild it without any other context.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use gramlink_core::{
    constants::{MULTIPART_HEADER_SIZE, MULTIPART_TYPE},
    error::{ErrorKind, Result},
};

use crate::message::MessageFlags;

/// Describes where one fragment sits inside the original message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultipartHeader {
    /// Type byte of the original message.
    pub inner_kind: u8,
    /// Flags of the original message.
    pub flags: MessageFlags,
    /// Sender-wide id shared by all fragments of one message.
    pub msg_id: u32,
    /// Position of this fragment, 1-based.
    pub part_no: u16,
    /// Number of fragments the message was split into.
    pub total_parts: u16,
    /// Length of the original payload.
    pub total_len: u32,
}

impl MultipartHeader {
    /// Appends the encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(MULTIPART_TYPE)?;
        buf.write_u8(self.inner_kind)?;
        buf.write_u8(self.flags.to_bits())?;
        buf.write_u8(0)?;
        buf.write_u32::<BigEndian>(self.msg_id)?;
        buf.write_u16::<BigEndian>(self.part_no)?;
        buf.write_u16::<BigEndian>(self.total_parts)?;
        buf.write_u32::<BigEndian>(self.total_len)?;
        Ok(())
    }

    /// Splits a fragment block payload into its header and chunk.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8])> {
        if payload.len() < MULTIPART_HEADER_SIZE {
            return Err(ErrorKind::MalformedDatagram(format!(
                "multipart block of {} bytes is shorter than its header",
                payload.len()
            )));
        }
        let mut cursor = Cursor::new(&payload[..MULTIPART_HEADER_SIZE]);
        let marker = cursor.read_u8()?;
        if marker != MULTIPART_TYPE {
            return Err(ErrorKind::MalformedDatagram(format!("bad multipart marker {:#04x}", marker)));
        }
        let inner_kind = cursor.read_u8()?;
        let flags = MessageFlags::from_bits(cursor.read_u8()?);
        let _reserved = cursor.read_u8()?;
        let msg_id = cursor.read_u32::<BigEndian>()?;
        let part_no = cursor.read_u16::<BigEndian>()?;
        let total_parts = cursor.read_u16::<BigEndian>()?;
        let total_len = cursor.read_u32::<BigEndian>()?;

        if total_parts == 0 || part_no == 0 || part_no > total_parts {
            return Err(ErrorKind::MalformedDatagram(format!(
                "multipart part {} of {} for message {}",
                part_no, total_parts, msg_id
            )));
        }

        let header = Self { inner_kind, flags, msg_id, part_no, total_parts, total_len };
        Ok((header, &payload[MULTIPART_HEADER_SIZE..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> MultipartHeader {
        MultipartHeader {
            inner_kind: 0x21,
            flags: MessageFlags::RELIABLE.with_scatter(),
            msg_id: 0xDEAD_BEEF,
            part_no: 2,
            total_parts: 5,
            total_len: 1000,
        }
    }

    #[test]
    fn test_header_is_sixteen_bytes() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), MULTIPART_HEADER_SIZE);
        assert_eq!(buf[0], MULTIPART_TYPE);
        assert_eq!(&buf[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_parse_splits_chunk() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        buf.extend_from_slice(b"chunk");

        let (parsed, chunk) = MultipartHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header());
        assert_eq!(chunk, b"chunk");
    }

    #[test]
    fn test_parse_rejects_inconsistent_part_numbers() {
        for (part_no, total_parts) in [(0, 3), (4, 3), (1, 0)] {
            let mut buf = Vec::new();
            MultipartHeader { part_no, total_parts, ..header() }.write_to(&mut buf).unwrap();
            assert!(MultipartHeader::parse(&buf).is_err());
        }
    }

    #[test]
    fn test_parse_rejects_short_payload() {
        assert!(MultipartHeader::parse(&[MULTIPART_TYPE; 10]).is_err());
    }
}
