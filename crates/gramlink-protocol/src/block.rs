//! Block framing.
//!
//! A datagram body is a run of `{type: u8, size: u8, payload[size]}` blocks. It ends at
//! the end of the buffer or at a `{0, 0}` pair. Anything that does not parse cleanly ends
//! the run: the blocks already read are kept, the remainder is discarded.

use std::io::Write;

use byteorder::WriteBytesExt;
use gramlink_core::{
    constants::{BLOCK_HEADER_SIZE, MAX_BLOCK_PAYLOAD, TERMINATOR_TYPE},
    error::{ErrorKind, Result},
};

/// One framed block borrowed from a datagram body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block<'a> {
    /// Message type byte.
    pub kind: u8,
    /// Block payload.
    pub payload: &'a [u8],
}

/// Appends one block to `body`.
pub fn write_block(body: &mut Vec<u8>, kind: u8, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_BLOCK_PAYLOAD {
        return Err(ErrorKind::MalformedDatagram(format!(
            "block payload of {} bytes exceeds {}",
            payload.len(),
            MAX_BLOCK_PAYLOAD
        )));
    }
    if kind == TERMINATOR_TYPE {
        return Err(ErrorKind::ReservedMessageType(kind));
    }
    body.write_u8(kind)?;
    body.write_u8(payload.len() as u8)?;
    body.write_all(payload)?;
    Ok(())
}

/// Iterates the blocks of a datagram body.
///
/// Yields at most one `Err`, after which iteration stops.
#[derive(Debug)]
pub struct BlockReader<'a> {
    body: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> BlockReader<'a> {
    /// Creates a reader over `body`.
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, offset: 0, done: false }
    }

    fn fail(&mut self, reason: String) -> Option<Result<Block<'a>>> {
        self.done = true;
        Some(Err(ErrorKind::MalformedDatagram(reason)))
    }
}

impl<'a> Iterator for BlockReader<'a> {
    type Item = Result<Block<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let remaining = &self.body[self.offset..];
        if remaining.is_empty() {
            self.done = true;
            return None;
        }
        if remaining.len() < BLOCK_HEADER_SIZE {
            return self.fail(format!("truncated block header at offset {}", self.offset));
        }

        let kind = remaining[0];
        let size = remaining[1] as usize;
        if kind == TERMINATOR_TYPE {
            if size == 0 {
                self.done = true;
                return None;
            }
            return self.fail(format!("block of type 0 with size {} at offset {}", size, self.offset));
        }
        let end = BLOCK_HEADER_SIZE + size;
        if end > remaining.len() {
            return self.fail(format!(
                "block at offset {} claims {} bytes, {} remain",
                self.offset,
                size,
                remaining.len() - BLOCK_HEADER_SIZE
            ));
        }

        self.offset += end;
        Some(Ok(Block { kind, payload: &remaining[BLOCK_HEADER_SIZE..end] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_consecutive_blocks() {
        let mut body = Vec::new();
        write_block(&mut body, 5, b"hello").unwrap();
        write_block(&mut body, 6, b"").unwrap();
        write_block(&mut body, 7, &[9; 255]).unwrap();

        let blocks: Vec<_> = BlockReader::new(&body).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block { kind: 5, payload: b"hello" });
        assert!(blocks[1].payload.is_empty());
        assert_eq!(blocks[2].payload.len(), 255);
    }

    #[test]
    fn test_terminator_stops_early() {
        let mut body = Vec::new();
        write_block(&mut body, 5, b"abc").unwrap();
        body.extend_from_slice(&[0, 0, 7, 1, 1]);

        let blocks: Vec<_> = BlockReader::new(&body).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_ok());
    }

    #[test]
    fn test_overlong_block_discards_remainder() {
        let mut body = Vec::new();
        write_block(&mut body, 5, b"ok").unwrap();
        body.extend_from_slice(&[8, 200, 1, 2, 3]);

        let mut reader = BlockReader::new(&body);
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(ErrorKind::MalformedDatagram(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_zero_type_with_size_is_malformed() {
        let body = [0u8, 3, 1, 2, 3];
        let mut reader = BlockReader::new(&body);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_dangling_header_byte_is_malformed() {
        let mut body = Vec::new();
        write_block(&mut body, 5, b"x").unwrap();
        body.push(9);
        let results: Vec<_> = BlockReader::new(&body).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_write_rejects_oversized_and_terminator() {
        let mut body = Vec::new();
        assert!(write_block(&mut body, 5, &[0; 256]).is_err());
        assert!(write_block(&mut body, TERMINATOR_TYPE, b"x").is_err());
        assert!(body.is_empty());
    }
}
