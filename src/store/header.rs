use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Result, SendaError};
use crate::store::{HEADER_SLOTS, MIN_SEGMENT_SIZE};

const MARKER: [u8; 2] = *b"GH";

/// Byte offset where segment data begins in a store file: length-prefixed
/// marker (4) + logical length (8) + segment size (4) + header slots.
pub const HEADER_OFFSET: u64 = (16 + 4 * HEADER_SLOTS) as u64;

/// The fixed header region at the start of every store file.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StoreHeader {
    pub length: i64,
    pub segment_size: i32,
    pub slots: [i32; HEADER_SLOTS],
}

impl StoreHeader {
    pub(crate) fn encode(&self) -> [u8; HEADER_OFFSET as usize] {
        let mut buf = [0u8; HEADER_OFFSET as usize];
        buf[0..2].copy_from_slice(&(MARKER.len() as u16).to_le_bytes());
        buf[2..4].copy_from_slice(&MARKER);
        buf[4..12].copy_from_slice(&self.length.to_le_bytes());
        buf[12..16].copy_from_slice(&self.segment_size.to_le_bytes());
        for (i, slot) in self.slots.iter().enumerate() {
            let at = 16 + i * 4;
            buf[at..at + 4].copy_from_slice(&slot.to_le_bytes());
        }
        buf
    }

    pub(crate) fn decode(buf: &[u8], name: &str) -> Result<Self> {
        if buf.len() < HEADER_OFFSET as usize {
            return Err(SendaError::Corruption(format!(
                "store {name}: header shorter than {HEADER_OFFSET} bytes"
            )));
        }
        let marker_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        if marker_len != MARKER.len() || buf[2..4] != MARKER {
            return Err(SendaError::Corruption(format!(
                "store {name}: invalid format marker, expected \"GH\""
            )));
        }
        let length = i64::from_le_bytes(buf[4..12].try_into().expect("slice is 8 bytes"));
        let segment_size = i32::from_le_bytes(buf[12..16].try_into().expect("slice is 4 bytes"));
        if length < 0 {
            return Err(SendaError::Corruption(format!(
                "store {name}: negative stored length {length}"
            )));
        }
        if segment_size < MIN_SEGMENT_SIZE as i32 || !(segment_size as u32).is_power_of_two() {
            return Err(SendaError::Corruption(format!(
                "store {name}: invalid stored segment size {segment_size}"
            )));
        }
        let mut slots = [0i32; HEADER_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            let at = 16 + i * 4;
            *slot = i32::from_le_bytes(buf[at..at + 4].try_into().expect("slice is 4 bytes"));
        }
        Ok(Self {
            length,
            segment_size,
            slots,
        })
    }

    pub(crate) fn read_from(file: &mut File, name: &str) -> Result<Self> {
        let mut buf = [0u8; HEADER_OFFSET as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        Self::decode(&buf, name)
    }

    pub(crate) fn write_to(&self, file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut slots = [0i32; HEADER_SLOTS];
        slots[0] = 7;
        slots[19] = -3;
        let header = StoreHeader {
            length: 1 << 22,
            segment_size: 1 << 20,
            slots,
        };
        let decoded = StoreHeader::decode(&header.encode(), "nodes").expect("decode");
        assert_eq!(decoded.length, header.length);
        assert_eq!(decoded.segment_size, header.segment_size);
        assert_eq!(decoded.slots, header.slots);
    }

    #[test]
    fn bad_marker_is_corruption() {
        let mut buf = StoreHeader {
            length: 0,
            segment_size: 1 << 20,
            slots: [0; HEADER_SLOTS],
        }
        .encode();
        buf[2] = b'X';
        let err = StoreHeader::decode(&buf, "nodes").unwrap_err();
        assert!(err.to_string().contains("invalid format marker"));
    }

    #[test]
    fn bad_segment_size_is_corruption() {
        let mut header = StoreHeader {
            length: 0,
            segment_size: 1 << 20,
            slots: [0; HEADER_SLOTS],
        };
        header.segment_size = 100;
        let err = StoreHeader::decode(&header.encode(), "edges").unwrap_err();
        assert!(err.to_string().contains("invalid stored segment size"));
    }
}
