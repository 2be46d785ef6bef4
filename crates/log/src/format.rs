//! Segment and record binary layout.
//!
//! ```text
//! segment file:
//!   [ header: 24 bytes ][ record ][ record ] ...
//!
//! header:
//!   magic (4) | format_version (4) | segment_number (8) | reserved (8)
//!
//! record:
//!   len (4, payload length) | payload (rmp-serde encoded LogRecord<K>) | crc32 (4, over payload)
//! ```
//!
//! Grounded on the teacher's `format::wal_record` segment framing
//! (magic/version/segment-number header, CRC32'd length-prefixed records);
//! this repo's payload is an `ordo_core::LogRecord<K>` rather than a
//! writeset, since the log here records individual reads and state
//! transitions, not just commit-time writesets (see `DESIGN.md`).

/// Magic bytes identifying an Ordo log segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"ORDO";

/// Current segment format version.
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of the segment header, in bytes.
pub const SEGMENT_HEADER_SIZE: usize = 24;

/// A segment file's fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Must equal [`SEGMENT_MAGIC`] for the segment to be considered valid.
    pub magic: [u8; 4],
    /// Format version, for forward compatibility.
    pub format_version: u32,
    /// This segment's position in the rotation order.
    pub segment_number: u64,
    /// Reserved for future use; always zero.
    pub reserved: u64,
}

impl SegmentHeader {
    /// Build a header for a freshly created segment.
    pub fn new(segment_number: u64) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            segment_number,
            reserved: 0,
        }
    }

    /// Encode to the fixed-size on-disk representation.
    pub fn to_bytes(self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.segment_number.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.reserved.to_le_bytes());
        bytes
    }

    /// Decode from a fixed-size buffer. Returns `None` on a magic mismatch.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Option<Self> {
        let magic: [u8; 4] = bytes[0..4].try_into().ok()?;
        if magic != SEGMENT_MAGIC {
            return None;
        }
        Some(SegmentHeader {
            magic,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            segment_number: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            reserved: u64::from_le_bytes(bytes[16..24].try_into().ok()?),
        })
    }
}

/// Frame a payload for on-disk storage: `len | payload | crc32(payload)`.
pub fn frame_record(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + payload.len() + 4);
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    framed.extend_from_slice(&hasher.finalize().to_le_bytes());
    framed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = SegmentHeader::new(7);
        let bytes = header.to_bytes();
        assert_eq!(SegmentHeader::from_bytes(&bytes), Some(header));
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = SegmentHeader::new(1).to_bytes();
        bytes[0] = b'X';
        assert_eq!(SegmentHeader::from_bytes(&bytes), None);
    }

    #[test]
    fn frame_record_is_well_formed() {
        let framed = frame_record(b"hello");
        let len = u32::from_le_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, 5);
        assert_eq!(&framed[4..9], b"hello");
    }
}
