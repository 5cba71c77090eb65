use crate::error::DecodeError;

/// Magic bytes for MEMD container files: "MEMD".
pub const MAGIC: &[u8; 4] = b"MEMD";

/// Fixed size of the file header in bytes.
///   magic[4] + version:u16 + flags:u16 = 8
pub const HEADER_SIZE: usize = 8;

/// Container format version written by this encoder.
pub const VERSION: u16 = 2;

// ── Flags ──────────────────────────────────────────────────────────────────

/// The body (everything after the header) is gzip-compressed as a unit.
/// Always set by this encoder; honored either way by the decoder.
pub const FLAG_GZIP: u16 = 1 << 0;

// ── Section tags ───────────────────────────────────────────────────────────

/// String table: varint count + length-prefixed UTF-8 strings.
pub const SECTION_STRING_TABLE: u8 = 0x01;

/// Data series: varint series count + per-series records.
pub const SECTION_SERIES: u8 = 0x02;

// ── Per-point flag bits ────────────────────────────────────────────────────

pub const POINT_FLAG_META: u8 = 1 << 0;
pub const POINT_FLAG_NAME: u8 = 1 << 1;
pub const POINT_FLAG_ID: u8 = 1 << 2;

/// Written in the per-page f32 slot when no scalar occupancy is known.
pub const OCCUPANCY_SENTINEL: f32 = -1.0;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 8-byte MEMD file header.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u16,
    pub flags: u16,
}

impl Header {
    /// Serialize to exactly `HEADER_SIZE` bytes, little-endian.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Deserialize from the first `HEADER_SIZE` bytes of `buf`, checking the
    /// magic. The version field is not validated here: the decoder checks it
    /// separately so it can report the offending number.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE || &buf[..4] != MAGIC {
            return Err(DecodeError::InvalidFormat);
        }
        Ok(Self {
            version: u16::from_le_bytes([buf[4], buf[5]]),
            flags: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}
