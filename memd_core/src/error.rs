use std::io;

use thiserror::Error;

/// Failure modes of the MEMD container decoder.
///
/// All of these are structural and abort the whole decode: section
/// boundaries are not independently resynchronizable, so there is no
/// partial-file recovery.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer is too short for a header, the magic bytes are wrong, or
    /// a section's contents are structurally impossible (an occupancy run
    /// overflowing the 64-bit byte space) — this is not a usable MEMD file.
    #[error("not a valid MEMD container")]
    InvalidFormat,

    /// The header parsed but the version field is not one this decoder
    /// understands.
    #[error("unsupported MEMD container version {version}")]
    UnsupportedVersion { version: u16 },

    /// The gzip flag was set but inflating the body failed.
    #[error("failed to decompress container body: {source}")]
    DecompressionFailed {
        #[source]
        source: io::Error,
    },

    /// A fixed-width, length-prefixed, or varint read ran past the end of
    /// the stream. `offset` is the byte position within the decompressed
    /// body at which the read was attempted.
    #[error("truncated stream: unexpected end of data at byte offset {offset}")]
    TruncatedStream { offset: usize },
}

/// Failure modes of the MEMD container encoder.
///
/// Per-record anomalies (unparseable series/point UUID strings, undecodable
/// bitmap hex) are recovered locally and never surface here; only the gzip
/// transform can fail.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to compress container body: {0}")]
    Compression(#[from] io::Error),
}
