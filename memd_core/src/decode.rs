//! Container decoder.
//!
//! Open sequence:
//! 1. Validate length and magic, read version and flags from the 8-byte
//!    header.
//! 2. If the gzip flag is set, inflate everything after the header as a
//!    unit; otherwise take it literally.
//! 3. Walk sections: one tag byte each, `0x01` string table, `0x02` data
//!    series (the field-for-field mirror of the encoder). An unrecognized
//!    tag ends parsing without error, tolerating forward-compatible
//!    trailing data.
//!
//! Structural failures (magic, version, gzip, truncation) abort the whole
//! decode — section boundaries are not independently resynchronizable, so
//! there is no partial-file recovery.

use std::io::Read;

use flate2::read::GzDecoder;
use uuid::Uuid;

use crate::buf::ByteReader;
use crate::error::DecodeError;
use crate::format::{
    Header, FLAG_GZIP, HEADER_SIZE, POINT_FLAG_ID, POINT_FLAG_META, POINT_FLAG_NAME,
    SECTION_SERIES, SECTION_STRING_TABLE, VERSION,
};
use crate::model::{
    DataPoint, MemoryConclusion, MemoryMetadata, MemorySeries, Occupancy, Page, PageType,
    PointMeta,
};
use crate::rle;
use crate::strings::{self, StringTable};

/// Read just the header, for inspection without a full decode.
pub fn decode_header(bytes: &[u8]) -> Result<Header, DecodeError> {
    Header::from_bytes(bytes)
}

/// Reconstruct the full series array from a `.mb` container.
pub fn decode(bytes: &[u8]) -> Result<Vec<MemorySeries>, DecodeError> {
    let header = Header::from_bytes(bytes)?;
    if header.version != VERSION {
        return Err(DecodeError::UnsupportedVersion {
            version: header.version,
        });
    }

    let rest = &bytes[HEADER_SIZE..];
    let body: Vec<u8> = if header.has_flag(FLAG_GZIP) {
        let mut out = Vec::new();
        GzDecoder::new(rest)
            .read_to_end(&mut out)
            .map_err(|source| DecodeError::DecompressionFailed { source })?;
        out
    } else {
        rest.to_vec()
    };

    let mut r = ByteReader::new(&body);
    let mut table: Vec<String> = Vec::new();
    let mut series: Vec<MemorySeries> = Vec::new();
    while !r.is_empty() {
        match r.u8()? {
            SECTION_STRING_TABLE => table = StringTable::read_section(&mut r)?,
            SECTION_SERIES => series = read_series_section(&mut r, &table)?,
            // End of known sections, not an error.
            _ => break,
        }
    }
    Ok(series)
}

fn read_series_section(
    r: &mut ByteReader<'_>,
    table: &[String],
) -> Result<Vec<MemorySeries>, DecodeError> {
    let count = r.uvarint()? as usize;
    let mut series = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let id = Uuid::from_bytes(r.uuid()?);
        let name = strings::resolve(table, r.uvarint()?).to_owned();
        let color = strings::resolve(table, r.uvarint()?).to_owned();
        let visible = r.u8()? != 0;
        let point_count = r.uvarint()? as usize;
        let mut data = Vec::with_capacity(point_count.min(65536));
        for _ in 0..point_count {
            data.push(read_point(r, table)?);
        }
        series.push(MemorySeries {
            id: id.to_string(),
            name,
            color,
            visible,
            data,
        });
    }
    Ok(series)
}

fn read_point(r: &mut ByteReader<'_>, table: &[String]) -> Result<DataPoint, DecodeError> {
    let timestamp = r.f64_le()?;
    let value = r.f64_le()?;
    let flags = r.u8()?;

    let name = if flags & POINT_FLAG_NAME != 0 {
        Some(strings::resolve(table, r.uvarint()?).to_owned())
    } else {
        None
    };

    // An absent field or the all-zero sentinel both mean "missing": either
    // way a fresh id is synthesized, so decoded points always carry one.
    let point_id = if flags & POINT_FLAG_ID != 0 {
        let raw = r.uuid()?;
        if raw == [0u8; 16] {
            Uuid::new_v4()
        } else {
            Uuid::from_bytes(raw)
        }
    } else {
        Uuid::new_v4()
    };

    let meta = if flags & POINT_FLAG_META != 0 {
        let event_index = r.uvarint()?;
        let event = if event_index == 0 {
            None
        } else {
            Some(strings::resolve(table, event_index - 1).to_owned())
        };
        let memory = if r.u8()? != 0 {
            Some(read_memory(r, table)?)
        } else {
            None
        };
        Some(PointMeta { event, memory })
    } else {
        None
    };

    Ok(DataPoint {
        timestamp,
        value,
        point_id: Some(point_id.to_string()),
        name,
        meta,
    })
}

fn read_memory(r: &mut ByteReader<'_>, table: &[String]) -> Result<MemoryMetadata, DecodeError> {
    let type_count = r.uvarint()? as usize;
    let mut page_types = Vec::with_capacity(type_count.min(4096));
    for _ in 0..type_count {
        let name = strings::resolve(table, r.uvarint()?).to_owned();
        let uniform = r.uvarint()?;
        let uniform_page_size = (uniform != 0).then_some(uniform);
        let page_count = r.uvarint()? as usize;
        let mut pages = Vec::with_capacity(page_count.min(65536));
        for _ in 0..page_count {
            let size = if uniform != 0 { uniform } else { r.uvarint()? };
            pages.push(read_page(r, size)?);
        }
        page_types.push(PageType {
            name,
            uniform_page_size,
            pages,
        });
    }
    let conclusion = Some(MemoryConclusion::compute(&page_types));
    Ok(MemoryMetadata {
        page_types,
        conclusion,
    })
}

fn read_page(r: &mut ByteReader<'_>, size: u64) -> Result<Page, DecodeError> {
    // The scalar slot is consumed but never surfaced: the sentinel means
    // "unknown" and a real value is already represented by the run stream.
    let _scalar = r.f32_le()?;

    let rle_len = r.uvarint()? as usize;
    let rle_offset = r.position();
    let rle_bytes = r.take(rle_len)?;
    let free_ranges = rle::decode_free_ranges(rle_bytes).map_err(|e| match e {
        // Report offsets relative to the whole body, not the RLE slice.
        DecodeError::TruncatedStream { offset } => DecodeError::TruncatedStream {
            offset: rle_offset + offset,
        },
        other => other,
    })?;

    Ok(Page {
        size,
        occupancy: Occupancy::FreeRanges(free_ranges),
    })
}
