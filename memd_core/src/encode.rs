//! Container encoder.
//!
//! Walks the borrowed series tree twice: a first pass interns every string
//! in walk order, then the body is written section by section and
//! gzip-compressed as a unit behind the fixed 8-byte header. The layout is
//! self-describing — a decoder needs nothing beyond the version number.
//!
//! Bad identity strings never abort an export: an unparseable series id is
//! replaced with a fresh UUID, an unparseable point id becomes the all-zero
//! sentinel the decoder regenerates from.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::buf::ByteWriter;
use crate::error::EncodeError;
use crate::format::{
    Header, FLAG_GZIP, HEADER_SIZE, OCCUPANCY_SENTINEL, POINT_FLAG_ID, POINT_FLAG_META,
    POINT_FLAG_NAME, SECTION_SERIES, SECTION_STRING_TABLE, VERSION,
};
use crate::model::{DataPoint, MemoryMetadata, MemorySeries, Occupancy, Page};
use crate::rle;
use crate::strings::StringTable;

/// Serialize `series` into a complete `.mb` container.
///
/// Deterministic: identical input yields identical bytes.
pub fn encode(series: &[MemorySeries]) -> Result<Vec<u8>, EncodeError> {
    let mut table = StringTable::new();
    collect_strings(series, &mut table);

    let mut body = ByteWriter::with_capacity(4096);
    body.u8(SECTION_STRING_TABLE);
    table.write_section(&mut body);

    body.u8(SECTION_SERIES);
    body.uvarint(series.len() as u64);
    for s in series {
        write_series(&mut body, s, &mut table);
    }

    let header = Header {
        version: VERSION,
        flags: FLAG_GZIP,
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len() / 2);
    out.extend_from_slice(&header.to_bytes());
    let mut gz = GzEncoder::new(out, Compression::default());
    gz.write_all(&body.into_bytes())?;
    Ok(gz.finish()?)
}

/// First pass: populate the table in the exact field order the writer will
/// reference it — per series name then color, per point name then event,
/// then each page-type name. First-occurrence order across this walk is the
/// table's index order.
fn collect_strings(series: &[MemorySeries], table: &mut StringTable) {
    for s in series {
        table.intern(&s.name);
        table.intern(&s.color);
        for point in &s.data {
            if let Some(name) = &point.name {
                table.intern(name);
            }
            if let Some(meta) = &point.meta {
                if let Some(event) = &meta.event {
                    table.intern(event);
                }
                if let Some(memory) = &meta.memory {
                    for page_type in &memory.page_types {
                        table.intern(&page_type.name);
                    }
                }
            }
        }
    }
}

fn write_series(w: &mut ByteWriter, series: &MemorySeries, table: &mut StringTable) {
    let id = Uuid::parse_str(series.id.trim()).unwrap_or_else(|_| Uuid::new_v4());
    w.uuid(id.as_bytes());
    w.uvarint(table.intern(&series.name));
    w.uvarint(table.intern(&series.color));
    w.u8(series.visible as u8);
    w.uvarint(series.data.len() as u64);
    for point in &series.data {
        write_point(w, point, table);
    }
}

fn write_point(w: &mut ByteWriter, point: &DataPoint, table: &mut StringTable) {
    let mut flags = 0u8;
    if point.meta.is_some() {
        flags |= POINT_FLAG_META;
    }
    if point.name.is_some() {
        flags |= POINT_FLAG_NAME;
    }
    if point.point_id.is_some() {
        flags |= POINT_FLAG_ID;
    }

    w.f64_le(point.timestamp);
    w.f64_le(point.value);
    w.u8(flags);

    if let Some(name) = &point.name {
        w.uvarint(table.intern(name));
    }
    if let Some(point_id) = &point.point_id {
        // Zero-filled on parse failure; the decoder treats the all-zero
        // field as "missing" and generates a replacement.
        let bytes = Uuid::parse_str(point_id.trim())
            .map(|u| *u.as_bytes())
            .unwrap_or([0u8; 16]);
        w.uuid(&bytes);
    }
    if let Some(meta) = &point.meta {
        match &meta.event {
            Some(event) => w.uvarint(table.intern(event) + 1),
            None => w.uvarint(0),
        }
        match &meta.memory {
            Some(memory) => {
                w.u8(1);
                write_memory(w, memory, table);
            }
            None => w.u8(0),
        }
    }
}

fn write_memory(w: &mut ByteWriter, memory: &MemoryMetadata, table: &mut StringTable) {
    // `conclusion` is derived data; it is never written.
    w.uvarint(memory.page_types.len() as u64);
    for page_type in &memory.page_types {
        w.uvarint(table.intern(&page_type.name));
        let uniform = page_type.uniform_page_size.unwrap_or(0);
        w.uvarint(uniform);
        w.uvarint(page_type.pages.len() as u64);
        for page in &page_type.pages {
            if uniform == 0 {
                w.uvarint(page.size);
            }
            let size = if uniform != 0 { uniform } else { page.size };
            write_page(w, page, size);
        }
    }
}

fn write_page(w: &mut ByteWriter, page: &Page, size: u64) {
    let scalar = match page.occupancy {
        Occupancy::Fraction(f) => f as f32,
        _ => OCCUPANCY_SENTINEL,
    };
    w.f32_le(scalar);

    // Canonical run stream, from whichever view the page carries:
    // bitmap hex > free ranges > scalar fraction. Undecodable hex recovers
    // to the default-full stream rather than failing the export.
    let rle_bytes = match &page.occupancy {
        Occupancy::Bitmap(hex_str) => hex::decode(hex_str)
            .unwrap_or_else(|_| rle::encode_runs(&rle::full_runs(size))),
        Occupancy::FreeRanges(ranges) => {
            rle::encode_runs(&rle::runs_from_free_ranges(size, ranges))
        }
        Occupancy::Fraction(f) => rle::encode_runs(&rle::runs_from_fraction(size, *f)),
    };
    w.uvarint(rle_bytes.len() as u64);
    w.bytes(&rle_bytes);
}
