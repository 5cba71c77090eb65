//! End-to-end properties of the MEMD container codec: varint and RLE
//! primitives, string deduplication, full encode/decode round-trips, and
//! rejection of malformed containers.

use std::io::Read;

use memd_core::buf::{ByteReader, ByteWriter};
use memd_core::error::DecodeError;
use memd_core::format::{Header, POINT_FLAG_META, SECTION_SERIES, SECTION_STRING_TABLE, VERSION};
use memd_core::model::{
    ByteRange, DataPoint, MemoryMetadata, MemorySeries, Occupancy, Page, PageType, PointMeta,
};
use memd_core::strings::StringTable;
use memd_core::{decode, encode, rle, varint};

// ── helpers ────────────────────────────────────────────────────────────────

fn series(id: &str, name: &str, data: Vec<DataPoint>) -> MemorySeries {
    MemorySeries {
        id: id.to_owned(),
        name: name.to_owned(),
        color: "#ff8800".to_owned(),
        visible: true,
        data,
    }
}

fn point(timestamp: f64, value: f64) -> DataPoint {
    DataPoint {
        timestamp,
        value,
        point_id: None,
        name: None,
        meta: None,
    }
}

fn snapshot_point(timestamp: f64, value: f64, pages: Vec<Page>) -> DataPoint {
    DataPoint {
        timestamp,
        value,
        point_id: Some("6fa459ea-ee8a-3ca4-894e-db77e160355e".to_owned()),
        name: Some("snapshot".to_owned()),
        meta: Some(PointMeta {
            event: Some("GC_START".to_owned()),
            memory: Some(MemoryMetadata {
                page_types: vec![PageType {
                    name: "Heap".to_owned(),
                    uniform_page_size: Some(4096),
                    pages,
                }],
                conclusion: None,
            }),
        }),
    }
}

/// Hand-build an uncompressed container holding one snapshot page whose RLE
/// block is exactly `rle_bytes`. Returns the container and the byte offset
/// of the RLE block within the body.
fn container_with_rle_block(rle_bytes: &[u8]) -> (Vec<u8>, usize) {
    let mut body = ByteWriter::new();
    // Empty string table: every index resolves tolerantly to "".
    body.u8(SECTION_STRING_TABLE);
    body.uvarint(0);
    body.u8(SECTION_SERIES);
    body.uvarint(1); // series count
    body.uuid(uuid::Uuid::nil().as_bytes());
    body.uvarint(0); // name index
    body.uvarint(0); // color index
    body.u8(1); // visible
    body.uvarint(1); // point count
    body.f64_le(1.0);
    body.f64_le(2.0);
    body.u8(POINT_FLAG_META);
    body.uvarint(0); // no event
    body.u8(1); // has memory
    body.uvarint(1); // page-type count
    body.uvarint(0); // page-type name index
    body.uvarint(4096); // uniform page size
    body.uvarint(1); // page count
    body.f32_le(-1.0); // no scalar occupancy
    body.uvarint(rle_bytes.len() as u64);
    let rle_offset = body.len();
    body.bytes(rle_bytes);

    let header = Header {
        version: VERSION,
        flags: 0,
    };
    let mut container = header.to_bytes().to_vec();
    container.extend_from_slice(&body.into_bytes());
    (container, rle_offset)
}

/// Inflate the body of an encoded container (everything after the header).
fn inflate_body(container: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    flate2::read::GzDecoder::new(&container[8..])
        .read_to_end(&mut body)
        .expect("encoder output should inflate");
    body
}

// ── varint ─────────────────────────────────────────────────────────────────

#[test]
fn varint_zero_is_one_zero_byte() {
    let mut buf = Vec::new();
    varint::encode_into(&mut buf, 0);
    assert_eq!(buf, [0x00]);
}

#[test]
fn varint_round_trip() {
    for v in [
        0u64,
        1,
        127,
        128,
        300,
        16_383,
        16_384,
        1 << 21,
        u32::MAX as u64,
        1 << 32,
        1 << 53,
    ] {
        let mut buf = Vec::new();
        varint::encode_into(&mut buf, v);
        let (decoded, consumed) = varint::decode(&buf, 0).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(consumed, buf.len(), "value {v} should consume every byte");
    }
}

#[test]
fn varint_truncated_stream_reports_offset() {
    // A lone continuation byte promises more data that never arrives.
    match varint::decode(&[0x80], 0) {
        Err(DecodeError::TruncatedStream { offset }) => assert_eq!(offset, 1),
        other => panic!("expected TruncatedStream, got {other:?}"),
    }
}

// ── RLE occupancy ──────────────────────────────────────────────────────────

#[test]
fn rle_runs_are_bits_offsets_are_bytes() {
    // 4096-byte page = 512 bits. Runs [128, 256, 128]: first 1024 bytes
    // used, next 2048 free, last 1024 used.
    let stream = rle::encode_runs(&[128, 256, 128]);
    let free = rle::decode_free_ranges(&stream).unwrap();
    assert_eq!(free, vec![ByteRange::new(1024, 3072)]);
    assert_eq!(rle::occupied_bytes(&stream).unwrap(), 2048);
}

#[test]
fn fraction_synthesizes_two_runs() {
    let runs = rle::runs_from_fraction(4096, 0.5);
    assert_eq!(runs, vec![256, 256], "floor(512 * 0.5) then remainder");
    assert_eq!(runs.iter().sum::<u64>(), 512);
}

#[test]
fn fraction_full_and_unknown_are_one_run() {
    assert_eq!(rle::runs_from_fraction(4096, 1.0), vec![512]);
    assert_eq!(rle::runs_from_fraction(4096, f64::NAN), vec![512]);
    assert_eq!(rle::runs_from_fraction(4096, -0.25), vec![512]);
}

#[test]
fn fraction_zero_starts_with_empty_occupied_run() {
    assert_eq!(rle::runs_from_fraction(4096, 0.0), vec![0, 512]);
}

#[test]
fn free_ranges_round_trip_through_runs() {
    let ranges = vec![ByteRange::new(1024, 3072)];
    let runs = rle::runs_from_free_ranges(4096, &ranges);
    assert_eq!(runs, vec![128, 256, 128]);
    let decoded = rle::decode_free_ranges(&rle::encode_runs(&runs)).unwrap();
    assert_eq!(decoded, ranges);
}

#[test]
fn free_range_at_page_start_yields_leading_zero_run() {
    let runs = rle::runs_from_free_ranges(4096, &[ByteRange::new(0, 1024)]);
    assert_eq!(runs, vec![0, 128, 384]);
    let decoded = rle::decode_free_ranges(&rle::encode_runs(&runs)).unwrap();
    assert_eq!(decoded, vec![ByteRange::new(0, 1024)]);
}

#[test]
fn free_ranges_are_sorted_before_conversion() {
    let runs = rle::runs_from_free_ranges(
        8192,
        &[ByteRange::new(4096, 5120), ByteRange::new(0, 1024)],
    );
    assert_eq!(runs, vec![0, 128, 384, 128, 384]);
}

#[test]
fn sub_block_slivers_are_quantized_away() {
    // A 5-byte free range is below the 8-byte bit resolution.
    let runs = rle::runs_from_free_ranges(4096, &[ByteRange::new(64, 69)]);
    assert_eq!(rle::occupied_bytes_of_runs(&runs), 4096);
}

#[test]
fn truncated_rle_stream_fails() {
    let mut stream = rle::encode_runs(&[128, 256, 128]);
    stream.pop(); // cut the last varint short
    assert!(matches!(
        rle::decode_free_ranges(&stream),
        Err(DecodeError::TruncatedStream { .. })
    ));
}

#[test]
fn overflowing_rle_runs_are_rejected_not_wrapped() {
    // A free run of u64::MAX bits would overflow the bit cursor.
    let stream = rle::encode_runs(&[1, u64::MAX]);
    assert!(matches!(
        rle::decode_free_ranges(&stream),
        Err(DecodeError::InvalidFormat)
    ));

    // An occupied run of u64::MAX bits would overflow the byte total.
    let stream = rle::encode_runs(&[u64::MAX]);
    assert!(matches!(
        rle::occupied_bytes(&stream),
        Err(DecodeError::InvalidFormat)
    ));
}

// ── string table ───────────────────────────────────────────────────────────

#[test]
fn string_dedup_single_entry_for_shared_name() {
    let a = series("6fa459ea-ee8a-3ca4-894e-db77e160355e", "Shared", vec![]);
    let mut b = series("7fa459ea-ee8a-3ca4-894e-db77e160355e", "Shared", vec![]);
    b.color = a.color.clone();
    let container = encode(&[a, b]).unwrap();

    // Walk into the string-table section of the inflated body by hand.
    let body = inflate_body(&container);
    let mut r = ByteReader::new(&body);
    assert_eq!(r.u8().unwrap(), SECTION_STRING_TABLE);
    let table = StringTable::read_section(&mut r).unwrap();
    assert_eq!(
        table,
        vec!["Shared".to_owned(), "#ff8800".to_owned()],
        "two series sharing name and color need exactly two table entries"
    );
}

// ── round trip ─────────────────────────────────────────────────────────────

#[test]
fn round_trip_preserves_series_and_points() {
    let mut hidden = series(
        "16fd2706-8baf-433b-82eb-8c7fada847da",
        "Old Space",
        vec![point(1.0, 1024.0), point(2.5, -0.0)],
    );
    hidden.visible = false;
    hidden.color = String::new();
    let input = vec![
        series(
            "6fa459ea-ee8a-3ca4-894e-db77e160355e",
            "New Space",
            vec![
                point(1_700_000_000_000_000.0, 52_428_800.0),
                snapshot_point(
                    1_700_000_000_100_000.0,
                    52_430_000.0,
                    vec![
                        Page {
                            size: 4096,
                            occupancy: Occupancy::Fraction(0.5),
                        },
                        Page {
                            size: 4096,
                            occupancy: Occupancy::FreeRanges(vec![ByteRange::new(1024, 3072)]),
                        },
                        Page {
                            size: 4096,
                            // runs [128, 256, 128] as varints
                            occupancy: Occupancy::Bitmap("800180028001".to_owned()),
                        },
                    ],
                ),
            ],
        ),
        hidden,
    ];

    let decoded = decode(&encode(&input).unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);

    for (orig, got) in input.iter().zip(&decoded) {
        assert_eq!(got.id, orig.id);
        assert_eq!(got.name, orig.name);
        assert_eq!(got.color, orig.color);
        assert_eq!(got.visible, orig.visible);
        assert_eq!(got.data.len(), orig.data.len());
        for (op, gp) in orig.data.iter().zip(&got.data) {
            assert_eq!(gp.timestamp, op.timestamp);
            assert_eq!(gp.value, op.value);
            assert_eq!(gp.name, op.name);
            // A missing source id is synthesized fresh: assert validity,
            // not value.
            let got_id = gp.point_id.as_deref().expect("decoded points carry an id");
            assert!(uuid::Uuid::parse_str(got_id).is_ok());
            if let Some(orig_id) = &op.point_id {
                assert_eq!(got_id, orig_id);
            }
        }
    }

    // Occupancy comes back as free ranges with the same used-byte totals
    // (within one 8-byte grid unit).
    let orig_pages = &input[0].data[1].meta.as_ref().unwrap().memory.as_ref().unwrap().page_types[0]
        .pages;
    let got_meta = decoded[0].data[1].meta.as_ref().unwrap();
    assert_eq!(got_meta.event.as_deref(), Some("GC_START"));
    let got_memory = got_meta.memory.as_ref().unwrap();
    let got_pages = &got_memory.page_types[0].pages;
    assert_eq!(got_pages.len(), 3);
    for (op, gp) in orig_pages.iter().zip(got_pages) {
        assert_eq!(gp.size, op.size);
        assert!(matches!(gp.occupancy, Occupancy::FreeRanges(_)));
        let diff = op.used_bytes().abs_diff(gp.used_bytes());
        assert!(diff <= 8, "used-byte totals drifted by {diff}");
    }

    // The conclusion is recomputed on load, never shipped.
    let conclusion = got_memory.conclusion.as_ref().unwrap();
    assert_eq!(conclusion.total_size, 3 * 4096);
    assert_eq!(conclusion.used_size, 2048 + 2048 + 2048);
    assert_eq!(conclusion.per_page_type[0].name, "Heap");
}

#[test]
fn round_trip_empty_series_array() {
    let decoded = decode(&encode(&[]).unwrap()).unwrap();
    assert!(decoded.is_empty());
}

#[test]
fn bad_series_uuid_is_replaced_not_fatal() {
    let decoded = decode(&encode(&[series("not-a-uuid", "S", vec![])]).unwrap()).unwrap();
    assert!(uuid::Uuid::parse_str(&decoded[0].id).is_ok());
    assert_ne!(decoded[0].id, "not-a-uuid");
}

#[test]
fn bad_point_uuid_becomes_fresh_id_via_zero_sentinel() {
    let mut p = point(1.0, 2.0);
    p.point_id = Some("garbage".to_owned());
    let decoded = decode(
        &encode(&[series("6fa459ea-ee8a-3ca4-894e-db77e160355e", "S", vec![p])]).unwrap(),
    )
    .unwrap();
    let got = decoded[0].data[0].point_id.as_deref().unwrap();
    assert!(uuid::Uuid::parse_str(got).is_ok());
    assert_ne!(got, uuid::Uuid::nil().to_string());
}

#[test]
fn encoding_is_deterministic() {
    let input = vec![series(
        "6fa459ea-ee8a-3ca4-894e-db77e160355e",
        "S",
        vec![point(1.0, 2.0), point(2.0, 3.0)],
    )];
    assert_eq!(encode(&input).unwrap(), encode(&input).unwrap());
}

// ── malformed containers ───────────────────────────────────────────────────

#[test]
fn too_short_buffer_is_invalid_format() {
    assert!(matches!(decode(b"MEM"), Err(DecodeError::InvalidFormat)));
    assert!(matches!(decode(&[]), Err(DecodeError::InvalidFormat)));
}

#[test]
fn wrong_magic_is_invalid_format() {
    let mut container = encode(&[]).unwrap();
    container[0] = b'X';
    assert!(matches!(
        decode(&container),
        Err(DecodeError::InvalidFormat)
    ));
}

#[test]
fn unknown_version_is_rejected_with_number() {
    let mut container = encode(&[]).unwrap();
    container[4] = 9; // version LE low byte
    match decode(&container) {
        Err(DecodeError::UnsupportedVersion { version }) => assert_eq!(version, 9),
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn corrupt_gzip_body_is_decompression_failure() {
    let header = Header {
        version: VERSION,
        flags: memd_core::format::FLAG_GZIP,
    };
    let mut container = header.to_bytes().to_vec();
    container.extend_from_slice(b"definitely not gzip");
    assert!(matches!(
        decode(&container),
        Err(DecodeError::DecompressionFailed { .. })
    ));
}

#[test]
fn truncated_body_reports_offset() {
    // Uncompressed container (flags = 0) whose series section promises one
    // record and then ends.
    let header = Header {
        version: VERSION,
        flags: 0,
    };
    let mut container = header.to_bytes().to_vec();
    container.push(memd_core::format::SECTION_SERIES);
    container.push(1); // varint series count = 1, then nothing
    match decode(&container) {
        Err(DecodeError::TruncatedStream { offset }) => assert_eq!(offset, 2),
        other => panic!("expected TruncatedStream, got {other:?}"),
    }
}

#[test]
fn crafted_container_with_overflowing_run_is_rejected() {
    // The oversized run must surface as a typed error from the public
    // decode entry point, never a panic or a bogus free list.
    let (container, _) = container_with_rle_block(&rle::encode_runs(&[1, u64::MAX]));
    assert!(matches!(
        decode(&container),
        Err(DecodeError::InvalidFormat)
    ));
}

#[test]
fn truncated_rle_block_reports_body_relative_offset() {
    // A lone continuation byte truncates one byte into the RLE block; the
    // reported offset is relative to the whole body, not the block.
    let (container, rle_offset) = container_with_rle_block(&[0x80]);
    match decode(&container) {
        Err(DecodeError::TruncatedStream { offset }) => assert_eq!(offset, rle_offset + 1),
        other => panic!("expected TruncatedStream, got {other:?}"),
    }
}

#[test]
fn unknown_trailing_section_is_tolerated() {
    let input = vec![series(
        "6fa459ea-ee8a-3ca4-894e-db77e160355e",
        "S",
        vec![point(1.0, 2.0)],
    )];
    let mut body = inflate_body(&encode(&input).unwrap());
    body.push(0xEE); // unrecognized tag
    body.extend_from_slice(b"future data the decoder has never heard of");

    let header = Header {
        version: VERSION,
        flags: 0,
    };
    let mut container = header.to_bytes().to_vec();
    container.extend_from_slice(&body);

    let decoded = decode(&container).unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].name, "S");
}

// ── JSON interchange ───────────────────────────────────────────────────────

#[test]
fn page_variant_precedence_is_bitmap_then_freelist_then_fraction() {
    let page: Page = serde_json::from_str(
        r#"{"size":4096,"occupancy":0.5,"freeList":[[0,1024]],"bitmap":"800180028001"}"#,
    )
    .unwrap();
    assert_eq!(page.occupancy, Occupancy::Bitmap("800180028001".to_owned()));

    let page: Page =
        serde_json::from_str(r#"{"size":4096,"occupancy":0.5,"freeList":[[0,1024]]}"#).unwrap();
    assert_eq!(
        page.occupancy,
        Occupancy::FreeRanges(vec![ByteRange::new(0, 1024)])
    );

    let page: Page = serde_json::from_str(r#"{"size":4096,"occupancy":0.5}"#).unwrap();
    assert_eq!(page.occupancy, Occupancy::Fraction(0.5));

    let page: Page = serde_json::from_str(r#"{"size":4096}"#).unwrap();
    assert_eq!(page.occupancy, Occupancy::Fraction(1.0));
}

#[test]
fn byte_ranges_serialize_as_pairs() {
    let json = serde_json::to_string(&Page {
        size: 4096,
        occupancy: Occupancy::FreeRanges(vec![ByteRange::new(1024, 3072)]),
    })
    .unwrap();
    assert_eq!(json, r#"{"size":4096,"freeList":[[1024,3072]]}"#);
}
