//! Run-length-encoded page occupancy.
//!
//! A page is viewed as a bit grid of `ceil(size / 8)` bits, one bit per
//! 8-byte block. The stream is a sequence of varint run lengths (in bits)
//! alternating strictly Occupied, Free, Occupied, ... and always starting
//! with an Occupied run, which may be zero-length when the page starts free.
//! Readers stop on total bytes consumed, not run count: the only framing is
//! the byte-length prefix the container writes around the whole block.

use crate::error::DecodeError;
use crate::model::ByteRange;
use crate::varint;

/// One occupancy bit covers this many bytes of memory.
pub const BYTES_PER_BIT: u64 = 8;

/// Number of occupancy bits covering a page of `page_size` bytes.
pub fn total_bits(page_size: u64) -> u64 {
    page_size.div_ceil(BYTES_PER_BIT)
}

/// The default view of a page nothing is known about: one Occupied run
/// spanning the whole page, no trailing Free run.
pub fn full_runs(page_size: u64) -> Vec<u64> {
    vec![total_bits(page_size)]
}

/// Synthesize runs from a scalar used fraction.
///
/// A fraction in `[0, 1)` yields exactly two runs: Occupied
/// `floor(total_bits * fraction)` then Free the remainder. A fraction of 1,
/// or anything out of range (NaN, negative, oversized — "unknown"), yields
/// the single full-page Occupied run. The positional detail is fabricated,
/// not real; only the used-byte total is meaningful.
pub fn runs_from_fraction(page_size: u64, fraction: f64) -> Vec<u64> {
    let bits = total_bits(page_size);
    if !(0.0..1.0).contains(&fraction) {
        return full_runs(page_size);
    }
    let occupied = (bits as f64 * fraction).floor() as u64;
    vec![occupied, bits - occupied]
}

/// Convert explicit free `[start, end)` byte ranges into runs.
///
/// Ranges are walked in start order; the gap before each range becomes (or
/// extends) an Occupied run and the range itself a Free run, both
/// floor-divided to bits — sub-8-byte slivers are dropped, the deliberate
/// quantization of the format. The remainder after the last range closes
/// with a ceiling-divided Occupied run.
pub fn runs_from_free_ranges(page_size: u64, ranges: &[ByteRange]) -> Vec<u64> {
    let mut sorted: Vec<ByteRange> = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut runs = RunBuilder::new();
    let mut cursor = 0u64; // bytes
    for range in sorted {
        let start = range.start.max(cursor).min(page_size);
        let end = range.end.min(page_size);
        if start > cursor {
            runs.push((start - cursor) / BYTES_PER_BIT, true);
        }
        if end > start {
            runs.push((end - start) / BYTES_PER_BIT, false);
        }
        cursor = cursor.max(end);
    }
    if cursor < page_size {
        runs.push(total_bits(page_size - cursor), true);
    }
    runs.into_runs()
}

/// Serialize runs as back-to-back varints.
pub fn encode_runs(runs: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(runs.len() * 2);
    for &run in runs {
        varint::encode_into(&mut out, run);
    }
    out
}

/// Decode an RLE stream back into free `[start, end)` byte ranges.
///
/// The slice must be consumed exactly; a varint cut off mid-run fails with
/// [`DecodeError::TruncatedStream`]. Run lengths come straight from the
/// file, so the bit cursor and the bits-to-bytes conversion are checked: a
/// stream whose runs overflow the 64-bit byte space is rejected as
/// [`DecodeError::InvalidFormat`] instead of wrapping around.
pub fn decode_free_ranges(rle: &[u8]) -> Result<Vec<ByteRange>, DecodeError> {
    let mut ranges = Vec::new();
    let mut pos = 0usize;
    let mut bit = 0u64;
    let mut occupied = true;
    while pos < rle.len() {
        let (run, consumed) = varint::decode(rle, pos)?;
        pos += consumed;
        let end_bit = bit.checked_add(run).ok_or(DecodeError::InvalidFormat)?;
        if !occupied && run > 0 {
            let start = bit
                .checked_mul(BYTES_PER_BIT)
                .ok_or(DecodeError::InvalidFormat)?;
            let end = end_bit
                .checked_mul(BYTES_PER_BIT)
                .ok_or(DecodeError::InvalidFormat)?;
            ranges.push(ByteRange::new(start, end));
        }
        bit = end_bit;
        occupied = !occupied;
    }
    Ok(ranges)
}

/// Total used bytes an RLE stream describes (sum of Occupied runs × 8).
/// Rejects streams whose totals overflow, like [`decode_free_ranges`].
pub fn occupied_bytes(rle: &[u8]) -> Result<u64, DecodeError> {
    let mut used = 0u64;
    let mut pos = 0usize;
    let mut occupied = true;
    while pos < rle.len() {
        let (run, consumed) = varint::decode(rle, pos)?;
        pos += consumed;
        if occupied {
            used = run
                .checked_mul(BYTES_PER_BIT)
                .and_then(|bytes| used.checked_add(bytes))
                .ok_or(DecodeError::InvalidFormat)?;
        }
        occupied = !occupied;
    }
    Ok(used)
}

/// Total used bytes of an in-memory run list (even positions are Occupied).
pub fn occupied_bytes_of_runs(runs: &[u64]) -> u64 {
    runs.iter()
        .step_by(2)
        .map(|&bits| bits * BYTES_PER_BIT)
        .sum()
}

/// Builds a strictly alternating run list. Same-state pushes extend the
/// current run; a zero-length push that would force a state change is
/// dropped so adjacent runs merge instead.
struct RunBuilder {
    runs: Vec<u64>,
}

impl RunBuilder {
    fn new() -> Self {
        Self { runs: Vec::new() }
    }

    fn push(&mut self, bits: u64, occupied: bool) {
        if bits == 0 && self.runs.is_empty() {
            return;
        }
        let last_occupied = match self.runs.len() {
            0 => {
                if occupied {
                    self.runs.push(bits);
                } else {
                    // Page starts free: leading zero-length Occupied run.
                    self.runs.push(0);
                    self.runs.push(bits);
                }
                return;
            }
            n => (n - 1) % 2 == 0,
        };
        if occupied == last_occupied {
            *self.runs.last_mut().unwrap() += bits;
        } else if bits > 0 {
            self.runs.push(bits);
        }
    }

    fn into_runs(self) -> Vec<u64> {
        self.runs
    }
}
