//! The logical data model the container round-trips.
//!
//! The serde derives match the JSON interchange form consumed and produced
//! by external collaborators: an array of series objects with camelCase
//! fields, where each page carries `size` plus exactly one of `occupancy`,
//! `freeList`, or `bitmap`.
//!
//! The model is owned by the caller; the encoder borrows it read-only and
//! the decoder returns a freshly allocated tree.

use serde::{Deserialize, Serialize};

use crate::rle;

/// One named memory-usage time series. `data` order is chronological and
/// preserved exactly through a round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySeries {
    /// UUID string; stable identity across export/import. An unparseable id
    /// is replaced with a fresh UUID at encode time rather than failing the
    /// export.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

fn default_visible() -> bool {
    true
}

/// One timestamped sample. Timestamp and value are opaque doubles to the
/// codec (consumers interpret the timestamp as microseconds-since-epoch or
/// a raw axis value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: f64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PointMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMeta {
    /// Event tag, e.g. "GC_START".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryMetadata>,
}

/// A full memory-layout snapshot at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub page_types: Vec<PageType>,
    /// Derived aggregate statistics. Never written to the wire; the decoder
    /// recomputes it from `page_types` after reconstruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<MemoryConclusion>,
}

/// A named grouping of pages sharing a category ("Heap", fixed-block-size
/// groups, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageType {
    pub name: String,
    /// Size in bytes shared by every page of the group. `None` (or zero on
    /// the wire) means each page carries its own explicit size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniform_page_size: Option<u64>,
    pub pages: Vec<Page>,
}

/// One fixed-size memory page with exactly one occupancy view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PageRepr", into = "PageRepr")]
pub struct Page {
    pub size: u64,
    pub occupancy: Occupancy,
}

impl Page {
    /// Used bytes of this page at the format's 8-byte bit granularity,
    /// clamped to the page size (the trailing run is ceiling-rounded).
    pub fn used_bytes(&self) -> u64 {
        let runs = match &self.occupancy {
            Occupancy::Fraction(f) => rle::runs_from_fraction(self.size, *f),
            Occupancy::FreeRanges(ranges) => rle::runs_from_free_ranges(self.size, ranges),
            Occupancy::Bitmap(hex_str) => match hex::decode(hex_str) {
                Ok(raw) => return rle::occupied_bytes(&raw).unwrap_or(self.size).min(self.size),
                Err(_) => rle::full_runs(self.size),
            },
        };
        rle::occupied_bytes_of_runs(&runs).min(self.size)
    }
}

/// A page's occupancy. The canonical on-wire form is always the RLE run
/// stream; these are the in-memory views it can be derived from. When a
/// JSON object carries more than one view, construction precedence is
/// bitmap > freeList > occupancy; all absent means fully occupied.
#[derive(Debug, Clone, PartialEq)]
pub enum Occupancy {
    /// Fraction of the page that is used, in [0, 1]; no positional detail.
    Fraction(f64),
    /// Free `[start, end)` byte ranges; gaps between them are used.
    FreeRanges(Vec<ByteRange>),
    /// Hex string of an RLE run stream, byte-for-byte the format's embedded
    /// encoding.
    Bitmap(String),
}

/// Serde shadow of [`Page`]: the interchange form spells the occupancy
/// variant as three optional fields.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageRepr {
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    occupancy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    free_list: Option<Vec<ByteRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bitmap: Option<String>,
}

impl From<PageRepr> for Page {
    fn from(repr: PageRepr) -> Self {
        let occupancy = if let Some(hex_str) = repr.bitmap {
            Occupancy::Bitmap(hex_str)
        } else if let Some(ranges) = repr.free_list {
            Occupancy::FreeRanges(ranges)
        } else if let Some(fraction) = repr.occupancy {
            Occupancy::Fraction(fraction)
        } else {
            Occupancy::Fraction(1.0)
        };
        Page {
            size: repr.size,
            occupancy,
        }
    }
}

impl From<Page> for PageRepr {
    fn from(page: Page) -> Self {
        let mut repr = PageRepr {
            size: page.size,
            occupancy: None,
            free_list: None,
            bitmap: None,
        };
        match page.occupancy {
            Occupancy::Fraction(f) => repr.occupancy = Some(f),
            Occupancy::FreeRanges(ranges) => repr.free_list = Some(ranges),
            Occupancy::Bitmap(hex_str) => repr.bitmap = Some(hex_str),
        }
        repr
    }
}

/// A `[start, end)` byte range, serialized as a two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self { start, end }
    }
}

impl From<ByteRange> for (u64, u64) {
    fn from(r: ByteRange) -> Self {
        (r.start, r.end)
    }
}

// ── Derived statistics ─────────────────────────────────────────────────────

/// Aggregate memory statistics derived from a snapshot's page types.
/// Recomputable at any time; not part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConclusion {
    pub total_size: u64,
    pub used_size: u64,
    pub free_size: u64,
    pub per_page_type: Vec<PageTypeStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTypeStats {
    pub name: String,
    pub page_count: u64,
    pub total_size: u64,
    pub used_size: u64,
}

impl MemoryConclusion {
    pub fn compute(page_types: &[PageType]) -> Self {
        let mut total_size = 0u64;
        let mut used_size = 0u64;
        let mut per_page_type = Vec::with_capacity(page_types.len());
        for pt in page_types {
            let mut type_total = 0u64;
            let mut type_used = 0u64;
            // Page sizes are read from the wire; saturate rather than trust
            // crafted values to stay summable.
            for page in &pt.pages {
                type_total = type_total.saturating_add(page.size);
                type_used = type_used.saturating_add(page.used_bytes());
            }
            total_size = total_size.saturating_add(type_total);
            used_size = used_size.saturating_add(type_used);
            per_page_type.push(PageTypeStats {
                name: pt.name.clone(),
                page_count: pt.pages.len() as u64,
                total_size: type_total,
                used_size: type_used,
            });
        }
        MemoryConclusion {
            total_size,
            used_size,
            free_size: total_size.saturating_sub(used_size),
            per_page_type,
        }
    }
}
