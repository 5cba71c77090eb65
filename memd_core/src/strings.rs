//! Deduplicated string table.
//!
//! Every textual field in the container (series names, colors, point names,
//! event tags, page-type names) is stored once here and referenced by
//! varint index. The table lives for exactly one encode or decode call.

use std::collections::HashMap;

use crate::buf::{ByteReader, ByteWriter};
use crate::error::DecodeError;

#[derive(Default)]
pub struct StringTable {
    entries: Vec<String>,
    index: HashMap<String, u64>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s`, appending it in first-occurrence order if unseen.
    /// Index assignment therefore follows the encoder's walk order exactly.
    pub fn intern(&mut self, s: &str) -> u64 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.entries.len() as u64;
        self.entries.push(s.to_owned());
        self.index.insert(s.to_owned(), idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Section payload: varint count, then each string length-prefixed, in
    /// insertion order.
    pub fn write_section(&self, w: &mut ByteWriter) {
        w.uvarint(self.entries.len() as u64);
        for s in &self.entries {
            w.string(s);
        }
    }

    /// Decoder side: read the table once into an index → string array.
    pub fn read_section(r: &mut ByteReader<'_>) -> Result<Vec<String>, DecodeError> {
        let count = r.uvarint()? as usize;
        let mut strings = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            strings.push(r.string()?);
        }
        Ok(strings)
    }
}

/// Resolve a varint index against the decoded table. Out-of-bounds indices
/// resolve to the empty string — tolerated, not fatal.
pub fn resolve(strings: &[String], index: u64) -> &str {
    strings
        .get(index as usize)
        .map(String::as_str)
        .unwrap_or("")
}
