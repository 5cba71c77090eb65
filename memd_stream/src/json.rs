//! Chunked generation of the human-readable JSON interchange form.

use memd_core::MemorySeries;

/// One-shot JSON form: the array of series objects external collaborators
/// exchange.
pub fn encode_json(series: &[MemorySeries]) -> Result<String, serde_json::Error> {
    serde_json::to_string(series)
}

/// Emit the same JSON text as [`encode_json`] in per-series fragments, so a
/// large model can be written straight to a sink without buffering the
/// whole document. Concatenating every fragment passed to `sink` yields
/// exactly the [`encode_json`] output.
pub fn json_chunks<F>(series: &[MemorySeries], mut sink: F) -> Result<(), serde_json::Error>
where
    F: FnMut(&str),
{
    sink("[");
    for (i, s) in series.iter().enumerate() {
        if i > 0 {
            sink(",");
        }
        sink(&serde_json::to_string(s)?);
    }
    sink("]");
    Ok(())
}
