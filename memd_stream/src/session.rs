//! Export session: the accumulate-then-encode half of the streaming
//! protocol.
//!
//! A session is created from series metadata only (INIT), points are
//! appended in small deep-copied batches (BATCH), and the real encode runs
//! once at the end (PROCESS), emitting either one terminal blob or a
//! sequence of bounded output chunks with coarse progress. Finishing
//! consumes the session, so a second PROCESS on the same accumulation
//! buffer cannot be expressed; keeping at most one session in flight per
//! process remains the caller's job.

use thiserror::Error;

use memd_core::{encode, DataPoint, EncodeError, MemorySeries};

/// Default size of emitted output chunks: 64 KB.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ExportError {
    /// A BATCH named a series index that INIT never established.
    #[error("batch for unknown series index {index} (session has {count} series)")]
    UnknownSeries { index: usize, count: usize },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker thread hung up before reporting a result.
    #[error("export worker disconnected")]
    WorkerGone,
}

/// One message to the output sink during a chunked PROCESS.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    /// Coarse progress, 0–100.
    Progress(u8),
    Chunk(Vec<u8>),
    Done,
}

pub struct ExportSession {
    series: Vec<MemorySeries>,
}

impl ExportSession {
    /// INIT: establish the series skeletons — id, name, color, visibility —
    /// with empty point arrays. Any points already present on `metas` are
    /// deliberately dropped; they arrive via [`append_points`].
    ///
    /// [`append_points`]: ExportSession::append_points
    pub fn begin(metas: &[MemorySeries]) -> Self {
        let series = metas
            .iter()
            .map(|m| MemorySeries {
                id: m.id.clone(),
                name: m.name.clone(),
                color: m.color.clone(),
                visible: m.visible,
                data: Vec::new(),
            })
            .collect();
        Self { series }
    }

    /// BATCH: append a deep-copied slice of one series' points, in arrival
    /// order.
    pub fn append_points(
        &mut self,
        series_index: usize,
        points: &[DataPoint],
    ) -> Result<(), ExportError> {
        let count = self.series.len();
        let series = self
            .series
            .get_mut(series_index)
            .ok_or(ExportError::UnknownSeries {
                index: series_index,
                count,
            })?;
        series.data.extend_from_slice(points);
        Ok(())
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.data.len()).sum()
    }

    /// PROCESS: encode the accumulated model as one terminal blob.
    pub fn finish(self) -> Result<Vec<u8>, ExportError> {
        Ok(encode(&self.series)?)
    }

    /// PROCESS, chunked: encode and hand the output to `sink` in chunks of
    /// at most `chunk_bytes`, interleaved with progress percentages and a
    /// terminal [`ExportEvent::Done`]. The concatenated chunks are
    /// byte-identical to [`finish`].
    ///
    /// [`finish`]: ExportSession::finish
    pub fn finish_chunked<F>(self, chunk_bytes: usize, mut sink: F) -> Result<(), ExportError>
    where
        F: FnMut(ExportEvent),
    {
        let chunk_bytes = chunk_bytes.max(1);
        let blob = encode(&self.series)?;
        let total = blob.len();

        sink(ExportEvent::Progress(0));
        let mut emitted = 0usize;
        for chunk in blob.chunks(chunk_bytes) {
            sink(ExportEvent::Chunk(chunk.to_vec()));
            emitted += chunk.len();
            sink(ExportEvent::Progress((emitted * 100 / total) as u8));
        }
        sink(ExportEvent::Done);
        Ok(())
    }
}
