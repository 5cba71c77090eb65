//! Bounded-channel export worker.
//!
//! The coordinator holds the full data model; the worker owns the
//! accumulating [`ExportSession`]. Messages cross a bounded channel so a
//! huge point array is transferred as many small copies instead of one
//! enormous synchronous one; the channel's backpressure keeps per-step
//! latency bounded for the coordinator.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use memd_core::{DataPoint, MemorySeries};

use crate::session::{ExportError, ExportEvent, ExportSession};

/// Points transferred per BATCH message by [`export_streamed`].
pub const DEFAULT_BATCH_POINTS: usize = 20;

/// The three phases of the export exchange.
pub enum ExportMsg {
    /// Series metadata only; any points on the payload are dropped.
    Init(Vec<MemorySeries>),
    /// A deep-copied slice of one series' points.
    Batch {
        series_index: usize,
        points: Vec<DataPoint>,
    },
    /// All batches sent; encode and emit.
    Process,
}

/// Handle to a worker thread running one export session.
pub struct ExportWorker {
    tx: SyncSender<ExportMsg>,
    events: Receiver<ExportEvent>,
    handle: JoinHandle<Result<(), ExportError>>,
}

impl ExportWorker {
    /// Spawn a worker emitting output chunks of at most `chunk_bytes`.
    pub fn spawn(chunk_bytes: usize) -> Self {
        let (tx, rx) = sync_channel::<ExportMsg>(1);
        let (event_tx, events) = sync_channel::<ExportEvent>(4);
        let handle = thread::spawn(move || run(rx, event_tx, chunk_bytes));
        Self { tx, events, handle }
    }

    pub fn send(&self, msg: ExportMsg) -> Result<(), ExportError> {
        self.tx.send(msg).map_err(|_| ExportError::WorkerGone)
    }

    /// Event stream emitted during PROCESS.
    pub fn events(&self) -> &Receiver<ExportEvent> {
        &self.events
    }

    /// Wait for the worker and surface any export error.
    pub fn join(self) -> Result<(), ExportError> {
        drop(self.tx);
        self.handle.join().map_err(|_| ExportError::WorkerGone)?
    }
}

fn run(
    rx: Receiver<ExportMsg>,
    events: SyncSender<ExportEvent>,
    chunk_bytes: usize,
) -> Result<(), ExportError> {
    let mut session: Option<ExportSession> = None;
    while let Ok(msg) = rx.recv() {
        match msg {
            ExportMsg::Init(metas) => session = Some(ExportSession::begin(&metas)),
            ExportMsg::Batch {
                series_index,
                points,
            } => match session.as_mut() {
                Some(s) => s.append_points(series_index, &points)?,
                None => {
                    return Err(ExportError::UnknownSeries {
                        index: series_index,
                        count: 0,
                    })
                }
            },
            ExportMsg::Process => {
                let s = session.take().unwrap_or_else(|| ExportSession::begin(&[]));
                // A dropped receiver means the caller abandoned the export;
                // that is cancellation, not failure.
                s.finish_chunked(chunk_bytes, |event| {
                    let _ = events.send(event);
                })?;
                return Ok(());
            }
        }
    }
    // Coordinator hung up without PROCESS: discard the session.
    Ok(())
}

/// Drive the whole INIT/BATCH/PROCESS exchange for `series`, feeding every
/// [`ExportEvent`] to `sink`. The concatenated chunks are byte-identical to
/// a direct [`memd_core::encode`] of the same model.
pub fn export_streamed<F>(
    series: &[MemorySeries],
    batch_points: usize,
    chunk_bytes: usize,
    mut sink: F,
) -> Result<(), ExportError>
where
    F: FnMut(ExportEvent),
{
    let batch_points = batch_points.max(1);
    let worker = ExportWorker::spawn(chunk_bytes);

    let metas: Vec<MemorySeries> = series
        .iter()
        .map(|s| MemorySeries {
            id: s.id.clone(),
            name: s.name.clone(),
            color: s.color.clone(),
            visible: s.visible,
            data: Vec::new(),
        })
        .collect();
    worker.send(ExportMsg::Init(metas))?;

    for (series_index, s) in series.iter().enumerate() {
        for batch in s.data.chunks(batch_points) {
            worker.send(ExportMsg::Batch {
                series_index,
                points: batch.to_vec(),
            })?;
        }
    }
    worker.send(ExportMsg::Process)?;

    for event in worker.events() {
        let done = event == ExportEvent::Done;
        sink(event);
        if done {
            break;
        }
    }
    worker.join()
}
