pub mod json;
pub mod session;
pub mod worker;

pub use json::{encode_json, json_chunks};
pub use session::{ExportError, ExportEvent, ExportSession, DEFAULT_CHUNK_BYTES};
pub use worker::{export_streamed, ExportMsg, ExportWorker, DEFAULT_BATCH_POINTS};
