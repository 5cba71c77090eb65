pub mod buf;
pub mod decode;
pub mod encode;
pub mod error;
pub mod format;
pub mod model;
pub mod rle;
pub mod strings;
pub mod varint;

pub use decode::{decode, decode_header};
pub use encode::encode;
pub use error::{DecodeError, EncodeError};
pub use format::{Header, HEADER_SIZE, MAGIC, VERSION};
pub use model::{
    ByteRange, DataPoint, MemoryConclusion, MemoryMetadata, MemorySeries, Occupancy, Page,
    PageType, PageTypeStats, PointMeta,
};
