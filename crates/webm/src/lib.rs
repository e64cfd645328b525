//! # webm
//!
//! Writes a single video track into an in-memory WebM file.
//!
//! ```
//! use bytes::Bytes;
//! use media_types::{ChunkKind, EncodedChunk};
//! use webm::{WebmWriter, WebmWriterConfig};
//!
//! let config = WebmWriterConfig::for_codec("vp8", 320, 240).unwrap();
//! let mut writer = WebmWriter::new(config);
//! writer
//!     .add_chunk(EncodedChunk::new(ChunkKind::Key, 0, 33_333, Bytes::from_static(b"frame")))
//!     .unwrap();
//! let file = writer.complete().unwrap();
//! assert_eq!(webm::probe(&file).unwrap().width, 320);
//! ```

pub mod ebml;
pub mod elements;
pub mod error;
mod probe;
mod writer;

pub use elements::codec_id_for;
pub use error::{Result, WebmError};
pub use probe::{BlockInfo, WebmInfo, probe};
pub use writer::{
    MAX_CLUSTER_DURATION_MS, TIMECODE_SCALE_NS, WebmStats, WebmWriter, WebmWriterConfig,
    WriterState,
};
