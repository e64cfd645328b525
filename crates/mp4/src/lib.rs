//! # mp4
//!
//! Incremental demuxing of progressive MP4 (ISOBMFF) files.
//!
//! [`Mp4Demuxer`] accepts the input in arbitrary chunks, resolves the first
//! video track once the `moov` box is complete and then yields that track's
//! samples in container order:
//!
//! ```no_run
//! use mp4::{DemuxEvent, Mp4Demuxer};
//!
//! # fn run(chunks: Vec<Vec<u8>>) -> mp4::Result<()> {
//! let mut demuxer = Mp4Demuxer::new();
//! for chunk in &chunks {
//!     demuxer.push(chunk)?;
//!     while let Some(event) = demuxer.next_event()? {
//!         match event {
//!             DemuxEvent::Config(config) => println!("codec {}", config.codec),
//!             DemuxEvent::Sample(sample) => println!("sample at {}us", sample.timestamp_us),
//!         }
//!     }
//! }
//! demuxer.flush()?;
//! # Ok(())
//! # }
//! ```

mod box_utils;
pub mod codec;
mod demuxer;
pub mod error;
mod sample_table;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use codec::{CodecBox, CodecConfigBox};
pub use demuxer::{DemuxEvent, Mp4Demuxer, VideoTrack, demux_chunks, parse_moov};
pub use error::{DemuxError, Result};
pub use sample_table::{MAX_SAMPLE_COUNT, SampleInfo};
