//! Pipeline stages.
//!
//! ```text
//! reader -> [samples] -> decode -> [frames] -> transcode -> [config | chunk]
//!        -> preview -> [chunks] -> writer
//! ```

mod decode;
mod preview;
mod transcode;
mod writer;

pub use decode::DecodeStage;
pub use preview::PreviewStage;
pub use transcode::{TranscodeStage, TranscodedItem};
pub use writer::WebmSink;
