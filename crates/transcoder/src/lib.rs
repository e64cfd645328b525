//! # Transcoder
//!
//! Transcodes the first video track of an MP4 file into a WebM file while
//! rendering a live preview of the transcoded stream.
//!
//! ## Pipeline
//!
//! - container reader: incremental MP4 demux into timestamped samples
//! - decode stage: samples to raw frames
//! - transcode stage: raw frames to chunks at the target configuration,
//!   preceded by a configuration record
//! - preview stage: decodes the chunks again for the render target and
//!   forwards them unchanged
//! - writer: WebM muxing, finalized once every chunk has been accepted
//!
//! Stages run on the blocking pool connected by bounded channels, so at most a
//! handful of frames are alive at any time regardless of input size.
//!
//! Codecs are supplied through the [`CodecEngine`] trait. [`TranscodeWorker`]
//! runs one [`Transcoder`] job per input and reports [`JobStatus`] messages.
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod config;
pub mod engine;
pub mod error;
pub mod notification;
pub mod orchestrator;
pub mod reader;
pub mod render;
pub mod reorder;
pub mod source;
pub mod stages;
mod stats;
pub mod upload;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::{EncoderConfig, HardwareAcceleration, TranscodeConfig, TranscodeConfigBuilder};
pub use engine::{
    CodecEngine, EncodeOptions, EncodedOutput, EngineError, VideoDecoder, VideoEncoder,
};
pub use error::{ErrorKind, Result, TranscodeError};
pub use notification::{Notification, Notifier, RunState};
pub use orchestrator::{TranscodeOutput, Transcoder};
pub use render::{DiscardTarget, RenderTarget};
pub use source::SourceFile;
pub use stats::RunStats;
pub use upload::{HttpUploadConfig, HttpUploadService, UploadError, UploadRequest, UploadService};
pub use worker::{JobHandle, JobReport, JobStatus, TranscodeJob, TranscodeWorker};
