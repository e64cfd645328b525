//! Codec engine seam.
//!
//! Decoding and encoding are delegated to a [`CodecEngine`]. Engines are
//! submission based: a sample or frame goes in, and zero or more outputs can be
//! collected afterwards. `flush` completes every pending submission.
//!
//! Engines may hold back or reorder their output; an engine that can emit out
//! of presentation order reports how far through `output_reorder_depth`, and
//! the stages resequence with a [`ReorderBuffer`](crate::reorder::ReorderBuffer)
//! of that depth.

use media_types::{DecoderConfig, EncodedChunk, RawFrame, Timestamped};
use thiserror::Error;

use crate::config::EncoderConfig;

/// Errors reported by a codec engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("engine used before configure")]
    NotConfigured,

    #[error("{0}")]
    Failed(String),

    #[error("engine closed")]
    Closed,
}

/// Per-frame encode request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub key_frame: bool,
}

impl EncodeOptions {
    pub fn key_frame() -> Self {
        Self { key_frame: true }
    }
}

/// One chunk produced by an encoder.
///
/// `decoder_config` is set when the engine reports how its output must be
/// decoded, which at least happens alongside the first chunk.
#[derive(Debug)]
pub struct EncodedOutput {
    pub chunk: EncodedChunk,
    pub decoder_config: Option<DecoderConfig>,
}

impl EncodedOutput {
    pub fn new(chunk: EncodedChunk) -> Self {
        Self {
            chunk,
            decoder_config: None,
        }
    }

    pub fn with_decoder_config(mut self, config: DecoderConfig) -> Self {
        self.decoder_config = Some(config);
        self
    }
}

impl Timestamped for EncodedOutput {
    fn timestamp_us(&self) -> i64 {
        self.chunk.timestamp_us
    }
}

pub trait VideoDecoder: Send {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), EngineError>;

    /// Submit one encoded sample.
    fn decode(&mut self, chunk: &EncodedChunk) -> Result<(), EngineError>;

    /// Collect the next available frame, if any.
    fn receive_frame(&mut self) -> Result<Option<RawFrame>, EngineError>;

    /// Complete all pending submissions. Their frames become available through
    /// `receive_frame`.
    fn flush(&mut self) -> Result<(), EngineError>;

    /// How many frames may be emitted ahead of an earlier-timestamped one.
    fn output_reorder_depth(&self) -> usize {
        0
    }
}

pub trait VideoEncoder: Send {
    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EngineError>;

    /// Submit one raw frame. The frame may be released as soon as this returns.
    fn encode(&mut self, frame: &RawFrame, options: EncodeOptions) -> Result<(), EngineError>;

    fn receive_chunk(&mut self) -> Result<Option<EncodedOutput>, EngineError>;

    fn flush(&mut self) -> Result<(), EngineError>;

    fn output_reorder_depth(&self) -> usize {
        0
    }
}

/// Factory and capability queries for one codec implementation.
///
/// The capability queries are pure: they hold no state and may be called any
/// number of times before a run commits resources.
pub trait CodecEngine: Send + Sync {
    fn name(&self) -> &str;

    fn is_decoder_config_supported(&self, config: &DecoderConfig) -> bool;

    fn is_encoder_config_supported(&self, config: &EncoderConfig) -> bool;

    fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, EngineError>;

    fn create_encoder(&self) -> Result<Box<dyn VideoEncoder>, EngineError>;
}
