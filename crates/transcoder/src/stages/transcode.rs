//! Transcode stage: raw frames to encoded chunks at the target configuration.

use std::sync::Arc;

use media_types::{DecoderConfig, EncodedChunk, RawFrame};
use pipeline_common::{PipelineContext, PipelineError, Stage};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::config::EncoderConfig;
use crate::engine::{CodecEngine, EncodeOptions, EncodedOutput, EngineError, VideoEncoder};
use crate::error::{Result, TranscodeError};
use crate::reorder::ReorderBuffer;
use crate::stats::RunCounters;

/// Output of the transcode stage.
///
/// A `Config` record precedes the first chunk, and every chunk whose decoder
/// configuration differs from the previous record.
#[derive(Debug)]
pub enum TranscodedItem {
    Config(DecoderConfig),
    Chunk(EncodedChunk),
}

pub struct TranscodeStage {
    encoder: Box<dyn VideoEncoder>,
    target: EncoderConfig,
    reorder: ReorderBuffer<EncodedOutput>,
    keyframe_interval_us: i64,
    next_keyframe_at: Option<i64>,
    /// Reported by the engine but not yet attached to a released chunk.
    pending_config: Option<DecoderConfig>,
    last_config: Option<DecoderConfig>,
    config_tx: Option<watch::Sender<Option<DecoderConfig>>>,
    counters: Arc<RunCounters>,
}

impl TranscodeStage {
    /// Verify `target` against the engine, then create and configure an encoder.
    pub(crate) fn new(
        engine: &dyn CodecEngine,
        target: &EncoderConfig,
        keyframe_interval_ms: u64,
        counters: Arc<RunCounters>,
    ) -> Result<Self> {
        let unsupported = |reason: String| TranscodeError::EncoderConfigUnsupported {
            config: target.to_string(),
            reason,
        };

        if target.resolution().is_empty() {
            return Err(unsupported("empty output resolution".to_string()));
        }
        if !engine.is_encoder_config_supported(target) {
            return Err(unsupported(format!("rejected by {}", engine.name())));
        }
        let mut encoder = engine
            .create_encoder()
            .map_err(|e| unsupported(e.to_string()))?;
        encoder
            .configure(target)
            .map_err(|e| unsupported(e.to_string()))?;

        let depth = encoder.output_reorder_depth();
        info!(
            encoder = %target,
            hardware_acceleration = ?target.hardware_acceleration,
            reorder_depth = depth,
            "Encoder configured"
        );

        Ok(Self {
            encoder,
            target: target.clone(),
            reorder: ReorderBuffer::new(depth),
            keyframe_interval_us: (keyframe_interval_ms as i64).saturating_mul(1_000),
            next_keyframe_at: None,
            pending_config: None,
            last_config: None,
            config_tx: None,
            counters,
        })
    }

    /// Publish the first emitted configuration record to `tx`. It describes
    /// the stream from its first key frame, so it is the one a container
    /// header carries.
    pub(crate) fn with_config_watch(mut self, tx: watch::Sender<Option<DecoderConfig>>) -> Self {
        self.config_tx = Some(tx);
        self
    }

    fn wants_key_frame(&mut self, timestamp_us: i64) -> bool {
        let key = match self.next_keyframe_at {
            None => true,
            Some(at) => timestamp_us >= at,
        };
        if key {
            self.next_keyframe_at = Some(timestamp_us.saturating_add(self.keyframe_interval_us));
        }
        key
    }

    fn drain(
        &mut self,
        output: &mut dyn FnMut(TranscodedItem) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        while let Some(mut encoded) = self.encoder.receive_chunk().map_err(encode_error)? {
            // A configuration applies from the engine's next output on, which
            // is not necessarily the chunk it arrived with once resequenced.
            if let Some(config) = encoded.decoder_config.take() {
                self.pending_config = Some(config);
            }
            if let Some(encoded) = self.reorder.push(encoded) {
                self.emit(encoded, output)?;
            }
        }
        Ok(())
    }

    fn emit(
        &mut self,
        encoded: EncodedOutput,
        output: &mut dyn FnMut(TranscodedItem) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        let config = match self.pending_config.take() {
            Some(config) => Some(config),
            // The engine never described its output; derive it from the target.
            None if self.last_config.is_none() => Some(DecoderConfig::new(
                self.target.codec.clone(),
                self.target.width,
                self.target.height,
            )),
            None => None,
        };

        if let Some(config) = config
            && self.last_config.as_ref() != Some(&config)
        {
            debug!(
                codec = %config.codec,
                resolution = %config.resolution(),
                description_len = config.description.as_ref().map_or(0, |d| d.len()),
                "Emitting configuration record"
            );
            if let Some(tx) = &self.config_tx {
                tx.send_if_modified(|slot| {
                    if slot.is_some() {
                        return false;
                    }
                    *slot = Some(config.clone());
                    true
                });
            }
            self.last_config = Some(config.clone());
            output(TranscodedItem::Config(config))?;
        }

        RunCounters::add(&self.counters.chunks_encoded, 1);
        output(TranscodedItem::Chunk(encoded.chunk))
    }
}

fn encode_error(err: EngineError) -> PipelineError {
    PipelineError::strategy(TranscodeError::Encode(err))
}

impl Stage for TranscodeStage {
    type Input = RawFrame;
    type Output = TranscodedItem;

    fn name(&self) -> &'static str {
        "transcode"
    }

    fn process(
        &mut self,
        _context: &PipelineContext,
        input: RawFrame,
        output: &mut dyn FnMut(TranscodedItem) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        let key_frame = self.wants_key_frame(input.timestamp_us);
        trace!(timestamp_us = input.timestamp_us, key_frame, "Encoding frame");

        let submitted = self.encoder.encode(&input, EncodeOptions { key_frame });
        // The encoder is done with the frame whether or not it accepted it.
        input.close();
        submitted.map_err(encode_error)?;
        RunCounters::add(&self.counters.frames_encoded, 1);

        self.drain(output)
    }

    fn finish(
        &mut self,
        _context: &PipelineContext,
        output: &mut dyn FnMut(TranscodedItem) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        self.encoder.flush().map_err(encode_error)?;
        self.drain(output)?;
        for encoded in self.reorder.drain() {
            self.emit(encoded, output)?;
        }
        debug!(
            frames = self.counters.snapshot().frames_encoded,
            "Encoder drained"
        );
        Ok(())
    }
}
