//! Decode stage: encoded samples to raw frames.

use std::sync::Arc;

use media_types::{EncodedChunk, RawFrame, TrackConfig};
use pipeline_common::{PipelineContext, PipelineError, Stage};
use tracing::{debug, trace};

use crate::engine::{CodecEngine, EngineError, VideoDecoder};
use crate::error::{Result, TranscodeError};
use crate::reorder::ReorderBuffer;
use crate::stats::RunCounters;

/// Decodes the samples of one track.
///
/// Every submitted sample yields exactly one frame. Frames leave in
/// presentation order even when the engine emits them out of order.
pub struct DecodeStage {
    decoder: Box<dyn VideoDecoder>,
    reorder: ReorderBuffer<RawFrame>,
    submitted: u64,
    produced: u64,
    counters: Arc<RunCounters>,
}

impl DecodeStage {
    /// Create and configure a decoder for `track`.
    pub(crate) fn new(
        engine: &dyn CodecEngine,
        track: &TrackConfig,
        counters: Arc<RunCounters>,
    ) -> Result<Self> {
        let config = track.decoder_config();
        let rejected = |reason: String| TranscodeError::DecoderConfigRejected {
            codec: config.codec.clone(),
            reason,
        };

        if !engine.is_decoder_config_supported(&config) {
            return Err(rejected(format!("not supported by {}", engine.name())));
        }
        let mut decoder = engine
            .create_decoder()
            .map_err(|e| rejected(e.to_string()))?;
        decoder
            .configure(&config)
            .map_err(|e| rejected(e.to_string()))?;

        let depth = decoder.output_reorder_depth();
        debug!(
            codec = %config.codec,
            resolution = %config.resolution(),
            reorder_depth = depth,
            "Decoder configured"
        );

        Ok(Self {
            decoder,
            reorder: ReorderBuffer::new(depth),
            submitted: 0,
            produced: 0,
            counters,
        })
    }

    fn drain(
        &mut self,
        output: &mut dyn FnMut(RawFrame) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        while let Some(frame) = self.decoder.receive_frame().map_err(decode_error)? {
            self.produced += 1;
            RunCounters::add(&self.counters.frames_decoded, 1);
            if let Some(frame) = self.reorder.push(frame) {
                output(frame)?;
            }
        }
        Ok(())
    }
}

fn decode_error(err: EngineError) -> PipelineError {
    PipelineError::strategy(TranscodeError::Decode(err))
}

impl Stage for DecodeStage {
    type Input = EncodedChunk;
    type Output = RawFrame;

    fn name(&self) -> &'static str {
        "decode"
    }

    fn process(
        &mut self,
        _context: &PipelineContext,
        input: EncodedChunk,
        output: &mut dyn FnMut(RawFrame) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        trace!(
            timestamp_us = input.timestamp_us,
            kind = %input.kind,
            size = input.len(),
            "Decoding sample"
        );
        self.decoder.decode(&input).map_err(decode_error)?;
        self.submitted += 1;
        self.drain(output)
    }

    fn finish(
        &mut self,
        _context: &PipelineContext,
        output: &mut dyn FnMut(RawFrame) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        self.decoder.flush().map_err(decode_error)?;
        self.drain(output)?;
        for frame in self.reorder.drain() {
            output(frame)?;
        }

        if self.produced != self.submitted {
            return Err(PipelineError::strategy(TranscodeError::DecodeIncomplete {
                submitted: self.submitted,
                produced: self.produced,
            }));
        }
        debug!(frames = self.produced, "Decoder drained");
        Ok(())
    }
}
