//! Preview stage: re-decodes the transcoded stream for display and forwards
//! the chunks to the writer unchanged.
//!
//! The preview is best effort. Any preview decoder failure disables the
//! preview for the rest of the run; persistence is never affected.

use std::sync::Arc;

use media_types::{DecoderConfig, EncodedChunk, RawFrame};
use pipeline_common::{PipelineContext, PipelineError, Stage};
use tracing::{debug, trace, warn};

use crate::engine::{CodecEngine, EngineError, VideoDecoder};
use crate::notification::{Notification, Notifier};
use crate::render::RenderTarget;
use crate::reorder::ReorderBuffer;
use crate::stats::RunCounters;
use crate::stages::TranscodedItem;

pub struct PreviewStage {
    engine: Arc<dyn CodecEngine>,
    decoder: Option<Box<dyn VideoDecoder>>,
    reorder: ReorderBuffer<RawFrame>,
    render: Box<dyn RenderTarget>,
    enabled: bool,
    notifier: Notifier,
    counters: Arc<RunCounters>,
}

impl PreviewStage {
    pub(crate) fn new(
        engine: Arc<dyn CodecEngine>,
        render: Box<dyn RenderTarget>,
        notifier: Notifier,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            engine,
            decoder: None,
            reorder: ReorderBuffer::new(0),
            render,
            enabled: true,
            notifier,
            counters,
        }
    }

    /// Forward chunks without decoding them.
    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self, config: &DecoderConfig) -> Result<(), EngineError> {
        // Frames of the previous configuration are shown before switching.
        self.flush_decoder()?;
        self.decoder = None;

        if !self.engine.is_decoder_config_supported(config) {
            return Err(EngineError::Unsupported(format!(
                "{} cannot decode {}",
                self.engine.name(),
                config.codec
            )));
        }
        let mut decoder = self.engine.create_decoder()?;
        decoder.configure(config)?;
        self.reorder = ReorderBuffer::new(decoder.output_reorder_depth());
        self.decoder = Some(decoder);

        debug!(
            codec = %config.codec,
            resolution = %config.resolution(),
            "Preview decoder configured"
        );
        Ok(())
    }

    fn decode(&mut self, chunk: &EncodedChunk) -> Result<(), EngineError> {
        let Some(decoder) = self.decoder.as_mut() else {
            trace!(timestamp_us = chunk.timestamp_us, "No preview decoder, chunk not shown");
            return Ok(());
        };
        decoder.decode(chunk)?;
        self.render_available()
    }

    fn render_available(&mut self) -> Result<(), EngineError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        while let Some(frame) = decoder.receive_frame()? {
            if let Some(frame) = self.reorder.push(frame) {
                RunCounters::add(&self.counters.preview_frames, 1);
                self.render.render(frame);
            }
        }
        Ok(())
    }

    fn flush_decoder(&mut self) -> Result<(), EngineError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        decoder.flush()?;
        self.render_available()?;
        for frame in self.reorder.drain() {
            RunCounters::add(&self.counters.preview_frames, 1);
            self.render.render(frame);
        }
        Ok(())
    }

    fn disable(&mut self, err: EngineError) {
        let reason = err.to_string();
        warn!(error = %reason, "Preview decoding failed, preview disabled");
        self.enabled = false;
        self.decoder = None;
        // Held frames are released without being shown.
        drop(self.reorder.drain());
        self.notifier
            .send(Notification::PreviewDisabled { reason });
    }
}

impl Stage for PreviewStage {
    type Input = TranscodedItem;
    type Output = EncodedChunk;

    fn name(&self) -> &'static str {
        "preview"
    }

    fn process(
        &mut self,
        _context: &PipelineContext,
        input: TranscodedItem,
        output: &mut dyn FnMut(EncodedChunk) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        match input {
            TranscodedItem::Config(config) => {
                if self.enabled
                    && let Err(err) = self.configure(&config)
                {
                    self.disable(err);
                }
                Ok(())
            }
            TranscodedItem::Chunk(chunk) => {
                if self.enabled
                    && let Err(err) = self.decode(&chunk)
                {
                    self.disable(err);
                }
                output(chunk)
            }
        }
    }

    fn finish(
        &mut self,
        _context: &PipelineContext,
        _output: &mut dyn FnMut(EncodedChunk) -> std::result::Result<(), PipelineError>,
    ) -> std::result::Result<(), PipelineError> {
        if self.enabled
            && let Err(err) = self.flush_decoder()
        {
            self.disable(err);
        }
        debug!(
            rendered = self.counters.snapshot().preview_frames,
            enabled = self.enabled,
            "Preview drained"
        );
        Ok(())
    }
}
