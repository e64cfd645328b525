//! One end-to-end transcode run.
//!
//! ```text
//! Idle -> Reading -> Transcoding -> Finalizing -> Done
//!            \            \              \
//!             +------------+--------------+---> Failed
//! ```
//!
//! The reader resolves the track configuration first. Every capability check
//! runs before any stage is spawned, so an unsupported input or target fails
//! without writing a single chunk.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use media_types::TrackConfig;
use pipeline_common::{
    CancellationToken, PipelineContext, PipelineError, settle_run, spawn_sink, spawn_stage,
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use webm::{WebmWriter, WebmWriterConfig};

use crate::config::TranscodeConfig;
use crate::engine::CodecEngine;
use crate::error::{Result, TranscodeError};
use crate::notification::{Notification, Notifier, RunState};
use crate::reader::ContainerReader;
use crate::render::RenderTarget;
use crate::source::SourceFile;
use crate::stages::{DecodeStage, PreviewStage, TranscodeStage, WebmSink};
use crate::stats::{RunCounters, RunStats};

const WRITING_APP: &str = concat!("transcoder-", env!("CARGO_PKG_VERSION"));

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub filename: String,
    pub bytes: Bytes,
    pub stats: RunStats,
    /// The input track that was transcoded.
    pub track: TrackConfig,
}

/// Runs the transcode pipeline for one input at a time.
pub struct Transcoder {
    engine: Arc<dyn CodecEngine>,
    config: TranscodeConfig,
}

impl Transcoder {
    pub fn new(engine: Arc<dyn CodecEngine>, config: TranscodeConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Transcode `source`, rendering preview frames to `render`.
    ///
    /// State changes are reported through `notifier`. Dropping the returned
    /// future cancels every stage of the run.
    pub async fn run(
        &self,
        source: SourceFile,
        render: Box<dyn RenderTarget>,
        notifier: &Notifier,
    ) -> Result<TranscodeOutput> {
        let name = source.name.clone();
        let started = Instant::now();

        let result = self.execute(source, render, notifier).await;
        match &result {
            Ok(output) => {
                transition(notifier, &name, RunState::Done);
                info!(
                    source = %name,
                    output = %output.filename,
                    bytes = output.bytes.len(),
                    chunks = output.stats.chunks_written,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transcode finished"
                );
            }
            Err(err) => {
                transition(notifier, &name, RunState::Failed);
                error!(
                    source = %name,
                    kind = ?err.kind(),
                    error = %err,
                    "Transcode failed"
                );
            }
        }
        result
    }

    async fn execute(
        &self,
        source: SourceFile,
        render: Box<dyn RenderTarget>,
        notifier: &Notifier,
    ) -> Result<TranscodeOutput> {
        let config = &self.config;
        let target = &config.target;
        let name = source.name.clone();

        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();
        let context = Arc::new(PipelineContext::with_name(name.clone(), token));
        let counters = RunCounters::shared();

        transition(notifier, &name, RunState::Reading);
        info!(source = %name, size = source.size, encoder = %target, "Transcode started");

        let mut reader = ContainerReader::new(source, config.read_chunk_size, counters.clone());
        let track = reader.read_config().await?;

        let mut writer_config =
            WebmWriterConfig::for_codec(&target.codec, target.width, target.height)
                .map_err(|e| TranscodeError::EncoderConfigUnsupported {
                    config: target.to_string(),
                    reason: e.to_string(),
                })?
                .with_writing_app(WRITING_APP);
        if let Some(fps) = target.framerate {
            writer_config = writer_config.with_frame_rate(fps);
        }

        let decode = DecodeStage::new(self.engine.as_ref(), &track, counters.clone())?;
        let (config_tx, config_rx) = watch::channel(None);
        let transcode = TranscodeStage::new(
            self.engine.as_ref(),
            target,
            config.keyframe_interval_ms,
            counters.clone(),
        )?
        .with_config_watch(config_tx);
        let mut preview = PreviewStage::new(
            self.engine.clone(),
            render,
            notifier.clone(),
            counters.clone(),
        );
        if !config.preview {
            preview = preview.disabled();
        }

        transition(notifier, &name, RunState::Transcoding);

        let capacity = config.channel_capacity.max(1);
        let (sample_tx, sample_rx) = mpsc::channel(capacity);
        let reader_task = reader.spawn(context.clone(), sample_tx);
        let (frame_rx, decode_task) = spawn_stage(decode, context.clone(), sample_rx, capacity);
        let (item_rx, transcode_task) =
            spawn_stage(transcode, context.clone(), frame_rx, capacity);
        let (chunk_rx, preview_task) = spawn_stage(preview, context.clone(), item_rx, capacity);
        let sink_task = spawn_sink(
            WebmSink::new(WebmWriter::new(writer_config), counters.clone()),
            context.clone(),
            chunk_rx,
        );

        let sink_result = match sink_task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(PipelineError::Cancelled),
            Err(join_error) => Err(PipelineError::strategy(std::io::Error::other(format!(
                "writer task panicked: {join_error}"
            )))),
        };
        let sink = settle_run(
            sink_result,
            vec![reader_task, decode_task, transcode_task, preview_task],
        )
        .await
        .map_err(|e| TranscodeError::from(e.into_inner()))?;

        transition(notifier, &name, RunState::Finalizing);

        let mut writer = sink.into_writer();
        let description = config_rx
            .borrow()
            .as_ref()
            .and_then(|record| record.description.clone());
        if description.is_some() {
            writer.set_codec_private(description)?;
        }
        let bytes = writer.complete()?;

        RunCounters::add(&counters.bytes_written, bytes.len() as u64);
        let stats = counters.snapshot();
        info!(
            source = %name,
            samples = stats.samples_read,
            frames = stats.frames_decoded,
            chunks = stats.chunks_written,
            preview_frames = stats.preview_frames,
            duration_ms = writer.stats().duration_ms,
            "Container finalized"
        );

        Ok(TranscodeOutput {
            filename: config.output_filename(&name),
            bytes,
            stats,
            track,
        })
    }
}

fn transition(notifier: &Notifier, source: &str, state: RunState) {
    info!(source, %state, "Run state changed");
    notifier.send(Notification::StateChanged { state });
}
