//! Container reader task.
//!
//! Pulls the source stream chunk by chunk through an [`Mp4Demuxer`]. The track
//! configuration is read up front so the orchestrator can build the codec
//! stages; the samples are then forwarded into the decode stage's channel.

use std::sync::Arc;

use media_types::{EncodedChunk, TrackConfig};
use mp4::{DemuxEvent, Mp4Demuxer};
use pipeline_common::{PipelineContext, PipelineError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Result, TranscodeError};
use crate::source::SourceFile;
use crate::stats::RunCounters;

pub(crate) const STAGE_NAME: &str = "container reader";

pub struct ContainerReader {
    name: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    demuxer: Mp4Demuxer,
    buf: Vec<u8>,
    eof: bool,
    counters: Arc<RunCounters>,
}

impl ContainerReader {
    pub(crate) fn new(source: SourceFile, chunk_size: usize, counters: Arc<RunCounters>) -> Self {
        Self {
            name: source.name.clone(),
            reader: source.into_reader(),
            demuxer: Mp4Demuxer::new(),
            buf: vec![0; chunk_size.max(1)],
            eof: false,
            counters,
        }
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.demuxer.received()
    }

    /// Read until the first video track is identified.
    pub async fn read_config(&mut self) -> Result<TrackConfig> {
        loop {
            match self.demuxer.next_event()? {
                Some(DemuxEvent::Config(config)) => {
                    debug!(
                        source = %self.name,
                        codec = %config.codec,
                        width = config.coded_width,
                        height = config.coded_height,
                        offset = self.offset(),
                        "Track configuration resolved"
                    );
                    return Ok(config);
                }
                Some(DemuxEvent::Sample(_)) => {
                    warn!(source = %self.name, "Sample before track configuration, dropped");
                }
                None if self.eof => {
                    return Err(mp4::DemuxError::MissingMoov {
                        received: self.offset(),
                    }
                    .into());
                }
                None => self.fill().await?,
            }
        }
    }

    /// The next sample in container order, or `None` at the end of the track.
    pub async fn next_sample(&mut self) -> Result<Option<EncodedChunk>> {
        loop {
            match self.demuxer.next_event()? {
                Some(DemuxEvent::Sample(sample)) => {
                    RunCounters::add(&self.counters.samples_read, 1);
                    return Ok(Some(sample));
                }
                Some(DemuxEvent::Config(_)) => {
                    warn!(source = %self.name, "Repeated track configuration ignored");
                }
                None if self.eof => return Ok(None),
                None => self.fill().await?,
            }
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
            debug!(source = %self.name, received = self.offset(), "Source exhausted");
            self.demuxer.flush()?;
            return Ok(());
        }
        RunCounters::add(&self.counters.bytes_read, n as u64);
        self.demuxer.push(&self.buf[..n])?;
        Ok(())
    }

    /// Forward every remaining sample into `output`.
    ///
    /// On failure the run is cancelled before `output` closes.
    pub(crate) fn spawn(
        mut self,
        context: Arc<PipelineContext>,
        output: mpsc::Sender<EncodedChunk>,
    ) -> JoinHandle<std::result::Result<(), PipelineError>> {
        tokio::spawn(async move {
            let result = self.forward(&context, &output).await;
            if let Err(err) = &result {
                if err.is_consequence() {
                    debug!(stage = STAGE_NAME, error = %err, "Stage stopped");
                } else {
                    error!(stage = STAGE_NAME, error = %err, "Stage failed");
                    context.token.cancel();
                }
            }
            drop(output);
            result
        })
    }

    async fn forward(
        &mut self,
        context: &PipelineContext,
        output: &mpsc::Sender<EncodedChunk>,
    ) -> std::result::Result<(), PipelineError> {
        let mut forwarded: u64 = 0;
        loop {
            let sample = tokio::select! {
                _ = context.token.cancelled() => return Err(PipelineError::Cancelled),
                sample = self.next_sample() => sample.map_err(reader_error)?,
            };
            let Some(sample) = sample else {
                break;
            };

            tokio::select! {
                _ = context.token.cancelled() => return Err(PipelineError::Cancelled),
                sent = output.send(sample) => {
                    sent.map_err(|_| PipelineError::ChannelClosed("decode stage"))?;
                }
            }
            forwarded += 1;
        }

        debug!(
            stage = STAGE_NAME,
            forwarded,
            bytes = self.offset(),
            "Stage drained"
        );
        Ok(())
    }
}

fn reader_error(err: TranscodeError) -> PipelineError {
    PipelineError::StageProcess {
        stage: STAGE_NAME,
        source: Box::new(err),
    }
}
