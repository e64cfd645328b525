//! Terminal sink feeding the WebM writer.

use std::sync::Arc;

use media_types::EncodedChunk;
use pipeline_common::{PipelineContext, PipelineError, Sink};
use webm::WebmWriter;

use crate::error::TranscodeError;
use crate::stats::RunCounters;

pub struct WebmSink {
    writer: WebmWriter,
    last_timestamp_us: Option<i64>,
    counters: Arc<RunCounters>,
}

impl WebmSink {
    pub(crate) fn new(writer: WebmWriter, counters: Arc<RunCounters>) -> Self {
        Self {
            writer,
            last_timestamp_us: None,
            counters,
        }
    }

    /// The writer, ready to be completed.
    pub fn into_writer(self) -> WebmWriter {
        self.writer
    }
}

impl Sink for WebmSink {
    type Item = EncodedChunk;

    fn name(&self) -> &'static str {
        "writer"
    }

    fn accept(&mut self, _context: &PipelineContext, item: EncodedChunk) -> Result<(), PipelineError> {
        if let Some(last) = self.last_timestamp_us
            && item.timestamp_us < last
        {
            tracing::warn!(
                timestamp_us = item.timestamp_us,
                previous_us = last,
                "Chunk timestamp went backwards"
            );
        }
        self.last_timestamp_us = Some(item.timestamp_us);

        RunCounters::add(&self.counters.chunks_written, 1);
        self.writer
            .add_chunk(item)
            .map_err(|e| PipelineError::strategy(TranscodeError::Writer(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use bytes::Bytes;
    use media_types::ChunkKind;
    use webm::WebmWriterConfig;

    #[test]
    fn test_accept_after_complete_is_misuse() {
        let mut writer = WebmWriter::new(WebmWriterConfig::for_codec("vp8", 32, 24).unwrap());
        writer.complete().unwrap();

        let mut sink = WebmSink::new(writer, RunCounters::shared());
        let chunk = EncodedChunk::new(ChunkKind::Key, 0, 40_000, Bytes::from_static(b"k"));
        let err = sink
            .accept(&PipelineContext::default(), chunk)
            .unwrap_err();
        let err = TranscodeError::from(err);
        assert_eq!(err.kind(), ErrorKind::WriterMisuse);
        assert!(err.to_string().starts_with("container writer: "));
    }

    #[test]
    fn test_chunks_reach_writer() {
        let writer = WebmWriter::new(WebmWriterConfig::for_codec("vp8", 32, 24).unwrap());
        let counters = RunCounters::shared();
        let mut sink = WebmSink::new(writer, counters.clone());
        for index in 0..3 {
            let kind = if index == 0 {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            };
            let chunk = EncodedChunk::new(kind, index * 40_000, 40_000, Bytes::from_static(b"c"));
            sink.accept(&PipelineContext::default(), chunk).unwrap();
        }
        assert_eq!(counters.snapshot().chunks_written, 3);
        let mut writer = sink.into_writer();
        assert_eq!(writer.stats().blocks, 3);
        let info = webm::probe(&writer.complete().unwrap()).unwrap();
        assert_eq!(info.blocks.len(), 3);
    }
}
