//! In-memory WebM writer.
//!
//! Chunks are appended to clusters as they arrive; the EBML header, segment
//! info, track entry and cue index are assembled by [`WebmWriter::complete`],
//! once the final duration and every cluster position are known.

use bytes::{BufMut, Bytes, BytesMut};
use media_types::EncodedChunk;
use tracing::{debug, trace};

use crate::ebml::{write_element, write_float, write_id, write_string, write_uint, write_vint};
use crate::elements::*;
use crate::error::{Result, WebmError};

/// Nanoseconds per timecode tick: timestamps are stored in milliseconds.
pub const TIMECODE_SCALE_NS: u64 = 1_000_000;

/// Start a new cluster after this much time even without a key frame.
pub const MAX_CLUSTER_DURATION_MS: i64 = 5_000;

const VIDEO_TRACK_NUMBER: u64 = 1;

/// Track description for the single video track.
#[derive(Debug, Clone, PartialEq)]
pub struct WebmWriterConfig {
    /// WebM codec ID, e.g. `V_VP8`.
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
    pub codec_private: Option<Bytes>,
    /// Nominal frame duration in nanoseconds.
    pub default_duration_ns: Option<u64>,
    pub writing_app: String,
}

impl WebmWriterConfig {
    pub fn new(codec_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            codec_id: codec_id.into(),
            width,
            height,
            codec_private: None,
            default_duration_ns: None,
            writing_app: concat!("webm-", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Build a configuration from a codec string such as `vp8` or `av01.0.04M.08`.
    pub fn for_codec(codec: &str, width: u32, height: u32) -> Result<Self> {
        let codec_id =
            codec_id_for(codec).ok_or_else(|| WebmError::UnsupportedCodec(codec.to_string()))?;
        Ok(Self::new(codec_id, width, height))
    }

    pub fn with_codec_private(mut self, codec_private: Bytes) -> Self {
        self.codec_private = Some(codec_private);
        self
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.default_duration_ns = Some((1_000_000_000.0 / fps) as u64);
        }
        self
    }

    pub fn with_writing_app(mut self, app: impl Into<String>) -> Self {
        self.writing_app = app.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct CueEntry {
    time_ms: u64,
    /// Offset of the cluster inside the cluster area.
    cluster_offset: u64,
}

#[derive(Debug)]
struct OpenCluster {
    timestamp_ms: i64,
    blocks: BytesMut,
    first_is_key: bool,
}

/// Writer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Completed,
}

/// Statistics of a written file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WebmStats {
    pub blocks: usize,
    pub key_blocks: usize,
    pub clusters: usize,
    pub payload_bytes: usize,
    pub duration_ms: f64,
}

/// Accumulates encoded chunks of one video track into a WebM file.
#[derive(Debug)]
pub struct WebmWriter {
    config: WebmWriterConfig,
    state: WriterState,
    clusters: BytesMut,
    current: Option<OpenCluster>,
    cues: Vec<CueEntry>,
    end_ms: f64,
    stats: WebmStats,
}

impl WebmWriter {
    pub fn new(config: WebmWriterConfig) -> Self {
        Self {
            config,
            state: WriterState::Open,
            clusters: BytesMut::new(),
            current: None,
            cues: Vec::new(),
            end_ms: 0.0,
            stats: WebmStats::default(),
        }
    }

    pub fn config(&self) -> &WebmWriterConfig {
        &self.config
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn stats(&self) -> WebmStats {
        self.stats
    }

    /// Replace the track's CodecPrivate. Track headers are only serialized by
    /// [`complete`](Self::complete), so this may be called while writing.
    pub fn set_codec_private(&mut self, codec_private: Option<Bytes>) -> Result<()> {
        if self.state == WriterState::Completed {
            return Err(WebmError::Misuse("set_codec_private called after complete"));
        }
        self.config.codec_private = codec_private;
        Ok(())
    }

    /// Append one chunk.
    ///
    /// A key frame opens a new cluster; so does a block whose timestamp cannot
    /// be expressed relative to the current cluster.
    pub fn add_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        if self.state == WriterState::Completed {
            return Err(WebmError::Misuse("add_chunk called after complete"));
        }

        let timestamp_ms = chunk.timestamp_us.max(0) / 1_000;
        let needs_cluster = match &self.current {
            None => true,
            Some(cluster) => {
                let relative = timestamp_ms - cluster.timestamp_ms;
                (chunk.is_key() && !cluster.blocks.is_empty())
                    || relative < i16::MIN as i64
                    || relative > i16::MAX as i64
                    || relative >= MAX_CLUSTER_DURATION_MS
            }
        };
        if needs_cluster {
            self.close_cluster()?;
            self.current = Some(OpenCluster {
                timestamp_ms,
                blocks: BytesMut::new(),
                first_is_key: chunk.is_key(),
            });
        }

        let Some(cluster) = self.current.as_mut() else {
            return Err(WebmError::Misuse("no open cluster"));
        };
        let relative = (timestamp_ms - cluster.timestamp_ms) as i16;

        let mut block = BytesMut::with_capacity(4 + chunk.len());
        write_vint(&mut block, VIDEO_TRACK_NUMBER)?;
        block.put_i16(relative);
        block.put_u8(if chunk.is_key() { 0x80 } else { 0x00 });
        block.put_slice(&chunk.data);
        write_element(&mut cluster.blocks, SIMPLE_BLOCK, &block).map_err(|_| {
            WebmError::BlockTooLarge {
                size: chunk.len(),
                timestamp_ms,
            }
        })?;

        trace!(
            timestamp_ms,
            relative,
            key = chunk.is_key(),
            size = chunk.len(),
            "Block written"
        );

        self.stats.blocks += 1;
        if chunk.is_key() {
            self.stats.key_blocks += 1;
        }
        self.stats.payload_bytes += chunk.len();
        self.end_ms = self.end_ms.max(chunk.end_us().max(0) as f64 / 1_000.0);
        Ok(())
    }

    fn close_cluster(&mut self) -> Result<()> {
        let Some(cluster) = self.current.take() else {
            return Ok(());
        };

        let cluster_offset = self.clusters.len() as u64;
        let mut body = BytesMut::with_capacity(cluster.blocks.len() + 8);
        write_uint(&mut body, TIMESTAMP, cluster.timestamp_ms as u64)?;
        body.put_slice(&cluster.blocks);
        write_element(&mut self.clusters, CLUSTER, &body)?;

        if cluster.first_is_key {
            self.cues.push(CueEntry {
                time_ms: cluster.timestamp_ms as u64,
                cluster_offset,
            });
        }
        self.stats.clusters += 1;
        Ok(())
    }

    /// Finalize the file and return it as one contiguous buffer.
    pub fn complete(&mut self) -> Result<Bytes> {
        if self.state == WriterState::Completed {
            return Err(WebmError::Misuse("complete called twice"));
        }
        self.close_cluster()?;
        self.state = WriterState::Completed;
        self.stats.duration_ms = self.end_ms;

        let info = self.info()?;
        let tracks = self.tracks()?;
        let clusters_start = (info.len() + tracks.len()) as u64;
        let cues = self.cues(clusters_start)?;

        let mut segment_body =
            BytesMut::with_capacity(info.len() + tracks.len() + self.clusters.len() + cues.len());
        segment_body.put_slice(&info);
        segment_body.put_slice(&tracks);
        segment_body.put_slice(&self.clusters);
        segment_body.put_slice(&cues);

        let mut out = ebml_header()?;
        write_element(&mut out, SEGMENT, &segment_body)?;

        debug!(
            codec_id = %self.config.codec_id,
            width = self.config.width,
            height = self.config.height,
            blocks = self.stats.blocks,
            clusters = self.stats.clusters,
            duration_ms = self.stats.duration_ms,
            bytes = out.len(),
            "WebM file completed"
        );

        self.clusters = BytesMut::new();
        Ok(out.freeze())
    }

    fn info(&self) -> Result<BytesMut> {
        let mut body = BytesMut::new();
        write_uint(&mut body, TIMECODE_SCALE, TIMECODE_SCALE_NS)?;
        write_string(&mut body, MUXING_APP, &self.config.writing_app)?;
        write_string(&mut body, WRITING_APP, &self.config.writing_app)?;
        write_float(&mut body, DURATION, self.end_ms)?;

        let mut out = BytesMut::new();
        write_element(&mut out, INFO, &body)?;
        Ok(out)
    }

    fn tracks(&self) -> Result<BytesMut> {
        let mut video = BytesMut::new();
        write_uint(&mut video, PIXEL_WIDTH, self.config.width as u64)?;
        write_uint(&mut video, PIXEL_HEIGHT, self.config.height as u64)?;

        let mut entry = BytesMut::new();
        write_uint(&mut entry, TRACK_NUMBER, VIDEO_TRACK_NUMBER)?;
        write_uint(&mut entry, TRACK_UID, VIDEO_TRACK_NUMBER)?;
        write_uint(&mut entry, TRACK_TYPE, TRACK_TYPE_VIDEO)?;
        write_uint(&mut entry, FLAG_LACING, 0)?;
        if let Some(duration) = self.config.default_duration_ns {
            write_uint(&mut entry, DEFAULT_DURATION, duration)?;
        }
        write_string(&mut entry, CODEC_ID, &self.config.codec_id)?;
        if let Some(private) = &self.config.codec_private {
            write_element(&mut entry, CODEC_PRIVATE, private)?;
        }
        write_element(&mut entry, VIDEO, &video)?;

        let mut tracks = BytesMut::new();
        write_element(&mut tracks, TRACK_ENTRY, &entry)?;

        let mut out = BytesMut::new();
        write_element(&mut out, TRACKS, &tracks)?;
        Ok(out)
    }

    fn cues(&self, clusters_start: u64) -> Result<BytesMut> {
        let mut out = BytesMut::new();
        if self.cues.is_empty() {
            return Ok(out);
        }

        let mut body = BytesMut::new();
        for cue in &self.cues {
            let mut positions = BytesMut::new();
            write_uint(&mut positions, CUE_TRACK, VIDEO_TRACK_NUMBER)?;
            write_uint(
                &mut positions,
                CUE_CLUSTER_POSITION,
                clusters_start + cue.cluster_offset,
            )?;

            let mut point = BytesMut::new();
            write_uint(&mut point, CUE_TIME, cue.time_ms)?;
            write_element(&mut point, CUE_TRACK_POSITIONS, &positions)?;
            write_element(&mut body, CUE_POINT, &point)?;
        }
        write_element(&mut out, CUES, &body)?;
        Ok(out)
    }
}

fn ebml_header() -> Result<BytesMut> {
    let mut body = BytesMut::new();
    write_uint(&mut body, EBML_VERSION, 1)?;
    write_uint(&mut body, EBML_READ_VERSION, 1)?;
    write_uint(&mut body, EBML_MAX_ID_LENGTH, 4)?;
    write_uint(&mut body, EBML_MAX_SIZE_LENGTH, 8)?;
    write_string(&mut body, DOC_TYPE, "webm")?;
    write_uint(&mut body, DOC_TYPE_VERSION, 4)?;
    write_uint(&mut body, DOC_TYPE_READ_VERSION, 2)?;

    let mut out = BytesMut::new();
    write_id(&mut out, EBML);
    write_vint(&mut out, body.len() as u64)?;
    out.put_slice(&body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe;
    use media_types::ChunkKind;

    fn chunk(kind: ChunkKind, timestamp_ms: i64, payload: &'static [u8]) -> EncodedChunk {
        EncodedChunk::new(
            kind,
            timestamp_ms * 1_000,
            40_000,
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_write_and_probe() {
        let config = WebmWriterConfig::for_codec("vp8", 320, 240).unwrap();
        let mut writer = WebmWriter::new(config);

        for i in 0..6 {
            let kind = if i % 3 == 0 {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            };
            writer.add_chunk(chunk(kind, i * 40, b"frame")).unwrap();
        }
        let bytes = writer.complete().unwrap();

        let info = probe(&bytes).unwrap();
        assert_eq!(info.doc_type, "webm");
        assert_eq!(info.codec_id, "V_VP8");
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.timecode_scale, TIMECODE_SCALE_NS);
        assert_eq!(info.clusters, 2);
        assert_eq!(info.cue_points, 2);

        let timestamps: Vec<i64> = info.blocks.iter().map(|b| b.timestamp_ms).collect();
        assert_eq!(timestamps, vec![0, 40, 80, 120, 160, 200]);
        let keys: Vec<bool> = info.blocks.iter().map(|b| b.key).collect();
        assert_eq!(keys, vec![true, false, false, true, false, false]);
        // Last block ends at 200ms + 40ms.
        assert!((info.duration_ms - 240.0).abs() < f64::EPSILON);

        let stats = writer.stats();
        assert_eq!(stats.blocks, 6);
        assert_eq!(stats.key_blocks, 2);
        assert_eq!(stats.payload_bytes, 30);
    }

    #[test]
    fn test_long_gop_splits_clusters() {
        let config = WebmWriterConfig::new(CODEC_VP9, 64, 64);
        let mut writer = WebmWriter::new(config);
        writer.add_chunk(chunk(ChunkKind::Key, 0, b"k")).unwrap();
        writer
            .add_chunk(chunk(ChunkKind::Delta, 40_000, b"d"))
            .unwrap();

        let info = probe(&writer.complete().unwrap()).unwrap();
        assert_eq!(info.clusters, 2);
        // Only key-frame clusters are indexed.
        assert_eq!(info.cue_points, 1);
        assert_eq!(info.blocks[1].timestamp_ms, 40_000);
    }

    #[test]
    fn test_codec_private_is_written() {
        let config = WebmWriterConfig::for_codec("av01.0.04M.08", 64, 64)
            .unwrap()
            .with_codec_private(Bytes::from_static(&[0x81, 0x04, 0x0C, 0x00]));
        let mut writer = WebmWriter::new(config);
        writer.add_chunk(chunk(ChunkKind::Key, 0, b"k")).unwrap();
        let info = probe(&writer.complete().unwrap()).unwrap();
        assert_eq!(info.codec_id, "V_AV1");
        assert_eq!(info.codec_private.as_deref(), Some(&[0x81, 0x04, 0x0C, 0x00][..]));
    }

    #[test]
    fn test_codec_private_set_while_writing() {
        let mut writer = WebmWriter::new(WebmWriterConfig::new(CODEC_VP9, 64, 64));
        writer.add_chunk(chunk(ChunkKind::Key, 0, b"k")).unwrap();
        writer
            .set_codec_private(Some(Bytes::from_static(&[1, 2, 3])))
            .unwrap();
        let info = probe(&writer.complete().unwrap()).unwrap();
        assert_eq!(info.codec_private.as_deref(), Some(&[1, 2, 3][..]));
        assert!(matches!(
            writer.set_codec_private(None),
            Err(WebmError::Misuse(_))
        ));
    }

    #[test]
    fn test_misuse_after_complete() {
        let mut writer = WebmWriter::new(WebmWriterConfig::new(CODEC_VP8, 16, 16));
        writer.add_chunk(chunk(ChunkKind::Key, 0, b"k")).unwrap();
        writer.complete().unwrap();
        assert_eq!(writer.state(), WriterState::Completed);

        assert!(matches!(
            writer.add_chunk(chunk(ChunkKind::Delta, 40, b"d")),
            Err(WebmError::Misuse(_))
        ));
        assert!(matches!(writer.complete(), Err(WebmError::Misuse(_))));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let mut writer = WebmWriter::new(WebmWriterConfig::new(CODEC_VP8, 16, 16));
        let info = probe(&writer.complete().unwrap()).unwrap();
        assert!(info.blocks.is_empty());
        assert_eq!(info.cue_points, 0);
    }

    #[test]
    fn test_unsupported_codec() {
        assert!(matches!(
            WebmWriterConfig::for_codec("avc1.64001f", 16, 16),
            Err(WebmError::UnsupportedCodec(_))
        ));
    }
}
