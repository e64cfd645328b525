//! Deterministic collaborators for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use media_types::{
    ChunkKind, DecoderConfig, EncodedChunk, FramePool, PixelFormat, RawFrame,
};

use crate::config::EncoderConfig;
use crate::engine::{
    CodecEngine, EncodeOptions, EncodedOutput, EngineError, VideoDecoder, VideoEncoder,
};
use crate::render::RenderTarget;
use crate::upload::{UploadError, UploadRequest, UploadService};

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("transcoder=debug,pipeline_common=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Description reported alongside the first encoded chunk.
pub const ENCODER_DESCRIPTION: &[u8] = &[0xAB, 0x01];
/// Description reported when the encoder changes its configuration.
pub const CHANGED_DESCRIPTION: &[u8] = &[0xAB, 0x02];

/// Knobs of a [`FakeEngine`]. Indices count submissions, starting at zero.
#[derive(Debug, Clone)]
pub struct FakeEngineOptions {
    pub reject_source_decoder: bool,
    pub reject_encoder: bool,
    pub fail_decode_at: Option<u64>,
    /// Submissions from this index on never produce a frame.
    pub swallow_decode_from: Option<u64>,
    pub fail_encode_at: Option<u64>,
    pub fail_preview_decode_at: Option<u64>,
    pub decoder_reorder: usize,
    pub encoder_reorder: usize,
    /// Attach a configuration to the first output the encoder emits.
    pub encoder_reports_config: bool,
    /// Attach a changed configuration to the output emitted at this position.
    pub config_change_at: Option<u64>,
}

impl Default for FakeEngineOptions {
    fn default() -> Self {
        Self {
            reject_source_decoder: false,
            reject_encoder: false,
            fail_decode_at: None,
            swallow_decode_from: None,
            fail_encode_at: None,
            fail_preview_decode_at: None,
            decoder_reorder: 0,
            encoder_reorder: 0,
            encoder_reports_config: true,
            config_change_at: None,
        }
    }
}

/// A codec engine that "decodes" every sample into a blank frame and
/// "encodes" every frame into a small chunk carrying its timestamp.
///
/// Decoders configured for a codec that WebM can carry are preview decoders
/// and draw from `preview_pool`; all others draw from `decoder_pool`.
pub struct FakeEngine {
    pub options: FakeEngineOptions,
    pub decoder_pool: FramePool,
    pub preview_pool: FramePool,
    decoders_created: AtomicUsize,
    encoders_created: AtomicUsize,
    configured: Arc<Mutex<Vec<DecoderConfig>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_options(FakeEngineOptions::default())
    }

    pub fn with_options(options: FakeEngineOptions) -> Self {
        Self {
            options,
            decoder_pool: FramePool::new(),
            preview_pool: FramePool::new(),
            decoders_created: AtomicUsize::new(0),
            encoders_created: AtomicUsize::new(0),
            configured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn decoders_created(&self) -> usize {
        self.decoders_created.load(Ordering::SeqCst)
    }

    pub fn encoders_created(&self) -> usize {
        self.encoders_created.load(Ordering::SeqCst)
    }

    /// Every configuration a decoder of this engine accepted, in order.
    pub fn configured_decoders(&self) -> Vec<DecoderConfig> {
        self.configured.lock().unwrap().clone()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_preview_codec(codec: &str) -> bool {
    webm::codec_id_for(codec).is_some()
}

/// Moves pending items to `ready` in reversed groups of `depth + 1`.
fn release_reversed<T>(pending: &mut Vec<T>, ready: &mut VecDeque<T>, depth: usize, all: bool) {
    if pending.len() > depth || (all && !pending.is_empty()) {
        while let Some(item) = pending.pop() {
            ready.push_back(item);
        }
    }
}

impl CodecEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_decoder_config_supported(&self, config: &DecoderConfig) -> bool {
        is_preview_codec(&config.codec) || !self.options.reject_source_decoder
    }

    fn is_encoder_config_supported(&self, config: &EncoderConfig) -> bool {
        !self.options.reject_encoder && config.width > 0 && config.height > 0
    }

    fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, EngineError> {
        self.decoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDecoder {
            options: self.options.clone(),
            decoder_pool: self.decoder_pool.clone(),
            preview_pool: self.preview_pool.clone(),
            configured: Arc::clone(&self.configured),
            config: None,
            preview: false,
            submitted: 0,
            pending: Vec::new(),
            ready: VecDeque::new(),
        }))
    }

    fn create_encoder(&self) -> Result<Box<dyn VideoEncoder>, EngineError> {
        self.encoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEncoder {
            options: self.options.clone(),
            config: None,
            submitted: 0,
            emitted: 0,
            pending: Vec::new(),
            ready: VecDeque::new(),
        }))
    }
}

struct FakeDecoder {
    options: FakeEngineOptions,
    decoder_pool: FramePool,
    preview_pool: FramePool,
    configured: Arc<Mutex<Vec<DecoderConfig>>>,
    config: Option<DecoderConfig>,
    preview: bool,
    submitted: u64,
    pending: Vec<(i64, i64)>,
    ready: VecDeque<(i64, i64)>,
}

impl FakeDecoder {
    fn depth(&self) -> usize {
        if self.preview {
            0
        } else {
            self.options.decoder_reorder
        }
    }
}

impl VideoDecoder for FakeDecoder {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), EngineError> {
        let preview = is_preview_codec(&config.codec);
        if !preview && self.options.reject_source_decoder {
            return Err(EngineError::Unsupported(config.codec.clone()));
        }
        self.preview = preview;
        self.config = Some(config.clone());
        self.configured.lock().unwrap().push(config.clone());
        Ok(())
    }

    fn decode(&mut self, chunk: &EncodedChunk) -> Result<(), EngineError> {
        if self.config.is_none() {
            return Err(EngineError::NotConfigured);
        }
        let index = self.submitted;
        self.submitted += 1;

        let fail_at = if self.preview {
            self.options.fail_preview_decode_at
        } else {
            self.options.fail_decode_at
        };
        if fail_at == Some(index) {
            return Err(EngineError::Failed(format!("corrupt sample {index}")));
        }
        if !self.preview && self.options.swallow_decode_from.is_some_and(|from| index >= from) {
            return Ok(());
        }

        self.pending.push((chunk.timestamp_us, chunk.duration_us));
        let depth = self.depth();
        release_reversed(&mut self.pending, &mut self.ready, depth, false);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<RawFrame>, EngineError> {
        let Some(config) = &self.config else {
            return Err(EngineError::NotConfigured);
        };
        let Some((timestamp_us, duration_us)) = self.ready.pop_front() else {
            return Ok(None);
        };
        let pool = if self.preview {
            &self.preview_pool
        } else {
            &self.decoder_pool
        };
        Ok(Some(pool.allocate(
            PixelFormat::I420,
            config.coded_width,
            config.coded_height,
            timestamp_us,
            duration_us,
        )))
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        let depth = self.depth();
        release_reversed(&mut self.pending, &mut self.ready, depth, true);
        Ok(())
    }

    fn output_reorder_depth(&self) -> usize {
        self.depth()
    }
}

struct PendingChunk {
    timestamp_us: i64,
    duration_us: i64,
    key: bool,
}

struct FakeEncoder {
    options: FakeEngineOptions,
    config: Option<EncoderConfig>,
    submitted: u64,
    emitted: u64,
    pending: Vec<PendingChunk>,
    ready: VecDeque<PendingChunk>,
}

impl VideoEncoder for FakeEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EngineError> {
        if self.options.reject_encoder {
            return Err(EngineError::Unsupported(config.to_string()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn encode(&mut self, frame: &RawFrame, options: EncodeOptions) -> Result<(), EngineError> {
        if self.config.is_none() {
            return Err(EngineError::NotConfigured);
        }
        let index = self.submitted;
        self.submitted += 1;
        if self.options.fail_encode_at == Some(index) {
            return Err(EngineError::Failed(format!("encoder overflow at frame {index}")));
        }

        self.pending.push(PendingChunk {
            timestamp_us: frame.timestamp_us,
            duration_us: frame.duration_us,
            key: options.key_frame,
        });
        let depth = self.options.encoder_reorder;
        release_reversed(&mut self.pending, &mut self.ready, depth, false);
        Ok(())
    }

    fn receive_chunk(&mut self) -> Result<Option<EncodedOutput>, EngineError> {
        let Some(config) = &self.config else {
            return Err(EngineError::NotConfigured);
        };
        let Some(pending) = self.ready.pop_front() else {
            return Ok(None);
        };
        let position = self.emitted;
        self.emitted += 1;

        let kind = if pending.key {
            ChunkKind::Key
        } else {
            ChunkKind::Delta
        };
        let mut data = pending.timestamp_us.to_be_bytes().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        let chunk = EncodedChunk::new(
            kind,
            pending.timestamp_us,
            pending.duration_us,
            Bytes::from(data),
        );

        let mut output = EncodedOutput::new(chunk);
        let reported = DecoderConfig::new(config.codec.clone(), config.width, config.height);
        if self.options.encoder_reports_config && position == 0 {
            output = output
                .with_decoder_config(reported.with_description(Bytes::from_static(ENCODER_DESCRIPTION)));
        } else if self.options.config_change_at == Some(position) {
            output = output
                .with_decoder_config(reported.with_description(Bytes::from_static(CHANGED_DESCRIPTION)));
        }
        Ok(Some(output))
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        let depth = self.options.encoder_reorder;
        release_reversed(&mut self.pending, &mut self.ready, depth, true);
        Ok(())
    }

    fn output_reorder_depth(&self) -> usize {
        self.options.encoder_reorder
    }
}

/// Records the timestamp of every rendered frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingTarget {
    pub frames: Arc<Mutex<Vec<i64>>>,
}

impl RecordingTarget {
    pub fn timestamps(&self) -> Vec<i64> {
        self.frames.lock().unwrap().clone()
    }
}

impl RenderTarget for RecordingTarget {
    fn render(&mut self, frame: RawFrame) {
        self.frames.lock().unwrap().push(frame.timestamp_us);
        frame.close();
    }
}

/// Upload service that records requests and optionally rejects them.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    pub fail: bool,
    pub requests: Mutex<Vec<(String, usize)>>,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl UploadService for RecordingUploader {
    async fn upload(&self, request: UploadRequest) -> Result<(), UploadError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.filename, request.content.len()));
        if self.fail {
            return Err(UploadError::Rejected {
                status: 503,
                body: "storage unavailable".to_string(),
            });
        }
        Ok(())
    }
}
