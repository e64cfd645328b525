//! Error types for a transcode run.

use mp4::DemuxError;
use pipeline_common::PipelineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webm::WebmError;

use crate::engine::EngineError;
use crate::upload::UploadError;

/// Closed set of failure kinds a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedCodec,
    NoVideoTrack,
    MalformedContainer,
    DecoderConfigRejected,
    DecodeFailure,
    EncoderConfigUnsupported,
    EncodeFailure,
    WriterMisuse,
    /// The writer could not represent a chunk, e.g. a block beyond the
    /// element size limit.
    WriteFailure,
    UploadFailure,
    Io,
    Pipeline,
}

impl ErrorKind {
    /// Failures that abort a run. Upload failures are reported separately.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorKind::UploadFailure)
    }
}

/// Errors raised by a transcode run.
///
/// The message of every stage failure starts with the stage that raised it.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("container reader: {0}")]
    Demux(#[from] DemuxError),

    #[error("decode stage: decoder rejected configuration for `{codec}`: {reason}")]
    DecoderConfigRejected { codec: String, reason: String },

    #[error("decode stage: {0}")]
    Decode(#[source] EngineError),

    #[error("decode stage: {submitted} samples submitted but {produced} frames produced")]
    DecodeIncomplete { submitted: u64, produced: u64 },

    #[error("transcode stage: encoder configuration {config} is not supported: {reason}")]
    EncoderConfigUnsupported { config: String, reason: String },

    #[error("transcode stage: {0}")]
    Encode(#[source] EngineError),

    #[error("container writer: {0}")]
    Writer(#[from] WebmError),

    #[error("upload: {0}")]
    Upload(#[from] UploadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline: {0}")]
    Pipeline(#[source] PipelineError),
}

impl TranscodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscodeError::Demux(err) => match err {
                DemuxError::UnsupportedCodec { .. } => ErrorKind::UnsupportedCodec,
                DemuxError::NoVideoTrack => ErrorKind::NoVideoTrack,
                _ => ErrorKind::MalformedContainer,
            },
            TranscodeError::DecoderConfigRejected { .. } => ErrorKind::DecoderConfigRejected,
            TranscodeError::Decode(_) | TranscodeError::DecodeIncomplete { .. } => {
                ErrorKind::DecodeFailure
            }
            TranscodeError::EncoderConfigUnsupported { .. } => ErrorKind::EncoderConfigUnsupported,
            TranscodeError::Encode(_) => ErrorKind::EncodeFailure,
            TranscodeError::Writer(err) => match err {
                WebmError::Misuse(_) => ErrorKind::WriterMisuse,
                WebmError::UnsupportedCodec(_) => ErrorKind::EncoderConfigUnsupported,
                _ => ErrorKind::WriteFailure,
            },
            TranscodeError::Upload(_) => ErrorKind::UploadFailure,
            TranscodeError::Io(_) => ErrorKind::Io,
            TranscodeError::Pipeline(_) => ErrorKind::Pipeline,
        }
    }

    /// The pipeline component the error originated in.
    pub fn stage(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::UnsupportedCodec | ErrorKind::NoVideoTrack | ErrorKind::MalformedContainer => {
                Some("container reader")
            }
            ErrorKind::DecoderConfigRejected | ErrorKind::DecodeFailure => Some("decode stage"),
            ErrorKind::EncoderConfigUnsupported | ErrorKind::EncodeFailure => {
                Some("transcode stage")
            }
            ErrorKind::WriterMisuse | ErrorKind::WriteFailure => Some("container writer"),
            ErrorKind::UploadFailure | ErrorKind::Io | ErrorKind::Pipeline => None,
        }
    }
}

impl From<PipelineError> for TranscodeError {
    /// Recover the typed error a stage raised before it crossed the channel
    /// boundary.
    fn from(err: PipelineError) -> Self {
        let err = match err.into_source::<TranscodeError>() {
            Ok(inner) => return inner,
            Err(err) => err,
        };
        let err = match err.into_source::<DemuxError>() {
            Ok(inner) => return TranscodeError::Demux(inner),
            Err(err) => err,
        };
        match err {
            PipelineError::Io(io) => TranscodeError::Io(io),
            other => TranscodeError::Pipeline(other),
        }
    }
}

/// Result type alias for transcode operations.
pub type Result<T> = std::result::Result<T, TranscodeError>;
