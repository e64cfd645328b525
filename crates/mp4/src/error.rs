//! Error types for MP4 demuxing.

use thiserror::Error;

use crate::box_utils::fourcc_to_string;

/// Errors that can occur while demuxing an MP4 byte stream.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// The movie box contains no track with a `vide` handler.
    #[error("no video track found in container")]
    NoVideoTrack,

    /// The first video track's sample entry has no recognized codec box.
    #[error("unsupported codec: sample entry `{entry}` has none of avcC, hvcC, vpcC or av1C")]
    UnsupportedCodec { entry: String },

    /// A box is truncated or internally inconsistent.
    #[error("malformed `{fourcc}` box: {reason}")]
    MalformedBox { fourcc: String, reason: String },

    /// The stream ended without a `moov` box.
    #[error("no `moov` box found in {received} bytes of input")]
    MissingMoov { received: u64 },

    /// The stream ended before a sample's payload was complete.
    #[error("input ended inside sample {index}: needed bytes up to {needed}, received {received}")]
    Truncated {
        index: usize,
        needed: u64,
        received: u64,
    },

    /// Data was pushed after `flush`.
    #[error("data pushed after end of stream")]
    PushAfterFlush,
}

pub(crate) trait BoxLabel {
    fn label(&self) -> String;
}

impl BoxLabel for &str {
    fn label(&self) -> String {
        (*self).to_string()
    }
}

impl BoxLabel for [u8; 4] {
    fn label(&self) -> String {
        fourcc_to_string(self)
    }
}

impl DemuxError {
    pub(crate) fn malformed(fourcc: impl BoxLabel, reason: impl Into<String>) -> Self {
        DemuxError::MalformedBox {
            fourcc: fourcc.label(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for demux operations.
pub type Result<T> = std::result::Result<T, DemuxError>;
