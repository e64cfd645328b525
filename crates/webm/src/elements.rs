//! WebM element IDs and codec mapping.
//!
//! IDs include their VINT length marker, so they are written verbatim.

// EBML header
pub const EBML: u32 = 0x1A45_DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

// Segment
pub const SEGMENT: u32 = 0x1853_8067;

// Info
pub const INFO: u32 = 0x1549_A966;
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const DURATION: u32 = 0x4489;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

// Tracks
pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const FLAG_LACING: u32 = 0x9C;
pub const DEFAULT_DURATION: u32 = 0x23_E383;
pub const CODEC_ID: u32 = 0x86;
pub const CODEC_PRIVATE: u32 = 0x63A2;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;

pub const TRACK_TYPE_VIDEO: u64 = 1;

// Clusters
pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMESTAMP: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

// Cues
pub const CUES: u32 = 0x1C53_BB6B;
pub const CUE_POINT: u32 = 0xBB;
pub const CUE_TIME: u32 = 0xB3;
pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
pub const CUE_TRACK: u32 = 0xF7;
pub const CUE_CLUSTER_POSITION: u32 = 0xF1;

/// Master elements whose children the probe descends into.
pub(crate) fn is_master(id: u32) -> bool {
    matches!(
        id,
        EBML | SEGMENT | INFO | TRACKS | TRACK_ENTRY | VIDEO | CLUSTER | CUES | CUE_POINT
            | CUE_TRACK_POSITIONS
    )
}

pub const CODEC_VP8: &str = "V_VP8";
pub const CODEC_VP9: &str = "V_VP9";
pub const CODEC_AV1: &str = "V_AV1";

/// Map a codec string (`vp8`, `vp09.00.10.08`, `av01.0.04M.08`, ...) to its
/// WebM codec ID.
pub fn codec_id_for(codec: &str) -> Option<&'static str> {
    let family = codec
        .split('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match family.as_str() {
        "vp8" => Some(CODEC_VP8),
        "vp9" | "vp09" => Some(CODEC_VP9),
        "av1" | "av01" => Some(CODEC_AV1),
        _ => None,
    }
}
