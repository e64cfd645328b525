//! Structural probe of a WebM file.
//!
//! Walks the element tree of a complete file and reports what a player would
//! need to know about its single video track. Used to verify written output.

use bytes::Bytes;

use crate::ebml::{read_float, read_id, read_uint, read_vint};
use crate::elements::*;
use crate::error::{Result, WebmError};

/// One SimpleBlock as found in a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub track: u64,
    /// Absolute timestamp in timecode units.
    pub timestamp_ms: i64,
    pub key: bool,
    pub size: usize,
}

/// Summary of a WebM file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebmInfo {
    pub doc_type: String,
    pub timecode_scale: u64,
    pub duration_ms: f64,
    pub track_count: usize,
    pub codec_id: String,
    pub codec_private: Option<Bytes>,
    pub width: u32,
    pub height: u32,
    pub clusters: usize,
    pub cue_points: usize,
    pub blocks: Vec<BlockInfo>,
}

#[derive(Default)]
struct ProbeState {
    info: WebmInfo,
    cluster_timestamp: i64,
}

/// Parse `data` as a WebM file.
pub fn probe(data: &[u8]) -> Result<WebmInfo> {
    let mut state = ProbeState::default();
    walk(data, 0, &mut state)?;

    if state.info.doc_type.is_empty() {
        return Err(WebmError::malformed(0, "missing EBML header"));
    }
    Ok(state.info)
}

fn walk(data: &[u8], base: usize, state: &mut ProbeState) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let offset = base + pos;
        let (id, id_len) =
            read_id(&data[pos..]).ok_or_else(|| WebmError::malformed(offset, "invalid element ID"))?;
        let (size, size_len) = read_vint(&data[pos + id_len..])
            .ok_or_else(|| WebmError::malformed(offset, "invalid element size"))?;

        let body_start = pos + id_len + size_len;
        let remaining = data.len() - body_start;
        let size = match size {
            Some(size) if size as usize <= remaining => size as usize,
            Some(size) => {
                return Err(WebmError::malformed(
                    offset,
                    format!("element 0x{id:X} declares {size} bytes, {remaining} available"),
                ));
            }
            None => remaining,
        };
        let body = &data[body_start..body_start + size];

        if is_master(id) {
            match id {
                TRACK_ENTRY => state.info.track_count += 1,
                CLUSTER => state.info.clusters += 1,
                CUE_POINT => state.info.cue_points += 1,
                _ => {}
            }
            walk(body, base + body_start, state)?;
        } else {
            leaf(id, body, base + body_start, state)?;
        }

        pos = body_start + size;
    }
    Ok(())
}

fn leaf(id: u32, body: &[u8], offset: usize, state: &mut ProbeState) -> Result<()> {
    let info = &mut state.info;
    match id {
        DOC_TYPE => info.doc_type = String::from_utf8_lossy(body).into_owned(),
        TIMECODE_SCALE => info.timecode_scale = read_uint(body),
        DURATION => {
            info.duration_ms = read_float(body)
                .ok_or_else(|| WebmError::malformed(offset, "invalid duration"))?;
        }
        CODEC_ID => info.codec_id = String::from_utf8_lossy(body).into_owned(),
        CODEC_PRIVATE => info.codec_private = Some(Bytes::copy_from_slice(body)),
        PIXEL_WIDTH => info.width = read_uint(body) as u32,
        PIXEL_HEIGHT => info.height = read_uint(body) as u32,
        TIMESTAMP => state.cluster_timestamp = read_uint(body) as i64,
        SIMPLE_BLOCK => {
            let (track, track_len) = read_vint(body)
                .ok_or_else(|| WebmError::malformed(offset, "invalid block track number"))?;
            if body.len() < track_len + 3 {
                return Err(WebmError::malformed(offset, "truncated block header"));
            }
            let relative = i16::from_be_bytes([body[track_len], body[track_len + 1]]);
            let flags = body[track_len + 2];
            info.blocks.push(BlockInfo {
                track: track.unwrap_or_default(),
                timestamp_ms: state.cluster_timestamp + relative as i64,
                key: flags & 0x80 != 0,
                size: body.len() - track_len - 3,
            });
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(probe(&[]).is_err());
        assert!(matches!(
            probe(&[0x1A, 0x45, 0xDF, 0xA3, 0x88, 0x42]),
            Err(WebmError::Malformed { .. })
        ));
    }

    #[test]
    fn test_probe_header_only() {
        // EBML { DocType "webm" }
        let data = [
            0x1A, 0x45, 0xDF, 0xA3, 0x87, 0x42, 0x82, 0x84, b'w', b'e', b'b', b'm',
        ];
        let info = probe(&data).unwrap();
        assert_eq!(info.doc_type, "webm");
        assert!(info.blocks.is_empty());
    }
}
