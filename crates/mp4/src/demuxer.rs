//! Incremental progressive MP4 demuxer.
//!
//! Bytes are pushed in arbitrary chunks. The demuxer scans top-level boxes
//! until the complete `moov` box is buffered, resolves the first video track
//! and then yields that track's samples in container order as soon as each
//! sample's payload has arrived. Bytes no remaining sample refers to are
//! discarded, so for the common "moov before mdat" layout the buffer never
//! holds much more than one sample.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use byteorder::{BigEndian, ReadBytesExt};
use media_types::{ChunkKind, EncodedChunk, TrackConfig};
use tracing::{debug, trace};

use crate::box_utils::{
    BoxIter, BoxSize, find_first_box, fourcc_to_string, full_box, read_box_header, require_box,
};
use crate::codec::find_codec_box;
use crate::error::{DemuxError, Result};
use crate::sample_table::{SampleInfo, build_samples};

/// Bytes of a visual sample entry body that precede its child boxes.
const VISUAL_SAMPLE_ENTRY_HEADER: usize = 78;

/// Offsets of width/height inside a visual sample entry body.
const VISUAL_WIDTH_OFFSET: usize = 24;

/// Output of the demuxer.
#[derive(Debug, PartialEq)]
pub enum DemuxEvent {
    /// Emitted exactly once, before any sample.
    Config(TrackConfig),
    Sample(EncodedChunk),
}

/// A resolved video track: its configuration and sample table.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub config: TrackConfig,
    pub timescale: u32,
    pub samples: Vec<SampleInfo>,
}

#[derive(Debug)]
enum Phase {
    /// Scanning top-level boxes for `moov`.
    Header {
        /// Absolute offset of the next top-level box header.
        scan_offset: u64,
        /// A non-`moov` box extends to end of file; nothing after it is a box.
        stalled: bool,
    },
    Samples {
        timescale: u32,
        samples: Vec<SampleInfo>,
        /// `keep_from[i]` is the lowest byte offset referenced by samples `i..`.
        keep_from: Vec<u64>,
        next: usize,
    },
}

/// Push-based demuxer for the first video track of a progressive MP4 file.
#[derive(Debug)]
pub struct Mp4Demuxer {
    buffer: BytesMut,
    /// Absolute file offset of `buffer[0]`.
    buffer_offset: u64,
    phase: Phase,
    pending: VecDeque<DemuxEvent>,
    ended: bool,
}

impl Default for Mp4Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Demuxer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            buffer_offset: 0,
            phase: Phase::Header {
                scan_offset: 0,
                stalled: false,
            },
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Total number of bytes pushed so far.
    pub fn received(&self) -> u64 {
        self.buffer_offset + self.buffer.len() as u64
    }

    /// Number of bytes currently retained.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True once the track configuration has been resolved.
    pub fn has_config(&self) -> bool {
        matches!(self.phase, Phase::Samples { .. })
    }

    /// True once every sample of the track has been yielded.
    pub fn is_finished(&self) -> bool {
        match &self.phase {
            Phase::Samples { samples, next, .. } => {
                *next >= samples.len() && self.pending.is_empty()
            }
            Phase::Header { .. } => false,
        }
    }

    /// Append the next chunk of the input stream.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        if self.ended {
            return Err(DemuxError::PushAfterFlush);
        }
        self.buffer.extend_from_slice(data);

        if matches!(self.phase, Phase::Header { .. }) {
            self.scan_header(false)?;
        }
        self.discard_consumed();
        Ok(())
    }

    /// Signal end of input.
    ///
    /// Fails when the stream never contained a complete `moov` box. Samples
    /// whose payload never arrived surface as [`DemuxError::Truncated`] from
    /// [`next_event`](Self::next_event).
    pub fn flush(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        if matches!(self.phase, Phase::Header { .. }) {
            self.scan_header(true)?;
        }
        if matches!(self.phase, Phase::Header { .. }) {
            return Err(DemuxError::MissingMoov {
                received: self.received(),
            });
        }
        Ok(())
    }

    /// Take the next available event.
    ///
    /// Returns `Ok(None)` when more input is needed, or when the track is
    /// finished.
    pub fn next_event(&mut self) -> Result<Option<DemuxEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let received = self.received();
        let Phase::Samples {
            timescale,
            samples,
            next,
            ..
        } = &mut self.phase
        else {
            return Ok(None);
        };

        let Some(sample) = samples.get(*next).copied() else {
            return Ok(None);
        };

        if sample.end() > received || sample.offset < self.buffer_offset {
            if self.ended {
                return Err(DemuxError::Truncated {
                    index: *next,
                    needed: sample.end(),
                    received,
                });
            }
            return Ok(None);
        }

        let start = (sample.offset - self.buffer_offset) as usize;
        let data = Bytes::copy_from_slice(&self.buffer[start..start + sample.size as usize]);
        let chunk = EncodedChunk::new(
            if sample.is_sync {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            },
            ticks_to_us(sample.cts, *timescale),
            ticks_to_us(sample.duration as i64, *timescale),
            data,
        );
        trace!(
            index = *next,
            offset = sample.offset,
            size = sample.size,
            timestamp_us = chunk.timestamp_us,
            "Sample demuxed"
        );
        *next += 1;

        self.discard_consumed();
        Ok(Some(DemuxEvent::Sample(chunk)))
    }

    fn scan_header(&mut self, at_end: bool) -> Result<()> {
        let Phase::Header {
            scan_offset,
            stalled,
        } = &mut self.phase
        else {
            return Ok(());
        };

        let mut moov_range = None;
        while !*stalled {
            let rel = (*scan_offset - self.buffer_offset) as usize;
            let Some(header) = read_box_header(&self.buffer[rel.min(self.buffer.len())..]) else {
                break;
            };

            let available = (self.buffer.len() - rel) as u64;
            let size = match header.size {
                BoxSize::Known(size) if size < header.header_size as u64 => {
                    return Err(DemuxError::malformed(
                        header.fourcc,
                        format!("declared size {size} is smaller than its header"),
                    ));
                }
                BoxSize::Known(size) => size,
                BoxSize::ToEnd if header.fourcc == *b"moov" && at_end => available,
                BoxSize::ToEnd if header.fourcc == *b"moov" => break,
                BoxSize::ToEnd => {
                    *stalled = true;
                    break;
                }
            };

            trace!(
                fourcc = %fourcc_to_string(&header.fourcc),
                offset = *scan_offset,
                size,
                "Top-level box"
            );

            if header.fourcc == *b"moov" {
                if size > available {
                    break;
                }
                moov_range = Some((rel + header.header_size, rel + size as usize));
                break;
            }
            *scan_offset = scan_offset.checked_add(size).ok_or_else(|| {
                DemuxError::malformed(
                    header.fourcc,
                    format!("declared size {size} overflows the file offset"),
                )
            })?;
        }

        if let Some((start, end)) = moov_range {
            let track = parse_moov(&self.buffer[start..end])?;
            self.enter_samples(track);
        }
        Ok(())
    }

    fn enter_samples(&mut self, track: VideoTrack) {
        debug!(
            track_id = track.config.track_id,
            codec = %track.config.codec,
            width = track.config.coded_width,
            height = track.config.coded_height,
            samples = track.samples.len(),
            duration_secs = track.config.duration_secs,
            "Video track resolved"
        );

        let mut keep_from = vec![u64::MAX; track.samples.len()];
        let mut lowest = u64::MAX;
        for (index, sample) in track.samples.iter().enumerate().rev() {
            lowest = lowest.min(sample.offset);
            keep_from[index] = lowest;
        }

        self.pending.push_back(DemuxEvent::Config(track.config));
        self.phase = Phase::Samples {
            timescale: track.timescale,
            samples: track.samples,
            keep_from,
            next: 0,
        };
    }

    /// Drop buffered bytes below the lowest offset any remaining sample needs.
    fn discard_consumed(&mut self) {
        let Phase::Samples {
            keep_from, next, ..
        } = &self.phase
        else {
            return;
        };

        let keep = keep_from.get(*next).copied().unwrap_or(u64::MAX);
        let discard = keep
            .saturating_sub(self.buffer_offset)
            .min(self.buffer.len() as u64) as usize;
        if discard > 0 {
            self.buffer.advance(discard);
            self.buffer_offset += discard as u64;
        }
    }
}

/// Demux a complete sequence of input chunks, invoking `on_config` once and
/// `on_sample` for every sample in container order.
pub fn demux_chunks<I, B>(
    chunks: I,
    mut on_config: impl FnMut(TrackConfig),
    mut on_sample: impl FnMut(EncodedChunk),
) -> Result<()>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut demuxer = Mp4Demuxer::new();
    let mut dispatch = |demuxer: &mut Mp4Demuxer| -> Result<()> {
        while let Some(event) = demuxer.next_event()? {
            match event {
                DemuxEvent::Config(config) => on_config(config),
                DemuxEvent::Sample(sample) => on_sample(sample),
            }
        }
        Ok(())
    };

    for chunk in chunks {
        demuxer.push(chunk.as_ref())?;
        dispatch(&mut demuxer)?;
    }
    demuxer.flush()?;
    dispatch(&mut demuxer)
}

fn ticks_to_us(ticks: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (ticks as i128 * 1_000_000 / timescale as i128) as i64
}

fn read_err(fourcc: [u8; 4]) -> impl Fn(std::io::Error) -> DemuxError {
    move |err| DemuxError::malformed(fourcc, format!("truncated: {err}"))
}

/// `(timescale, duration)` from an `mvhd` or `mdhd` body.
fn parse_time_header(fourcc: [u8; 4], body: &[u8]) -> Result<(u32, u64)> {
    let (version, _, payload) = full_box(fourcc, body)?;
    let err = read_err(fourcc);
    let mut cursor = std::io::Cursor::new(payload);
    if version == 1 {
        cursor.read_u64::<BigEndian>().map_err(&err)?;
        cursor.read_u64::<BigEndian>().map_err(&err)?;
        let timescale = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let duration = cursor.read_u64::<BigEndian>().map_err(&err)?;
        Ok((timescale, duration))
    } else {
        cursor.read_u32::<BigEndian>().map_err(&err)?;
        cursor.read_u32::<BigEndian>().map_err(&err)?;
        let timescale = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let duration = cursor.read_u32::<BigEndian>().map_err(&err)? as u64;
        Ok((timescale, duration))
    }
}

fn parse_track_id(body: &[u8]) -> Result<u32> {
    let (version, _, payload) = full_box(*b"tkhd", body)?;
    let err = read_err(*b"tkhd");
    let mut cursor = std::io::Cursor::new(payload);
    if version == 1 {
        cursor.read_u64::<BigEndian>().map_err(&err)?;
        cursor.read_u64::<BigEndian>().map_err(&err)?;
    } else {
        cursor.read_u32::<BigEndian>().map_err(&err)?;
        cursor.read_u32::<BigEndian>().map_err(&err)?;
    }
    cursor.read_u32::<BigEndian>().map_err(&err)
}

fn handler_type(mdia: &[u8]) -> Result<Option<[u8; 4]>> {
    let Some(hdlr) = find_first_box(mdia, *b"hdlr")? else {
        return Ok(None);
    };
    let (_, _, payload) = full_box(*b"hdlr", hdlr.body)?;
    if payload.len() < 8 {
        return Err(DemuxError::malformed(*b"hdlr", "missing handler type"));
    }
    Ok(Some([payload[4], payload[5], payload[6], payload[7]]))
}

/// Resolve the first video track of a `moov` body.
pub fn parse_moov(moov: &[u8]) -> Result<VideoTrack> {
    let movie_time = match find_first_box(moov, *b"mvhd")? {
        Some(mvhd) => Some(parse_time_header(*b"mvhd", mvhd.body)?),
        None => None,
    };

    for child in BoxIter::new(moov) {
        let child = child?;
        if child.fourcc != *b"trak" {
            continue;
        }
        let trak = child.body;
        let Some(mdia) = find_first_box(trak, *b"mdia")? else {
            continue;
        };
        if handler_type(mdia.body)? != Some(*b"vide") {
            continue;
        }
        return parse_video_trak(trak, mdia.body, movie_time);
    }

    Err(DemuxError::NoVideoTrack)
}

fn parse_video_trak(trak: &[u8], mdia: &[u8], movie_time: Option<(u32, u64)>) -> Result<VideoTrack> {
    let track_id = parse_track_id(require_box(trak, *b"tkhd")?.body)?;
    let (timescale, media_duration) = parse_time_header(*b"mdhd", require_box(mdia, *b"mdhd")?.body)?;
    let minf = require_box(mdia, *b"minf")?;
    let stbl = require_box(minf.body, *b"stbl")?;
    let stsd = require_box(stbl.body, *b"stsd")?;

    let (_, _, entries) = full_box(*b"stsd", stsd.body)?;
    if entries.len() < 4 {
        return Err(DemuxError::malformed(*b"stsd", "missing entry count"));
    }
    let entry = BoxIter::new(&entries[4..])
        .next()
        .ok_or_else(|| DemuxError::malformed(*b"stsd", "no sample entries"))??;

    if entry.body.len() < VISUAL_SAMPLE_ENTRY_HEADER {
        return Err(DemuxError::malformed(
            entry.fourcc,
            "visual sample entry shorter than its fixed fields",
        ));
    }
    let width = u16::from_be_bytes([
        entry.body[VISUAL_WIDTH_OFFSET],
        entry.body[VISUAL_WIDTH_OFFSET + 1],
    ]) as u32;
    let height = u16::from_be_bytes([
        entry.body[VISUAL_WIDTH_OFFSET + 2],
        entry.body[VISUAL_WIDTH_OFFSET + 3],
    ]) as u32;

    let codec_box = find_codec_box(&entry.body[VISUAL_SAMPLE_ENTRY_HEADER..])?.ok_or_else(|| {
        DemuxError::UnsupportedCodec {
            entry: fourcc_to_string(&entry.fourcc),
        }
    })?;

    let duration_secs = match movie_time {
        Some((movie_scale, movie_duration)) if movie_scale > 0 && movie_duration > 0 => {
            movie_duration as f64 / movie_scale as f64
        }
        _ if timescale > 0 => media_duration as f64 / timescale as f64,
        _ => 0.0,
    };

    let samples = build_samples(stbl.body)?;

    Ok(VideoTrack {
        config: TrackConfig {
            track_id,
            codec: codec_box.kind.codec_string(&entry.fourcc, &codec_box.payload),
            coded_width: width,
            coded_height: height,
            description: Some(codec_box.payload),
            duration_secs,
        },
        timescale,
        samples,
    })
}
