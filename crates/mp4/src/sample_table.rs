//! Sample table (`stbl`) parsing.
//!
//! Resolves the per-sample byte ranges and timing of a progressive track from
//! `stts`, `ctts`, `stss`, `stsz`/`stz2`, `stsc` and `stco`/`co64`.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::box_utils::{find_first_box, full_box, require_box};
use crate::error::{DemuxError, Result};

/// Upper bound on the samples of one track.
pub const MAX_SAMPLE_COUNT: u32 = 1 << 22;

/// Location and timing of one sample, in media timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Absolute byte offset in the file.
    pub offset: u64,
    pub size: u32,
    pub dts: u64,
    /// Composition (presentation) time.
    pub cts: i64,
    pub duration: u32,
    pub is_sync: bool,
}

impl SampleInfo {
    /// Offset one past the last byte. `build_samples` rejects layouts where
    /// this overflows.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// Sample sizes from `stsz` or `stz2`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SampleSizes {
    /// Every sample has the same size; nothing is materialized per sample.
    Uniform { size: u32, count: u32 },
    Table(Vec<u32>),
}

impl SampleSizes {
    fn len(&self) -> usize {
        match self {
            SampleSizes::Uniform { count, .. } => *count as usize,
            SampleSizes::Table(sizes) => sizes.len(),
        }
    }

    fn get(&self, index: usize) -> u32 {
        match self {
            SampleSizes::Uniform { size, .. } => *size,
            SampleSizes::Table(sizes) => sizes[index],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StscEntry {
    first_chunk: u32,
    samples_per_chunk: u32,
}

fn table_error(fourcc: [u8; 4]) -> impl Fn(std::io::Error) -> DemuxError {
    move |err| DemuxError::malformed(fourcc, format!("table truncated: {err}"))
}

/// Cap preallocation so a corrupt entry count cannot request huge buffers.
fn capacity_hint(count: u32, payload_len: usize, entry_size: usize) -> usize {
    (count as usize).min(payload_len / entry_size.max(1))
}

fn parse_stts(body: &[u8]) -> Result<Vec<(u32, u32)>> {
    let (_, _, payload) = full_box(*b"stts", body)?;
    let err = table_error(*b"stts");
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let mut entries = Vec::with_capacity(capacity_hint(count, payload.len(), 8));
    for _ in 0..count {
        let sample_count = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let delta = cursor.read_u32::<BigEndian>().map_err(&err)?;
        entries.push((sample_count, delta));
    }
    Ok(entries)
}

fn parse_ctts(body: &[u8]) -> Result<Vec<(u32, i64)>> {
    let (version, _, payload) = full_box(*b"ctts", body)?;
    let err = table_error(*b"ctts");
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let mut entries = Vec::with_capacity(capacity_hint(count, payload.len(), 8));
    for _ in 0..count {
        let sample_count = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let offset = if version == 0 {
            cursor.read_u32::<BigEndian>().map_err(&err)? as i64
        } else {
            cursor.read_i32::<BigEndian>().map_err(&err)? as i64
        };
        entries.push((sample_count, offset));
    }
    Ok(entries)
}

fn parse_stss(body: &[u8]) -> Result<Vec<u32>> {
    let (_, _, payload) = full_box(*b"stss", body)?;
    let err = table_error(*b"stss");
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let mut entries = Vec::with_capacity(capacity_hint(count, payload.len(), 4));
    for _ in 0..count {
        entries.push(cursor.read_u32::<BigEndian>().map_err(&err)?);
    }
    entries.sort_unstable();
    Ok(entries)
}

fn parse_stsz(body: &[u8]) -> Result<SampleSizes> {
    let (_, _, payload) = full_box(*b"stsz", body)?;
    let err = table_error(*b"stsz");
    let mut cursor = Cursor::new(payload);
    let uniform = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    if uniform != 0 {
        return Ok(SampleSizes::Uniform {
            size: uniform,
            count,
        });
    }
    let mut sizes = Vec::with_capacity(capacity_hint(count, payload.len(), 4));
    for _ in 0..count {
        sizes.push(cursor.read_u32::<BigEndian>().map_err(&err)?);
    }
    Ok(SampleSizes::Table(sizes))
}

/// Number of samples the `stsc` runs assign to `chunk_count` chunks.
fn samples_in_chunks(stsc: &[StscEntry], chunk_count: usize) -> u64 {
    let chunk_count = chunk_count as u64;
    let mut total = 0u64;
    for (index, run) in stsc.iter().enumerate() {
        let first = (run.first_chunk as u64).max(1);
        if first > chunk_count {
            break;
        }
        let end = stsc
            .get(index + 1)
            .map_or(chunk_count + 1, |next| (next.first_chunk as u64).min(chunk_count + 1));
        let chunks = end.saturating_sub(first);
        total = total.saturating_add(chunks.saturating_mul(run.samples_per_chunk as u64));
    }
    total
}

fn parse_stz2(body: &[u8]) -> Result<Vec<u32>> {
    let (_, _, payload) = full_box(*b"stz2", body)?;
    let err = table_error(*b"stz2");
    let mut cursor = Cursor::new(payload);
    let _reserved = cursor.read_u24::<BigEndian>().map_err(&err)?;
    let field_size = cursor.read_u8().map_err(&err)?;
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let mut sizes = Vec::with_capacity(capacity_hint(count, payload.len(), 1));
    match field_size {
        4 => {
            let mut pending = None;
            for _ in 0..count {
                let value = match pending.take() {
                    Some(low) => low,
                    None => {
                        let byte = cursor.read_u8().map_err(&err)?;
                        pending = Some((byte & 0x0F) as u32);
                        (byte >> 4) as u32
                    }
                };
                sizes.push(value);
            }
        }
        8 => {
            for _ in 0..count {
                sizes.push(cursor.read_u8().map_err(&err)? as u32);
            }
        }
        16 => {
            for _ in 0..count {
                sizes.push(cursor.read_u16::<BigEndian>().map_err(&err)? as u32);
            }
        }
        other => {
            return Err(DemuxError::malformed(
                *b"stz2",
                format!("invalid field size {other}"),
            ));
        }
    }
    Ok(sizes)
}

fn parse_stsc(body: &[u8]) -> Result<Vec<StscEntry>> {
    let (_, _, payload) = full_box(*b"stsc", body)?;
    let err = table_error(*b"stsc");
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let mut entries = Vec::with_capacity(capacity_hint(count, payload.len(), 12));
    for _ in 0..count {
        let first_chunk = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let samples_per_chunk = cursor.read_u32::<BigEndian>().map_err(&err)?;
        let _description_index = cursor.read_u32::<BigEndian>().map_err(&err)?;
        entries.push(StscEntry {
            first_chunk,
            samples_per_chunk,
        });
    }
    Ok(entries)
}

fn parse_chunk_offsets(body: &[u8], wide: bool) -> Result<Vec<u64>> {
    let fourcc = if wide { *b"co64" } else { *b"stco" };
    let (_, _, payload) = full_box(fourcc, body)?;
    let err = table_error(fourcc);
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u32::<BigEndian>().map_err(&err)?;
    let entry_size = if wide { 8 } else { 4 };
    let mut offsets = Vec::with_capacity(capacity_hint(count, payload.len(), entry_size));
    for _ in 0..count {
        let offset = if wide {
            cursor.read_u64::<BigEndian>().map_err(&err)?
        } else {
            cursor.read_u32::<BigEndian>().map_err(&err)? as u64
        };
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Resolve every sample of a track from its `stbl` body.
///
/// Samples are returned in container (decode) order.
pub(crate) fn build_samples(stbl: &[u8]) -> Result<Vec<SampleInfo>> {
    let stts = parse_stts(require_box(stbl, *b"stts")?.body)?;
    let ctts = match find_first_box(stbl, *b"ctts")? {
        Some(found) => parse_ctts(found.body)?,
        None => Vec::new(),
    };
    let sync = match find_first_box(stbl, *b"stss")? {
        Some(found) => Some(parse_stss(found.body)?),
        None => None,
    };
    let sizes = match find_first_box(stbl, *b"stsz")? {
        Some(found) => parse_stsz(found.body)?,
        None => SampleSizes::Table(parse_stz2(require_box(stbl, *b"stz2")?.body)?),
    };
    let stsc = parse_stsc(require_box(stbl, *b"stsc")?.body)?;
    let chunk_offsets = match find_first_box(stbl, *b"stco")? {
        Some(found) => parse_chunk_offsets(found.body, false)?,
        None => parse_chunk_offsets(require_box(stbl, *b"co64")?.body, true)?,
    };

    let sample_count = sizes.len();
    if sample_count > MAX_SAMPLE_COUNT as usize {
        return Err(DemuxError::malformed(
            *b"stsz",
            format!("{sample_count} samples exceed the limit of {MAX_SAMPLE_COUNT}"),
        ));
    }
    let described = samples_in_chunks(&stsc, chunk_offsets.len());
    if (sample_count as u64) > described {
        return Err(DemuxError::malformed(
            *b"stsc",
            format!("chunks describe {described} samples but stsz lists {sample_count}"),
        ));
    }
    let mut samples = Vec::with_capacity(sample_count);

    // Byte layout: walk chunks, taking samples-per-chunk from the stsc run
    // that covers each chunk.
    let mut stsc_index = 0usize;
    'chunks: for (chunk_index, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk_index as u32 + 1;
        while stsc_index + 1 < stsc.len() && stsc[stsc_index + 1].first_chunk <= chunk_number {
            stsc_index += 1;
        }
        let Some(run) = stsc.get(stsc_index) else {
            return Err(DemuxError::malformed(*b"stsc", "no sample-to-chunk entries"));
        };

        let mut offset = chunk_offset;
        for _ in 0..run.samples_per_chunk {
            let index = samples.len();
            if index >= sample_count {
                break 'chunks;
            }
            let size = sizes.get(index);
            let end = offset.checked_add(size as u64).ok_or_else(|| {
                DemuxError::malformed(
                    *b"stco",
                    format!("sample {index} at offset {offset} overflows the file offset"),
                )
            })?;
            samples.push(SampleInfo {
                offset,
                size,
                dts: 0,
                cts: 0,
                duration: 0,
                is_sync: true,
            });
            offset = end;
        }
    }

    if samples.len() != sample_count {
        return Err(DemuxError::malformed(
            *b"stsc",
            format!(
                "chunks describe {} samples but stsz lists {sample_count}",
                samples.len()
            ),
        ));
    }

    // Timing.
    let mut deltas = stts
        .iter()
        .flat_map(|&(count, delta)| std::iter::repeat_n(delta, count as usize));
    let mut offsets = ctts
        .iter()
        .flat_map(|&(count, offset)| std::iter::repeat_n(offset, count as usize));
    let mut dts = 0u64;
    let mut last_delta = 0u32;
    for sample in &mut samples {
        let delta = deltas.next().unwrap_or(last_delta);
        last_delta = delta;
        sample.dts = dts;
        sample.cts = dts as i64 + offsets.next().unwrap_or(0);
        sample.duration = delta;
        dts += delta as u64;
    }

    if let Some(sync) = sync {
        for (index, sample) in samples.iter_mut().enumerate() {
            sample.is_sync = sync.binary_search(&(index as u32 + 1)).is_ok();
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((8 + body.len()) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(fourcc);
        out.extend_from_slice(body);
        out
    }

    fn make_full_box(fourcc: &[u8; 4], version: u8, words: &[u32]) -> Vec<u8> {
        let mut body = vec![version, 0, 0, 0];
        for word in words {
            body.extend_from_slice(&word.to_be_bytes());
        }
        make_box(fourcc, &body)
    }

    fn stbl(extra: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        // 5 samples, 1000 ticks each.
        body.extend(make_full_box(b"stts", 0, &[1, 5, 1000]));
        // Two chunks: 3 samples then 2 samples.
        body.extend(make_full_box(b"stsc", 0, &[2, 1, 3, 1, 2, 2, 1]));
        body.extend(make_full_box(b"stsz", 0, &[0, 5, 10, 20, 30, 40, 50]));
        body.extend(make_full_box(b"stco", 0, &[2, 100, 1000]));
        for e in extra {
            body.extend_from_slice(e);
        }
        body
    }

    #[test]
    fn test_build_samples_layout_and_timing() {
        let stss = make_full_box(b"stss", 0, &[2, 1, 4]);
        let samples = build_samples(&stbl(&[stss])).unwrap();
        assert_eq!(samples.len(), 5);

        let offsets: Vec<u64> = samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 130, 1000, 1040]);

        let dts: Vec<u64> = samples.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 1000, 2000, 3000, 4000]);
        assert!(samples.iter().all(|s| s.duration == 1000));

        let sync: Vec<bool> = samples.iter().map(|s| s.is_sync).collect();
        assert_eq!(sync, vec![true, false, false, true, false]);
    }

    #[test]
    fn test_build_samples_without_stss_all_sync() {
        let samples = build_samples(&stbl(&[])).unwrap();
        assert!(samples.iter().all(|s| s.is_sync));
    }

    #[test]
    fn test_build_samples_composition_offsets() {
        let ctts = make_full_box(b"ctts", 0, &[2, 1, 2000, 4, 0]);
        let samples = build_samples(&stbl(&[ctts])).unwrap();
        assert_eq!(samples[0].cts, 2000);
        assert_eq!(samples[1].cts, 1000);
        assert_eq!(samples[4].cts, 4000);
    }

    #[test]
    fn test_build_samples_sample_count_mismatch() {
        let mut body = Vec::new();
        body.extend(make_full_box(b"stts", 0, &[1, 3, 1000]));
        body.extend(make_full_box(b"stsc", 0, &[1, 1, 1, 1]));
        body.extend(make_full_box(b"stsz", 0, &[0, 3, 10, 10, 10]));
        body.extend(make_full_box(b"stco", 0, &[1, 100]));
        assert!(matches!(
            build_samples(&body),
            Err(DemuxError::MalformedBox { .. })
        ));
    }

    #[test]
    fn test_uniform_sizes_are_not_materialized() {
        let body = [0, 0, 0, 0, 0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xF0];
        assert_eq!(
            parse_stsz(&body).unwrap(),
            SampleSizes::Uniform {
                size: 1,
                count: 0xFFFF_FFF0
            }
        );
    }

    #[test]
    fn test_uniform_count_beyond_chunk_layout() {
        let mut body = Vec::new();
        body.extend(make_full_box(b"stts", 0, &[1, 3, 1000]));
        body.extend(make_full_box(b"stsc", 0, &[1, 1, 2, 1]));
        body.extend(make_full_box(b"stsz", 0, &[16, 1_000_000]));
        body.extend(make_full_box(b"stco", 0, &[1, 100]));
        match build_samples(&body) {
            Err(DemuxError::MalformedBox { fourcc, reason }) => {
                assert_eq!(fourcc, "stsc");
                assert!(reason.contains("describe 2 samples"));
            }
            other => panic!("expected MalformedBox, got {other:?}"),
        }
    }

    #[test]
    fn test_uniform_count_above_limit() {
        let mut body = Vec::new();
        body.extend(make_full_box(b"stts", 0, &[1, 1, 1000]));
        body.extend(make_full_box(b"stsc", 0, &[1, 1, 0xFFFF_FFFF, 1]));
        body.extend(make_full_box(b"stsz", 0, &[1, 0xFFFF_FFF0]));
        body.extend(make_full_box(b"stco", 0, &[1, 100]));
        match build_samples(&body) {
            Err(DemuxError::MalformedBox { fourcc, .. }) => assert_eq!(fourcc, "stsz"),
            other => panic!("expected MalformedBox, got {other:?}"),
        }
    }

    #[test]
    fn test_uniform_sizes_layout() {
        let mut body = Vec::new();
        body.extend(make_full_box(b"stts", 0, &[1, 4, 1000]));
        body.extend(make_full_box(b"stsc", 0, &[1, 1, 2, 1]));
        body.extend(make_full_box(b"stsz", 0, &[25, 4]));
        body.extend(make_full_box(b"stco", 0, &[2, 100, 500]));
        let samples = build_samples(&body).unwrap();
        let offsets: Vec<u64> = samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 125, 500, 525]);
        assert!(samples.iter().all(|s| s.size == 25));
    }

    #[test]
    fn test_chunk_offset_overflow() {
        let mut body = Vec::new();
        body.extend(make_full_box(b"stts", 0, &[1, 2, 1000]));
        body.extend(make_full_box(b"stsc", 0, &[1, 1, 2, 1]));
        body.extend(make_full_box(b"stsz", 0, &[0, 2, 16, 16]));
        let mut co64 = vec![0, 0, 0, 0];
        co64.extend_from_slice(&1u32.to_be_bytes());
        co64.extend_from_slice(&(u64::MAX - 8).to_be_bytes());
        body.extend(make_box(b"co64", &co64));
        match build_samples(&body) {
            Err(DemuxError::MalformedBox { reason, .. }) => {
                assert!(reason.contains("overflows"));
            }
            other => panic!("expected MalformedBox, got {other:?}"),
        }
    }

    #[test]
    fn test_stz2_nibbles() {
        let mut body = vec![0, 0, 0, 0, 0, 0, 0, 4];
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(&[0x12, 0x30]);
        assert_eq!(parse_stz2(&body).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_required_table() {
        let body = make_full_box(b"stts", 0, &[0]);
        assert!(build_samples(&body).is_err());
    }
}
