//! Synthetic progressive MP4 builders.
//!
//! This module is available for local mp4 tests and optionally for downstream
//! crate tests when the `test-utils` feature is enabled.

use bytes::Bytes;

/// Bytes of a visual sample entry body before child boxes begin.
const VISUAL_SAMPLE_ENTRY_HEADER: usize = 78;

pub fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

pub fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

pub fn make_visual_sample_entry(fourcc: &[u8; 4], width: u16, height: u16, children: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; VISUAL_SAMPLE_ENTRY_HEADER];
    // data_reference_index
    body[6..8].copy_from_slice(&1u16.to_be_bytes());
    body[24..26].copy_from_slice(&width.to_be_bytes());
    body[26..28].copy_from_slice(&height.to_be_bytes());
    // 72 dpi, one frame per sample, depth 24, pre_defined -1
    body[28..32].copy_from_slice(&0x0048_0000u32.to_be_bytes());
    body[32..36].copy_from_slice(&0x0048_0000u32.to_be_bytes());
    body[40..42].copy_from_slice(&1u16.to_be_bytes());
    body[74..76].copy_from_slice(&0x0018u16.to_be_bytes());
    body[76..78].copy_from_slice(&0xFFFFu16.to_be_bytes());
    body.extend_from_slice(children);
    make_box(fourcc, &body)
}

/// AVCDecoderConfigurationRecord for High profile, level 3.1.
pub fn avc_config_payload() -> Vec<u8> {
    vec![
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x02,
        0x68, 0xEE,
    ]
}

/// vpcC payload (FullBox version 1) for profile 0, level 3.1, 8-bit.
pub fn vp9_config_payload() -> Vec<u8> {
    vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x1F, 0x80, 0x01, 0x01, 0x01, 0x00, 0x00]
}

fn ftyp() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"isom");
    body.extend_from_slice(&0x200u32.to_be_bytes());
    body.extend_from_slice(b"isom");
    body.extend_from_slice(b"avc1");
    make_box(b"ftyp", &body)
}

/// Builder for a single-video-track progressive MP4 file.
///
/// Sample payloads are deterministic, see [`SyntheticVideo::sample_payload`].
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    entry: [u8; 4],
    codec_box: Option<([u8; 4], Vec<u8>)>,
    width: u16,
    height: u16,
    timescale: u32,
    frame_duration: u32,
    frame_count: u32,
    keyframe_interval: u32,
    sample_size: usize,
    samples_per_chunk: u32,
    moov_first: bool,
    audio_track_first: bool,
    include_video: bool,
}

impl Default for SyntheticVideo {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticVideo {
    /// 1280x720 AVC at 25 fps, one key frame every two seconds.
    pub fn new() -> Self {
        Self {
            entry: *b"avc1",
            codec_box: Some((*b"avcC", avc_config_payload())),
            width: 1280,
            height: 720,
            timescale: 90_000,
            frame_duration: 3_600,
            frame_count: 25,
            keyframe_interval: 50,
            sample_size: 100,
            samples_per_chunk: 5,
            moov_first: true,
            audio_track_first: false,
            include_video: true,
        }
    }

    pub fn entry(mut self, entry: [u8; 4]) -> Self {
        self.entry = entry;
        self
    }

    pub fn codec_box(mut self, codec_box: Option<([u8; 4], Vec<u8>)>) -> Self {
        self.codec_box = codec_box;
        self
    }

    pub fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Media timescale and per-frame duration in that timescale.
    pub fn timing(mut self, timescale: u32, frame_duration: u32) -> Self {
        self.timescale = timescale;
        self.frame_duration = frame_duration;
        self
    }

    pub fn frame_count(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn keyframe_interval(mut self, keyframe_interval: u32) -> Self {
        self.keyframe_interval = keyframe_interval.max(1);
        self
    }

    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn samples_per_chunk(mut self, samples_per_chunk: u32) -> Self {
        self.samples_per_chunk = samples_per_chunk.max(1);
        self
    }

    pub fn moov_first(mut self, moov_first: bool) -> Self {
        self.moov_first = moov_first;
        self
    }

    /// Place an audio track before the video track.
    pub fn audio_track_first(mut self, audio_track_first: bool) -> Self {
        self.audio_track_first = audio_track_first;
        self
    }

    /// Produce a file with an audio track only.
    pub fn without_video(mut self) -> Self {
        self.include_video = false;
        self
    }

    pub fn frame_duration_us(&self) -> i64 {
        self.frame_duration as i64 * 1_000_000 / self.timescale as i64
    }

    pub fn duration_secs(&self) -> f64 {
        (self.frame_count as u64 * self.frame_duration as u64) as f64 / self.timescale as f64
    }

    /// Payload of sample `index`: its index as a big-endian u32 followed by
    /// filler bytes.
    pub fn sample_payload(&self, index: usize) -> Bytes {
        let mut data = vec![(index % 251) as u8; self.sample_size];
        let prefix = (index as u32).to_be_bytes();
        let n = prefix.len().min(data.len());
        data[..n].copy_from_slice(&prefix[..n]);
        Bytes::from(data)
    }

    /// Serialize the file.
    pub fn build(&self) -> Bytes {
        let ftyp = ftyp();
        let frames = self.frame_count as usize;
        let chunk_count = frames.div_ceil(self.samples_per_chunk as usize);

        let moov_len = self.moov(&vec![0; chunk_count]).len();
        let mdat_start = (if self.moov_first {
            ftyp.len() + moov_len + 8
        } else {
            ftyp.len() + 8
        }) as u32;
        let chunk_bytes = self.samples_per_chunk * self.sample_size as u32;
        let offsets: Vec<u32> = (0..chunk_count as u32)
            .map(|chunk| mdat_start + chunk * chunk_bytes)
            .collect();
        let moov = self.moov(&offsets);

        let mut payload = Vec::with_capacity(frames * self.sample_size);
        for index in 0..frames {
            payload.extend_from_slice(&self.sample_payload(index));
        }
        let mdat = make_box(b"mdat", &payload);

        let mut out = ftyp;
        if self.moov_first {
            out.extend(moov);
            out.extend(mdat);
        } else {
            out.extend(mdat);
            out.extend(moov);
        }
        Bytes::from(out)
    }

    fn moov(&self, chunk_offsets: &[u32]) -> Vec<u8> {
        let duration_ms =
            (self.frame_count as u64 * self.frame_duration as u64 * 1000 / self.timescale as u64) as u32;
        let mut mvhd = Vec::new();
        mvhd.extend_from_slice(&0u32.to_be_bytes());
        mvhd.extend_from_slice(&0u32.to_be_bytes());
        mvhd.extend_from_slice(&1000u32.to_be_bytes());
        mvhd.extend_from_slice(&duration_ms.to_be_bytes());
        mvhd.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        mvhd.extend_from_slice(&[0u8; 76]);

        let mut body = make_full_box(b"mvhd", 0, 0, &mvhd);
        if self.audio_track_first || !self.include_video {
            body.extend(self.audio_trak(1));
        }
        if self.include_video {
            let track_id = if self.audio_track_first { 2 } else { 1 };
            body.extend(self.video_trak(track_id, chunk_offsets));
        }
        make_box(b"moov", &body)
    }

    fn tkhd(track_id: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&track_id.to_be_bytes());
        payload.extend_from_slice(&[0u8; 68]);
        make_full_box(b"tkhd", 0, 3, &payload)
    }

    fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&timescale.to_be_bytes());
        payload.extend_from_slice(&duration.to_be_bytes());
        payload.extend_from_slice(&0x55C4u16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        make_full_box(b"mdhd", 0, 0, &payload)
    }

    fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(handler);
        payload.extend_from_slice(&[0u8; 12]);
        payload.extend_from_slice(b"Handler\0");
        make_full_box(b"hdlr", 0, 0, &payload)
    }

    fn audio_trak(&self, track_id: u32) -> Vec<u8> {
        let mut mdia = Self::mdhd(48_000, 0);
        mdia.extend(Self::hdlr(b"soun"));
        let mut trak = Self::tkhd(track_id);
        trak.extend(make_box(b"mdia", &mdia));
        make_box(b"trak", &trak)
    }

    fn video_trak(&self, track_id: u32, chunk_offsets: &[u32]) -> Vec<u8> {
        let frames = self.frame_count;

        let children = match &self.codec_box {
            Some((fourcc, payload)) => make_box(fourcc, payload),
            None => Vec::new(),
        };
        let entry = make_visual_sample_entry(&self.entry, self.width, self.height, &children);
        let mut stsd = 1u32.to_be_bytes().to_vec();
        stsd.extend(entry);

        let mut stts = 1u32.to_be_bytes().to_vec();
        stts.extend_from_slice(&frames.to_be_bytes());
        stts.extend_from_slice(&self.frame_duration.to_be_bytes());

        let sync: Vec<u32> = (0..frames)
            .filter(|index| index % self.keyframe_interval == 0)
            .map(|index| index + 1)
            .collect();
        let mut stss = (sync.len() as u32).to_be_bytes().to_vec();
        for number in &sync {
            stss.extend_from_slice(&number.to_be_bytes());
        }

        let mut stsz = (self.sample_size as u32).to_be_bytes().to_vec();
        stsz.extend_from_slice(&frames.to_be_bytes());

        // A short trailing chunk gets its own run.
        let mut runs = vec![(1u32, self.samples_per_chunk)];
        let rest = frames % self.samples_per_chunk;
        if chunk_offsets.len() > 1 && rest != 0 {
            runs.push((chunk_offsets.len() as u32, rest));
        }
        let mut stsc = (runs.len() as u32).to_be_bytes().to_vec();
        for (first_chunk, per_chunk) in runs {
            stsc.extend_from_slice(&first_chunk.to_be_bytes());
            stsc.extend_from_slice(&per_chunk.to_be_bytes());
            stsc.extend_from_slice(&1u32.to_be_bytes());
        }

        let mut stco = (chunk_offsets.len() as u32).to_be_bytes().to_vec();
        for offset in chunk_offsets {
            stco.extend_from_slice(&offset.to_be_bytes());
        }

        let mut stbl = make_full_box(b"stsd", 0, 0, &stsd);
        stbl.extend(make_full_box(b"stts", 0, 0, &stts));
        stbl.extend(make_full_box(b"stss", 0, 0, &stss));
        stbl.extend(make_full_box(b"stsz", 0, 0, &stsz));
        stbl.extend(make_full_box(b"stsc", 0, 0, &stsc));
        stbl.extend(make_full_box(b"stco", 0, 0, &stco));

        let mut minf = make_full_box(b"vmhd", 0, 1, &[0u8; 8]);
        minf.extend(make_box(b"stbl", &stbl));

        let mut mdia = Self::mdhd(self.timescale, frames * self.frame_duration);
        mdia.extend(Self::hdlr(b"vide"));
        mdia.extend(make_box(b"minf", &minf));

        let mut trak = Self::tkhd(track_id);
        trak.extend(make_box(b"mdia", &mdia));
        make_box(b"trak", &trak)
    }
}
