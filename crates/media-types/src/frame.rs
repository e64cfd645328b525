//! Raw decoded pictures and the pool that accounts for them.
//!
//! A [`RawFrame`] holds a lease on its [`FramePool`]. The lease is returned
//! when the frame is dropped or explicitly closed, so every frame is released
//! exactly once by whichever stage owns it last.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Resolution, Timestamped};

/// Pixel layout of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, three planes.
    I420,
    /// Semi-planar YUV 4:2:0, luma plane plus interleaved chroma.
    Nv12,
    /// Packed 8-bit RGBA.
    Rgba,
}

impl PixelFormat {
    /// Number of bytes a tightly packed picture of this format occupies.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelFormat::I420 | PixelFormat::Nv12 => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                w * h + 2 * chroma
            }
            PixelFormat::Rgba => w * h * 4,
        }
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    live: AtomicUsize,
    peak: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// Accounting for raw frames produced by one engine (or a group of engines).
///
/// Cloning a pool shares its counters.
#[derive(Debug, Clone, Default)]
pub struct FramePool {
    counters: Arc<PoolCounters>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled frame.
    pub fn allocate(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        timestamp_us: i64,
        duration_us: i64,
    ) -> RawFrame {
        let data = vec![0u8; format.frame_size(width, height)];
        self.wrap(format, width, height, timestamp_us, duration_us, data)
    }

    /// Take ownership of already decoded pixel data.
    pub fn wrap(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        timestamp_us: i64,
        duration_us: i64,
        data: Vec<u8>,
    ) -> RawFrame {
        let live = self.counters.live.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(live, Ordering::AcqRel);
        self.counters.allocated.fetch_add(1, Ordering::AcqRel);

        RawFrame {
            format,
            width,
            height,
            timestamp_us,
            duration_us,
            data,
            _lease: FrameLease {
                counters: Arc::clone(&self.counters),
            },
        }
    }

    /// Frames currently alive.
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Highest number of frames that were alive at the same time.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    pub fn allocated(&self) -> usize {
        self.counters.allocated.load(Ordering::Acquire)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct FrameLease {
    counters: Arc<PoolCounters>,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        self.counters.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// A decoded picture.
///
/// Move-only: ownership moves from the decoder to the encoder or the preview
/// renderer, and the frame goes back to its pool when the last owner drops or
/// closes it.
#[derive(Debug)]
pub struct RawFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub timestamp_us: i64,
    pub duration_us: i64,
    data: Vec<u8>,
    _lease: FrameLease,
}

impl RawFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Release the frame back to its pool.
    #[inline]
    pub fn close(self) {
        drop(self);
    }
}

impl Timestamped for RawFrame {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }
}
