//! Per-run counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters shared by the tasks of one run.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub samples_read: AtomicU64,
    pub bytes_read: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_encoded: AtomicU64,
    pub chunks_encoded: AtomicU64,
    pub preview_frames: AtomicU64,
    pub chunks_written: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl RunCounters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStats {
        RunStats {
            samples_read: self.samples_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            chunks_encoded: self.chunks_encoded.load(Ordering::Relaxed),
            preview_frames: self.preview_frames.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Statistics of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub samples_read: u64,
    /// Bytes consumed from the source.
    pub bytes_read: u64,
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    pub chunks_encoded: u64,
    pub preview_frames: u64,
    pub chunks_written: u64,
    /// Size of the finalized container.
    pub bytes_written: u64,
}
