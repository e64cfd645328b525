use bytes::Bytes;

use crate::Timestamped;

/// Whether a compressed unit can be decoded on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Key,
    Delta,
}

impl ChunkKind {
    #[inline]
    pub fn is_key(self) -> bool {
        matches!(self, ChunkKind::Key)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkKind::Key => f.write_str("key"),
            ChunkKind::Delta => f.write_str("delta"),
        }
    }
}

/// A unit of compressed video.
///
/// Demuxed samples and encoder output share this shape. The payload is handed
/// from stage to stage by value; a chunk is deliberately not `Clone` so that a
/// producer cannot keep using a payload it already forwarded.
#[derive(Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
    /// Duration in microseconds.
    pub duration_us: i64,
    pub data: Bytes,
}

impl EncodedChunk {
    pub fn new(kind: ChunkKind, timestamp_us: i64, duration_us: i64, data: Bytes) -> Self {
        Self {
            kind,
            timestamp_us,
            duration_us,
            data,
        }
    }

    #[inline]
    pub fn is_key(&self) -> bool {
        self.kind.is_key()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Presentation end time in microseconds.
    #[inline]
    pub fn end_us(&self) -> i64 {
        self.timestamp_us.saturating_add(self.duration_us)
    }
}

impl Timestamped for EncodedChunk {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_kind_display() {
        assert_eq!(ChunkKind::Key.to_string(), "key");
        assert_eq!(ChunkKind::Delta.to_string(), "delta");
    }

    #[test]
    fn test_chunk_end() {
        let chunk = EncodedChunk::new(ChunkKind::Delta, 40_000, 40_000, Bytes::from_static(b"x"));
        assert_eq!(chunk.end_us(), 80_000);
        assert!(!chunk.is_key());
        assert_eq!(chunk.len(), 1);
    }
}
