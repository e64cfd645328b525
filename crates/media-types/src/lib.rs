//! Shared media domain types.
//!
//! These types are passed between the container reader, the codec stages and
//! the container writer. Nothing here performs I/O.

mod chunk;
mod frame;
mod track;

pub use chunk::{ChunkKind, EncodedChunk};
pub use frame::{FramePool, PixelFormat, RawFrame};
pub use track::{DecoderConfig, TrackConfig};

/// Coded picture size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Height label in the usual `720p` form.
    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Anything that carries a presentation timestamp in microseconds.
pub trait Timestamped {
    fn timestamp_us(&self) -> i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_label() {
        let size = Resolution::new(320, 240);
        assert_eq!(size.to_string(), "320x240");
        assert_eq!(size.label(), "240p");
    }

    #[test]
    fn test_empty_sizes() {
        assert!(Resolution::default().is_empty());
        assert!(Resolution::new(640, 0).is_empty());
        assert!(!Resolution::new(2, 2).is_empty());
    }
}
