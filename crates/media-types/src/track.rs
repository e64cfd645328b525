use bytes::Bytes;

use crate::Resolution;

/// Configuration of the first video track of an input container.
///
/// Produced exactly once per run by the container reader and consumed by the
/// decode stage to initialize its engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackConfig {
    pub track_id: u32,
    /// Codec string, e.g. `avc1.64001f` or `vp09.00.10.08`.
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    /// Codec configuration box payload with the box header stripped.
    pub description: Option<Bytes>,
    pub duration_secs: f64,
}

impl TrackConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.coded_width, self.coded_height)
    }

    /// The decoder configuration needed to decode this track's samples.
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            codec: self.codec.clone(),
            coded_width: self.coded_width,
            coded_height: self.coded_height,
            description: self.description.clone(),
        }
    }
}

/// How to decode a stream of encoded chunks.
///
/// Encoders report one of these out-of-band alongside the chunk it first
/// applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub description: Option<Bytes>,
}

impl DecoderConfig {
    pub fn new(codec: impl Into<String>, coded_width: u32, coded_height: u32) -> Self {
        Self {
            codec: codec.into(),
            coded_width,
            coded_height,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Bytes) -> Self {
        self.description = Some(description);
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.coded_width, self.coded_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_decoder_config() {
        let track = TrackConfig {
            track_id: 1,
            codec: "avc1.64001f".to_string(),
            coded_width: 1280,
            coded_height: 720,
            description: Some(Bytes::from_static(&[1, 0x64, 0, 0x1f])),
            duration_secs: 10.0,
        };
        let config = track.decoder_config();
        assert_eq!(config.codec, "avc1.64001f");
        assert_eq!(config.resolution(), Resolution::new(1280, 720));
        assert_eq!(config.description, track.description);
    }
}
