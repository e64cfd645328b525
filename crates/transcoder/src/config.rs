//! Run configuration.

use media_types::Resolution;
use serde::{Deserialize, Serialize};

/// Encoder hardware preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareAcceleration {
    #[default]
    NoPreference,
    PreferHardware,
    PreferSoftware,
}

/// Target of the transcode stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Codec string, e.g. `vp8`, `vp09.00.10.08` or `av01.0.04M.08`.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    #[serde(default)]
    pub hardware_acceleration: HardwareAcceleration,
    #[serde(default)]
    pub framerate: Option<f64>,
}

impl EncoderConfig {
    pub fn new(codec: impl Into<String>, width: u32, height: u32, bitrate: u64) -> Self {
        Self {
            codec: codec.into(),
            width,
            height,
            bitrate,
            hardware_acceleration: HardwareAcceleration::default(),
            framerate: None,
        }
    }

    pub fn with_hardware_acceleration(mut self, preference: HardwareAcceleration) -> Self {
        self.hardware_acceleration = preference;
        self
    }

    pub fn with_framerate(mut self, framerate: f64) -> Self {
        self.framerate = Some(framerate);
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new("vp8", 1280, 720, 10_000_000)
            .with_hardware_acceleration(HardwareAcceleration::PreferSoftware)
    }
}

impl std::fmt::Display for EncoderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}bps",
            self.codec, self.width, self.height, self.bitrate
        )
    }
}

/// Configuration options for one transcode run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// What the transcode stage produces
    pub target: EncoderConfig,

    /// Request a key frame whenever this much presentation time has passed
    /// since the last requested one. The first frame is always a key frame.
    pub keyframe_interval_ms: u64,

    /// Capacity of every inter-stage channel
    pub channel_capacity: usize,

    /// Bytes requested from the source per read
    pub read_chunk_size: usize,

    /// Whether to decode the transcoded stream again for the preview
    pub preview: bool,

    /// Output filename suffix; derived from the target height when unset
    pub output_label: Option<String>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            target: EncoderConfig::default(),
            keyframe_interval_ms: 2_000,
            channel_capacity: 1,
            read_chunk_size: 64 * 1024,
            preview: true,
            output_label: None,
        }
    }
}

impl TranscodeConfig {
    /// Create a new builder for TranscodeConfig
    pub fn builder() -> TranscodeConfigBuilder {
        TranscodeConfigBuilder::new()
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn label(&self) -> String {
        match &self.output_label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.target.resolution().label(),
        }
    }

    /// `<input stem>-<label>.webm`
    pub fn output_filename(&self, input_name: &str) -> String {
        output_filename(input_name, &self.label())
    }
}

/// Strip directories and the extension from `input_name`, then append
/// `-<label>.webm`.
pub fn output_filename(input_name: &str, label: &str) -> String {
    let base = input_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input_name);
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };
    let stem = if stem.is_empty() { "output" } else { stem };
    format!("{stem}-{label}.webm")
}

pub struct TranscodeConfigBuilder {
    config: TranscodeConfig,
}

impl TranscodeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TranscodeConfig::default(),
        }
    }

    pub fn target(mut self, target: EncoderConfig) -> Self {
        self.config.target = target;
        self
    }

    pub fn keyframe_interval_ms(mut self, keyframe_interval_ms: u64) -> Self {
        self.config.keyframe_interval_ms = keyframe_interval_ms;
        self
    }

    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.config.channel_capacity = channel_capacity.max(1);
        self
    }

    pub fn read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.config.read_chunk_size = read_chunk_size.max(1);
        self
    }

    pub fn preview(mut self, preview: bool) -> Self {
        self.config.preview = preview;
        self
    }

    pub fn output_label(mut self, output_label: impl Into<String>) -> Self {
        self.config.output_label = Some(output_label.into());
        self
    }

    pub fn build(self) -> TranscodeConfig {
        self.config
    }
}

impl Default for TranscodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TranscodeConfig::default();
        assert_eq!(config.target.codec, "vp8");
        assert_eq!(config.target.resolution(), Resolution::new(1280, 720));
        assert_eq!(config.target.bitrate, 10_000_000);
        assert_eq!(
            config.target.hardware_acceleration,
            HardwareAcceleration::PreferSoftware
        );
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.label(), "720p");
    }

    #[test]
    fn test_from_json_partial() {
        let config = TranscodeConfig::from_json_str(
            r#"{
                "target": {
                    "codec": "vp09.00.10.08",
                    "width": 320,
                    "height": 240,
                    "bitrate": 500000,
                    "hardware_acceleration": "prefer-hardware"
                },
                "preview": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.target.codec, "vp09.00.10.08");
        assert_eq!(
            config.target.hardware_acceleration,
            HardwareAcceleration::PreferHardware
        );
        assert!(!config.preview);
        assert_eq!(config.keyframe_interval_ms, 2_000);
        assert_eq!(config.output_filename("clip.mp4"), "clip-240p.webm");
    }

    #[test]
    fn test_from_json_rejects_bad_preference() {
        let err = TranscodeConfig::from_json_str(
            r#"{"target": {"codec": "vp8", "width": 1, "height": 1, "bitrate": 1, "hardware_acceleration": "gpu"}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("holiday.mp4", "144p"), "holiday-144p.webm");
        assert_eq!(output_filename("/tmp/a.b.mp4", "240p"), "a.b-240p.webm");
        assert_eq!(output_filename("C:\\videos\\cat.MP4", "x"), "cat-x.webm");
        assert_eq!(output_filename("noext", "240p"), "noext-240p.webm");
        assert_eq!(output_filename(".hidden", "240p"), ".hidden-240p.webm");
        assert_eq!(output_filename("", "240p"), "output-240p.webm");
    }

    #[test]
    fn test_builder() {
        let config = TranscodeConfig::builder()
            .target(EncoderConfig::new("vp8", 320, 240, 500_000))
            .channel_capacity(0)
            .output_label("preview")
            .build();
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.output_filename("a.mp4"), "a-preview.webm");
        assert_eq!(
            config.target.to_string(),
            "vp8 320x240 @ 500000bps"
        );
    }
}
