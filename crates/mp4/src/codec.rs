//! Codec configuration boxes and codec string derivation.
//!
//! A visual sample entry carries its decoder configuration in one of a closed
//! set of child boxes. Lookup walks that set in a fixed priority order and
//! returns the first box present.

use bytes::Bytes;

use crate::box_utils::{find_first_box, fourcc_to_string};
use crate::error::Result;

/// Recognized codec configuration boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecBox {
    /// `avcC`: AVCDecoderConfigurationRecord.
    Avc,
    /// `hvcC`: HEVCDecoderConfigurationRecord.
    Hevc,
    /// `vpcC`: VP codec configuration (FullBox).
    Vp9,
    /// `av1C`: AV1CodecConfigurationRecord.
    Av1,
}

impl CodecBox {
    /// Lookup priority.
    pub const ALL: [CodecBox; 4] = [CodecBox::Avc, CodecBox::Hevc, CodecBox::Vp9, CodecBox::Av1];

    pub fn fourcc(self) -> [u8; 4] {
        match self {
            CodecBox::Avc => *b"avcC",
            CodecBox::Hevc => *b"hvcC",
            CodecBox::Vp9 => *b"vpcC",
            CodecBox::Av1 => *b"av1C",
        }
    }

    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.fourcc() == *fourcc)
    }

    /// Build a codec string from the sample entry type and the box payload
    /// (box header already stripped).
    pub fn codec_string(self, entry: &[u8; 4], payload: &[u8]) -> String {
        let entry = fourcc_to_string(entry);
        match self {
            CodecBox::Avc => avc_codec_string(&entry, payload),
            CodecBox::Hevc => hevc_codec_string(&entry, payload),
            CodecBox::Vp9 => vp9_codec_string(&entry, payload),
            CodecBox::Av1 => av1_codec_string(&entry, payload),
        }
    }
}

/// A codec configuration box found in a sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfigBox {
    pub kind: CodecBox,
    /// Box payload without the 8-byte box header.
    pub payload: Bytes,
}

/// Search the children of a sample entry for the first recognized codec box.
pub(crate) fn find_codec_box(children: &[u8]) -> Result<Option<CodecConfigBox>> {
    for kind in CodecBox::ALL {
        if let Some(found) = find_first_box(children, kind.fourcc())? {
            return Ok(Some(CodecConfigBox {
                kind,
                payload: Bytes::copy_from_slice(found.body),
            }));
        }
    }
    Ok(None)
}

fn avc_codec_string(entry: &str, payload: &[u8]) -> String {
    if payload.len() < 4 {
        return entry.to_string();
    }
    format!(
        "{entry}.{:02x}{:02x}{:02x}",
        payload[1], payload[2], payload[3]
    )
}

fn hevc_codec_string(entry: &str, payload: &[u8]) -> String {
    if payload.len() < 13 {
        return entry.to_string();
    }

    let profile_space = payload[1] >> 6;
    let tier_flag = (payload[1] >> 5) & 0x01;
    let profile_idc = payload[1] & 0x1F;
    let compatibility = u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]);
    let constraints = &payload[6..12];
    let level_idc = payload[12];

    let mut out = format!("{entry}.");
    if profile_space > 0 {
        out.push((b'A' + profile_space - 1) as char);
    }
    out.push_str(&format!("{profile_idc}."));
    out.push_str(&format!("{:X}", compatibility.reverse_bits()));
    out.push_str(&format!(
        ".{}{}",
        if tier_flag == 0 { 'L' } else { 'H' },
        level_idc
    ));

    let used = constraints
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    for byte in &constraints[..used] {
        out.push_str(&format!(".{byte:X}"));
    }
    out
}

fn vp9_codec_string(entry: &str, payload: &[u8]) -> String {
    // FullBox: version + flags precede the record.
    if payload.len() < 7 {
        return entry.to_string();
    }
    let profile = payload[4];
    let level = payload[5];
    let bit_depth = payload[6] >> 4;
    format!("{entry}.{profile:02}.{level:02}.{bit_depth:02}")
}

fn av1_codec_string(entry: &str, payload: &[u8]) -> String {
    if payload.len() < 3 {
        return entry.to_string();
    }
    let profile = payload[1] >> 5;
    let level = payload[1] & 0x1F;
    let tier = if payload[2] & 0x80 != 0 { 'H' } else { 'M' };
    let high_bitdepth = payload[2] & 0x40 != 0;
    let twelve_bit = payload[2] & 0x20 != 0;
    let bit_depth = match (high_bitdepth, twelve_bit) {
        (true, true) => 12,
        (true, false) => 10,
        _ => 8,
    };
    format!("{entry}.{profile}.{level:02}{tier}.{bit_depth:02}")
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

    #[test]
    fn test_from_fourcc() {
        assert_eq!(CodecBox::from_fourcc(b"hvcC"), Some(CodecBox::Hevc));
        assert_eq!(CodecBox::from_fourcc(b"esds"), None);
    }

    #[test]
    fn test_avc_codec_string() {
        let payload = [0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1];
        assert_eq!(
            CodecBox::Avc.codec_string(b"avc1", &payload),
            "avc1.64001f"
        );
        assert_eq!(CodecBox::Avc.codec_string(b"avc1", &[1]), "avc1");
    }

    #[test]
    fn test_hevc_codec_string() {
        // Main profile, compatibility flag bit 1/2, level 93, progressive source flag.
        let payload = [
            0x01, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00, 93,
        ];
        assert_eq!(
            CodecBox::Hevc.codec_string(b"hvc1", &payload),
            "hvc1.1.6.L93.90"
        );
    }

    #[test]
    fn test_vp9_codec_string() {
        let payload = [0x01, 0, 0, 0, 0x00, 0x0A, 0x80, 0x01];
        assert_eq!(
            CodecBox::Vp9.codec_string(b"vp09", &payload),
            "vp09.00.10.08"
        );
    }

    #[test]
    fn test_av1_codec_string() {
        let payload = [0x81, 0x04, 0x0C, 0x00];
        assert_eq!(
            CodecBox::Av1.codec_string(b"av01", &payload),
            "av01.0.04M.08"
        );
        let ten_bit = [0x81, 0x28, 0xC0, 0x00];
        assert_eq!(
            CodecBox::Av1.codec_string(b"av01", &ten_bit),
            "av01.1.08H.10"
        );
    }

    #[test]
    fn test_find_codec_box_priority() {
        let mut children = make_box(b"pasp", &[0, 0, 0, 1, 0, 0, 0, 1]);
        children.extend(make_box(b"av1C", &[0x81, 0x04, 0x0C, 0x00]));
        children.extend(make_box(b"avcC", &[0x01, 0x42, 0xC0, 0x1E]));

        let found = find_codec_box(&children).unwrap().unwrap();
        assert_eq!(found.kind, CodecBox::Avc);
        assert_eq!(found.payload.as_ref(), &[0x01, 0x42, 0xC0, 0x1E]);
    }

    #[test]
    fn test_find_codec_box_none() {
        let children = make_box(b"esds", &[0; 4]);
        assert!(find_codec_box(&children).unwrap().is_none());
        assert!(find_codec_box(&[]).unwrap().is_none());
    }
}
