use crate::error::DemuxError;

/// Declared extent of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoxSize {
    /// Total size including the header.
    Known(u64),
    /// `size == 0`: the box runs to the end of its parent (or of the file).
    ToEnd,
}

/// Decoded box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoxHeader {
    pub(crate) size: BoxSize,
    pub(crate) fourcc: [u8; 4],
    pub(crate) header_size: usize,
}

/// Read a box header from the start of `data`.
///
/// Returns `None` when not enough bytes are available yet. Handles 32-bit
/// size, 64-bit extended size (`size == 1`) and box-extends-to-end
/// (`size == 0`).
pub(crate) fn read_box_header(data: &[u8]) -> Option<BoxHeader> {
    if data.len() < 8 {
        return None;
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let fourcc: [u8; 4] = [data[4], data[5], data[6], data[7]];

    match size {
        1 => {
            if data.len() < 16 {
                return None;
            }
            let ext_size = u64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]);
            Some(BoxHeader {
                size: BoxSize::Known(ext_size),
                fourcc,
                header_size: 16,
            })
        }
        0 => Some(BoxHeader {
            size: BoxSize::ToEnd,
            fourcc,
            header_size: 8,
        }),
        _ => Some(BoxHeader {
            size: BoxSize::Known(size),
            fourcc,
            header_size: 8,
        }),
    }
}

/// A fully buffered box inside a parent slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoxView<'a> {
    pub(crate) fourcc: [u8; 4],
    pub(crate) body: &'a [u8],
}

/// Iterator over the child boxes of a fully buffered parent body.
///
/// Yields an error and stops on a box whose declared size does not fit.
pub(crate) struct BoxIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> BoxIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<BoxView<'a>, DemuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = &self.data[self.offset..];
        let Some(header) = read_box_header(remaining) else {
            self.failed = true;
            return Some(Err(DemuxError::malformed(
                "box",
                format!("truncated header at offset {}", self.offset),
            )));
        };

        let size = match header.size {
            BoxSize::Known(size) => size as usize,
            BoxSize::ToEnd => remaining.len(),
        };

        if size < header.header_size || size > remaining.len() {
            self.failed = true;
            return Some(Err(DemuxError::malformed(
                header.fourcc,
                format!("declared size {size} exceeds the {} available bytes", remaining.len()),
            )));
        }

        self.offset += size;
        Some(Ok(BoxView {
            fourcc: header.fourcc,
            body: &remaining[header.header_size..size],
        }))
    }
}

/// Find the first child box with the given FourCC inside a parent body.
pub(crate) fn find_first_box<'a>(
    data: &'a [u8],
    target: [u8; 4],
) -> Result<Option<BoxView<'a>>, DemuxError> {
    for child in BoxIter::new(data) {
        let child = child?;
        if child.fourcc == target {
            return Ok(Some(child));
        }
    }
    Ok(None)
}

/// Like [`find_first_box`] but a missing box is an error.
pub(crate) fn require_box<'a>(data: &'a [u8], target: [u8; 4]) -> Result<BoxView<'a>, DemuxError> {
    find_first_box(data, target)?
        .ok_or_else(|| DemuxError::malformed(target, "required box is missing"))
}

/// Split a FullBox body into `(version, flags, payload)`.
pub(crate) fn full_box(fourcc: [u8; 4], body: &[u8]) -> Result<(u8, u32, &[u8]), DemuxError> {
    if body.len() < 4 {
        return Err(DemuxError::malformed(fourcc, "missing version and flags"));
    }
    let flags = u32::from_be_bytes([0, body[1], body[2], body[3]]);
    Ok((body[0], flags, &body[4..]))
}

pub(crate) fn fourcc_to_string(fourcc: &[u8; 4]) -> String {
    fourcc
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}
