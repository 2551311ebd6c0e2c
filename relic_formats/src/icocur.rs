use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use memmap2::{Mmap, MmapOptions};

use crate::error::{DecodeError, Result};

const HEADER_SIZE: usize = 6;
const ENTRY_SIZE: usize = 16;
const INFO_HEADER_SIZE: usize = 40;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Which flavour of directory the container declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcoCurKind {
    Icon,
    Cursor,
}

/// One directory entry. For icons the two 16-bit fields hold plane and
/// bit-depth hints; for cursors they hold the hotspot. Payload bounds are
/// checked when the payload is read, not here, so one rotten entry cannot
/// hide its healthy siblings.
#[derive(Debug, Clone)]
pub struct IcoCurEntry {
    pub width: u16,
    pub height: u16,
    pub color_count: u8,
    pub planes_or_hotspot_x: u16,
    pub bpp_or_hotspot_y: u16,
    pub data_size: u32,
    pub data_offset: u32,
}

/// A decoded image: straight top-down RGBA, plus the hotspot for cursors.
#[derive(Debug, Clone)]
pub struct IcoCurImage {
    pub width: u32,
    pub height: u32,
    pub hotspot: Option<(u16, u16)>,
    pub rgba: Vec<u8>,
}

/// An ICO or CUR container, memory-mapped for the lifetime of the value.
#[derive(Debug)]
pub struct IcoCurFile {
    path: PathBuf,
    mmap: Mmap,
    kind: IcoCurKind,
    entries: Vec<IcoCurEntry>,
}

impl IcoCurFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)?;
        let mmap = unsafe { MmapOptions::new().map(&file) }?;
        let (kind, entries) = parse_directory(&mmap)?;
        Ok(IcoCurFile {
            path: path_buf,
            mmap,
            kind,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> IcoCurKind {
        self.kind
    }

    pub fn entries(&self) -> &[IcoCurEntry] {
        &self.entries
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&IcoCurEntry> {
        self.entries.get(index)
    }

    /// Raw payload bytes for an entry, bounds-checked against the file.
    pub fn payload(&self, entry: &IcoCurEntry) -> Result<&[u8]> {
        let offset = entry.data_offset as usize;
        let size = entry.data_size as usize;
        DecodeError::check_span(offset, size, self.mmap.len())?;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Decode an entry's payload to RGBA. Uncompressed DIB payloads are
    /// decoded in place; PNG-compressed entries are refused as unsupported.
    pub fn decode_entry(&self, entry: &IcoCurEntry) -> Result<IcoCurImage> {
        let payload = self.payload(entry)?;
        if is_png_payload(payload) {
            return Err(DecodeError::Unsupported(
                "PNG-compressed directory image".to_string(),
            ));
        }
        let hotspot = match self.kind {
            IcoCurKind::Cursor => Some((entry.planes_or_hotspot_x, entry.bpp_or_hotspot_y)),
            IcoCurKind::Icon => None,
        };
        let image = decode_dib(payload, hotspot)?;
        if image.width != u32::from(entry.width) || image.height != u32::from(entry.height) {
            warn!(
                "directory entry claims {}x{} but bitmap is {}x{}; using the bitmap",
                entry.width, entry.height, image.width, image.height
            );
        }
        Ok(image)
    }
}

/// True when a payload carries a PNG stream instead of a raw DIB.
pub fn is_png_payload(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

fn parse_directory(bytes: &[u8]) -> Result<(IcoCurKind, Vec<IcoCurEntry>)> {
    DecodeError::check_span(0, HEADER_SIZE, bytes.len())?;

    let reserved = u16::from_le_bytes(bytes[0..2].try_into().unwrap());
    if reserved != 0 {
        return Err(DecodeError::Malformed(format!(
            "directory reserved field is {reserved:#x}, not zero"
        )));
    }
    let kind = match u16::from_le_bytes(bytes[2..4].try_into().unwrap()) {
        1 => IcoCurKind::Icon,
        2 => IcoCurKind::Cursor,
        other => {
            return Err(DecodeError::Malformed(format!(
                "directory type {other} is neither icon (1) nor cursor (2)"
            )));
        }
    };
    let count = usize::from(u16::from_le_bytes(bytes[4..6].try_into().unwrap()));
    if count == 0 {
        return Err(DecodeError::Malformed("directory has no entries".to_string()));
    }
    // Fail closed: a directory that does not fit yields no entries at all.
    DecodeError::check_span(HEADER_SIZE, count * ENTRY_SIZE, bytes.len())?;

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let base = HEADER_SIZE + index * ENTRY_SIZE;
        let raw = &bytes[base..base + ENTRY_SIZE];
        if raw[3] != 0 {
            warn!("directory entry {index} has nonzero reserved byte {:#x}", raw[3]);
        }
        entries.push(IcoCurEntry {
            // A zero stored dimension means 256; the field is one byte wide.
            width: if raw[0] == 0 { 256 } else { u16::from(raw[0]) },
            height: if raw[1] == 0 { 256 } else { u16::from(raw[1]) },
            color_count: raw[2],
            planes_or_hotspot_x: u16::from_le_bytes(raw[4..6].try_into().unwrap()),
            bpp_or_hotspot_y: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            data_size: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            data_offset: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        });
    }
    Ok((kind, entries))
}

/// Decode an uncompressed Windows DIB as stored in icon payloads: a
/// BITMAPINFOHEADER whose height covers both the XOR image and the 1-bit
/// AND transparency mask, an optional palette, and bottom-up pixel rows.
fn decode_dib(payload: &[u8], hotspot: Option<(u16, u16)>) -> Result<IcoCurImage> {
    DecodeError::check_span(0, INFO_HEADER_SIZE, payload.len())?;
    let header_size = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    if header_size != INFO_HEADER_SIZE {
        return Err(DecodeError::Malformed(format!(
            "bitmap header size {header_size}, expected {INFO_HEADER_SIZE}"
        )));
    }
    let width = i32::from_le_bytes(payload[4..8].try_into().unwrap());
    let doubled_height = i32::from_le_bytes(payload[8..12].try_into().unwrap());
    let bpp = u16::from_le_bytes(payload[14..16].try_into().unwrap());
    let compression = u32::from_le_bytes(payload[16..20].try_into().unwrap());
    let colors_used = u32::from_le_bytes(payload[32..36].try_into().unwrap());

    if compression != 0 {
        return Err(DecodeError::Unsupported(format!(
            "compressed bitmap (method {compression})"
        )));
    }
    if width <= 0 || doubled_height <= 0 || doubled_height % 2 != 0 {
        return Err(DecodeError::Malformed(format!(
            "bitmap dimensions {width}x{doubled_height} are not a doubled-height icon"
        )));
    }
    let width = width as usize;
    let height = (doubled_height / 2) as usize;

    let palette_len = match bpp {
        1 | 4 | 8 => {
            if colors_used != 0 {
                colors_used as usize
            } else {
                1usize << bpp
            }
        }
        24 | 32 => 0,
        other => {
            return Err(DecodeError::Unsupported(format!(
                "{other}-bit directory bitmap"
            )));
        }
    };

    let palette_offset = INFO_HEADER_SIZE;
    let palette_bytes = palette_len * 4;
    let xor_stride = (width * usize::from(bpp) + 31) / 32 * 4;
    let and_stride = (width + 31) / 32 * 4;
    let overflow = || DecodeError::Malformed("bitmap extent overflows".to_string());
    let xor_len = xor_stride.checked_mul(height).ok_or_else(overflow)?;
    let and_len = and_stride.checked_mul(height).ok_or_else(overflow)?;
    let xor_offset = palette_offset + palette_bytes;
    let and_offset = xor_offset.checked_add(xor_len).ok_or_else(overflow)?;

    DecodeError::check_span(palette_offset, palette_bytes, payload.len())?;
    DecodeError::check_span(xor_offset, xor_len, payload.len())?;
    DecodeError::check_span(and_offset, and_len, payload.len())?;

    let palette = &payload[palette_offset..palette_offset + palette_bytes];
    let mut rgba = vec![0u8; width * height * 4];
    let mut any_alpha = false;

    for y in 0..height {
        // Rows are stored bottom-up.
        let src = xor_offset + (height - 1 - y) * xor_stride;
        for x in 0..width {
            let (r, g, b, a) = match bpp {
                1 | 4 | 8 => {
                    let index = match bpp {
                        1 => usize::from((payload[src + x / 8] >> (7 - (x % 8))) & 1),
                        4 => {
                            let byte = payload[src + x / 2];
                            usize::from(if x % 2 == 0 { byte >> 4 } else { byte & 0x0f })
                        }
                        _ => usize::from(payload[src + x]),
                    };
                    if index >= palette_len {
                        return Err(DecodeError::Malformed(format!(
                            "palette index {index} out of range ({palette_len} entries)"
                        )));
                    }
                    let entry = &palette[index * 4..index * 4 + 4];
                    (entry[2], entry[1], entry[0], 0xff)
                }
                24 => {
                    let p = src + x * 3;
                    (payload[p + 2], payload[p + 1], payload[p], 0xff)
                }
                _ => {
                    let p = src + x * 4;
                    (payload[p + 2], payload[p + 1], payload[p], payload[p + 3])
                }
            };
            if a != 0 {
                any_alpha = true;
            }
            let dst = (y * width + x) * 4;
            rgba[dst] = r;
            rgba[dst + 1] = g;
            rgba[dst + 2] = b;
            rgba[dst + 3] = a;
        }
    }

    // The AND mask supplies transparency for everything below 32 bpp. It
    // also rescues 32-bpp images whose alpha channel is entirely zero, a
    // common artifact of editors that never wrote one.
    let use_mask = bpp < 32 || !any_alpha;
    if bpp == 32 && !any_alpha {
        warn!("32-bit bitmap carries no alpha; falling back to the transparency mask");
    }
    if use_mask {
        for y in 0..height {
            let src = and_offset + (height - 1 - y) * and_stride;
            for x in 0..width {
                let masked = (payload[src + x / 8] >> (7 - (x % 8))) & 1 != 0;
                let dst = (y * width + x) * 4;
                rgba[dst + 3] = if masked { 0 } else { 0xff };
            }
        }
    }

    Ok(IcoCurImage {
        width: width as u32,
        height: height as u32,
        hotspot,
        rgba,
    })
}
