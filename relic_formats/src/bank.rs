use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use memmap2::{Mmap, MmapOptions};

use crate::error::{DecodeError, Result};
use crate::lzw;
use crate::ppic::{PpicImage, decode_ppic};

const MAGIC: &[u8; 4] = b"RBNK";
const HEADER_SIZE: usize = 8;
const ENTRY_SIZE: usize = 16;

/// How a bank entry's payload is stored. The tag byte in the directory
/// record picks the decoder; tags outside this set are refused at load
/// time so one bad record cannot poison the rest of the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankCodec {
    /// Stored bytes are the resource.
    Raw,
    /// Dictionary-compressed byte stream.
    Lzw,
    /// Packed 1-bpp bitmap stream.
    Bitmap,
}

impl BankCodec {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BankCodec::Raw),
            1 => Some(BankCodec::Lzw),
            2 => Some(BankCodec::Bitmap),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BankCodec::Raw => "raw",
            BankCodec::Lzw => "lzw",
            BankCodec::Bitmap => "bitmap",
        }
    }
}

/// One directory record. `width`/`height` declare the geometry of bitmap
/// payloads and are zero for plain blobs; the codec tag is kept raw so an
/// unknown tag surfaces when the entry is loaded, not before.
#[derive(Debug, Clone)]
pub struct BankEntry {
    pub id: u16,
    pub codec_tag: u8,
    pub width: u16,
    pub height: u16,
    pub data_size: u32,
    pub data_offset: u32,
}

impl BankEntry {
    pub fn codec(&self) -> Option<BankCodec> {
        BankCodec::from_tag(self.codec_tag)
    }
}

/// A loaded payload: either plain bytes or a decoded bitmap, depending on
/// the entry's codec tag.
#[derive(Debug, Clone)]
pub enum BankPayload {
    Blob(Vec<u8>),
    Bitmap(PpicImage),
}

/// A resource bank, memory-mapped for the lifetime of the value. The
/// directory extent is validated when the bank is opened; per-entry payload
/// extents are validated when a payload is read.
#[derive(Debug)]
pub struct BankFile {
    path: PathBuf,
    mmap: Mmap,
    entries: Vec<BankEntry>,
}

impl BankFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)?;
        let mmap = unsafe { MmapOptions::new().map(&file) }?;
        let entries = parse_directory(&mmap)?;
        Ok(BankFile {
            path: path_buf,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[BankEntry] {
        &self.entries
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&BankEntry> {
        self.entries.get(index)
    }

    /// First entry carrying the given resource id.
    pub fn find(&self, id: u16) -> Option<&BankEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Stored payload bytes for an entry, bounds-checked against the file.
    pub fn payload(&self, entry: &BankEntry) -> Result<&[u8]> {
        let offset = entry.data_offset as usize;
        let size = entry.data_size as usize;
        DecodeError::check_span(offset, size, self.mmap.len())?;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Load an entry through the decoder its codec tag declares.
    pub fn load_entry(&self, entry: &BankEntry) -> Result<BankPayload> {
        let payload = self.payload(entry)?;
        let codec = entry.codec().ok_or_else(|| {
            DecodeError::Malformed(format!(
                "entry {} declares unknown codec tag {:#04x}",
                entry.id, entry.codec_tag
            ))
        })?;
        match codec {
            BankCodec::Raw => Ok(BankPayload::Blob(payload.to_vec())),
            BankCodec::Lzw => Ok(BankPayload::Blob(lzw::unpack(payload)?)),
            BankCodec::Bitmap => {
                let image = decode_ppic(payload)?;
                if image.width != entry.width || image.height != entry.height {
                    warn!(
                        "entry {} claims {}x{} but bitmap is {}x{}; using the bitmap",
                        entry.id, entry.width, entry.height, image.width, image.height
                    );
                }
                Ok(BankPayload::Bitmap(image))
            }
        }
    }
}

fn parse_directory(bytes: &[u8]) -> Result<Vec<BankEntry>> {
    DecodeError::check_span(0, HEADER_SIZE, bytes.len())?;
    if &bytes[0..4] != MAGIC {
        return Err(DecodeError::Malformed(
            "bank is missing its RBNK signature".to_string(),
        ));
    }
    let count = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    if count == 0 {
        return Err(DecodeError::Malformed("bank has no entries".to_string()));
    }
    let directory_bytes = count.checked_mul(ENTRY_SIZE).ok_or_else(|| {
        DecodeError::Malformed(format!("entry count {count} overflows the directory"))
    })?;
    // Fail closed: a directory that does not fit yields no entries at all.
    DecodeError::check_span(HEADER_SIZE, directory_bytes, bytes.len())?;

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let base = HEADER_SIZE + index * ENTRY_SIZE;
        let raw = &bytes[base..base + ENTRY_SIZE];
        if raw[3] != 0 {
            warn!("bank entry {index} has nonzero reserved byte {:#x}", raw[3]);
        }
        entries.push(BankEntry {
            id: u16::from_le_bytes(raw[0..2].try_into().unwrap()),
            codec_tag: raw[2],
            width: u16::from_le_bytes(raw[4..6].try_into().unwrap()),
            height: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            data_size: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            data_offset: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        });
    }
    Ok(entries)
}
