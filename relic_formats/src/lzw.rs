// SPDX-License-Identifier: GPL-2.0-or-later
//
// Adaptive LZW in the late-80s resource-compiler dialect: 8-bit literals,
// variable 9..12-bit codes packed low-bit-first, an in-band CLEAR code that
// resets the dictionary once the 4096-code table fills, and an explicit
// end-of-data code closing every stream. Pack and Unpack are exact mirrors;
// the decoder runs one dictionary insertion behind the encoder, which is why
// its code width grows one entry earlier.

use crate::bitstream::{LsbBitReader, LsbBitWriter};
use crate::error::{DecodeError, Result};

const LITERAL_BITS: u32 = 8;
const LITERAL_COUNT: usize = 1 << LITERAL_BITS;

/// Dictionary reset request, sent mid-stream when the table is full.
pub const CLEAR_CODE: u16 = 1 << LITERAL_BITS;
/// End-of-data marker; every packed stream ends with one.
pub const END_CODE: u16 = CLEAR_CODE + 1;

const FIRST_FREE: u16 = END_CODE + 1;
const MIN_WIDTH: u32 = LITERAL_BITS + 1;
const MAX_WIDTH: u32 = 12;
const TABLE_CODES: u16 = 1 << MAX_WIDTH;

const NIL: u16 = u16::MAX;

#[derive(Clone, Copy)]
struct DictEntry {
    prefix: u16,
    suffix: u8,
    next: u16,
}

/// Pack-side dictionary: an arena indexed by `code - FIRST_FREE`, chained
/// through per-suffix head slots so a (prefix, suffix) lookup only walks
/// entries that already end in that byte. Reset rewinds the arena cursor and
/// clears the heads; nothing is reallocated.
struct PackDict {
    entries: Vec<DictEntry>,
    heads: [u16; LITERAL_COUNT],
}

impl PackDict {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(usize::from(TABLE_CODES - FIRST_FREE)),
            heads: [NIL; LITERAL_COUNT],
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.heads = [NIL; LITERAL_COUNT];
    }

    fn is_full(&self) -> bool {
        self.entries.len() == usize::from(TABLE_CODES - FIRST_FREE)
    }

    fn find(&self, prefix: u16, suffix: u8) -> Option<u16> {
        let mut idx = self.heads[usize::from(suffix)];
        while idx != NIL {
            let entry = self.entries[usize::from(idx)];
            if entry.prefix == prefix {
                return Some(FIRST_FREE + idx);
            }
            idx = entry.next;
        }
        None
    }

    /// Claim the next code for (prefix, suffix). Caller checks `is_full`.
    fn insert(&mut self, prefix: u16, suffix: u8) -> u16 {
        let idx = self.entries.len() as u16;
        self.entries.push(DictEntry {
            prefix,
            suffix,
            next: self.heads[usize::from(suffix)],
        });
        self.heads[usize::from(suffix)] = idx;
        FIRST_FREE + idx
    }
}

/// Unpack-side mirror of the dictionary: only (prefix, suffix) pairs, since
/// the decoder never searches, it only expands chains.
struct UnpackDict {
    entries: Vec<(u16, u8)>,
}

impl UnpackDict {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(usize::from(TABLE_CODES - FIRST_FREE)),
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
    }

    fn next_free(&self) -> u16 {
        FIRST_FREE + self.entries.len() as u16
    }

    fn push(&mut self, prefix: u16, suffix: u8) {
        self.entries.push((prefix, suffix));
    }

    /// Append the expansion of `code` to `out`, front byte first. The prefix
    /// chain is walked onto `out` in reverse and flipped in place.
    fn expand(&self, code: u16, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let mut node = code;
        for _ in 0..=self.entries.len() {
            if node < CLEAR_CODE {
                out.push(node as u8);
                out[start..].reverse();
                return Ok(());
            }
            if node < FIRST_FREE {
                return Err(DecodeError::Desync(format!(
                    "reserved code {node:#x} inside a dictionary chain"
                )));
            }
            let Some(&(prefix, suffix)) = self.entries.get(usize::from(node - FIRST_FREE)) else {
                return Err(DecodeError::Desync(format!(
                    "dangling dictionary code {node:#x}"
                )));
            };
            out.push(suffix);
            node = prefix;
        }
        Err(DecodeError::Desync(
            "dictionary chain does not terminate".into(),
        ))
    }
}

/// Compress `input`. The stream always ends with [`END_CODE`]; empty input
/// packs to the bare terminator.
pub fn pack(input: &[u8]) -> Vec<u8> {
    let mut dict = PackDict::new();
    let mut writer = LsbBitWriter::new();
    let mut width = MIN_WIDTH;
    let mut current: Option<u16> = None;

    for &byte in input {
        let Some(prefix) = current else {
            current = Some(u16::from(byte));
            continue;
        };
        if let Some(code) = dict.find(prefix, byte) {
            current = Some(code);
        } else if dict.is_full() {
            writer.write_bits(u32::from(prefix), width);
            writer.write_bits(u32::from(CLEAR_CODE), width);
            dict.reset();
            width = MIN_WIDTH;
            current = Some(u16::from(byte));
        } else {
            writer.write_bits(u32::from(prefix), width);
            let code = dict.insert(prefix, byte);
            // The code one past the new entry still fits the old width; the
            // entry landing exactly on a power of two is what widens it.
            if u32::from(code) == 1 << width && width < MAX_WIDTH {
                width += 1;
            }
            current = Some(u16::from(byte));
        }
    }

    if let Some(prefix) = current {
        writer.write_bits(u32::from(prefix), width);
    }
    writer.write_bits(u32::from(END_CODE), width);
    writer.finish()
}

/// Expand a packed stream. A code the dictionary cannot know yet is a
/// [`DecodeError::Desync`]; a stream that ends before [`END_CODE`] is
/// [`DecodeError::Truncated`]. Either way the stream is unusable but the
/// failure stays local to it.
pub fn unpack(input: &[u8]) -> Result<Vec<u8>> {
    let mut reader = LsbBitReader::new(input);
    let mut dict = UnpackDict::new();
    let mut output = Vec::new();
    let mut scratch: Vec<u8> = Vec::new();
    let mut width = MIN_WIDTH;
    let mut prev: Option<u16> = None;

    loop {
        let Some(code) = reader.read_bits(width) else {
            return Err(DecodeError::Truncated {
                offset: input.len(),
                needed: width.div_ceil(8) as usize,
                available: 0,
            });
        };
        let code = code as u16;
        if code == END_CODE {
            return Ok(output);
        }
        if code == CLEAR_CODE {
            dict.reset();
            width = MIN_WIDTH;
            prev = None;
            continue;
        }

        let next_free = dict.next_free();
        scratch.clear();
        if code < next_free {
            dict.expand(code, &mut scratch)?;
        } else if code == next_free {
            // The one legal not-yet-defined code: the encoder used the entry
            // it was about to create, so its string is the previous string
            // plus its own first byte.
            let Some(prefix) = prev else {
                return Err(DecodeError::Desync(format!(
                    "self-referential code {code:#x} with an empty dictionary"
                )));
            };
            dict.expand(prefix, &mut scratch)?;
            let first = scratch[0];
            scratch.push(first);
        } else {
            return Err(DecodeError::Desync(format!(
                "code {code:#x} beyond next free entry {next_free:#x}"
            )));
        }

        if let Some(prefix) = prev {
            if next_free < TABLE_CODES {
                dict.push(prefix, scratch[0]);
                if u32::from(next_free) + 1 == 1 << width && width < MAX_WIDTH {
                    width += 1;
                }
            }
        }
        output.extend_from_slice(&scratch);
        prev = Some(code);
    }
}
