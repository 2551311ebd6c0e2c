// SPDX-License-Identifier: GPL-2.0-or-later
//
// PPIC-style 1-bit bitmap codec from mid-80s point-and-click resource forks.
// Pixels are Huffman-coded as nibbles against one of two fixed canonical
// tables; a reserved escape symbol switches to a byte-run generator whose
// repeat count escalates through 3-, 4- and 8-bit fields. Decoded rows can
// additionally be delta-filtered against the previous byte or the previous
// row.

use log::warn;

use crate::bitstream::MsbBitReader;
use crate::error::{DecodeError, Result};

/// Symbol value reserved for the run-length escape.
const ESCAPE: u8 = 0x10;

/// One canonical nibble table: `masks` are the 16-bit-scaled lower bounds of
/// each codeword's interval, ascending, so a linear scan over a 16-bit
/// lookahead finds the matching row without building a tree.
struct HuffTable {
    masks: [u16; 17],
    lens: [u8; 17],
    symbols: [u8; 17],
}

const TABLE_MODE1: HuffTable = HuffTable {
    masks: [
        0x0000, 0x2000, 0x4000, 0x5000, 0x6000, 0x7000, 0x8000, 0x9000, 0xa000, 0xb000, 0xc000,
        0xd000, 0xd800, 0xe000, 0xe800, 0xf000, 0xf800,
    ],
    lens: [3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5],
    symbols: [
        0x2, 0x0, 0xf, 0x1, 0x3, 0x5, 0x6, 0x7, 0x8, 0x9, 0xa, 0xb, 0x4, 0xc, 0xd, 0xe, ESCAPE,
    ],
};

const TABLE_MODE2: HuffTable = HuffTable {
    masks: [
        0x0000, 0x4000, 0x6000, 0x8000, 0x9000, 0xa000, 0xb000, 0xc000, 0xc800, 0xd000, 0xd800,
        0xe000, 0xe800, 0xf000, 0xf400, 0xf800, 0xfc00,
    ],
    lens: [2, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 6, 6, 6, 6],
    symbols: [
        0x0, 0xf, 0x7, 0x1, 0x8, 0x3, 0xe, 0x2, 0x4, 0x6, 0x9, 0xb, 0xd, 0x5, 0xa, 0xc, ESCAPE,
    ],
};

/// Header fields without the pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpicMetadata {
    pub mode: u8,
    pub width: u16,
    pub height: u16,
}

/// A decoded 1-bpp bitmap. Rows are padded to an even byte count; the most
/// significant bit of each byte is the leftmost pixel.
#[derive(Debug, Clone)]
pub struct PpicImage {
    pub mode: u8,
    pub width: u16,
    pub height: u16,
    pub row_bytes: usize,
    pub data: Vec<u8>,
}

impl PpicImage {
    /// Debug rendering: `#` for set pixels, `.` for clear ones.
    pub fn to_ascii(&self) -> String {
        let width = usize::from(self.width);
        let mut out = String::with_capacity((width + 1) * usize::from(self.height));
        for row in 0..usize::from(self.height) {
            let base = row * self.row_bytes;
            for x in 0..width {
                let bit = (self.data[base + x / 8] >> (7 - (x % 8))) & 1;
                out.push(if bit != 0 { '#' } else { '.' });
            }
            out.push('\n');
        }
        out
    }
}

struct Header {
    mode: u8,
    width: u16,
    height: u16,
}

fn read_header(reader: &mut MsbBitReader<'_>, available: usize) -> Result<Header> {
    let mode = reader.get_bits(2) as u8;
    let mut needed_bits = 2u32;

    needed_bits += 1;
    let height_bits = if reader.get_bit() { 10 } else { 6 };
    let height = reader.get_bits(height_bits);
    needed_bits += height_bits;

    needed_bits += 1;
    let width_bits = if reader.get_bit() { 10 } else { 6 };
    let width = reader.get_bits(width_bits);
    needed_bits += width_bits;

    let needed = (needed_bits as usize).div_ceil(8);
    if needed > available {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed,
            available,
        });
    }
    Ok(Header {
        mode,
        width,
        height,
    })
}

/// Read just the mode and dimensions. Mode 3 streams peek fine; only a full
/// decode rejects them.
pub fn peek_ppic_metadata(bytes: &[u8]) -> Result<PpicMetadata> {
    let mut reader = MsbBitReader::new(bytes);
    let header = read_header(&mut reader, bytes.len())?;
    Ok(PpicMetadata {
        mode: header.mode,
        width: header.width,
        height: header.height,
    })
}

fn decode_symbol(reader: &mut MsbBitReader<'_>, table: &HuffTable) -> u8 {
    let look = reader.peek_bits(16);
    let mut idx = 0;
    while idx + 1 < table.masks.len() && look >= table.masks[idx + 1] {
        idx += 1;
    }
    reader.skip(u32::from(table.lens[idx]));
    table.symbols[idx]
}

/// Pulls nibbles out of the Huffman stream, including the byte-run escape.
/// One walker per decode; runs carry over row boundaries through it.
#[derive(Default)]
struct NibbleWalker {
    last: u16,
    repeat: u32,
    stash: Option<u8>,
}

impl NibbleWalker {
    fn idle(&self) -> bool {
        self.repeat == 0 && self.stash.is_none()
    }

    fn next(&mut self, reader: &mut MsbBitReader<'_>, table: &HuffTable) -> u8 {
        loop {
            if let Some(nibble) = self.stash.take() {
                return nibble;
            }
            if self.repeat > 0 {
                self.repeat -= 1;
                let byte = (self.last & 0xff) as u8;
                self.stash = Some(byte & 0x0f);
                self.last = self.last.swap_bytes();
                return byte >> 4;
            }
            let symbol = decode_symbol(reader, table);
            if symbol < ESCAPE {
                self.last = (self.last << 4) | u16::from(symbol);
                return symbol;
            }
            // Escape. The flag bit picks the run seed: clear pairs the
            // previous byte with its nibble mirror, set keeps the last two
            // decoded bytes. Each emitted byte swaps the register halves,
            // so the run alternates between the two.
            if !reader.get_bit() {
                let byte = (self.last & 0xff) as u8;
                self.last = (u16::from(byte.rotate_left(4)) << 8) | u16::from(byte);
            }
            let mut run = u32::from(reader.get_bits(3));
            if run == 7 {
                run += u32::from(reader.get_bits(4));
                if run == 7 + 15 {
                    run += u32::from(reader.get_bits(8));
                }
            }
            self.repeat = run + 2;
        }
    }
}

/// Decode a complete bitmap stream: 2-bit mode, flag-selected 6- or 10-bit
/// height and width, then the payload. Mode 0 stores rows as raw bytes;
/// modes 1 and 2 are Huffman-coded against their respective tables with two
/// optional XOR delta filters; mode 3 is reserved and refused.
pub fn decode_ppic(bytes: &[u8]) -> Result<PpicImage> {
    let mut reader = MsbBitReader::new(bytes);
    let header = read_header(&mut reader, bytes.len())?;
    if header.mode == 3 {
        return Err(DecodeError::Unsupported(
            "reserved bitmap mode 3".to_string(),
        ));
    }
    if header.width == 0 || header.height == 0 {
        return Err(DecodeError::Malformed(format!(
            "bitmap declares a zero dimension ({}x{})",
            header.width, header.height
        )));
    }

    let width = usize::from(header.width);
    let height = usize::from(header.height);
    let row_bytes = (width + 15) / 16 * 2;
    let full_bytes = width / 8;
    let half = width % 8 != 0;
    let data_bytes = full_bytes + usize::from(half);
    let mut data = vec![0u8; row_bytes * height];
    let mut dry_row: Option<usize> = None;

    match header.mode {
        0 => {
            for row in 0..height {
                if dry_row.is_none() && reader.bits_remaining() == 0 {
                    dry_row = Some(row);
                }
                let base = row * row_bytes;
                for i in 0..full_bytes {
                    data[base + i] = reader.get_bits(8) as u8;
                }
                if half {
                    data[base + full_bytes] = (reader.get_bits(4) as u8) << 4;
                }
            }
        }
        1 | 2 => {
            let table = if header.mode == 1 {
                &TABLE_MODE1
            } else {
                &TABLE_MODE2
            };
            let flags = reader.get_bits(2);
            let mut walker = NibbleWalker::default();
            for row in 0..height {
                if dry_row.is_none() && walker.idle() && reader.bits_remaining() == 0 {
                    dry_row = Some(row);
                }
                let base = row * row_bytes;
                for i in 0..full_bytes {
                    let hi = walker.next(&mut reader, table);
                    let lo = walker.next(&mut reader, table);
                    data[base + i] = (hi << 4) | lo;
                }
                if half {
                    data[base + full_bytes] = walker.next(&mut reader, table) << 4;
                }
            }
            if flags & 0b01 != 0 {
                for row in 0..height {
                    let base = row * row_bytes;
                    for i in 1..data_bytes {
                        data[base + i] ^= data[base + i - 1];
                    }
                }
            }
            if flags & 0b10 != 0 {
                for row in 1..height {
                    let (above, below) = data.split_at_mut(row * row_bytes);
                    let prev = &above[(row - 1) * row_bytes..];
                    for i in 0..data_bytes {
                        below[i] ^= prev[i];
                    }
                }
            }
        }
        _ => unreachable!("mode 3 rejected above"),
    }

    if let Some(row) = dry_row {
        warn!(
            "bitmap stream ran dry at row {row} of {height}; the remainder decodes as zero fill"
        );
    }

    Ok(PpicImage {
        mode: header.mode,
        width: header.width,
        height: header.height,
        row_bytes,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::MsbBitWriter;

    fn push_header(writer: &mut MsbBitWriter, mode: u8, width: u16, height: u16) {
        writer.put_bits(u16::from(mode), 2);
        if height < 64 {
            writer.put_bit(false);
            writer.put_bits(height, 6);
        } else {
            writer.put_bit(true);
            writer.put_bits(height, 10);
        }
        if width < 64 {
            writer.put_bit(false);
            writer.put_bits(width, 6);
        } else {
            writer.put_bit(true);
            writer.put_bits(width, 10);
        }
    }

    fn push_symbol(writer: &mut MsbBitWriter, table: &HuffTable, symbol: u8) {
        let idx = table
            .symbols
            .iter()
            .position(|&s| s == symbol)
            .expect("symbol in table");
        let len = u32::from(table.lens[idx]);
        writer.put_bits(table.masks[idx] >> (16 - len), len);
    }

    fn push_escape(writer: &mut MsbBitWriter, table: &HuffTable, keep: bool, run: u32) {
        push_symbol(writer, table, ESCAPE);
        writer.put_bit(keep);
        let raw = run - 2;
        if raw < 7 {
            writer.put_bits(raw as u16, 3);
        } else if raw < 22 {
            writer.put_bits(7, 3);
            writer.put_bits((raw - 7) as u16, 4);
        } else {
            writer.put_bits(7, 3);
            writer.put_bits(15, 4);
            writer.put_bits((raw - 22) as u16, 8);
        }
    }

    #[test]
    fn metadata_reports_mode_and_dimensions() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 40, 300);
        let bytes = writer.finish();
        let meta = peek_ppic_metadata(&bytes).unwrap();
        assert_eq!(
            meta,
            PpicMetadata {
                mode: 1,
                width: 40,
                height: 300
            }
        );
    }

    #[test]
    fn short_header_is_truncated() {
        let err = peek_ppic_metadata(&[0x40]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn reserved_mode_is_refused() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 3, 8, 8);
        let bytes = writer.finish();
        assert!(peek_ppic_metadata(&bytes).is_ok());
        assert!(matches!(
            decode_ppic(&bytes),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn zero_dimension_is_malformed() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 0, 8);
        let bytes = writer.finish();
        assert!(matches!(decode_ppic(&bytes), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn decodes_raw_rows_with_trailing_half_byte() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 0, 12, 2);
        writer.put_bits(0xa5, 8);
        writer.put_bits(0x3, 4);
        writer.put_bits(0x5a, 8);
        writer.put_bits(0xc, 4);
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.row_bytes, 2);
        assert_eq!(image.data, vec![0xa5, 0x30, 0x5a, 0xc0]);
    }

    #[test]
    fn decodes_uniform_block_and_is_idempotent() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 4, 4);
        writer.put_bits(0, 2); // no delta filters
        for _ in 0..4 {
            push_symbol(&mut writer, &TABLE_MODE1, 0xf);
        }
        let bytes = writer.finish();
        let image = decode_ppic(&bytes).unwrap();
        assert_eq!(image.data, vec![0xf0, 0x00, 0xf0, 0x00, 0xf0, 0x00, 0xf0, 0x00]);
        assert_eq!(image.to_ascii(), "####\n####\n####\n####\n");

        let again = decode_ppic(&bytes).unwrap();
        assert_eq!(again.data, image.data);
    }

    #[test]
    fn mirror_escape_alternates_nibble_swapped_bytes() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 16, 6);
        writer.put_bits(0, 2);
        push_symbol(&mut writer, &TABLE_MODE1, 0xa);
        push_symbol(&mut writer, &TABLE_MODE1, 0xb);
        push_escape(&mut writer, &TABLE_MODE1, false, 11);
        let image = decode_ppic(&writer.finish()).unwrap();
        let mut expected = vec![0xab, 0xab];
        for step in 2..12 {
            expected.push(if step % 2 == 0 { 0xba } else { 0xab });
        }
        assert_eq!(image.data, expected);
    }

    #[test]
    fn keep_escape_alternates_last_two_bytes() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 16, 3);
        writer.put_bits(0, 2);
        for symbol in [0xc, 0xd, 0xa, 0xb] {
            push_symbol(&mut writer, &TABLE_MODE1, symbol);
        }
        push_escape(&mut writer, &TABLE_MODE1, true, 4);
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.data, vec![0xcd, 0xab, 0xab, 0xcd, 0xab, 0xcd]);
    }

    #[test]
    fn chained_repeat_counts_extend_runs() {
        // run 24 needs all three count fields: 7 + 15 + 0, biased by 2.
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 8, 25);
        writer.put_bits(0, 2);
        push_symbol(&mut writer, &TABLE_MODE1, 0xa);
        push_symbol(&mut writer, &TABLE_MODE1, 0xb);
        push_escape(&mut writer, &TABLE_MODE1, false, 24);
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.row_bytes, 2);
        for row in 0..25usize {
            let expected = if row == 0 || row % 2 == 1 { 0xab } else { 0xba };
            assert_eq!(image.data[row * 2], expected, "row {row}");
            assert_eq!(image.data[row * 2 + 1], 0, "row {row} pad");
        }
    }

    #[test]
    fn second_table_decodes_its_own_ordering() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 2, 8, 1);
        writer.put_bits(0, 2);
        push_symbol(&mut writer, &TABLE_MODE2, 0x5);
        push_symbol(&mut writer, &TABLE_MODE2, 0xc);
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.data, vec![0x5c, 0x00]);
    }

    #[test]
    fn horizontal_delta_unfilters_rows() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 16, 1);
        writer.put_bits(0b01, 2);
        for symbol in [0xf, 0x0, 0x0, 0xf] {
            push_symbol(&mut writer, &TABLE_MODE1, symbol);
        }
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.data, vec![0xf0, 0xff]);
    }

    #[test]
    fn vertical_delta_unfilters_against_previous_row() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 8, 2);
        writer.put_bits(0b10, 2);
        for symbol in [0xf, 0xf, 0x0, 0xf] {
            push_symbol(&mut writer, &TABLE_MODE1, symbol);
        }
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.data, vec![0xff, 0x00, 0xf0, 0x00]);
    }

    #[test]
    fn combined_deltas_apply_horizontal_then_vertical() {
        let mut writer = MsbBitWriter::new();
        push_header(&mut writer, 1, 16, 2);
        writer.put_bits(0b11, 2);
        for symbol in [0xf, 0x0, 0x0, 0xf, 0x0, 0x0, 0xf, 0xf] {
            push_symbol(&mut writer, &TABLE_MODE1, symbol);
        }
        let image = decode_ppic(&writer.finish()).unwrap();
        assert_eq!(image.data, vec![0xf0, 0xff, 0xf0, 0x00]);
    }
}
