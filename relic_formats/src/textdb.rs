use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use serde::Serialize;

use crate::error::{DecodeError, Result};

// Three length prefixes with empty strings.
const MIN_RECORD_BYTES: usize = 12;

/// One message from the database: display text plus the voice cue that
/// accompanies it, and an optional translator comment merged in later.
#[derive(Debug, Clone, Serialize)]
pub struct TextEntry {
    pub id: String,
    pub text: String,
    pub sound: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Packed text database: `u32` record count, then per record three
/// `u32`-length-prefixed byte strings (id, text, sound cue). Strings are
/// stored in legacy single-byte encodings and may carry a terminating NUL
/// inside their declared length.
#[derive(Debug, Default)]
pub struct TextDb {
    entries: Vec<TextEntry>,
    index: HashMap<String, usize>,
}

impl TextDb {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = read_u32(&mut cursor)? as usize;
        check_count(count, &cursor)?;

        let mut db = TextDb {
            entries: Vec::with_capacity(count),
            index: HashMap::with_capacity(count),
        };
        for _ in 0..count {
            let id = read_string(&mut cursor)?;
            let text = read_string(&mut cursor)?;
            let sound = read_string(&mut cursor)?;
            db.insert(TextEntry {
                id,
                text,
                sound,
                comment: None,
            });
        }
        Ok(db)
    }

    /// Merge a comments blob (same framing, with the text field holding the
    /// comment) into already-loaded entries. Returns how many entries got a
    /// comment; ids the database does not know are logged and skipped.
    pub fn merge_comments(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut cursor = Cursor::new(bytes);
        let count = read_u32(&mut cursor)? as usize;
        check_count(count, &cursor)?;

        let mut merged = 0;
        for _ in 0..count {
            let id = read_string(&mut cursor)?;
            let comment = read_string(&mut cursor)?;
            let _sound = read_string(&mut cursor)?;
            match self.index.get(&id) {
                Some(&slot) => {
                    if !comment.is_empty() {
                        self.entries[slot].comment = Some(comment);
                        merged += 1;
                    }
                }
                None => warn!("comment for unknown text id {id:?}"),
            }
        }
        Ok(merged)
    }

    fn insert(&mut self, entry: TextEntry) {
        if let Some(&slot) = self.index.get(&entry.id) {
            warn!("duplicate text id {:?}; keeping the later entry", entry.id);
            self.entries[slot] = entry;
        } else {
            self.index.insert(entry.id.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    pub fn get(&self, id: &str) -> Option<&TextEntry> {
        self.index.get(id).map(|&slot| &self.entries[slot])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TextEntry> {
        self.entries.iter()
    }
}

/// Reject record counts the stream cannot possibly hold before allocating
/// for them.
fn check_count(count: usize, cursor: &Cursor<&[u8]>) -> Result<()> {
    let remaining = cursor
        .get_ref()
        .len()
        .saturating_sub(cursor.position() as usize);
    if count > remaining / MIN_RECORD_BYTES {
        return Err(DecodeError::Malformed(format!(
            "record count {count} cannot fit in {remaining} remaining bytes"
        )));
    }
    Ok(())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let offset = cursor.position() as usize;
    let available = cursor.get_ref().len();
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| DecodeError::Truncated {
            offset,
            needed: 4,
            available,
        })
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_u32(cursor)? as usize;
    let offset = cursor.position() as usize;
    let data = *cursor.get_ref();
    DecodeError::check_span(offset, len, data.len())?;
    let bytes = &data[offset..offset + len];
    cursor.set_position((offset + len) as u64);
    // The declared length may cover a NUL terminator and slack after it.
    let bytes = match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_record(data: &mut Vec<u8>, id: &str, text: &str, sound: &str) {
        for field in [id, text, sound] {
            data.extend_from_slice(&(field.len() as u32).to_le_bytes());
            data.extend_from_slice(field.as_bytes());
        }
    }

    fn two_entry_blob() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        push_record(&mut data, "GREETING", "Hello there.", "greet.wav");
        push_record(&mut data, "FAREWELL", "Goodbye.", "");
        data
    }

    #[test]
    fn parses_records_in_file_order() {
        let db = TextDb::parse(&two_entry_blob()).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get("GREETING").unwrap().text, "Hello there.");
        assert_eq!(db.get("GREETING").unwrap().sound, "greet.wav");
        assert_eq!(db.get("FAREWELL").unwrap().sound, "");
        let ids: Vec<&str> = db.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["GREETING", "FAREWELL"]);
    }

    #[test]
    fn later_duplicate_id_wins() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        push_record(&mut data, "LINE", "first", "");
        push_record(&mut data, "LINE", "second", "");
        let db = TextDb::parse(&data).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.get("LINE").unwrap().text, "second");
    }

    #[test]
    fn stops_strings_at_embedded_nul() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(b"ID\0junk!");
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(b"txt\0?");
        data.extend_from_slice(&0u32.to_le_bytes());
        let db = TextDb::parse(&data).unwrap();
        assert_eq!(db.get("ID").unwrap().text, "txt");
    }

    #[test]
    fn merges_comments_onto_known_ids() {
        let mut db = TextDb::parse(&two_entry_blob()).unwrap();
        let mut comments = Vec::new();
        comments.extend_from_slice(&2u32.to_le_bytes());
        push_record(&mut comments, "GREETING", "needs retake", "");
        push_record(&mut comments, "UNKNOWN", "orphan", "");
        let merged = db.merge_comments(&comments).unwrap();
        assert_eq!(merged, 1);
        assert_eq!(
            db.get("GREETING").unwrap().comment.as_deref(),
            Some("needs retake")
        );
        assert_eq!(db.get("FAREWELL").unwrap().comment, None);
    }

    #[test]
    fn truncated_record_is_reported() {
        let mut data = two_entry_blob();
        data.truncate(data.len() - 5);
        assert!(matches!(
            TextDb::parse(&data),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn absurd_count_fails_before_allocating() {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            TextDb::parse(&data),
            Err(DecodeError::Malformed(_))
        ));
    }
}
