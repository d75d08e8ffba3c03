//! Change-record stream decoding.
//!
//! The kernel delivers directory change notifications as variable-length
//! records packed back-to-back in the read buffer: a fixed 16-byte header
//! (watch descriptor, event mask, rename cookie, name length) followed by
//! that many bytes of NUL-padded entry name. There is no out-of-band length
//! prefix for the stream as a whole, so the decoder walks the span itself,
//! bounds-checking every field read and discarding a truncated tail rather
//! than reading past the buffer.

use std::borrow::Cow;

use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Event flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Kernel event-mask bits carried by a change record (inotify ABI).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        const MODIFY      = 0x0000_0002;
        const CLOSE_WRITE = 0x0000_0008;
        const MOVED_FROM  = 0x0000_0040;
        const MOVED_TO    = 0x0000_0080;
        const CREATE      = 0x0000_0100;
        const DELETE      = 0x0000_0200;
        const UNMOUNT     = 0x0000_2000;
        const Q_OVERFLOW  = 0x0000_4000;
        const IGNORED     = 0x0000_8000;
        const IS_DIR      = 0x4000_0000;
    }
}

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

/// Fixed header size preceding each record's name bytes: watch descriptor
/// (i32), event mask (u32), rename cookie (u32), name length (u32), all in
/// native endianness.
pub const RECORD_HEADER_LEN: usize = 16;

const MASK_OFFSET: usize = 4;
const NAME_LEN_OFFSET: usize = 12;

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

// ---------------------------------------------------------------------------
// Decoded record
// ---------------------------------------------------------------------------

/// One decoded entry from the kernel change stream.
///
/// Borrows its name from the read buffer; records are consumed immediately
/// and never retained across reads. Names are raw bytes, since entry names
/// are not guaranteed to be UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRecord<'a> {
    pub flags: EventFlags,
    pub name: &'a [u8],
}

impl<'a> ChangeRecord<'a> {
    /// Entry name with invalid UTF-8 replaced, for display and logging.
    pub fn name_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name)
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Lazy decoder over one read buffer.
///
/// Each iteration yields the next fully-formed record. Nameless records
/// (length zero after NUL stripping) describe the watched directory itself
/// or queue conditions and are skipped. A header or name that would extend
/// past the supplied span ends iteration; the partial tail is discarded.
pub struct ChangeRecords<'a> {
    rest: &'a [u8],
}

impl<'a> ChangeRecords<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { rest: buffer }
    }
}

impl<'a> Iterator for ChangeRecords<'a> {
    type Item = ChangeRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.len() < RECORD_HEADER_LEN {
                self.rest = &[];
                return None;
            }
            let mask = read_u32(self.rest, MASK_OFFSET)?;
            let name_len = read_u32(self.rest, NAME_LEN_OFFSET)? as usize;
            let total = RECORD_HEADER_LEN.checked_add(name_len)?;
            if self.rest.len() < total {
                // Truncated tail: the kernel split a record across reads.
                self.rest = &[];
                return None;
            }
            let padded = &self.rest[RECORD_HEADER_LEN..total];
            self.rest = &self.rest[total..];

            // The declared length includes trailing NUL padding.
            let name = match padded.iter().position(|b| *b == 0) {
                Some(end) => &padded[..end],
                None => padded,
            };
            if name.is_empty() {
                continue;
            }
            return Some(ChangeRecord {
                flags: EventFlags::from_bits_truncate(mask),
                name,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds one wire-format record: header plus `pad` NUL bytes appended
    /// to the name, with the padding counted in the declared length.
    fn record_padded(name: &[u8], mask: u32, pad: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_ne_bytes());
        buf.extend_from_slice(&mask.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&((name.len() + pad) as u32).to_ne_bytes());
        buf.extend_from_slice(name);
        buf.extend(std::iter::repeat(0u8).take(pad));
        buf
    }

    fn record(name: &[u8], mask: u32) -> Vec<u8> {
        record_padded(name, mask, 0)
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        assert_eq!(ChangeRecords::new(&[]).count(), 0);
    }

    #[test]
    fn complete_records_followed_by_truncated_tail() {
        let mut buf = record(b"a.apk", EventFlags::CLOSE_WRITE.bits());
        buf.extend_from_slice(&record(b"b.apk", EventFlags::MOVED_TO.bits()));
        // Partial third header, split across a read boundary.
        buf.extend_from_slice(&[7, 0, 0, 0, 8, 0]);

        let names: Vec<_> = ChangeRecords::new(&buf).map(|r| r.name.to_vec()).collect();
        assert_eq!(names, vec![b"a.apk".to_vec(), b"b.apk".to_vec()]);
    }

    #[test]
    fn truncated_header_is_discarded() {
        let buf = [0u8; RECORD_HEADER_LEN - 6];
        assert_eq!(ChangeRecords::new(&buf).count(), 0);
    }

    #[test]
    fn declared_name_longer_than_buffer_is_discarded() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_ne_bytes());
        buf.extend_from_slice(&EventFlags::CREATE.bits().to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&100u32.to_ne_bytes());
        buf.extend_from_slice(b"short");
        assert_eq!(ChangeRecords::new(&buf).count(), 0);
    }

    #[test]
    fn oversized_declared_length_does_not_panic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_ne_bytes());
        buf.extend_from_slice(&EventFlags::CREATE.bits().to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&u32::MAX.to_ne_bytes());
        assert_eq!(ChangeRecords::new(&buf).count(), 0);
    }

    #[test]
    fn zero_length_name_is_skipped() {
        let mut buf = record(b"", EventFlags::Q_OVERFLOW.bits());
        buf.extend_from_slice(&record(b"x.apk", EventFlags::CLOSE_WRITE.bits()));

        let records: Vec<_> = ChangeRecords::new(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, b"x.apk");
    }

    #[test]
    fn nul_padding_is_stripped_from_names() {
        let buf = record_padded(b"app.apk", EventFlags::CLOSE_WRITE.bits(), 9);
        let records: Vec<_> = ChangeRecords::new(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, b"app.apk");
    }

    #[test]
    fn flags_survive_decoding() {
        let mask = EventFlags::CREATE | EventFlags::IS_DIR;
        let buf = record(b"subdir", mask.bits());
        let records: Vec<_> = ChangeRecords::new(&buf).collect();
        assert_eq!(records[0].flags, mask);
    }

    #[test]
    fn records_decode_in_stream_order() {
        let mut buf = record(b"first.apk", EventFlags::CREATE.bits());
        buf.extend_from_slice(&record(b"second.apk", EventFlags::CLOSE_WRITE.bits()));

        let names: Vec<_> = ChangeRecords::new(&buf)
            .map(|r| r.name_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["first.apk", "second.apk"]);
    }

    #[test]
    fn non_utf8_name_is_preserved_as_bytes() {
        let buf = record(b"\xff\xfe.apk", EventFlags::MOVED_TO.bits());
        let records: Vec<_> = ChangeRecords::new(&buf).collect();
        assert_eq!(records[0].name, b"\xff\xfe.apk");
    }
}
