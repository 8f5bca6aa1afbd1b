// Licensed under the Apache-2.0 license

//! Append-only record codec.
//!
//! One record snapshots the current values of a single 8-byte logical group.
//! Updating a logical byte never rewrites OTP cells; a fresh record is
//! appended and later records supersede earlier ones. Replaying a bank in
//! increasing offset order with last-write-wins therefore reconstructs the
//! logical state exactly.
//!
//! Two header modes exist. Groups below base address 128 use a single header
//! byte: group index in the high nibble, word-select mask in the low nibble.
//! The low nibble value 0xF is reserved to flag the 2-byte mode, which is
//! safe because an all-ones word-select means "nothing to write" and never
//! produces a record. In 2-byte mode the first byte's high nibble is always
//! even, so a legal header byte can never be 0xFF and a record start can
//! never be mistaken for the end-of-data sentinel.

use arrayvec::ArrayVec;
use bitfield::bitfield;

use crate::error::RecordError;
use crate::{GROUP_LEN, MAX_RECORD_LEN, SENTINEL_BYTE, WORDS_PER_GROUP};

/// Word-select mask with every word excluded; also the "nothing dirty"
/// marker during encoding.
pub const WORD_SELECT_NONE: u8 = 0x0F;

/// Low nibble of header byte 1 that flags the 2-byte header mode.
const LONG_MODE_FLAG: u8 = 0x0F;

/// Groups addressable by the 1-byte header (base address < 128).
const SHORT_MODE_GROUPS: usize = 16;

/// Total groups addressable by either header mode.
const MAX_ADDRESSABLE_GROUPS: usize = 128;

bitfield! {
    /// One header byte split into its two nibbles.
    #[derive(Copy, Clone, PartialEq)]
    pub struct HeaderByte(u8);
    impl Debug;
    pub u8, high_nibble, set_high_nibble: 7, 4;
    pub u8, low_nibble, set_low_nibble: 3, 0;
}

/// One encoded record: header plus the included words' bytes, bounded by
/// the worst case of 2 header bytes and 4 words.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    bytes: ArrayVec<u8, MAX_RECORD_LEN>,
}

impl Record {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encode the record for `group`, covering the words with at least one
/// dirty byte. Returns `Ok(None)` when no byte of the group is dirty.
///
/// Word granularity is 2 bytes: a word is included whole even when only one
/// of its bytes changed.
pub fn encode_group(
    group: usize,
    values: &[u8; GROUP_LEN],
    dirty: &[bool; GROUP_LEN],
) -> Result<Option<Record>, RecordError> {
    let mut word_select = WORD_SELECT_NONE;
    let mut payload = ArrayVec::<u8, GROUP_LEN>::new();
    for word in 0..WORDS_PER_GROUP {
        if dirty[word * 2] || dirty[word * 2 + 1] {
            word_select &= !(1 << word);
            payload.push(values[word * 2]);
            payload.push(values[word * 2 + 1]);
        }
    }
    if word_select == WORD_SELECT_NONE {
        return Ok(None);
    }

    let mut bytes = ArrayVec::<u8, MAX_RECORD_LEN>::new();
    if group < SHORT_MODE_GROUPS {
        let mut h = HeaderByte(0);
        h.set_high_nibble(group as u8);
        h.set_low_nibble(word_select);
        bytes.push(h.0);
    } else if group < MAX_ADDRESSABLE_GROUPS {
        let offset = group - SHORT_MODE_GROUPS;
        let mut h1 = HeaderByte(0);
        h1.set_high_nibble(((offset % 8) * 2) as u8);
        h1.set_low_nibble(LONG_MODE_FLAG);
        let mut h2 = HeaderByte(0);
        h2.set_high_nibble((offset / 8 + 2) as u8);
        h2.set_low_nibble(word_select);
        bytes.push(h1.0);
        bytes.push(h2.0);
    } else {
        return Err(RecordError::GroupOutOfRange);
    }
    bytes
        .try_extend_from_slice(&payload)
        .map_err(|_| RecordError::BufferTooShort)?;
    Ok(Some(Record { bytes }))
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// Base logical address of the group this record covers.
    pub base_address: usize,
    /// Word-select mask; a cleared bit means the word is present.
    pub word_select: u8,
    payload: ArrayVec<u8, GROUP_LEN>,
}

impl RecordEntry {
    /// Iterate the `(logical_address, value)` pairs carried by this record,
    /// in ascending address order.
    pub fn cells(&self) -> Cells<'_> {
        Cells {
            entry: self,
            word: 0,
            consumed: 0,
            pending: None,
        }
    }
}

/// Iterator over the cells of a [`RecordEntry`].
pub struct Cells<'a> {
    entry: &'a RecordEntry,
    word: usize,
    consumed: usize,
    pending: Option<(usize, u8)>,
}

impl Iterator for Cells<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<(usize, u8)> {
        if let Some(item) = self.pending.take() {
            return Some(item);
        }
        while self.word < WORDS_PER_GROUP {
            let word = self.word;
            self.word += 1;
            if self.entry.word_select & (1 << word) == 0 {
                let first = self.entry.payload[self.consumed];
                let second = self.entry.payload[self.consumed + 1];
                self.consumed += 2;
                let addr = self.entry.base_address + word * 2;
                self.pending = Some((addr + 1, second));
                return Some((addr, first));
            }
        }
        None
    }
}

/// Scans the live-data prefix of one bank, yielding records until the
/// two-byte 0xFF sentinel or the end of the usable area.
///
/// After the iterator is exhausted, [`RecordReader::offset`] is the bank's
/// live-data length: the offset of the sentinel when one was found, or the
/// full scanned length when the bank is packed solid.
pub struct RecordReader<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> RecordReader<'a> {
    /// `data` must be the usable area of the bank, i.e. the bank content
    /// with the reserved tail already excluded.
    pub fn new(data: &'a [u8]) -> Self {
        RecordReader {
            data,
            offset: 0,
            done: false,
        }
    }

    /// Current scan position. On a decode error this is the offset of the
    /// record that failed to parse.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RecordError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(RecordError::TruncatedRecord)?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn parse_next(&mut self) -> Result<Option<RecordEntry>, RecordError> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let next_is_sentinel = self
            .data
            .get(self.offset + 1)
            .map_or(true, |&b| b == SENTINEL_BYTE);
        if self.data[self.offset] == SENTINEL_BYTE && next_is_sentinel {
            return Ok(None);
        }

        let start = self.offset;
        let h1 = HeaderByte(self.take(1)?[0]);
        let (base_address, word_select) = if h1.low_nibble() != LONG_MODE_FLAG {
            (usize::from(h1.high_nibble()) * GROUP_LEN, h1.low_nibble())
        } else {
            let h2 = HeaderByte(self.take(1).map_err(|e| {
                self.offset = start;
                e
            })?[0]);
            let x = usize::from(h1.high_nibble());
            let y = usize::from(h2.high_nibble());
            // The encoder always emits y >= 2; anything below is corruption.
            if y < 2 {
                self.offset = start;
                return Err(RecordError::InvalidHeader);
            }
            let group = x / 2 + (y - 2) * 8 + SHORT_MODE_GROUPS;
            (group * GROUP_LEN, h2.low_nibble())
        };

        let mut payload = ArrayVec::<u8, GROUP_LEN>::new();
        for word in 0..WORDS_PER_GROUP {
            if word_select & (1 << word) == 0 {
                let bytes = self.take(2).map_err(|e| {
                    self.offset = start;
                    e
                })?;
                payload.push(bytes[0]);
                payload.push(bytes[1]);
            }
        }

        Ok(Some(RecordEntry {
            base_address,
            word_select,
            payload,
        }))
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<RecordEntry, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parse_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_nothing_dirty() {
        let values = [0xAA; GROUP_LEN];
        let dirty = [false; GROUP_LEN];
        assert_eq!(encode_group(3, &values, &dirty), Ok(None));
    }

    #[test]
    fn test_encode_short_header_exact_bytes() {
        // Base address 0, only word 0 dirty: header 0x0E, then the word.
        let mut dirty = [false; GROUP_LEN];
        dirty[0] = true;
        let values = [0x12, 0x34, 0, 0, 0, 0, 0, 0];
        let record = encode_group(0, &values, &dirty).unwrap().unwrap();
        assert_eq!(record.as_bytes(), &[0x0E, 0x12, 0x34]);
    }

    #[test]
    fn test_encode_word_granularity() {
        // A single dirty byte still pulls in its whole 2-byte word.
        let mut dirty = [false; GROUP_LEN];
        dirty[5] = true;
        let values = [0, 0, 0, 0, 0xCA, 0xFE, 0, 0];
        let record = encode_group(2, &values, &dirty).unwrap().unwrap();
        assert_eq!(record.as_bytes(), &[0x2B, 0xCA, 0xFE]);
    }

    #[test]
    fn test_encode_header_mode_boundary() {
        let mut dirty = [false; GROUP_LEN];
        dirty[0] = true;
        let values = [0x01, 0x02, 0, 0, 0, 0, 0, 0];

        // Group 15 (base 120) still fits the 1-byte header.
        let record = encode_group(15, &values, &dirty).unwrap().unwrap();
        assert_eq!(record.as_bytes(), &[0xFE, 0x01, 0x02]);

        // Group 16 (base 128) switches to the 2-byte header: offset 0 gives
        // x = 0, y = 2.
        let record = encode_group(16, &values, &dirty).unwrap().unwrap();
        assert_eq!(record.as_bytes(), &[0x0F, 0x2E, 0x01, 0x02]);
    }

    #[test]
    fn test_encode_long_header_nibble_math() {
        // Group 27: offset 11, x = (11 % 8) * 2 = 6, y = 11 / 8 + 2 = 3.
        let mut dirty = [false; GROUP_LEN];
        dirty[6] = true;
        dirty[7] = true;
        let values = [0, 0, 0, 0, 0, 0, 0xBE, 0xEF];
        let record = encode_group(27, &values, &dirty).unwrap().unwrap();
        assert_eq!(record.as_bytes(), &[0x6F, 0x37, 0xBE, 0xEF]);
    }

    #[test]
    fn test_encode_group_out_of_range() {
        let dirty = [true; GROUP_LEN];
        let values = [0; GROUP_LEN];
        assert_eq!(
            encode_group(128, &values, &dirty),
            Err(RecordError::GroupOutOfRange)
        );
    }

    #[test]
    fn test_header_byte_never_sentinel() {
        // The first header byte of any legal record differs from 0xFF: in
        // 1-byte mode the low nibble cannot be 0xF, and in 2-byte mode the
        // high nibble is even.
        let dirty = [true; GROUP_LEN];
        let values = [0; GROUP_LEN];
        for group in 0..MAX_ADDRESSABLE_GROUPS {
            let record = encode_group(group, &values, &dirty).unwrap().unwrap();
            assert_ne!(record.as_bytes()[0], 0xFF, "group {}", group);
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let values = [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17];
        let dirty = [false, false, true, true, false, false, true, false];
        let record = encode_group(20, &values, &dirty).unwrap().unwrap();

        let mut stream = [SENTINEL_BYTE; 32];
        stream[..record.len()].copy_from_slice(record.as_bytes());

        let mut reader = RecordReader::new(&stream);
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.base_address, 160);
        assert_eq!(entry.word_select, 0b0101);
        let cells: Vec<(usize, u8)> = entry.cells().collect();
        assert_eq!(
            cells,
            vec![(162, 0x12), (163, 0x13), (166, 0x16), (167, 0x17)]
        );
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), record.len());
    }

    #[test]
    fn test_decode_multiple_records_in_order() {
        let mut stream = [SENTINEL_BYTE; 32];
        // Two records for the same word of group 1.
        stream[..6].copy_from_slice(&[0x1E, 0xAA, 0xBB, 0x1E, 0xCC, 0xDD]);

        let reader = RecordReader::new(&stream);
        let entries: Vec<RecordEntry> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cells().collect::<Vec<_>>(), vec![(8, 0xAA), (9, 0xBB)]);
        assert_eq!(entries[1].cells().collect::<Vec<_>>(), vec![(8, 0xCC), (9, 0xDD)]);
    }

    #[test]
    fn test_decode_stops_at_sentinel_offset() {
        let mut stream = [0u8; 16];
        stream[..3].copy_from_slice(&[0x0E, 0x01, 0x02]);
        stream[3] = SENTINEL_BYTE;
        stream[4] = SENTINEL_BYTE;
        // Garbage after the sentinel must not be scanned.
        stream[5] = 0x0E;

        let mut reader = RecordReader::new(&stream);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), 3);
    }

    #[test]
    fn test_decode_packed_bank_has_full_cursor() {
        // No sentinel at all: the live-data length is the whole usable area.
        let stream = [0x1C, 0x01, 0x02, 0x03, 0x04, 0x1E, 0x05, 0x06];
        let mut reader = RecordReader::new(&stream);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), stream.len());
    }

    #[test]
    fn test_decode_truncated_payload() {
        // Header 0x0E promises one word but only one payload byte remains.
        let stream = [0x0E, 0x01];
        let mut reader = RecordReader::new(&stream);
        assert_eq!(reader.next(), Some(Err(RecordError::TruncatedRecord)));
        assert_eq!(reader.offset(), 0);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_decode_truncated_long_header() {
        let stream = [0x0F];
        let mut reader = RecordReader::new(&stream);
        assert_eq!(reader.next(), Some(Err(RecordError::TruncatedRecord)));
    }

    #[test]
    fn test_decode_rejects_long_header_row_below_two() {
        // 2-byte mode with header byte 2's high nibble below 2: no group
        // encodes this way, so the stream is corrupt, not a record.
        let stream = [0x0F, 0x0E, 0xAA, 0xBB, 0xFF, 0xFF];
        let mut reader = RecordReader::new(&stream);
        assert_eq!(reader.next(), Some(Err(RecordError::InvalidHeader)));
        assert_eq!(reader.offset(), 0);
        assert!(reader.next().is_none());
    }
}
