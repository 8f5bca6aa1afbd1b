// Licensed under the Apache-2.0 license

use core::fmt;

/// Errors produced while encoding or decoding eFuse records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// The destination buffer cannot hold the encoded record.
    BufferTooShort,
    /// The group index is beyond what the two-byte header can address.
    GroupOutOfRange,
    /// The byte stream ended in the middle of a header or payload.
    TruncatedRecord,
    /// A header carries nibble values the encoder can never produce.
    InvalidHeader,
    /// A decoded record targets addresses outside the logical table.
    AddressOutOfRange,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::BufferTooShort => write!(f, "buffer too short for record"),
            RecordError::GroupOutOfRange => write!(f, "group index not addressable by any header mode"),
            RecordError::TruncatedRecord => write!(f, "record truncated before its payload ended"),
            RecordError::InvalidHeader => write!(f, "record header is not a legal encoding"),
            RecordError::AddressOutOfRange => write!(f, "record addresses bytes outside the logical table"),
        }
    }
}
