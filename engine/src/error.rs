// Licensed under the Apache-2.0 license

use efuse_transport::TransportError;
use efuse_wire::error::RecordError;
use thiserror::Error;

pub type EfuseResult<T> = Result<T, EfuseError>;

/// Errors reported by the engine. Each carries enough context (bank,
/// offset, group) for a caller to resume after a partial commit; which
/// groups are still unwritten can always be recovered from
/// `EfuseModule::dirty_groups`.
#[derive(Debug, Error)]
pub enum EfuseError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Read-back differed from the intended write after every voltage mode.
    /// Terminal for the record; prior commits stand.
    #[error("read-back mismatch at bank {bank} offset {offset} after all voltage modes")]
    VerifyMismatch { bank: u8, offset: usize },

    /// No bank in the pool has room for the next record. Terminal for the
    /// whole commit; the triggering group stays dirty.
    #[error("no bank has room for the {len}-byte record of group {group}")]
    BankOverflow { group: usize, len: usize },

    #[error("invalid module capacity: {0}")]
    InvalidCapacity(&'static str),

    #[error("logical address {addr} is outside the table of {len} bytes")]
    AddressOutOfRange { addr: usize, len: usize },

    #[error("record codec error: {0}")]
    Codec(RecordError),

    /// A bank's record stream failed to replay.
    #[error("corrupt record stream in bank {bank} at offset {offset}: {cause}")]
    CorruptBank {
        bank: u8,
        offset: usize,
        cause: RecordError,
    },
}
