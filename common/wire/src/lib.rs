// Licensed under the Apache-2.0 license

//! Wire formats shared between the eFuse engine and anything that talks to
//! the chip: the 5-byte command framing used to address OTP banks over the
//! vendor command channel, and the append-only record format persisted
//! inside each bank.
//!
//! Everything here is `no_std` and allocation free so the same codec can be
//! linked into firmware-side tooling.

#![cfg_attr(not(test), no_std)]

pub mod command;
pub mod error;
pub mod record;

/// Upper bound on the logical (caller-visible) address space, in bytes.
pub const MAX_EFUSE_LOG_LEN: usize = 512;

/// Upper bound on a single physical bank, in bytes.
pub const MAX_EFUSE_PHY_LEN: usize = 512;

/// Number of OTP banks the engine may address.
pub const MAX_EFUSE_BANK_NUM: usize = 4;

/// Largest byte range a single transport command may carry.
pub const EFUSE_CHUNK_LEN: usize = 32;

/// Reserved bank tail never used for record data. Keeping this region
/// unprogrammed guarantees that a scan always finds the two-byte 0xFF
/// sentinel before running off the end of a bank.
pub const RESERVED_TAIL_LEN: usize = 16;

/// Erased state of an OTP cell; two consecutive sentinel bytes terminate
/// the live data of a bank.
pub const SENTINEL_BYTE: u8 = 0xFF;

/// A logical group: the addressing granularity of one record.
pub const GROUP_LEN: usize = 8;

/// Words per group; a word is the smallest unit a record can include.
pub const WORDS_PER_GROUP: usize = 4;

/// Worst-case encoded record: 2 header bytes plus 4 words of payload.
pub const MAX_RECORD_LEN: usize = 10;
