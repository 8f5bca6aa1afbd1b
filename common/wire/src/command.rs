// Licensed under the Apache-2.0 license

//! Framing for the vendor command channel.
//!
//! Every OTP byte-range access is one command: a 5-byte header (bank,
//! little-endian address, little-endian length) followed, for writes, by the
//! payload. The response carries a status byte and echoes the length; a
//! caller must treat an echoed length that differs from the request as an
//! error, never as a partial result.

use core::convert::TryFrom;
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Write a byte range into an OTP bank.
pub const OP_EFUSE_WRITE: u16 = 0xFC6B;
/// Read a byte range from an OTP bank.
pub const OP_EFUSE_READ: u16 = 0xFC6C;
/// Write a system control register.
pub const OP_SYS_REG_WRITE: u16 = 0xFC61;
/// Read a system control register.
pub const OP_SYS_REG_READ: u16 = 0xFC62;

/// Encoded size of [`EfuseCmdHeader`].
pub const CMD_HEADER_LEN: usize = 5;
/// Encoded size of [`EfuseRspHeader`].
pub const RSP_HEADER_LEN: usize = 3;

/// Command header addressing a byte range inside one bank.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct EfuseCmdHeader {
    pub bank: u8,
    pub addr: U16,
    pub len: U16,
}

impl EfuseCmdHeader {
    pub fn new(bank: u8, addr: u16, len: u16) -> Self {
        EfuseCmdHeader {
            bank,
            addr: U16::new(addr),
            len: U16::new(len),
        }
    }
}

/// Response header for byte-range commands. Read responses append the data
/// after this header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct EfuseRspHeader {
    pub status: u8,
    pub len: U16,
}

impl EfuseRspHeader {
    pub fn new(status: CompletionStatus, len: u16) -> Self {
        EfuseRspHeader {
            status: status as u8,
            len: U16::new(len),
        }
    }
}

/// Register read request payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct RegReadRequest {
    pub reg: U16,
}

/// Register read response payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct RegReadResponse {
    pub status: u8,
    pub value: U16,
}

/// Register write request payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct RegWriteRequest {
    pub reg: U16,
    pub value: U16,
}

/// Register write response payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct RegWriteResponse {
    pub status: u8,
}

/// Completion codes reported in the response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionStatus {
    /// Command completed successfully.
    Success = 0x00,
    /// General failure.
    Failure = 0x01,
    /// The request addressed a range the chip cannot serve.
    InvalidParams = 0x12,
}

impl TryFrom<u8> for CompletionStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(CompletionStatus::Success),
            0x01 => Ok(CompletionStatus::Failure),
            0x12 => Ok(CompletionStatus::InvalidParams),
            _ => Err(value),
        }
    }
}
