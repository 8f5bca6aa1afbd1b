// Licensed under the Apache-2.0 license

//! Transport error types.

use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a raw command channel can report. The channel is the seam real
/// hardware plumbing implements; everything above it is this crate.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    Disconnected,

    #[error("timed out waiting for the command response")]
    Timeout,

    #[error("I/O failure: {0}")]
    Io(&'static str),
}

/// Errors surfaced by the chunked transport layer. None of these are
/// retried here; the engine decides what a failure means.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("command {opcode:#06x} failed with status {status:#04x}")]
    CommandFailed { opcode: u16, status: u8 },

    #[error("echoed length {actual} does not match the requested {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("response of {len} bytes is shorter than its header")]
    ResponseTooShort { len: usize },

    #[error("invalid register bit range {hi}..{lo}")]
    InvalidBitRange { hi: u8, lo: u8 },
}
