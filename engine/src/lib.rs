// Licensed under the Apache-2.0 license

//! Logical/physical translation engine for OTP eFuse banks.
//!
//! A small set of persistent configuration parameters lives in
//! one-time-programmable memory reachable only through a narrow command
//! channel. Burned bits cannot be rewritten, so an update appends a record
//! that supersedes the old value, and the current state is reconstructed by
//! replaying every record in order, last-write-wins.
//!
//! The pieces:
//!
//! - [`LogicalMap`]: the overlay store callers stage changes into,
//! - the record codec in [`efuse_wire`]: one record per 8-byte group, with
//!   1- or 2-byte headers depending on the base address,
//! - [`EfuseModule`]: the bank allocator and commit engine, programming
//!   records through the write-verify-retry protocol over an
//!   [`efuse_transport::EfuseTransport`].

mod bank;
mod error;
mod logical;
mod module;
mod voltage;

pub use bank::{BankPool, BankState};
pub use error::{EfuseError, EfuseResult};
pub use logical::{LogicalCell, LogicalMap, UNPROGRAMMED};
pub use module::{EfuseConfig, EfuseModule};
pub use voltage::{VoltageMode, BANK_LATCH_REG, LDO_CONFIG_REG};
