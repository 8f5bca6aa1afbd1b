// Licensed under the Apache-2.0 license

//! OTP programming voltage selection.
//!
//! The LDO configuration register chooses between two programming loads.
//! A record write is attempted under 1.5K first; cells that fail to burn at
//! that setting usually take at the 10K fallback, so the write protocol
//! retries exactly once under the second mode.

use efuse_transport::{EfuseTransport, TransportResult};

/// System register holding the LDO / programming voltage configuration.
pub const LDO_CONFIG_REG: u16 = 0x37;

/// System register latching the target bank and program enable.
pub const BANK_LATCH_REG: u16 = 0x35;

/// Programming voltage configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageMode {
    /// 1.5 kOhm load; the first attempt.
    Ldo1K5,
    /// 10 kOhm load; the fallback attempt.
    Ldo10K,
}

impl VoltageMode {
    /// The fixed attempt order of the write protocol.
    pub const ATTEMPT_ORDER: [VoltageMode; 2] = [VoltageMode::Ldo1K5, VoltageMode::Ldo10K];

    fn pattern(self) -> u16 {
        match self {
            VoltageMode::Ldo1K5 => 0x74,
            VoltageMode::Ldo10K => 0x70,
        }
    }
}

/// Select `mode` for programming: read-modify-write of the LDO register,
/// keeping the reserved bits, raising the 2.25 V enable, and masking in the
/// mode's load pattern.
pub(crate) fn select_write_mode<T: EfuseTransport>(
    transport: &mut T,
    mode: VoltageMode,
) -> TransportResult<()> {
    let current = transport.get_register_field(LDO_CONFIG_REG, 7, 0)?;
    let value = (current & 0x83) | 0x80 | mode.pattern();
    transport.set_register_field(LDO_CONFIG_REG, 7, 0, value)
}

/// Configure the LDO register for reading: the 1.5K pattern without the
/// 2.25 V enable, which stays down outside of programming.
pub(crate) fn select_read_mode<T: EfuseTransport>(transport: &mut T) -> TransportResult<()> {
    let current = transport.get_register_field(LDO_CONFIG_REG, 7, 0)?;
    let value = (current & 0x83) | VoltageMode::Ldo1K5.pattern();
    transport.set_register_field(LDO_CONFIG_REG, 7, 0, value)
}
