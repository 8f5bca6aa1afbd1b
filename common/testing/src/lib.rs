// Licensed under the Apache-2.0 license

//! In-memory OTP chip model for exercising the eFuse engine without
//! hardware.
//!
//! The model decodes the same wire format as the real chip and enforces the
//! one-time-programmable invariant: cells erase to 0xFF and a program
//! operation can only clear bits (bitwise AND). Fault injection knobs let
//! tests drive the write-verify-retry protocol down its failure paths, and
//! per-opcode counters make chunking and idempotency assertions cheap.
//!
//! The chip handle is cheaply cloneable; keep a clone to inspect state
//! after the transport has consumed the original.

use std::sync::{Arc, Mutex};

use efuse_transport::{ChannelError, CommandChannel};
use efuse_wire::command::{
    CompletionStatus, EfuseCmdHeader, EfuseRspHeader, RegReadRequest, RegReadResponse,
    RegWriteRequest, RegWriteResponse, OP_EFUSE_READ, OP_EFUSE_WRITE, OP_SYS_REG_READ,
    OP_SYS_REG_WRITE, RSP_HEADER_LEN,
};
use efuse_wire::{EFUSE_CHUNK_LEN, MAX_EFUSE_BANK_NUM, MAX_EFUSE_PHY_LEN};
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, IntoBytes};

/// Number of addressable system registers in the model.
const REG_FILE_LEN: usize = 256;

/// Commands the model has served, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCounters {
    pub reads: usize,
    pub writes: usize,
    pub reg_reads: usize,
    pub reg_writes: usize,
}

impl CommandCounters {
    pub fn total(&self) -> usize {
        self.reads + self.writes + self.reg_reads + self.reg_writes
    }
}

struct ChipState {
    banks: [[u8; MAX_EFUSE_PHY_LEN]; MAX_EFUSE_BANK_NUM],
    registers: [u16; REG_FILE_LEN],
    counters: CommandCounters,
    /// Write commands to acknowledge without burning anything.
    drop_writes: usize,
    /// Write commands to answer with a failure status.
    fail_writes: usize,
    /// Every value written to a register, as `(reg, value)`.
    reg_trace: Vec<(u16, u16)>,
}

impl ChipState {
    fn new() -> Self {
        ChipState {
            banks: [[0xFF; MAX_EFUSE_PHY_LEN]; MAX_EFUSE_BANK_NUM],
            registers: [0; REG_FILE_LEN],
            counters: CommandCounters::default(),
            drop_writes: 0,
            fail_writes: 0,
            reg_trace: Vec::new(),
        }
    }

    fn range_ok(&self, hdr: &EfuseCmdHeader) -> bool {
        let len = usize::from(hdr.len.get());
        usize::from(hdr.bank) < MAX_EFUSE_BANK_NUM
            && len <= EFUSE_CHUNK_LEN
            && usize::from(hdr.addr.get()) + len <= MAX_EFUSE_PHY_LEN
    }

    fn exec_read(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, ChannelError> {
        self.counters.reads += 1;
        let (hdr, _) = EfuseCmdHeader::read_from_prefix(request)
            .map_err(|_| ChannelError::Io("short read request"))?;
        if !self.range_ok(&hdr) {
            return respond_status(response, CompletionStatus::InvalidParams, 0);
        }
        let addr = usize::from(hdr.addr.get());
        let len = usize::from(hdr.len.get());
        let rsp = EfuseRspHeader::new(CompletionStatus::Success, hdr.len.get());
        response[..RSP_HEADER_LEN].copy_from_slice(rsp.as_bytes());
        response[RSP_HEADER_LEN..RSP_HEADER_LEN + len]
            .copy_from_slice(&self.banks[usize::from(hdr.bank)][addr..addr + len]);
        Ok(RSP_HEADER_LEN + len)
    }

    fn exec_write(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, ChannelError> {
        self.counters.writes += 1;
        let (hdr, payload) = EfuseCmdHeader::read_from_prefix(request)
            .map_err(|_| ChannelError::Io("short write request"))?;
        let len = usize::from(hdr.len.get());
        if !self.range_ok(&hdr) || payload.len() < len {
            return respond_status(response, CompletionStatus::InvalidParams, 0);
        }
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return respond_status(response, CompletionStatus::Failure, 0);
        }
        if self.drop_writes > 0 {
            // Acknowledge but burn nothing; the read-back will disagree.
            self.drop_writes -= 1;
        } else {
            let addr = usize::from(hdr.addr.get());
            let bank = &mut self.banks[usize::from(hdr.bank)];
            for (cell, &byte) in bank[addr..addr + len].iter_mut().zip(payload) {
                // OTP: programming can only clear bits.
                *cell &= byte;
            }
        }
        respond_status(response, CompletionStatus::Success, hdr.len.get())
    }

    fn exec_reg_read(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, ChannelError> {
        self.counters.reg_reads += 1;
        let (req, _) = RegReadRequest::read_from_prefix(request)
            .map_err(|_| ChannelError::Io("short register read"))?;
        let reg = usize::from(req.reg.get());
        let (status, value) = match self.registers.get(reg) {
            Some(&value) => (CompletionStatus::Success, value),
            None => (CompletionStatus::InvalidParams, 0),
        };
        let rsp = RegReadResponse {
            status: status as u8,
            value: U16::new(value),
        };
        let bytes = rsp.as_bytes();
        response[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn exec_reg_write(
        &mut self,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ChannelError> {
        self.counters.reg_writes += 1;
        let (req, _) = RegWriteRequest::read_from_prefix(request)
            .map_err(|_| ChannelError::Io("short register write"))?;
        let reg = usize::from(req.reg.get());
        let status = match self.registers.get_mut(reg) {
            Some(slot) => {
                *slot = req.value.get();
                self.reg_trace.push((req.reg.get(), req.value.get()));
                CompletionStatus::Success
            }
            None => CompletionStatus::InvalidParams,
        };
        let rsp = RegWriteResponse {
            status: status as u8,
        };
        response[..1].copy_from_slice(rsp.as_bytes());
        Ok(1)
    }
}

fn respond_status(
    response: &mut [u8],
    status: CompletionStatus,
    len: u16,
) -> Result<usize, ChannelError> {
    let rsp = EfuseRspHeader::new(status, len);
    response[..RSP_HEADER_LEN].copy_from_slice(rsp.as_bytes());
    Ok(RSP_HEADER_LEN)
}

/// Handle to one emulated chip.
#[derive(Clone)]
pub struct OtpChip {
    state: Arc<Mutex<ChipState>>,
}

impl OtpChip {
    pub fn new() -> Self {
        OtpChip {
            state: Arc::new(Mutex::new(ChipState::new())),
        }
    }

    /// Copy of one bank's raw content.
    pub fn bank(&self, bank: u8) -> Vec<u8> {
        self.state.lock().unwrap().banks[usize::from(bank)].to_vec()
    }

    /// Seed bank content directly, bypassing the wire format. For test
    /// setup only; overwrites cells instead of AND-ing.
    pub fn seed_bank(&self, bank: u8, offset: usize, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.banks[usize::from(bank)][offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn counters(&self) -> CommandCounters {
        self.state.lock().unwrap().counters
    }

    pub fn reset_counters(&self) {
        self.state.lock().unwrap().counters = CommandCounters::default();
    }

    /// Acknowledge the next `n` write commands without burning anything.
    pub fn drop_next_writes(&self, n: usize) {
        self.state.lock().unwrap().drop_writes = n;
    }

    /// Answer the next `n` write commands with a failure status.
    pub fn fail_next_writes(&self, n: usize) {
        self.state.lock().unwrap().fail_writes = n;
    }

    pub fn register(&self, reg: u16) -> u16 {
        self.state.lock().unwrap().registers[usize::from(reg)]
    }

    pub fn set_register(&self, reg: u16, value: u16) {
        self.state.lock().unwrap().registers[usize::from(reg)] = value;
    }

    /// Values written to `reg`, in order.
    pub fn register_trace(&self, reg: u16) -> Vec<u16> {
        self.state
            .lock()
            .unwrap()
            .reg_trace
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl Default for OtpChip {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for OtpChip {
    fn execute(
        &mut self,
        opcode: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ChannelError> {
        let mut state = self.state.lock().unwrap();
        match opcode {
            OP_EFUSE_READ => state.exec_read(request, response),
            OP_EFUSE_WRITE => state.exec_write(request, response),
            OP_SYS_REG_READ => state.exec_reg_read(request, response),
            OP_SYS_REG_WRITE => state.exec_reg_write(request, response),
            _ => Err(ChannelError::Io("unknown opcode")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_cmd(bank: u8, addr: u16, len: u16) -> Vec<u8> {
        EfuseCmdHeader::new(bank, addr, len).as_bytes().to_vec()
    }

    #[test]
    fn test_programming_only_clears_bits() {
        let mut chip = OtpChip::new();
        let handle = chip.clone();

        let mut request = EfuseCmdHeader::new(0, 0, 2).as_bytes().to_vec();
        request.extend_from_slice(&[0x0F, 0xF0]);
        let mut rsp = [0u8; 64];
        chip.execute(OP_EFUSE_WRITE, &request, &mut rsp).unwrap();
        assert_eq!(&handle.bank(0)[..2], &[0x0F, 0xF0]);

        // A second program cannot set bits back.
        let mut request = EfuseCmdHeader::new(0, 0, 2).as_bytes().to_vec();
        request.extend_from_slice(&[0xFF, 0x0F]);
        chip.execute(OP_EFUSE_WRITE, &request, &mut rsp).unwrap();
        assert_eq!(&handle.bank(0)[..2], &[0x0F, 0x00]);
    }

    #[test]
    fn test_out_of_range_read_reports_invalid_params() {
        let mut chip = OtpChip::new();
        let mut rsp = [0u8; 64];
        let n = chip
            .execute(
                OP_EFUSE_READ,
                &read_cmd(0, MAX_EFUSE_PHY_LEN as u16, 4),
                &mut rsp,
            )
            .unwrap();
        assert_eq!(n, RSP_HEADER_LEN);
        assert_eq!(rsp[0], CompletionStatus::InvalidParams as u8);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let mut chip = OtpChip::new();
        let mut rsp = [0u8; 64];
        chip.execute(
            OP_EFUSE_READ,
            &read_cmd(0, 0, EFUSE_CHUNK_LEN as u16 + 1),
            &mut rsp,
        )
        .unwrap();
        assert_eq!(rsp[0], CompletionStatus::InvalidParams as u8);
    }

    #[test]
    fn test_dropped_write_burns_nothing() {
        let mut chip = OtpChip::new();
        let handle = chip.clone();
        handle.drop_next_writes(1);

        let mut request = EfuseCmdHeader::new(1, 0, 1).as_bytes().to_vec();
        request.push(0x00);
        let mut rsp = [0u8; 64];
        chip.execute(OP_EFUSE_WRITE, &request, &mut rsp).unwrap();
        assert_eq!(rsp[0], CompletionStatus::Success as u8);
        assert_eq!(handle.bank(1)[0], 0xFF);

        // The knob is consumed; the next write lands.
        chip.execute(OP_EFUSE_WRITE, &request, &mut rsp).unwrap();
        assert_eq!(handle.bank(1)[0], 0x00);
    }
}
