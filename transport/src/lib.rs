// Licensed under the Apache-2.0 license

//! Chunked byte-range and register access against OTP banks.
//!
//! Two seams live here. [`CommandChannel`] is the raw driver trait that real
//! plumbing (or the test chip model) implements: one framed command in, one
//! validated response buffer out. [`EfuseTransport`] is the contract the
//! engine consumes: byte-range reads and writes of any length, decomposed
//! into commands of at most [`EFUSE_CHUNK_LEN`] bytes with per-chunk status
//! and length validation, plus bit-field access to system registers.
//!
//! [`HciTransport`] is the provided implementation over any channel.

mod error;

pub use error::{ChannelError, TransportError, TransportResult};

use efuse_wire::command::{
    EfuseCmdHeader, EfuseRspHeader, RegReadRequest, RegReadResponse, RegWriteRequest,
    RegWriteResponse, CMD_HEADER_LEN, OP_EFUSE_READ, OP_EFUSE_WRITE, OP_SYS_REG_READ,
    OP_SYS_REG_WRITE, RSP_HEADER_LEN,
};
use efuse_wire::EFUSE_CHUNK_LEN;
use log::trace;
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, IntoBytes};

/// Response buffer large enough for the biggest read chunk.
pub const MAX_RSP_LEN: usize = RSP_HEADER_LEN + EFUSE_CHUNK_LEN;

/// Raw command/response driver. Implementations deliver one framed command
/// to the chip and copy the response into `response`, returning its length.
pub trait CommandChannel {
    fn execute(
        &mut self,
        opcode: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ChannelError>;
}

/// The transport contract the eFuse engine consumes.
pub trait EfuseTransport {
    /// Read `buf.len()` bytes starting at `addr` in `bank`. Chunked
    /// internally; every chunk is status- and length-checked, and a
    /// mismatch aborts the whole call.
    fn read_bytes(&mut self, bank: u8, addr: u16, buf: &mut [u8]) -> TransportResult<()>;

    /// Write `data` starting at `addr` in `bank`, with the same chunking
    /// and validation discipline as [`EfuseTransport::read_bytes`].
    fn write_bytes(&mut self, bank: u8, addr: u16, data: &[u8]) -> TransportResult<()>;

    /// Read bits `hi..=lo` of a system register, shifted down to bit 0.
    fn get_register_field(&mut self, reg: u16, hi: u8, lo: u8) -> TransportResult<u16>;

    /// Read-modify-write bits `hi..=lo` of a system register.
    fn set_register_field(&mut self, reg: u16, hi: u8, lo: u8, value: u16) -> TransportResult<()>;
}

/// [`EfuseTransport`] implementation over a raw [`CommandChannel`].
pub struct HciTransport<C: CommandChannel> {
    channel: C,
}

impl<C: CommandChannel> HciTransport<C> {
    pub fn new(channel: C) -> Self {
        HciTransport { channel }
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    fn read_chunk(&mut self, bank: u8, addr: u16, buf: &mut [u8]) -> TransportResult<()> {
        debug_assert!(buf.len() <= EFUSE_CHUNK_LEN);
        let hdr = EfuseCmdHeader::new(bank, addr, buf.len() as u16);
        let mut rsp = [0u8; MAX_RSP_LEN];
        let n = self.channel.execute(OP_EFUSE_READ, hdr.as_bytes(), &mut rsp)?;
        let (rsp_hdr, payload) = EfuseRspHeader::read_from_prefix(&rsp[..n])
            .map_err(|_| TransportError::ResponseTooShort { len: n })?;
        if rsp_hdr.status != 0 {
            return Err(TransportError::CommandFailed {
                opcode: OP_EFUSE_READ,
                status: rsp_hdr.status,
            });
        }
        let echoed = usize::from(rsp_hdr.len.get());
        if echoed != buf.len() || payload.len() < buf.len() {
            return Err(TransportError::LengthMismatch {
                expected: buf.len(),
                actual: echoed.min(payload.len()),
            });
        }
        buf.copy_from_slice(&payload[..buf.len()]);
        Ok(())
    }

    fn write_chunk(&mut self, bank: u8, addr: u16, data: &[u8]) -> TransportResult<()> {
        debug_assert!(data.len() <= EFUSE_CHUNK_LEN);
        let mut req = [0u8; CMD_HEADER_LEN + EFUSE_CHUNK_LEN];
        let hdr = EfuseCmdHeader::new(bank, addr, data.len() as u16);
        req[..CMD_HEADER_LEN].copy_from_slice(hdr.as_bytes());
        req[CMD_HEADER_LEN..CMD_HEADER_LEN + data.len()].copy_from_slice(data);
        let mut rsp = [0u8; MAX_RSP_LEN];
        let n = self.channel.execute(
            OP_EFUSE_WRITE,
            &req[..CMD_HEADER_LEN + data.len()],
            &mut rsp,
        )?;
        let (rsp_hdr, _) = EfuseRspHeader::read_from_prefix(&rsp[..n])
            .map_err(|_| TransportError::ResponseTooShort { len: n })?;
        if rsp_hdr.status != 0 {
            return Err(TransportError::CommandFailed {
                opcode: OP_EFUSE_WRITE,
                status: rsp_hdr.status,
            });
        }
        let echoed = usize::from(rsp_hdr.len.get());
        if echoed != data.len() {
            return Err(TransportError::LengthMismatch {
                expected: data.len(),
                actual: echoed,
            });
        }
        Ok(())
    }

    fn read_register(&mut self, reg: u16) -> TransportResult<u16> {
        let req = RegReadRequest { reg: U16::new(reg) };
        let mut rsp = [0u8; MAX_RSP_LEN];
        let n = self
            .channel
            .execute(OP_SYS_REG_READ, req.as_bytes(), &mut rsp)?;
        let (rsp, _) = RegReadResponse::read_from_prefix(&rsp[..n])
            .map_err(|_| TransportError::ResponseTooShort { len: n })?;
        if rsp.status != 0 {
            return Err(TransportError::CommandFailed {
                opcode: OP_SYS_REG_READ,
                status: rsp.status,
            });
        }
        Ok(rsp.value.get())
    }

    fn write_register(&mut self, reg: u16, value: u16) -> TransportResult<()> {
        let req = RegWriteRequest {
            reg: U16::new(reg),
            value: U16::new(value),
        };
        let mut rsp = [0u8; MAX_RSP_LEN];
        let n = self
            .channel
            .execute(OP_SYS_REG_WRITE, req.as_bytes(), &mut rsp)?;
        let (rsp, _) = RegWriteResponse::read_from_prefix(&rsp[..n])
            .map_err(|_| TransportError::ResponseTooShort { len: n })?;
        if rsp.status != 0 {
            return Err(TransportError::CommandFailed {
                opcode: OP_SYS_REG_WRITE,
                status: rsp.status,
            });
        }
        Ok(())
    }
}

fn field_mask(hi: u8, lo: u8) -> TransportResult<u16> {
    if hi < lo || hi > 15 {
        return Err(TransportError::InvalidBitRange { hi, lo });
    }
    Ok(((1u32 << (hi - lo + 1)) - 1) as u16)
}

impl<C: CommandChannel> EfuseTransport for HciTransport<C> {
    fn read_bytes(&mut self, bank: u8, addr: u16, buf: &mut [u8]) -> TransportResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let chunk = EFUSE_CHUNK_LEN.min(buf.len() - done);
            self.read_chunk(bank, addr + done as u16, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        trace!("read {} bytes from bank {} at {:#06x}", buf.len(), bank, addr);
        Ok(())
    }

    fn write_bytes(&mut self, bank: u8, addr: u16, data: &[u8]) -> TransportResult<()> {
        let mut done = 0;
        while done < data.len() {
            let chunk = EFUSE_CHUNK_LEN.min(data.len() - done);
            self.write_chunk(bank, addr + done as u16, &data[done..done + chunk])?;
            done += chunk;
        }
        trace!("wrote {} bytes to bank {} at {:#06x}", data.len(), bank, addr);
        Ok(())
    }

    fn get_register_field(&mut self, reg: u16, hi: u8, lo: u8) -> TransportResult<u16> {
        let mask = field_mask(hi, lo)?;
        let value = self.read_register(reg)?;
        Ok((value >> lo) & mask)
    }

    fn set_register_field(&mut self, reg: u16, hi: u8, lo: u8, value: u16) -> TransportResult<()> {
        let mask = field_mask(hi, lo)?;
        let current = self.read_register(reg)?;
        let next = (current & !(mask << lo)) | ((value & mask) << lo);
        self.write_register(reg, next)
    }
}
