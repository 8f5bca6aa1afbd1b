// Licensed under the Apache-2.0 license

//! The eFuse module: binds the logical overlay store, the bank pool and a
//! transport into the load/commit engine.

use log::{debug, warn};

use efuse_transport::EfuseTransport;
use efuse_wire::record::{encode_group, RecordReader};
use efuse_wire::{
    GROUP_LEN, MAX_EFUSE_BANK_NUM, MAX_EFUSE_LOG_LEN, MAX_EFUSE_PHY_LEN, MAX_RECORD_LEN,
    RESERVED_TAIL_LEN,
};

use crate::bank::BankPool;
use crate::error::{EfuseError, EfuseResult};
use crate::logical::LogicalMap;
use crate::voltage::{self, VoltageMode, BANK_LATCH_REG};

/// Fixed capacities of one module, agreed with the chip at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfuseConfig {
    /// Logical address space in bytes; a multiple of the 8-byte group.
    pub log_size: usize,
    /// Capacity of each physical bank in bytes.
    pub phys_size: usize,
    /// First bank of the pool.
    pub start_bank: u8,
    /// Number of banks usable as one pool.
    pub bank_num: u8,
}

impl EfuseConfig {
    fn validate(&self) -> EfuseResult<()> {
        if self.log_size == 0 || self.log_size > MAX_EFUSE_LOG_LEN {
            return Err(EfuseError::InvalidCapacity("log_size exceeds engine maximum"));
        }
        if self.log_size % GROUP_LEN != 0 {
            return Err(EfuseError::InvalidCapacity(
                "log_size is not a multiple of the 8-byte group",
            ));
        }
        if self.phys_size <= RESERVED_TAIL_LEN || self.phys_size > MAX_EFUSE_PHY_LEN {
            return Err(EfuseError::InvalidCapacity("phys_size outside engine limits"));
        }
        if self.bank_num == 0 {
            return Err(EfuseError::InvalidCapacity("bank pool is empty"));
        }
        if usize::from(self.start_bank) + usize::from(self.bank_num) > MAX_EFUSE_BANK_NUM {
            return Err(EfuseError::InvalidCapacity("bank pool exceeds the bank count"));
        }
        Ok(())
    }
}

/// The logical/physical translation engine for one chip.
///
/// Callers stage changes with [`EfuseModule::set_value`], then burn them
/// with [`EfuseModule::commit`]; [`EfuseModule::load`] reconstructs the
/// logical state from the records already in the banks. The engine is
/// synchronous and holds no lock; serialize access externally.
pub struct EfuseModule<T: EfuseTransport> {
    transport: T,
    config: EfuseConfig,
    map: LogicalMap,
    banks: BankPool,
}

impl<T: EfuseTransport> EfuseModule<T> {
    pub fn new(transport: T, config: EfuseConfig) -> EfuseResult<Self> {
        config.validate()?;
        Ok(EfuseModule {
            transport,
            map: LogicalMap::new(config.log_size),
            banks: BankPool::new(config.start_bank, config.bank_num, config.phys_size),
            config,
        })
    }

    pub fn config(&self) -> &EfuseConfig {
        &self.config
    }

    /// Current logical value at `addr`, whether staged or committed.
    pub fn value(&self, addr: usize) -> Option<u8> {
        self.map.value(addr)
    }

    /// Stage a value change; it becomes durable on the next commit.
    pub fn set_value(&mut self, addr: usize, value: u8) -> EfuseResult<()> {
        if self.map.set_value(addr, value).is_none() {
            return Err(EfuseError::AddressOutOfRange {
                addr,
                len: self.map.len(),
            });
        }
        Ok(())
    }

    /// Groups with staged, uncommitted changes. After a failed commit this
    /// is the retry work list.
    pub fn dirty_groups(&self) -> Vec<usize> {
        self.map.dirty_groups()
    }

    /// Live-data length of `bank`, if it belongs to the pool.
    pub fn bank_cursor(&self, bank: u8) -> Option<usize> {
        self.banks.cursor(bank)
    }

    /// Rebuild the logical state by replaying every bank of the pool in
    /// order, last-write-wins, and recover each bank's append cursor from
    /// the sentinel position.
    ///
    /// Staged, uncommitted changes are discarded: after a load the map
    /// mirrors exactly what the chip holds.
    pub fn load(&mut self) -> EfuseResult<()> {
        self.map.reset();
        let usable = self.banks.usable_len();
        let mut raw = vec![0u8; usable];
        for bank in self.banks.banks() {
            voltage::select_read_mode(&mut self.transport)?;
            let read = self.transport.read_bytes(bank, 0, &mut raw);
            // The latch is released after every bank access, reads included.
            let released = self.release_bank(bank);
            read?;
            released?;
            let mut reader = RecordReader::new(&raw);
            while let Some(item) = reader.next() {
                let entry = item.map_err(|cause| EfuseError::CorruptBank {
                    bank,
                    offset: reader.offset(),
                    cause,
                })?;
                self.map
                    .apply_entry(&entry)
                    .map_err(|cause| EfuseError::CorruptBank {
                        bank,
                        offset: reader.offset(),
                        cause,
                    })?;
            }
            self.banks.set_cursor(bank, reader.offset());
            debug!("bank {}: {} live bytes", bank, reader.offset());
        }
        Ok(())
    }

    /// Program a record for every dirty group, ascending, clearing dirty
    /// flags only on confirmed success.
    ///
    /// Not transactional across groups: each record is all-or-nothing, but
    /// a failure leaves earlier groups committed and the rest dirty.
    /// Calling commit again retries exactly the remainder; with nothing
    /// dirty it issues no transport traffic at all.
    pub fn commit(&mut self) -> EfuseResult<()> {
        for group in 0..self.map.group_count() {
            let (values, dirty) = match self.map.group(group) {
                Some(group) => group,
                None => continue,
            };
            let record = match encode_group(group, &values, &dirty).map_err(EfuseError::Codec)? {
                Some(record) => record,
                None => continue,
            };
            let (bank, offset) =
                self.banks
                    .place(record.len())
                    .ok_or(EfuseError::BankOverflow {
                        group,
                        len: record.len(),
                    })?;
            self.write_record(bank, offset, record.as_bytes())?;
            self.map.clear_group_dirty(group);
            self.banks.advance(bank, record.len());
            debug!(
                "group {} committed to bank {} at offset {} ({} bytes)",
                group,
                bank,
                offset,
                record.len()
            );
        }
        Ok(())
    }

    /// Consume the module, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn write_record(&mut self, bank: u8, offset: usize, bytes: &[u8]) -> EfuseResult<()> {
        self.latch_bank(bank)?;
        let written = self.write_with_retry(bank, offset, bytes);
        // Restore the latch even when the write failed.
        let released = self.release_bank(bank);
        written?;
        released?;
        Ok(())
    }

    /// The two-tier write protocol: for each voltage mode in the fixed
    /// attempt order, select the mode, program the bytes and verify them by
    /// read-back. A failed program command or a verify mismatch falls
    /// through to the next mode; a read-back transport failure aborts.
    fn write_with_retry(&mut self, bank: u8, offset: usize, bytes: &[u8]) -> EfuseResult<()> {
        let mut readback = [0u8; MAX_RECORD_LEN];
        let readback = &mut readback[..bytes.len()];
        for mode in VoltageMode::ATTEMPT_ORDER {
            voltage::select_write_mode(&mut self.transport, mode)?;
            if let Err(err) = self.transport.write_bytes(bank, offset as u16, bytes) {
                warn!(
                    "program command failed at bank {} offset {} under {:?}: {}",
                    bank, offset, mode, err
                );
                continue;
            }
            self.transport.read_bytes(bank, offset as u16, readback)?;
            if readback == bytes {
                return Ok(());
            }
            warn!(
                "read-back mismatch at bank {} offset {} under {:?}",
                bank, offset, mode
            );
        }
        Err(EfuseError::VerifyMismatch { bank, offset })
    }

    fn latch_bank(&mut self, bank: u8) -> EfuseResult<()> {
        let current = self.transport.get_register_field(BANK_LATCH_REG, 7, 0)?;
        let value = (current & 0xFC) | 0x08 | u16::from(bank);
        self.transport
            .set_register_field(BANK_LATCH_REG, 7, 0, value)?;
        Ok(())
    }

    fn release_bank(&mut self, bank: u8) -> EfuseResult<()> {
        let current = self.transport.get_register_field(BANK_LATCH_REG, 7, 0)?;
        let value = (current & 0xF4) | (u16::from(bank) & 0x0F);
        self.transport
            .set_register_field(BANK_LATCH_REG, 7, 0, value)?;
        Ok(())
    }
}
