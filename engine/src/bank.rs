// Licensed under the Apache-2.0 license

//! Bank pool bookkeeping: per-bank append cursors and record placement.
//!
//! A bank is append-only. Bytes below the cursor were programmed by earlier
//! commits (or earlier sessions, recovered by a load) and are immutable;
//! the cursor never moves backwards. The reserved tail is excluded from the
//! usable area on both the write and the load path.

use efuse_wire::{MAX_EFUSE_BANK_NUM, RESERVED_TAIL_LEN};

/// Append cursor state for one OTP bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankState {
    cursor: usize,
}

impl BankState {
    /// Bytes already programmed; the next record lands here.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// The banks `start_bank .. start_bank + bank_num` managed as one pool.
#[derive(Debug, Clone)]
pub struct BankPool {
    start_bank: u8,
    bank_num: u8,
    usable_len: usize,
    states: [BankState; MAX_EFUSE_BANK_NUM],
}

impl BankPool {
    pub fn new(start_bank: u8, bank_num: u8, phys_size: usize) -> Self {
        debug_assert!(usize::from(start_bank + bank_num) <= MAX_EFUSE_BANK_NUM);
        debug_assert!(phys_size > RESERVED_TAIL_LEN);
        BankPool {
            start_bank,
            bank_num,
            usable_len: phys_size - RESERVED_TAIL_LEN,
            states: [BankState::default(); MAX_EFUSE_BANK_NUM],
        }
    }

    /// Bank indices of the pool, in write order.
    pub fn banks(&self) -> core::ops::Range<u8> {
        self.start_bank..self.start_bank + self.bank_num
    }

    /// Data bytes a bank may hold (capacity minus the reserved tail).
    pub fn usable_len(&self) -> usize {
        self.usable_len
    }

    pub fn cursor(&self, bank: u8) -> Option<usize> {
        self.banks()
            .contains(&bank)
            .then(|| self.states[usize::from(bank)].cursor())
    }

    /// First bank with room for `len` more bytes, with the offset the
    /// record would land at. `None` means the pool is full.
    pub fn place(&self, len: usize) -> Option<(u8, usize)> {
        self.banks().find_map(|bank| {
            let cursor = self.states[usize::from(bank)].cursor;
            (cursor + len <= self.usable_len).then_some((bank, cursor))
        })
    }

    /// Record a cursor recovered by a load scan.
    pub(crate) fn set_cursor(&mut self, bank: u8, cursor: usize) {
        debug_assert!(cursor <= self.usable_len);
        self.states[usize::from(bank)].cursor = cursor;
    }

    /// Advance past a record confirmed durable.
    pub(crate) fn advance(&mut self, bank: u8, len: usize) {
        let state = &mut self.states[usize::from(bank)];
        debug_assert!(state.cursor + len <= self.usable_len);
        state.cursor += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_prefers_first_bank_with_room() {
        let mut pool = BankPool::new(0, 3, 64);
        assert_eq!(pool.usable_len(), 48);
        assert_eq!(pool.place(10), Some((0, 0)));

        pool.advance(0, 47);
        assert_eq!(pool.place(1), Some((0, 47)));
        assert_eq!(pool.place(2), Some((1, 0)));
    }

    #[test]
    fn test_place_none_when_pool_full() {
        let mut pool = BankPool::new(1, 2, 32);
        pool.advance(1, 16);
        pool.advance(2, 15);
        assert_eq!(pool.place(2), None);
        assert_eq!(pool.place(1), Some((2, 15)));
    }

    #[test]
    fn test_cursor_only_for_pool_members() {
        let pool = BankPool::new(1, 2, 64);
        assert_eq!(pool.cursor(0), None);
        assert_eq!(pool.cursor(1), Some(0));
        assert_eq!(pool.cursor(3), None);
    }
}
