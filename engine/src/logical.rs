// Licensed under the Apache-2.0 license

//! The logical overlay store: the caller-visible, freely re-writable view
//! of configuration bytes, reconciled from physical records.

use efuse_wire::error::RecordError;
use efuse_wire::record::RecordEntry;
use efuse_wire::GROUP_LEN;

/// Erased value of a cell no record has ever covered.
pub const UNPROGRAMMED: u8 = 0xFF;

/// One addressable byte of configuration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalCell {
    pub value: u8,
    /// Set when a caller changed the value away from what is committed;
    /// cleared only once a record covering the cell is durably written.
    pub dirty: bool,
}

impl Default for LogicalCell {
    fn default() -> Self {
        LogicalCell {
            value: UNPROGRAMMED,
            dirty: false,
        }
    }
}

/// Fixed table of logical cells plus the dirty bookkeeping the commit pass
/// consumes group by group.
#[derive(Debug, Clone)]
pub struct LogicalMap {
    cells: Vec<LogicalCell>,
}

impl LogicalMap {
    /// `log_size` must be a multiple of [`GROUP_LEN`]; the module
    /// constructor enforces that before building the map.
    pub fn new(log_size: usize) -> Self {
        debug_assert_eq!(log_size % GROUP_LEN, 0);
        LogicalMap {
            cells: vec![LogicalCell::default(); log_size],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.cells.len() / GROUP_LEN
    }

    pub fn value(&self, addr: usize) -> Option<u8> {
        self.cells.get(addr).map(|c| c.value)
    }

    /// Stage a new value. The cell is marked dirty only when the value
    /// actually changes, so re-staging the committed value costs nothing.
    /// Returns the cell's dirty flag, or `None` for an address outside the
    /// table.
    pub fn set_value(&mut self, addr: usize, value: u8) -> Option<bool> {
        let cell = self.cells.get_mut(addr)?;
        if cell.value != value {
            cell.value = value;
            cell.dirty = true;
        }
        Some(cell.dirty)
    }

    /// Reset every cell to unprogrammed and clean. Run before a replay.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell = LogicalCell::default();
        }
    }

    /// Snapshot one group as the codec wants it; `None` for a group index
    /// outside the table.
    pub fn group(&self, group: usize) -> Option<([u8; GROUP_LEN], [bool; GROUP_LEN])> {
        let base = group.checked_mul(GROUP_LEN)?;
        let cells = self.cells.get(base..base.checked_add(GROUP_LEN)?)?;
        let mut values = [0u8; GROUP_LEN];
        let mut dirty = [false; GROUP_LEN];
        for (i, cell) in cells.iter().enumerate() {
            values[i] = cell.value;
            dirty[i] = cell.dirty;
        }
        Some((values, dirty))
    }

    /// Clear the dirty flags of one group; a group outside the table is a
    /// no-op.
    pub fn clear_group_dirty(&mut self, group: usize) {
        let range = group
            .checked_mul(GROUP_LEN)
            .and_then(|base| Some(base..base.checked_add(GROUP_LEN)?));
        if let Some(cells) = range.and_then(|r| self.cells.get_mut(r)) {
            for cell in cells {
                cell.dirty = false;
            }
        }
    }

    /// Groups with at least one dirty cell, ascending.
    pub fn dirty_groups(&self) -> Vec<usize> {
        (0..self.group_count())
            .filter(|&g| {
                self.cells[g * GROUP_LEN..(g + 1) * GROUP_LEN]
                    .iter()
                    .any(|c| c.dirty)
            })
            .collect()
    }

    /// Apply one replayed record, last-write-wins. Replayed values arrive
    /// clean: they reflect what the chip already holds.
    pub fn apply_entry(&mut self, entry: &RecordEntry) -> Result<(), RecordError> {
        if entry.base_address + GROUP_LEN > self.cells.len() {
            return Err(RecordError::AddressOutOfRange);
        }
        for (addr, value) in entry.cells() {
            self.cells[addr] = LogicalCell {
                value,
                dirty: false,
            };
        }
        Ok(())
    }
}
