use std::fmt::{Display, Formatter};

use crate::sdram::config::GeometryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MappedAddress {
    pub bank: u32,
    pub row: u32,
    pub col: u32,
}

impl Display for MappedAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[bank {} | row {:#x} | col {:#x}]", self.bank, self.row, self.col)
    }
}

/// Slices a bus byte address into bank/row/column fields.
///
/// Layout, low to high: byte offset within one beat, column, row, bank. Bits above the bank
/// field alias onto the same location.
#[derive(Debug, Clone, Copy)]
pub struct AddressMapper {
    col_lsb: u32,
    row_lsb: u32,
    bank_lsb: u32,
    col_mask: u32,
    row_mask: u32,
    bank_mask: u32,
    byte_mask: u32,
}

fn field_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

impl AddressMapper {
    pub fn new(geometry: &GeometryConfig) -> Self {
        let col_lsb = geometry.byte_offset_bits();
        let row_lsb = col_lsb + geometry.col_bits;
        let bank_lsb = row_lsb + geometry.row_bits;
        Self {
            col_lsb,
            row_lsb,
            bank_lsb,
            col_mask: field_mask(geometry.col_bits),
            row_mask: field_mask(geometry.row_bits),
            bank_mask: field_mask(geometry.bank_bits),
            byte_mask: field_mask(col_lsb),
        }
    }

    pub fn map(&self, address: u32) -> MappedAddress {
        MappedAddress {
            bank: address.checked_shr(self.bank_lsb).unwrap_or(0) & self.bank_mask,
            row: address.checked_shr(self.row_lsb).unwrap_or(0) & self.row_mask,
            col: (address >> self.col_lsb) & self.col_mask,
        }
    }

    /// Byte lane of `address` within one data beat.
    pub fn byte_offset(&self, address: u32) -> u32 {
        address & self.byte_mask
    }

    /// Inverse of `map` with zero byte offset. Used by traffic generators and tests.
    pub fn compose(&self, mapped: MappedAddress) -> u32 {
        (mapped.bank & self.bank_mask).checked_shl(self.bank_lsb).unwrap_or(0)
            | ((mapped.row & self.row_mask) << self.row_lsb)
            | ((mapped.col & self.col_mask) << self.col_lsb)
    }

    pub fn bank_lsb(&self) -> u32 {
        self.bank_lsb
    }
}
