// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Guest-physical addresses, access widths and the bus that decodes them to
//! device register windows.

mod map;
mod region;

mod address;
mod size;

pub use address::*;
pub use map::*;
pub use region::*;
pub use size::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd)]
#[repr(i32)]
/// Register/memory access width in bits.
pub enum Width {
    _64 = 64,
    _32 = 32,
    _16 = 16,
    _8 = 8,
}

impl Width {
    /// Access size in bytes.
    #[inline]
    pub const fn bytes(self) -> u64 {
        self as u64 / 8
    }
}

impl TryFrom<u8> for Width {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::_8),
            16 => Ok(Self::_16),
            32 => Ok(Self::_32),
            64 => Ok(Self::_64),
            other => Err(other),
        }
    }
}
