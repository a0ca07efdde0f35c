// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

#[derive(Copy, Clone, Default, Ord, Eq, Hash, PartialEq, PartialOrd)]
#[repr(transparent)]
/// A guest-physical address.
pub struct Address(pub u64);

impl Address {
    /// Returns the address `offset` bytes after `self`, if it does not wrap.
    #[inline]
    pub const fn checked_add(self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl std::ops::Add<u64> for Address {
    type Output = Self;

    fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "0x{:x}", self.0)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "0x{:x}", self.0)
    }
}
