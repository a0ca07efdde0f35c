// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

use std::{cmp::Ordering, ops::Range};

use crate::{
    devices::{DeviceOps, Initiator, MemoryTxResult},
    memory::{Address, MemorySize, Width},
};

/// A window of guest-physical address space backed by device registers.
pub struct MemoryRegion {
    /// Offset from start of physical address space.
    pub phys_offset: Address,
    pub size: MemorySize,
    pub ops: Box<dyn DeviceOps>,
}

impl std::fmt::Debug for MemoryRegion {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("MemoryRegion")
            .field("phys_offset", &self.phys_offset)
            .field("size", &self.size)
            .field("ops", &self.ops)
            .finish()
    }
}

impl Ord for MemoryRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = Range::<Address>::from(self);
        let b = Range::<Address>::from(other);
        (a.start, a.end).cmp(&(b.start, b.end))
    }
}

impl PartialOrd for MemoryRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MemoryRegion {
    fn eq(&self, other: &Self) -> bool {
        (self.phys_offset, self.size, self.ops.id())
            == (other.phys_offset, other.size, other.ops.id())
    }
}

impl Eq for MemoryRegion {}

impl From<&MemoryRegion> for Range<Address> {
    fn from(mr: &MemoryRegion) -> Self {
        let start = mr.phys_offset;
        Self {
            start,
            end: Address(start.0 + mr.size.get()),
        }
    }
}

impl MemoryRegion {
    /// Returns a memory region whose accesses are forwarded to `ops`.
    ///
    /// Returns `None` if the region would wrap around the address space.
    pub fn new_io(size: MemorySize, phys_offset: Address, ops: Box<dyn DeviceOps>) -> Option<Self> {
        phys_offset.checked_add(size.get())?;
        Some(Self {
            phys_offset,
            size,
            ops,
        })
    }

    #[inline]
    pub const fn len(&self) -> u64 {
        self.size.get()
    }

    #[inline]
    pub const fn start_addr(&self) -> Address {
        self.phys_offset
    }

    /// One past the last address of the region.
    #[inline]
    pub const fn end_addr(&self) -> Address {
        Address(self.phys_offset.0 + self.size.get())
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        self.phys_offset <= addr && addr < self.end_addr()
    }

    /// Forwards a read of `width` at the guest-physical `addr`.
    pub fn read(&self, initiator: Initiator, addr: Address, width: Width) -> MemoryTxResult<u64> {
        self.ops.read(initiator, addr.0 - self.phys_offset.0, width)
    }

    /// Forwards a write of `width` at the guest-physical `addr`.
    pub fn write(
        &self,
        initiator: Initiator,
        addr: Address,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        self.ops
            .write(initiator, addr.0 - self.phys_offset.0, value, width)
    }
}

/// A non-owning analogue of [`MemoryRegion`] that describes its characteristics
/// but does not own its backing device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryRegionDescription {
    pub start_offset: Address,
    pub size: MemorySize,
}

impl From<&MemoryRegion> for MemoryRegionDescription {
    fn from(value: &MemoryRegion) -> Self {
        Self {
            start_offset: value.phys_offset,
            size: value.size,
        }
    }
}

impl MemoryRegionDescription {
    #[inline]
    pub const fn into_range(&self) -> Range<Address> {
        let start = self.start_offset;
        Range {
            start,
            end: Address(start.0 + self.size.get()),
        }
    }
}
