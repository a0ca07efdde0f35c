// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

use std::{collections::BTreeMap, ops::Range};

use crate::{
    devices::{Initiator, MemoryTxError, MemoryTxResult},
    memory::{Address, MemoryRegion, MemoryRegionDescription, Width},
    tracing,
};

#[derive(Debug, Default)]
pub struct MemoryMapBuilder {
    entries: BTreeMap<Address, MemoryRegion>,
}

#[derive(Debug)]
pub enum MemoryMapError {
    Overlaps {
        region: MemoryRegionDescription,
        overlaps_with: Vec<MemoryRegionDescription>,
    },
}

impl std::fmt::Display for MemoryMapError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Overlaps {
                region,
                overlaps_with,
            } => write!(
                fmt,
                "memory region {:?} overlaps with {:?}",
                region.into_range(),
                overlaps_with
                    .iter()
                    .map(MemoryRegionDescription::into_range)
                    .collect::<Vec<_>>()
            ),
        }
    }
}

impl std::error::Error for MemoryMapError {}

impl MemoryMapBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, new: MemoryRegion) -> Result<(), MemoryMapError> {
        let range: Range<Address> = Range::from(&new);
        let overlaps_with: Vec<MemoryRegionDescription> = self
            .entries
            .values()
            .filter(|r| r.start_addr() < range.end && range.start < r.end_addr())
            .map(MemoryRegionDescription::from)
            .collect();
        if !overlaps_with.is_empty() {
            return Err(MemoryMapError::Overlaps {
                region: (&new).into(),
                overlaps_with,
            });
        }
        self.entries.insert(new.phys_offset, new);
        Ok(())
    }

    pub fn with_region(mut self, new: MemoryRegion) -> Result<Self, MemoryMapError> {
        self.add_region(new)?;
        Ok(self)
    }

    pub fn with_regions(
        mut self,
        regions: impl IntoIterator<Item = MemoryRegion>,
    ) -> Result<Self, MemoryMapError> {
        for region in regions {
            self.add_region(region)?;
        }
        Ok(self)
    }

    pub fn build(self) -> MemoryMap {
        MemoryMap {
            regions: self.entries.into_values().collect(),
        }
    }
}

/// A flattened, sorted map of the device windows on the bus.
///
/// # Example
///
/// ```rust
/// use gic400::memory::*;
///
/// let map = MemoryMap::builder().build();
/// assert_eq!(map.len(), 0);
/// assert!(map.find_region(Address(0x0800_0000)).is_none());
/// ```
#[derive(Debug)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    #[inline]
    pub fn builder() -> MemoryMapBuilder {
        MemoryMapBuilder::new()
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn find_region(&self, addr: Address) -> Option<&MemoryRegion> {
        let index = match self.regions.binary_search_by_key(&addr, |x| x.phys_offset) {
            Ok(x) => Some(x),
            // Within the closest region with starting address < addr
            Err(x) if (x > 0 && self.regions[x - 1].contains(addr)) => Some(x - 1),
            _ => None,
        };
        index.and_then(|x| self.regions.get(x))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    /// Decodes `addr` and performs a read on behalf of `initiator`.
    pub fn read(&self, initiator: Initiator, addr: Address, width: Width) -> MemoryTxResult<u64> {
        let Some(region) = self.find_region(addr) else {
            tracing::event!(
                target: tracing::TraceItem::Memory.as_str(),
                tracing::Level::WARN,
                kind = "unmapped read",
                address = ?addr,
                ?width,
            );
            return Err(MemoryTxError::InvalidAddress(addr));
        };
        region.read(initiator, addr, width)
    }

    /// Decodes `addr` and performs a write on behalf of `initiator`.
    pub fn write(
        &self,
        initiator: Initiator,
        addr: Address,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        let Some(region) = self.find_region(addr) else {
            tracing::event!(
                target: tracing::TraceItem::Memory.as_str(),
                tracing::Level::WARN,
                kind = "unmapped write",
                address = ?addr,
                value = ?tracing::BinaryHex(value),
                ?width,
            );
            return Err(MemoryTxError::InvalidAddress(addr));
        };
        region.write(initiator, addr, value, width)
    }
}
