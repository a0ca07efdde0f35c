// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! # Emulated devices
//!
//! Devices must implement the [`Device`] trait, which hands their register
//! windows to the bus as [`MemoryRegion`]s backed by [`DeviceOps`].

pub mod gic400;

use crate::memory::{Address, MemoryRegion, Width};

/// Identity of the bus master performing a register access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Initiator {
    /// Processor with the given index.
    Cpu(usize),
    /// A master that is not one of the processors (DMA, debugger, ...).
    Unknown,
}

impl From<usize> for Initiator {
    fn from(cpu: usize) -> Self {
        Self::Cpu(cpu)
    }
}

/// Error of a bus transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryTxError {
    /// No device is mapped at this address.
    InvalidAddress(Address),
    /// The device does not accept accesses of this width at this offset.
    UnsupportedWidth { offset: u64, width: Width },
}

impl std::fmt::Display for MemoryTxError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(fmt, "no device mapped at {addr}"),
            Self::UnsupportedWidth { offset, width } => write!(
                fmt,
                "unsupported {}-bit access at offset 0x{offset:x}",
                *width as i32
            ),
        }
    }
}

impl std::error::Error for MemoryTxError {}

pub type MemoryTxResult<T = ()> = Result<T, MemoryTxError>;

/// Trait for device operations.
pub trait Device: std::fmt::Debug {
    /// Returns device ID.
    fn id(&self) -> u64;
    /// Consumes the device and returns the register windows it occupies.
    fn into_memory_regions(self) -> Vec<MemoryRegion>;
}

/// Side-effecting register accessors of one device window.
pub trait DeviceOps: std::fmt::Debug + Send + Sync {
    /// Returns device ID.
    fn id(&self) -> u64;
    fn read(&self, initiator: Initiator, offset: u64, width: Width) -> MemoryTxResult<u64>;
    fn write(&self, initiator: Initiator, offset: u64, value: u64, width: Width) -> MemoryTxResult;
}
