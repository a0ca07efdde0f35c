// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Bit-field layouts of the GIC-400 registers that pack more than one value.

use bilge::prelude::*;
use bitflags::bitflags;

/// PrimeCell component identification, read back byte-wise from `0xff0`.
pub const AMBA_PCID: u32 = 0xb105_f00d;
/// CPU interface identification (`GICC_IIDR`/`GICV_IIDR`) of a GIC-400.
pub const AMBA_IFID: u32 = 0x0202_043b;

bitflags! {
    /// Distributor Control Register, `GICD_CTLR`
    #[doc(alias = "GICD_CTLR")]
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DistributorControl: u32 {
        const ENABLE_GRP0 = 1 << 0;
        const ENABLE_GRP1 = 1 << 1;
    }
}

bitflags! {
    /// CPU Interface Control Register, `GICC_CTLR`
    #[doc(alias = "GICC_CTLR")]
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CpuInterfaceControl: u32 {
        const ENABLE_GRP0 = 1 << 0;
        const ENABLE_GRP1 = 1 << 1;
    }
}

/// Interrupt Controller Type Register, `GICD_TYPER`
#[bitsize(32)]
#[derive(Clone, Copy, DebugBits, FromBits)]
#[doc(alias = "GICD_TYPER")]
pub struct ControllerType {
    /// Number of implemented 32-interrupt blocks, minus one.
    pub it_lines_number: u5,
    /// Number of implemented CPU interfaces, minus one.
    pub cpu_number: u3,
    _reserved: u2,
    pub security_extn: bool,
    pub lspi: u5,
    _reserved_hi: u16,
}

/// `TargetListFilter` field of [`SoftwareGeneratedInterrupt`].
#[bitsize(2)]
#[derive(Clone, Copy, Debug, Eq, FromBits, PartialEq)]
pub enum TargetListFilter {
    /// Forward to the CPUs in `cpu_target_list`.
    TargetList = 0,
    /// Forward to all CPUs except the requesting one.
    AllButSelf = 1,
    /// Forward only to the requesting CPU.
    SelfOnly = 2,
    Reserved = 3,
}

/// Software Generated Interrupt Register, `GICD_SGIR`
#[bitsize(32)]
#[derive(Clone, Copy, DebugBits, FromBits)]
#[doc(alias = "GICD_SGIR")]
pub struct SoftwareGeneratedInterrupt {
    pub sgi_id: u4,
    _reserved: u11,
    pub nsatt: bool,
    pub cpu_target_list: u8,
    pub target_list_filter: TargetListFilter,
    _reserved_hi: u6,
}

/// `State` field of [`ListRegister`].
#[bitsize(2)]
#[derive(Clone, Copy, Debug, Eq, FromBits, PartialEq)]
pub enum ListRegisterState {
    Invalid = 0,
    Pending = 1,
    Active = 2,
    PendingActive = 3,
}

impl ListRegisterState {
    pub const fn new(pending: bool, active: bool) -> Self {
        match (pending, active) {
            (false, false) => Self::Invalid,
            (true, false) => Self::Pending,
            (false, true) => Self::Active,
            (true, true) => Self::PendingActive,
        }
    }

    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending | Self::PendingActive)
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::PendingActive)
    }
}

/// List Register, `GICH_LRn`
///
/// With `hw` set, bits `[19:10]` hold the physical interrupt ID that is
/// deactivated together with the virtual one. Otherwise bits `[12:10]` hold
/// the source CPU of a virtual SGI and bit 19 requests a maintenance
/// interrupt on EOI.
#[bitsize(32)]
#[derive(Clone, Copy, DebugBits, FromBits)]
#[doc(alias = "GICH_LR")]
pub struct ListRegister {
    pub virtual_id: u10,
    pub physical_id: u10,
    _reserved: u3,
    pub priority: u5,
    pub state: ListRegisterState,
    pub group1: bool,
    pub hw: bool,
}

impl ListRegister {
    /// Source CPU of a software (`hw == 0`) entry.
    pub fn cpu_id(&self) -> u8 {
        (self.physical_id().value() & 0x7) as u8
    }

    /// Maintenance-interrupt-on-EOI request of a software (`hw == 0`) entry.
    pub fn eoi_maintenance(&self) -> bool {
        self.physical_id().value() & (1 << 9) != 0
    }
}

/// Virtual Machine Control Register, `GICH_VMCR`
///
/// Aliases the virtual CPU interface's control, binary point and priority
/// mask registers for save/restore.
#[bitsize(32)]
#[derive(Clone, Copy, DebugBits, FromBits)]
#[doc(alias = "GICH_VMCR")]
pub struct VirtualMachineControl {
    pub ctlr: u10,
    _reserved: u8,
    pub abpr: u3,
    pub bpr: u3,
    _reserved_hi: u3,
    /// Upper five bits of `GICV_PMR`.
    pub pmr: u5,
}
