// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Virtual interface control (`GICH_*`).
//!
//! A hypervisor injects virtual interrupts by writing list registers. The
//! virtual CPU interface only goes through the accessors of [`VifControl`].

use bilge::prelude::*;

use super::{
    cpu_interface::check_word_access,
    registers::{ListRegister, ListRegisterState, VirtualMachineControl},
    Domain, Gic400State, IDLE_PRIO, NIRQ, NLR, NSGI, VIRT_MIN_BPR,
};
use crate::{devices::MemoryTxResult, memory::Width, tracing};

/// Decoded list register.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ListRegisterEntry {
    pub pending: bool,
    pub active: bool,
    /// Backed by the physical interrupt `physical_id`.
    pub hw: bool,
    pub group1: bool,
    /// Priority on the 8-bit scale of `GICV_PMR`.
    pub priority: u8,
    pub virtual_id: u32,
    pub physical_id: u32,
    /// Source CPU of a virtual SGI.
    pub cpu_id: u8,
    raw: u32,
}

impl ListRegisterEntry {
    pub fn decode(value: u32) -> Self {
        let lr = ListRegister::from(value);
        let state = lr.state();
        Self {
            pending: state.is_pending(),
            active: state.is_active(),
            hw: lr.hw(),
            group1: lr.group1(),
            priority: lr.priority().value() << 3,
            virtual_id: lr.virtual_id().value().into(),
            physical_id: if lr.hw() {
                lr.physical_id().value().into()
            } else {
                0
            },
            cpu_id: if lr.hw() { 0 } else { lr.cpu_id() },
            raw: value,
        }
    }

    /// The last written value with the current pending and active bits.
    pub fn encode(&self) -> u32 {
        let mut lr = ListRegister::from(self.raw);
        lr.set_state(ListRegisterState::new(self.pending, self.active));
        lr.into()
    }

    pub const fn is_live(&self) -> bool {
        self.pending || self.active
    }
}

/// Banked virtual interface control registers of one processor.
#[derive(Debug)]
pub struct VifControl {
    hcr: u32,
    apr: u32,
    lrs: [ListRegisterEntry; NLR],
}

impl Default for VifControl {
    fn default() -> Self {
        Self::new()
    }
}

impl VifControl {
    pub fn new() -> Self {
        Self {
            hcr: 0,
            apr: 0,
            lrs: [ListRegisterEntry::default(); NLR],
        }
    }

    /// `GICH_HCR.En`
    pub fn is_enabled(&self) -> bool {
        self.hcr & 1 != 0
    }

    pub fn active_priorities(&self) -> u32 {
        self.apr
    }

    pub fn entries(&self) -> impl Iterator<Item = &ListRegisterEntry> {
        self.lrs.iter()
    }

    pub fn entry(&self, idx: usize) -> Option<&ListRegisterEntry> {
        self.lrs.get(idx)
    }

    /// Index of the pending or active list register holding `virtual_id`.
    pub fn find(&self, virtual_id: u32) -> Option<usize> {
        let idx = self
            .lrs
            .iter()
            .position(|lr| lr.is_live() && lr.virtual_id == virtual_id);
        if idx.is_none() {
            tracing::error!("no list register holds virtual irq {virtual_id}");
        }
        idx
    }

    pub(super) fn entry_mut(&mut self, virtual_id: u32) -> Option<&mut ListRegisterEntry> {
        let idx = self.find(virtual_id)?;
        self.lrs.get_mut(idx)
    }

    /// Priority of the list register holding `virtual_id`, `0` if there is
    /// none.
    pub fn irq_priority(&self, virtual_id: u32) -> u8 {
        self.find(virtual_id)
            .map_or(0, |idx| self.lrs[idx].priority)
    }

    pub(super) fn set_active_priorities(&mut self, apr: u32) {
        self.apr = apr;
    }

    /// Running priority encoded by the active priority bits: the last set
    /// bit shifted into the group priority field, idle if none is set.
    pub fn apr_running_priority(&self) -> u8 {
        if self.apr == 0 {
            IDLE_PRIO
        } else {
            ((31 - self.apr.leading_zeros()) << (VIRT_MIN_BPR + 1)) as u8
        }
    }

    /// `GICH_ELRSR0`: list registers that hold no interrupt.
    fn empty_lrs(&self) -> u32 {
        self.lrs
            .iter()
            .enumerate()
            .filter(|(_, lr)| !lr.is_live())
            .fold(0, |acc, (i, _)| acc | 1 << i)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VifControlRegister {
    Hcr,
    Vtr,
    Vmcr,
    Elrsr0,
    Apr,
    Lr(usize),
    Reserved,
}

impl VifControlRegister {
    fn decode(offset: u64) -> Self {
        match offset {
            0x00 => Self::Hcr,
            0x04 => Self::Vtr,
            0x08 => Self::Vmcr,
            0x30 => Self::Elrsr0,
            0xf0 => Self::Apr,
            0x100..0x200 => Self::Lr(((offset - 0x100) / 4) as usize),
            _ => Self::Reserved,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Hcr => "GICH_HCR",
            Self::Vtr => "GICH_VTR",
            Self::Vmcr => "GICH_VMCR",
            Self::Elrsr0 => "GICH_ELRSR0",
            Self::Apr => "GICH_APR",
            Self::Lr(_) => "GICH_LR",
            Self::Reserved => "Reserved",
        }
    }
}

impl Gic400State {
    pub(super) fn vif_control_read(
        &mut self,
        cpu: usize,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        use VifControlRegister::*;

        check_word_access(offset, width)?;
        let reg = VifControlRegister::decode(offset);
        let vifc = &self.vif_control[cpu];
        let value = match reg {
            Hcr => vifc.hcr,
            // five priority bits, NLR - 1 list registers
            Vtr => 0x9000_0000 | (NLR as u32 - 1),
            Vmcr => {
                let vcpu = &self.vcpu_interface[cpu];
                let mut vmcr = VirtualMachineControl::from(0u32);
                vmcr.set_ctlr(u10::new((vcpu.ctlr & 0x3ff) as u16));
                vmcr.set_abpr(u3::new(vcpu.abpr & 0x7));
                vmcr.set_bpr(u3::new(vcpu.bpr & 0x7));
                vmcr.set_pmr(u5::new(vcpu.pmr >> 3));
                vmcr.into()
            }
            Elrsr0 => vifc.empty_lrs(),
            Apr => vifc.apr,
            Lr(n) => vifc.entry(n).map_or(0, ListRegisterEntry::encode),
            Reserved => 0,
        };

        tracing::event!(
            target: tracing::TraceItem::VifControl.as_str(),
            tracing::Level::TRACE,
            kind = "vif control read",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );
        Ok(value.into())
    }

    pub(super) fn vif_control_write(
        &mut self,
        cpu: usize,
        offset: u64,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        use VifControlRegister::*;

        check_word_access(offset, width)?;
        let reg = VifControlRegister::decode(offset);
        tracing::event!(
            target: tracing::TraceItem::VifControl.as_str(),
            tracing::Level::TRACE,
            kind = "vif control write",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );

        let value = value as u32;
        match reg {
            Hcr => {
                let vifc = &mut self.vif_control[cpu];
                if (vifc.hcr ^ value) & 1 != 0 {
                    tracing::debug!("(hcr) cpu {cpu} virtual interface enable -> {}", value & 1);
                }
                vifc.hcr = value;
            }
            Vmcr => {
                let vmcr = VirtualMachineControl::from(value);
                let vcpu = &mut self.vcpu_interface[cpu];
                vcpu.ctlr = vmcr.ctlr().value().into();
                vcpu.abpr = vmcr.abpr().value();
                vcpu.bpr = vmcr.bpr().value().max(super::VIRT_MIN_BPR);
                vcpu.pmr = vmcr.pmr().value() << 3;
            }
            Apr => self.write_virtual_apr(cpu, value),
            Lr(n) if n < NLR => {
                let entry = ListRegisterEntry::decode(value);
                if entry.hw && !(NSGI..NIRQ).contains(&(entry.physical_id as usize)) {
                    tracing::error!(
                        "(lr{n}) cpu {cpu}: invalid physical irq {} for virtual irq {}, ignored",
                        entry.physical_id,
                        entry.virtual_id
                    );
                    return Ok(());
                }
                tracing::debug!("(lr{n}) cpu {cpu} <- {entry:?}");
                self.vif_control[cpu].lrs[n] = entry;
            }
            Vtr | Elrsr0 | Lr(_) | Reserved => {
                tracing::trace!("(vif control) write to read-only {} ignored", reg.name());
                return Ok(());
            }
        }
        self.update(Domain::Virtual);
        Ok(())
    }

    /// Sets the active priority bits and the virtual running priority they
    /// encode.
    pub(super) fn write_virtual_apr(&mut self, cpu: usize, apr: u32) {
        let vifc = &mut self.vif_control[cpu];
        vifc.set_active_priorities(apr);
        self.vcpu_interface[cpu].rpr = vifc.apr_running_priority();
    }
}
