// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Virtual CPU interface (`GICV_*`).
//!
//! Same layout as the physical CPU interface, backed by the list registers.
//! Nested acknowledges are tracked in the active priority bits of the
//! virtual interface control instead of a preemption stack.

use super::{
    cpu_interface::{check_word_access, CpuInterfaceRegister},
    registers::{AMBA_IFID, AMBA_PCID},
    Domain, Gic400State, IDLE_PRIO, NIRQ, NSGI, SPURIOUS_IRQ, VIRT_MIN_BPR,
};
use crate::{devices::MemoryTxResult, memory::Width, tracing};

/// Banked virtual CPU interface registers of one processor.
#[derive(Debug)]
pub struct VcpuInterface {
    pub(super) ctlr: u32,
    pub(super) pmr: u8,
    pub(super) bpr: u8,
    pub(super) abpr: u8,
    pub(super) rpr: u8,
    pub(super) hppir: u32,
}

impl Default for VcpuInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl VcpuInterface {
    pub fn new() -> Self {
        Self {
            ctlr: 0,
            pmr: 0,
            bpr: VIRT_MIN_BPR,
            abpr: VIRT_MIN_BPR + 1,
            rpr: IDLE_PRIO,
            hppir: SPURIOUS_IRQ,
        }
    }

    pub fn priority_mask(&self) -> u8 {
        self.pmr
    }

    pub fn binary_point(&self) -> u8 {
        self.bpr
    }

    pub fn running_priority(&self) -> u8 {
        self.rpr
    }

    pub fn highest_pending(&self) -> u32 {
        self.hppir
    }
}

impl Gic400State {
    pub(super) fn vcpu_interface_read(
        &mut self,
        cpu: usize,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        use CpuInterfaceRegister::*;

        check_word_access(offset, width)?;
        let reg = CpuInterfaceRegister::decode(offset);
        let value = match reg {
            Iar => self.virtual_acknowledge(cpu),
            Ctlr => self.vcpu_interface[cpu].ctlr,
            Pmr => self.vcpu_interface[cpu].pmr.into(),
            Bpr => self.vcpu_interface[cpu].bpr.into(),
            Abpr => self.vcpu_interface[cpu].abpr.into(),
            Rpr => self.vcpu_interface[cpu].rpr.into(),
            Hppir => self.vcpu_interface[cpu].hppir,
            Apr(0) => self.vif_control[cpu].active_priorities(),
            Iidr => AMBA_IFID,
            Cidr(n) => (AMBA_PCID >> (n * 8)) & 0xff,
            Eoir | Apr(_) | Dir | Reserved => 0,
        };

        tracing::event!(
            target: tracing::TraceItem::VcpuInterface.as_str(),
            tracing::Level::TRACE,
            kind = "vcpu interface read",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );
        Ok(value.into())
    }

    pub(super) fn vcpu_interface_write(
        &mut self,
        cpu: usize,
        offset: u64,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        use CpuInterfaceRegister::*;

        check_word_access(offset, width)?;
        let reg = CpuInterfaceRegister::decode(offset);
        tracing::event!(
            target: tracing::TraceItem::VcpuInterface.as_str(),
            tracing::Level::TRACE,
            kind = "vcpu interface write",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );

        let value = value as u32;
        let vcpu = &mut self.vcpu_interface[cpu];
        match reg {
            Ctlr => {
                if value > 1 {
                    tracing::error!(
                        "(ctlr) cpu {cpu}: unimplemented virtual cpu interface features \
                         requested: {value:#x}"
                    );
                }
                vcpu.ctlr = value;
            }
            // five priority bits implemented
            Pmr => vcpu.pmr = (value & 0xf8) as u8,
            Bpr => vcpu.bpr = ((value & 0x7) as u8).max(VIRT_MIN_BPR),
            Abpr => vcpu.abpr = (value & 0x7) as u8,
            Apr(0) => self.write_virtual_apr(cpu, value),
            Eoir => {
                self.virtual_end_of_interrupt(cpu, value);
                return Ok(());
            }
            Iar | Rpr | Hppir | Iidr | Cidr(_) | Apr(_) | Dir | Reserved => {
                tracing::trace!("(vcpu interface) write to {} ignored", reg.name());
                return Ok(());
            }
        }
        self.update(Domain::Virtual);
        Ok(())
    }

    /// `GICV_IAR` read.
    fn virtual_acknowledge(&mut self, cpu: usize) -> u32 {
        let irq = self.vcpu_interface[cpu].hppir;
        if irq == SPURIOUS_IRQ {
            return SPURIOUS_IRQ;
        }
        let prio = self.vif_control[cpu].irq_priority(irq);
        let vcpu = &mut self.vcpu_interface[cpu];
        if prio >= vcpu.rpr {
            tracing::debug!(
                "(iar) vcpu {cpu}: virtual irq {irq} priority {prio:#x} cannot preempt running \
                 priority {:#x}",
                vcpu.rpr
            );
            return SPURIOUS_IRQ;
        }

        // group priority only
        let group_mask = (0xff_u32 << (vcpu.bpr + 1)) as u8;
        vcpu.rpr = prio & group_mask;
        let vifc = &mut self.vif_control[cpu];
        let apr = vifc.active_priorities() | 1 << ((prio >> 3) % 32);
        vifc.set_active_priorities(apr);

        let Some(lr) = vifc.entry_mut(irq) else {
            return SPURIOUS_IRQ;
        };
        lr.active = true;
        lr.pending = false;
        let value = if lr.hw {
            irq
        } else {
            irq | u32::from(lr.cpu_id & 0x7) << 10
        };
        tracing::debug!("(iar) vcpu {cpu} acknowledged virtual irq {irq} at priority {prio:#x}");
        self.update(Domain::Virtual);
        value
    }

    /// `GICV_EOIR` write.
    fn virtual_end_of_interrupt(&mut self, cpu: usize, value: u32) {
        let irq = value & 0x3ff;
        if irq as usize >= NIRQ {
            tracing::warn!("(eoir) vcpu {cpu}: invalid virtual irq {irq}, ignored");
            return;
        }
        // drop the highest active preemption level
        let apr = self.vif_control[cpu].active_priorities();
        self.write_virtual_apr(cpu, apr & apr.wrapping_sub(1));

        let Some(lr) = self.vif_control[cpu].entry_mut(irq) else {
            self.update(Domain::Virtual);
            return;
        };
        lr.active = false;
        let (hw, physical_id) = (lr.hw, lr.physical_id as usize);
        tracing::debug!("(eoir) vcpu {cpu} completed virtual irq {irq}");

        if hw {
            if (NSGI..self.num_irqs).contains(&physical_id) {
                self.deactivate(physical_id, cpu);
                self.update(Domain::Physical);
            } else {
                tracing::error!(
                    "(eoir) vcpu {cpu}: virtual irq {irq} is backed by invalid physical irq \
                     {physical_id}"
                );
            }
        }
        self.update(Domain::Virtual);
    }
}
