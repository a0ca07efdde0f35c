// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Physical CPU interface (`GICC_*`).
//!
//! Acknowledged interrupts are kept on a per-CPU preemption stack. The top of
//! the stack is the interrupt the CPU is running and sets the running
//! priority; an end of interrupt for an entry below the top removes that
//! entry only.

use super::{
    registers::{CpuInterfaceControl, AMBA_IFID, AMBA_PCID},
    CpuMask, Domain, Gic400State, IDLE_PRIO, NCPU, NSGI, SPURIOUS_IRQ,
};
use crate::{
    devices::{MemoryTxError, MemoryTxResult},
    memory::Width,
    tracing,
};

/// An acknowledged interrupt that has not been completed yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunningIrq {
    pub irq: u32,
    pub priority: u8,
}

/// Banked CPU interface registers of one processor.
#[derive(Debug)]
pub struct CpuInterface {
    pub(super) ctlr: CpuInterfaceControl,
    pub(super) pmr: u8,
    pub(super) bpr: u8,
    pub(super) abpr: u8,
    pub(super) rpr: u8,
    pub(super) hppir: u32,
    apr: u32,
    dir: u32,
    stack: Vec<RunningIrq>,
}

impl Default for CpuInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuInterface {
    pub fn new() -> Self {
        Self {
            ctlr: CpuInterfaceControl::empty(),
            pmr: 0,
            bpr: 2,
            abpr: 3,
            rpr: IDLE_PRIO,
            hppir: SPURIOUS_IRQ,
            apr: 0,
            dir: 0,
            stack: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ctlr.is_empty()
    }

    pub fn priority_mask(&self) -> u8 {
        self.pmr
    }

    pub fn running_priority(&self) -> u8 {
        self.rpr
    }

    pub fn highest_pending(&self) -> u32 {
        self.hppir
    }

    /// The interrupt being serviced, if any.
    pub fn running_irq(&self) -> Option<u32> {
        self.stack.last().map(|r| r.irq)
    }

    /// Acknowledged interrupts, outermost first.
    pub fn preemption_stack(&self) -> &[RunningIrq] {
        &self.stack
    }
}

/// A decoded CPU interface offset. The virtual CPU interface uses the same
/// layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum CpuInterfaceRegister {
    Ctlr,
    Pmr,
    Bpr,
    Iar,
    Eoir,
    Rpr,
    Hppir,
    Abpr,
    Apr(usize),
    Iidr,
    Cidr(usize),
    Dir,
    Reserved,
}

impl CpuInterfaceRegister {
    pub(super) fn decode(offset: u64) -> Self {
        match offset {
            0x00 => Self::Ctlr,
            0x04 => Self::Pmr,
            0x08 => Self::Bpr,
            0x0c => Self::Iar,
            0x10 => Self::Eoir,
            0x14 => Self::Rpr,
            0x18 => Self::Hppir,
            0x1c => Self::Abpr,
            0xd0..0xe0 => Self::Apr(((offset - 0xd0) / 4) as usize),
            0xfc => Self::Iidr,
            0xff0..0x1000 => Self::Cidr(((offset - 0xff0) / 4) as usize),
            0x1000 => Self::Dir,
            _ => Self::Reserved,
        }
    }

    pub(super) const fn name(self) -> &'static str {
        match self {
            Self::Ctlr => "CTLR",
            Self::Pmr => "PMR",
            Self::Bpr => "BPR",
            Self::Iar => "IAR",
            Self::Eoir => "EOIR",
            Self::Rpr => "RPR",
            Self::Hppir => "HPPIR",
            Self::Abpr => "ABPR",
            Self::Apr(_) => "APR",
            Self::Iidr => "IIDR",
            Self::Cidr(_) => "CIDR",
            Self::Dir => "DIR",
            Self::Reserved => "Reserved",
        }
    }
}

/// Checks a CPU interface access is a naturally aligned word access.
pub(super) fn check_word_access(offset: u64, width: Width) -> MemoryTxResult {
    if width != Width::_32 || offset % 4 != 0 {
        return Err(MemoryTxError::UnsupportedWidth { offset, width });
    }
    Ok(())
}

impl Gic400State {
    pub(super) fn cpu_interface_read(
        &mut self,
        cpu: usize,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        use CpuInterfaceRegister::*;

        check_word_access(offset, width)?;
        let reg = CpuInterfaceRegister::decode(offset);
        if reg == Iar {
            let value = self.acknowledge(cpu);
            tracing::event!(
                target: tracing::TraceItem::CpuInterface.as_str(),
                tracing::Level::TRACE,
                kind = "cpu interface read",
                cpu,
                offset = ?tracing::Hex(offset),
                field = reg.name(),
                value = ?tracing::BinaryHex(value),
            );
            return Ok(value.into());
        }
        let cpuif = &self.cpu_interface[cpu];
        let value: u32 = match reg {
            Ctlr => cpuif.ctlr.bits(),
            Pmr => cpuif.pmr.into(),
            Bpr => cpuif.bpr.into(),
            Abpr => cpuif.abpr.into(),
            Rpr => cpuif.rpr.into(),
            Hppir => self.sgi_source_tag(cpu, cpuif.hppir),
            Apr(0) => cpuif.apr,
            Dir => cpuif.dir,
            Iidr => AMBA_IFID,
            Cidr(n) => (AMBA_PCID >> (n * 8)) & 0xff,
            Iar | Eoir | Apr(_) | Reserved => 0,
        };

        tracing::event!(
            target: tracing::TraceItem::CpuInterface.as_str(),
            tracing::Level::TRACE,
            kind = "cpu interface read",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );
        Ok(value.into())
    }

    pub(super) fn cpu_interface_write(
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
            target: tracing::TraceItem::CpuInterface.as_str(),
            tracing::Level::TRACE,
            kind = "cpu interface write",
            cpu,
            offset = ?tracing::Hex(offset),
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );

        let value = value as u32;
        let cpuif = &mut self.cpu_interface[cpu];
        match reg {
            Ctlr => {
                let ctlr = CpuInterfaceControl::from_bits_truncate(value);
                if ctlr != cpuif.ctlr {
                    tracing::debug!(
                        "(ctlr) cpu {cpu} interface enable {:?} -> {ctlr:?}",
                        cpuif.ctlr
                    );
                }
                cpuif.ctlr = ctlr;
                self.update(Domain::Physical);
            }
            Pmr => {
                cpuif.pmr = value as u8;
                self.update(Domain::Physical);
            }
            Bpr => cpuif.bpr = (value & 0x7) as u8,
            Abpr => cpuif.abpr = (value & 0x7) as u8,
            Apr(0) => cpuif.apr = value,
            Dir => cpuif.dir = value,
            Eoir => self.end_of_interrupt(cpu, value),
            Iar | Rpr | Hppir | Iidr | Cidr(_) | Apr(_) | Reserved => {
                tracing::trace!("(cpu interface) write to read-only {} ignored", reg.name());
            }
        }
        Ok(())
    }

    /// Adds the lowest pending source CPU to an SGI ID in bits `[12:10]`.
    fn sgi_source_tag(&self, cpu: usize, irq: u32) -> u32 {
        let idx = irq as usize;
        if idx >= NSGI {
            return irq;
        }
        let src = self.distributor.sgi_sources(cpu, idx).bits().trailing_zeros();
        irq | (src & 0x7) << 10
    }

    /// `GICC_IAR` read.
    fn acknowledge(&mut self, cpu: usize) -> u32 {
        let cpuif = &self.cpu_interface[cpu];
        let irq = cpuif.hppir;
        if irq == SPURIOUS_IRQ {
            return SPURIOUS_IRQ;
        }
        let idx = irq as usize;
        let prio = self.distributor.priority(cpu, idx).unwrap_or(IDLE_PRIO);
        if prio >= cpuif.rpr {
            tracing::debug!(
                "(iar) cpu {cpu}: irq {irq} priority {prio:#x} cannot preempt running priority {:#x}",
                cpuif.rpr
            );
            return SPURIOUS_IRQ;
        }

        let own = CpuMask::cpu(cpu);
        let mut value = irq;
        if idx < NSGI {
            let mut src = self.distributor.sgi_sources(cpu, idx).bits().trailing_zeros() as usize;
            if src >= NCPU {
                tracing::error!("(iar) cpu {cpu}: sgi {irq} is pending without a source cpu");
                src = 0;
            }
            self.distributor
                .set_sgi_sources(cpu, idx, CpuMask::cpu(src), false);
            if self.distributor.sgi_sources(cpu, idx).is_empty() {
                self.irqs.set_pending(idx, false, own);
            }
            value |= (src as u32) << 10;
        } else {
            let mask = self.irqs.model_mask(idx, cpu);
            self.irqs.set_pending(idx, false, mask);
        }

        let mask = self.irqs.model_mask(idx, cpu);
        self.irqs.set_active(idx, true, mask);
        self.irqs.set_signaled(idx, true, mask);
        let cpuif = &mut self.cpu_interface[cpu];
        cpuif.stack.push(RunningIrq {
            irq,
            priority: prio,
        });
        cpuif.rpr = prio;
        tracing::debug!("(iar) cpu {cpu} acknowledged irq {irq} at priority {prio:#x}");
        self.update(Domain::Physical);
        value
    }

    /// `GICC_EOIR` write.
    fn end_of_interrupt(&mut self, cpu: usize, value: u32) {
        let irq = value & 0x3ff;
        let idx = irq as usize;
        if idx >= self.num_irqs {
            tracing::warn!("(eoir) cpu {cpu}: invalid irq {irq}, ignored");
            return;
        }
        let cpuif = &mut self.cpu_interface[cpu];
        let Some(pos) = cpuif.stack.iter().rposition(|r| r.irq == irq) else {
            if cpuif.stack.is_empty() {
                tracing::warn!("(eoir) cpu {cpu}: irq {irq} completed with no active irq");
            } else {
                tracing::warn!("(eoir) cpu {cpu}: irq {irq} is not active on this cpu, ignored");
            }
            return;
        };
        if pos + 1 != cpuif.stack.len() {
            tracing::debug!(
                "(eoir) cpu {cpu}: out of order completion of irq {irq}, running irq stays {:?}",
                cpuif.running_irq()
            );
        }
        cpuif.stack.remove(pos);
        cpuif.rpr = cpuif.stack.last().map_or(IDLE_PRIO, |r| r.priority);
        tracing::debug!(
            "(eoir) cpu {cpu} completed irq {irq}, running priority {:#x}",
            cpuif.rpr
        );

        self.deactivate(idx, cpu);
        self.update(Domain::Physical);
    }

    /// Clears the active state of `irq` as acknowledged by `cpu`. A
    /// level-sensitive input that is still asserted becomes pending again.
    pub(super) fn deactivate(&mut self, irq: usize, cpu: usize) {
        let mask = self.irqs.model_mask(irq, cpu);
        self.irqs.set_active(irq, false, mask);
        self.irqs.set_signaled(irq, false, mask);
    }
}
