// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Distributor interface (`GICD_*`).

use bilge::prelude::{u3, u5};

use super::{
    registers::{
        ControllerType, DistributorControl, SoftwareGeneratedInterrupt, TargetListFilter,
        AMBA_PCID,
    },
    CpuMask, Domain, Gic400State, TriggerMode, NCPU, NIRQ, NPPI, NPRIV, NSGI, NSPI,
};
use crate::{
    devices::{MemoryTxError, MemoryTxResult},
    memory::Width,
    tracing,
};

/// Reset value of the SGI and PPI configuration words: all edge-triggered.
const ICFGR_EDGE: u32 = 0xaaaa_aaaa;

/// Distributor register storage that is not derived from the per-IRQ state.
#[derive(Debug)]
pub struct Distributor {
    pub(super) ctlr: DistributorControl,
    igroupr: [u32; NIRQ / 32],
    ipriority_sgi: [[u8; NSGI]; NCPU],
    ipriority_ppi: [[u8; NPPI]; NCPU],
    ipriority_spi: Vec<u8>,
    itargets_spi: Vec<CpuMask>,
    icfgr_ppi: u32,
    icfgr_spi: [u32; NSPI / 16],
    /// Per target CPU and SGI: the CPUs that have it pending on the target.
    sgi_sources: [[CpuMask; NSGI]; NCPU],
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}

impl Distributor {
    pub fn new() -> Self {
        Self {
            ctlr: DistributorControl::empty(),
            igroupr: [0; NIRQ / 32],
            ipriority_sgi: [[0; NSGI]; NCPU],
            ipriority_ppi: [[0; NPPI]; NCPU],
            ipriority_spi: vec![0; NSPI],
            itargets_spi: vec![CpuMask::empty(); NSPI],
            icfgr_ppi: ICFGR_EDGE,
            icfgr_spi: [0; NSPI / 16],
            sgi_sources: [[CpuMask::empty(); NSGI]; NCPU],
        }
    }

    /// Priority of `irq` as seen by `cpu`. SGI and PPI priorities are banked.
    pub fn priority(&self, cpu: usize, irq: usize) -> Option<u8> {
        match irq {
            0..NSGI => Some(self.ipriority_sgi[cpu][irq]),
            NSGI..NPRIV => Some(self.ipriority_ppi[cpu][irq - NSGI]),
            NPRIV..NIRQ => Some(self.ipriority_spi[irq - NPRIV]),
            _ => None,
        }
    }

    /// CPUs a shared peripheral interrupt may be signaled to. Private
    /// interrupts have no target set.
    pub fn targets(&self, irq: usize) -> CpuMask {
        irq.checked_sub(NPRIV)
            .and_then(|idx| self.itargets_spi.get(idx).copied())
            .unwrap_or_default()
    }

    /// CPUs that raised `sgi` on `cpu` and have not been acknowledged yet.
    pub fn sgi_sources(&self, cpu: usize, sgi: usize) -> CpuMask {
        self.sgi_sources[cpu][sgi]
    }

    pub(super) fn set_sgi_sources(&mut self, cpu: usize, sgi: usize, sources: CpuMask, set: bool) {
        self.sgi_sources[cpu][sgi].set(sources, set);
    }
}

/// A decoded distributor register offset. Array registers carry the word or
/// byte index inside the array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DistributorRegister {
    Ctlr,
    Typer,
    Iidr,
    Igroupr(usize),
    Isenabler(usize),
    Icenabler(usize),
    Ispendr(usize),
    Icpendr(usize),
    Isactiver(usize),
    Icactiver(usize),
    Ipriority(usize),
    Itargets(usize),
    Icfgr(usize),
    Sgir,
    Cpendsgir(usize),
    Spendsgir(usize),
    Cidr(usize),
    Reserved,
}

impl DistributorRegister {
    fn decode(offset: u64) -> Self {
        let word = |base: u64| ((offset - base) / 4) as usize;
        let byte = |base: u64| (offset - base) as usize;
        match offset {
            0x000..0x004 => Self::Ctlr,
            0x004..0x008 => Self::Typer,
            0x008..0x00c => Self::Iidr,
            0x080..0x100 => Self::Igroupr(word(0x080)),
            0x100..0x180 => Self::Isenabler(word(0x100)),
            0x180..0x200 => Self::Icenabler(word(0x180)),
            0x200..0x280 => Self::Ispendr(word(0x200)),
            0x280..0x300 => Self::Icpendr(word(0x280)),
            0x300..0x380 => Self::Isactiver(word(0x300)),
            0x380..0x400 => Self::Icactiver(word(0x380)),
            0x400..0x7fc => Self::Ipriority(byte(0x400)),
            0x800..0xbfc => Self::Itargets(byte(0x800)),
            0xc00..0xd00 => Self::Icfgr(word(0xc00)),
            0xf00..0xf04 => Self::Sgir,
            0xf10..0xf20 => Self::Cpendsgir(byte(0xf10)),
            0xf20..0xf30 => Self::Spendsgir(byte(0xf20)),
            0xff0..0x1000 => Self::Cidr(word(0xff0)),
            _ => Self::Reserved,
        }
    }

    const fn is_byte_array(self) -> bool {
        matches!(
            self,
            Self::Ipriority(_) | Self::Itargets(_) | Self::Cpendsgir(_) | Self::Spendsgir(_)
        )
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Ctlr => "GICD_CTLR",
            Self::Typer => "GICD_TYPER",
            Self::Iidr => "GICD_IIDR",
            Self::Igroupr(_) => "GICD_IGROUPR",
            Self::Isenabler(_) => "GICD_ISENABLER",
            Self::Icenabler(_) => "GICD_ICENABLER",
            Self::Ispendr(_) => "GICD_ISPENDR",
            Self::Icpendr(_) => "GICD_ICPENDR",
            Self::Isactiver(_) => "GICD_ISACTIVER",
            Self::Icactiver(_) => "GICD_ICACTIVER",
            Self::Ipriority(_) => "GICD_IPRIORITYR",
            Self::Itargets(_) => "GICD_ITARGETSR",
            Self::Icfgr(_) => "GICD_ICFGR",
            Self::Sgir => "GICD_SGIR",
            Self::Cpendsgir(_) => "GICD_CPENDSGIR",
            Self::Spendsgir(_) => "GICD_SPENDSGIR",
            Self::Cidr(_) => "GICD_CIDR",
            Self::Reserved => "Reserved",
        }
    }
}

impl Gic400State {
    pub(super) fn distributor_read(
        &mut self,
        cpu: usize,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        let reg = DistributorRegister::decode(offset);
        let value = match width {
            Width::_32 if offset % 4 == 0 && reg.is_byte_array() => (0..4).fold(0, |acc, i| {
                let byte = self.read_byte(cpu, DistributorRegister::decode(offset + i));
                acc | u32::from(byte) << (8 * i)
            }),
            Width::_32 if offset % 4 == 0 => self.read_word(cpu, reg),
            Width::_8 if reg.is_byte_array() => self.read_byte(cpu, reg).into(),
            _ => return Err(MemoryTxError::UnsupportedWidth { offset, width }),
        };

        tracing::event!(
            target: tracing::TraceItem::Distributor.as_str(),
            tracing::Level::TRACE,
            kind = "distributor read",
            cpu,
            offset = ?tracing::Hex(offset),
            ?width,
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );
        Ok(value.into())
    }

    pub(super) fn distributor_write(
        &mut self,
        cpu: usize,
        offset: u64,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        let reg = DistributorRegister::decode(offset);
        tracing::event!(
            target: tracing::TraceItem::Distributor.as_str(),
            tracing::Level::TRACE,
            kind = "distributor write",
            cpu,
            offset = ?tracing::Hex(offset),
            ?width,
            field = reg.name(),
            value = ?tracing::BinaryHex(value),
        );

        let value = value as u32;
        let mutated = match width {
            Width::_32 if offset % 4 == 0 && reg.is_byte_array() => {
                let mut mutated = false;
                for i in 0..4 {
                    let reg = DistributorRegister::decode(offset + i);
                    mutated |= self.write_byte(cpu, reg, (value >> (8 * i)) as u8);
                }
                mutated
            }
            Width::_32 if offset % 4 == 0 => self.write_word(cpu, reg, value),
            Width::_8 if reg.is_byte_array() => self.write_byte(cpu, reg, value as u8),
            _ => return Err(MemoryTxError::UnsupportedWidth { offset, width }),
        };
        if mutated {
            self.update(Domain::Physical);
        }
        Ok(())
    }

    /// Interrupt IDs covered by word `word` of a one-bit-per-IRQ register
    /// array, paired with their bit position. IDs beyond the implemented
    /// lines are skipped.
    fn word_irqs(&self, word: usize) -> impl Iterator<Item = (usize, usize)> {
        let num_irqs = self.num_irqs;
        (0..32)
            .map(move |bit| (bit, word * 32 + bit))
            .filter(move |(_, irq)| *irq < num_irqs)
    }

    fn collect_bits(&self, word: usize, pred: impl Fn(usize) -> bool) -> u32 {
        self.word_irqs(word)
            .filter(|(_, irq)| pred(*irq))
            .fold(0, |acc, (bit, _)| acc | 1 << bit)
    }

    fn read_word(&self, cpu: usize, reg: DistributorRegister) -> u32 {
        use DistributorRegister::*;

        let own = CpuMask::cpu(cpu);
        match reg {
            Ctlr => self.distributor.ctlr.bits(),
            Typer => {
                let mut typer = ControllerType::from(0u32);
                typer.set_it_lines_number(u5::new(
                    (self.num_irqs.div_ceil(32).saturating_sub(1) & 0x1f) as u8,
                ));
                typer.set_cpu_number(u3::new((self.num_cpus.saturating_sub(1) & 0x7) as u8));
                typer.into()
            }
            Iidr | Sgir | Reserved => 0,
            Igroupr(n) => self.distributor.igroupr.get(n).copied().unwrap_or(0),
            Isenabler(0) | Icenabler(0) => {
                // SGIs are always enabled
                self.collect_bits(0, |irq| irq < NSGI || self.irqs.is_enabled(irq, own))
            }
            Isenabler(n) | Icenabler(n) => {
                self.collect_bits(n, |irq| self.irqs.is_enabled(irq, CpuMask::ALL))
            }
            Ispendr(0) | Icpendr(0) => self.collect_bits(0, |irq| self.irqs.test_pending(irq, own)),
            Ispendr(n) | Icpendr(n) => {
                self.collect_bits(n, |irq| self.irqs.test_pending(irq, CpuMask::ALL))
            }
            Isactiver(0) | Icactiver(0) => {
                self.collect_bits(0, |irq| self.irqs.is_active(irq, own))
            }
            Isactiver(n) | Icactiver(n) => {
                self.collect_bits(n, |irq| self.irqs.is_active(irq, CpuMask::ALL))
            }
            Icfgr(0) => ICFGR_EDGE,
            Icfgr(1) => self.distributor.icfgr_ppi,
            Icfgr(n) => self.distributor.icfgr_spi.get(n - 2).copied().unwrap_or(0),
            Cidr(n) => (AMBA_PCID >> (n * 8)) & 0xff,
            Ipriority(_) | Itargets(_) | Cpendsgir(_) | Spendsgir(_) => 0,
        }
    }

    fn read_byte(&self, cpu: usize, reg: DistributorRegister) -> u8 {
        use DistributorRegister::*;

        match reg {
            Ipriority(irq) if irq < self.num_irqs => {
                self.distributor.priority(cpu, irq).unwrap_or(0)
            }
            // local cpu is always target for its own SGIs and PPIs
            Itargets(irq) if irq < NPRIV => CpuMask::cpu(cpu).bits(),
            Itargets(irq) if irq < self.num_irqs => self.distributor.targets(irq).bits(),
            Cpendsgir(sgi) | Spendsgir(sgi) if sgi < NSGI => {
                self.distributor.sgi_sources(cpu, sgi).bits()
            }
            _ => 0,
        }
    }

    /// Returns whether the write changed any state the arbiter looks at.
    fn write_word(&mut self, cpu: usize, reg: DistributorRegister, value: u32) -> bool {
        use DistributorRegister::*;

        let own = CpuMask::cpu(cpu);
        let set_bits = |irqs: Vec<(usize, usize)>| -> Vec<usize> {
            irqs.into_iter()
                .filter(|(bit, _)| value & (1 << bit) != 0)
                .map(|(_, irq)| irq)
                .collect()
        };
        match reg {
            Ctlr => {
                let new = DistributorControl::from_bits_truncate(value);
                if new != self.distributor.ctlr {
                    tracing::debug!(
                        "(ctlr) distributor enable {:?} -> {:?}",
                        self.distributor.ctlr,
                        new
                    );
                }
                self.distributor.ctlr = new;
            }
            Typer | Iidr | Cidr(_) | Reserved | Icfgr(0) => return false,
            Isactiver(_) => {
                tracing::debug!("(isactiver) active state is not software writable, ignored");
                return false;
            }
            Igroupr(n) => {
                if let Some(group) = self.distributor.igroupr.get_mut(n) {
                    *group = value;
                }
                return false;
            }
            Isenabler(n) => {
                let mask = if n == 0 { own } else { CpuMask::ALL };
                for irq in set_bits(self.word_irqs(n).collect()) {
                    // SGIs are enabled per default and cannot be changed
                    if irq >= NSGI {
                        self.enable_irq(irq, mask);
                    }
                }
            }
            Icenabler(n) => {
                let mask = if n == 0 { own } else { CpuMask::ALL };
                for irq in set_bits(self.word_irqs(n).collect()) {
                    if irq >= NSGI {
                        self.irqs.disable(irq, mask);
                    }
                }
            }
            Ispendr(n) => {
                for irq in set_bits(self.word_irqs(n).collect()) {
                    match irq {
                        // SGIs are made pending through GICD_SPENDSGIR
                        0..NSGI => {}
                        NSGI..NPRIV => self.irqs.set_pending(irq, true, own),
                        _ => {
                            let targets = self.distributor.targets(irq);
                            self.irqs.set_pending(irq, true, targets);
                        }
                    }
                }
            }
            Icpendr(n) => {
                let mask = if n == 0 { own } else { CpuMask::ALL };
                for irq in set_bits(self.word_irqs(n).collect()) {
                    if irq >= NSGI {
                        self.irqs.set_pending(irq, false, mask);
                    }
                }
            }
            Icactiver(n) => {
                let mask = if n == 0 { own } else { CpuMask::ALL };
                for irq in set_bits(self.word_irqs(n).collect()) {
                    self.irqs.set_active(irq, false, mask);
                }
            }
            Icfgr(n) => {
                // odd bits are reserved
                let value = value & ICFGR_EDGE;
                let first = if n == 1 {
                    self.distributor.icfgr_ppi = value;
                    NSGI
                } else if let Some(cfg) = self.distributor.icfgr_spi.get_mut(n - 2) {
                    *cfg = value;
                    NPRIV + (n - 2) * 16
                } else {
                    return false;
                };
                for i in 0..16 {
                    let irq = first + i;
                    if irq >= self.num_irqs {
                        break;
                    }
                    let trigger = if value & (2 << (i * 2)) != 0 {
                        TriggerMode::Edge
                    } else {
                        TriggerMode::Level
                    };
                    tracing::debug!("irq {irq} configured to be {trigger:?} sensitive");
                    self.irqs.set_trigger(irq, trigger);
                }
            }
            Sgir => self.generate_sgi(cpu, value.into()),
            Ipriority(_) | Itargets(_) | Cpendsgir(_) | Spendsgir(_) => return false,
        }
        true
    }

    /// Returns whether the write changed any state the arbiter looks at.
    fn write_byte(&mut self, cpu: usize, reg: DistributorRegister, value: u8) -> bool {
        use DistributorRegister::*;

        let own = CpuMask::cpu(cpu);
        match reg {
            Ipriority(irq) if irq < self.num_irqs => {
                let dist = &mut self.distributor;
                match irq {
                    0..NSGI => dist.ipriority_sgi[cpu][irq] = value,
                    NSGI..NPRIV => dist.ipriority_ppi[cpu][irq - NSGI] = value,
                    _ => dist.ipriority_spi[irq - NPRIV] = value,
                }
            }
            Itargets(irq) if (NPRIV..self.num_irqs).contains(&irq) => {
                let targets = CpuMask::from_bits_truncate(value) & CpuMask::first(self.num_cpus);
                self.distributor.itargets_spi[irq - NPRIV] = targets;
            }
            Spendsgir(sgi) if sgi < NSGI => {
                let sources = CpuMask::from_bits_truncate(value) & CpuMask::first(self.num_cpus);
                if sources.is_empty() {
                    return false;
                }
                self.distributor.set_sgi_sources(cpu, sgi, sources, true);
                self.irqs.set_pending(sgi, true, own);
                self.irqs.set_signaled(sgi, false, own);
            }
            Cpendsgir(sgi) if sgi < NSGI => {
                let sources = CpuMask::from_bits_truncate(value);
                self.distributor.set_sgi_sources(cpu, sgi, sources, false);
                // clear SGI if no sources remain
                if self.distributor.sgi_sources(cpu, sgi).is_empty() {
                    self.irqs.set_pending(sgi, false, own);
                }
            }
            _ => return false,
        }
        true
    }

    /// Enables `irq` for `mask`. A level-sensitive input that is already
    /// asserted becomes pending right away.
    pub(super) fn enable_irq(&mut self, irq: usize, mask: CpuMask) {
        self.irqs.enable(irq, mask);
        if self.irqs.trigger(irq) == TriggerMode::Level && self.irqs.is_level(irq, mask) {
            self.irqs.set_pending(irq, true, mask);
        }
    }

    fn generate_sgi(&mut self, cpu: usize, sgir: SoftwareGeneratedInterrupt) {
        let sgi = usize::from(sgir.sgi_id().value());
        let src = CpuMask::cpu(cpu);
        let targets = match sgir.target_list_filter() {
            TargetListFilter::TargetList => CpuMask::from_bits_truncate(sgir.cpu_target_list()),
            TargetListFilter::AllButSelf => CpuMask::ALL ^ src,
            TargetListFilter::SelfOnly => src,
            TargetListFilter::Reserved => {
                tracing::warn!("(sgir) cpu {cpu}: bad SGI target filter, ignored");
                return;
            }
        } & CpuMask::first(self.num_cpus);

        tracing::debug!("(sgir) cpu {cpu} raises sgi {sgi} on {targets:?}");
        self.irqs.set_pending(sgi, true, targets);
        for target in targets.cpus() {
            self.distributor.set_sgi_sources(target, sgi, src, true);
        }
        self.irqs.set_signaled(sgi, false, targets);
    }
}
