// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! # Arm ® CoreLink™ GIC-400 Generic Interrupt Controller
//!
//! The controller is split in four register windows, each one a
//! [`MemoryRegion`] sharing the same [`Gic400State`]:
//!
//! - the distributor (`GICD_*`), see [`distributor`],
//! - the physical CPU interface (`GICC_*`), see [`cpu_interface`],
//! - the virtual interface control (`GICH_*`), see [`vif_control`],
//! - the virtual CPU interface (`GICV_*`), see [`vcpu_interface`].
//!
//! Every register access and input line change ends with an arbitration pass
//! ([`Gic400State::update`]) that recomputes the highest priority pending
//! interrupt of each processor and drives its output lines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_derive::Deserialize;

use crate::{
    devices::{Initiator, MemoryTxError, MemoryTxResult},
    fdt::FdtWriter,
    machine::interrupts::{CpuSignal, InterruptRequest, Interrupts, SignalEvent, SignalKind},
    memory::{Address, MemoryRegion, MemorySize, Width},
    tracing,
};

pub mod cpu_interface;
pub mod distributor;
pub mod registers;
pub mod state;
pub mod vcpu_interface;
pub mod vif_control;


pub use cpu_interface::CpuInterface;
pub use distributor::Distributor;
pub use state::{CpuMask, IrqState, IrqStateStore, RoutingModel, TriggerMode};
pub use vcpu_interface::VcpuInterface;
pub use vif_control::{ListRegisterEntry, VifControl};

/// Number of software generated interrupts.
pub const NSGI: usize = 16;
/// Number of private peripheral interrupts.
pub const NPPI: usize = 16;
/// Number of interrupts private to each processor.
pub const NPRIV: usize = NSGI + NPPI;
/// Number of shared peripheral interrupts.
pub const NSPI: usize = 480;
/// Number of interrupt IDs.
pub const NIRQ: usize = NPRIV + NSPI;
/// Number of processors the controller can serve.
pub const NCPU: usize = 8;
/// Number of virtual processors.
pub const NVCPU: usize = NCPU;
/// Number of list registers per processor.
pub const NLR: usize = 4;
/// Lowest priority; nothing is running.
pub const IDLE_PRIO: u8 = 0xff;
/// Interrupt ID returned when no interrupt can be acknowledged.
pub const SPURIOUS_IRQ: u32 = 1023;
/// Smallest binary point of the virtual CPU interface.
pub const VIRT_MIN_BPR: u8 = 2;

/// Virtual CPU interface maintenance interrupt, a PPI.
pub const MAINTENANCE_PPI: u32 = 9;

/// One of the four register windows.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    Distributor,
    CpuInterface,
    VifControl,
    VcpuInterface,
}

impl Interface {
    pub const ALL: [Self; 4] = [
        Self::Distributor,
        Self::CpuInterface,
        Self::VifControl,
        Self::VcpuInterface,
    ];

    /// Size of the register window in bytes.
    pub const fn window_size(self) -> u64 {
        match self {
            Self::Distributor | Self::VifControl => 0x1000,
            Self::CpuInterface | Self::VcpuInterface => 0x2000,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Distributor => "distributor",
            Self::CpuInterface => "cpu_interface",
            Self::VifControl => "vif_control",
            Self::VcpuInterface => "vcpu_interface",
        }
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

/// Elaboration parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Gic400Config {
    /// Number of connected processors, each with an IRQ and a virtual IRQ
    /// output.
    pub num_cpus: usize,
    /// Number of connected shared peripheral interrupt inputs.
    pub num_spis: usize,
    pub distributor: Address,
    pub cpu_interface: Address,
    pub vif_control: Address,
    pub vcpu_interface: Address,
}

impl Default for Gic400Config {
    fn default() -> Self {
        Self {
            num_cpus: 1,
            num_spis: 96,
            distributor: Address(0x0800_0000),
            cpu_interface: Address(0x0801_0000),
            vif_control: Address(0x0803_0000),
            vcpu_interface: Address(0x0804_0000),
        }
    }
}

impl Gic400Config {
    pub const fn base(&self, interface: Interface) -> Address {
        match interface {
            Interface::Distributor => self.distributor,
            Interface::CpuInterface => self.cpu_interface,
            Interface::VifControl => self.vif_control,
            Interface::VcpuInterface => self.vcpu_interface,
        }
    }

    /// Checks the parameters can be built into a controller.
    pub fn validate(&self) -> Result<(), Gic400Error> {
        if self.num_cpus == 0 {
            return Err(Gic400Error::NoCpus);
        }
        if self.num_cpus > NCPU {
            return Err(Gic400Error::TooManyCpus {
                num_cpus: self.num_cpus,
            });
        }
        if self.num_spis > NSPI {
            return Err(Gic400Error::TooManyInterrupts {
                irq: NPRIV + self.num_spis,
            });
        }
        for (i, a) in Interface::ALL.into_iter().enumerate() {
            for b in Interface::ALL.into_iter().skip(i + 1) {
                let (a_start, b_start) = (self.base(a).0, self.base(b).0);
                let a_end = a_start.checked_add(a.window_size());
                let b_end = b_start.checked_add(b.window_size());
                let (Some(a_end), Some(b_end)) = (a_end, b_end) else {
                    return Err(Gic400Error::Overlap { first: a, second: b });
                };
                if a_start < b_end && b_start < a_end {
                    return Err(Gic400Error::Overlap { first: a, second: b });
                }
            }
        }
        Ok(())
    }
}

/// Error returned when a controller cannot be built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Gic400Error {
    /// No processor is connected.
    NoCpus,
    /// More processors than the controller supports.
    TooManyCpus { num_cpus: usize },
    /// An input line beyond the last supported interrupt ID.
    TooManyInterrupts { irq: usize },
    /// Two register windows overlap.
    Overlap { first: Interface, second: Interface },
}

impl std::fmt::Display for Gic400Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NoCpus => write!(fmt, "GIC-400 has no connected CPUs"),
            Self::TooManyCpus { num_cpus } => write!(
                fmt,
                "GIC-400 supports at most {NCPU} CPUs, {num_cpus} are connected"
            ),
            Self::TooManyInterrupts { irq } => write!(
                fmt,
                "GIC-400 supports at most {NIRQ} interrupts, interrupt {irq} is connected"
            ),
            Self::Overlap { first, second } => write!(
                fmt,
                "GIC-400 {first} window overlaps with the {second} window"
            ),
        }
    }
}

impl std::error::Error for Gic400Error {}

/// Arbitration domain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Domain {
    Physical,
    Virtual,
}

/// Output lines towards the processors.
#[derive(Debug)]
pub struct Outputs {
    irq: [bool; NCPU],
    virq: [bool; NCPU],
    signal: Option<CpuSignal>,
}

impl Outputs {
    fn new(signal: Option<CpuSignal>) -> Self {
        Self {
            irq: [false; NCPU],
            virq: [false; NCPU],
            signal,
        }
    }

    pub fn level(&self, cpu: usize, kind: SignalKind) -> bool {
        let lines = match kind {
            SignalKind::Irq => &self.irq,
            SignalKind::VirtualIrq => &self.virq,
        };
        lines.get(cpu).copied().unwrap_or(false)
    }

    fn set(&mut self, cpu: usize, kind: SignalKind, level: bool) {
        let line = match kind {
            SignalKind::Irq => &mut self.irq[cpu],
            SignalKind::VirtualIrq => &mut self.virq[cpu],
        };
        if *line == level {
            return;
        }
        *line = level;
        tracing::debug!("cpu {cpu} {kind:?} line -> {level}");
        if let Some(signal) = &self.signal {
            signal.send(SignalEvent { cpu, kind, level });
        }
    }
}

/// Complete controller state, shared by the four register windows.
#[derive(Debug)]
pub struct Gic400State {
    config: Gic400Config,
    num_cpus: usize,
    num_irqs: usize,
    irqs: IrqStateStore,
    distributor: Distributor,
    cpu_interface: Vec<CpuInterface>,
    vif_control: Vec<VifControl>,
    vcpu_interface: Vec<VcpuInterface>,
    outputs: Outputs,
}

impl Gic400State {
    /// Builds the power-on state of a controller.
    pub fn new(config: Gic400Config, signal: Option<CpuSignal>) -> Result<Self, Gic400Error> {
        config.validate()?;
        let mut state = Self {
            config,
            num_cpus: config.num_cpus,
            num_irqs: NPRIV + config.num_spis,
            irqs: IrqStateStore::new(),
            distributor: Distributor::new(),
            cpu_interface: Vec::new(),
            vif_control: Vec::new(),
            vcpu_interface: Vec::new(),
            outputs: Outputs::new(signal),
        };
        state.reset();
        Ok(state)
    }

    pub fn config(&self) -> &Gic400Config {
        &self.config
    }

    pub fn num_irqs(&self) -> usize {
        self.num_irqs
    }

    pub fn irqs(&self) -> &IrqStateStore {
        &self.irqs
    }

    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }

    pub fn cpu_interface(&self, cpu: usize) -> Option<&CpuInterface> {
        self.cpu_interface.get(cpu)
    }

    pub fn vif_control(&self, cpu: usize) -> Option<&VifControl> {
        self.vif_control.get(cpu)
    }

    pub fn vcpu_interface(&self, cpu: usize) -> Option<&VcpuInterface> {
        self.vcpu_interface.get(cpu)
    }

    pub fn output(&self, cpu: usize, kind: SignalKind) -> bool {
        self.outputs.level(cpu, kind)
    }

    /// Returns every register and state bit to its power-on value and drives
    /// all outputs low.
    pub fn reset(&mut self) {
        self.irqs.reset();
        self.distributor = Distributor::new();
        self.cpu_interface = (0..self.num_cpus).map(|_| CpuInterface::new()).collect();
        self.vif_control = (0..self.num_cpus).map(|_| VifControl::new()).collect();
        self.vcpu_interface = (0..self.num_cpus).map(|_| VcpuInterface::new()).collect();
        let all = CpuMask::first(self.num_cpus);
        for sgi in 0..NSGI {
            self.irqs.enable(sgi, all);
        }
        for irq in NPRIV..NIRQ {
            self.irqs.set_model(irq, RoutingModel::NTo1);
            self.irqs.set_trigger(irq, TriggerMode::Level);
        }
        for cpu in 0..self.num_cpus {
            self.outputs.set(cpu, SignalKind::Irq, false);
            self.outputs.set(cpu, SignalKind::VirtualIrq, false);
        }
    }

    /// Maps the bus initiator to a processor index.
    fn resolve_cpu(&self, initiator: Initiator) -> usize {
        match initiator {
            Initiator::Cpu(cpu) if cpu < self.num_cpus => cpu,
            other => {
                tracing::warn!("access from unmapped initiator {other:?}, using cpu 0");
                0
            }
        }
    }

    fn check_window(&self, interface: Interface, offset: u64, width: Width) -> MemoryTxResult {
        if offset.saturating_add(width.bytes()) > interface.window_size() {
            let base = self.config.base(interface);
            return Err(MemoryTxError::InvalidAddress(Address(
                base.0.wrapping_add(offset),
            )));
        }
        Ok(())
    }

    /// Register read on one of the windows.
    pub fn read(
        &mut self,
        interface: Interface,
        initiator: Initiator,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        self.check_window(interface, offset, width)?;
        let cpu = self.resolve_cpu(initiator);
        match interface {
            Interface::Distributor => self.distributor_read(cpu, offset, width),
            Interface::CpuInterface => self.cpu_interface_read(cpu, offset, width),
            Interface::VifControl => self.vif_control_read(cpu, offset, width),
            Interface::VcpuInterface => self.vcpu_interface_read(cpu, offset, width),
        }
    }

    /// Register write on one of the windows.
    pub fn write(
        &mut self,
        interface: Interface,
        initiator: Initiator,
        offset: u64,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        self.check_window(interface, offset, width)?;
        let cpu = self.resolve_cpu(initiator);
        match interface {
            Interface::Distributor => self.distributor_write(cpu, offset, value, width),
            Interface::CpuInterface => self.cpu_interface_write(cpu, offset, value, width),
            Interface::VifControl => self.vif_control_write(cpu, offset, value, width),
            Interface::VcpuInterface => self.vcpu_interface_write(cpu, offset, value, width),
        }
    }

    /// Level change on private peripheral input `idx` of `cpu`.
    pub fn handle_ppi(&mut self, cpu: usize, idx: usize, level: bool) {
        if cpu >= self.num_cpus || idx >= NPPI {
            tracing::warn!("ppi {idx} of cpu {cpu} is not connected, ignored");
            return;
        }
        let own = CpuMask::cpu(cpu);
        self.set_input_level(NSGI + idx, level, own, own);
    }

    /// Level change on shared peripheral input `idx`.
    pub fn handle_spi(&mut self, idx: usize, level: bool) {
        if NPRIV + idx >= self.num_irqs {
            tracing::warn!("spi {idx} is not connected, ignored");
            return;
        }
        let irq = NPRIV + idx;
        let targets = self.distributor.targets(irq);
        self.set_input_level(irq, level, CpuMask::ALL, targets);
    }

    /// Routes a queued line change to the matching input.
    pub fn handle_request(&mut self, req: InterruptRequest) {
        let irq = usize::from(req.interrupt_id);
        match irq {
            0..NSGI => {
                tracing::warn!("sgi {irq} has no input line, request {req:?} ignored");
            }
            NSGI..NPRIV => {
                let cpu = req.cpu_id.map_or_else(
                    || {
                        tracing::warn!("request {req:?} for a ppi names no cpu, using cpu 0");
                        0
                    },
                    usize::from,
                );
                self.handle_ppi(cpu, irq - NSGI, req.signal);
            }
            _ => self.handle_spi(irq - NPRIV, req.signal),
        }
    }

    fn set_input_level(&mut self, irq: usize, level: bool, mask: CpuMask, targets: CpuMask) {
        let rising = level && !self.irqs.is_level(irq, mask);
        self.irqs.set_level(irq, level, mask);
        self.irqs.set_signaled(irq, false, mask);
        if rising && self.irqs.trigger(irq) == TriggerMode::Edge {
            self.irqs.set_pending(irq, true, targets);
        }
        tracing::debug!("irq {irq} input {mask:?} level -> {level}");
        self.update(Domain::Physical);
    }

    /// Whether `irq` may be signaled to `cpu` at all: enabled, pending and
    /// not active, and for shared interrupts `cpu` is one of its targets.
    fn is_candidate(&self, irq: usize, cpu: usize) -> bool {
        let mask = if irq < NPRIV {
            CpuMask::cpu(cpu)
        } else {
            if !self.distributor.targets(irq).has_cpu(cpu) {
                return false;
            }
            CpuMask::ALL
        };
        self.irqs.is_enabled(irq, mask)
            && self.irqs.test_pending(irq, mask)
            && !self.irqs.is_active(irq, mask)
    }

    /// Recomputes the highest priority pending interrupt of every processor
    /// in `domain` and drives the matching output lines.
    pub fn update(&mut self, domain: Domain) {
        match domain {
            Domain::Physical => {
                for cpu in 0..self.num_cpus {
                    self.update_physical(cpu);
                }
            }
            Domain::Virtual => {
                for cpu in 0..self.num_cpus {
                    self.update_virtual(cpu);
                }
            }
        }
    }

    fn update_physical(&mut self, cpu: usize) {
        if self.distributor.ctlr.is_empty() || !self.cpu_interface[cpu].is_enabled() {
            self.cpu_interface[cpu].hppir = SPURIOUS_IRQ;
            self.outputs.set(cpu, SignalKind::Irq, false);
            return;
        }

        let mut best_irq = SPURIOUS_IRQ;
        let mut best_prio = IDLE_PRIO;
        for irq in 0..self.num_irqs {
            if !self.is_candidate(irq, cpu) {
                continue;
            }
            let prio = self.distributor.priority(cpu, irq).unwrap_or(IDLE_PRIO);
            if prio < best_prio {
                best_irq = irq as u32;
                best_prio = prio;
            }
        }

        let cpuif = &mut self.cpu_interface[cpu];
        let visible = best_irq != SPURIOUS_IRQ && best_prio < cpuif.pmr;
        cpuif.hppir = if visible { best_irq } else { SPURIOUS_IRQ };
        let level = visible && best_prio < cpuif.rpr;
        tracing::event!(
            target: tracing::TraceItem::Arbiter.as_str(),
            tracing::Level::TRACE,
            kind = "physical",
            cpu,
            hppir = best_irq,
            prio = best_prio,
            pmr = cpuif.pmr,
            rpr = cpuif.rpr,
            level,
        );
        self.outputs.set(cpu, SignalKind::Irq, level);
    }

    fn update_virtual(&mut self, cpu: usize) {
        let vifc = &self.vif_control[cpu];
        if !vifc.is_enabled() {
            self.vcpu_interface[cpu].hppir = SPURIOUS_IRQ;
            self.outputs.set(cpu, SignalKind::VirtualIrq, false);
            return;
        }

        let best = vifc
            .entries()
            .filter(|lr| lr.pending && !lr.active)
            // min_by_key keeps the first of equal keys, so the lowest list
            // register wins ties
            .min_by_key(|lr| lr.priority);

        let vcpu = &mut self.vcpu_interface[cpu];
        let (hppir, prio) = best.map_or((SPURIOUS_IRQ, IDLE_PRIO), |lr| {
            (lr.virtual_id, lr.priority)
        });
        let visible = hppir != SPURIOUS_IRQ && prio < vcpu.pmr;
        vcpu.hppir = if visible { hppir } else { SPURIOUS_IRQ };
        let level = visible && prio < vcpu.rpr;
        tracing::event!(
            target: tracing::TraceItem::Arbiter.as_str(),
            tracing::Level::TRACE,
            kind = "virtual",
            cpu,
            hppir,
            prio,
            pmr = vcpu.pmr,
            rpr = vcpu.rpr,
            level,
        );
        self.outputs.set(cpu, SignalKind::VirtualIrq, level);
    }
}

/// A GIC-400 instance.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone, Debug)]
pub struct Gic400 {
    device_id: u64,
    config: Gic400Config,
    state: Arc<Mutex<Gic400State>>,
}

impl Gic400 {
    /// Builds a controller and subscribes it to the interrupt requests queued
    /// on `interrupts`. Output line changes are published on its
    /// [`CpuSignal`](crate::machine::interrupts::CpuSignal).
    pub fn new(
        device_id: u64,
        config: Gic400Config,
        interrupts: &mut Interrupts,
    ) -> Result<Self, Gic400Error> {
        let state = Gic400State::new(config, Some(interrupts.cpu_signal()))?;
        let state = Arc::new(Mutex::new(state));
        let gic = Self {
            device_id,
            config,
            state,
        };
        let handle = gic.clone();
        interrupts.subscribe(
            device_id,
            Box::new(move |req| handle.lock().handle_request(req)),
        );
        Ok(gic)
    }

    /// Builds a controller that is not connected to any interrupt plumbing.
    pub fn standalone(device_id: u64, config: Gic400Config) -> Result<Self, Gic400Error> {
        Ok(Self {
            device_id,
            config,
            state: Arc::new(Mutex::new(Gic400State::new(config, None)?)),
        })
    }

    pub fn config(&self) -> &Gic400Config {
        &self.config
    }

    /// Locks the shared state for inspection.
    pub fn lock(&self) -> MutexGuard<'_, Gic400State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn read(
        &self,
        interface: Interface,
        initiator: Initiator,
        offset: u64,
        width: Width,
    ) -> MemoryTxResult<u64> {
        self.lock().read(interface, initiator, offset, width)
    }

    pub fn write(
        &self,
        interface: Interface,
        initiator: Initiator,
        offset: u64,
        value: u64,
        width: Width,
    ) -> MemoryTxResult {
        self.lock().write(interface, initiator, offset, value, width)
    }

    pub fn handle_ppi(&self, cpu: usize, idx: usize, level: bool) {
        self.lock().handle_ppi(cpu, idx, level);
    }

    pub fn handle_spi(&self, idx: usize, level: bool) {
        self.lock().handle_spi(idx, level);
    }

    pub fn irq_line(&self, cpu: usize) -> bool {
        self.lock().output(cpu, SignalKind::Irq)
    }

    pub fn virq_line(&self, cpu: usize) -> bool {
        self.lock().output(cpu, SignalKind::VirtualIrq)
    }

    /// Emits the `interrupt-controller` node describing this controller.
    pub fn write_device_tree_node(
        &self,
        fdt: &mut FdtWriter,
        phandle: u32,
    ) -> Result<(), vm_fdt::Error> {
        let config = &self.config;
        let node = fdt.begin_node(&format!("interrupt-controller@{:x}", config.distributor.0))?;
        fdt.property_string("compatible", "arm,gic-400")?;
        fdt.property_u32("#interrupt-cells", 3)?;
        fdt.property_u32("#address-cells", 2)?;
        fdt.property_u32("#size-cells", 2)?;
        fdt.property_null("interrupt-controller")?;
        let reg = Interface::ALL
            .into_iter()
            .flat_map(|i| [config.base(i).0, i.window_size()])
            .collect::<Vec<u64>>();
        fdt.property_array_u64("reg", &reg)?;
        // GIC_PPI, maintenance interrupt, level high on all CPUs
        let cpu_mask = u32::from(CpuMask::first(config.num_cpus).bits());
        fdt.property_array_u32("interrupts", &[1, MAINTENANCE_PPI, (cpu_mask << 8) | 0x4])?;
        fdt.property_u32("phandle", phandle)?;
        fdt.end_node(node)?;
        Ok(())
    }
}

impl crate::devices::Device for Gic400 {
    fn id(&self) -> u64 {
        self.device_id
    }

    fn into_memory_regions(self) -> Vec<MemoryRegion> {
        let Self {
            device_id,
            config,
            state,
        } = self;
        Interface::ALL
            .into_iter()
            .filter_map(|interface| {
                MemoryRegion::new_io(
                    MemorySize::new(interface.window_size())?,
                    config.base(interface),
                    Box::new(Gic400MemoryOps {
                        device_id,
                        interface,
                        state: state.clone(),
                    }),
                )
            })
            .collect()
    }
}

#[derive(Debug)]
struct Gic400MemoryOps {
    device_id: u64,
    interface: Interface,
    state: Arc<Mutex<Gic400State>>,
}

impl crate::devices::DeviceOps for Gic400MemoryOps {
    fn id(&self) -> u64 {
        self.device_id
    }

    fn read(&self, initiator: Initiator, offset: u64, width: Width) -> MemoryTxResult<u64> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(self.interface, initiator, offset, width)
    }

    fn write(&self, initiator: Initiator, offset: u64, value: u64, width: Width) -> MemoryTxResult {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(self.interface, initiator, offset, value, width)
    }
}
