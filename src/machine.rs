// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Representation of an emulated board: a bus with the interrupt controller
//! mapped on it, and the interrupt line plumbing around it.

use crate::{
    devices::{
        gic400::{Gic400, Gic400Config},
        Device, Initiator, MemoryTxResult,
    },
    memory::{Address, MemoryMap, Width},
};

pub mod interrupts;

use interrupts::{InterruptGenerator, Interrupts, SignalEvent};

/// Device ID of the interrupt controller.
pub const GIC_DEVICE_ID: u64 = 0;

/// The state of the emulated machine.
#[derive(Debug)]
pub struct Machine {
    pub memory: MemoryMap,
    pub interrupts: Interrupts,
    pub gic: Gic400,
}

impl Machine {
    pub fn new(config: Gic400Config) -> Result<Self, Box<dyn std::error::Error>> {
        let mut interrupts = Interrupts::new();
        let gic = Gic400::new(GIC_DEVICE_ID, config, &mut interrupts)?;
        let memory = MemoryMap::builder()
            .with_regions(gic.clone().into_memory_regions())?
            .build();
        Ok(Self {
            memory,
            interrupts,
            gic,
        })
    }

    /// Bus read issued by processor `cpu`.
    pub fn read(&self, cpu: usize, addr: Address, width: Width) -> MemoryTxResult<u64> {
        self.memory.read(Initiator::Cpu(cpu), addr, width)
    }

    /// Bus write issued by processor `cpu`.
    pub fn write(&self, cpu: usize, addr: Address, value: u64, width: Width) -> MemoryTxResult {
        self.memory.write(Initiator::Cpu(cpu), addr, value, width)
    }

    /// Handle for other devices to drive interrupt inputs.
    pub fn interrupt_generator(&self) -> InterruptGenerator {
        self.interrupts.generator.clone()
    }

    /// Delivers queued interrupt line changes to the controller.
    pub fn rcv(&self) -> bool {
        self.interrupts.rcv()
    }

    pub fn irq_line(&self, cpu: usize) -> bool {
        self.gic.irq_line(cpu)
    }

    pub fn virq_line(&self, cpu: usize) -> bool {
        self.gic.virq_line(cpu)
    }

    /// Output line changes since the last call.
    pub fn drain_signals(&self) -> Vec<SignalEvent> {
        self.interrupts.drain_signals()
    }
}
