// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Per-interrupt state bits.
//!
//! Every flag is a [`CpuMask`]: bit *n* is CPU *n*'s view. Banked interrupts
//! (SGIs and PPIs) use one bit per CPU, shared peripheral interrupts are
//! usually updated with [`CpuMask::ALL`] or their target set.

use bitflags::bitflags;

use super::{NCPU, NIRQ};
use crate::tracing;

bitflags! {
    /// Set of processors.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CpuMask: u8 {
        const CPU0 = 1 << 0;
        const CPU1 = 1 << 1;
        const CPU2 = 1 << 2;
        const CPU3 = 1 << 3;
        const CPU4 = 1 << 4;
        const CPU5 = 1 << 5;
        const CPU6 = 1 << 6;
        const CPU7 = 1 << 7;
        const ALL = 0xff;
    }
}

impl CpuMask {
    /// Mask with only `cpu` set, empty if `cpu` is not below [`NCPU`].
    pub fn cpu(cpu: usize) -> Self {
        if cpu >= NCPU {
            tracing::error!("cpu {cpu} does not exist, using an empty cpu mask");
            return Self::empty();
        }
        Self::from_bits_retain(1 << cpu)
    }

    /// Mask of the first `num_cpus` processors.
    #[inline]
    pub const fn first(num_cpus: usize) -> Self {
        if num_cpus >= NCPU {
            Self::ALL
        } else {
            Self::from_bits_retain((1 << num_cpus) - 1)
        }
    }

    #[inline]
    pub const fn has_cpu(self, cpu: usize) -> bool {
        cpu < NCPU && self.bits() & (1 << cpu) != 0
    }

    /// Iterates over the indices of the processors in the set.
    pub fn cpus(self) -> impl Iterator<Item = usize> {
        (0..NCPU).filter(move |cpu| self.has_cpu(*cpu))
    }
}

/// Signal sensitivity of an interrupt input.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TriggerMode {
    #[default]
    Edge,
    Level,
}

/// Distribution model of an interrupt.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RoutingModel {
    /// Every processor handles its own instance independently.
    #[default]
    NToN,
    /// A single instance; whichever target acknowledges first handles it.
    NTo1,
}

/// State of one interrupt ID.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IrqState {
    pub enabled: CpuMask,
    pub pending: CpuMask,
    pub active: CpuMask,
    pub level: CpuMask,
    pub signaled: CpuMask,
    pub model: RoutingModel,
    pub trigger: TriggerMode,
}

/// State bits of all [`NIRQ`] interrupt IDs.
#[derive(Debug)]
pub struct IrqStateStore {
    irqs: Vec<IrqState>,
}

impl Default for IrqStateStore {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! mask_field {
    ($set:ident, $is:ident, $field:ident) => {
        #[doc = concat!("Sets or clears the `", stringify!($field), "` bits selected by `mask`.")]
        pub fn $set(&mut self, irq: usize, value: bool, mask: CpuMask) {
            if let Some(state) = self.get_mut(irq) {
                state.$field.set(mask, value);
            }
        }

        #[doc = concat!("Whether any `", stringify!($field), "` bit selected by `mask` is set.")]
        pub fn $is(&self, irq: usize, mask: CpuMask) -> bool {
            self.get(irq).is_some_and(|state| state.$field.intersects(mask))
        }
    };
}

impl IrqStateStore {
    pub fn new() -> Self {
        Self {
            irqs: vec![IrqState::default(); NIRQ],
        }
    }

    /// Returns every interrupt to its power-on state.
    pub fn reset(&mut self) {
        self.irqs.fill(IrqState::default());
    }

    pub fn get(&self, irq: usize) -> Option<&IrqState> {
        let state = self.irqs.get(irq);
        if state.is_none() {
            tracing::error!("access to state of invalid irq {irq}");
        }
        state
    }

    fn get_mut(&mut self, irq: usize) -> Option<&mut IrqState> {
        let state = self.irqs.get_mut(irq);
        if state.is_none() {
            tracing::error!("update of state of invalid irq {irq}");
        }
        state
    }

    pub fn enable(&mut self, irq: usize, mask: CpuMask) {
        self.set_enabled(irq, true, mask);
    }

    pub fn disable(&mut self, irq: usize, mask: CpuMask) {
        self.set_enabled(irq, false, mask);
    }

    mask_field!(set_enabled, is_enabled, enabled);
    mask_field!(set_pending, is_pending, pending);
    mask_field!(set_active, is_active, active);
    mask_field!(set_level, is_level, level);
    mask_field!(set_signaled, is_signaled, signaled);

    pub fn set_trigger(&mut self, irq: usize, trigger: TriggerMode) {
        if let Some(state) = self.get_mut(irq) {
            state.trigger = trigger;
        }
    }

    pub fn trigger(&self, irq: usize) -> TriggerMode {
        self.get(irq).map(|s| s.trigger).unwrap_or_default()
    }

    pub fn set_model(&mut self, irq: usize, model: RoutingModel) {
        if let Some(state) = self.get_mut(irq) {
            state.model = model;
        }
    }

    pub fn model(&self, irq: usize) -> RoutingModel {
        self.get(irq).map(|s| s.model).unwrap_or_default()
    }

    /// The set of CPUs whose bits an acknowledge or deactivation of `irq` by
    /// `cpu` touches.
    pub fn model_mask(&self, irq: usize, cpu: usize) -> CpuMask {
        match self.model(irq) {
            RoutingModel::NTo1 => CpuMask::ALL,
            RoutingModel::NToN => CpuMask::cpu(cpu),
        }
    }

    /// Pending as seen by the arbiter: the latched pending bit, or an asserted
    /// level-sensitive input that has not been signaled yet.
    pub fn test_pending(&self, irq: usize, mask: CpuMask) -> bool {
        let Some(state) = self.get(irq) else {
            return false;
        };
        state.pending.intersects(mask)
            || (state.trigger == TriggerMode::Level
                && state.level.intersects(mask)
                && !state.signaled.intersects(mask))
    }
}
