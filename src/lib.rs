// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Register-level model of the Arm GIC-400 generic interrupt controller.
//!
//! The controller ([`devices::gic400::Gic400`]) is mapped on a bus
//! ([`memory::MemoryMap`]) as four register windows and driven by interrupt
//! input lines ([`machine::interrupts`]). [`machine::Machine`] wires these
//! together; [`replay`] runs JSON scenarios against it.

pub mod devices;
pub mod fdt;
pub mod machine;
pub mod memory;
pub mod replay;
pub mod tracing;
