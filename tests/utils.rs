// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

use gic400::{
    devices::gic400::{Gic400Config, Interface},
    machine::Machine,
    memory::Width,
};

#[macro_export]
macro_rules! assert_hex_eq {
    ($left: expr, $right: expr$(,)?) => {{
        let left: u64 = $left;
        let right: u64 = $right;
        assert_eq!(
            left,
            right,
            "Comparing {left_s} with {right_s} failed:\n0x{left:08x} {left_s}\n0x{right:08x} \
             {right_s}\n0b{left:032b} {left_s}\n0b{right:032b} {right_s}",
            left_s = stringify!($left),
            right_s = stringify!($right),
            left = left,
            right = right,
        );
    }};
}

#[allow(dead_code)]
pub fn make_test_machine(num_cpus: usize) -> Machine {
    Machine::new(Gic400Config {
        num_cpus,
        ..Gic400Config::default()
    })
    .unwrap()
}

#[allow(dead_code)]
pub fn read(machine: &Machine, interface: Interface, cpu: usize, offset: u64) -> u64 {
    let addr = machine.gic.config().base(interface) + offset;
    machine.read(cpu, addr, Width::_32).unwrap()
}

#[allow(dead_code)]
pub fn write(machine: &Machine, interface: Interface, cpu: usize, offset: u64, value: u64) {
    let addr = machine.gic.config().base(interface) + offset;
    machine.write(cpu, addr, value, Width::_32).unwrap();
}

#[allow(dead_code)]
pub fn write_byte(machine: &Machine, cpu: usize, offset: u64, value: u8) {
    let addr = machine.gic.config().base(Interface::Distributor) + offset;
    machine.write(cpu, addr, value.into(), Width::_8).unwrap();
}

/// Enables forwarding in the distributor and every CPU interface, with an
/// all-open priority mask.
#[allow(dead_code)]
pub fn enable_all(machine: &Machine) {
    write(machine, Interface::Distributor, 0, 0x000, 1);
    for cpu in 0..machine.gic.config().num_cpus {
        write(machine, Interface::CpuInterface, cpu, 0x00, 1);
        write(machine, Interface::CpuInterface, cpu, 0x04, 0xff);
    }
}
