// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

#[macro_use]
mod utils;

use gic400::{
    devices::gic400::{Interface, SPURIOUS_IRQ},
    machine::interrupts::{SignalEvent, SignalKind},
};
use utils::{enable_all, make_test_machine, read, write, write_byte};

const GICH_HCR: u64 = 0x00;
const GICH_ELRSR0: u64 = 0x30;
const GICH_APR: u64 = 0xf0;
const GICH_LR0: u64 = 0x100;

const GICV_CTLR: u64 = 0x00;
const GICV_PMR: u64 = 0x04;
const GICV_IAR: u64 = 0x0c;
const GICV_EOIR: u64 = 0x10;
const GICV_RPR: u64 = 0x14;
const GICV_HPPIR: u64 = 0x18;
const GICV_APR0: u64 = 0xd0;

fn list_register(virtual_id: u64, priority: u64, state: u64) -> u64 {
    (state << 28) | (priority << 23) | virtual_id
}

/// Guest receives a physical SPI forwarded by the hypervisor through a
/// hardware list register, and its EOI deactivates the physical interrupt.
#[test_log::test]
fn test_forwarded_hardware_interrupt() {
    let machine = make_test_machine(1);
    enable_all(&machine);
    // spi 4 (irq 36) level triggered, routed to cpu 0
    write_byte(&machine, 0, 0x800 + 36, 1);
    write_byte(&machine, 0, 0x400 + 36, 0xa0);
    write(&machine, Interface::Distributor, 0, 0x104, 1 << 4);
    machine.gic.handle_spi(4, true);
    assert!(machine.irq_line(0));

    // hypervisor takes it and leaves it active
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 0, 0x0c), 36);
    assert!(!machine.irq_line(0));
    machine.gic.handle_spi(4, false);
    assert_hex_eq!(read(&machine, Interface::Distributor, 0, 0x304), 1 << 4);

    // and injects it as virtual irq 36
    write(&machine, Interface::VifControl, 0, GICH_HCR, 1);
    write(&machine, Interface::VcpuInterface, 0, GICV_CTLR, 1);
    write(&machine, Interface::VcpuInterface, 0, GICV_PMR, 0xf8);
    let lr = (1 << 31) | (36 << 10) | list_register(36, 0x14, 1);
    write(&machine, Interface::VifControl, 0, GICH_LR0, lr);
    assert!(machine.virq_line(0));
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_HPPIR), 36);
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_IAR), 36);
    assert!(!machine.virq_line(0));
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_RPR), 0xa0);

    write(&machine, Interface::VcpuInterface, 0, GICV_EOIR, 36);
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_RPR), 0xff);
    assert_hex_eq!(read(&machine, Interface::VifControl, 0, GICH_ELRSR0), 0b1111);
    assert_hex_eq!(read(&machine, Interface::Distributor, 0, 0x304), 0);
}

#[test_log::test]
fn test_virtual_interface_disabled() {
    let machine = make_test_machine(2);
    write(&machine, Interface::VcpuInterface, 1, GICV_PMR, 0xf8);
    write(
        &machine,
        Interface::VifControl,
        1,
        GICH_LR0 + 8,
        list_register(70, 0x02, 1),
    );
    assert!(!machine.virq_line(1));
    assert_hex_eq!(
        read(&machine, Interface::VcpuInterface, 1, GICV_HPPIR),
        SPURIOUS_IRQ.into()
    );

    write(&machine, Interface::VifControl, 1, GICH_HCR, 1);
    assert!(machine.virq_line(1));
    assert!(!machine.virq_line(0));
    write(&machine, Interface::VifControl, 1, GICH_HCR, 0);
    assert!(!machine.virq_line(1));
    assert_eq!(
        machine.drain_signals(),
        vec![
            SignalEvent {
                cpu: 1,
                kind: SignalKind::VirtualIrq,
                level: true
            },
            SignalEvent {
                cpu: 1,
                kind: SignalKind::VirtualIrq,
                level: false
            },
        ]
    );
}

#[test_log::test]
fn test_active_priorities_alias() {
    let machine = make_test_machine(1);
    write(&machine, Interface::VifControl, 0, GICH_HCR, 1);
    write(&machine, Interface::VcpuInterface, 0, GICV_PMR, 0xf8);
    // a saved context with priority group 0x40 in flight
    write(&machine, Interface::VcpuInterface, 0, GICV_APR0, 1 << 8);
    assert_hex_eq!(read(&machine, Interface::VifControl, 0, GICH_APR), 1 << 8);
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_RPR), 0x40);

    // same priority cannot preempt, higher can
    write(
        &machine,
        Interface::VifControl,
        0,
        GICH_LR0,
        list_register(50, 0x08, 1),
    );
    assert!(!machine.virq_line(0));
    write(
        &machine,
        Interface::VifControl,
        0,
        GICH_LR0 + 4,
        list_register(51, 0x07, 1),
    );
    assert!(machine.virq_line(0));
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_HPPIR), 51);

    write(&machine, Interface::VifControl, 0, GICH_APR, 0);
    assert_hex_eq!(read(&machine, Interface::VcpuInterface, 0, GICV_RPR), 0xff);
    assert!(machine.virq_line(0));
}
