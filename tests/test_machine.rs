// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

#[macro_use]
mod utils;

use gic400::{
    devices::{
        gic400::{registers::AMBA_IFID, Gic400Config, Interface, SPURIOUS_IRQ},
        MemoryTxError,
    },
    machine::{
        interrupts::{SignalEvent, SignalKind, SIGNAL_QUEUE_LEN},
        Machine,
    },
    memory::{Address, Width},
};
use utils::{enable_all, make_test_machine, read, write, write_byte};

#[test_log::test]
fn test_windows_are_mapped() {
    let machine = make_test_machine(2);
    // 96 SPIs: 4 blocks of 32 lines, 2 CPU interfaces
    assert_hex_eq!(read(&machine, Interface::Distributor, 0, 0x004), 0x23);
    assert_hex_eq!(
        read(&machine, Interface::CpuInterface, 1, 0xfc),
        AMBA_IFID.into()
    );
    assert_hex_eq!(read(&machine, Interface::VifControl, 0, 0x04), 0x9000_0003);
    // the virtual CPU interface aliases the CPU interface register layout
    assert_hex_eq!(
        read(&machine, Interface::VcpuInterface, 0, 0x18),
        SPURIOUS_IRQ.into()
    );

    let hole = Address(0x0800_1000);
    assert_eq!(
        machine.read(0, hole, Width::_32),
        Err(MemoryTxError::InvalidAddress(hole))
    );
    let dist = Gic400Config::default().distributor;
    assert_eq!(
        machine.read(0, dist + 0x4, Width::_64),
        Err(MemoryTxError::UnsupportedWidth {
            offset: 0x4,
            width: Width::_64
        })
    );
}

#[test_log::test]
fn test_relocated_windows() {
    let machine = Machine::new(Gic400Config {
        distributor: Address(0x2c00_1000),
        cpu_interface: Address(0x2c00_2000),
        vif_control: Address(0x2c00_4000),
        vcpu_interface: Address(0x2c00_6000),
        ..Gic400Config::default()
    })
    .unwrap();
    assert_hex_eq!(
        machine.read(0, Address(0x2c00_1004), Width::_32).unwrap(),
        0x3
    );
    assert!(machine.read(0, Address(0x0800_0004), Width::_32).is_err());

    let overlapping = Machine::new(Gic400Config {
        vif_control: Address(0x0801_1000),
        ..Gic400Config::default()
    });
    assert!(overlapping.is_err());
}

#[test_log::test]
fn test_spi_through_generator() {
    let machine = make_test_machine(2);
    enable_all(&machine);
    // spi 0 (irq 32), edge triggered, routed to cpu 1 at priority 0x20
    write_byte(&machine, 0, 0x800 + 32, 0b10);
    write_byte(&machine, 0, 0x400 + 32, 0x20);
    write(&machine, Interface::Distributor, 0, 0xc08, 0b10);
    write(&machine, Interface::Distributor, 0, 0x104, 1);

    machine.interrupt_generator().set_level(32, None, true);
    assert!(!machine.irq_line(1));
    assert!(machine.rcv());
    assert!(machine.irq_line(1));
    assert!(!machine.irq_line(0));
    assert_eq!(
        machine.drain_signals(),
        vec![SignalEvent {
            cpu: 1,
            kind: SignalKind::Irq,
            level: true
        }]
    );

    assert_hex_eq!(read(&machine, Interface::CpuInterface, 1, 0x0c), 32);
    assert!(!machine.irq_line(1));
    machine.interrupt_generator().set_level(32, None, false);
    machine.rcv();
    write(&machine, Interface::CpuInterface, 1, 0x10, 32);
    assert!(!machine.irq_line(1));
    assert_eq!(
        machine.drain_signals(),
        vec![SignalEvent {
            cpu: 1,
            kind: SignalKind::Irq,
            level: false
        }]
    );
    assert!(!machine.rcv());
}

#[test_log::test]
fn test_ppi_is_private() {
    let machine = make_test_machine(2);
    enable_all(&machine);
    // enable ppi 11 (irq 27) on both cpus
    write(&machine, Interface::Distributor, 0, 0x100, 1 << 27);
    write(&machine, Interface::Distributor, 1, 0x100, 1 << 27);
    write_byte(&machine, 0, 0x400 + 27, 0x80);
    write_byte(&machine, 1, 0x400 + 27, 0x80);

    machine.interrupt_generator().set_level(27, Some(1), true);
    machine.rcv();
    assert!(!machine.irq_line(0));
    assert!(machine.irq_line(1));
    assert_hex_eq!(
        read(&machine, Interface::CpuInterface, 0, 0x18),
        SPURIOUS_IRQ.into()
    );
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 1, 0x18), 27);
    // ITARGETSR of a private interrupt reads as the reading cpu
    assert_hex_eq!(read(&machine, Interface::Distributor, 1, 0x818), 0x0202_0202);
}

#[test_log::test]
fn test_sgi_between_cpus() {
    let machine = make_test_machine(2);
    enable_all(&machine);
    write_byte(&machine, 1, 0x400 + 2, 0x10);
    // cpu 0 sends sgi 2 to cpu 1
    write(&machine, Interface::Distributor, 0, 0xf00, (0b10 << 16) | 2);
    assert!(machine.irq_line(1));
    assert!(!machine.irq_line(0));
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 1, 0x0c), 2);
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 1, 0x14), 0x10);
    write(&machine, Interface::CpuInterface, 1, 0x10, 2);
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 1, 0x14), 0xff);
}

#[test_log::test]
fn test_reset_through_handle() {
    let machine = make_test_machine(1);
    enable_all(&machine);
    write(&machine, Interface::Distributor, 0, 0xf00, (0b10 << 24) | 1);
    assert!(machine.irq_line(0));
    machine.gic.reset();
    assert!(!machine.irq_line(0));
    assert_hex_eq!(read(&machine, Interface::Distributor, 0, 0x000), 0);
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 0, 0x04), 0);
    assert_hex_eq!(read(&machine, Interface::CpuInterface, 0, 0x08), 2);
    assert_hex_eq!(read(&machine, Interface::Distributor, 0, 0x100), 0xffff);
}

#[test_log::test]
fn test_signal_queue_is_bounded() {
    let machine = make_test_machine(1);
    enable_all(&machine);
    write(&machine, Interface::Distributor, 0, 0xf00, (0b10 << 24) | 1);
    assert!(machine.irq_line(0));
    // every disable/enable pair of the CPU interface toggles the line twice
    for _ in 0..SIGNAL_QUEUE_LEN {
        write(&machine, Interface::CpuInterface, 0, 0x00, 0);
        write(&machine, Interface::CpuInterface, 0, 0x00, 1);
    }
    assert!(machine.irq_line(0));
    let events = machine.drain_signals();
    assert_eq!(events.len(), SIGNAL_QUEUE_LEN);
    assert_eq!(
        events[0],
        SignalEvent {
            cpu: 0,
            kind: SignalKind::Irq,
            level: true
        }
    );
    assert!(machine.drain_signals().is_empty());

    // the queue accepts changes again once drained
    write(&machine, Interface::CpuInterface, 0, 0x00, 0);
    assert_eq!(
        machine.drain_signals(),
        vec![SignalEvent {
            cpu: 0,
            kind: SignalKind::Irq,
            level: false
        }]
    );
}
