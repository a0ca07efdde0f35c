// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

mod utils;

use std::path::Path;

use gic400::{
    devices::MemoryTxError,
    memory::Address,
    replay::{ReplayError, Script},
};
use utils::make_test_machine;

#[test_log::test]
fn test_ppi_preemption_scenario() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scenarios/ppi_preemption.json");
    let script = Script::load(&path).unwrap();
    let machine = make_test_machine(1);
    script.run(&machine).unwrap();
    assert!(!machine.irq_line(0));
}

#[test_log::test]
fn test_failed_expectation() {
    let machine = make_test_machine(2);
    let script = Script::from_json(
        r#"[
            { "op": "write", "interface": "distributor", "cpu": 0, "offset": 0, "value": 1 },
            { "op": "write", "interface": "cpu_interface", "cpu": 1, "offset": 0, "value": 1 },
            { "op": "write", "interface": "cpu_interface", "cpu": 1, "offset": 4, "value": 240 },
            { "op": "write", "interface": "distributor", "cpu": 0, "offset": 3840, "value": 131075 },
            { "op": "expect_irq", "cpu": 1, "level": true },
            { "op": "read", "interface": "cpu_interface", "cpu": 1, "offset": 24, "expect": 4 }
        ]"#,
    )
    .unwrap();
    match script.run(&machine) {
        Err(ReplayError::Mismatch {
            step: 5,
            expected: 4,
            actual: 3,
            ..
        }) => {}
        other => panic!("unexpected result {other:?}"),
    }
}

#[test_log::test]
fn test_bus_errors() {
    let machine = make_test_machine(1);
    let script = Script::from_json(
        r#"[{ "op": "read", "interface": "distributor", "cpu": 0, "offset": 4096 }]"#,
    )
    .unwrap();
    match script.run(&machine) {
        Err(ReplayError::Bus {
            step: 0,
            error: MemoryTxError::InvalidAddress(Address(0x0800_1000)),
        }) => {}
        other => panic!("unexpected result {other:?}"),
    }

    let script = Script::from_json(
        r#"[{ "op": "write", "interface": "vif_control", "cpu": 0, "offset": 0, "value": 1, "width": 12 }]"#,
    )
    .unwrap();
    assert!(matches!(
        script.run(&machine),
        Err(ReplayError::InvalidWidth { step: 0, bits: 12 })
    ));
    assert!(matches!(
        Script::load(Path::new("/nonexistent/scenario.json")),
        Err(ReplayError::Io(_))
    ));
}

#[test_log::test]
fn test_offset_overflow() {
    let machine = make_test_machine(1);
    let script = Script::from_json(
        r#"[
            { "op": "write", "interface": "distributor", "cpu": 0, "offset": 0, "value": 1 },
            { "op": "read", "interface": "distributor", "cpu": 0, "offset": 18446744073709551615 }
        ]"#,
    )
    .unwrap();
    match script.run(&machine) {
        Err(ReplayError::Bus {
            step: 1,
            error: MemoryTxError::InvalidAddress(Address(0x07ff_ffff)),
        }) => {}
        other => panic!("unexpected result {other:?}"),
    }

    let script = Script::from_json(
        r#"[{ "op": "write", "interface": "vcpu_interface", "cpu": 0, "offset": 18446744073709551615, "value": 0 }]"#,
    )
    .unwrap();
    assert!(matches!(
        script.run(&machine),
        Err(ReplayError::Bus {
            step: 0,
            error: MemoryTxError::InvalidAddress(_),
        })
    ));
}
