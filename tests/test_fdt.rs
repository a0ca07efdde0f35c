// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

mod utils;

use gic400::fdt::build_gic_fdt;
use utils::make_test_machine;

const FDT_MAGIC: u32 = 0xd00d_feed;

fn find(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test_log::test]
fn test_gic_node() {
    let machine = make_test_machine(4);
    let fdt = build_gic_fdt(&machine.gic).unwrap();
    assert_eq!(
        u32::from_be_bytes(fdt.bytes[..4].try_into().unwrap()),
        FDT_MAGIC
    );
    assert!(find(&fdt.bytes, b"interrupt-controller@8000000\0"));
    assert!(find(&fdt.bytes, b"arm,gic-400\0"));
    assert!(find(&fdt.bytes, b"cpu@3\0"));
    assert!(!find(&fdt.bytes, b"cpu@4\0"));
    // maintenance interrupt: PPI 9, level high, delivered to cpus 0-3
    let maintenance = [1_u32, 9, 0xf04]
        .iter()
        .flat_map(|cell| cell.to_be_bytes())
        .collect::<Vec<u8>>();
    assert!(find(&fdt.bytes, &maintenance));
}
