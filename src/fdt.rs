// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Flattened device-tree (FDT) blob generation.

pub use vm_fdt::FdtWriter;

use crate::devices::gic400::Gic400;

/// Phandle of the interrupt controller node.
pub const PHANDLE_GIC: u32 = 0x8002;

/// A generated FDT.
#[derive(Clone, Debug)]
pub struct Fdt {
    /// Blob
    pub bytes: Vec<u8>,
}

/// Builds a blob with a root node describing `gic` as the interrupt parent
/// of the board, its CPUs and the architected timer wired to its PPIs.
pub fn build_gic_fdt(gic: &Gic400) -> Result<Fdt, Box<dyn std::error::Error>> {
    let mut fdt = FdtWriter::new()?;
    let root_node = fdt.begin_node("")?;
    fdt.property_u32("interrupt-parent", PHANDLE_GIC)?;
    fdt.property_string("model", "linux,dummy-virt")?;
    fdt.property_string("compatible", "linux,dummy-virt")?;
    fdt.property_u32("#address-cells", 0x2)?;
    fdt.property_u32("#size-cells", 0x2)?;

    gic.write_device_tree_node(&mut fdt, PHANDLE_GIC)?;
    {
        let cpus_node = fdt.begin_node("cpus")?;
        fdt.property_u32("#address-cells", 0x1)?;
        fdt.property_u32("#size-cells", 0x0)?;

        for cpu_id in 0..gic.config().num_cpus as u32 {
            let cpu_node = fdt.begin_node(&format!("cpu@{cpu_id:x}"))?;
            fdt.property_string("device_type", "cpu")?;
            fdt.property_string("compatible", "arm,arm-v8")?;
            fdt.property_u32("reg", cpu_id)?;
            fdt.end_node(cpu_node)?;
        }
        fdt.end_node(cpus_node)?;
    }
    {
        // secure, non-secure, virtual and hypervisor timers
        let cpu_mask = (1_u32 << gic.config().num_cpus) - 1;
        let flags = (cpu_mask << 8) | 0x4;
        let timer_node = fdt.begin_node("timer")?;
        let interrupts = [
            0x01, 0x0d, flags, 0x01, 0x0e, flags, 0x01, 0x0b, flags, 0x01, 0x0a, flags,
        ];
        fdt.property_array_u32("interrupts", &interrupts)?;
        fdt.property_null("always-on")?;
        fdt.property_string("compatible", "arm,armv8-timer")?;
        fdt.end_node(timer_node)?;
    }
    fdt.end_node(root_node)?;

    Ok(Fdt {
        bytes: fdt.finish()?,
    })
}
