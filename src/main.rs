// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

use gic400::{
    fdt::build_gic_fdt,
    machine::{interrupts::SignalKind, Machine},
    replay::Script,
    tracing::{self, LevelFilter, Output},
};

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse()?;
    let log_level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let output = match args.log_file {
        Some(ref path) => Output::File(std::fs::File::create(path)?),
        None => Output::Stderr,
    };
    let _tracing_guard = tracing::init(
        log_level,
        output,
        true,
        args.trace.iter().copied().collect(),
    )?;

    let machine = Machine::new(args.gic_config())?;
    tracing::info!("GIC-400 with {} cpus, {} spis", args.cpus, args.spis);

    if let Some(ref path) = args.dtb {
        let fdt = build_gic_fdt(&machine.gic)?;
        std::fs::write(path, fdt.bytes)?;
        tracing::info!("wrote device tree to {}", path.display());
    }

    if let Some(ref path) = args.script {
        let script = Script::load(path)?;
        script.run(&machine)?;
        for event in machine.drain_signals() {
            tracing::debug!("{event:?}");
        }
        for cpu in 0..args.cpus {
            let lock = machine.gic.lock();
            println!(
                "cpu {cpu}: irq {} virq {}",
                u8::from(lock.output(cpu, SignalKind::Irq)),
                u8::from(lock.output(cpu, SignalKind::VirtualIrq)),
            );
        }
    }
    Ok(())
}
