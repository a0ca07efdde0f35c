// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

use std::{borrow::Cow, path::PathBuf};

use clap::Parser;
use gic400::{
    devices::gic400::{Gic400Config, NCPU, NSPI},
    memory::Address,
    tracing::TraceItem,
};

fn maybe_hex(s: &str) -> Result<Address, Cow<'static, str>> {
    const HEX_PREFIX: &str = "0x";
    const HEX_PREFIX_UPPER: &str = "0X";
    const HEX_PREFIX_LEN: usize = HEX_PREFIX.len();

    let result = if s.starts_with(HEX_PREFIX) || s.starts_with(HEX_PREFIX_UPPER) {
        u64::from_str_radix(&s[HEX_PREFIX_LEN..], 16)
    } else {
        s.parse::<u64>()
    };

    result
        .map(Address)
        .map_err(|err| Cow::Owned(err.to_string()))
}

/// GIC-400 interrupt controller model
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Emit every trace event of the given subsystems.
    #[arg(long, value_enum, num_args = 1..)]
    pub trace: Vec<TraceItem>,
    /// Write logs to this file instead of standard error.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// Number of connected CPUs.
    #[arg(long, default_value_t = 1)]
    pub cpus: usize,
    /// Number of connected shared peripheral interrupts.
    #[arg(long, default_value_t = 96)]
    pub spis: usize,
    /// Hexadecimal or decimal base address of the distributor.
    #[arg(long, default_value_t = Gic400Config::default().distributor, value_parser = maybe_hex)]
    pub distributor: Address,
    /// Hexadecimal or decimal base address of the CPU interface.
    #[arg(long, default_value_t = Gic400Config::default().cpu_interface, value_parser = maybe_hex)]
    pub cpu_interface: Address,
    /// Hexadecimal or decimal base address of the virtual interface control.
    #[arg(long, default_value_t = Gic400Config::default().vif_control, value_parser = maybe_hex)]
    pub vif_control: Address,
    /// Hexadecimal or decimal base address of the virtual CPU interface.
    #[arg(long, default_value_t = Gic400Config::default().vcpu_interface, value_parser = maybe_hex)]
    pub vcpu_interface: Address,
    /// Write a device tree blob describing the controller to this path.
    #[arg(long, value_name = "PATH")]
    pub dtb: Option<PathBuf>,

    /// Path to a JSON scenario to replay.
    #[arg(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,
}

impl Args {
    /// Parse command-line arguments from the process environment.
    pub fn parse() -> Result<Self, String> {
        let retval = <Self as clap::Parser>::parse();
        if retval.cpus == 0 || retval.cpus > NCPU {
            return Err(format!(
                "Invalid arguments: --cpus must be between 1 and {NCPU}, got {}.",
                retval.cpus
            ));
        }
        if retval.spis > NSPI {
            return Err(format!(
                "Invalid arguments: --spis must be at most {NSPI}, got {}.",
                retval.spis
            ));
        }
        Ok(retval)
    }

    pub fn gic_config(&self) -> Gic400Config {
        Gic400Config {
            num_cpus: self.cpus,
            num_spis: self.spis,
            distributor: self.distributor,
            cpu_interface: self.cpu_interface,
            vif_control: self.vif_control,
            vcpu_interface: self.vcpu_interface,
        }
    }
}
