// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Scenario replay.
//!
//! A script is a JSON array of steps run in order against a [`Machine`]:
//!
//! ```json
//! [
//!   { "op": "write", "interface": "distributor", "cpu": 0, "offset": 0, "value": 1 },
//!   { "op": "ppi", "cpu": 0, "index": 0, "level": true },
//!   { "op": "expect_irq", "cpu": 0, "level": true },
//!   { "op": "read", "interface": "cpu_interface", "cpu": 0, "offset": 12, "expect": 16 }
//! ]
//! ```

use serde_derive::Deserialize;

use crate::{
    devices::{
        gic400::{Interface, NPPI, NPRIV, NSGI},
        MemoryTxError,
    },
    machine::Machine,
    memory::{Address, Width},
    tracing,
};

fn default_width() -> u8 {
    32
}

/// One scenario step.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Register write issued by `cpu`.
    Write {
        interface: Interface,
        cpu: usize,
        offset: u64,
        value: u64,
        #[serde(default = "default_width")]
        width: u8,
    },
    /// Register read issued by `cpu`, optionally checked against `expect`.
    Read {
        interface: Interface,
        cpu: usize,
        offset: u64,
        #[serde(default)]
        expect: Option<u64>,
        #[serde(default = "default_width")]
        width: u8,
    },
    /// Level change of private peripheral input `index` of `cpu`.
    Ppi { cpu: u8, index: u16, level: bool },
    /// Level change of shared peripheral input `index`.
    Spi { index: u16, level: bool },
    /// Checks the IRQ output of `cpu`.
    ExpectIrq { cpu: usize, level: bool },
    /// Checks the virtual IRQ output of `cpu`.
    ExpectVirq { cpu: usize, level: bool },
}

#[derive(Debug)]
pub enum ReplayError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidWidth {
        step: usize,
        bits: u8,
    },
    Bus {
        step: usize,
        error: MemoryTxError,
    },
    Mismatch {
        step: usize,
        what: String,
        expected: u64,
        actual: u64,
    },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(fmt, "could not read script: {err}"),
            Self::Parse(err) => write!(fmt, "could not parse script: {err}"),
            Self::InvalidWidth { step, bits } => {
                write!(fmt, "step {step}: invalid access width {bits}")
            }
            Self::Bus { step, error } => write!(fmt, "step {step}: {error}"),
            Self::Mismatch {
                step,
                what,
                expected,
                actual,
            } => write!(
                fmt,
                "step {step}: {what} is {actual:#x}, expected {expected:#x}"
            ),
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Bus { error, .. } => Some(error),
            Self::InvalidWidth { .. } | Self::Mismatch { .. } => None,
        }
    }
}

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// An ordered list of steps.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ReplayError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Runs every step, stopping at the first failed one.
    pub fn run(&self, machine: &Machine) -> Result<(), ReplayError> {
        for (step, op) in self.steps.iter().enumerate() {
            tracing::event!(
                target: tracing::TraceItem::Replay.as_str(),
                tracing::Level::DEBUG,
                step,
                ?op,
            );
            run_step(machine, step, op)?;
        }
        Ok(())
    }
}

fn width(step: usize, bits: u8) -> Result<Width, ReplayError> {
    Width::try_from(bits).map_err(|bits| ReplayError::InvalidWidth { step, bits })
}

fn address(step: usize, base: Address, offset: u64) -> Result<Address, ReplayError> {
    base.checked_add(offset).ok_or(ReplayError::Bus {
        step,
        error: MemoryTxError::InvalidAddress(Address(base.0.wrapping_add(offset))),
    })
}

fn expect_level(
    step: usize,
    what: String,
    expected: bool,
    actual: bool,
) -> Result<(), ReplayError> {
    if expected != actual {
        return Err(ReplayError::Mismatch {
            step,
            what,
            expected: expected.into(),
            actual: actual.into(),
        });
    }
    Ok(())
}

fn run_step(machine: &Machine, step: usize, op: &Step) -> Result<(), ReplayError> {
    let config = *machine.gic.config();
    match *op {
        Step::Write {
            interface,
            cpu,
            offset,
            value,
            width: bits,
        } => {
            let addr = address(step, config.base(interface), offset)?;
            machine
                .write(cpu, addr, value, width(step, bits)?)
                .map_err(|error| ReplayError::Bus { step, error })?;
        }
        Step::Read {
            interface,
            cpu,
            offset,
            expect,
            width: bits,
        } => {
            let addr = address(step, config.base(interface), offset)?;
            let actual = machine
                .read(cpu, addr, width(step, bits)?)
                .map_err(|error| ReplayError::Bus { step, error })?;
            if let Some(expected) = expect {
                if expected != actual {
                    return Err(ReplayError::Mismatch {
                        step,
                        what: format!("{interface} register {offset:#x} read by cpu {cpu}"),
                        expected,
                        actual,
                    });
                }
            }
        }
        Step::Ppi { cpu, index, level } => {
            if usize::from(index) >= NPPI {
                // would alias a shared line through the interrupt ID space
                machine.gic.handle_ppi(cpu.into(), index.into(), level);
                return Ok(());
            }
            machine
                .interrupt_generator()
                .set_level(NSGI as u16 + index, Some(cpu), level);
            machine.rcv();
        }
        Step::Spi { index, level } => {
            machine
                .interrupt_generator()
                .set_level(index.saturating_add(NPRIV as u16), None, level);
            machine.rcv();
        }
        Step::ExpectIrq { cpu, level } => {
            expect_level(step, format!("cpu {cpu} irq line"), level, machine.irq_line(cpu))?;
        }
        Step::ExpectVirq { cpu, level } => {
            expect_level(
                step,
                format!("cpu {cpu} virtual irq line"),
                level,
                machine.virq_line(cpu),
            )?;
        }
    }
    Ok(())
}
