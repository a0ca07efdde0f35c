// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Tracing targets, value formatting helpers and subscriber setup.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

pub use ::tracing::{debug, error, event, info, trace, warn, Level};
pub use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{prelude::*, reload, Layer};

#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum TraceItem {
    Arbiter,
    CpuInterface,
    Distributor,
    Memory,
    Replay,
    VcpuInterface,
    VifControl,
}

impl TraceItem {
    pub const POSSIBLE_VALUES: &[Self] = &[
        Self::Arbiter,
        Self::CpuInterface,
        Self::Distributor,
        Self::Memory,
        Self::Replay,
        Self::VcpuInterface,
        Self::VifControl,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Arbiter => "arbiter",
            Self::CpuInterface => "cpu_interface",
            Self::Distributor => "distributor",
            Self::Memory => "memory",
            Self::Replay => "replay",
            Self::VcpuInterface => "vcpu_interface",
            Self::VifControl => "vif_control",
        }
    }
}

impl std::fmt::Display for TraceItem {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

impl std::str::FromStr for TraceItem {
    type Err = Box<dyn std::error::Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for i in Self::POSSIBLE_VALUES.iter() {
            if i.as_str() == s {
                return Ok(*i);
            }
        }
        Err(Box::<dyn std::error::Error>::from(format!(
            "Expected one of {}",
            Self::POSSIBLE_VALUES
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<&str>>()
                .join(", ")
        )))
    }
}

/// Formats an integer as `0x..` in trace fields.
#[derive(Clone, Copy)]
pub struct Hex<T>(pub T);

impl<T: std::fmt::LowerHex> std::fmt::Debug for Hex<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{:#x}", self.0)
    }
}

/// Formats an integer both as hex and binary in trace fields.
#[derive(Clone, Copy)]
pub struct BinaryHex<T>(pub T);

impl<T: std::fmt::LowerHex + std::fmt::Binary> std::fmt::Debug for BinaryHex<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{:#x} ({:#b})", self.0, self.0)
    }
}

#[derive(Debug)]
pub enum Output {
    Stdout,
    Stderr,
    File(std::fs::File),
}

impl std::io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdout => std::io::stdout().lock().write(buf),
            Self::Stderr => std::io::stderr().lock().write(buf),
            Self::File(ref mut f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout => std::io::stdout().lock().flush(),
            Self::Stderr => std::io::stderr().lock().flush(),
            Self::File(ref mut f) => f.flush(),
        }
    }
}

type ReloadHandle =
    tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

pub struct TracingGuard {
    current_level: Mutex<LevelFilter>,
    events: Arc<Mutex<BTreeSet<TraceItem>>>,
    #[allow(dead_code)]
    worker_guard: tracing_appender::non_blocking::WorkerGuard,
    reload_handle: ReloadHandle,
}

impl TracingGuard {
    pub fn current_level(&self) -> LevelFilter {
        *self
            .current_level
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_events(
        &self,
        events: BTreeSet<TraceItem>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = events;
        self.change_level(self.current_level())
    }

    pub fn change_level(&self, value: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
        let new_filter = {
            let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            Self::generate_env_filter(value, &events)?
        };
        self.reload_handle.modify(|filter| {
            *filter = new_filter;
        })?;
        *self
            .current_level
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    fn generate_env_filter(
        level: LevelFilter,
        events: &BTreeSet<TraceItem>,
    ) -> Result<tracing_subscriber::EnvFilter, Box<dyn std::error::Error>> {
        let mut env_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env()
            .unwrap_or_default();
        for item in TraceItem::POSSIBLE_VALUES {
            let directive = if events.contains(item) {
                format!("{item}=trace")
            } else {
                format!("{item}={level}")
            };
            env_filter = env_filter.add_directive(directive.parse()?);
        }
        Ok(env_filter)
    }
}

/// Installs the global subscriber. Events of the items in `events` are
/// always emitted at `TRACE`, every other target follows `log_level`.
pub fn init(
    log_level: LevelFilter,
    output: Output,
    ansi: bool,
    events: BTreeSet<TraceItem>,
) -> Result<TracingGuard, Box<dyn std::error::Error>> {
    let env_filter = TracingGuard::generate_env_filter(log_level, &events)?;
    let (env_filter, reload_handle) = reload::Layer::new(env_filter);
    let (log_layer, worker_guard) = match output {
        Output::File(_) => {
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(output);
            (
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .and_then(env_filter)
                    .boxed(),
                worker_guard,
            )
        }
        Output::Stdout | Output::Stderr => {
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(output);
            (
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(ansi)
                    .and_then(env_filter)
                    .boxed(),
                worker_guard,
            )
        }
    };

    tracing_subscriber::registry().with(log_layer).try_init()?;
    Ok(TracingGuard {
        events: Arc::new(Mutex::new(events)),
        current_level: Mutex::new(log_level),
        worker_guard,
        reload_handle,
    })
}
