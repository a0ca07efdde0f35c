// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the gic400 project.

//! Interrupt line plumbing

use std::{
    collections::BTreeMap,
    sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
};

use crate::tracing;

/// Level change of an interrupt input line.
///
/// IDs below 32 are private to `cpu_id`, higher IDs are shared lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InterruptRequest {
    pub interrupt_id: u16,
    pub cpu_id: Option<u8>,
    pub signal: bool,
}

#[derive(Debug, Clone)]
pub struct InterruptGenerator {
    pub irq_sender: SyncSender<InterruptRequest>,
}

impl InterruptGenerator {
    /// Queues a level change; it takes effect on the next [`Interrupts::rcv`].
    pub fn set_level(&self, interrupt_id: u16, cpu_id: Option<u8>, signal: bool) {
        let req = InterruptRequest {
            interrupt_id,
            cpu_id,
            signal,
        };
        if let Err(err) = self.irq_sender.try_send(req) {
            tracing::warn!("dropped interrupt request {req:?}: {err}");
        }
    }
}

/// Processor input driven by the interrupt controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalKind {
    Irq,
    VirtualIrq,
}

/// A change of one output line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalEvent {
    pub cpu: usize,
    pub kind: SignalKind,
    pub level: bool,
}

/// Number of output line changes kept until [`Interrupts::drain_signals`]
/// is called. Later changes are dropped.
pub const SIGNAL_QUEUE_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct CpuSignal {
    sender: SyncSender<SignalEvent>,
}

impl CpuSignal {
    pub fn send(&self, event: SignalEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("signal queue full, dropped {event:?}");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("no listener for {event:?}");
            }
        }
    }
}

pub struct Interrupts {
    pub generator: InterruptGenerator,
    generator_rcv: Receiver<InterruptRequest>,
    subscribers: BTreeMap<u64, Box<dyn Fn(InterruptRequest) + Send + Sync>>,
    signal_rcv: Receiver<SignalEvent>,
    signal_sender: CpuSignal,
}

impl std::fmt::Debug for Interrupts {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Interrupts")
            .field("generator", &self.generator)
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Interrupts {
    pub fn new() -> Self {
        let (irq_sender, generator_rcv) = sync_channel(1024 * 1024);
        let generator = InterruptGenerator { irq_sender };
        let (sender, signal_rcv) = sync_channel(SIGNAL_QUEUE_LEN);
        let signal_sender = CpuSignal { sender };
        Self {
            generator,
            generator_rcv,
            subscribers: BTreeMap::default(),
            signal_rcv,
            signal_sender,
        }
    }

    /// Receive and route any interrupts
    pub fn rcv(&self) -> bool {
        let mut any = false;

        while let Ok(irq) = self.generator_rcv.try_recv() {
            for sub in self.subscribers.values() {
                (sub)(irq);
            }

            any = true;
        }
        any
    }

    pub fn cpu_signal(&self) -> CpuSignal {
        self.signal_sender.clone()
    }

    /// Output line changes published since the last call, oldest first, at
    /// most [`SIGNAL_QUEUE_LEN`] of them.
    pub fn drain_signals(&self) -> Vec<SignalEvent> {
        self.signal_rcv.try_iter().collect()
    }

    pub fn subscribe(
        &mut self,
        device_id: u64,
        handler: Box<dyn Fn(InterruptRequest) + Send + Sync>,
    ) {
        if self.subscribers.insert(device_id, handler).is_some() {
            tracing::warn!("device {device_id} replaced its interrupt request handler");
        }
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}
