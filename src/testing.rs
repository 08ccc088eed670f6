//! Host-side doubles for the board collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::HART_COUNT;
use crate::console::{Console, ConsoleSink};
use crate::engine::{Engine, Platform};
use crate::env::Env;
use crate::hart::HartId;
use crate::ipi::{Transactions, Transport};
use crate::platform::{Doorbell, HartControl, InterruptControl, NoInterrupts};
use crate::time::SoftClock;

pub fn hart(id: u8) -> HartId {
    HartId::new_const(id)
}

/// Console sink that keeps everything written to it and replays fed input. Clones share both
/// buffers.
#[derive(Clone, Default)]
pub struct RecordingSink {
    output: Arc<Mutex<Vec<u8>>>,
    input: Arc<Mutex<VecDeque<u8>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.output.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Queues bytes as if typed on the console.
    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes);
    }
}

impl ConsoleSink for RecordingSink {
    fn write(&mut self, bytes: &[u8]) {
        self.output.lock().unwrap().extend_from_slice(bytes);
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut input = self.input.lock().unwrap();
        let count = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..count)) {
            *slot = byte;
        }
        count
    }
}

/// Interrupt control that tracks a single enable bit.
pub struct CountingIrq {
    enabled: AtomicBool,
}

impl CountingIrq {
    pub const fn new() -> Self {
        CountingIrq {
            enabled: AtomicBool::new(true),
        }
    }

    pub fn masked(&self) -> bool {
        !self.enabled.load(Ordering::SeqCst)
    }
}

impl InterruptControl for CountingIrq {
    fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    fn restore(&self, was_enabled: bool) {
        self.enabled.store(was_enabled, Ordering::SeqCst);
    }
}

/// Doorbell that counts rings per hart.
pub struct RingLog([AtomicU32; HART_COUNT]);

impl RingLog {
    pub const fn new() -> Self {
        RingLog([const { AtomicU32::new(0) }; HART_COUNT])
    }

    pub fn rings(&self, hart: HartId) -> u32 {
        self.0[hart.index()].load(Ordering::SeqCst)
    }
}

impl Doorbell for RingLog {
    fn ring(&self, hart: HartId) {
        self.0[hart.index()].fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HartEvent {
    Release(HartId),
    Hold(HartId),
}

/// Reset control that only records what it was asked to do.
#[derive(Default)]
pub struct FakeHarts {
    pub events: Vec<HartEvent>,
}

impl FakeHarts {
    pub fn releases(&self, hart: HartId) -> usize {
        self.events
            .iter()
            .filter(|event| **event == HartEvent::Release(hart))
            .count()
    }

    /// Whether the last instruction for `hart` let it run.
    pub fn is_running(&self, hart: HartId) -> bool {
        self.events
            .iter()
            .rev()
            .find_map(|event| match *event {
                HartEvent::Release(h) if h == hart => Some(true),
                HartEvent::Hold(h) if h == hart => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl HartControl for FakeHarts {
    fn release(&mut self, hart: HartId) {
        self.events.push(HartEvent::Release(hart));
    }

    fn hold(&mut self, hart: HartId) {
        self.events.push(HartEvent::Hold(hart));
    }
}

/// A simulated board running on the monitor hart.
pub struct Board {
    pub ipi: Box<Transport>,
    pub console: Box<Console<RecordingSink>>,
    pub sink: RecordingSink,
    pub harts: FakeHarts,
    pub txns: Transactions,
    pub clock: SoftClock,
}

impl Board {
    pub fn new() -> Self {
        let sink = RecordingSink::new();
        Board {
            ipi: Box::new(Transport::new()),
            console: Box::new(Console::new(sink.clone(), &NoInterrupts)),
            sink,
            harts: FakeHarts::default(),
            txns: Transactions::new(),
            clock: SoftClock::new(),
        }
    }

    /// The environment a monitor-hart handler would see on `tick`.
    pub fn env(&mut self, tick: u64) -> Env<'_> {
        Env {
            me: HartId::MONITOR,
            tick,
            ipi: &self.ipi,
            console: &*self.console,
            harts: &mut self.harts,
            txns: &mut self.txns,
            clock: &self.clock,
        }
    }

    pub fn engine(&mut self) -> Engine<'_> {
        Engine::new(
            HartId::MONITOR,
            Platform {
                ipi: &self.ipi,
                console: &*self.console,
                harts: &mut self.harts,
                clock: &self.clock,
            },
        )
    }
}
