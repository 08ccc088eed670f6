//! # Boot Orchestrator
//!
//! Brings the worker harts out of reset one at a time. Each hart is released and then given
//! `ready_timeout_ticks` ticks to announce itself with a `Ready` intent. A hart that stays silent
//! is held again and, once its release attempts are spent, recorded as failed. The
//! [`Escalation`] policy then decides whether the sequence moves on to the next hart or stops.
//!
//! ```text
//! Idle -> ReleaseHart(n) -> AwaitReady(n) -> ReleaseHart(n + 1) ... -> AllBooted
//!                                \-> Failed(n) -> ReleaseHart(n + 1) | Halted
//! ```
//!
//! The outcome is published in a [`HartTable`] that any service may read. In every state the
//! orchestrator also answers one `StatusQuery` and one `BootRequest` per tick, so requests never
//! pile up in the monitor's mailbox while a slow hart is being waited on.

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use arrayvec::ArrayVec;

use crate::config::{BootPolicy, Escalation, HART_COUNT};
use crate::console::Terminal;
use crate::env::Env;
use crate::hart::HartId;
use crate::ipi::{Envelope, IntentKind, IntentStatus};
use crate::sm::{Descriptor, State, StateId, StateMachine, Transition};

// =============================================================================
// Hart records
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Held = 0,
    Booting = 1,
    Ready = 2,
    Failed = 3,
}

impl Lifecycle {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Lifecycle::Booting,
            2 => Lifecycle::Ready,
            3 => Lifecycle::Failed,
            _ => Lifecycle::Held,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Held => "held",
            Lifecycle::Booting => "booting",
            Lifecycle::Ready => "ready",
            Lifecycle::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of one hart's boot state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HartRecord {
    pub hart: HartId,
    pub lifecycle: Lifecycle,
    /// Tick of the last lifecycle change.
    pub last_seen: u64,
}

struct Slot {
    lifecycle: AtomicU8,
    last_seen: AtomicU64,
}

/// Boot state of every hart. Written by the orchestrator, readable from anywhere.
pub struct HartTable {
    slots: [Slot; HART_COUNT],
}

impl HartTable {
    pub const fn new() -> Self {
        HartTable {
            slots: [const {
                Slot {
                    lifecycle: AtomicU8::new(Lifecycle::Held as u8),
                    last_seen: AtomicU64::new(0),
                }
            }; HART_COUNT],
        }
    }

    pub(crate) fn set(&self, hart: HartId, lifecycle: Lifecycle, tick: u64) {
        let slot = &self.slots[hart.index()];
        slot.last_seen.store(tick, Ordering::Relaxed);
        slot.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    pub fn lifecycle(&self, hart: HartId) -> Lifecycle {
        Lifecycle::from_u8(self.slots[hart.index()].lifecycle.load(Ordering::Acquire))
    }

    pub fn record(&self, hart: HartId) -> HartRecord {
        let slot = &self.slots[hart.index()];
        let lifecycle = Lifecycle::from_u8(slot.lifecycle.load(Ordering::Acquire));
        HartRecord {
            hart,
            lifecycle,
            last_seen: slot.last_seen.load(Ordering::Relaxed),
        }
    }

    /// Number of harts in `lifecycle`, the monitor included.
    pub fn count(&self, lifecycle: Lifecycle) -> usize {
        HartId::all()
            .filter(|hart| self.lifecycle(*hart) == lifecycle)
            .count()
    }

    /// Writes one line per worker hart to the console.
    pub fn report(&self, console: &dyn Terminal) {
        for hart in HartId::workers() {
            let record = self.record(hart);
            console.write_fmt(format_args!(
                "hart {}: {} (tick {})\r\n",
                hart, record.lifecycle, record.last_seen
            ));
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

const IDLE: StateId = StateId(0);
const RELEASE_HART: StateId = StateId(1);
const AWAIT_READY: StateId = StateId(2);
const FAILED: StateId = StateId(3);
const ALL_BOOTED: StateId = StateId(4);
const HALTED: StateId = StateId(5);

pub static BOOT: Descriptor<BootOrchestrator> = Descriptor::new(
    "boot",
    &[
        State {
            id: IDLE,
            name: "Idle",
            entry: Some(BootOrchestrator::hold_all),
            handler: BootOrchestrator::start,
            exit: None,
        },
        State {
            id: RELEASE_HART,
            name: "ReleaseHart",
            entry: Some(BootOrchestrator::release),
            handler: BootOrchestrator::released,
            exit: None,
        },
        State {
            id: AWAIT_READY,
            name: "AwaitReady",
            entry: Some(BootOrchestrator::start_waiting),
            handler: BootOrchestrator::await_ready,
            exit: None,
        },
        State {
            id: FAILED,
            name: "Failed",
            entry: Some(BootOrchestrator::fail),
            handler: BootOrchestrator::escalate,
            exit: None,
        },
        State {
            id: ALL_BOOTED,
            name: "AllBooted",
            entry: Some(BootOrchestrator::finished),
            handler: BootOrchestrator::serve,
            exit: None,
        },
        State {
            id: HALTED,
            name: "Halted",
            entry: Some(BootOrchestrator::finished),
            handler: BootOrchestrator::serve,
            exit: None,
        },
    ],
);

/// Context of the boot state machine.
pub struct BootOrchestrator {
    table: &'static HartTable,
    policy: BootPolicy,
    workers: ArrayVec<HartId, HART_COUNT>,
    cursor: usize,
    attempt: u8,
    waited: u32,
}

impl BootOrchestrator {
    pub fn new(table: &'static HartTable, policy: BootPolicy) -> Self {
        BootOrchestrator {
            table,
            policy,
            workers: ArrayVec::new(),
            cursor: 0,
            attempt: 0,
            waited: 0,
        }
    }

    /// A state machine running a fresh orchestrator.
    pub fn machine(table: &'static HartTable, policy: BootPolicy) -> StateMachine<Self> {
        StateMachine::new(&BOOT, Self::new(table, policy))
    }

    /// The hart currently being booted, if any.
    pub fn current(&self) -> Option<HartId> {
        self.workers.get(self.cursor).copied()
    }

    pub fn table(&self) -> &'static HartTable {
        self.table
    }

    fn advance(&mut self) -> Transition {
        self.cursor += 1;
        self.attempt = 0;
        if self.cursor < self.workers.len() {
            Transition::To(RELEASE_HART)
        } else {
            Transition::To(ALL_BOOTED)
        }
    }

    fn hold_all(&mut self, env: &mut Env<'_>) {
        let me = env.me;
        self.workers = HartId::all().filter(|hart| *hart != me).collect();
        self.cursor = 0;
        self.attempt = 0;
        for &hart in &self.workers {
            env.harts.hold(hart);
            self.table.set(hart, Lifecycle::Held, env.tick);
        }
        self.table.set(me, Lifecycle::Ready, env.tick);
    }

    fn start(&mut self, env: &mut Env<'_>) -> Transition {
        self.serve_requests(env);
        if self.workers.is_empty() {
            Transition::To(ALL_BOOTED)
        } else {
            Transition::To(RELEASE_HART)
        }
    }

    fn release(&mut self, env: &mut Env<'_>) {
        let Some(hart) = self.current() else {
            return;
        };
        self.attempt += 1;
        log::info!("releasing hart {} (attempt {})", hart, self.attempt);
        env.harts.release(hart);
        self.table.set(hart, Lifecycle::Booting, env.tick);
    }

    fn released(&mut self, env: &mut Env<'_>) -> Transition {
        self.serve_requests(env);
        Transition::To(AWAIT_READY)
    }

    fn start_waiting(&mut self, _env: &mut Env<'_>) {
        self.waited = 0;
    }

    fn await_ready(&mut self, env: &mut Env<'_>) -> Transition {
        self.serve_requests(env);
        let Some(hart) = self.current() else {
            return Transition::To(ALL_BOOTED);
        };

        if env.ipi.pending_from(env.me, hart, IntentKind::Ready) > 0
            && env.ipi.consume_from(env.me, hart, IntentKind::Ready).is_some()
        {
            log::info!("hart {} ready after {} ticks", hart, self.waited);
            self.table.set(hart, Lifecycle::Ready, env.tick);
            return self.advance();
        }

        self.waited += 1;
        if self.waited < self.policy.ready_timeout_ticks {
            return Transition::Remain;
        }

        if self.attempt < self.policy.attempts() {
            log::warn!("hart {} silent, retrying", hart);
            env.harts.hold(hart);
            Transition::To(RELEASE_HART)
        } else {
            Transition::To(FAILED)
        }
    }

    fn fail(&mut self, env: &mut Env<'_>) {
        let Some(hart) = self.current() else {
            return;
        };
        env.harts.hold(hart);
        self.table.set(hart, Lifecycle::Failed, env.tick);
        log::error!("hart {} failed to boot", hart);
        env.console.write_fmt(format_args!(
            "boot: hart {} failed to report ready after {} attempt(s)\r\n",
            hart, self.attempt
        ));
    }

    fn escalate(&mut self, env: &mut Env<'_>) -> Transition {
        self.serve_requests(env);
        match self.policy.on_timeout {
            Escalation::Continue => self.advance(),
            Escalation::Halt => Transition::To(HALTED),
        }
    }

    fn finished(&mut self, env: &mut Env<'_>) {
        log::info!(
            "boot finished: {} ready, {} failed",
            self.table.count(Lifecycle::Ready),
            self.table.count(Lifecycle::Failed)
        );
        self.table.report(env.console);
    }

    fn serve(&mut self, env: &mut Env<'_>) -> Transition {
        self.serve_requests(env);
        Transition::Remain
    }

    /// Answers one `StatusQuery` and one `BootRequest`. Both name a hart in their first payload
    /// byte.
    ///
    /// A status acknowledgement carries the hart's current lifecycle after the status byte. Boot
    /// requests succeed only for harts that are already up: the sequence runs once per reset and
    /// is never restarted on request.
    fn serve_requests(&self, env: &mut Env<'_>) {
        if let Some(query) = env.ipi.consume(env.me, IntentKind::StatusQuery) {
            match named_hart(&query) {
                Some(hart) => {
                    let lifecycle = self.table.lifecycle(hart) as u8;
                    env.ipi
                        .reply_with(env.me, &query, IntentStatus::Success, &[lifecycle]);
                }
                None => env.ipi.reply(env.me, &query, IntentStatus::Fail),
            }
        }

        if let Some(request) = env.ipi.consume(env.me, IntentKind::BootRequest) {
            let status = match named_hart(&request) {
                Some(hart) if self.table.lifecycle(hart) == Lifecycle::Ready => {
                    IntentStatus::Success
                }
                Some(hart) => {
                    log::warn!(
                        "boot request from hart {} for hart {} refused: {}",
                        request.source,
                        hart,
                        self.table.lifecycle(hart)
                    );
                    IntentStatus::Fail
                }
                None => IntentStatus::Fail,
            };
            env.ipi.reply(env.me, &request, status);
        }
    }
}

fn named_hart(request: &Envelope) -> Option<HartId> {
    request.payload.first().copied().and_then(HartId::new)
}
