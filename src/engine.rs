//! # Step Engine
//!
//! The cooperative super-loop of the monitor hart. Machines are registered once at start-up into
//! a fixed registry; every [`tick`](Engine::tick) invokes each enabled machine exactly once, in
//! registration order. Nothing is preempted, so a handler that loops forever stalls every
//! service on the hart.

use core::fmt;

use arrayvec::ArrayVec;

use crate::config::MAX_MACHINES;
use crate::console::Terminal;
use crate::env::Env;
use crate::hart::HartId;
use crate::ipi::{Transactions, Transport};
use crate::platform::HartControl;
use crate::sm::{Instance, InstanceFlags, Machine};
use crate::time::Clock;

/// Opaque reference to a registered machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceHandle(usize);

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The board collaborators the engine hands to every handler.
pub struct Platform<'a> {
    pub ipi: &'a Transport,
    pub console: &'a dyn Terminal,
    pub harts: &'a mut dyn HartControl,
    pub clock: &'a dyn Clock,
}

/// Super-loop statistics, in clock units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub loops: u64,
    pub last: u64,
    pub max: u64,
}

pub struct Engine<'a> {
    me: HartId,
    platform: Platform<'a>,
    txns: Transactions,
    machines: ArrayVec<&'a mut dyn Machine, MAX_MACHINES>,
    tick: u64,
    stats: LoopStats,
}

impl<'a> Engine<'a> {
    pub fn new(me: HartId, platform: Platform<'a>) -> Self {
        Engine {
            me,
            platform,
            txns: Transactions::new(),
            machines: ArrayVec::new(),
            tick: 0,
            stats: LoopStats::default(),
        }
    }

    /// Adds a machine to the end of the registry.
    ///
    /// # Panics
    ///
    /// If the registry already holds `MAX_MACHINES` machines.
    pub fn register(&mut self, machine: &'a mut dyn Machine) -> InstanceHandle {
        assert!(
            !self.machines.is_full(),
            "machine registry full, cannot register {}",
            machine.name()
        );
        let handle = InstanceHandle(self.machines.len());
        log::debug!("registered {} as {}", machine.name(), handle);
        self.machines.push(machine);
        handle
    }

    /// Runs one pass over every enabled machine.
    pub fn tick(&mut self) {
        let Engine {
            me,
            platform,
            txns,
            machines,
            tick,
            stats,
        } = self;
        let clock = platform.clock;
        let loop_start = clock.now();

        let mut env = Env {
            me: *me,
            tick: *tick,
            ipi: platform.ipi,
            console: platform.console,
            harts: &mut *platform.harts,
            txns,
            clock,
        };

        for machine in machines.iter_mut() {
            if !machine.instance().is_enabled() {
                continue;
            }
            let state = machine.instance().current();
            let start = clock.now();
            machine.step(&mut env);
            let elapsed = clock.now().wrapping_sub(start);
            machine.instance_mut().record_run(state, elapsed);
        }

        let elapsed = clock.now().wrapping_sub(loop_start);
        stats.loops += 1;
        stats.last = elapsed;
        stats.max = stats.max.max(elapsed);
        *tick += 1;
    }

    /// Ticks forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// Gives `f` the same environment handlers see, outside of any machine.
    ///
    /// Used for start-up work that runs before the first tick.
    pub fn with_env<R>(&mut self, f: impl FnOnce(&mut Env<'_>) -> R) -> R {
        let mut env = Env {
            me: self.me,
            tick: self.tick,
            ipi: self.platform.ipi,
            console: self.platform.console,
            harts: &mut *self.platform.harts,
            txns: &mut self.txns,
            clock: self.platform.clock,
        };
        f(&mut env)
    }

    pub fn set_enabled(&mut self, handle: InstanceHandle, enabled: bool) {
        self.machines[handle.0]
            .instance_mut()
            .set_flag(InstanceFlags::ENABLED, enabled);
    }

    pub fn set_trace(&mut self, handle: InstanceHandle, trace: bool) {
        self.machines[handle.0]
            .instance_mut()
            .set_flag(InstanceFlags::TRACE, trace);
    }

    pub fn instance(&self, handle: InstanceHandle) -> &Instance {
        self.machines[handle.0].instance()
    }

    /// Name of the current state of a machine.
    pub fn state_name(&self, handle: InstanceHandle) -> &'static str {
        let machine = &self.machines[handle.0];
        machine.state_name(machine.instance().current())
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Requests this hart has sent and not yet retired.
    pub fn transactions(&self) -> &Transactions {
        &self.txns
    }

    /// Logs the execution statistics of every machine and of the loop itself.
    pub fn dump_stats(&self) {
        for machine in &self.machines {
            let instance = machine.instance();
            let stats = instance.stats();
            log::info!(
                "{:<12} {:<12} runs {} last {} max {} (in {})",
                machine.name(),
                machine.state_name(instance.current()),
                stats.runs,
                stats.last,
                stats.max,
                machine.state_name(stats.max_state),
            );
        }
        log::info!(
            "loop: count {} last {} max {}",
            self.stats.loops,
            self.stats.last,
            self.stats.max
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::IntentKind;
    use crate::sm::{Descriptor, State, StateId, StateMachine, Transition};
    use crate::testing::{Board, hart};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Counter {
        ticks: u32,
    }

    fn count(c: &mut Counter, _: &mut Env<'_>) -> Transition {
        c.ticks += 1;
        if c.ticks == 3 {
            Transition::To(StateId(1))
        } else {
            Transition::Remain
        }
    }

    fn done(_: &mut Counter, _: &mut Env<'_>) -> Transition {
        Transition::Remain
    }

    static COUNTER: Descriptor<Counter> = Descriptor::new(
        "counter",
        &[
            State {
                id: StateId(0),
                name: "counting",
                entry: None,
                handler: count,
                exit: None,
            },
            State {
                id: StateId(1),
                name: "done",
                entry: None,
                handler: done,
                exit: None,
            },
        ],
    );

    fn counter() -> StateMachine<Counter> {
        StateMachine::new(&COUNTER, Counter { ticks: 0 })
    }

    #[test]
    fn every_enabled_machine_runs_once_per_tick() {
        let mut board = Board::new();
        let (mut a, mut b) = (counter(), counter());
        let mut engine = board.engine();
        let ha = engine.register(&mut a);
        let hb = engine.register(&mut b);

        engine.tick();
        engine.set_enabled(hb, false);
        engine.tick();
        engine.tick();

        assert_eq!(engine.instance(ha).invocations(), 3);
        assert_eq!(engine.instance(hb).invocations(), 1);
        assert_eq!(engine.state_name(ha), "done");
        assert_eq!(engine.state_name(hb), "counting");
        assert_eq!(engine.ticks(), 3);
        assert_eq!(engine.stats().loops, 3);
        drop(engine);
        assert_eq!(a.context().ticks, 3);
        assert_eq!(b.context().ticks, 1);
    }

    /// Appends `tag:event` to a log shared by several machines.
    struct Tagged {
        tag: u8,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Tagged {
        fn note(&self, event: &str) {
            self.log.borrow_mut().push(format!("{}:{}", self.tag, event));
        }
    }

    fn leave(t: &mut Tagged, _: &mut Env<'_>) -> Transition {
        t.note("s0");
        Transition::To(StateId(1))
    }

    fn arrive(t: &mut Tagged, _: &mut Env<'_>) {
        t.note("enter1");
    }

    fn stay(t: &mut Tagged, _: &mut Env<'_>) -> Transition {
        t.note("s1");
        Transition::Remain
    }

    static TAGGED: Descriptor<Tagged> = Descriptor::new(
        "tagged",
        &[
            State {
                id: StateId(0),
                name: "s0",
                entry: None,
                handler: leave,
                exit: None,
            },
            State {
                id: StateId(1),
                name: "s1",
                entry: Some(arrive),
                handler: stay,
                exit: None,
            },
        ],
    );

    #[test]
    fn machines_run_in_registration_order_and_transitions_apply_at_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut machines: Vec<StateMachine<Tagged>> = [3u8, 1, 2]
            .into_iter()
            .map(|tag| {
                StateMachine::new(
                    &TAGGED,
                    Tagged {
                        tag,
                        log: Rc::clone(&log),
                    },
                )
            })
            .collect();

        let mut board = Board::new();
        {
            let mut engine = board.engine();
            for machine in machines.iter_mut() {
                engine.register(machine);
            }
            engine.tick();
            engine.tick();
        }

        // Each machine's new entry hook runs before the next machine's handler.
        assert_eq!(
            *log.borrow(),
            ["3:s0", "3:enter1", "1:s0", "1:enter1", "2:s0", "2:enter1", "3:s1", "1:s1", "2:s1"]
        );
    }

    #[test]
    #[should_panic(expected = "registry full")]
    fn registering_past_capacity_is_fatal() {
        let mut board = Board::new();
        let mut machines: Vec<StateMachine<Counter>> =
            (0..=MAX_MACHINES).map(|_| counter()).collect();
        let mut engine = board.engine();
        for machine in machines.iter_mut() {
            engine.register(machine);
        }
    }

    #[test]
    fn with_env_shares_the_transaction_table() {
        let mut board = Board::new();
        let mut engine = board.engine();
        let id = engine.with_env(|env| env.request(hart(1), IntentKind::Crypto, &[]));
        assert!(id.is_ok());
        assert_eq!(engine.transactions().outstanding(), 1);
    }
}
