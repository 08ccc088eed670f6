//! # State Machines
//!
//! Every service is a finite state machine described by a `static` [`Descriptor`]: a name and a
//! table of [`State`]s, each with a handler and optional entry and exit hooks. A
//! [`StateMachine`] pairs a descriptor with the service's own context and the bookkeeping of one
//! running [`Instance`].
//!
//! Handlers run to completion and report a [`Transition`]. They must not block; anything that
//! waits does so by remaining in its state and checking again on the next tick.

use core::fmt;

use bitflags::bitflags;

use crate::env::Env;

// =============================================================================
// Descriptors
// =============================================================================

/// Index of a state in its descriptor's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u8);

impl StateId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a handler asks the engine to do after it returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Remain,
    /// Leave the current state for the given one. Naming the current state re-enters it.
    To(StateId),
}

pub type Handler<C> = fn(&mut C, &mut Env<'_>) -> Transition;
pub type Hook<C> = fn(&mut C, &mut Env<'_>);

/// One row of a state table.
pub struct State<C: 'static> {
    pub id: StateId,
    pub name: &'static str,
    pub entry: Option<Hook<C>>,
    pub handler: Handler<C>,
    pub exit: Option<Hook<C>>,
}

/// Immutable description of a state machine, shared by every instance of it.
pub struct Descriptor<C: 'static> {
    name: &'static str,
    states: &'static [State<C>],
}

impl<C: 'static> Descriptor<C> {
    /// Builds a descriptor, checking that every state's id is its index in `states`.
    ///
    /// Meant for `static` items, where a bad table stops the build.
    pub const fn new(name: &'static str, states: &'static [State<C>]) -> Self {
        assert!(!states.is_empty(), "state machine without states");
        assert!(states.len() <= u8::MAX as usize + 1, "too many states");
        let mut i = 0;
        while i < states.len() {
            assert!(
                states[i].id.index() == i,
                "state ids must be contiguous and match their position"
            );
            i += 1;
        }
        Descriptor { name, states }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn len(&self) -> usize {
        self.states.len()
    }

    pub fn state_name(&self, id: StateId) -> &'static str {
        self.states.get(id.index()).map_or("?", |state| state.name)
    }
}

// =============================================================================
// Instances
// =============================================================================

bitflags! {
    /// Run-time switches of one instance.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InstanceFlags: u8 {
        /// The engine invokes the instance on every tick.
        const ENABLED = 1 << 0;
        /// Every transition is logged at debug level.
        const TRACE = 1 << 1;
    }
}

/// Execution statistics of one instance, in clock units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecStats {
    pub runs: u64,
    pub last: u64,
    pub max: u64,
    /// State whose handler took `max`.
    pub max_state: StateId,
}

/// Bookkeeping of one running state machine.
#[derive(Debug)]
pub struct Instance {
    current: StateId,
    previous: Option<StateId>,
    invocations: u64,
    entered: bool,
    flags: InstanceFlags,
    stats: ExecStats,
}

impl Instance {
    const fn new() -> Self {
        Instance {
            current: StateId(0),
            previous: None,
            invocations: 0,
            entered: false,
            flags: if cfg!(feature = "trace_transitions") {
                InstanceFlags::ENABLED.union(InstanceFlags::TRACE)
            } else {
                InstanceFlags::ENABLED
            },
            stats: ExecStats {
                runs: 0,
                last: 0,
                max: 0,
                max_state: StateId(0),
            },
        }
    }

    pub fn current(&self) -> StateId {
        self.current
    }

    pub fn previous(&self) -> Option<StateId> {
        self.previous
    }

    /// Number of handler invocations so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn flags(&self) -> InstanceFlags {
        self.flags
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(InstanceFlags::ENABLED)
    }

    pub fn set_flag(&mut self, flag: InstanceFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    /// Accounts one engine invocation that started in `state` and took `elapsed`.
    pub fn record_run(&mut self, state: StateId, elapsed: u64) {
        self.stats.runs += 1;
        self.stats.last = elapsed;
        if elapsed > self.stats.max {
            self.stats.max = elapsed;
            self.stats.max_state = state;
        }
    }
}

// =============================================================================
// Machines
// =============================================================================

/// The engine's view of a state machine, independent of its context type.
pub trait Machine {
    fn name(&self) -> &'static str;
    fn state_name(&self, id: StateId) -> &'static str;
    fn instance(&self) -> &Instance;
    fn instance_mut(&mut self) -> &mut Instance;
    /// Runs one handler invocation, and the hooks of any transition it asks for.
    fn step(&mut self, env: &mut Env<'_>);
}

/// A descriptor bound to a service context.
pub struct StateMachine<C: 'static> {
    descriptor: &'static Descriptor<C>,
    instance: Instance,
    context: C,
}

impl<C: 'static> StateMachine<C> {
    pub const fn new(descriptor: &'static Descriptor<C>, context: C) -> Self {
        StateMachine {
            descriptor,
            instance: Instance::new(),
            context,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn descriptor(&self) -> &'static Descriptor<C> {
        self.descriptor
    }

    fn transition(&mut self, next: StateId, env: &mut Env<'_>) {
        let states = self.descriptor.states;
        assert!(
            next.index() < states.len(),
            "{}: transition to unknown state {}",
            self.descriptor.name,
            next
        );

        let from = self.instance.current;
        if let Some(exit) = states[from.index()].exit {
            exit(&mut self.context, env);
        }
        self.instance.previous = Some(from);
        self.instance.current = next;

        if self.instance.flags.contains(InstanceFlags::TRACE) {
            log::debug!(
                "{} :: {} -> {}",
                self.descriptor.name,
                states[from.index()].name,
                states[next.index()].name
            );
        }

        if let Some(entry) = states[next.index()].entry {
            entry(&mut self.context, env);
        }
    }
}

impl<C: 'static> Machine for StateMachine<C> {
    fn name(&self) -> &'static str {
        self.descriptor.name
    }

    fn state_name(&self, id: StateId) -> &'static str {
        self.descriptor.state_name(id)
    }

    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn instance_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }

    fn step(&mut self, env: &mut Env<'_>) {
        let states = self.descriptor.states;
        let state = &states[self.instance.current.index()];

        if !self.instance.entered {
            self.instance.entered = true;
            if let Some(entry) = state.entry {
                entry(&mut self.context, env);
            }
        }

        self.instance.invocations += 1;
        match (state.handler)(&mut self.context, env) {
            Transition::Remain => {}
            Transition::To(next) => self.transition(next, env),
        }
    }
}
