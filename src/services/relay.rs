//! Relay services: forward the intent kinds of one endpoint from the worker harts to it.

use crate::env::Env;
use crate::hart::HartId;
use crate::ipi::{Envelope, IntentKind, IntentStatus, Payload};
use crate::sm::{Descriptor, State, StateId, StateMachine, Transition};

use super::PeerRotation;
use super::console::ConsoleEndpoint;
use super::crypto::CryptoEndpoint;
use super::powermode::PowerModeEndpoint;

const INIT: StateId = StateId(0);
const MONITORING: StateId = StateId(1);

const RELAY_STATES: &[State<Relay>] = &[
    State {
        id: INIT,
        name: "Init",
        entry: None,
        handler: Relay::init,
        exit: None,
    },
    State {
        id: MONITORING,
        name: "Monitoring",
        entry: None,
        handler: Relay::monitor,
        exit: None,
    },
];

pub static CRYPTO_RELAY: Descriptor<Relay> = Descriptor::new("crypto", RELAY_STATES);
pub static POWERMODE_RELAY: Descriptor<Relay> = Descriptor::new("powermode", RELAY_STATES);
pub static CONSOLE_RELAY: Descriptor<Relay> = Descriptor::new("console", RELAY_STATES);

/// The local handler behind a relay.
pub enum Endpoint {
    Crypto(CryptoEndpoint),
    PowerMode(PowerModeEndpoint),
    Console(ConsoleEndpoint),
}

impl Endpoint {
    /// The intent kinds this endpoint serves.
    pub fn kinds(&self) -> &'static [IntentKind] {
        match self {
            Endpoint::Crypto(_) => &[IntentKind::Crypto],
            Endpoint::PowerMode(_) => &[IntentKind::PowerMode],
            Endpoint::Console(_) => &[IntentKind::ConsoleTx, IntentKind::ConsolePollRx],
        }
    }

    fn descriptor(&self) -> &'static Descriptor<Relay> {
        match self {
            Endpoint::Crypto(_) => &CRYPTO_RELAY,
            Endpoint::PowerMode(_) => &POWERMODE_RELAY,
            Endpoint::Console(_) => &CONSOLE_RELAY,
        }
    }

    /// Handles one request, returning its status and the data to acknowledge it with.
    fn handle(&mut self, request: &Envelope, env: &mut Env<'_>) -> (IntentStatus, Payload) {
        match self {
            Endpoint::Crypto(endpoint) => (endpoint.handle(request), Payload::new()),
            Endpoint::PowerMode(endpoint) => (endpoint.handle(request), Payload::new()),
            Endpoint::Console(endpoint) => match request.kind {
                IntentKind::ConsolePollRx => endpoint.poll_input(env),
                _ => (endpoint.print(request, env), Payload::new()),
            },
        }
    }
}

/// Context of a relay state machine.
pub struct Relay {
    endpoint: Endpoint,
    peers: PeerRotation,
    last_polled: Option<HartId>,
    served: u32,
}

impl Relay {
    pub fn new(endpoint: Endpoint) -> Self {
        Relay {
            endpoint,
            peers: PeerRotation::new(),
            last_polled: None,
            served: 0,
        }
    }

    /// A state machine relaying to `endpoint`.
    pub fn machine(endpoint: Endpoint) -> StateMachine<Self> {
        let descriptor = endpoint.descriptor();
        StateMachine::new(descriptor, Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The peer polled on the most recent tick.
    pub fn last_polled(&self) -> Option<HartId> {
        self.last_polled
    }

    /// Requests dispatched to the endpoint so far.
    pub fn served(&self) -> u32 {
        self.served
    }

    fn init(&mut self, env: &mut Env<'_>) -> Transition {
        self.peers.populate(env.me);
        log::debug!(
            "{:?} relay serving {} peers",
            self.endpoint.kinds(),
            self.peers.len()
        );
        Transition::To(MONITORING)
    }

    fn monitor(&mut self, env: &mut Env<'_>) -> Transition {
        let Some(peer) = self.peers.next_peer() else {
            return Transition::Remain;
        };
        self.last_polled = Some(peer);

        for &kind in self.endpoint.kinds() {
            if env.ipi.pending_from(env.me, peer, kind) == 0 {
                continue;
            }
            if let Some(request) = env.ipi.consume_from(env.me, peer, kind) {
                let (status, data) = self.endpoint.handle(&request, env);
                env.ipi.reply_with(env.me, &request, status, &data);
                self.served += 1;
            }
        }
        Transition::Remain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::TxId;
    use crate::sm::Machine;
    use crate::testing::{Board, hart};

    #[test]
    fn one_peer_per_tick_in_rotation() {
        let mut board = Board::new();
        let mut sm = Relay::machine(Endpoint::Crypto(CryptoEndpoint::new()));
        for worker in HartId::workers() {
            board
                .ipi
                .send_tx(worker, HartId::MONITOR, IntentKind::Crypto, TxId(worker.get() as u32), &[])
                .ok();
        }

        sm.step(&mut board.env(0));
        assert_eq!(sm.context().served(), 0);

        for (tick, worker) in HartId::workers().enumerate() {
            sm.step(&mut board.env(tick as u64 + 1));
            assert_eq!(sm.context().last_polled(), Some(worker));
            assert_eq!(sm.context().served(), tick as u32 + 1);
            let ack = board.ipi.consume(worker, IntentKind::AckComplete);
            assert_eq!(ack.map(|e| e.txid), Some(TxId(worker.get() as u32)));
        }
        assert_eq!(board.ipi.pending_count(HartId::MONITOR), 0);
    }

    #[test]
    fn busy_peer_does_not_starve_the_rest() {
        let mut board = Board::new();
        let mut sm = Relay::machine(Endpoint::Console(ConsoleEndpoint::new()));
        for _ in 0..3 {
            board
                .ipi
                .send(hart(1), HartId::MONITOR, IntentKind::ConsoleTx, b"a")
                .ok();
        }
        board
            .ipi
            .send(hart(2), HartId::MONITOR, IntentKind::ConsoleTx, b"b")
            .ok();

        // Init, then hart 1 and hart 2.
        for tick in 0..3 {
            sm.step(&mut board.env(tick));
        }
        assert_eq!(board.sink.contents(), "ab");
    }

    #[test]
    fn console_input_polls_are_answered_with_the_input() {
        let mut board = Board::new();
        let mut sm = Relay::machine(Endpoint::Console(ConsoleEndpoint::new()));
        board.sink.feed(b"ok");
        board
            .ipi
            .send_tx(hart(1), HartId::MONITOR, IntentKind::ConsolePollRx, TxId(9), &[])
            .ok();
        board
            .ipi
            .send(hart(1), HartId::MONITOR, IntentKind::ConsoleTx, b"> ")
            .ok();

        sm.step(&mut board.env(0));
        sm.step(&mut board.env(1));

        assert_eq!(sm.context().served(), 2);
        assert_eq!(board.sink.contents(), "> ");
        let ack = board.ipi.consume(hart(1), IntentKind::AckComplete);
        assert_eq!(
            ack.map(|e| (e.txid, e.payload.to_vec())),
            Some((TxId(9), vec![IntentStatus::Success as u8, b'o', b'k']))
        );
        assert_eq!(board.ipi.pending_count(HartId::MONITOR), 0);
    }

    #[test]
    fn other_kinds_are_left_queued() {
        let mut board = Board::new();
        let mut sm = Relay::machine(Endpoint::PowerMode(PowerModeEndpoint::new()));
        board
            .ipi
            .send(hart(1), HartId::MONITOR, IntentKind::Crypto, &[])
            .ok();
        sm.step(&mut board.env(0));
        sm.step(&mut board.env(1));
        assert_eq!(board.ipi.pending_count(HartId::MONITOR), 1);
        assert_eq!(sm.name(), "powermode");
    }
}
