//! Acknowledgement poller.
//!
//! Drains `AckComplete` and `AckPending` intents addressed to this hart, one peer per tick, and
//! applies them to the transaction table. Whoever opened a transaction retires it once it is
//! complete.
//!
//! On the monitor it also discards `Halt` intents: the monitor halts the workers, never the other
//! way round, and nothing else would ever take them out of the mailbox.

use crate::env::Env;
use crate::hart::HartId;
use crate::ipi::{IntentKind, IntentStatus};
use crate::sm::{Descriptor, State, StateId, StateMachine, Transition};

use super::PeerRotation;

const INIT: StateId = StateId(0);
const MONITORING: StateId = StateId(1);

pub static IPI_POLL: Descriptor<IpiPoll> = Descriptor::new(
    "ipi_poll",
    &[
        State {
            id: INIT,
            name: "Init",
            entry: None,
            handler: IpiPoll::init,
            exit: None,
        },
        State {
            id: MONITORING,
            name: "Monitoring",
            entry: None,
            handler: IpiPoll::monitor,
            exit: None,
        },
    ],
);

#[derive(Debug, Default)]
pub struct IpiPoll {
    peers: PeerRotation,
    applied: u32,
    stale: u32,
    discarded: u32,
}

impl IpiPoll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine() -> StateMachine<Self> {
        StateMachine::new(&IPI_POLL, Self::new())
    }

    /// Acknowledgements matched to an open transaction.
    pub fn applied(&self) -> u32 {
        self.applied
    }

    /// Acknowledgements for transactions that were already retired or never existed.
    pub fn stale(&self) -> u32 {
        self.stale
    }

    /// Intents thrown away because this hart never serves them.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    fn init(&mut self, env: &mut Env<'_>) -> Transition {
        self.peers.populate(env.me);
        Transition::To(MONITORING)
    }

    fn monitor(&mut self, env: &mut Env<'_>) -> Transition {
        if let Some(peer) = self.peers.next_peer() {
            self.drain(env, peer, IntentKind::AckComplete);
            self.drain(env, peer, IntentKind::AckPending);
            if env.me == HartId::MONITOR
                && env.ipi.consume_from(env.me, peer, IntentKind::Halt).is_some()
            {
                self.discarded += 1;
                log::warn!("discarded Halt from hart {}", peer);
            }
        }
        Transition::Remain
    }

    fn drain(&mut self, env: &mut Env<'_>, peer: HartId, kind: IntentKind) {
        if env.ipi.pending_from(env.me, peer, kind) == 0 {
            return;
        }
        let Some(ack) = env.ipi.consume_from(env.me, peer, kind) else {
            return;
        };

        let status = match kind {
            IntentKind::AckPending => IntentStatus::Pending,
            _ => ack
                .payload
                .first()
                .copied()
                .and_then(IntentStatus::from_u8)
                .unwrap_or(IntentStatus::Fail),
        };
        if env.txns.update(ack.txid, status) {
            self.applied += 1;
        } else {
            self.stale += 1;
            log::debug!("stale {:?} for {} from hart {}", kind, ack.txid, peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::TxId;
    use crate::sm::Machine;
    use crate::testing::{Board, hart};

    #[test]
    fn completion_closes_the_transaction() {
        let mut board = Board::new();
        let mut sm = IpiPoll::machine();

        let id = board.env(0).request(hart(1), IntentKind::Crypto, &[]);
        let Ok(id) = id else { panic!("request failed") };
        let Some(request) = board.ipi.consume(hart(1), IntentKind::Crypto) else {
            panic!("request lost");
        };
        board.ipi.reply(hart(1), &request, IntentStatus::Pending);
        board.ipi.reply(hart(1), &request, IntentStatus::Success);

        sm.step(&mut board.env(0));
        sm.step(&mut board.env(1));

        assert!(board.txns.is_complete(id));
        assert_eq!(board.txns.status(id), Some(IntentStatus::Success));
        assert_eq!(sm.context().applied(), 2);
    }

    #[test]
    fn unknown_transactions_are_counted_stale() {
        let mut board = Board::new();
        let mut sm = IpiPoll::machine();
        board
            .ipi
            .send_tx(hart(1), HartId::MONITOR, IntentKind::AckComplete, TxId(77), &[1])
            .ok();
        sm.step(&mut board.env(0));
        sm.step(&mut board.env(1));
        assert_eq!(sm.context().stale(), 1);
        assert_eq!(board.ipi.pending_count(HartId::MONITOR), 0);
    }

    #[test]
    fn halt_sent_to_the_monitor_is_discarded() {
        let mut board = Board::new();
        let mut sm = IpiPoll::machine();
        board
            .ipi
            .send(hart(1), HartId::MONITOR, IntentKind::Halt, &[])
            .ok();
        sm.step(&mut board.env(0));
        sm.step(&mut board.env(1));
        assert_eq!(sm.context().discarded(), 1);
        assert_eq!(board.ipi.pending_count(HartId::MONITOR), 0);
    }
}
