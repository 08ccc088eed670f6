//! # Inter-Hart Messaging
//!
//! Every hart owns one bounded [`Mailbox`]. Any hart, from any context including interrupt
//! handlers, may [`send`](Transport::send) into another hart's mailbox; only the owner consumes
//! from it. Sending never blocks: when the destination is full the sender gets
//! [`SendError::Full`] back and decides for itself whether to retry on a later tick.
//!
//! Requests carry a [`TxId`]. The hart serving a request answers with an acknowledgement intent
//! echoing that id, which the requester's `ipi_poll` service applies to its [`Transactions`].

mod mailbox;
mod txn;

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use arrayvec::ArrayVec;
use spin::Once;
use thiserror::Error;

use crate::config::{HART_COUNT, MAILBOX_CAPACITY, PAYLOAD_CAPACITY};
use crate::hart::HartId;
use crate::platform::Doorbell;

pub use self::mailbox::Mailbox;
use self::mailbox::Filter;
pub use self::txn::{RequestError, Transactions};

/// The kind of request or notification an envelope carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntentKind {
    /// A worker hart finished its own start-up.
    Ready = 0,
    /// Ask the monitor to (re)boot a hart.
    BootRequest,
    /// Ask for the lifecycle of the hart named in the payload.
    StatusQuery,
    /// Switch the SoC to the power mode in the first payload byte.
    PowerMode,
    Crypto,
    /// Bytes to print on the shared console.
    ConsoleTx,
    /// Poll for console input.
    ConsolePollRx,
    /// The request is accepted and still in progress.
    AckPending,
    /// The request is done; the first payload byte is its [`IntentStatus`].
    AckComplete,
    Halt,
}

impl IntentKind {
    pub const fn is_ack(self) -> bool {
        matches!(self, IntentKind::AckPending | IntentKind::AckComplete)
    }
}

/// Outcome of handling one request locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IntentStatus {
    Fail = 0,
    Success = 1,
    /// Accepted; a completion follows later.
    Pending = 2,
    /// Nothing was done and nothing is owed to the requester.
    Idle = 3,
}

impl IntentStatus {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(IntentStatus::Fail),
            1 => Some(IntentStatus::Success),
            2 => Some(IntentStatus::Pending),
            3 => Some(IntentStatus::Idle),
            _ => None,
        }
    }
}

/// Correlates a request with its acknowledgements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub u32);

impl TxId {
    /// Carried by notifications nobody waits on.
    pub const NONE: TxId = TxId(0);
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Payload storage of one envelope.
pub type Payload = ArrayVec<u8, PAYLOAD_CAPACITY>;

/// A typed message between harts. Fixed once sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: HartId,
    pub kind: IntentKind,
    pub txid: TxId,
    pub payload: Payload,
    /// Stamped by the destination mailbox; increases with every send to it.
    pub seq: u32,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("mailbox of hart {0} is full")]
    Full(HartId),
    #[error("{kind:?} from hart {from} already pending at hart {dest}")]
    AlreadyPending {
        from: HartId,
        dest: HartId,
        kind: IntentKind,
    },
    #[error("payload of {0} bytes exceeds the envelope capacity")]
    PayloadTooLarge(usize),
}

/// Per-hart transport counters.
#[derive(Debug)]
pub struct IpiStats {
    sent: AtomicU32,
    send_failures: AtomicU32,
    consumed: AtomicU32,
    doorbells: AtomicU32,
    dropped_replies: AtomicU32,
}

impl IpiStats {
    const fn new() -> Self {
        IpiStats {
            sent: AtomicU32::new(0),
            send_failures: AtomicU32::new(0),
            consumed: AtomicU32::new(0),
            doorbells: AtomicU32::new(0),
            dropped_replies: AtomicU32::new(0),
        }
    }

    /// Envelopes this hart has sent.
    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u32 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Envelopes this hart has consumed from its own mailbox.
    pub fn consumed(&self) -> u32 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Doorbells rung towards this hart.
    pub fn doorbells(&self) -> u32 {
        self.doorbells.load(Ordering::Relaxed)
    }

    /// Acknowledgements this hart could not queue.
    pub fn dropped_replies(&self) -> u32 {
        self.dropped_replies.load(Ordering::Relaxed)
    }
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// The mailboxes of every hart on the board.
pub struct Transport<const CAP: usize = MAILBOX_CAPACITY> {
    mailboxes: [Mailbox<CAP>; HART_COUNT],
    stats: [IpiStats; HART_COUNT],
    doorbell: Once<&'static dyn Doorbell>,
}

impl<const CAP: usize> Transport<CAP> {
    pub const fn new() -> Self {
        Transport {
            mailboxes: [const { Mailbox::new() }; HART_COUNT],
            stats: [const { IpiStats::new() }; HART_COUNT],
            doorbell: Once::new(),
        }
    }

    /// Installs the doorbell rung after every successful send. Only the first call has an effect.
    pub fn set_doorbell(&self, doorbell: &'static dyn Doorbell) {
        self.doorbell.call_once(|| doorbell);
    }

    /// Queues a notification for `dest`.
    pub fn send(
        &self,
        from: HartId,
        dest: HartId,
        kind: IntentKind,
        payload: &[u8],
    ) -> Result<(), SendError> {
        self.send_tx(from, dest, kind, TxId::NONE, payload)
    }

    /// Queues a request for `dest` that will be acknowledged under `txid`.
    pub fn send_tx(
        &self,
        from: HartId,
        dest: HartId,
        kind: IntentKind,
        txid: TxId,
        payload: &[u8],
    ) -> Result<(), SendError> {
        debug_assert_ne!(from, dest, "hart sending to itself");

        let result = self.enqueue(from, dest, kind, txid, payload);
        match result {
            Ok(()) => bump(&self.stats[from.index()].sent),
            Err(_) => bump(&self.stats[from.index()].send_failures),
        }
        result
    }

    /// Like [`send`](Self::send), but refuses while an envelope of the same kind from `from` is
    /// still pending at `dest`.
    ///
    /// Only `from` sends with its own source id, so other harts cannot race the check. An interrupt
    /// handler on `from` itself can: if it sends between the check and the enqueue, both
    /// envelopes are queued. The check is best-effort against that re-entry.
    pub fn send_unique(
        &self,
        from: HartId,
        dest: HartId,
        kind: IntentKind,
        payload: &[u8],
    ) -> Result<(), SendError> {
        if self.pending_from(dest, from, kind) > 0 {
            bump(&self.stats[from.index()].send_failures);
            return Err(SendError::AlreadyPending { from, dest, kind });
        }
        self.send(from, dest, kind, payload)
    }

    fn enqueue(
        &self,
        from: HartId,
        dest: HartId,
        kind: IntentKind,
        txid: TxId,
        payload: &[u8],
    ) -> Result<(), SendError> {
        let payload =
            Payload::try_from(payload).map_err(|_| SendError::PayloadTooLarge(payload.len()))?;
        let envelope = Envelope {
            source: from,
            kind,
            txid,
            payload,
            seq: 0,
        };
        self.mailboxes[dest.index()]
            .push(envelope)
            .map_err(|_| SendError::Full(dest))?;

        if let Some(doorbell) = self.doorbell.get() {
            doorbell.ring(dest);
            bump(&self.stats[dest.index()].doorbells);
        }
        Ok(())
    }

    /// Envelopes queued for `hart` and not yet consumed.
    pub fn pending_count(&self, hart: HartId) -> usize {
        self.mailboxes[hart.index()].len()
    }

    /// Envelopes of `kind` from `source` queued for `hart`.
    pub fn pending_from(&self, hart: HartId, source: HartId, kind: IntentKind) -> usize {
        self.mailboxes[hart.index()].count(Filter::peer(source, kind))
    }

    /// Takes the oldest envelope of `kind` queued for `hart`. Only `hart` may call this.
    pub fn consume(&self, hart: HartId, kind: IntentKind) -> Option<Envelope> {
        self.take(hart, Filter::kind(kind))
    }

    /// Takes the oldest envelope of `kind` from `source` queued for `hart`.
    pub fn consume_from(&self, hart: HartId, source: HartId, kind: IntentKind) -> Option<Envelope> {
        self.take(hart, Filter::peer(source, kind))
    }

    fn take(&self, hart: HartId, filter: Filter) -> Option<Envelope> {
        let envelope = self.mailboxes[hart.index()].take(filter);
        if envelope.is_some() {
            bump(&self.stats[hart.index()].consumed);
        }
        envelope
    }

    /// Acknowledges `request` with the outcome of handling it on `me`.
    pub fn reply(&self, me: HartId, request: &Envelope, status: IntentStatus) {
        self.reply_with(me, request, status, &[]);
    }

    /// Acknowledges `request`, appending `data` after the status byte.
    ///
    /// Notifications, `Idle` outcomes and acknowledgements themselves are never answered. An
    /// acknowledgement that cannot be queued is logged and counted against `me`.
    pub fn reply_with(&self, me: HartId, request: &Envelope, status: IntentStatus, data: &[u8]) {
        if status == IntentStatus::Idle || request.kind.is_ack() || request.txid == TxId::NONE {
            return;
        }
        let kind = if status == IntentStatus::Pending {
            IntentKind::AckPending
        } else {
            IntentKind::AckComplete
        };

        let mut payload = Payload::new();
        payload.push(status as u8);
        if payload.try_extend_from_slice(data).is_err() {
            log::warn!("reply to {} truncated: {} data bytes", request.txid, data.len());
        }

        if let Err(err) = self.send_tx(me, request.source, kind, request.txid, &payload) {
            bump(&self.stats[me.index()].dropped_replies);
            log::warn!("dropped {:?} for {}: {}", kind, request.txid, err);
        }
    }

    pub fn stats(&self, hart: HartId) -> &IpiStats {
        &self.stats[hart.index()]
    }

    /// Logs the counters of every hart.
    pub fn dump_stats(&self) {
        for hart in HartId::all() {
            let stats = self.stats(hart);
            log::info!(
                "hart {}: sent {} failed {} consumed {} doorbells {} dropped replies {} pending {}",
                hart,
                stats.sent(),
                stats.send_failures(),
                stats.consumed(),
                stats.doorbells(),
                stats.dropped_replies(),
                self.pending_count(hart),
            );
        }
    }
}
