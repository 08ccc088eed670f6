//! Outstanding requests awaiting acknowledgement.

use thiserror::Error;

use super::{IntentKind, IntentStatus, SendError, TxId};
use crate::config::TRANSACTION_SLOTS;
use crate::hart::HartId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("no free transaction slot")]
    Busy,
    #[error(transparent)]
    Send(#[from] SendError),
}

#[derive(Clone, Copy, Debug)]
struct Outstanding {
    id: TxId,
    dest: HartId,
    kind: IntentKind,
    status: IntentStatus,
    complete: bool,
}

/// Fixed table of requests this hart has sent and not yet retired.
pub struct Transactions<const N: usize = TRANSACTION_SLOTS> {
    slots: [Option<Outstanding>; N],
    last_id: u32,
}

impl<const N: usize> Transactions<N> {
    pub const fn new() -> Self {
        Transactions {
            slots: [None; N],
            last_id: 0,
        }
    }

    /// Allocates a slot for a request of `kind` to `dest`.
    pub fn begin(&mut self, dest: HartId, kind: IntentKind) -> Result<TxId, RequestError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(RequestError::Busy)?;

        self.last_id = self.last_id.wrapping_add(1);
        if self.last_id == TxId::NONE.0 {
            self.last_id = 1;
        }
        let id = TxId(self.last_id);
        *slot = Some(Outstanding {
            id,
            dest,
            kind,
            status: IntentStatus::Pending,
            complete: false,
        });
        Ok(id)
    }

    /// Records an acknowledgement. Returns false if `id` is not outstanding.
    ///
    /// A `Pending` acknowledgement after completion is stale and leaves the slot alone.
    pub fn update(&mut self, id: TxId, status: IntentStatus) -> bool {
        match self.find_mut(id) {
            Some(txn) => {
                if status != IntentStatus::Pending {
                    txn.status = status;
                    txn.complete = true;
                } else if !txn.complete {
                    txn.status = status;
                }
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self, id: TxId) -> bool {
        self.find(id).is_some_and(|txn| txn.complete)
    }

    /// Last status recorded for `id`.
    pub fn status(&self, id: TxId) -> Option<IntentStatus> {
        self.find(id).map(|txn| txn.status)
    }

    /// Destination and kind of the request behind `id`.
    pub fn target(&self, id: TxId) -> Option<(HartId, IntentKind)> {
        self.find(id).map(|txn| (txn.dest, txn.kind))
    }

    /// Retires `id`, returning its last status.
    pub fn finish(&mut self, id: TxId) -> Option<IntentStatus> {
        self.slots
            .iter_mut()
            .find(|slot| slot.is_some_and(|txn| txn.id == id))
            .and_then(Option::take)
            .map(|txn| txn.status)
    }

    /// Number of requests not yet retired.
    pub fn outstanding(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn find(&self, id: TxId) -> Option<&Outstanding> {
        self.slots.iter().flatten().find(|txn| txn.id == id)
    }

    fn find_mut(&mut self, id: TxId) -> Option<&mut Outstanding> {
        self.slots.iter_mut().flatten().find(|txn| txn.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::hart;

    #[test]
    fn lifecycle_of_a_request() {
        let mut txns = Transactions::<2>::new();
        let id = txns.begin(hart(1), IntentKind::Crypto);
        let Ok(id) = id else { panic!("no slot") };

        assert_eq!(txns.status(id), Some(IntentStatus::Pending));
        assert!(txns.update(id, IntentStatus::Pending));
        assert!(!txns.is_complete(id));
        assert!(txns.update(id, IntentStatus::Success));
        assert!(txns.is_complete(id));
        // A late progress report does not reopen it.
        assert!(txns.update(id, IntentStatus::Pending));
        assert_eq!(txns.status(id), Some(IntentStatus::Success));

        assert_eq!(txns.finish(id), Some(IntentStatus::Success));
        assert_eq!(txns.outstanding(), 0);
        assert!(!txns.update(id, IntentStatus::Fail));
    }

    #[test]
    fn full_table_is_busy() {
        let mut txns = Transactions::<1>::new();
        assert!(txns.begin(hart(1), IntentKind::Crypto).is_ok());
        assert_eq!(
            txns.begin(hart(2), IntentKind::PowerMode),
            Err(RequestError::Busy)
        );
    }

    #[test]
    fn ids_are_never_none() {
        let mut txns = Transactions::<1>::new();
        txns.last_id = u32::MAX;
        let id = txns.begin(hart(1), IntentKind::Crypto);
        assert_eq!(id, Ok(TxId(1)));
        assert_eq!(txns.target(TxId(1)), Some((hart(1), IntentKind::Crypto)));
    }
}
