//! Everything a state handler may touch during one tick.

use crate::console::Terminal;
use crate::hart::HartId;
use crate::ipi::{IntentKind, RequestError, Transactions, Transport, TxId};
use crate::platform::HartControl;
use crate::time::Clock;

/// The per-tick environment handed to every handler and hook.
///
/// The engine builds one per tick from the board's collaborators, so handlers never reach for
/// globals.
pub struct Env<'a> {
    /// The hart running the engine.
    pub me: HartId,
    /// Number of the current tick, starting at zero.
    pub tick: u64,
    pub ipi: &'a Transport,
    pub console: &'a dyn Terminal,
    pub harts: &'a mut dyn HartControl,
    pub txns: &'a mut Transactions,
    pub clock: &'a dyn Clock,
}

impl Env<'_> {
    /// Sends a request to `dest` and opens a transaction for its acknowledgements.
    ///
    /// The transaction slot is released again if the envelope cannot be queued.
    pub fn request(
        &mut self,
        dest: HartId,
        kind: IntentKind,
        payload: &[u8],
    ) -> Result<TxId, RequestError> {
        let id = self.txns.begin(dest, kind)?;
        if let Err(err) = self.ipi.send_tx(self.me, dest, kind, id, payload) {
            self.txns.finish(id);
            return Err(err.into());
        }
        Ok(id)
    }
}
