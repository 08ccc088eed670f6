//! Crypto relay endpoint.
//!
//! Cryptographic primitives are provided by the secure element driver; this endpoint only
//! accepts requests on its behalf and keeps count.

use crate::ipi::{Envelope, IntentStatus};

#[derive(Debug, Default)]
pub struct CryptoEndpoint {
    requests: u32,
    last_len: usize,
}

impl CryptoEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Payload length of the most recent request.
    pub fn last_len(&self) -> usize {
        self.last_len
    }

    pub(crate) fn handle(&mut self, request: &Envelope) -> IntentStatus {
        self.requests += 1;
        self.last_len = request.payload.len();
        log::trace!("crypto request from hart {}: {} bytes", request.source, self.last_len);
        IntentStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::{IntentKind, TxId};
    use crate::testing::hart;

    #[test]
    fn requests_are_counted_and_accepted() {
        let mut endpoint = CryptoEndpoint::new();
        let request = Envelope {
            source: hart(2),
            kind: IntentKind::Crypto,
            txid: TxId(1),
            payload: [1u8, 2, 3].into_iter().collect(),
            seq: 0,
        };
        assert_eq!(endpoint.handle(&request), IntentStatus::Success);
        assert_eq!(endpoint.handle(&request), IntentStatus::Success);
        assert_eq!((endpoint.requests(), endpoint.last_len()), (2, 3));
    }
}
