//! Console relay endpoint: prints what the worker harts send and hands them console input.

use crate::config::PAYLOAD_CAPACITY;
use crate::console::Terminal;
use crate::env::Env;
use crate::ipi::{Envelope, IntentStatus, Payload};

#[derive(Debug, Default)]
pub struct ConsoleEndpoint {
    bytes: usize,
    received: usize,
}

impl ConsoleEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written on behalf of the workers so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Input bytes handed to the workers so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub(crate) fn print(&mut self, request: &Envelope, env: &mut Env<'_>) -> IntentStatus {
        if request.payload.is_empty() {
            return IntentStatus::Idle;
        }
        env.console.write_bytes(&request.payload);
        self.bytes += request.payload.len();
        IntentStatus::Success
    }

    /// Drains whatever input is waiting, up to what fits after the status byte of an
    /// acknowledgement. No input is still a success, with no data.
    pub(crate) fn poll_input(&mut self, env: &mut Env<'_>) -> (IntentStatus, Payload) {
        let mut buf = [0u8; PAYLOAD_CAPACITY - 1];
        let count = env.console.read_bytes(&mut buf);
        self.received += count;
        (IntentStatus::Success, buf[..count].iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::{IntentKind, TxId};
    use crate::testing::{Board, hart};

    fn request(payload: &[u8]) -> Envelope {
        Envelope {
            source: hart(3),
            kind: IntentKind::ConsoleTx,
            txid: TxId::NONE,
            payload: payload.iter().copied().collect(),
            seq: 0,
        }
    }

    #[test]
    fn payload_goes_to_the_console() {
        let mut board = Board::new();
        let mut endpoint = ConsoleEndpoint::new();
        let status = endpoint.print(&request(b"hello\r\n"), &mut board.env(0));
        assert_eq!(status, IntentStatus::Success);
        assert_eq!(board.sink.contents(), "hello\r\n");
        assert_eq!(endpoint.bytes(), 7);
    }

    #[test]
    fn empty_payload_is_idle() {
        let mut board = Board::new();
        let mut endpoint = ConsoleEndpoint::new();
        assert_eq!(endpoint.print(&request(b""), &mut board.env(0)), IntentStatus::Idle);
        assert!(board.sink.contents().is_empty());
    }

    #[test]
    fn polling_hands_out_waiting_input() {
        let mut board = Board::new();
        let mut endpoint = ConsoleEndpoint::new();

        let (status, data) = endpoint.poll_input(&mut board.env(0));
        assert_eq!(status, IntentStatus::Success);
        assert!(data.is_empty());

        board.sink.feed(b"y\r");
        let (status, data) = endpoint.poll_input(&mut board.env(1));
        assert_eq!(status, IntentStatus::Success);
        assert_eq!(data.as_slice(), b"y\r");
        assert_eq!(endpoint.received(), 2);
    }
}
