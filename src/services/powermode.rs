//! Power-mode relay endpoint.

use core::fmt;

use crate::ipi::{Envelope, IntentStatus};

/// SoC power modes a worker may ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerMode {
    Run = 0,
    Standby = 1,
    Sleep = 2,
    /// Clocks gated except for the monitor and the wake-up logic.
    DeepSleep = 3,
}

impl PowerMode {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PowerMode::Run),
            1 => Some(PowerMode::Standby),
            2 => Some(PowerMode::Sleep),
            3 => Some(PowerMode::DeepSleep),
            _ => None,
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records the requested power mode. Applying it is up to the clock and reset drivers.
#[derive(Debug)]
pub struct PowerModeEndpoint {
    mode: PowerMode,
    changes: u32,
}

impl PowerModeEndpoint {
    pub fn new() -> Self {
        PowerModeEndpoint {
            mode: PowerMode::Run,
            changes: 0,
        }
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    pub fn changes(&self) -> u32 {
        self.changes
    }

    pub(crate) fn handle(&mut self, request: &Envelope) -> IntentStatus {
        let Some(mode) = request.payload.first().copied().and_then(PowerMode::from_u8) else {
            log::warn!(
                "hart {} asked for unknown power mode {:?}",
                request.source,
                request.payload.first()
            );
            return IntentStatus::Fail;
        };
        if mode != self.mode {
            log::info!("power mode {} -> {} for hart {}", self.mode, mode, request.source);
            self.mode = mode;
            self.changes += 1;
        }
        IntentStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipi::{IntentKind, TxId};
    use crate::testing::hart;

    fn request(payload: &[u8]) -> Envelope {
        Envelope {
            source: hart(1),
            kind: IntentKind::PowerMode,
            txid: TxId(3),
            payload: payload.iter().copied().collect(),
            seq: 0,
        }
    }

    #[test]
    fn known_modes_are_recorded() {
        let mut endpoint = PowerModeEndpoint::new();
        assert_eq!(endpoint.handle(&request(&[2])), IntentStatus::Success);
        assert_eq!(endpoint.handle(&request(&[2])), IntentStatus::Success);
        assert_eq!(endpoint.mode(), PowerMode::Sleep);
        assert_eq!(endpoint.changes(), 1);
    }

    #[test]
    fn unknown_or_missing_modes_fail() {
        let mut endpoint = PowerModeEndpoint::new();
        assert_eq!(endpoint.handle(&request(&[9])), IntentStatus::Fail);
        assert_eq!(endpoint.handle(&request(&[])), IntentStatus::Fail);
        assert_eq!(endpoint.mode(), PowerMode::Run);
    }
}
