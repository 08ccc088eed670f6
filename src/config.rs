//! # Board Configuration
//!
//! Compile-time constants generated by `build.rs` from `config.toml`, and the runtime policy
//! types built from them.

include!(concat!(env!("OUT_DIR"), "/config.rs"));

/// What the boot orchestrator does once a hart has used up its release attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// Mark the hart failed and carry on with the next one.
    Continue,
    /// Mark the hart failed and stop the boot sequence.
    Halt,
}

/// Boot sequencing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootPolicy {
    /// Ticks spent in `AwaitReady` before an attempt times out.
    pub ready_timeout_ticks: u32,
    /// Release attempts per hart, the first included. Zero is treated as one.
    pub release_attempts: u8,
    /// Escalation once every attempt has timed out.
    pub on_timeout: Escalation,
}

impl BootPolicy {
    /// The policy described by `config.toml`.
    pub const fn from_config() -> Self {
        BootPolicy {
            ready_timeout_ticks: READY_TIMEOUT_TICKS,
            release_attempts: RELEASE_ATTEMPTS,
            on_timeout: if HALT_ON_BOOT_FAILURE {
                Escalation::Halt
            } else {
                Escalation::Continue
            },
        }
    }

    pub const fn with_timeout(mut self, ticks: u32) -> Self {
        self.ready_timeout_ticks = ticks;
        self
    }

    pub const fn with_attempts(mut self, attempts: u8) -> Self {
        self.release_attempts = attempts;
        self
    }

    pub const fn with_escalation(mut self, escalation: Escalation) -> Self {
        self.on_timeout = escalation;
        self
    }

    pub(crate) fn attempts(&self) -> u8 {
        self.release_attempts.max(1)
    }
}

impl Default for BootPolicy {
    fn default() -> Self {
        Self::from_config()
    }
}

const _: () = assert!(HART_COUNT >= 1 && HART_COUNT <= 32);
const _: () = assert!((MONITOR_HART as usize) < HART_COUNT);
const _: () = assert!(MAILBOX_CAPACITY > 0);
const _: () = assert!(PAYLOAD_CAPACITY > 0);
const _: () = assert!(TRANSACTION_SLOTS > 0);
const _: () = assert!(MAX_MACHINES > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_config() {
        let policy = BootPolicy::from_config()
            .with_timeout(7)
            .with_attempts(3)
            .with_escalation(Escalation::Halt);
        assert_eq!(policy.ready_timeout_ticks, 7);
        assert_eq!(policy.release_attempts, 3);
        assert_eq!(policy.on_timeout, Escalation::Halt);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(BootPolicy::from_config().with_attempts(0).attempts(), 1);
    }
}
