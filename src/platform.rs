//! # Platform Collaborators
//!
//! The monitor core does not touch reset controllers or interrupt controllers itself. Boards hand
//! it implementations of these traits; `arch` carries the ones for bare-metal RISC-V.

use crate::hart::HartId;

/// Reset control for the worker harts.
pub trait HartControl {
    /// Lets the hart run.
    fn release(&mut self, hart: HartId);
    /// Parks the hart so it executes nothing until the next release.
    fn hold(&mut self, hart: HartId);
}

/// Local interrupt masking for the hart executing the call.
pub trait InterruptControl: Sync {
    /// Masks interrupts and returns whether they were enabled before.
    fn disable(&self) -> bool;
    /// Restores the state returned by the matching [`disable`](Self::disable).
    fn restore(&self, was_enabled: bool);
}

/// Interrupt control for contexts where nothing can interrupt the caller.
pub struct NoInterrupts;

impl InterruptControl for NoInterrupts {
    fn disable(&self) -> bool {
        false
    }

    fn restore(&self, _was_enabled: bool) {}
}

/// Notifies a hart that its mailbox has new envelopes.
pub trait Doorbell: Sync {
    fn ring(&self, hart: HartId);
}
