//! CLINT (Core Local Interruptor): machine software interrupts and the `mtime` counter.

use core::ptr;

use crate::hart::{HartId, HartSet};
use crate::platform::{Doorbell, HartControl};
use crate::time::Clock;

const MSIP_OFFSET: usize = 0x0000;
const MTIME_OFFSET: usize = 0xBFF8;

pub struct Clint {
    base: usize,
}

impl Clint {
    /// # Safety
    ///
    /// `base` must be the CLINT of this SoC, mapped and never used as anything else.
    pub const unsafe fn new(base: usize) -> Self {
        Clint { base }
    }

    fn msip(&self, hart: HartId) -> *mut u32 {
        (self.base + MSIP_OFFSET + 4 * hart.index()) as *mut u32
    }

    /// Raises the machine software interrupt of `hart`.
    pub fn raise(&self, hart: HartId) {
        // SAFETY: MSIP registers of configured harts lie inside the CLINT window.
        unsafe { ptr::write_volatile(self.msip(hart), 1) };
    }

    pub fn clear(&self, hart: HartId) {
        // SAFETY: as in `raise`.
        unsafe { ptr::write_volatile(self.msip(hart), 0) };
    }

    pub fn mtime(&self) -> u64 {
        // SAFETY: `mtime` is a 64-bit register, naturally aligned on RV64.
        unsafe { ptr::read_volatile((self.base + MTIME_OFFSET) as *const u64) }
    }
}

impl Doorbell for Clint {
    fn ring(&self, hart: HartId) {
        self.raise(hart);
    }
}

impl Clock for Clint {
    fn now(&self) -> u64 {
        self.mtime()
    }
}

/// Hart control for harts parked in the firmware's wait loop.
///
/// A parked hart sleeps in `wfi` and leaves the loop once its bit is in `released`; the MSIP
/// raised here is what wakes it to look.
pub struct ClintHarts {
    clint: &'static Clint,
    released: &'static HartSet,
}

impl ClintHarts {
    pub const fn new(clint: &'static Clint, released: &'static HartSet) -> Self {
        ClintHarts { clint, released }
    }
}

impl HartControl for ClintHarts {
    fn release(&mut self, hart: HartId) {
        self.released.insert(hart);
        self.clint.raise(hart);
    }

    fn hold(&mut self, hart: HartId) {
        self.released.remove(hart);
        self.clint.raise(hart);
    }
}
