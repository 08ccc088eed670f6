use core::fmt::{self, Display};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{HART_COUNT, MONITOR_HART};

/// Identifies one hart of the SoC.
///
/// Only ids below [`HART_COUNT`] can be constructed, so every `HartId` indexes a real mailbox and
/// a real hart record.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HartId(u8);

impl HartId {
    /// The hart running the monitor firmware.
    pub const MONITOR: Self = Self::new_const(MONITOR_HART);

    /// Creates a hart id, or `None` if the board has no such hart.
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < HART_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Creates a hart id in const context. Fails the build if the hart does not exist.
    pub const fn new_const(id: u8) -> Self {
        assert!((id as usize) < HART_COUNT, "hart id out of range");
        Self(id)
    }

    /// Returns the inner value of the hart id.
    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over every hart of the board, monitor included.
    pub fn all() -> impl Iterator<Item = HartId> {
        (0..HART_COUNT as u8).map(HartId)
    }

    /// Iterates over every hart except the monitor.
    pub fn workers() -> impl Iterator<Item = HartId> {
        Self::all().filter(|hart| *hart != Self::MONITOR)
    }
}

impl fmt::Debug for HartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[hart #{}]", self.0)
    }
}

impl Display for HartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of harts, one bit per hart.
///
/// The bits are atomic so a set can be shared between the monitor loop and interrupt handlers.
#[derive(Debug)]
pub struct HartSet(AtomicU32);

impl HartSet {
    /// Creates an empty hart set.
    pub const fn empty() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Creates a set holding every worker hart.
    pub const fn workers() -> Self {
        let all = if HART_COUNT == 32 {
            u32::MAX
        } else {
            (1u32 << HART_COUNT) - 1
        };
        Self(AtomicU32::new(all & !(1 << MONITOR_HART)))
    }

    pub fn contains(&self, hart: HartId) -> bool {
        self.0.load(Ordering::Acquire) & bit(hart) != 0
    }

    /// Atomically adds a hart to the set.
    pub fn insert(&self, hart: HartId) {
        let _ = self.0.fetch_or(bit(hart), Ordering::Release);
    }

    /// Atomically removes a hart from the set.
    pub fn remove(&self, hart: HartId) {
        let _ = self.0.fetch_and(!bit(hart), Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        self.0.load(Ordering::Acquire) == 0
    }

    pub fn len(&self) -> usize {
        self.0.load(Ordering::Acquire).count_ones() as usize
    }

    /// Iterates over the harts in the set in ascending order, from a snapshot of the bits.
    pub fn iter(&self) -> impl Iterator<Item = HartId> + use<> {
        let raw = self.0.load(Ordering::Acquire);
        HartId::all().filter(move |hart| raw & bit(*hart) != 0)
    }
}

fn bit(hart: HartId) -> u32 {
    1 << hart.get()
}

impl Display for HartSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_beyond_the_board_are_rejected() {
        assert!(HartId::new(HART_COUNT as u8).is_none());
        assert_eq!(HartId::new(0).map(HartId::get), Some(0));
    }

    #[test]
    fn workers_skip_the_monitor() {
        assert!(HartId::workers().all(|hart| hart != HartId::MONITOR));
        assert_eq!(HartId::workers().count(), HART_COUNT - 1);
    }

    #[test]
    fn set_insert_and_remove() {
        let set = HartSet::empty();
        let hart = HartId::new_const(1);
        assert!(set.is_empty());
        set.insert(hart);
        assert!(set.contains(hart));
        assert_eq!(set.len(), 1);
        set.remove(hart);
        assert!(!set.contains(hart));
    }

    #[test]
    fn worker_set_matches_worker_iterator() {
        let set = HartSet::workers();
        assert!(set.iter().eq(HartId::workers()));
        assert!(!set.contains(HartId::MONITOR));
    }
}
