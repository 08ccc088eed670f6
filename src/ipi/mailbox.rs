//! Lock-free multi-producer, single-consumer mailbox.
//!
//! A mailbox is a fixed array of slots. A producer claims any free slot, writes the envelope and
//! publishes it; the owning hart scans the published slots and takes the oldest match. Each slot
//! moves through `FREE -> WRITING -> READY -> READING -> FREE`. Only producers take `FREE`, only
//! the owner takes `READY`, so a slot's cell is touched by exactly one party at a time.
//!
//! Order between two envelopes comes from the sequence number drawn when the slot is published.
//! Sends from one context are sequential, which gives FIFO per (source, kind).

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, AtomicUsize, Ordering};

use super::{Envelope, IntentKind};
use crate::hart::HartId;

const FREE: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;
const READING: u8 = 3;

/// Packs the filter key of an envelope so producers and the owner can match without reading the
/// slot cell.
const fn tag(source: HartId, kind: IntentKind) -> u16 {
    (source.get() as u16) << 8 | kind as u16
}

const SOURCE_MASK: u16 = 0xff00;
const KIND_MASK: u16 = 0x00ff;

/// Selects which published envelopes a scan considers.
#[derive(Clone, Copy)]
pub(super) struct Filter {
    value: u16,
    mask: u16,
}

impl Filter {
    pub(super) const fn kind(kind: IntentKind) -> Self {
        Filter {
            value: kind as u16,
            mask: KIND_MASK,
        }
    }

    pub(super) const fn peer(source: HartId, kind: IntentKind) -> Self {
        Filter {
            value: tag(source, kind),
            mask: SOURCE_MASK | KIND_MASK,
        }
    }

    fn matches(self, tag: u16) -> bool {
        tag & self.mask == self.value
    }
}

/// Returns true if sequence `a` was drawn before `b`, tolerating wrap-around.
fn older(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

struct Slot {
    state: AtomicU8,
    tag: AtomicU16,
    cell: UnsafeCell<MaybeUninit<Envelope>>,
}

impl Slot {
    const fn new() -> Self {
        Slot {
            state: AtomicU8::new(FREE),
            tag: AtomicU16::new(0),
            cell: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// The bounded mailbox of one hart.
pub struct Mailbox<const CAP: usize> {
    slots: [Slot; CAP],
    next_seq: AtomicU32,
    pending: AtomicUsize,
    consuming: AtomicBool,
}

// Slot cells are only accessed by the party owning the slot state; see the module docs.
unsafe impl<const CAP: usize> Sync for Mailbox<CAP> {}

impl<const CAP: usize> Mailbox<CAP> {
    pub const fn new() -> Self {
        Mailbox {
            slots: [const { Slot::new() }; CAP],
            next_seq: AtomicU32::new(0),
            pending: AtomicUsize::new(0),
            consuming: AtomicBool::new(false),
        }
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Publishes an envelope, stamping its sequence number.
    ///
    /// Gives the envelope back when every slot is taken, leaving the mailbox untouched.
    pub fn push(&self, mut envelope: Envelope) -> Result<u32, Envelope> {
        let Some(slot) = self.slots.iter().find(|slot| {
            slot.state
                .compare_exchange(FREE, WRITING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        }) else {
            return Err(envelope);
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        envelope.seq = seq;
        slot.tag
            .store(tag(envelope.source, envelope.kind), Ordering::Relaxed);
        // SAFETY: the WRITING state gives this producer exclusive access to the cell.
        unsafe { (*slot.cell.get()).write(envelope) };
        // Count before publishing so the owner never sees a slot it has not been told about.
        self.pending.fetch_add(1, Ordering::Relaxed);
        slot.state.store(READY, Ordering::Release);
        Ok(seq)
    }

    /// Number of published envelopes.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of published envelopes accepted by `filter`.
    pub(super) fn count(&self, filter: Filter) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.state.load(Ordering::Acquire) == READY
                    && filter.matches(slot.tag.load(Ordering::Relaxed))
            })
            .count()
    }

    /// Removes the oldest published envelope accepted by `filter`.
    ///
    /// Only the owning hart may call this.
    pub(super) fn take(&self, filter: Filter) -> Option<Envelope> {
        let reentered = self.consuming.swap(true, Ordering::Acquire);
        debug_assert!(!reentered, "mailbox consumed from two contexts");

        let mut oldest: Option<(&Slot, u32)> = None;
        for slot in &self.slots {
            if slot.state.load(Ordering::Acquire) != READY
                || !filter.matches(slot.tag.load(Ordering::Relaxed))
            {
                continue;
            }
            // SAFETY: READY cells are initialized and only the owner moves them out of READY.
            let seq = unsafe { (*slot.cell.get()).assume_init_ref().seq };
            if oldest.is_none_or(|(_, best)| older(seq, best)) {
                oldest = Some((slot, seq));
            }
        }

        let taken = oldest.map(|(slot, _)| {
            slot.state.store(READING, Ordering::Relaxed);
            // SAFETY: as above; the READING state keeps producers away until FREE is stored.
            let envelope = unsafe { (*slot.cell.get()).assume_init_read() };
            slot.state.store(FREE, Ordering::Release);
            self.pending.fetch_sub(1, Ordering::Relaxed);
            envelope
        });

        self.consuming.store(false, Ordering::Release);
        taken
    }
}

impl<const CAP: usize> Drop for Mailbox<CAP> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if *slot.state.get_mut() == READY {
                // SAFETY: READY cells are initialized and we have exclusive access.
                unsafe { slot.cell.get_mut().assume_init_drop() };
            }
        }
    }
}
