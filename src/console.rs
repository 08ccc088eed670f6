//! # Shared Console
//!
//! There is one physical console and every hart may want it. [`Console`] serializes access with
//! a spin lock that is held with local interrupts masked, so an interrupt handler on the holding
//! hart can never spin on a lock its own hart owns. Holders must not wait on another hart while
//! the lock is held: there is no priority inheritance.

use core::fmt;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use crate::platform::InterruptControl;

/// Byte sink for the physical console, implemented by the serial driver.
pub trait ConsoleSink: Send {
    fn write(&mut self, bytes: &[u8]);

    /// Moves received bytes into `buf` without waiting and returns how many were read.
    /// Sinks without a receive path read nothing.
    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }
}

/// Object-safe view of the console used by services.
///
/// Every call takes and releases the console lock once, so one call is never interleaved with
/// output from another hart.
pub trait Terminal: Sync {
    fn write_bytes(&self, bytes: &[u8]);
    fn write_fmt(&self, args: fmt::Arguments<'_>);
    /// Drains pending input into `buf`, returning the byte count.
    fn read_bytes(&self, buf: &mut [u8]) -> usize;
}

/// The console mutex.
pub struct Console<S> {
    sink: Mutex<S>,
    irq: &'static dyn InterruptControl,
}

impl<S: ConsoleSink> Console<S> {
    pub const fn new(sink: S, irq: &'static dyn InterruptControl) -> Self {
        Console {
            sink: Mutex::new(sink),
            irq,
        }
    }

    /// Acquires the console, masking local interrupts until the guard is dropped.
    pub fn lock(&self) -> ConsoleGuard<'_, S> {
        let was_enabled = self.irq.disable();
        ConsoleGuard {
            guard: Some(self.sink.lock()),
            irq: self.irq,
            was_enabled,
        }
    }

    /// Acquires the console only if nobody holds it.
    pub fn try_lock(&self) -> Option<ConsoleGuard<'_, S>> {
        let was_enabled = self.irq.disable();
        match self.sink.try_lock() {
            Some(guard) => Some(ConsoleGuard {
                guard: Some(guard),
                irq: self.irq,
                was_enabled,
            }),
            None => {
                self.irq.restore(was_enabled);
                None
            }
        }
    }
}

impl<S: ConsoleSink> Terminal for Console<S> {
    fn write_bytes(&self, bytes: &[u8]) {
        self.lock().write(bytes);
    }

    fn write_fmt(&self, args: fmt::Arguments<'_>) {
        let _ = fmt::Write::write_fmt(&mut self.lock(), args);
    }

    fn read_bytes(&self, buf: &mut [u8]) -> usize {
        let mut guard = self.lock();
        ConsoleSink::read(&mut *guard, buf)
    }
}

/// Exclusive access to the console sink.
pub struct ConsoleGuard<'a, S> {
    guard: Option<MutexGuard<'a, S>>,
    irq: &'a dyn InterruptControl,
    was_enabled: bool,
}

impl<S: ConsoleSink> ConsoleGuard<'_, S> {
    pub fn write(&mut self, bytes: &[u8]) {
        ConsoleSink::write(&mut **self, bytes);
    }
}

impl<S> Deref for ConsoleGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        // The guard is only emptied by `drop`.
        match self.guard.as_deref() {
            Some(sink) => sink,
            None => unreachable!(),
        }
    }
}

impl<S> DerefMut for ConsoleGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        match self.guard.as_deref_mut() {
            Some(sink) => sink,
            None => unreachable!(),
        }
    }
}

impl<S: ConsoleSink> fmt::Write for ConsoleGuard<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

impl<S> Drop for ConsoleGuard<'_, S> {
    fn drop(&mut self) {
        // Unlock before interrupts come back on.
        drop(self.guard.take());
        self.irq.restore(self.was_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingIrq, RecordingSink};
    use core::fmt::Write as _;

    #[test]
    fn lock_masks_interrupts_until_dropped() {
        static IRQ: CountingIrq = CountingIrq::new();
        let sink = RecordingSink::new();
        let console = Console::new(sink.clone(), &IRQ);
        {
            let mut guard = console.lock();
            assert!(IRQ.masked());
            write!(guard, "hart {}", 3).ok();
        }
        assert!(!IRQ.masked());
        assert_eq!(sink.contents(), "hart 3");
    }

    #[test]
    fn try_lock_fails_while_held_and_restores_interrupts() {
        static IRQ: CountingIrq = CountingIrq::new();
        let console = Console::new(RecordingSink::new(), &IRQ);
        let guard = console.lock();
        assert!(console.try_lock().is_none());
        assert!(IRQ.masked());
        drop(guard);
        assert!(!IRQ.masked());
        assert!(console.try_lock().is_some());
    }

    #[test]
    fn terminal_writes_are_whole() {
        static IRQ: CountingIrq = CountingIrq::new();
        let sink = RecordingSink::new();
        let console = Console::new(sink.clone(), &IRQ);
        let terminal: &dyn Terminal = &console;
        terminal.write_bytes(b"boot ");
        write!(terminal, "ok\r\n");
        assert_eq!(sink.contents(), "boot ok\r\n");
    }

    #[test]
    fn reads_drain_input_without_waiting() {
        static IRQ: CountingIrq = CountingIrq::new();
        let sink = RecordingSink::new();
        let console = Console::new(sink.clone(), &IRQ);
        let mut buf = [0u8; 4];
        assert_eq!(console.read_bytes(&mut buf), 0);

        sink.feed(b"reboot");
        assert_eq!(console.read_bytes(&mut buf), 4);
        assert_eq!(&buf, b"rebo");
        assert_eq!(console.read_bytes(&mut buf), 2);
        assert_eq!(&buf[..2], b"ot");
        assert!(!IRQ.masked());
    }
}
