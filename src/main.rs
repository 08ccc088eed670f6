//! # Monitor Firmware
//!
//! On the RISC-V target this binary is the firmware image: `_start` lives in
//! `monitor::arch::riscv64` and all this file adds is the panic handler.
//!
//! On a host it runs a simulated board instead, with worker harts played by threads, so the
//! whole monitor can be watched from a terminal.

#![cfg_attr(all(target_arch = "riscv64", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "riscv64", target_os = "none"), no_main)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod firmware {
    use core::fmt::Write;
    use core::panic::PanicInfo;

    use monitor::arch::riscv64::{CONSOLE, start};

    #[panic_handler]
    fn panic(info: &PanicInfo<'_>) -> ! {
        // The panic may have happened with the console held.
        if let Some(mut console) = CONSOLE.try_lock() {
            let _ = write!(console, "\r\nmonitor panic: {}\r\n", info);
        }
        start::halt()
    }
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
fn main() {
    host::run();
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
mod host {
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use monitor::boot::{BootOrchestrator, HartTable, Lifecycle};
    use monitor::config::{BootPolicy, LOG_LEVEL};
    use monitor::console::{Console, ConsoleSink};
    use monitor::engine::{Engine, Platform};
    use monitor::hart::{HartId, HartSet};
    use monitor::ipi::{IntentKind, SendError, Transport, TxId};
    use monitor::platform::{HartControl, NoInterrupts};
    use monitor::services::console::ConsoleEndpoint;
    use monitor::services::crypto::CryptoEndpoint;
    use monitor::services::powermode::{PowerMode, PowerModeEndpoint};
    use monitor::services::{Endpoint, IpiPoll, Relay};
    use monitor::time::SoftClock;

    const TICK_LIMIT: u64 = 1_000_000;

    struct Stdout;

    impl ConsoleSink for Stdout {
        fn write(&mut self, bytes: &[u8]) {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(bytes);
            let _ = out.flush();
        }
    }

    static CONSOLE: Console<Stdout> = Console::new(Stdout, &NoInterrupts);
    static IPI: Transport = Transport::new();
    static HART_TABLE: HartTable = HartTable::new();
    static CLOCK: SoftClock = SoftClock::new();
    /// Worker threads allowed to keep running.
    static RUNNING: HartSet = HartSet::empty();
    /// Workers whose power-mode request was acknowledged.
    static ACKED: AtomicUsize = AtomicUsize::new(0);
    static THREADS: Mutex<Vec<JoinHandle<()>>> = Mutex::new(Vec::new());

    fn send_retrying(me: HartId, kind: IntentKind, txid: TxId, payload: &[u8]) {
        loop {
            match IPI.send_tx(me, HartId::MONITOR, kind, txid, payload) {
                Ok(()) => return,
                Err(SendError::Full(_)) => thread::yield_now(),
                Err(err) => {
                    log::warn!("hart {}: {}", me, err);
                    return;
                }
            }
        }
    }

    /// What a worker hart does once released: report ready, greet, ask for a power mode.
    fn worker(me: HartId) {
        send_retrying(me, IntentKind::Ready, TxId::NONE, &[]);
        let greeting = format!("hello from hart {me}\r\n");
        send_retrying(me, IntentKind::ConsoleTx, TxId::NONE, greeting.as_bytes());
        send_retrying(me, IntentKind::PowerMode, TxId(1), &[PowerMode::Standby as u8]);

        while RUNNING.contains(me) {
            if let Some(ack) = IPI.consume(me, IntentKind::AckComplete) {
                log::info!("hart {}: {} acknowledged", me, ack.txid);
                ACKED.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Worker harts as threads, started on release.
    struct ThreadHarts;

    impl HartControl for ThreadHarts {
        fn release(&mut self, hart: HartId) {
            if RUNNING.contains(hart) {
                return;
            }
            RUNNING.insert(hart);
            let handle = thread::spawn(move || worker(hart));
            if let Ok(mut threads) = THREADS.lock() {
                threads.push(handle);
            }
        }

        fn hold(&mut self, hart: HartId) {
            RUNNING.remove(hart);
        }
    }

    pub fn run() {
        if let Err(err) = monitor::logger::init(&CONSOLE, LOG_LEVEL) {
            eprintln!("logger: {err}");
        }

        let mut harts = ThreadHarts;
        let mut boot = BootOrchestrator::machine(&HART_TABLE, BootPolicy::from_config());
        let mut crypto = Relay::machine(Endpoint::Crypto(CryptoEndpoint::new()));
        let mut powermode = Relay::machine(Endpoint::PowerMode(PowerModeEndpoint::new()));
        let mut console = Relay::machine(Endpoint::Console(ConsoleEndpoint::new()));
        let mut ipi_poll = IpiPoll::machine();

        let mut engine = Engine::new(
            HartId::MONITOR,
            Platform {
                ipi: &IPI,
                console: &CONSOLE,
                harts: &mut harts,
                clock: &CLOCK,
            },
        );
        let boot_handle = engine.register(&mut boot);
        engine.register(&mut crypto);
        engine.register(&mut powermode);
        engine.register(&mut console);
        engine.register(&mut ipi_poll);

        let workers = HartId::workers().count();
        while engine.ticks() < TICK_LIMIT {
            engine.tick();
            CLOCK.advance(1);

            let finished = matches!(engine.state_name(boot_handle), "AllBooted" | "Halted");
            let ready = HART_TABLE.count(Lifecycle::Ready).saturating_sub(1);
            if finished && ACKED.load(Ordering::SeqCst) >= ready.min(workers) {
                break;
            }
            thread::yield_now();
        }

        engine.dump_stats();
        IPI.dump_stats();

        for hart in HartId::workers() {
            RUNNING.remove(hart);
        }
        let threads = THREADS
            .lock()
            .map(|mut threads| std::mem::take(&mut *threads))
            .unwrap_or_default();
        for handle in threads {
            let _ = handle.join();
        }
    }
}
