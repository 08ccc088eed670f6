//! # RISC-V 64-bit Monitor Board
//!
//! Memory map and the statics shared by every hart, plus the monitor's main loop.

pub mod clint;
pub mod interrupt;
pub mod start;
pub mod uart;

use crate::boot::{BootOrchestrator, HartTable};
use crate::config::{BootPolicy, LOG_LEVEL};
use crate::console::{Console, Terminal};
use crate::engine::{Engine, Platform};
use crate::env::Env;
use crate::hart::{HartId, HartSet};
use crate::init::{InitStep, OnFailure, run_init_steps};
use crate::ipi::Transport;
use crate::services::console::ConsoleEndpoint;
use crate::services::crypto::CryptoEndpoint;
use crate::services::powermode::PowerModeEndpoint;
use crate::services::{Endpoint, IpiPoll, Relay};

use self::clint::{Clint, ClintHarts};
use self::interrupt::MachineInterrupts;
use self::uart::Uart16550;

pub const CLINT_BASE: usize = 0x0200_0000;
pub const UART0_BASE: usize = 0x2000_0000;
/// MMUART registers are 32 bits apart.
pub const UART_REG_SHIFT: u32 = 2;

// SAFETY: fixed SoC addresses, owned by the monitor firmware.
pub static CLINT: Clint = unsafe { Clint::new(CLINT_BASE) };
pub static CONSOLE: Console<Uart16550> =
    Console::new(unsafe { Uart16550::new(UART0_BASE, UART_REG_SHIFT) }, &MachineInterrupts);

pub static IPI: Transport = Transport::new();
pub static HART_TABLE: HartTable = HartTable::new();
/// Worker harts allowed to leave the park loop.
pub static RELEASED: HartSet = HartSet::empty();

static INIT_STEPS: [InitStep; 2] = [
    InitStep {
        name: "banner",
        run: banner,
        on_failure: OnFailure::Continue,
    },
    InitStep {
        name: "doorbell",
        run: doorbell,
        on_failure: OnFailure::Halt,
    },
];

fn banner(env: &mut Env<'_>) -> Result<(), &'static str> {
    env.console.write_fmt(format_args!(
        "monitor {} on hart {}\r\n",
        env!("CARGO_PKG_VERSION"),
        env.me
    ));
    Ok(())
}

fn doorbell(env: &mut Env<'_>) -> Result<(), &'static str> {
    for hart in HartId::workers() {
        CLINT.clear(hart);
    }
    env.ipi.set_doorbell(&CLINT);
    Ok(())
}

/// Entry of the monitor hart once the stack and `.bss` are set up.
pub fn monitor_main() -> ! {
    CONSOLE.lock().init();
    if let Err(err) = crate::logger::init(&CONSOLE, LOG_LEVEL) {
        CONSOLE.write_fmt(format_args!("logger: {}\r\n", err));
    }

    let mut harts = ClintHarts::new(&CLINT, &RELEASED);
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
            clock: &CLINT,
        },
    );

    if let Err(err) = engine.with_env(|env| run_init_steps(&INIT_STEPS, env)) {
        log::error!("{}", err);
        start::halt();
    }

    engine.register(&mut boot);
    engine.register(&mut crypto);
    engine.register(&mut powermode);
    engine.register(&mut console);
    engine.register(&mut ipi_poll);
    engine.run()
}
