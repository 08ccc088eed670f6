//! # RISC-V 64-bit Entry Point
//!
//! Every hart enters at `_start` with its own stack. The monitor hart clears `.bss` and runs the
//! monitor; the others park until the boot orchestrator releases them.

use core::arch::{asm, global_asm};

use riscv::register::{mhartid, mie};

use super::{CLINT, IPI, RELEASED};
use crate::hart::HartId;
use crate::ipi::{IntentKind, SendError};

global_asm!(
    r#"
    .section .text.init
    .global _start
_start:
    csrw mie, zero
    csrw mip, zero
.option push
.option norelax
    la gp, __global_pointer$
.option pop
    csrr t2, mhartid
    la sp, __stack_top
    li t0, 0x2000
    mul t1, t2, t0
    sub sp, sp, t1
    j _start_rust
"#
);

unsafe extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
}

#[unsafe(no_mangle)]
extern "C" fn _start_rust() -> ! {
    let Some(hart) = u8::try_from(mhartid::read()).ok().and_then(HartId::new) else {
        // Not a hart this firmware was built for.
        halt();
    };

    if hart == HartId::MONITOR {
        // SAFETY: only the monitor hart runs this, before anything reads a static.
        unsafe { clear_bss() };
        super::monitor_main()
    } else {
        park(hart)
    }
}

unsafe fn clear_bss() {
    // SAFETY: the linker script places both symbols around `.bss`.
    unsafe {
        let start = &raw mut __bss_start;
        let end = &raw mut __bss_end;
        core::ptr::write_bytes(start, 0, end as usize - start as usize);
    }
}

fn wait_for_interrupt() {
    // SAFETY: `wfi` only stalls the hart until an interrupt is pending.
    unsafe { asm!("wfi") };
}

/// Stops the calling hart for good.
pub fn halt() -> ! {
    loop {
        wait_for_interrupt();
    }
}

/// Wait loop of a worker hart held in reset.
fn park(hart: HartId) -> ! {
    // SAFETY: MSIP only wakes `wfi`; MIE stays clear, so no trap is taken.
    unsafe { mie::set_msoft() };
    loop {
        wait_for_interrupt();
        CLINT.clear(hart);
        if RELEASED.contains(hart) {
            serve(hart);
        }
    }
}

/// Stand-in worker for harts without a payload of their own: reports ready, then idles until
/// it is held again or told to halt.
fn serve(hart: HartId) {
    loop {
        match IPI.send(hart, HartId::MONITOR, IntentKind::Ready, &[]) {
            Ok(()) => break,
            Err(SendError::Full(_)) => core::hint::spin_loop(),
            Err(_) => return,
        }
    }
    while RELEASED.contains(hart) {
        if IPI.consume(hart, IntentKind::Halt).is_some() {
            return;
        }
        wait_for_interrupt();
        CLINT.clear(hart);
    }
}
