//! Machine-mode interrupt masking through `mstatus.MIE`.

use riscv::register::mstatus;

use crate::platform::InterruptControl;

pub struct MachineInterrupts;

impl InterruptControl for MachineInterrupts {
    fn disable(&self) -> bool {
        let was_enabled = mstatus::read().mie();
        // SAFETY: masking interrupts on the current hart has no memory effects.
        unsafe { mstatus::clear_mie() };
        was_enabled
    }

    fn restore(&self, was_enabled: bool) {
        if was_enabled {
            // SAFETY: only re-enables what `disable` found enabled.
            unsafe { mstatus::set_mie() };
        }
    }
}
