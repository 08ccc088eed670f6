//! # UART 16550
//!
//! Polled driver for the 16550-compatible MMUART. Registers are spaced
//! `1 << reg_shift` bytes apart.

use core::ptr;

use crate::console::ConsoleSink;

const DATA: usize = 0;
const INT_EN: usize = 1;
const FIFO_CTRL: usize = 2;
const LINE_CTRL: usize = 3;
const MODEM_CTRL: usize = 4;
const LINE_STS: usize = 5;

const LINE_STS_DATA_READY: u8 = 0x01;
const LINE_STS_THR_EMPTY: u8 = 0x20;

pub struct Uart16550 {
    base: usize,
    reg_shift: u32,
}

impl Uart16550 {
    /// # Safety
    ///
    /// `base` must be a 16550-compatible UART owned by the monitor.
    pub const unsafe fn new(base: usize, reg_shift: u32) -> Self {
        Uart16550 { base, reg_shift }
    }

    fn reg(&self, index: usize) -> *mut u8 {
        (self.base + (index << self.reg_shift)) as *mut u8
    }

    fn read_reg(&self, index: usize) -> u8 {
        // SAFETY: `index` names a register of the UART handed to `new`.
        unsafe { ptr::read_volatile(self.reg(index)) }
    }

    fn write_reg(&mut self, index: usize, value: u8) {
        // SAFETY: as in `read_reg`.
        unsafe { ptr::write_volatile(self.reg(index), value) }
    }

    /// 8N1 with FIFOs enabled and interrupts off. The divisor latch is left to the boot ROM.
    pub fn init(&mut self) {
        self.write_reg(INT_EN, 0x00);
        self.write_reg(LINE_CTRL, 0x03);
        self.write_reg(FIFO_CTRL, 0xC7);
        self.write_reg(MODEM_CTRL, 0x0B);
    }

    fn send(&mut self, byte: u8) {
        while self.read_reg(LINE_STS) & LINE_STS_THR_EMPTY == 0 {
            core::hint::spin_loop();
        }
        self.write_reg(DATA, byte);
    }

    fn receive(&self) -> Option<u8> {
        if self.read_reg(LINE_STS) & LINE_STS_DATA_READY != 0 {
            Some(self.read_reg(DATA))
        } else {
            None
        }
    }
}

impl ConsoleSink for Uart16550 {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send(byte);
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            let Some(byte) = self.receive() else {
                break;
            };
            *slot = byte;
            count += 1;
        }
        count
    }
}
