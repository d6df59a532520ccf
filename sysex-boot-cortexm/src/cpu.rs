// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

#[allow(unused)]
use crate::{debug, info, trace};

use cortex_m::peripheral::SCB;

use sysex_boot::Cpu;

/// Processor control for Cortex-M3 and later.
pub struct CortexM {
    cycles_per_ms: u32,
}

impl CortexM {
    /// `core_hz` is the core clock frequency, used for delays.
    pub const fn new(core_hz: u32) -> Self {
        Self {
            cycles_per_ms: core_hz / 1000,
        }
    }
}

impl Cpu for CortexM {
    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn relocate_vector_table(&mut self, addr: u32) {
        trace!("VTOR {:#x}", addr);
        // SAFETY: VTOR only affects exception dispatch. Interrupts are
        // disabled before this is called on the way to the application.
        unsafe { (*SCB::PTR).vtor.write(addr) }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn start(&mut self, stack_pointer: u32, reset_vector: u32) -> ! {
        // SAFETY: the bootloader has validated the application's vector
        // table. Nothing of the bootloader's state is used after this.
        unsafe {
            cortex_m::asm::bootstrap(
                stack_pointer as *const u32,
                reset_vector as *const u32,
            )
        }
    }

    fn system_reset(&mut self) -> ! {
        SCB::sys_reset()
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            cortex_m::asm::delay(self.cycles_per_ms);
        }
    }
}
