// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

/// Processor control used to start the application or reset.
pub trait Cpu {
    fn disable_interrupts(&mut self);

    /// Point the vector table base register at `addr`.
    fn relocate_vector_table(&mut self, addr: u32);

    /// Load the main stack pointer and branch to `reset_vector`.
    ///
    /// Does not return.
    fn start(&mut self, stack_pointer: u32, reset_vector: u32) -> !;

    /// Request a system reset. Does not return.
    fn system_reset(&mut self) -> !;

    /// Busy wait.
    fn delay_ms(&mut self, ms: u32);
}
