// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

use core::ptr::read_volatile;

use sysex_boot::{Error, Result};

/// Flash that the CPU can read directly.
///
/// Flash controller drivers use this for [`Flash::read`](sysex_boot::Flash::read).
#[derive(Debug, Clone, Copy)]
pub struct MappedFlash {
    start: u32,
    end: u32,
}

impl MappedFlash {
    /// # Safety
    ///
    /// `start..end` must be readable memory for the life of the program.
    pub const unsafe fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Read from flash. Returns [`Error::Fault`] outside the mapped range.
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let len = u32::try_from(buf.len()).map_err(|_| Error::Fault)?;
        let end = addr.checked_add(len).ok_or(Error::Fault)?;
        if addr < self.start || end > self.end {
            return Err(Error::Fault);
        }

        let p = addr as *const u8;
        for (i, b) in buf.iter_mut().enumerate() {
            // SAFETY: in range, by the constructor contract
            *b = unsafe { read_volatile(p.add(i)) };
        }
        Ok(())
    }
}
