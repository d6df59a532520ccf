// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Persistent flags in RAM that is not cleared at reset.

#[allow(unused)]
use crate::{debug, info, trace};

use core::mem::MaybeUninit;
use core::ptr::{addr_of_mut, read_volatile, write_volatile};
use core::sync::atomic::{AtomicBool, Ordering};

use sysex_boot::config::MAGIC_KEY;
use sysex_boot::{MemoryLayout, PersistentFlag};

// cortex-m-rt leaves `.uninit` untouched at startup
#[link_section = ".uninit.sysex_boot.flag"]
static mut FLAG_WORD: MaybeUninit<u32> = MaybeUninit::uninit();

static FLAG_TAKEN: AtomicBool = AtomicBool::new(false);

fn flag_word() -> *mut u32 {
    // SAFETY: only the address is taken
    unsafe { addr_of_mut!(FLAG_WORD) as *mut u32 }
}

/// A flag in the `.uninit` section of the bootloader's RAM.
///
/// The application must reserve the same address for this to work, so
/// [`FixedAddressFlag`] is usually more convenient for a separately
/// linked application.
pub struct UninitFlag {
    _private: (),
}

impl UninitFlag {
    /// Returns the flag on the first call only.
    pub fn take() -> Option<Self> {
        if FLAG_TAKEN.swap(true, Ordering::Relaxed) {
            None
        } else {
            Some(Self { _private: () })
        }
    }
}

impl PersistentFlag for UninitFlag {
    fn set(&mut self) {
        // SAFETY: Only one UninitFlag exists. Any bit pattern is a
        // valid u32.
        unsafe { write_volatile(flag_word(), MAGIC_KEY) }
    }

    fn read_and_clear(&mut self) -> bool {
        let p = flag_word();
        // SAFETY: as for set()
        let v = unsafe { read_volatile(p) };
        unsafe { write_volatile(p, 0) };
        v == MAGIC_KEY
    }
}

/// A flag at a fixed RAM address shared by bootloader and application.
pub struct FixedAddressFlag {
    addr: *mut u32,
}

impl FixedAddressFlag {
    /// # Safety
    ///
    /// `addr` must be aligned, writable RAM that nothing else uses, and
    /// must not be zeroed by either image's startup code.
    pub const unsafe fn new(addr: u32) -> Self {
        Self {
            addr: addr as *mut u32,
        }
    }

    /// The word 16 bytes below the top of RAM.
    ///
    /// # Safety
    ///
    /// As for [`new`](Self::new). The stack of both images must stop
    /// short of this word.
    pub const unsafe fn below_stack(layout: &MemoryLayout) -> Self {
        unsafe { Self::new(layout.ram_end - 16) }
    }
}

impl PersistentFlag for FixedAddressFlag {
    fn set(&mut self) {
        // SAFETY: by the constructor contract
        unsafe { write_volatile(self.addr, MAGIC_KEY) }
    }

    fn read_and_clear(&mut self) -> bool {
        // SAFETY: by the constructor contract
        let v = unsafe { read_volatile(self.addr) };
        unsafe { write_volatile(self.addr, 0) };
        if v == MAGIC_KEY {
            debug!("Persistent entry flag was set");
        }
        v == MAGIC_KEY
    }
}
