// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Boot-time entry decision

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use crate::config::MAGIC_KEY;
use crate::flash::{Flash, Programmer};
use crate::Cpu;

/// Why the bootloader is running.
///
/// Decided once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryReason {
    /// Start the application
    #[default]
    None,
    /// Requested by the application through the persistent flag
    Request,
    /// No valid application present
    NoApp,
    /// Entry button held at reset
    Button,
    /// Bootloader SysEx received while running
    Sysex,
}

impl EntryReason {
    /// Returns `true` if the bootloader should stay resident.
    pub fn stay_in_bootloader(&self) -> bool {
        *self != EntryReason::None
    }
}

/// A one-shot flag that survives a soft reset.
///
/// On target this lives in RAM that the startup code does not zero.
pub trait PersistentFlag {
    /// Request bootloader entry at the next boot.
    fn set(&mut self);

    /// Returns `true` if the flag was set, and clears it.
    fn read_and_clear(&mut self) -> bool;
}

/// A [`PersistentFlag`] in an ordinary variable.
#[derive(Debug, Default)]
pub struct MemoryFlag {
    value: u32,
}

impl MemoryFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentFlag for MemoryFlag {
    fn set(&mut self) {
        self.value = MAGIC_KEY;
    }

    fn read_and_clear(&mut self) -> bool {
        core::mem::take(&mut self.value) == MAGIC_KEY
    }
}

/// Decide the entry reason.
///
/// In order: a set persistent flag, a missing application, the entry
/// button.
pub fn check_entry<F: Flash>(
    flag: &mut impl PersistentFlag,
    programmer: &Programmer<F>,
    button_held: bool,
) -> EntryReason {
    if flag.read_and_clear() {
        EntryReason::Request
    } else if !programmer.check_application() {
        EntryReason::NoApp
    } else if button_held {
        EntryReason::Button
    } else {
        EntryReason::None
    }
}

/// Set the persistent flag and reset into the bootloader.
pub fn request_entry(flag: &mut impl PersistentFlag, cpu: &mut impl Cpu) -> ! {
    info!("Bootloader entry requested, resetting");
    flag.set();
    cpu.system_reset()
}
