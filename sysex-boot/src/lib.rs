// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! # SysEx Bootloader
//!
//! Firmware update over USB-MIDI System Exclusive messages.
//!
//! A [`Bootloader`] owns the flash [`Programmer`] and the boot
//! [`EntryReason`]. At reset, [`Bootloader::init`] decides whether to stay
//! in the bootloader or start the application. While in the bootloader,
//! complete SysEx messages are queued by a
//! [`PacketReceiver`](usb_midi_sysex::PacketReceiver) from the USB receive
//! context and serviced by [`Bootloader::poll`], which erases, programs and
//! verifies the application region and replies to the host.
//!
//! Hardware is reached through the [`Flash`], [`Cpu`] and
//! [`PersistentFlag`] traits, and responses through a
//! [`PacketSink`](usb_midi_sysex::PacketSink).
//!
//! The [`app`] module holds the hook that a running application uses to
//! hand over to the bootloader, and [`proto`] the wire format shared with
//! host tools.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![forbid(unsafe_code)]

mod fmt;

pub mod app;
pub mod config;
mod cpu;
mod entry;
pub mod flash;
pub mod layout;
pub mod proto;
mod responder;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use cpu::Cpu;
pub use entry::{check_entry, request_entry, EntryReason, MemoryFlag, PersistentFlag};
pub use flash::{crc32, ApplicationVectorTable, Flash, Programmer, Unlocked};
pub use layout::{MemoryLayout, Sector};
pub use responder::{Bootloader, Outcome, RemainedInBootloader};

/// Error type for the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Sending a response failed
    Transport(usb_midi_sysex::Error),
    /// Range lies outside the application region
    OutOfBounds,
    /// Address is not aligned to the flash programming unit
    Unaligned,
    /// Flash controller could not be unlocked
    Unlock,
    /// Sector erase failed
    Erase,
    /// Programming failed
    Program,
    /// A memory read faulted
    Fault,
    /// Bad argument
    BadArgument,
    /// Provided buffer is too small
    NoSpace,
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Transport(e) => write!(fmt, "Bootloader transport: {}", e),
            _ => write!(fmt, "Bootloader Error: {:?}", self),
        }
    }
}

impl From<usb_midi_sysex::Error> for Error {
    fn from(e: usb_midi_sysex::Error) -> Self {
        Self::Transport(e)
    }
}

/// Bootloader result type
pub type Result<T> = core::result::Result<T, Error>;
