// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! SysEx over USB-MIDI
//!
//! This crate converts between linear System Exclusive messages
//! (`F0 ... F7`) and the 4-byte USB-MIDI event packets that carry them,
//! as described in the USB Device Class Definition for MIDI Devices.
//!
//! [`send_sysex`] slices an outgoing message into packets for a
//! [`PacketSink`]. [`SysexReassembler`] rebuilds incoming messages from
//! packets, and [`PacketReceiver`] pairs a reassembler with the producer
//! half of a [`heapless::spsc`] queue so that complete messages can be
//! handed from a USB receive interrupt to a thread-mode service loop.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![forbid(unsafe_code)]

/// Re-exported so that callers can use the same `heapless` version.
pub use heapless;

mod fmt;
#[macro_use]
mod util;

pub mod config;
mod encode;
mod packet;
mod queue;
mod reassemble;

pub use encode::{send_sysex, PacketSink, SysexPackets};
pub use packet::{
    Cable, Cin, UsbMidiPacket, CIN_SYSEX_CONTINUE, CIN_SYSEX_END_1,
    CIN_SYSEX_END_2, CIN_SYSEX_END_3, SYSEX_END, SYSEX_START,
};
pub use queue::{Inbox, PacketReceiver};
pub use reassemble::{SysexMessage, SysexReassembler};

/// Error type for USB-MIDI SysEx transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The packet transmit primitive refused a packet
    ///
    /// Typically the hardware send queue is full.
    TxFailure,
    /// Bad argument, such as an out of range cable number
    BadArgument,
    /// Input is not a framed SysEx message
    InvalidInput,
    /// A queue or buffer is full
    NoSpace,
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(fmt, "USB-MIDI SysEx Error: {:?}", self)
    }
}

/// USB-MIDI SysEx result type
pub type Result<T> = core::result::Result<T, Error>;
