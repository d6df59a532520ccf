// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Rebuilding SysEx messages from USB-MIDI packets

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use heapless::Vec;

use crate::config::MAX_SYSEX;
use crate::packet::{Cable, UsbMidiPacket, SYSEX_START};

/// A complete SysEx message received from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SysexMessage {
    /// Cable of the packet that terminated the message
    pub cable: Cable,
    pub data: Vec<u8, MAX_SYSEX>,
}

/// Accumulates SysEx packets into messages.
///
/// Bytes beyond [`MAX_SYSEX`] are dropped, but the message boundary is still
/// tracked; a message that overflowed is discarded when its terminating
/// packet arrives rather than being delivered truncated.
///
/// A packet starting with `F0` always begins a new message. Any partial
/// message, for example from an aborted transfer, is discarded.
#[derive(Debug, Default)]
pub struct SysexReassembler {
    buf: Vec<u8, MAX_SYSEX>,
    overflow: bool,
}

impl SysexReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet.
    ///
    /// Returns a message when `packet` terminates one. Packets that don't
    /// carry SysEx data are ignored.
    pub fn receive(&mut self, packet: &UsbMidiPacket) -> Option<SysexMessage> {
        let (_, end) = packet.cin().sysex_bytes()?;
        let data = packet.sysex_data();

        if data.first() == Some(&SYSEX_START) && !self.is_idle() {
            debug!(
                "SysEx restarted, discarding {} partial bytes",
                self.buf.len()
            );
            self.reset();
        }

        for &b in data {
            if self.buf.push(b).is_err() {
                self.overflow = true;
            }
        }

        if !end {
            return None;
        }

        let data = core::mem::take(&mut self.buf);
        if core::mem::take(&mut self.overflow) {
            warn!("SysEx message exceeded {} bytes, dropped", MAX_SYSEX);
            return None;
        }

        trace!("SysEx message len {} cable {}", data.len(), packet.cable().0);
        Some(SysexMessage {
            cable: packet.cable(),
            data,
        })
    }

    /// Discard any partially received message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflow = false;
    }

    /// Returns `true` when no message is partially received.
    pub fn is_idle(&self) -> bool {
        self.buf.is_empty() && !self.overflow
    }
}
