// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Handing complete messages from the receive context to a service loop

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use heapless::spsc::{Producer, Queue};

use crate::config::{INBOX_SLOTS, MAX_CABLE};
use crate::packet::UsbMidiPacket;
use crate::reassemble::{SysexMessage, SysexReassembler};
use crate::{Error, Result};

/// Single-producer single-consumer queue of complete messages.
///
/// Split it with [`Queue::split`]; the producer goes to a
/// [`PacketReceiver`] in the USB receive context, the consumer to the
/// service loop.
pub type Inbox = Queue<SysexMessage, INBOX_SLOTS>;

/// Receive-side packet handler.
///
/// Reassembles packets and enqueues complete messages. It never blocks and
/// never processes message contents, so it is safe to call from a USB
/// interrupt handler.
pub struct PacketReceiver<'q> {
    reassembler: SysexReassembler,
    producer: Producer<'q, SysexMessage, INBOX_SLOTS>,
}

impl<'q> PacketReceiver<'q> {
    pub fn new(producer: Producer<'q, SysexMessage, INBOX_SLOTS>) -> Self {
        Self {
            reassembler: SysexReassembler::new(),
            producer,
        }
    }

    /// Handle one received packet.
    ///
    /// Packets on cables above [`MAX_CABLE`] are dropped, since no reply
    /// could be sent on them.
    ///
    /// Returns [`Error::NoSpace`] if a message was completed but the inbox
    /// was full. That message is dropped.
    pub fn packet_in(&mut self, packet: UsbMidiPacket) -> Result<()> {
        if packet.cable().0 > MAX_CABLE {
            trace!("Dropping packet for cable {}", packet.cable().0);
            return Ok(());
        }

        let Some(msg) = self.reassembler.receive(&packet) else {
            return Ok(());
        };

        self.producer.enqueue(msg).map_err(|_| {
            warn!("SysEx inbox full, message dropped");
            Error::NoSpace
        })
    }

    /// Handle a bulk OUT transfer of packed 4-byte packets.
    ///
    /// All complete packets are processed even if an earlier one failed;
    /// the last error is returned. A trailing partial packet is
    /// [`Error::InvalidInput`].
    pub fn transfer_in(&mut self, buf: &[u8]) -> Result<()> {
        let mut res = Ok(());
        let chunks = buf.chunks_exact(4);
        if !chunks.remainder().is_empty() {
            debug!("USB-MIDI transfer length {} not a multiple of 4", buf.len());
            res = Err(Error::InvalidInput);
        }

        for c in chunks {
            let p = UsbMidiPacket([c[0], c[1], c[2], c[3]]);
            if let Err(e) = self.packet_in(p) {
                res = Err(e);
            }
        }
        res
    }

    /// Returns `true` when no message is partially received.
    pub fn is_idle(&self) -> bool {
        self.reassembler.is_idle()
    }
}
