// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Slicing SysEx messages into USB-MIDI packets

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use crate::config::MAX_CABLE;
use crate::packet::{Cable, Cin, UsbMidiPacket, CIN_SYSEX_CONTINUE};
use crate::{Error, Result, SYSEX_END, SYSEX_START};

/// Transmits single USB-MIDI packets.
///
/// Implemented by the USB-MIDI class driver.
pub trait PacketSink {
    /// Queue one packet for transmission.
    ///
    /// Returns [`Error::TxFailure`] if the packet could not be queued,
    /// for example when the hardware send queue is full.
    fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<()>;
}

impl<T: PacketSink + ?Sized> PacketSink for &mut T {
    fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<()> {
        (**self).send_packet(packet)
    }
}

/// Iterator over the USB-MIDI packets for a SysEx byte buffer.
///
/// Each step looks at the next (up to) three bytes. If they contain an
/// `F7` a terminal packet is produced up to and including it and the
/// iterator finishes, so there is exactly one terminal packet. Otherwise a
/// 3-byte continue packet is produced. A remainder of fewer than three
/// bytes without a terminator becomes a terminal packet of that length.
///
/// Framing is not checked; see [`send_sysex`].
#[derive(Debug, Clone)]
pub struct SysexPackets<'a> {
    rest: &'a [u8],
    cable: Cable,
    done: bool,
}

impl<'a> SysexPackets<'a> {
    pub fn new(data: &'a [u8], cable: Cable) -> Self {
        Self {
            rest: data,
            cable,
            done: data.is_empty(),
        }
    }
}

impl Iterator for SysexPackets<'_> {
    type Item = UsbMidiPacket;

    fn next(&mut self) -> Option<UsbMidiPacket> {
        if self.done {
            return None;
        }

        let window = &self.rest[..self.rest.len().min(3)];
        let (n, cin) = match window.iter().position(|&b| b == SYSEX_END) {
            Some(pos) => (pos + 1, Cin::sysex_end(pos + 1)),
            None if window.len() == 3 => (3, CIN_SYSEX_CONTINUE),
            // malformed, no terminator before the end of input
            None => (window.len(), Cin::sysex_end(window.len())),
        };

        let mut data = [0u8; 3];
        data[..n].copy_from_slice(&window[..n]);
        self.rest = &self.rest[n..];
        self.done = cin != CIN_SYSEX_CONTINUE || self.rest.is_empty();
        Some(UsbMidiPacket::new(self.cable, cin, data))
    }
}

/// Send a complete SysEx message on `cable`.
///
/// `data` must start with `F0` and end with `F7`, and `cable` must be
/// at most [`MAX_CABLE`]. Nothing is sent if those checks fail.
///
/// Succeeds only if `sink` accepted every packet. Transmission stops at
/// the first refused packet and that error is returned.
pub fn send_sysex(
    sink: &mut impl PacketSink,
    data: &[u8],
    cable: Cable,
) -> Result<()> {
    if cable.0 > MAX_CABLE {
        return Err(Error::BadArgument);
    }

    match (data.first(), data.last()) {
        (Some(&SYSEX_START), Some(&SYSEX_END)) if data.len() >= 2 => (),
        _ => {
            debug!("Not sending unframed SysEx, len {}", data.len());
            return Err(Error::InvalidInput);
        }
    }

    for p in SysexPackets::new(data, cable) {
        sink.send_packet(p).inspect_err(|e| {
            trace!("USB-MIDI packet send failed {:?}", e);
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::*;
    use std::vec::Vec;

    #[derive(Default)]
    struct Collect {
        packets: Vec<UsbMidiPacket>,
        // refuse packets once this many have been accepted
        limit: Option<usize>,
    }

    impl PacketSink for Collect {
        fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<()> {
            if self.limit.is_some_and(|l| self.packets.len() >= l) {
                return Err(Error::TxFailure);
            }
            self.packets.push(packet);
            Ok(())
        }
    }

    fn raw(c: &Collect) -> Vec<[u8; 4]> {
        c.packets.iter().map(|p| p.0).collect()
    }

    #[test]
    fn terminal_sizes() {
        let mut c = Collect::default();
        send_sysex(&mut c, &[0xf0, 0x01, 0x02, 0xf7], Cable(0)).unwrap();
        assert_eq!(raw(&c), [[0x04, 0xf0, 0x01, 0x02], [0x05, 0xf7, 0, 0]]);

        let mut c = Collect::default();
        send_sysex(&mut c, &[0xf0, 0x01, 0x02, 0x03, 0xf7], Cable(0))
            .unwrap();
        assert_eq!(
            raw(&c),
            [[0x04, 0xf0, 0x01, 0x02], [0x06, 0x03, 0xf7, 0]]
        );

        let mut c = Collect::default();
        send_sysex(&mut c, &[0xf0, 0x01, 0x02, 0x03, 0x04, 0xf7], Cable(3))
            .unwrap();
        assert_eq!(
            raw(&c),
            [[0x34, 0xf0, 0x01, 0x02], [0x37, 0x03, 0x04, 0xf7]]
        );

        let mut c = Collect::default();
        send_sysex(&mut c, &[0xf0, 0xf7], Cable(1)).unwrap();
        assert_eq!(raw(&c), [[0x16, 0xf0, 0xf7, 0]]);
    }

    #[test]
    fn early_terminator() {
        // stops at the first F7, exactly one terminal packet
        let mut c = Collect::default();
        send_sysex(&mut c, &[0xf0, 0xf7, 0x01, 0x02, 0xf7], Cable(0))
            .unwrap();
        assert_eq!(raw(&c), [[0x06, 0xf0, 0xf7, 0]]);
    }

    #[test]
    fn unframed_rejected() {
        let mut c = Collect::default();
        assert_eq!(send_sysex(&mut c, &[], Cable(0)), Err(Error::InvalidInput));
        assert_eq!(
            send_sysex(&mut c, &[0xf0], Cable(0)),
            Err(Error::InvalidInput)
        );
        assert_eq!(
            send_sysex(&mut c, &[0xf7], Cable(0)),
            Err(Error::InvalidInput)
        );
        assert_eq!(
            send_sysex(&mut c, &[0x01, 0x02, 0xf7], Cable(0)),
            Err(Error::InvalidInput)
        );
        assert_eq!(
            send_sysex(&mut c, &[0xf0, 0x02, 0x03], Cable(0)),
            Err(Error::InvalidInput)
        );
        assert_eq!(
            send_sysex(&mut c, &[0xf0, 0xf7], Cable(MAX_CABLE + 1)),
            Err(Error::BadArgument)
        );
        assert!(c.packets.is_empty());
    }

    #[test]
    fn unterminated_remainder() {
        let p: Vec<_> =
            SysexPackets::new(&[0xf0, 1, 2, 3, 4], Cable(0)).collect();
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].cin(), CIN_SYSEX_CONTINUE);
        assert_eq!(p[1].cin(), CIN_SYSEX_END_2);
        assert_eq!(p[1].sysex_data(), &[3, 4]);

        // a multiple of 3 with no terminator ends on a continue packet
        let p: Vec<_> = SysexPackets::new(&[0xf0, 1, 2], Cable(0)).collect();
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].cin(), CIN_SYSEX_CONTINUE);
    }

    #[test]
    fn tx_failure_reported() {
        let mut c = Collect {
            limit: Some(1),
            ..Default::default()
        };
        let r = send_sysex(&mut c, &[0xf0, 0x01, 0x02, 0x03, 0xf7], Cable(0));
        assert_eq!(r, Err(Error::TxFailure));
        assert_eq!(c.packets.len(), 1);
    }
}
