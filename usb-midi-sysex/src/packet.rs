// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! USB-MIDI event packets

use crate::config::MAX_CABLE;
use crate::{Error, Result};

/// Start of a System Exclusive message
pub const SYSEX_START: u8 = 0xF0;
/// End of a System Exclusive message
pub const SYSEX_END: u8 = 0xF7;

/// Virtual cable number, the high nibble of a packet header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cable(pub u8);

impl Cable {
    /// Construct a cable number that this device exposes.
    ///
    /// Values above [`MAX_CABLE`] are rejected.
    pub const fn new(cable: u8) -> Result<Cable> {
        if cable > MAX_CABLE {
            Err(Error::BadArgument)
        } else {
            Ok(Cable(cable))
        }
    }
}

impl core::fmt::Display for Cable {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.0.fmt(fmt)
    }
}

/// Code Index Number, the low nibble of a packet header.
///
/// Defined values are in table 4-1 of the USB MIDI 1.0 class definition.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cin(pub u8);

/// SysEx starts or continues, 3 bytes
pub const CIN_SYSEX_CONTINUE: Cin = Cin(0x4);
/// SysEx ends with the following single byte
pub const CIN_SYSEX_END_1: Cin = Cin(0x5);
/// SysEx ends with the following two bytes
pub const CIN_SYSEX_END_2: Cin = Cin(0x6);
/// SysEx ends with the following three bytes
pub const CIN_SYSEX_END_3: Cin = Cin(0x7);

impl Cin {
    /// The terminal CIN for a final packet carrying `n` bytes, 1 to 3.
    pub(crate) fn sysex_end(n: usize) -> Cin {
        debug_assert!((1..=3).contains(&n));
        Cin(CIN_SYSEX_END_1.0 + (n as u8).saturating_sub(1).min(2))
    }

    /// Returns the number of SysEx bytes carried and whether the
    /// packet terminates the message.
    ///
    /// `None` for CINs that do not carry SysEx data.
    pub fn sysex_bytes(&self) -> Option<(usize, bool)> {
        match *self {
            CIN_SYSEX_CONTINUE => Some((3, false)),
            CIN_SYSEX_END_1 => Some((1, true)),
            CIN_SYSEX_END_2 => Some((2, true)),
            CIN_SYSEX_END_3 => Some((3, true)),
            _ => None,
        }
    }
}

/// A 4-byte USB-MIDI event packet.
///
/// `[(cable << 4) | cin, b0, b1, b2]`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbMidiPacket(pub [u8; 4]);

impl UsbMidiPacket {
    /// Build a packet. Unused data bytes should be zero.
    pub fn new(cable: Cable, cin: Cin, data: [u8; 3]) -> Self {
        let hdr = ((cable.0 & 0x0f) << 4) | (cin.0 & 0x0f);
        Self([hdr, data[0], data[1], data[2]])
    }

    pub fn cable(&self) -> Cable {
        Cable(self.0[0] >> 4)
    }

    pub fn cin(&self) -> Cin {
        Cin(self.0[0] & 0x0f)
    }

    /// The SysEx bytes carried by this packet.
    ///
    /// Empty for packets that aren't part of a SysEx message.
    pub fn sysex_data(&self) -> &[u8] {
        match self.cin().sysex_bytes() {
            Some((n, _)) => &self.0[1..1 + n],
            None => &[],
        }
    }
}

impl From<[u8; 4]> for UsbMidiPacket {
    fn from(b: [u8; 4]) -> Self {
        Self(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_nibbles() {
        let p = UsbMidiPacket::new(Cable(2), CIN_SYSEX_END_2, [0x01, 0xf7, 0]);
        assert_eq!(p.0, [0x26, 0x01, 0xf7, 0x00]);
        assert_eq!(p.cable(), Cable(2));
        assert_eq!(p.cin(), CIN_SYSEX_END_2);
        assert_eq!(p.sysex_data(), &[0x01, 0xf7]);
    }

    #[test]
    fn non_sysex() {
        // note on, cable 0
        let p = UsbMidiPacket([0x09, 0x90, 0x40, 0x7f]);
        assert_eq!(p.cin().sysex_bytes(), None);
        assert!(p.sysex_data().is_empty());
    }

    #[test]
    fn cable_range() {
        assert_eq!(Cable::new(MAX_CABLE), Ok(Cable(MAX_CABLE)));
        assert_eq!(Cable::new(MAX_CABLE + 1), Err(Error::BadArgument));
    }

    #[test]
    fn end_cins() {
        assert_eq!(Cin::sysex_end(1), CIN_SYSEX_END_1);
        assert_eq!(Cin::sysex_end(2), CIN_SYSEX_END_2);
        assert_eq!(Cin::sysex_end(3), CIN_SYSEX_END_3);
    }
}
