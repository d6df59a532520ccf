// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Application side of the bootloader handover.
//!
//! A running application passes incoming SysEx messages through
//! [`handle_sysex`] before its own MIDI routing. A bootloader message
//! from the host resets the device into the bootloader, so an update can
//! start without any button press.

use crate::entry::{request_entry, PersistentFlag};
use crate::proto::{is_device_id, MANUFACTURER_ID, MIN_MESSAGE_LEN};
use crate::Cpu;

use usb_midi_sysex::SYSEX_START;

/// Returns `true` if `msg` carries the bootloader header.
///
/// Only the header is checked; any bootloader command triggers entry.
pub fn is_bootloader_sysex(msg: &[u8]) -> bool {
    msg.len() >= MIN_MESSAGE_LEN
        && msg[0] == SYSEX_START
        && msg[1..4] == MANUFACTURER_ID
        && is_device_id(msg[4])
}

/// Enter the bootloader if `msg` is addressed to it.
///
/// Does not return in that case. Otherwise the message should be routed
/// as usual.
pub fn handle_sysex(
    msg: &[u8],
    flag: &mut impl PersistentFlag,
    cpu: &mut impl Cpu,
) {
    if is_bootloader_sysex(msg) {
        request_entry(flag, cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MemoryFlag;
    use crate::sim::{catch_exit, Exit, SimCpu};

    #[test]
    fn detection() {
        assert!(is_bootloader_sysex(&[0xF0, 0x00, 0x00, 0x7E, 0x40, 0x01, 0x7F, 0xF7]));
        assert!(is_bootloader_sysex(&[0xF0, 0x00, 0x00, 0x7E, 0x4E, 0x05, 0x7B, 0xF7]));
        assert!(!is_bootloader_sysex(&[0xF0, 0x00, 0x00, 0x7E, 0x41, 0x01, 0x7F, 0xF7]));
        assert!(!is_bootloader_sysex(&[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]));
        assert!(!is_bootloader_sysex(&[]));
    }

    #[test]
    fn other_sysex_passes() {
        let mut flag = MemoryFlag::new();
        let mut cpu = SimCpu::new();
        // universal identity request
        let r = catch_exit(|| {
            handle_sysex(&[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7], &mut flag, &mut cpu)
        });
        assert_eq!(r, Ok(()));
        assert!(!flag.read_and_clear());
    }

    #[test]
    fn bootloader_sysex_resets() {
        let mut flag = MemoryFlag::new();
        let mut cpu = SimCpu::new();
        let r = catch_exit(|| {
            handle_sysex(
                &[0xF0, 0x00, 0x00, 0x7E, 0x40, 0x01, 0x7F, 0xF7],
                &mut flag,
                &mut cpu,
            )
        });
        assert_eq!(r, Err(Exit::Reset));
        assert!(flag.read_and_clear());
    }
}
