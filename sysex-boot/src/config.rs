//! Build-time configuration.

use usb_midi_sysex::get_build_var;

/// Bootloader firmware version, reported by QUERY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

pub const VERSION: Version = Version {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Delay between sending the JUMP_APP acknowledgement and jumping.
///
/// Lets the ACK drain from the USB endpoint before the transport is torn
/// down. In milliseconds, `SYSEX_BOOT_SETTLE_MS`.
pub const JUMP_SETTLE_MS: u32 = get_build_var!("SYSEX_BOOT_SETTLE_MS", 100) as u32;

/// Sentinel stored in the persistent flag to request bootloader entry.
pub const MAGIC_KEY: u32 = 0xB007_C0DE;
