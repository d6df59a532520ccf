//! Build-time configuration.
//!
//! Values may be overridden by setting the named environment variable
//! when building.

/// Maximum length of an accumulated SysEx message, including `F0` and `F7`.
///
/// `USB_MIDI_SYSEX_MAX`
pub const MAX_SYSEX: usize = get_build_var!("USB_MIDI_SYSEX_MAX", 256);

/// Storage slots in an [`Inbox`](crate::Inbox).
///
/// One slot is always kept free, so an inbox holds one fewer message.
///
/// `USB_MIDI_SYSEX_INBOX`
pub const INBOX_SLOTS: usize = get_build_var!("USB_MIDI_SYSEX_INBOX", 4);

/// Highest virtual cable number this device exposes.
///
/// `USB_MIDI_MAX_CABLE`
pub const MAX_CABLE: u8 = {
    let c = get_build_var!("USB_MIDI_MAX_CABLE", 3);
    assert!(c <= 15, "USB-MIDI cable numbers are 4 bits");
    c as u8
};

const _: () = assert!(MAX_SYSEX >= 2, "USB_MIDI_SYSEX_MAX too small");
const _: () = assert!(INBOX_SLOTS >= 2, "USB_MIDI_SYSEX_INBOX too small");
