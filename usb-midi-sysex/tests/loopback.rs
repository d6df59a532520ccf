// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Sends messages through `send_sysex` straight into a `PacketReceiver`.

use usb_midi_sysex::{
    config, send_sysex, Cable, Error, Inbox, PacketReceiver, PacketSink,
    UsbMidiPacket, SYSEX_END, SYSEX_START,
};

use proptest::prelude::*;

struct Loopback<'q> {
    rx: PacketReceiver<'q>,
    sent: usize,
}

impl PacketSink for Loopback<'_> {
    fn send_packet(
        &mut self,
        packet: UsbMidiPacket,
    ) -> usb_midi_sysex::Result<()> {
        self.sent += 1;
        self.rx.packet_in(packet)
    }
}

fn start_log() {
    let _ = env_logger::Builder::new()
        .filter(None, log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

#[test]
fn cables_preserved() {
    start_log();
    let mut inbox = Inbox::new();
    let (prod, mut cons) = inbox.split();
    let mut lo = Loopback {
        rx: PacketReceiver::new(prod),
        sent: 0,
    };

    let msg = [0xf0, 0x00, 0x00, 0x7e, 0x40, 0x01, 0x7f, 0xf7];
    send_sysex(&mut lo, &msg, Cable(3)).unwrap();
    // 8 bytes: two continue packets then a 2 byte end
    assert_eq!(lo.sent, 3);

    let m = cons.dequeue().unwrap();
    assert_eq!(m.cable, Cable(3));
    assert_eq!(&m.data[..], &msg);
}

#[test]
fn dropped_message_is_reported() {
    start_log();
    let mut inbox = Inbox::new();
    let (prod, _cons) = inbox.split();
    let mut lo = Loopback {
        rx: PacketReceiver::new(prod),
        sent: 0,
    };

    let msg = [0xf0, 0x01, 0xf7];
    for _ in 0..config::INBOX_SLOTS - 1 {
        send_sysex(&mut lo, &msg, Cable(0)).unwrap();
    }
    assert_eq!(send_sysex(&mut lo, &msg, Cable(0)), Err(Error::NoSpace));
}

proptest! {
    #[test]
    fn loopback_roundtrip(
        body in proptest::collection::vec(0u8..0x80, 0..=config::MAX_SYSEX-2),
        cable in 0..=config::MAX_CABLE,
    ) {
        let mut inbox = Inbox::new();
        let (prod, mut cons) = inbox.split();
        let mut lo = Loopback { rx: PacketReceiver::new(prod), sent: 0 };

        let mut msg = vec![SYSEX_START];
        msg.extend_from_slice(&body);
        msg.push(SYSEX_END);
        send_sysex(&mut lo, &msg, Cable(cable)).unwrap();

        prop_assert_eq!(lo.sent, msg.len().div_ceil(3));
        let m = cons.dequeue().unwrap();
        prop_assert_eq!(m.cable, Cable(cable));
        prop_assert_eq!(&m.data[..], &msg[..]);
    }
}
