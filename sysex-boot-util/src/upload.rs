// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Building upload message sequences from a firmware image.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use anyhow::{bail, Result};

use sysex_boot::proto::{Request, DEVICE_ID};
use sysex_boot::MemoryLayout;
use usb_midi_sysex::config::MAX_SYSEX;
use usb_midi_sysex::{SYSEX_END, SYSEX_START};

/// Program unit of the target flash. Block offsets must be aligned to it.
const PROGRAM_UNIT: usize = 4;

/// Largest block whose length fits the low length byte, rounded down to
/// the program unit.
pub const MAX_BLOCK_SIZE: usize = 124;

pub const DEFAULT_BLOCK_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub block_size: usize,
    /// Offset of the image within the application region
    pub offset: u32,
    pub erase: bool,
    pub jump: bool,
    pub device_id: u8,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            offset: 0,
            erase: true,
            jump: true,
            device_id: DEVICE_ID,
        }
    }
}

fn encode(req: Request, device_id: u8) -> Result<Vec<u8>> {
    let mut b = heapless::Vec::<u8, MAX_SYSEX>::new();
    req.encode(&mut b, device_id)?;
    Ok(b.to_vec())
}

/// The complete message sequence to program `image`.
///
/// ERASE_APP, then WRITE_BLOCK for each block, then JUMP_APP, depending on
/// `opts`.
pub fn upload_messages(
    image: &[u8],
    layout: &MemoryLayout,
    opts: &UploadOptions,
) -> Result<Vec<Vec<u8>>> {
    let bs = opts.block_size;
    if bs == 0 || bs > MAX_BLOCK_SIZE || bs % PROGRAM_UNIT != 0 {
        bail!(
            "Block size {} must be a multiple of {} up to {}",
            bs,
            PROGRAM_UNIT,
            MAX_BLOCK_SIZE
        );
    }
    if opts.offset as usize % PROGRAM_UNIT != 0 {
        bail!("Offset 0x{:x} is not {} byte aligned", opts.offset, PROGRAM_UNIT);
    }
    if image.is_empty() {
        bail!("Empty image");
    }
    if layout.app_range(opts.offset, image.len()).is_none() {
        bail!(
            "Image of {} bytes at offset 0x{:x} exceeds the {} byte application region",
            image.len(),
            opts.offset,
            layout.app_max_size
        );
    }

    let high = image.iter().filter(|b| **b >= 0x80).count();
    if high > 0 {
        warn!(
            "Image has {} bytes with the high bit set. Data is sent untranscoded, MIDI transports may not carry them.",
            high
        );
    }

    let mut msgs = Vec::new();
    if opts.erase {
        msgs.push(encode(Request::EraseApp, opts.device_id)?);
    }
    let mut offset = opts.offset;
    for data in image.chunks(bs) {
        msgs.push(encode(Request::WriteBlock { offset, data }, opts.device_id)?);
        offset += data.len() as u32;
    }
    if opts.jump {
        msgs.push(encode(Request::JumpApp, opts.device_id)?);
    }
    debug!("{} messages for {} byte image", msgs.len(), image.len());
    Ok(msgs)
}

/// Split a byte stream into SysEx messages.
///
/// Bytes outside `F0 ... F7` are skipped. An unterminated trailing
/// message is an error.
pub fn split_messages(stream: &[u8]) -> Result<Vec<&[u8]>> {
    let mut msgs = Vec::new();
    let mut start = None;
    for (i, b) in stream.iter().enumerate() {
        match (*b, start) {
            (SYSEX_START, _) => {
                if start.is_some() {
                    warn!("Unterminated SysEx at offset {}", i);
                }
                start = Some(i)
            }
            (SYSEX_END, Some(s)) => {
                msgs.push(&stream[s..=i]);
                start = None;
            }
            _ => (),
        }
    }
    if let Some(s) = start {
        bail!("Unterminated SysEx at offset {}", s);
    }
    Ok(msgs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysex_boot::proto::{Command, Frame};

    const L: MemoryLayout = MemoryLayout::STM32F407;

    fn commands(msgs: &[Vec<u8>]) -> Vec<u8> {
        msgs.iter().map(|m| Frame::parse(m).unwrap().command).collect()
    }

    #[test]
    fn sequence() {
        let image = vec![0x11u8; 150];
        let msgs = upload_messages(&image, &L, &UploadOptions::default()).unwrap();
        assert_eq!(
            commands(&msgs),
            [
                Command::EraseApp as u8,
                Command::WriteBlock as u8,
                Command::WriteBlock as u8,
                Command::WriteBlock as u8,
                Command::JumpApp as u8
            ]
        );
        // last block carries the remainder
        assert_eq!(msgs[3].len(), 6 + 5 + 2 + 22 + 2);
        assert!(msgs.iter().all(|m| Frame::parse(m).unwrap().checksum_ok()));
    }

    #[test]
    fn options() {
        let opts = UploadOptions {
            erase: false,
            jump: false,
            block_size: 8,
            offset: 0x100,
            device_id: sysex_boot::proto::DEVICE_ID_LEGACY,
        };
        let msgs = upload_messages(&[1, 2, 3, 4, 5, 6, 7, 8, 9], &L, &opts).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| m[4] == 0x4E));
    }

    #[test]
    fn rejects() {
        let l = &L;
        let img = [0u8; 16];
        let bad_bs = UploadOptions {
            block_size: 6,
            ..Default::default()
        };
        assert!(upload_messages(&img, l, &bad_bs).is_err());
        let big_bs = UploadOptions {
            block_size: 128,
            ..Default::default()
        };
        assert!(upload_messages(&img, l, &big_bs).is_err());
        assert!(upload_messages(&[], l, &UploadOptions::default()).is_err());
        let past_end = UploadOptions {
            offset: l.app_max_size - 8,
            ..Default::default()
        };
        assert!(upload_messages(&img, l, &past_end).is_err());
    }

    #[test]
    fn replay_programs_image() {
        use sysex_boot::proto::Response;
        use sysex_boot::sim::{RecordingSink, SimCpu, SimFlash};
        use sysex_boot::{Bootloader, Programmer};

        let image: Vec<u8> = (0..300u32).map(|i| (i % 0x70) as u8).collect();
        let opts = UploadOptions {
            jump: false,
            ..Default::default()
        };
        let msgs = upload_messages(&image, &L, &opts).unwrap();

        let mut boot = Bootloader::new(Programmer::new(SimFlash::new(&L), L));
        let mut sink = RecordingSink::new();
        let mut cpu = SimCpu::new();
        for m in &msgs {
            boot.process_sysex(m, usb_midi_sysex::Cable(0), &mut sink, &mut cpu)
                .unwrap();
        }
        let resp = sink.responses();
        assert_eq!(resp.len(), msgs.len());
        assert!(resp.iter().all(|r| matches!(r, Response::Ack { .. })));
        assert_eq!(
            boot.programmer().image_crc(0, image.len()).unwrap(),
            sysex_boot::crc32(&image)
        );
    }

    #[test]
    fn split() {
        let s = [0x00, 0xF0, 0x01, 0xF7, 0xF0, 0xF7, 0x90];
        let m = split_messages(&s).unwrap();
        assert_eq!(m, [&[0xF0, 0x01, 0xF7][..], &[0xF0, 0xF7][..]]);
        assert!(split_messages(&[0xF0, 0x01]).is_err());
    }
}
