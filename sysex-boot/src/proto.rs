// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Bootloader SysEx message format
//!
//! ```text
//! Request:  F0 00 00 7E <devid> <cmd> <payload...> <chk> F7
//! Response: F0 00 00 7E <devid> <resp> <cmd> <data...> <chk> F7
//! ```
//!
//! The checksum covers the bytes from the command (or response code) to the
//! end of the payload. 32-bit values are sent as five 7-bit bytes, most
//! significant first.
//!
//! Payload bytes are not transcoded, so WRITE_BLOCK data must already be
//! 7-bit clean to pass through a MIDI transport intact.

use heapless::Vec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use usb_midi_sysex::{SYSEX_END, SYSEX_START};

use crate::config::Version;
use crate::{Error, Result};

/// Non-commercial / educational manufacturer ID
pub const MANUFACTURER_ID: [u8; 3] = [0x00, 0x00, 0x7E];
/// Device ID used for all transmitted messages
pub const DEVICE_ID: u8 = 0x40;
/// Device ID accepted from older host tools
pub const DEVICE_ID_LEGACY: u8 = 0x4E;

/// `F0`, manufacturer ID and device ID
pub const HEADER_LEN: usize = 5;
/// Checksum and `F7`
pub const TRAILER_LEN: usize = 2;
/// Header, command byte and trailer
pub const MIN_MESSAGE_LEN: usize = HEADER_LEN + 1 + TRAILER_LEN;

/// Response code for a successful command
pub const RESP_ACK: u8 = 0x0F;
/// Response code for a failed command
pub const RESP_ERROR: u8 = 0x0E;

/// Largest data block accepted by WRITE_BLOCK
pub const MAX_BLOCK: usize = 256;

// offset and length fields
const WRITE_BLOCK_FIELDS: usize = 5 + 2;

/// Enough for any response message
pub const RESPONSE_MAX: usize = 32;

/// Bootloader commands.
///
/// READ_BLOCK (0x03) is reserved and not implemented.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Query = 0x01,
    WriteBlock = 0x02,
    EraseApp = 0x04,
    JumpApp = 0x05,
}

/// Codes carried in an ERROR response.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    InvalidCmd = 1,
    InvalidLen = 2,
    /// Reserved, not currently sent
    InvalidAddr = 3,
    WriteFailed = 4,
    EraseFailed = 5,
    VerifyFailed = 6,
    Checksum = 7,
}

/// Two's complement 7-bit checksum of `bytes`.
///
/// Adding the checksum to the sum of `bytes` gives zero modulo 128.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |a, b| a.wrapping_add(*b));
    sum.wrapping_neg() & 0x7F
}

/// Encode a 32-bit value as five 7-bit bytes.
pub fn encode_u32(v: u32) -> [u8; 5] {
    [
        ((v >> 28) & 0x0F) as u8,
        ((v >> 21) & 0x7F) as u8,
        ((v >> 14) & 0x7F) as u8,
        ((v >> 7) & 0x7F) as u8,
        (v & 0x7F) as u8,
    ]
}

/// Decode five 7-bit bytes to a 32-bit value.
pub fn decode_u32(b: &[u8; 5]) -> u32 {
    b.iter().fold(0u32, |v, &b| (v << 7) | (b & 0x7F) as u32)
}

fn split_u32(b: &[u8]) -> Option<(u32, &[u8])> {
    let (v, rest) = b.split_first_chunk::<5>()?;
    Some((decode_u32(v), rest))
}

/// Returns `true` for device IDs the bootloader answers to.
pub fn is_device_id(id: u8) -> bool {
    matches!(id, DEVICE_ID | DEVICE_ID_LEGACY)
}

/// A bootloader message with valid framing and header.
///
/// The checksum has not necessarily been checked,
/// see [`checksum_ok`](Self::checksum_ok).
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub device_id: u8,
    /// Command, or response code
    pub command: u8,
    pub payload: &'a [u8],
    pub checksum: u8,
    // command and payload
    body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse a complete SysEx message.
    ///
    /// Returns `None` for anything that isn't addressed to the bootloader,
    /// including bad framing. Such messages are expected on a shared bus.
    pub fn parse(msg: &'a [u8]) -> Option<Self> {
        if msg.len() < MIN_MESSAGE_LEN {
            return None;
        }
        let (hdr, rest) = msg.split_at(HEADER_LEN);
        let (body, trailer) = rest.split_at(rest.len() - TRAILER_LEN);

        if hdr[0] != SYSEX_START || trailer[1] != SYSEX_END {
            return None;
        }
        if hdr[1..4] != MANUFACTURER_ID || !is_device_id(hdr[4]) {
            return None;
        }

        Some(Self {
            device_id: hdr[4],
            command: body[0],
            payload: &body[1..],
            checksum: trailer[0],
            body,
        })
    }

    pub fn checksum_ok(&self) -> bool {
        checksum(self.body) == self.checksum
    }

    /// Length of the whole message
    pub fn message_len(&self) -> usize {
        HEADER_LEN + self.body.len() + TRAILER_LEN
    }
}

/// Write a complete message with a header and checksum.
fn build<const N: usize>(
    out: &mut Vec<u8, N>,
    device_id: u8,
    parts: &[&[u8]],
) -> Result<()> {
    out.clear();
    out.push(SYSEX_START).map_err(|_| Error::NoSpace)?;
    out.extend_from_slice(&MANUFACTURER_ID)
        .map_err(|_| Error::NoSpace)?;
    out.push(device_id).map_err(|_| Error::NoSpace)?;
    for p in parts {
        out.extend_from_slice(p).map_err(|_| Error::NoSpace)?;
    }
    let chk = checksum(&out[HEADER_LEN..]);
    out.extend_from_slice(&[chk, SYSEX_END])
        .map_err(|_| Error::NoSpace)?;
    Ok(())
}

/// Contents of the QUERY response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInfo {
    pub version: Version,
    pub flash_size_kb: u32,
    /// Absolute address of the application region
    pub app_base: u32,
}

/// A bootloader response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// Success, with a command-specific value
    Ack { command: u8, value: u32 },
    Error { command: u8, code: ErrorCode },
    /// Successful QUERY
    Info(BootInfo),
}

impl Response {
    /// Encode a response with the standard device ID.
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<()> {
        match self {
            Self::Ack { command, value } => build(
                out,
                DEVICE_ID,
                &[&[RESP_ACK, command & 0x7F], &encode_u32(*value)],
            ),
            Self::Error { command, code } => build(
                out,
                DEVICE_ID,
                &[&[RESP_ERROR, command & 0x7F, *code as u8]],
            ),
            Self::Info(i) => build(
                out,
                DEVICE_ID,
                &[
                    &[
                        RESP_ACK,
                        Command::Query as u8,
                        i.version.major & 0x7F,
                        i.version.minor & 0x7F,
                        i.version.patch & 0x7F,
                    ],
                    &encode_u32(i.flash_size_kb),
                    &encode_u32(i.app_base),
                ],
            ),
        }
    }

    /// Parse a response message, as a host would.
    ///
    /// Returns `None` for messages that aren't a well-formed response.
    pub fn parse(msg: &[u8]) -> Option<Self> {
        let f = Frame::parse(msg)?;
        if !f.checksum_ok() {
            return None;
        }
        let (&command, rest) = f.payload.split_first()?;

        match f.command {
            RESP_ACK if command == Command::Query as u8 && rest.len() == 13 => {
                let (version, rest) = rest.split_at(3);
                let (flash_size_kb, rest) = split_u32(rest)?;
                let (app_base, _) = split_u32(rest)?;
                Some(Self::Info(BootInfo {
                    version: Version {
                        major: version[0],
                        minor: version[1],
                        patch: version[2],
                    },
                    flash_size_kb,
                    app_base,
                }))
            }
            RESP_ACK if rest.len() == 5 => {
                let (value, _) = split_u32(rest)?;
                Some(Self::Ack { command, value })
            }
            RESP_ERROR if rest.len() == 1 => Some(Self::Error {
                command,
                code: ErrorCode::from_u8(rest[0])?,
            }),
            _ => None,
        }
    }
}

/// A bootloader request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Query,
    /// Program `data` at `offset` within the application region
    WriteBlock { offset: u32, data: &'a [u8] },
    EraseApp,
    JumpApp,
}

impl<'a> Request<'a> {
    pub fn command(&self) -> Command {
        match self {
            Self::Query => Command::Query,
            Self::WriteBlock { .. } => Command::WriteBlock,
            Self::EraseApp => Command::EraseApp,
            Self::JumpApp => Command::JumpApp,
        }
    }

    /// Decode the command in `frame`.
    ///
    /// The checksum should already have been checked. Payloads of commands
    /// other than WRITE_BLOCK are ignored.
    pub fn parse(frame: &Frame<'a>) -> core::result::Result<Self, ErrorCode> {
        let cmd =
            Command::from_u8(frame.command).ok_or(ErrorCode::InvalidCmd)?;
        Ok(match cmd {
            Command::Query => Self::Query,
            Command::EraseApp => Self::EraseApp,
            Command::JumpApp => Self::JumpApp,
            Command::WriteBlock => {
                let p = frame.payload;
                if p.len() < WRITE_BLOCK_FIELDS {
                    return Err(ErrorCode::InvalidLen);
                }
                let (offset, rest) =
                    split_u32(p).ok_or(ErrorCode::InvalidLen)?;
                let len = ((rest[0] & 0x7F) as usize) << 7
                    | (rest[1] & 0x7F) as usize;
                let data = &rest[2..];
                if len == 0 || len > MAX_BLOCK || data.len() != len {
                    return Err(ErrorCode::InvalidLen);
                }
                Self::WriteBlock { offset, data }
            }
        })
    }

    /// Encode a complete request message.
    ///
    /// `device_id` is normally [`DEVICE_ID`]. WRITE_BLOCK data must be
    /// between 1 and [`MAX_BLOCK`] bytes.
    pub fn encode<const N: usize>(
        &self,
        out: &mut Vec<u8, N>,
        device_id: u8,
    ) -> Result<()> {
        let cmd = [self.command() as u8];
        match self {
            Self::WriteBlock { offset, data } => {
                if data.is_empty() || data.len() > MAX_BLOCK {
                    return Err(Error::BadArgument);
                }
                let len = [(data.len() >> 7) as u8 & 0x7F, data.len() as u8 & 0x7F];
                build(out, device_id, &[&cmd, &encode_u32(*offset), &len, data])
            }
            _ => build(out, device_id, &[&cmd]),
        }
    }
}
