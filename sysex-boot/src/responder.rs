// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Bootloader command handling

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use heapless::spsc::Consumer;
use heapless::Vec;

use usb_midi_sysex::config::INBOX_SLOTS;
use usb_midi_sysex::{send_sysex, Cable, PacketSink, SysexMessage};

use crate::config::{JUMP_SETTLE_MS, VERSION};
use crate::entry::{check_entry, EntryReason, PersistentFlag};
use crate::flash::{Flash, Programmer};
use crate::proto::{
    BootInfo, Command, ErrorCode, Frame, Request, Response, RESPONSE_MAX,
};
use crate::{Cpu, Result};

/// Returned when a jump to the application was refused.
///
/// The bootloader keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct RemainedInBootloader;

/// Result of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a bootloader message
    Ignored,
    /// This response was sent
    Replied(Response),
    /// JUMP_APP was acknowledged but the application failed validation
    JumpRefused,
}

/// Bootloader state.
///
/// Owns the flash programmer and the entry reason decided at boot.
pub struct Bootloader<F: Flash> {
    programmer: Programmer<F>,
    reason: EntryReason,
}

impl<F: Flash> Bootloader<F> {
    pub fn new(programmer: Programmer<F>) -> Self {
        Self {
            programmer,
            reason: EntryReason::None,
        }
    }

    /// Decide the entry reason at boot.
    ///
    /// Returns `true` if the bootloader should stay resident, otherwise
    /// the caller should call [`jump_to_application`](Self::jump_to_application).
    pub fn init(&mut self, flag: &mut impl PersistentFlag) -> bool {
        self.init_with_button(flag, false)
    }

    /// As [`init`](Self::init), with the state of an entry button.
    pub fn init_with_button(
        &mut self,
        flag: &mut impl PersistentFlag,
        button_held: bool,
    ) -> bool {
        self.reason = check_entry(flag, &self.programmer, button_held);
        info!("Boot entry reason {:?}", self.reason);
        self.reason.stay_in_bootloader()
    }

    pub fn entry_reason(&self) -> EntryReason {
        self.reason
    }

    pub fn programmer(&self) -> &Programmer<F> {
        &self.programmer
    }

    pub fn programmer_mut(&mut self) -> &mut Programmer<F> {
        &mut self.programmer
    }

    pub fn info(&self) -> BootInfo {
        let l = self.programmer.layout();
        BootInfo {
            version: VERSION,
            flash_size_kb: l.flash_size_kb,
            app_base: l.app_start,
        }
    }

    /// Start the application.
    ///
    /// Re-validates the application vector table first. Only returns if
    /// that fails.
    pub fn jump_to_application(
        &mut self,
        cpu: &mut impl Cpu,
    ) -> RemainedInBootloader {
        let Some(vt) = self.programmer.application() else {
            warn!("Not starting invalid application");
            return RemainedInBootloader;
        };

        info!("Starting application, reset {:#x}", vt.reset_vector);
        cpu.disable_interrupts();
        cpu.relocate_vector_table(self.programmer.layout().app_start);
        cpu.start(vt.stack_pointer, vt.reset_vector)
    }

    /// Service one queued message.
    ///
    /// Blocks for the duration of any flash operation, so must not be
    /// called from the USB receive interrupt. Returns `Ok(None)` when the
    /// inbox is empty.
    pub fn poll(
        &mut self,
        inbox: &mut Consumer<'_, SysexMessage, INBOX_SLOTS>,
        sink: &mut impl PacketSink,
        cpu: &mut impl Cpu,
    ) -> Result<Option<Outcome>> {
        let Some(msg) = inbox.dequeue() else {
            return Ok(None);
        };
        self.process_sysex(&msg.data, msg.cable, sink, cpu).map(Some)
    }

    /// Handle a complete SysEx message received on `cable`.
    ///
    /// Any response is sent on the same cable. Errors are failures to send
    /// the response; command failures are reported to the host in an
    /// ERROR response.
    ///
    /// A successful JUMP_APP does not return.
    pub fn process_sysex(
        &mut self,
        msg: &[u8],
        cable: Cable,
        sink: &mut impl PacketSink,
        cpu: &mut impl Cpu,
    ) -> Result<Outcome> {
        let Some(frame) = Frame::parse(msg) else {
            trace!("Ignoring SysEx len {}", msg.len());
            return Ok(Outcome::Ignored);
        };

        let command = frame.command;
        if !frame.checksum_ok() {
            debug!("Bad checksum for command {:#x}", command);
            return self.reply(sink, cable, error(command, ErrorCode::Checksum));
        }

        let req = match Request::parse(&frame) {
            Ok(r) => r,
            Err(code) => {
                debug!("Rejected command {:#x}, {:?}", command, code);
                return self.reply(sink, cable, error(command, code));
            }
        };

        trace!("Bootloader command {:?}", req.command());
        let resp = match req {
            Request::Query => Response::Info(self.info()),
            Request::EraseApp => match self.programmer.erase_application() {
                Ok(()) => ack(command, 0),
                Err(_) => error(command, ErrorCode::EraseFailed),
            },
            Request::WriteBlock { offset, data } => {
                self.write_block(command, offset, data)
            }
            Request::JumpApp => return self.cmd_jump(sink, cable, cpu),
        };
        self.reply(sink, cable, resp)
    }

    fn write_block(&mut self, command: u8, offset: u32, data: &[u8]) -> Response {
        if let Err(e) = self.programmer.write_flash(offset, data) {
            debug!("Write at offset {:#x} failed {:?}", offset, e);
            return error(command, ErrorCode::WriteFailed);
        }
        match self.programmer.verify_flash(offset, data) {
            Ok(true) => ack(command, offset),
            Ok(false) | Err(_) => error(command, ErrorCode::VerifyFailed),
        }
    }

    fn cmd_jump(
        &mut self,
        sink: &mut impl PacketSink,
        cable: Cable,
        cpu: &mut impl Cpu,
    ) -> Result<Outcome> {
        let app_start = self.programmer.layout().app_start;
        self.reply(sink, cable, ack(Command::JumpApp as u8, app_start))?;
        // let the ACK drain before the USB peripheral goes away
        cpu.delay_ms(JUMP_SETTLE_MS);
        let RemainedInBootloader = self.jump_to_application(cpu);
        Ok(Outcome::JumpRefused)
    }

    fn reply(
        &mut self,
        sink: &mut impl PacketSink,
        cable: Cable,
        resp: Response,
    ) -> Result<Outcome> {
        let mut buf = Vec::<u8, RESPONSE_MAX>::new();
        resp.encode(&mut buf)?;
        send_sysex(sink, &buf, cable).inspect_err(|e| {
            warn!("Failed sending response {:?}", e);
        })?;
        Ok(Outcome::Replied(resp))
    }
}

fn ack(command: u8, value: u32) -> Response {
    Response::Ack { command, value }
}

fn error(command: u8, code: ErrorCode) -> Response {
    Response::Error { command, code }
}
