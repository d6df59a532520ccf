// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Simulated hardware for tests and host tools.
//!
//! [`SimFlash`] behaves like NOR flash: programming can only clear bits,
//! and erase and program fail unless the controller is unlocked.
//! [`SimCpu`] models the diverging [`Cpu`] calls by unwinding with an
//! [`Exit`], which [`catch_exit`] turns back into a value.

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use std::panic::{self, AssertUnwindSafe};
use std::vec::Vec;

use usb_midi_sysex::{PacketSink, SysexMessage, SysexReassembler, UsbMidiPacket};

use crate::flash::{ApplicationVectorTable, Flash};
use crate::layout::{MemoryLayout, Sector};
use crate::proto::Response;
use crate::{Cpu, Error, Result};

/// In-memory flash covering every sector of a layout.
#[derive(Debug)]
pub struct SimFlash {
    base: u32,
    mem: Vec<u8>,
    sectors: &'static [Sector],
    unlocked: bool,

    /// Successful unlocks
    pub unlocks: usize,
    /// Calls to lock
    pub locks: usize,
    /// Sectors erased, in order
    pub erased: Vec<u8>,
    /// Successful program operations
    pub programs: usize,

    /// Refuse to unlock
    pub fail_unlock: bool,
    /// Fail erasing this sector
    pub fail_erase: Option<u8>,
    /// Fail programming this address
    pub fail_program_at: Option<u32>,
}

impl SimFlash {
    /// Erased flash for `layout`.
    pub fn new(layout: &MemoryLayout) -> Self {
        let base = layout.sectors.first().map(|s| s.start).unwrap_or(0);
        let end = layout.sectors.last().map(|s| s.end()).unwrap_or(base);
        Self {
            base,
            mem: vec![0xFF; (end - base) as usize],
            sectors: layout.sectors,
            unlocked: false,
            unlocks: 0,
            locks: 0,
            erased: Vec::new(),
            programs: 0,
            fail_unlock: false,
            fail_erase: None,
            fail_program_at: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn range(&self, addr: u32, len: usize) -> Option<core::ops::Range<usize>> {
        let start = addr.checked_sub(self.base)? as usize;
        let end = start.checked_add(len)?;
        (end <= self.mem.len()).then_some(start..end)
    }

    /// Contents of the application region.
    pub fn app_contents(&self, layout: &MemoryLayout) -> &[u8] {
        self.range(layout.app_start, layout.app_max_size as usize)
            .map(|r| &self.mem[r])
            .unwrap_or(&[])
    }

    /// Place bytes directly, bypassing the controller.
    pub fn load(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let r = self.range(addr, data.len()).ok_or(Error::Fault)?;
        self.mem[r].copy_from_slice(data);
        Ok(())
    }

    /// Place a vector table at `addr`.
    pub fn load_vector_table(
        &mut self,
        addr: u32,
        vt: &ApplicationVectorTable,
    ) -> Result<()> {
        let mut b = [0u8; 8];
        b[..4].copy_from_slice(&vt.stack_pointer.to_le_bytes());
        b[4..].copy_from_slice(&vt.reset_vector.to_le_bytes());
        self.load(addr, &b)
    }
}

impl Flash for SimFlash {
    fn unlock(&mut self) -> Result<()> {
        if self.fail_unlock {
            return Err(Error::Unlock);
        }
        self.unlocked = true;
        self.unlocks += 1;
        Ok(())
    }

    fn lock(&mut self) {
        self.unlocked = false;
        self.locks += 1;
    }

    fn erase_sector(&mut self, number: u8) -> Result<()> {
        if !self.unlocked || self.fail_erase == Some(number) {
            return Err(Error::Erase);
        }
        let s = self
            .sectors
            .iter()
            .find(|s| s.number == number)
            .ok_or(Error::BadArgument)?;
        let r = self.range(s.start, s.size as usize).ok_or(Error::Erase)?;
        self.mem[r].fill(0xFF);
        self.erased.push(number);
        Ok(())
    }

    fn program_unit(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if !self.unlocked
            || self.fail_program_at == Some(addr)
            || data.len() != Self::PROGRAM_UNIT
            || addr as usize % Self::PROGRAM_UNIT != 0
        {
            return Err(Error::Program);
        }
        let r = self.range(addr, data.len()).ok_or(Error::Program)?;
        for (m, d) in self.mem[r].iter_mut().zip(data) {
            *m &= d;
        }
        self.programs += 1;
        Ok(())
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let r = self.range(addr, buf.len()).ok_or(Error::Fault)?;
        buf.copy_from_slice(&self.mem[r]);
        Ok(())
    }
}

/// Records transmitted packets.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub packets: Vec<UsbMidiPacket>,
    /// Refuse packets once this many have been accepted
    pub fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages rebuilt from the recorded packets.
    pub fn messages(&self) -> Vec<SysexMessage> {
        let mut r = SysexReassembler::new();
        self.packets.iter().filter_map(|p| r.receive(p)).collect()
    }

    /// Responses decoded from the recorded packets.
    pub fn responses(&self) -> Vec<Response> {
        self.messages()
            .iter()
            .filter_map(|m| Response::parse(&m.data))
            .collect()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

impl PacketSink for RecordingSink {
    fn send_packet(&mut self, packet: UsbMidiPacket) -> usb_midi_sysex::Result<()> {
        if self.fail_after.is_some_and(|n| self.packets.len() >= n) {
            return Err(usb_midi_sysex::Error::TxFailure);
        }
        self.packets.push(packet);
        Ok(())
    }
}

/// How a [`SimCpu`] left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Application started
    Start(ApplicationVectorTable),
    Reset,
}

/// Records processor control calls.
#[derive(Debug, Default)]
pub struct SimCpu {
    pub interrupts_disabled: bool,
    pub vector_table: Option<u32>,
    pub delays: Vec<u32>,
}

impl SimCpu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cpu for SimCpu {
    fn disable_interrupts(&mut self) {
        self.interrupts_disabled = true;
    }

    fn relocate_vector_table(&mut self, addr: u32) {
        self.vector_table = Some(addr);
    }

    fn start(&mut self, stack_pointer: u32, reset_vector: u32) -> ! {
        panic::resume_unwind(Box::new(Exit::Start(ApplicationVectorTable {
            stack_pointer,
            reset_vector,
        })))
    }

    fn system_reset(&mut self) -> ! {
        panic::resume_unwind(Box::new(Exit::Reset))
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}

/// Run `f`, returning how a [`SimCpu`] exited if it did.
///
/// Other panics are propagated.
pub fn catch_exit<R>(f: impl FnOnce() -> R) -> core::result::Result<R, Exit> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => Ok(r),
        Err(e) => match e.downcast::<Exit>() {
            Ok(exit) => Err(*exit),
            Err(e) => panic::resume_unwind(e),
        },
    }
}
