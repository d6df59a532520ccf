// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Application flash programming

#[allow(unused)]
use crate::fmt::{debug, error, info, trace, warn};

use core::ops::{Deref, DerefMut};

use crc::Crc;

use crate::layout::MemoryLayout;
use crate::{Error, Result};

/// Largest supported [`Flash::PROGRAM_UNIT`]
pub const MAX_PROGRAM_UNIT: usize = 16;

// Chunk size for reading back flash
const READ_CHUNK: usize = 64;

const CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Standard reflected CRC-32, as used by zlib and Ethernet.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Flash controller.
///
/// Addresses are absolute. Erase and program operations are only
/// permitted between [`unlock`](Self::unlock) and [`lock`](Self::lock);
/// use [`Unlocked`] to pair them.
pub trait Flash {
    /// Bytes written by a single [`program_unit`](Self::program_unit).
    ///
    /// At most [`MAX_PROGRAM_UNIT`].
    const PROGRAM_UNIT: usize = 4;

    /// Value of erased flash bytes.
    const ERASED: u8 = 0xFF;

    fn unlock(&mut self) -> Result<()>;

    fn lock(&mut self);

    /// Erase a sector by its controller sector number.
    fn erase_sector(&mut self, number: u8) -> Result<()>;

    /// Program one unit at `addr`, aligned to `PROGRAM_UNIT`.
    ///
    /// `data` is exactly `PROGRAM_UNIT` long.
    fn program_unit(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Read flash contents.
    ///
    /// Returns [`Error::Fault`] for addresses outside of flash.
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Read a little endian word.
    fn read_u32(&self, addr: u32) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read(addr, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }
}

/// An unlocked flash controller.
///
/// The controller is locked again when this is dropped, on any path.
pub struct Unlocked<'a, F: Flash> {
    flash: &'a mut F,
}

impl<'a, F: Flash> Unlocked<'a, F> {
    /// Unlock `flash`.
    ///
    /// If unlocking fails the controller is left as it was.
    pub fn new(flash: &'a mut F) -> Result<Self> {
        flash.unlock().inspect_err(|e| debug!("Flash unlock failed {:?}", e))?;
        Ok(Self { flash })
    }
}

impl<F: Flash> Deref for Unlocked<'_, F> {
    type Target = F;

    fn deref(&self) -> &F {
        self.flash
    }
}

impl<F: Flash> DerefMut for Unlocked<'_, F> {
    fn deref_mut(&mut self) -> &mut F {
        self.flash
    }
}

impl<F: Flash> Drop for Unlocked<'_, F> {
    fn drop(&mut self) {
        self.flash.lock()
    }
}

/// Initial stack pointer and reset vector of an application image.
///
/// The first two words of a Cortex-M vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ApplicationVectorTable {
    pub stack_pointer: u32,
    pub reset_vector: u32,
}

impl ApplicationVectorTable {
    /// Read the vector table at `addr`.
    pub fn read(flash: &impl Flash, addr: u32) -> Result<Self> {
        Ok(Self {
            stack_pointer: flash.read_u32(addr)?,
            reset_vector: flash.read_u32(addr + 4)?,
        })
    }

    /// Plausibility check for a vector table.
    ///
    /// The stack pointer must be in RAM and the reset vector must lie in
    /// the application region with the Thumb bit set. This is a
    /// heuristic, not an integrity check.
    pub fn is_valid(&self, layout: &MemoryLayout) -> bool {
        layout.is_ram(self.stack_pointer)
            && layout.is_app_flash(self.reset_vector)
            && self.reset_vector & 1 == 1
    }
}

/// Programs the application region of a device.
pub struct Programmer<F: Flash> {
    flash: F,
    layout: MemoryLayout,
}

impl<F: Flash> Programmer<F> {
    /// `layout` must start the application region on a sector boundary.
    pub fn new(flash: F, layout: MemoryLayout) -> Self {
        debug_assert!(F::PROGRAM_UNIT > 0 && F::PROGRAM_UNIT <= MAX_PROGRAM_UNIT);
        debug_assert!(
            layout.is_sector_aligned(),
            "application region must start on a sector boundary"
        );
        Self { flash, layout }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    /// Erase every sector of the application region.
    ///
    /// Stops at the first failing sector.
    pub fn erase_application(&mut self) -> Result<()> {
        let mut f = Unlocked::new(&mut self.flash)?;
        for s in self.layout.app_sectors() {
            trace!("Erasing sector {} at {:#x}", s.number, s.start);
            f.erase_sector(s.number).inspect_err(|e| {
                debug!("Erase of sector {} failed {:?}", s.number, e)
            })?;
        }
        info!("Application region erased");
        Ok(())
    }

    /// Program `data` at `offset` within the application region.
    ///
    /// `offset` must be aligned to the program unit. A trailing partial
    /// unit is padded with the erased value. Stops at the first failure,
    /// leaving flash partially written; the region must then be erased
    /// before retrying.
    pub fn write_flash(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let unit = F::PROGRAM_UNIT;
        if data.is_empty() || unit == 0 || unit > MAX_PROGRAM_UNIT {
            return Err(Error::BadArgument);
        }
        let addr = self
            .layout
            .app_range(offset, data.len())
            .ok_or(Error::OutOfBounds)?;
        if addr as usize % unit != 0 {
            return Err(Error::Unaligned);
        }

        let mut f = Unlocked::new(&mut self.flash)?;
        let mut a = addr;
        for chunk in data.chunks(unit) {
            let mut word = [F::ERASED; MAX_PROGRAM_UNIT];
            word[..chunk.len()].copy_from_slice(chunk);
            f.program_unit(a, &word[..unit]).inspect_err(|e| {
                debug!("Program at {:#x} failed {:?}", a, e)
            })?;
            a += unit as u32;
        }
        trace!("Wrote {} bytes at {:#x}", data.len(), addr);
        Ok(())
    }

    /// Compare flash at `offset` within the application region with `data`.
    ///
    /// Returns `Ok(false)` on a mismatch.
    pub fn verify_flash(&self, offset: u32, data: &[u8]) -> Result<bool> {
        if data.is_empty() {
            return Err(Error::BadArgument);
        }
        let mut addr = self
            .layout
            .app_range(offset, data.len())
            .ok_or(Error::OutOfBounds)?;

        let mut buf = [0u8; READ_CHUNK];
        for chunk in data.chunks(READ_CHUNK) {
            let b = &mut buf[..chunk.len()];
            self.flash.read(addr, b)?;
            if b != chunk {
                debug!("Verify mismatch in {} bytes at {:#x}", chunk.len(), addr);
                return Ok(false);
            }
            addr += chunk.len() as u32;
        }
        Ok(true)
    }

    /// CRC-32 of `len` bytes of flash at `offset` within the application
    /// region.
    pub fn image_crc(&self, offset: u32, len: usize) -> Result<u32> {
        let mut addr = self
            .layout
            .app_range(offset, len)
            .ok_or(Error::OutOfBounds)?;

        let mut digest = CRC32.digest();
        let mut buf = [0u8; READ_CHUNK];
        let mut rem = len;
        while rem > 0 {
            let b = &mut buf[..rem.min(READ_CHUNK)];
            self.flash.read(addr, b)?;
            digest.update(b);
            addr += b.len() as u32;
            rem -= b.len();
        }
        Ok(digest.finalize())
    }

    /// Read the application vector table.
    pub fn vector_table(&self) -> Result<ApplicationVectorTable> {
        ApplicationVectorTable::read(&self.flash, self.layout.app_start)
    }

    /// The application vector table, if it looks like a valid application.
    pub fn application(&self) -> Option<ApplicationVectorTable> {
        let vt = self
            .vector_table()
            .inspect_err(|e| debug!("Vector table read failed {:?}", e))
            .ok()?;
        if vt.is_valid(&self.layout) {
            Some(vt)
        } else {
            debug!(
                "No valid application, sp {:#x} reset {:#x}",
                vt.stack_pointer, vt.reset_vector
            );
            None
        }
    }

    /// Returns `true` if the application region holds a plausible image.
    pub fn check_application(&self) -> bool {
        self.application().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimFlash;
    use proptest::prelude::*;

    const L: MemoryLayout = MemoryLayout::STM32F407;

    fn programmer() -> Programmer<SimFlash> {
        Programmer::new(SimFlash::new(&L), L)
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "sector boundary")]
    fn mid_sector_layout_rejected() {
        let l = MemoryLayout {
            app_start: 0x0800_6000,
            app_max_size: 0x000F_A000,
            ..L
        };
        let _ = Programmer::new(SimFlash::new(&l), l);
    }

    #[test]
    fn crc_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn erase_locks_after() {
        let mut p = programmer();
        p.erase_application().unwrap();
        let f = p.flash();
        assert!(!f.is_unlocked());
        assert_eq!(f.unlocks, 1);
        assert_eq!(f.locks, 1);
        assert_eq!(f.erased, [2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn erase_failure_locks() {
        let mut p = programmer();
        p.flash_mut().fail_erase = Some(5);
        assert_eq!(p.erase_application(), Err(Error::Erase));
        let f = p.flash();
        assert!(!f.is_unlocked());
        assert_eq!(f.locks, 1);
        // stopped at the failing sector
        assert_eq!(f.erased, [2, 3, 4]);
    }

    #[test]
    fn unlock_failure() {
        let mut p = programmer();
        p.flash_mut().fail_unlock = true;
        assert_eq!(p.erase_application(), Err(Error::Unlock));
        assert_eq!(p.write_flash(0, &[1, 2, 3, 4]), Err(Error::Unlock));
        assert!(p.flash().erased.is_empty());
        assert_eq!(p.flash().programs, 0);
    }

    #[test]
    fn erase_twice() {
        let mut p = programmer();
        p.erase_application().unwrap();
        p.write_flash(0x40, &[0x12; 8]).unwrap();
        p.erase_application().unwrap();
        let once = p.flash().app_contents(&L).to_vec();
        p.erase_application().unwrap();
        assert_eq!(p.flash().app_contents(&L), &once[..]);
        assert!(once.iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn partial_unit_padded() {
        let mut p = programmer();
        p.erase_application().unwrap();
        p.write_flash(0, &[1, 2, 3, 4, 5, 6]).unwrap();
        let mut b = [0u8; 8];
        p.flash().read(L.app_start, &mut b).unwrap();
        assert_eq!(b, [1, 2, 3, 4, 5, 6, 0xFF, 0xFF]);
        assert_eq!(p.flash().programs, 2);
        assert!(!p.flash().is_unlocked());
    }

    #[test]
    fn bounds_untouched() {
        let mut p = programmer();
        p.erase_application().unwrap();
        let max = L.app_max_size;
        assert_eq!(p.write_flash(max - 2, &[0; 4]), Err(Error::OutOfBounds));
        assert_eq!(p.write_flash(u32::MAX - 1, &[0; 4]), Err(Error::OutOfBounds));
        assert_eq!(p.verify_flash(max, &[0xFF]), Err(Error::OutOfBounds));
        assert_eq!(p.image_crc(max - 1, 2), Err(Error::OutOfBounds));
        assert_eq!(p.flash().unlocks, 1);
        assert_eq!(p.flash().programs, 0);

        // last unit of the region is fine
        p.write_flash(max - 4, &[0; 4]).unwrap();
        assert!(p.verify_flash(max - 4, &[0; 4]).unwrap());
    }

    #[test]
    fn unaligned_rejected() {
        let mut p = programmer();
        assert_eq!(p.write_flash(2, &[0; 4]), Err(Error::Unaligned));
        assert_eq!(p.flash().unlocks, 0);
    }

    #[test]
    fn program_failure_stops() {
        let mut p = programmer();
        p.erase_application().unwrap();
        p.flash_mut().fail_program_at = Some(L.app_start + 8);
        assert_eq!(p.write_flash(0, &[0x55; 16]), Err(Error::Program));
        assert_eq!(p.flash().programs, 2);
        assert!(!p.flash().is_unlocked());
        assert_eq!(p.flash().locks, 2);
    }

    #[test]
    fn image_crc() {
        let mut p = programmer();
        p.erase_application().unwrap();
        let img: std::vec::Vec<u8> = (0..200u8).collect();
        p.write_flash(0x100, &img).unwrap();
        assert_eq!(p.image_crc(0x100, img.len()).unwrap(), crc32(&img));
    }

    #[test]
    fn vector_tables() {
        let ok = ApplicationVectorTable {
            stack_pointer: 0x2002_0000,
            reset_vector: 0x0800_8199,
        };
        assert!(ok.is_valid(&L));

        let thumb_clear = ApplicationVectorTable {
            reset_vector: 0x0800_8198,
            ..ok
        };
        assert!(!thumb_clear.is_valid(&L));

        let in_bootloader = ApplicationVectorTable {
            reset_vector: 0x0800_0101,
            ..ok
        };
        assert!(!in_bootloader.is_valid(&L));

        let bad_sp = ApplicationVectorTable {
            stack_pointer: 0x1000_0000,
            ..ok
        };
        assert!(!bad_sp.is_valid(&L));

        // erased flash
        let erased = ApplicationVectorTable {
            stack_pointer: 0xFFFF_FFFF,
            reset_vector: 0xFFFF_FFFF,
        };
        assert!(!erased.is_valid(&L));
    }

    #[test]
    fn check_application_reads_flash() {
        let mut p = programmer();
        p.erase_application().unwrap();
        assert!(!p.check_application());

        let mut vt = [0u8; 8];
        vt[..4].copy_from_slice(&0x2001_fff0u32.to_le_bytes());
        vt[4..].copy_from_slice(&0x0800_8401u32.to_le_bytes());
        p.write_flash(0, &vt).unwrap();
        assert!(p.check_application());
        assert_eq!(
            p.application(),
            Some(ApplicationVectorTable {
                stack_pointer: 0x2001_fff0,
                reset_vector: 0x0800_8401
            })
        );
    }

    proptest! {
        #[test]
        fn thumb_bit_required(sp in any::<u32>(), rv in any::<u32>()) {
            let vt = ApplicationVectorTable {
                stack_pointer: sp,
                reset_vector: rv & !1,
            };
            prop_assert!(!vt.is_valid(&L));
        }

        #[test]
        fn write_then_verify(
            unit in 0u32..0x100,
            data in proptest::collection::vec(any::<u8>(), 1..256),
            flip in any::<prop::sample::Index>(),
        ) {
            let mut p = programmer();
            let offset = unit * 4;
            p.write_flash(offset, &data).unwrap();
            prop_assert!(p.verify_flash(offset, &data).unwrap());

            let mut bad = data.clone();
            let i = flip.index(bad.len());
            bad[i] ^= 0x01;
            prop_assert!(!p.verify_flash(offset, &bad).unwrap());
        }
    }
}
