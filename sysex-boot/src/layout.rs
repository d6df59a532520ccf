// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Device memory layout

/// A flash erase sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sector {
    /// Sector number as understood by the flash controller
    pub number: u8,
    /// Absolute start address
    pub start: u32,
    /// Size in bytes
    pub size: u32,
}

impl Sector {
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }
}

/// Addresses the bootloader needs to know about the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// First address of the application image, its vector table
    pub app_start: u32,
    /// Size of the application region in bytes
    pub app_max_size: u32,
    /// Lowest valid initial stack pointer
    pub ram_start: u32,
    /// Highest valid initial stack pointer, inclusive. A full descending
    /// stack starts at the end of RAM.
    pub ram_end: u32,
    /// Total flash size reported to the host, in KiB
    pub flash_size_kb: u32,
    /// Erase sectors, in address order
    pub sectors: &'static [Sector],
}

const fn sector(number: u8, start: u32, kb: u32) -> Sector {
    Sector {
        number,
        start,
        size: kb * 1024,
    }
}

const STM32F407_SECTORS: [Sector; 12] = [
    sector(0, 0x0800_0000, 16),
    sector(1, 0x0800_4000, 16),
    sector(2, 0x0800_8000, 16),
    sector(3, 0x0800_C000, 16),
    sector(4, 0x0801_0000, 64),
    sector(5, 0x0802_0000, 128),
    sector(6, 0x0804_0000, 128),
    sector(7, 0x0806_0000, 128),
    sector(8, 0x0808_0000, 128),
    sector(9, 0x080A_0000, 128),
    sector(10, 0x080C_0000, 128),
    sector(11, 0x080E_0000, 128),
];

impl MemoryLayout {
    /// STM32F407 with 1 MiB flash and a 32 KiB bootloader in sectors 0-1.
    pub const STM32F407: MemoryLayout = MemoryLayout {
        app_start: 0x0800_8000,
        app_max_size: 0x000F_8000,
        ram_start: 0x2000_0000,
        ram_end: 0x2002_0000,
        flash_size_kb: 1024,
        sectors: &STM32F407_SECTORS,
    };

    /// One past the last address of the application region.
    pub const fn app_end(&self) -> u32 {
        self.app_start + self.app_max_size
    }

    /// Sectors to erase for the application region.
    ///
    /// Only sectors starting inside the region are included, so a sector
    /// shared with the bootloader is never returned.
    pub fn app_sectors(&self) -> impl Iterator<Item = &'static Sector> + '_ {
        let (start, end) = (self.app_start, self.app_end());
        self.sectors
            .iter()
            .filter(move |s| s.start >= start && s.start < end)
    }

    /// Returns `true` if the application region starts on a sector
    /// boundary.
    ///
    /// Otherwise the start of the region shares a sector with the
    /// bootloader and can't be erased.
    pub fn is_sector_aligned(&self) -> bool {
        self.sectors.iter().any(|s| s.start == self.app_start)
    }

    /// Absolute address for an application region `offset`, if the
    /// `len` bytes from there lie inside the region.
    pub fn app_range(&self, offset: u32, len: usize) -> Option<u32> {
        let len = u32::try_from(len).ok()?;
        let end = offset.checked_add(len)?;
        if end > self.app_max_size {
            return None;
        }
        Some(self.app_start + offset)
    }

    /// Returns `true` if `sp` is a plausible initial stack pointer.
    pub fn is_ram(&self, sp: u32) -> bool {
        (self.ram_start..=self.ram_end).contains(&sp)
    }

    /// Returns `true` if `addr` lies within the application region.
    pub fn is_app_flash(&self, addr: u32) -> bool {
        (self.app_start..self.app_end()).contains(&addr)
    }
}
