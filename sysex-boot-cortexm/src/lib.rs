// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Cortex-M implementations of the SysEx bootloader's hardware traits.
//!
//! - [`CortexM`] implements [`Cpu`](sysex_boot::Cpu)
//! - [`UninitFlag`] and [`FixedAddressFlag`] implement
//!   [`PersistentFlag`](sysex_boot::PersistentFlag) in RAM that survives a
//!   soft reset
//! - [`MappedFlash`] reads memory-mapped flash for a
//!   [`Flash`](sysex_boot::Flash) implementation
#![no_std]

#[cfg(feature = "defmt")]
#[allow(unused)]
use defmt::{debug, error, info, trace, warn};

#[cfg(feature = "log")]
#[allow(unused)]
use log::{debug, error, info, trace, warn};

#[cfg(not(any(feature = "log", feature = "defmt")))]
compile_error!("Either log or defmt feature must be enabled");
#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("log and defmt features are mutually exclusive");

mod cpu;
mod flag;
mod mapped;

pub use cpu::CortexM;
pub use flag::{FixedAddressFlag, UninitFlag};
pub use mapped::MappedFlash;
