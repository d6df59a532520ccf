//! Logging macros, from either `log` or `defmt`.
//!
//! With neither feature enabled the macros expand to nothing.
#![allow(unused)]

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("log and defmt features are mutually exclusive");

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(feature = "log")]
pub(crate) use log::{debug, error, info, trace, warn};

#[cfg(not(any(feature = "log", feature = "defmt")))]
mod nolog {
    macro_rules! trace {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! debug {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! info {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! warn {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! error {
        ($($arg:tt)*) => {{}};
    }
    pub(crate) use {debug, error, info, trace, warn};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
pub(crate) use nolog::{debug, error, info, trace, warn};
