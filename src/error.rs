// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors reported by the device tree fixups and the boot handoff.

use bootfix_device_tree::ErrorKind;
use core::fmt;

/// An error that stops a fixup from completing.
///
/// Fixups do not roll back: when one of them fails, the blob keeps every edit
/// made before the failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer holding the device tree has no room left.
    BlobSpaceExhausted,
    /// A node or property the fixup depends on is missing.
    NotFound,
    /// The node the fixup would create is already present.
    AlreadyExists,
    /// A `#address-cells` or `#size-cells` value cannot be used.
    InvalidCellConfig,
    /// The hardware did not react as expected.
    ///
    /// None of the fixups raise this. It is left for platform drivers that
    /// check the hardware before the handoff.
    HardwareFault(&'static str),
    /// A generated node name does not fit its buffer.
    NodeNameTooLong,
    /// A `reg` property holds fewer cells than needed.
    RegTooShort {
        /// Number of cells present.
        cells: usize,
        /// Number of cells required.
        needed: usize,
    },
    /// The device tree is malformed.
    Blob(bootfix_device_tree::Error),
}

impl From<bootfix_device_tree::Error> for Error {
    fn from(e: bootfix_device_tree::Error) -> Self {
        match e.kind {
            ErrorKind::NoSpace => Self::BlobSpaceExhausted,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Exists => Self::AlreadyExists,
            ErrorKind::BadNCells => Self::InvalidCellConfig,
            _ => Self::Blob(e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlobSpaceExhausted => write!(f, "no space left in the device tree buffer"),
            Self::NotFound => write!(f, "device tree node or property not found"),
            Self::AlreadyExists => write!(f, "device tree node already exists"),
            Self::InvalidCellConfig => write!(f, "unsupported #address-cells or #size-cells"),
            Self::HardwareFault(what) => write!(f, "hardware fault: {what}"),
            Self::NodeNameTooLong => write!(f, "node name too long"),
            Self::RegTooShort { cells, needed } => {
                write!(f, "reg has {cells} cells, expected at least {needed}")
            }
            Self::Blob(e) => write!(f, "malformed device tree: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Blob(e) => Some(e),
            _ => None,
        }
    }
}
