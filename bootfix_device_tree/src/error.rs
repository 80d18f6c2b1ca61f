// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for the `bootfix_device_tree` crate.

use core::fmt;

/// An error that can occur when reading or editing a device tree blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Error {
    offset: usize,
    /// What went wrong.
    pub kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Self { offset, kind }
    }

    /// Returns the byte offset within the blob at which the error was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The kind of an error that can occur when reading or editing a device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The magic number of the device tree is invalid.
    InvalidMagic,
    /// The Device Tree version is not supported by this library.
    UnsupportedVersion(u32),
    /// The length of the device tree, or of one of its items, is invalid.
    InvalidLength,
    /// An invalid token was encountered.
    BadToken(u32),
    /// An invalid string was encountered.
    InvalidString,
    /// The blocks of the blob are not laid out in the order required for
    /// in-place editing.
    BadLayout,
    /// The requested node or property does not exist.
    NotFound,
    /// A node with the requested name already exists.
    Exists,
    /// The buffer holding the blob has no room left for the edit.
    NoSpace,
    /// A `#address-cells` or `#size-cells` property has an unsupported value.
    BadNCells,
    /// A node name or path is malformed.
    BadPath,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidMagic => write!(f, "invalid FDT magic number"),
            ErrorKind::UnsupportedVersion(version) => {
                write!(f, "the FDT version {version} is not supported")
            }
            ErrorKind::InvalidLength => write!(f, "invalid FDT length"),
            ErrorKind::BadToken(token) => write!(f, "bad FDT token: 0x{token:x}"),
            ErrorKind::InvalidString => write!(f, "invalid string in FDT"),
            ErrorKind::BadLayout => write!(f, "FDT blocks are misordered"),
            ErrorKind::NotFound => write!(f, "node or property not found"),
            ErrorKind::Exists => write!(f, "node already exists"),
            ErrorKind::NoSpace => write!(f, "no space left in the FDT buffer"),
            ErrorKind::BadNCells => write!(f, "bad #address-cells or #size-cells value"),
            ErrorKind::BadPath => write!(f, "malformed node name or path"),
        }
    }
}

impl core::error::Error for Error {}
