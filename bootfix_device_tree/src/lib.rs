// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for reading and editing Flattened Device Tree (FDT) blobs in
//! place, without memory allocation.
//!
//! This library provides two views of a blob:
//!
//! - A read-only API centered around the [`Fdt`](fdt::Fdt) struct, a safe,
//!   zero-copy view used to traverse the tree and read property values.
//! - A read-write API centered around the [`FdtMut`](fdt_rw::FdtMut) struct,
//!   which edits the blob inside the caller's buffer. Nodes and properties are
//!   inserted and resized by shifting the bytes that follow them, the same way
//!   the flattened format itself is laid out.
//!
//! Nodes are addressed by [`NodeOffset`](fdt::NodeOffset), their byte offset
//! within the structure block. Offsets are not stable: any edit can move every
//! node located after the edit point, so offsets must be looked up again after
//! inserting or resizing anything. The borrow checker enforces part of this,
//! as every edit takes `&mut FdtMut`, but a stale `NodeOffset` is a plain value
//! and is not tracked.
//!
//! The library is `#![no_std]` and does not need `alloc`.
//!
//! # Examples
//!
//! ```
//! use bootfix_device_tree::fdt::Fdt;
//! use bootfix_device_tree::fdt_rw::FdtMut;
//!
//! let mut buf = [0u8; 256];
//! let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
//! let root = fdt.path_offset("/").unwrap();
//! let chosen = fdt.add_subnode(root, "chosen").unwrap();
//! fdt.setprop_string(chosen, "bootargs", "console=ttyS0").unwrap();
//!
//! let fdt = Fdt::new(fdt.as_bytes()).unwrap();
//! let chosen = fdt.find_node("/chosen").unwrap().unwrap();
//! let prop = chosen.property("bootargs").unwrap().unwrap();
//! assert_eq!(prop.as_str().unwrap(), "console=ttyS0");
//! ```

#![no_std]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod fdt;
pub mod fdt_rw;

pub use error::{Error, ErrorKind};

/// A specialized [`Result`](core::result::Result) for device tree operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;
