// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Device tree fixups applied before handing the tree to the next boot stage.
//!
//! Every fixup edits the blob in place and stops at the first error, keeping
//! the edits made so far.

mod cpus;
mod gic;
mod psci;
mod reserved_memory;

pub use cpus::add_cpus_node;
pub use gic::adjust_gic_redist;
pub use psci::{add_psci_cpu_enable_methods, add_psci_node, add_psci_node_for};
pub use reserved_memory::add_reserved_memory;

use core::fmt::{self, Write};

use arrayvec::ArrayString;
use bootfix_device_tree::ErrorKind;
use bootfix_device_tree::fdt::NodeOffset;
use bootfix_device_tree::fdt_rw::FdtMut;

use crate::Error;

/// Looks up `path`, returning `None` rather than an error if it is absent.
fn find_node(fdt: &FdtMut<'_>, path: &str) -> Result<Option<NodeOffset>, Error> {
    match fdt.path_offset(path) {
        Ok(offset) => Ok(Some(offset)),
        Err(e) if e.kind == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Formats a node name into a fixed-size buffer.
pub(crate) fn node_name<const N: usize>(
    args: fmt::Arguments<'_>,
) -> Result<ArrayString<N>, Error> {
    let mut name = ArrayString::new();
    name.write_fmt(args).map_err(|_| Error::NodeNameTooLong)?;
    Ok(name)
}
