// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The last steps before handing over to the next boot stage.

use bootfix_device_tree::fdt_rw::FdtMut;
use log::info;

use crate::Error;
use crate::platform::Platform;

/// Applies the platform's device tree fixups to the blob in `dtb`, then sets up and returns the
/// power state hooks.
///
/// `dtb` must hold a valid blob at its start. The rest of the buffer is used as room for the
/// fixups to grow the blob.
///
/// # Errors
///
/// Returns the first error hit while opening or modifying the blob. The power state hooks are
/// not set up in that case, and the caller should halt.
pub fn prepare_handoff<'p, P: Platform>(
    platform: &'p P,
    dtb: &mut [u8],
    sec_entrypoint: u64,
) -> Result<P::PsciOps<'p>, Error> {
    let mut fdt = FdtMut::new(dtb)?;
    platform.modify_dt(&mut fdt)?;
    info!(
        "Device tree ready: {} of {} bytes used",
        fdt.totalsize(),
        fdt.capacity()
    );

    Ok(platform.psci_ops(sec_entrypoint))
}
