// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bootfix_device_tree::fdt::NodeOffset;
use bootfix_device_tree::fdt_rw::FdtMut;
use log::debug;

use crate::Error;

const GIC_V3_COMPATIBLE: &str = "arm,gic-v3";

/// Resizes the redistributor region of the first GICv3 node to cover
/// `core_count` frames of `frame_size` bytes each.
///
/// The `reg` property must start with the distributor region followed by the
/// redistributor region. Only the size cells of the second region are
/// rewritten, so the property keeps its length.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if there is no GICv3 node or it has no `reg`,
/// [`Error::RegTooShort`] if `reg` holds fewer than two regions and
/// [`Error::InvalidCellConfig`] if the parent's `#size-cells` is not 1 or 2.
/// Nothing is written in any of these cases.
pub fn adjust_gic_redist(
    fdt: &mut FdtMut<'_>,
    core_count: u32,
    frame_size: u32,
) -> Result<(), Error> {
    let gic = fdt
        .node_offset_by_compatible(Some(NodeOffset::ROOT), GIC_V3_COMPATIBLE)?
        .ok_or(Error::NotFound)?;
    let parent = fdt.parent_offset(gic)?;
    let address_cells = cells_to_usize(fdt.address_cells(parent)?);
    let size_cells = cells_to_usize(fdt.size_cells(parent)?);
    if !(1..=2).contains(&size_cells) {
        return Err(Error::InvalidCellConfig);
    }

    let reg_len = fdt.getprop(gic, "reg")?.ok_or(Error::NotFound)?.len();
    let needed = 2 * (address_cells + size_cells);
    if reg_len / 4 < needed {
        return Err(Error::RegTooShort {
            cells: reg_len / 4,
            needed,
        });
    }

    let index = (address_cells + size_cells + address_cells) * 4;
    if size_cells == 1 {
        let size = core_count.wrapping_mul(frame_size);
        fdt.setprop_inplace_partial(gic, "reg", index, &size.to_be_bytes())?;
    } else {
        let size = u64::from(core_count) * u64::from(frame_size);
        fdt.setprop_inplace_partial(gic, "reg", index, &size.to_be_bytes())?;
    }
    debug!("GIC redistributor region resized for {core_count} cores");
    Ok(())
}

fn cells_to_usize(cells: u32) -> usize {
    // `address_cells` and `size_cells` never return more than 4.
    cells as usize
}
