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
use zerocopy::IntoBytes;
use zerocopy::byteorder::big_endian;

use super::find_node;
use crate::Error;

/// Adds a `no-map` region called `name` under `/reserved-memory`, creating
/// that node if needed.
///
/// `base` and `size` are encoded with the root node's `#address-cells` and
/// `#size-cells`. Only one- and two-cell encodings are produced: the high word
/// is emitted when the cell count is above one, and a single cell keeps just
/// the low 32 bits. Overlapping regions are not detected.
pub fn add_reserved_memory(
    fdt: &mut FdtMut<'_>,
    name: &str,
    base: u64,
    size: u64,
) -> Result<(), Error> {
    let address_cells = fdt.address_cells(NodeOffset::ROOT)?;
    let size_cells = fdt.size_cells(NodeOffset::ROOT)?;

    let parent = match find_node(fdt, "/reserved-memory")? {
        Some(parent) => parent,
        None => {
            let parent = fdt.add_subnode(NodeOffset::ROOT, "reserved-memory")?;
            fdt.setprop_u32(parent, "#address-cells", address_cells)?;
            fdt.setprop_u32(parent, "#size-cells", size_cells)?;
            fdt.setprop_empty(parent, "ranges")?;
            parent
        }
    };

    let mut reg = [big_endian::U32::new(0); 4];
    let mut cells = 0;
    for (value, width) in [(base, address_cells), (size, size_cells)] {
        if width > 1 {
            reg[cells] = big_endian::U32::new(high_word(value));
            cells += 1;
        }
        reg[cells] = big_endian::U32::new(low_word(value));
        cells += 1;
    }

    let region = fdt.add_subnode(parent, name)?;
    fdt.setprop_empty(region, "no-map")?;
    fdt.setprop(region, "reg", reg[..cells].as_bytes())?;
    debug!("Reserved memory region {name}: {base:#x}, size {size:#x}");
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn high_word(value: u64) -> u32 {
    (value >> 32) as u32
}

#[allow(clippy::cast_possible_truncation)]
fn low_word(value: u64) -> u32 {
    value as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_cells(fdt: &FdtMut<'_>, path: &str) -> Vec<u32> {
        let node = fdt.path_offset(path).unwrap();
        fdt.getprop(node, "reg")
            .unwrap()
            .unwrap()
            .chunks_exact(4)
            .map(|cell| u32::from_be_bytes(cell.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn two_cell_region() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        fdt.setprop_u32(NodeOffset::ROOT, "#address-cells", 2).unwrap();
        fdt.setprop_u32(NodeOffset::ROOT, "#size-cells", 2).unwrap();

        add_reserved_memory(&mut fdt, "tf-a@e000000", 0x0E00_0000, 0x0020_0000).unwrap();

        assert_eq!(
            reg_cells(&fdt, "/reserved-memory/tf-a@e000000"),
            [0x0, 0x0E00_0000, 0x0, 0x0020_0000]
        );
        let region = fdt.path_offset("/reserved-memory/tf-a").unwrap();
        assert_eq!(fdt.getprop(region, "no-map").unwrap(), Some(&[][..]));

        let parent = fdt.path_offset("/reserved-memory").unwrap();
        assert_eq!(fdt.address_cells(parent).unwrap(), 2);
        assert_eq!(fdt.size_cells(parent).unwrap(), 2);
        assert_eq!(fdt.getprop(parent, "ranges").unwrap(), Some(&[][..]));
    }

    #[test]
    fn one_cell_region_truncates() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        fdt.setprop_u32(NodeOffset::ROOT, "#address-cells", 1).unwrap();
        fdt.setprop_u32(NodeOffset::ROOT, "#size-cells", 1).unwrap();

        add_reserved_memory(&mut fdt, "fw", 0x1_4000_0000, 0x1000).unwrap();
        assert_eq!(reg_cells(&fdt, "/reserved-memory/fw"), [0x4000_0000, 0x1000]);
    }

    #[test]
    fn default_cells_and_existing_parent() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        let parent = fdt.add_subnode(NodeOffset::ROOT, "reserved-memory").unwrap();
        fdt.setprop_u32(parent, "#address-cells", 1).unwrap();

        // The root defaults to two address cells and one size cell.
        add_reserved_memory(&mut fdt, "a", 0x8000_0000, 0x10_0000).unwrap();
        add_reserved_memory(&mut fdt, "b", 0x8010_0000, 0x10_0000).unwrap();

        assert_eq!(reg_cells(&fdt, "/reserved-memory/a"), [0, 0x8000_0000, 0x10_0000]);
        assert_eq!(reg_cells(&fdt, "/reserved-memory/b"), [0, 0x8010_0000, 0x10_0000]);
        let parent = fdt.path_offset("/reserved-memory").unwrap();
        assert_eq!(fdt.getprop(parent, "ranges").unwrap(), None);
    }

    #[test]
    fn region_name_collision() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        add_reserved_memory(&mut fdt, "a", 0, 0x1000).unwrap();
        assert_eq!(
            add_reserved_memory(&mut fdt, "a", 0, 0x1000),
            Err(Error::AlreadyExists)
        );
    }

    #[test]
    fn out_of_space() {
        let mut buf = [0u8; 128];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        assert_eq!(
            add_reserved_memory(&mut fdt, "a", 0, 0x1000),
            Err(Error::BlobSpaceExhausted)
        );
    }
}
