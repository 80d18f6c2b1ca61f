// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An API for editing a flattened device tree in place.
//!
//! [`FdtMut`] works directly on the caller's buffer. The length of the buffer
//! is the capacity available to the blob, while the `totalsize` field of the
//! header tracks how many bytes are in use. Inserting or growing an item moves
//! everything after it towards the end of the buffer.
//!
//! Nodes are referred to by [`NodeOffset`]. Any edit may move nodes located
//! after the edit point, so offsets obtained before an edit must be looked up
//! again afterwards.

use zerocopy::{FromBytes, IntoBytes, big_endian};

use crate::error::{Error, ErrorKind};
use crate::fdt::{
    FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_HEADER_SIZE, FDT_LAST_COMP_VERSION, FDT_MAGIC,
    FDT_NOP, FDT_PROP, FDT_PROP_HEADER_SIZE, FDT_TAGSIZE, FDT_VERSION, Fdt, FdtHeader, FdtNode,
    NodeOffset,
};

/// Size of the empty memory reservation map: a single terminating entry.
const EMPTY_RSVMAP_SIZE: usize = 16;

/// Default value of `#address-cells` when the property is absent.
const DEFAULT_ADDRESS_CELLS: u32 = 2;
/// Default value of `#size-cells` when the property is absent.
const DEFAULT_SIZE_CELLS: u32 = 1;
const MAX_NCELLS: u32 = 4;

/// A flattened device tree that can be edited in place.
pub struct FdtMut<'a> {
    data: &'a mut [u8],
}

impl core::fmt::Debug for FdtMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FdtMut")
            .field("totalsize", &self.totalsize())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<'a> FdtMut<'a> {
    /// Opens the blob at the start of `data` for editing.
    ///
    /// All of `data` is available for the blob to grow into. Padding after the
    /// strings block, as left by `dtc -p`, is released: `totalsize` is trimmed
    /// to the end of the strings block and the padding becomes spare capacity.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Fdt::new`], or [`ErrorKind::BadLayout`]
    /// if the blocks of the blob are not in the order memory reservation map,
    /// structure block, strings block.
    pub fn new(data: &'a mut [u8]) -> Result<Self, Error> {
        let (header, _) = FdtHeader::ref_from_prefix(&*data)
            .map_err(|_e| Error::new(ErrorKind::InvalidLength, 0))?;
        header.validate(data.len())?;

        let rsvmap = header.off_mem_rsvmap();
        let struct_start = header.off_dt_struct();
        let struct_end = struct_start + header.size_dt_struct();
        let strings_start = header.off_dt_strings();
        let strings_end = strings_start + header.size_dt_strings();
        if rsvmap < FDT_HEADER_SIZE
            || rsvmap > struct_start
            || struct_end > strings_start
            || strings_end > header.totalsize()
            || !struct_start.is_multiple_of(FDT_TAGSIZE)
        {
            return Err(Error::new(ErrorKind::BadLayout, 0));
        }

        let mut fdt = Self { data };
        if strings_end < fdt.totalsize() {
            fdt.header_mut().totalsize = be_u32(strings_end);
        }
        Ok(fdt)
    }

    /// Writes an empty device tree, containing only a nameless root node, to
    /// the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoSpace`] if `data` is too small to hold the
    /// empty tree.
    pub fn create_empty_tree(data: &'a mut [u8]) -> Result<Self, Error> {
        let struct_start = FDT_HEADER_SIZE + EMPTY_RSVMAP_SIZE;
        let struct_size = 4 * FDT_TAGSIZE;
        let totalsize = struct_start + struct_size;
        if data.len() < totalsize {
            return Err(Error::new(ErrorKind::NoSpace, 0));
        }

        let header = FdtHeader {
            magic: big_endian::U32::new(FDT_MAGIC),
            totalsize: be_u32(totalsize),
            off_dt_struct: be_u32(struct_start),
            off_dt_strings: be_u32(totalsize),
            off_mem_rsvmap: be_u32(FDT_HEADER_SIZE),
            version: big_endian::U32::new(FDT_VERSION),
            last_comp_version: big_endian::U32::new(FDT_LAST_COMP_VERSION),
            boot_cpuid_phys: big_endian::U32::new(0),
            size_dt_strings: big_endian::U32::new(0),
            size_dt_struct: be_u32(struct_size),
        };
        data[..FDT_HEADER_SIZE].copy_from_slice(header.as_bytes());
        data[FDT_HEADER_SIZE..totalsize].fill(0);

        let mut fdt = Self { data };
        fdt.write_u32(struct_start, FDT_BEGIN_NODE);
        // The empty root name and its padding are already zero.
        fdt.write_u32(struct_start + 2 * FDT_TAGSIZE, FDT_END_NODE);
        fdt.write_u32(struct_start + 3 * FDT_TAGSIZE, FDT_END);
        Ok(fdt)
    }

    fn header(&self) -> &FdtHeader {
        let (header, _) = FdtHeader::ref_from_prefix(&*self.data)
            .expect("new() checks if the buffer is at least as big as the header");
        header
    }

    fn header_mut(&mut self) -> &mut FdtHeader {
        let (header, _) = FdtHeader::mut_from_prefix(&mut *self.data)
            .expect("new() checks if the buffer is at least as big as the header");
        header
    }

    /// Returns the number of bytes used by the blob.
    #[must_use]
    pub fn totalsize(&self) -> usize {
        self.header().totalsize()
    }

    /// Returns the size of the buffer the blob can grow into.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the bytes of the blob, without the unused capacity.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.totalsize()]
    }

    /// Returns a read-only view of the blob.
    #[must_use]
    pub fn as_fdt(&self) -> Fdt<'_> {
        Fdt {
            data: self.as_bytes(),
        }
    }

    fn node(&self, node: NodeOffset) -> Result<FdtNode<'_>, Error> {
        self.as_fdt().node(node)
    }

    fn struct_offset(&self) -> usize {
        self.header().off_dt_struct()
    }

    fn to_node_offset(&self, absolute: usize) -> NodeOffset {
        NodeOffset::new(absolute - self.struct_offset())
    }

    /// Returns the offset of the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if there is no such node, or
    /// [`ErrorKind::BadPath`] if `path` is not absolute.
    pub fn path_offset(&self, path: &str) -> Result<NodeOffset, Error> {
        if !path.starts_with('/') {
            return Err(Error::new(ErrorKind::BadPath, 0));
        }
        match self.as_fdt().find_node(path) {
            Some(node) => Ok(node?.offset()),
            None => Err(Error::new(ErrorKind::NotFound, 0)),
        }
    }

    /// Returns the offset of the first child of `parent` matching `name`.
    ///
    /// A `name` without a unit address also matches children that have one.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if there is no such child.
    pub fn subnode_offset(&self, parent: NodeOffset, name: &str) -> Result<NodeOffset, Error> {
        let parent = self.node(parent)?;
        parent
            .child(name)?
            .map(|child| child.offset())
            .ok_or(Error::new(ErrorKind::NotFound, parent.offset))
    }

    /// Returns the offset of the first child of `node`, if any.
    pub fn first_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>, Error> {
        Ok(match self.node(node)?.children().next() {
            Some(child) => Some(child?.offset()),
            None => None,
        })
    }

    /// Returns the offset of the sibling following `node`, if any.
    pub fn next_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>, Error> {
        let fdt = self.as_fdt();
        let mut offset = fdt.node_end_offset(self.node(node)?.offset)?;
        loop {
            match fdt.read_u32(offset)? {
                FDT_BEGIN_NODE => return Ok(Some(self.to_node_offset(offset))),
                FDT_NOP => offset += FDT_TAGSIZE,
                _ => return Ok(None),
            }
        }
    }

    /// Returns the offset of the parent of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] for the root node or if no node starts
    /// at `node`.
    pub fn parent_offset(&self, node: NodeOffset) -> Result<NodeOffset, Error> {
        let fdt = self.as_fdt();
        let target = self.node(node)?.offset;
        let mut current = fdt.root()?;
        'descend: loop {
            for child in current.children() {
                let child = child?;
                if child.offset == target {
                    return Ok(current.offset());
                }
                if child.offset < target && target < fdt.node_end_offset(child.offset)? {
                    current = child;
                    continue 'descend;
                }
            }
            return Err(Error::new(ErrorKind::NotFound, target));
        }
    }

    /// Adds an empty child node called `name` to `parent` and returns its
    /// offset.
    ///
    /// The new node is inserted before the existing children of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Exists`] if `parent` already has a child with
    /// exactly this name, [`ErrorKind::BadPath`] if `name` is not a valid node
    /// name and [`ErrorKind::NoSpace`] if the buffer is full.
    pub fn add_subnode(&mut self, parent: NodeOffset, name: &str) -> Result<NodeOffset, Error> {
        if name.is_empty() || name.contains(['/', '\0']) {
            return Err(Error::new(ErrorKind::BadPath, 0));
        }
        let parent = self.node(parent)?;
        for child in parent.children() {
            let child = child?;
            if child.name()? == name {
                return Err(Error::new(ErrorKind::Exists, child.offset));
            }
        }
        let insert_at = self.as_fdt().node_properties_end(parent.offset)?;

        let name_len = Fdt::align_tag_offset(name.len() + 1);
        let item_len = 2 * FDT_TAGSIZE + name_len;
        self.ensure_space(item_len)?;
        self.splice_struct(insert_at, 0, item_len);

        self.write_u32(insert_at, FDT_BEGIN_NODE);
        let name_start = insert_at + FDT_TAGSIZE;
        self.data[name_start..name_start + name_len].fill(0);
        self.data[name_start..name_start + name.len()].copy_from_slice(name.as_bytes());
        self.write_u32(name_start + name_len, FDT_END_NODE);

        Ok(self.to_node_offset(insert_at))
    }

    /// Returns the value of the property `name` of `node`, if present.
    pub fn getprop(&self, node: NodeOffset, name: &str) -> Result<Option<&[u8]>, Error> {
        Ok(self.node(node)?.property(name)?.map(|prop| prop.value()))
    }

    /// Sets the property `name` of `node` to `value`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoSpace`] if the buffer is too small for the new
    /// value. The blob is left untouched in that case.
    pub fn setprop(&mut self, node: NodeOffset, name: &str, value: &[u8]) -> Result<(), Error> {
        let value_offset = self.resize_property(node, name, value.len())?;
        self.data[value_offset..value_offset + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// Sets the property `name` of `node` to a single big-endian cell.
    pub fn setprop_u32(&mut self, node: NodeOffset, name: &str, value: u32) -> Result<(), Error> {
        self.setprop(node, name, &value.to_be_bytes())
    }

    /// Sets the property `name` of `node` to a big-endian 64-bit value (two
    /// cells).
    pub fn setprop_u64(&mut self, node: NodeOffset, name: &str, value: u64) -> Result<(), Error> {
        self.setprop(node, name, &value.to_be_bytes())
    }

    /// Sets the property `name` of `node` to the NUL-terminated string
    /// `value`.
    pub fn setprop_string(&mut self, node: NodeOffset, name: &str, value: &str) -> Result<(), Error> {
        let value_offset = self.resize_property(node, name, value.len() + 1)?;
        self.write_cstr(value_offset, value);
        Ok(())
    }

    /// Sets the property `name` of `node` to an empty value.
    pub fn setprop_empty(&mut self, node: NodeOffset, name: &str) -> Result<(), Error> {
        self.setprop(node, name, &[])
    }

    /// Appends `value` to the property `name` of `node`, creating it if
    /// needed.
    pub fn appendprop(&mut self, node: NodeOffset, name: &str, value: &[u8]) -> Result<(), Error> {
        let old_len = self.getprop(node, name)?.map_or(0, <[u8]>::len);
        let value_offset = self.resize_property(node, name, old_len + value.len())?;
        let start = value_offset + old_len;
        self.data[start..start + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// Appends the NUL-terminated string `value` to the property `name` of
    /// `node`, creating it if needed. This builds string lists such as
    /// `compatible`.
    pub fn appendprop_string(
        &mut self,
        node: NodeOffset,
        name: &str,
        value: &str,
    ) -> Result<(), Error> {
        let old_len = self.getprop(node, name)?.map_or(0, <[u8]>::len);
        let value_offset = self.resize_property(node, name, old_len + value.len() + 1)?;
        self.write_cstr(value_offset + old_len, value);
        Ok(())
    }

    /// Overwrites part of the value of the property `name` of `node`,
    /// starting `index` bytes into the value. The length of the property never
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if the property does not exist and
    /// [`ErrorKind::NoSpace`] if `value` does not fit within the existing
    /// value.
    pub fn setprop_inplace_partial(
        &mut self,
        node: NodeOffset,
        name: &str,
        index: usize,
        value: &[u8],
    ) -> Result<(), Error> {
        let node = self.node(node)?;
        let prop = node
            .property(name)?
            .ok_or(Error::new(ErrorKind::NotFound, node.offset))?;
        let value_offset = prop.offset + FDT_PROP_HEADER_SIZE;
        if index + value.len() > prop.value().len() {
            return Err(Error::new(ErrorKind::NoSpace, value_offset));
        }
        let start = value_offset + index;
        self.data[start..start + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// Returns the `#address-cells` value of `node`, defaulting to 2.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BadNCells`] if the property is malformed or
    /// outside `1..=4`.
    pub fn address_cells(&self, node: NodeOffset) -> Result<u32, Error> {
        self.ncells(node, "#address-cells", DEFAULT_ADDRESS_CELLS, 1)
    }

    /// Returns the `#size-cells` value of `node`, defaulting to 1.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BadNCells`] if the property is malformed or
    /// outside `0..=4`.
    pub fn size_cells(&self, node: NodeOffset) -> Result<u32, Error> {
        self.ncells(node, "#size-cells", DEFAULT_SIZE_CELLS, 0)
    }

    fn ncells(&self, node: NodeOffset, name: &str, default: u32, min: u32) -> Result<u32, Error> {
        let Some(prop) = self.node(node)?.property(name)? else {
            return Ok(default);
        };
        let bad_ncells = Error::new(ErrorKind::BadNCells, prop.offset);
        let cells = prop.as_u32().map_err(|_e| bad_ncells)?;
        if (min..=MAX_NCELLS).contains(&cells) {
            Ok(cells)
        } else {
            Err(bad_ncells)
        }
    }

    /// Returns the offset of the first node after `after` (in document order)
    /// whose `compatible` property lists `compatible`. `None` starts the
    /// search at the root node.
    pub fn node_offset_by_compatible(
        &self,
        after: Option<NodeOffset>,
        compatible: &str,
    ) -> Result<Option<NodeOffset>, Error> {
        Ok(self
            .as_fdt()
            .find_compatible(after, compatible)?
            .map(|node| node.offset()))
    }

    /// Makes the value of property `name` of `node` exactly `len` bytes long,
    /// creating the property if needed, and returns the absolute offset of
    /// the value.
    ///
    /// Existing value bytes are kept up to the new length. Bytes past the old
    /// length are zeroed.
    fn resize_property(&mut self, node: NodeOffset, name: &str, len: usize) -> Result<usize, Error> {
        let node = self.node(node)?;
        let new_item_len = Fdt::align_tag_offset(FDT_PROP_HEADER_SIZE + len);

        if let Some(prop) = node.property(name)? {
            let offset = prop.offset;
            let old_len = prop.value().len();
            let old_item_len = Fdt::align_tag_offset(FDT_PROP_HEADER_SIZE + old_len);
            self.ensure_space(new_item_len.saturating_sub(old_item_len))?;
            self.splice_struct(offset, old_item_len, new_item_len);
            self.write_u32(offset + FDT_TAGSIZE, be_len(len));
            let value_offset = offset + FDT_PROP_HEADER_SIZE;
            if len > old_len {
                self.data[value_offset + old_len..offset + new_item_len].fill(0);
            } else {
                self.data[value_offset + len..offset + new_item_len].fill(0);
            }
            return Ok(value_offset);
        }

        let insert_at = self.as_fdt().node_properties_end(node.offset)?;
        let existing_name = self.find_string(name);
        let string_len = if existing_name.is_some() {
            0
        } else {
            name.len() + 1
        };
        self.ensure_space(new_item_len + string_len)?;
        let nameoff = match existing_name {
            Some(nameoff) => nameoff,
            None => self.add_string(name),
        };

        self.splice_struct(insert_at, 0, new_item_len);
        self.write_u32(insert_at, FDT_PROP);
        self.write_u32(insert_at + FDT_TAGSIZE, be_len(len));
        self.write_u32(insert_at + 2 * FDT_TAGSIZE, be_len(nameoff));
        self.data[insert_at + FDT_PROP_HEADER_SIZE..insert_at + new_item_len].fill(0);
        Ok(insert_at + FDT_PROP_HEADER_SIZE)
    }

    /// Returns the offset within the strings block of a NUL-terminated string
    /// equal to `name`. The match may be the tail of a longer string.
    fn find_string(&self, name: &str) -> Option<usize> {
        let header = self.header();
        let start = header.off_dt_strings();
        let strings = &self.data[start..start + header.size_dt_strings()];
        let name = name.as_bytes();
        strings
            .windows(name.len() + 1)
            .position(|window| window[..name.len()] == *name && window[name.len()] == 0)
    }

    /// Appends `name` to the strings block. Space must have been checked.
    fn add_string(&mut self, name: &str) -> usize {
        let header = self.header();
        let nameoff = header.size_dt_strings();
        let strings_end = header.off_dt_strings() + nameoff;
        let len = name.len() + 1;
        self.make_room(strings_end, 0, len);
        self.write_cstr(strings_end, name);
        let header = self.header_mut();
        header.size_dt_strings = be_u32(nameoff + len);
        nameoff
    }

    fn ensure_space(&self, extra: usize) -> Result<(), Error> {
        if self.totalsize() + extra > self.capacity() {
            Err(Error::new(ErrorKind::NoSpace, self.totalsize()))
        } else {
            Ok(())
        }
    }

    /// Replaces `old_len` bytes of the structure block at `offset` with
    /// `new_len` bytes of unspecified content.
    fn splice_struct(&mut self, offset: usize, old_len: usize, new_len: usize) {
        self.make_room(offset, old_len, new_len);
        let header = self.header_mut();
        let struct_size = header.size_dt_struct() + new_len - old_len;
        let strings = header.off_dt_strings() + new_len - old_len;
        header.size_dt_struct = be_u32(struct_size);
        header.off_dt_strings = be_u32(strings);
    }

    /// Moves everything between `offset + old_len` and the end of the blob so
    /// that it starts at `offset + new_len`, and updates `totalsize`.
    fn make_room(&mut self, offset: usize, old_len: usize, new_len: usize) {
        let totalsize = self.totalsize();
        let new_totalsize = totalsize + new_len - old_len;
        self.data
            .copy_within(offset + old_len..totalsize, offset + new_len);
        if new_totalsize < totalsize {
            self.data[new_totalsize..totalsize].fill(0);
        }
        self.header_mut().totalsize = be_u32(new_totalsize);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + FDT_TAGSIZE].copy_from_slice(&value.to_be_bytes());
    }

    fn write_cstr(&mut self, offset: usize, value: &str) {
        let end = offset + value.len();
        self.data[offset..end].copy_from_slice(value.as_bytes());
        self.data[end] = 0;
    }
}

#[allow(clippy::cast_possible_truncation)]
fn be_u32(value: usize) -> big_endian::U32 {
    // Blob sizes are bounded by the 32-bit `totalsize` field.
    big_endian::U32::new(value as u32)
}

#[allow(clippy::cast_possible_truncation)]
fn be_len(value: usize) -> u32 {
    value as u32
}
