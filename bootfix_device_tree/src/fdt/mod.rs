// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for parsing and traversing a [Flattened Device Tree (FDT)].
//!
//! This module provides the [`Fdt`] struct, which is the entry point for
//! parsing and traversing an FDT blob. The API is designed to be safe and
//! efficient, performing no memory allocation and providing a zero-copy view
//! of the FDT data.
//!
//! [Flattened Device Tree (FDT)]: https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html

use crate::error::{Error, ErrorKind};
mod node;
mod property;
use core::ffi::CStr;
use core::fmt;

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::big_endian;

pub use node::FdtNode;
pub use property::FdtProperty;

/// Version of the FDT specification supported by this library.
pub(crate) const FDT_VERSION: u32 = 17;
pub(crate) const FDT_LAST_COMP_VERSION: u32 = 16;
pub(crate) const FDT_TAGSIZE: usize = core::mem::size_of::<u32>();
pub(crate) const FDT_MAGIC: u32 = 0xd00d_feed;
pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

/// Size of the header of an `FDT_PROP` item: the token, the value length and
/// the name offset.
pub(crate) const FDT_PROP_HEADER_SIZE: usize = 3 * FDT_TAGSIZE;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct FdtHeader {
    /// Magic number of the device tree.
    pub(crate) magic: big_endian::U32,
    /// Total size of the device tree.
    pub(crate) totalsize: big_endian::U32,
    /// Offset of the device tree structure.
    pub(crate) off_dt_struct: big_endian::U32,
    /// Offset of the device tree strings.
    pub(crate) off_dt_strings: big_endian::U32,
    /// Offset of the memory reservation map.
    pub(crate) off_mem_rsvmap: big_endian::U32,
    /// Version of the device tree.
    pub(crate) version: big_endian::U32,
    /// Last compatible version of the device tree.
    pub(crate) last_comp_version: big_endian::U32,
    /// Physical ID of the boot CPU.
    pub(crate) boot_cpuid_phys: big_endian::U32,
    /// Size of the device tree strings.
    pub(crate) size_dt_strings: big_endian::U32,
    /// Size of the device tree structure.
    pub(crate) size_dt_struct: big_endian::U32,
}

pub(crate) const FDT_HEADER_SIZE: usize = core::mem::size_of::<FdtHeader>();

impl FdtHeader {
    pub(crate) fn magic(&self) -> u32 {
        self.magic.get()
    }

    pub(crate) fn totalsize(&self) -> usize {
        self.totalsize.get() as usize
    }

    pub(crate) fn off_dt_struct(&self) -> usize {
        self.off_dt_struct.get() as usize
    }

    pub(crate) fn off_dt_strings(&self) -> usize {
        self.off_dt_strings.get() as usize
    }

    pub(crate) fn off_mem_rsvmap(&self) -> usize {
        self.off_mem_rsvmap.get() as usize
    }

    pub(crate) fn version(&self) -> u32 {
        self.version.get()
    }

    pub(crate) fn last_comp_version(&self) -> u32 {
        self.last_comp_version.get()
    }

    pub(crate) fn size_dt_strings(&self) -> usize {
        self.size_dt_strings.get() as usize
    }

    pub(crate) fn size_dt_struct(&self) -> usize {
        self.size_dt_struct.get() as usize
    }

    /// Checks the header fields that do not depend on the buffer contents.
    pub(crate) fn validate(&self, buffer_len: usize) -> Result<(), Error> {
        if self.magic() != FDT_MAGIC {
            return Err(Error::new(ErrorKind::InvalidMagic, 0));
        }
        if !(self.last_comp_version()..=self.version()).contains(&FDT_VERSION) {
            return Err(Error::new(
                ErrorKind::UnsupportedVersion(self.version()),
                20,
            ));
        }
        let totalsize = self.totalsize();
        if totalsize < FDT_HEADER_SIZE || totalsize > buffer_len {
            return Err(Error::new(ErrorKind::InvalidLength, 4));
        }
        if self.off_dt_struct() + self.size_dt_struct() > totalsize {
            return Err(Error::new(ErrorKind::InvalidLength, 36));
        }
        if self.off_dt_strings() + self.size_dt_strings() > totalsize {
            return Err(Error::new(ErrorKind::InvalidLength, 32));
        }
        Ok(())
    }
}

/// The offset of a node within the structure block of a device tree.
///
/// The root node is always at offset 0. Offsets are only valid until the next
/// edit of the blob that inserts or resizes anything located before the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeOffset(usize);

impl NodeOffset {
    /// The offset of the root node.
    pub const ROOT: Self = Self(0);

    pub(crate) fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Returns the raw byte offset within the structure block.
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A flattened device tree.
#[derive(Clone, Copy)]
pub struct Fdt<'a> {
    pub(crate) data: &'a [u8],
}

impl fmt::Debug for Fdt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fdt")
            .field("totalsize", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// A token in the device tree structure.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FdtToken {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

impl TryFrom<u32> for FdtToken {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            FDT_BEGIN_NODE => Ok(FdtToken::BeginNode),
            FDT_END_NODE => Ok(FdtToken::EndNode),
            FDT_PROP => Ok(FdtToken::Prop),
            FDT_NOP => Ok(FdtToken::Nop),
            FDT_END => Ok(FdtToken::End),
            _ => Err(value),
        }
    }
}

/// Returns whether the name of a node matches the name being searched for.
///
/// A name without a unit address also matches nodes that have one, so `cpus`
/// matches both `cpus` and `cpus@0`.
pub(crate) fn node_name_matches(node_name: &str, wanted: &str) -> bool {
    if node_name == wanted {
        return true;
    }
    !wanted.contains('@')
        && node_name
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with('@'))
}

impl<'a> Fdt<'a> {
    /// Creates a new `Fdt` from the given byte slice.
    ///
    /// The slice may be longer than the blob; only the first `totalsize`
    /// bytes (as given by the header) are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is too short, has the wrong magic
    /// number, an unsupported version, or describes blocks that do not fit in
    /// the slice.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bootfix_device_tree::fdt::Fdt;
    /// # use bootfix_device_tree::fdt_rw::FdtMut;
    /// # let mut buf = [0u8; 128];
    /// # let dtb = FdtMut::create_empty_tree(&mut buf).unwrap();
    /// let fdt = Fdt::new(dtb.as_bytes()).unwrap();
    /// assert_eq!(fdt.root().unwrap().name().unwrap(), "");
    /// ```
    pub fn new(data: &'a [u8]) -> Result<Self, Error> {
        let (header, _) = FdtHeader::ref_from_prefix(data)
            .map_err(|_e| Error::new(ErrorKind::InvalidLength, 0))?;
        header.validate(data.len())?;
        Ok(Fdt {
            data: &data[..header.totalsize()],
        })
    }

    /// Returns the header of the device tree.
    pub(crate) fn header(&self) -> &'a FdtHeader {
        let (header, _remaining_bytes) = FdtHeader::ref_from_prefix(self.data)
            .expect("new() checks if the slice is at least as big as the header");
        header
    }

    /// Returns the number of bytes used by the blob.
    #[must_use]
    pub fn totalsize(&self) -> usize {
        self.data.len()
    }

    /// Returns the bytes of the blob.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the root node of the device tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure block does not start with a node.
    pub fn root(&self) -> Result<FdtNode<'a>, Error> {
        self.node(NodeOffset::ROOT)
    }

    /// Returns the node at the given offset within the structure block.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BadToken`] if there is no node starting at
    /// `offset`.
    pub fn node(&self, offset: NodeOffset) -> Result<FdtNode<'a>, Error> {
        let offset = self.header().off_dt_struct() + offset.get();
        let token = self.read_token(offset)?;
        if token != FdtToken::BeginNode {
            return Err(Error::new(ErrorKind::BadToken(FDT_BEGIN_NODE), offset));
        }
        Ok(FdtNode { fdt: *self, offset })
    }

    /// Finds a node by its path.
    ///
    /// Path components without a unit address also match nodes that have one,
    /// so `/cpus/cpu` finds `/cpus/cpu@0` if there is no plain `cpu` node
    /// before it.
    ///
    /// # Performance
    ///
    /// This method traverses the device tree and its performance is linear in
    /// the number of nodes in the path.
    pub fn find_node(&self, path: &str) -> Option<Result<FdtNode<'a>, Error>> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current_node = match self.root() {
            Ok(node) => node,
            Err(e) => return Some(Err(e)),
        };
        for component in path.split('/').filter(|s| !s.is_empty()) {
            match current_node.child(component) {
                Ok(Some(node)) => current_node = node,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(current_node))
    }

    /// Finds the first node after `after` (in document order) whose
    /// `compatible` property contains `compatible`.
    ///
    /// Passing `None` searches the whole tree, including the root node.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure block is malformed.
    pub fn find_compatible(
        &self,
        after: Option<NodeOffset>,
        compatible: &str,
    ) -> Result<Option<FdtNode<'a>>, Error> {
        let mut candidate = match after {
            None => Some(self.root()?.offset),
            Some(after) => self.next_node(self.node(after)?.offset)?,
        };
        while let Some(offset) = candidate {
            let node = FdtNode { fdt: *self, offset };
            if node.is_compatible(compatible)? {
                return Ok(Some(node));
            }
            candidate = self.next_node(offset)?;
        }
        Ok(None)
    }

    /// Returns the absolute offset of the node following the node at `offset`
    /// in document order, descending into children first.
    pub(crate) fn next_node(&self, offset: usize) -> Result<Option<usize>, Error> {
        let mut offset = self.node_body_offset(offset)?;
        loop {
            match self.read_token(offset)? {
                FdtToken::BeginNode => return Ok(Some(offset)),
                FdtToken::Prop => offset = self.property_end_offset(offset)?,
                FdtToken::EndNode | FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::End => return Ok(None),
            }
        }
    }

    pub(crate) fn read_u32(&self, offset: usize) -> Result<u32, Error> {
        self.data
            .get(offset..)
            .and_then(|bytes| big_endian::U32::ref_from_prefix(bytes).ok())
            .map(|(val, _)| val.get())
            .ok_or(Error::new(ErrorKind::InvalidLength, offset))
    }

    pub(crate) fn read_token(&self, offset: usize) -> Result<FdtToken, Error> {
        let val = self.read_u32(offset)?;
        FdtToken::try_from(val).map_err(|t| Error::new(ErrorKind::BadToken(t), offset))
    }

    /// Return a string from the string block.
    pub(crate) fn string(&self, string_block_offset: usize) -> Result<&'a str, Error> {
        let header = self.header();
        let strings_start = header.off_dt_strings();
        let strings_end = strings_start + header.size_dt_strings();
        let string_start = strings_start + string_block_offset;

        if string_start >= strings_end {
            return Err(Error::new(ErrorKind::InvalidLength, string_start));
        }

        self.string_at_offset(string_start, Some(strings_end))
    }

    /// Return a NUL-terminated string from a given offset.
    pub(crate) fn string_at_offset(
        &self,
        offset: usize,
        end: Option<usize>,
    ) -> Result<&'a str, Error> {
        let slice = match end {
            Some(end) => self.data.get(offset..end),
            None => self.data.get(offset..),
        }
        .ok_or(Error::new(ErrorKind::InvalidString, offset))?;

        match CStr::from_bytes_until_nul(slice).map(CStr::to_str) {
            Ok(Ok(val)) => Ok(val),
            _ => Err(Error::new(ErrorKind::InvalidString, offset)),
        }
    }

    pub(crate) fn find_string_end(&self, start: usize) -> Result<usize, Error> {
        let mut offset = start;
        loop {
            match self.data.get(offset) {
                Some(0) => return Ok(offset + 1),
                Some(_) => {}
                None => return Err(Error::new(ErrorKind::InvalidString, start)),
            }
            offset += 1;
        }
    }

    /// Returns the offset of the first item after the name of the node
    /// starting at `offset`.
    pub(crate) fn node_body_offset(&self, offset: usize) -> Result<usize, Error> {
        let name_end = self.find_string_end(offset + FDT_TAGSIZE)?;
        Ok(Self::align_tag_offset(name_end))
    }

    /// Returns the offset of the first item after the properties (and
    /// `FDT_NOP`s between them) of the node starting at `offset`. This is
    /// where its first child, or its `FDT_END_NODE`, begins.
    pub(crate) fn node_properties_end(&self, offset: usize) -> Result<usize, Error> {
        let mut offset = self.node_body_offset(offset)?;
        loop {
            match self.read_token(offset)? {
                FdtToken::Prop => offset = self.property_end_offset(offset)?,
                FdtToken::Nop => offset += FDT_TAGSIZE,
                _ => return Ok(offset),
            }
        }
    }

    /// Returns the offset just past the `FDT_END_NODE` of the node starting at
    /// `offset`.
    pub(crate) fn node_end_offset(&self, offset: usize) -> Result<usize, Error> {
        let mut offset = self.node_properties_end(offset)?;
        loop {
            match self.read_token(offset)? {
                FdtToken::BeginNode => offset = self.node_end_offset(offset)?,
                FdtToken::EndNode => return Ok(offset + FDT_TAGSIZE),
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::Prop | FdtToken::End => {
                    return Err(Error::new(ErrorKind::BadToken(FDT_END_NODE), offset));
                }
            }
        }
    }

    /// Returns the offset just past the property starting at `offset` (which
    /// points at its `FDT_PROP` token), padding included.
    pub(crate) fn property_end_offset(&self, offset: usize) -> Result<usize, Error> {
        let len = self.read_u32(offset + FDT_TAGSIZE)? as usize;
        let end = Self::align_tag_offset(offset + FDT_PROP_HEADER_SIZE + len);
        if end > self.data.len() {
            return Err(Error::new(ErrorKind::InvalidLength, offset));
        }
        Ok(end)
    }

    pub(crate) fn align_tag_offset(offset: usize) -> usize {
        offset.next_multiple_of(FDT_TAGSIZE)
    }
}
