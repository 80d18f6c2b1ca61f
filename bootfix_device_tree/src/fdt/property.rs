// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting a device tree property.

use core::ffi::CStr;

use zerocopy::{FromBytes, big_endian};

use super::{FDT_PROP_HEADER_SIZE, FDT_TAGSIZE, Fdt, FdtToken};
use crate::error::{Error, ErrorKind};

/// A property of a device tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtProperty<'a> {
    name: &'a str,
    value: &'a [u8],
    /// Absolute offset of the `FDT_PROP` token.
    pub(crate) offset: usize,
}

impl<'a> FdtProperty<'a> {
    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the raw value of this property.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    fn value_offset(&self) -> usize {
        self.offset + FDT_PROP_HEADER_SIZE
    }

    /// Returns the value of this property as a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidLength`] if the property's value is
    /// not 4 bytes long.
    pub fn as_u32(&self) -> Result<u32, Error> {
        big_endian::U32::ref_from_bytes(self.value)
            .map(|val| val.get())
            .map_err(|_e| Error::new(ErrorKind::InvalidLength, self.value_offset()))
    }

    /// Returns the value of this property as a `u64`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidLength`] if the property's value is
    /// not 8 bytes long.
    pub fn as_u64(&self) -> Result<u64, Error> {
        big_endian::U64::ref_from_bytes(self.value)
            .map(|val| val.get())
            .map_err(|_e| Error::new(ErrorKind::InvalidLength, self.value_offset()))
    }

    /// Returns the value of this property as a string.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidString`] if the property's value is
    /// not a single null-terminated string or contains invalid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, Error> {
        CStr::from_bytes_with_nul(self.value)
            .ok()
            .and_then(|cstr| cstr.to_str().ok())
            .ok_or(Error::new(ErrorKind::InvalidString, self.value_offset()))
    }

    /// Returns an iterator over the strings in this property.
    ///
    /// Iteration stops at the first string that is not terminated or not
    /// valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bootfix_device_tree::fdt::Fdt;
    /// # use bootfix_device_tree::fdt_rw::FdtMut;
    /// # let mut buf = [0u8; 256];
    /// # let mut dtb = FdtMut::create_empty_tree(&mut buf).unwrap();
    /// # let root = dtb.path_offset("/").unwrap();
    /// # dtb.appendprop_string(root, "compatible", "first").unwrap();
    /// # dtb.appendprop_string(root, "compatible", "second").unwrap();
    /// let fdt = Fdt::new(dtb.as_bytes()).unwrap();
    /// let prop = fdt.root().unwrap().property("compatible").unwrap().unwrap();
    /// let mut str_list = prop.as_str_list();
    /// assert_eq!(str_list.next(), Some("first"));
    /// assert_eq!(str_list.next(), Some("second"));
    /// assert_eq!(str_list.next(), None);
    /// ```
    pub fn as_str_list(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        FdtStringListIterator { value: self.value }
    }
}

/// An iterator over the properties of a device tree node.
pub(crate) struct FdtPropIter<'a> {
    fdt: Fdt<'a>,
    node: usize,
    /// `None` until the node name has been skipped.
    offset: Option<usize>,
    done: bool,
}

impl<'a> FdtPropIter<'a> {
    pub(crate) fn new(fdt: Fdt<'a>, node: usize) -> Self {
        Self {
            fdt,
            node,
            offset: None,
            done: false,
        }
    }

    fn try_next(&mut self) -> Result<Option<FdtProperty<'a>>, Error> {
        let mut offset = match self.offset {
            Some(offset) => offset,
            None => self.fdt.node_body_offset(self.node)?,
        };
        loop {
            match self.fdt.read_token(offset)? {
                FdtToken::Prop => {
                    let len = self.fdt.read_u32(offset + FDT_TAGSIZE)? as usize;
                    let nameoff = self.fdt.read_u32(offset + 2 * FDT_TAGSIZE)? as usize;
                    let value_offset = offset + FDT_PROP_HEADER_SIZE;
                    let value = self
                        .fdt
                        .data
                        .get(value_offset..value_offset + len)
                        .ok_or(Error::new(ErrorKind::InvalidLength, offset))?;
                    let name = self.fdt.string(nameoff)?;
                    self.offset = Some(Fdt::align_tag_offset(value_offset + len));
                    return Ok(Some(FdtProperty {
                        name,
                        value,
                        offset,
                    }));
                }
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::BeginNode | FdtToken::EndNode | FdtToken::End => return Ok(None),
            }
        }
    }
}

impl<'a> Iterator for FdtPropIter<'a> {
    type Item = Result<FdtProperty<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.try_next() {
            Ok(Some(prop)) => Some(Ok(prop)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

struct FdtStringListIterator<'a> {
    value: &'a [u8],
}

impl<'a> Iterator for FdtStringListIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.value.is_empty() {
            return None;
        }
        let cstr = CStr::from_bytes_until_nul(self.value).ok()?;
        let s = cstr.to_str().ok()?;
        self.value = &self.value[s.len() + 1..];
        Some(s)
    }
}
