// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting a device tree node.

use super::{FDT_TAGSIZE, Fdt, FdtToken, NodeOffset, node_name_matches};
use crate::error::Error;
use crate::fdt::property::{FdtPropIter, FdtProperty};

/// A node in a flattened device tree.
#[derive(Clone, Copy)]
pub struct FdtNode<'a> {
    pub(crate) fdt: Fdt<'a>,
    /// Absolute offset of the `FDT_BEGIN_NODE` token.
    pub(crate) offset: usize,
}

impl<'a> FdtNode<'a> {
    /// Returns the name of this node, including its unit address.
    ///
    /// The root node has an empty name.
    pub fn name(&self) -> Result<&'a str, Error> {
        self.fdt.string_at_offset(self.offset + FDT_TAGSIZE, None)
    }

    /// Returns the offset of this node within the structure block.
    #[must_use]
    pub fn offset(&self) -> NodeOffset {
        NodeOffset::new(self.offset - self.fdt.header().off_dt_struct())
    }

    /// Returns a property by its name.
    ///
    /// # Performance
    ///
    /// This method iterates through all properties of the node.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bootfix_device_tree::fdt::Fdt;
    /// # use bootfix_device_tree::fdt_rw::FdtMut;
    /// # let mut buf = [0u8; 256];
    /// # let mut dtb = FdtMut::create_empty_tree(&mut buf).unwrap();
    /// # let root = dtb.path_offset("/").unwrap();
    /// # dtb.setprop_u32(root, "u32-prop", 0x1234_5678).unwrap();
    /// let fdt = Fdt::new(dtb.as_bytes()).unwrap();
    /// let prop = fdt.root().unwrap().property("u32-prop").unwrap().unwrap();
    /// assert_eq!(prop.as_u32().unwrap(), 0x1234_5678);
    /// ```
    pub fn property(&self, name: &str) -> crate::Result<Option<FdtProperty<'a>>> {
        for property in self.properties() {
            let property = property?;
            if property.name() == name {
                return Ok(Some(property));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the properties of this node, in blob order.
    pub fn properties(&self) -> impl Iterator<Item = crate::Result<FdtProperty<'a>>> + use<'a> {
        FdtPropIter::new(self.fdt, self.offset)
    }

    /// Returns the first child node matching `name`.
    ///
    /// A `name` without a unit address also matches children that have one.
    ///
    /// # Performance
    ///
    /// This method's performance is linear in the number of children of this
    /// node because it iterates through the children.
    pub fn child(&self, name: &str) -> crate::Result<Option<FdtNode<'a>>> {
        for child in self.children() {
            let child = child?;
            if node_name_matches(child.name()?, name) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the children of this node, in blob order.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bootfix_device_tree::fdt::Fdt;
    /// # use bootfix_device_tree::fdt_rw::FdtMut;
    /// # let mut buf = [0u8; 256];
    /// # let mut dtb = FdtMut::create_empty_tree(&mut buf).unwrap();
    /// # let root = dtb.path_offset("/").unwrap();
    /// # dtb.add_subnode(root, "child2").unwrap();
    /// # dtb.add_subnode(root, "child1").unwrap();
    /// let fdt = Fdt::new(dtb.as_bytes()).unwrap();
    /// let root = fdt.root().unwrap();
    /// let mut children = root.children();
    /// assert_eq!(children.next().unwrap().unwrap().name().unwrap(), "child1");
    /// assert_eq!(children.next().unwrap().unwrap().name().unwrap(), "child2");
    /// assert!(children.next().is_none());
    /// ```
    pub fn children(&self) -> impl Iterator<Item = crate::Result<FdtNode<'a>>> + use<'a> {
        FdtChildIter {
            fdt: self.fdt,
            state: ChildIterState::Start(self.offset),
        }
    }

    /// Returns whether the `compatible` property of this node contains
    /// `compatible` as one of its strings.
    pub fn is_compatible(&self, compatible: &str) -> crate::Result<bool> {
        Ok(self
            .property("compatible")?
            .is_some_and(|prop| prop.as_str_list().any(|s| s == compatible)))
    }
}

impl core::fmt::Debug for FdtNode<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FdtNode")
            .field("name", &self.name())
            .field("offset", &self.offset())
            .finish()
    }
}

enum ChildIterState {
    Start(usize),
    Running(usize),
    Done,
}

/// An iterator over the children of a device tree node.
struct FdtChildIter<'a> {
    fdt: Fdt<'a>,
    state: ChildIterState,
}

impl<'a> Iterator for FdtChildIter<'a> {
    type Item = crate::Result<FdtNode<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.state {
            ChildIterState::Start(node) => self
                .fdt
                .node_properties_end(node)
                .and_then(|offset| self.step(offset)),
            ChildIterState::Running(offset) => self.step(offset),
            ChildIterState::Done => return None,
        };
        match result {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.state = ChildIterState::Done;
                None
            }
            Err(e) => {
                self.state = ChildIterState::Done;
                Some(Err(e))
            }
        }
    }
}

impl<'a> FdtChildIter<'a> {
    fn step(&mut self, mut offset: usize) -> crate::Result<Option<FdtNode<'a>>> {
        loop {
            match self.fdt.read_token(offset)? {
                FdtToken::BeginNode => {
                    self.state = ChildIterState::Running(self.fdt.node_end_offset(offset)?);
                    return Ok(Some(FdtNode {
                        fdt: self.fdt,
                        offset,
                    }));
                }
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::EndNode | FdtToken::End | FdtToken::Prop => return Ok(None),
            }
        }
    }
}
