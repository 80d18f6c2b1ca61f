// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Boot-time device tree fixups and PSCI platform hooks for Arm firmware.
//!
//! Early boot firmware patches the device tree it hands to the next stage so
//! that the description matches what the firmware provides: a PSCI node, CPU
//! nodes that boot through PSCI, reserved memory for the firmware itself and a
//! correctly sized GICv3 redistributor region. It also picks the set of power
//! state hooks used by the PSCI implementation for the lifetime of the
//! system.
//!
//! The blob is edited in place with [`bootfix_device_tree`]. Logging goes
//! through the [`log`] facade; the boot image owns the logger.

#![cfg_attr(not(test), no_std)]
#![deny(clippy::undocumented_unsafe_blocks)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod boot;
pub mod error;
pub mod fixup;
pub mod platform;
pub mod psci;
pub mod topology;

pub use error::Error;
