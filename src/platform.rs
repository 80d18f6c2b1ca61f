// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

pub mod sunxi;

use bootfix_device_tree::fdt_rw::FdtMut;

use crate::Error;
use crate::psci::PowerStateOps;
use crate::topology::CpuTopology;

/// Platform-specific code.
pub trait Platform: CpuTopology {
    /// The maximum number of cores supported by the platform.
    const MAX_CORES: usize;

    /// Start of DRAM. Non-secure entry points below it are rejected.
    const DRAM_BASE: u64;

    /// Memory used by this firmware that the next stage must keep away from,
    /// as `(base, size)`.
    const RESERVED_REGION: Option<(u64, u64)> = None;

    /// The power state hooks handed to the PSCI implementation.
    type PsciOps<'s>: PowerStateOps
    where
        Self: 's;

    /// Modify the Device Tree if needed to adjust for the platform's needs. That might include
    /// reserving memory for the firmware, or describing the CPUs and how to turn them on.
    fn modify_dt(&self, fdt: &mut FdtMut<'_>) -> Result<(), Error>;

    /// Programs the secure warm boot entry point and returns the power state hooks to use for the
    /// rest of the boot.
    ///
    /// This should only be called once.
    fn psci_ops(&self, sec_entrypoint: u64) -> Self::PsciOps<'_>;
}

/// The GIC operations the power state hooks need.
pub trait GicCpuInterface {
    /// Enables the CPU interface of the calling core.
    fn cpuif_enable(&self);

    /// Disables the CPU interface of the calling core.
    fn cpuif_disable(&self);

    /// Initialises the distributor state private to the calling core.
    fn pcpu_distif_init(&self);

    /// Initialises the shared distributor state.
    fn distif_init(&self);
}

/// Direct control over the power of individual cores and the board.
pub trait CpuPowerControl {
    /// Releases the core identified by `mpidr` from reset.
    fn cpu_on(&self, mpidr: u64);

    /// Powers off the core identified by `mpidr`.
    fn cpu_off(&self, mpidr: u64);

    /// Asks the power management IC to turn the board off. May not return.
    fn power_down(&self);

    /// Powers off every core except `primary`.
    fn disable_secondary_cpus(&self, primary: u64);
}

/// A system-wide power request sent to the power management coprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPowerRequest {
    Shutdown,
    Reboot,
}

/// A channel to a power management coprocessor speaking SCPI.
pub trait ScpiChannel {
    /// Returns whether the coprocessor answered the initial handshake.
    fn is_available(&self) -> bool;

    /// Requests the given SCPI power states for the core, cluster and system
    /// levels around `mpidr`.
    fn set_css_power_state(&self, mpidr: u64, cpu_state: u32, cluster_state: u32, system_state: u32);

    /// Requests a system-wide power change, returning the SCPI status on
    /// failure.
    fn sys_power_state(&self, request: SystemPowerRequest) -> Result<(), u32>;
}

/// A busy-wait timer.
pub trait Delay {
    /// Waits for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}
