// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! PSCI function identifiers and the platform power state hooks.

use arm_psci::ErrorCode;

pub mod psci_consts {
    //! Function identifiers advertised in the `/psci` device tree node.

    pub const PSCI_0_2_FN_BASE: u32 = 0x8400_0000;
    pub const PSCI_0_2_64BIT: u32 = 0x4000_0000;
    pub const PSCI_0_2_FN64_BASE: u32 = PSCI_0_2_FN_BASE + PSCI_0_2_64BIT;

    // 32-bit function IDs
    pub const FN_CPU_SUSPEND: u32 = PSCI_0_2_FN_BASE + 1;
    pub const FN_CPU_OFF: u32 = PSCI_0_2_FN_BASE + 2;
    pub const FN_CPU_ON: u32 = PSCI_0_2_FN_BASE + 3;

    // 64-bit function IDs
    pub const FN64_CPU_SUSPEND: u32 = PSCI_0_2_FN64_BASE + 1;
    pub const FN64_CPU_ON: u32 = PSCI_0_2_FN64_BASE + 3;
}

/// The register width the firmware runs with, which decides between the SMC32
/// and SMC64 variants of the PSCI calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// 32-bit firmware.
    AArch32,
    /// 64-bit firmware.
    AArch64,
}

impl ExecutionState {
    /// The execution state this firmware was built for.
    pub const CURRENT: Self = if cfg!(target_pointer_width = "64") {
        Self::AArch64
    } else {
        Self::AArch32
    };

    /// Function ID of `CPU_SUSPEND`.
    #[must_use]
    pub const fn cpu_suspend(self) -> u32 {
        match self {
            Self::AArch32 => psci_consts::FN_CPU_SUSPEND,
            Self::AArch64 => psci_consts::FN64_CPU_SUSPEND,
        }
    }

    /// Function ID of `CPU_OFF`, which has no 64-bit variant.
    #[must_use]
    pub const fn cpu_off(self) -> u32 {
        psci_consts::FN_CPU_OFF
    }

    /// Function ID of `CPU_ON`.
    #[must_use]
    pub const fn cpu_on(self) -> u32 {
        match self {
            Self::AArch32 => psci_consts::FN_CPU_ON,
            Self::AArch64 => psci_consts::FN64_CPU_ON,
        }
    }
}

/// Power state of one level of the power domain tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocalState {
    /// Powered and running.
    Run = 0,
    /// Clocks gated, state retained.
    Retention = 1,
    /// Powered down.
    Off = 2,
}

/// A level of the power domain tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    Cpu = 0,
    Cluster = 1,
    System = 2,
}

/// The power state requested for, or left by, each level of the power domain
/// tree containing the calling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositePowerState {
    states: [LocalState; 3],
}

impl CompositePowerState {
    /// Every level running.
    pub const RUN: Self = Self::new(LocalState::Run, LocalState::Run, LocalState::Run);
    /// Every level powered down.
    pub const OFF: Self = Self::new(LocalState::Off, LocalState::Off, LocalState::Off);

    #[must_use]
    pub const fn new(cpu: LocalState, cluster: LocalState, system: LocalState) -> Self {
        Self {
            states: [cpu, cluster, system],
        }
    }

    /// Returns the state of the given level.
    #[must_use]
    pub const fn level(&self, level: PowerLevel) -> LocalState {
        self.states[level as usize]
    }

    /// Returns whether the given level is powered down.
    #[must_use]
    pub fn is_off(&self, level: PowerLevel) -> bool {
        self.level(level) == LocalState::Off
    }
}

/// The platform hooks used by the generic PSCI implementation.
///
/// One value implementing this trait is chosen during platform setup and used
/// unchanged for the rest of the boot.
pub trait PowerStateOps {
    /// Turns on the core identified by `mpidr`.
    fn power_domain_on(&self, mpidr: u64) -> Result<(), ErrorCode>;

    /// Prepares the calling core for being turned off.
    fn power_domain_off(&self, target_state: &CompositePowerState);

    /// Finishes bringing up the calling core after it was turned on.
    fn power_domain_on_finish(&self, previous_state: &CompositePowerState);

    /// Powers down the calling core.
    fn power_domain_power_down_wfi(&self, target_state: &CompositePowerState) -> !;

    /// Shuts down the system.
    fn system_off(&self) -> !;

    /// Resets the system.
    fn system_reset(&self) -> !;

    /// Checks that `entrypoint` is a valid non-secure entry point.
    fn validate_ns_entrypoint(&self, entrypoint: u64) -> Result<(), ErrorCode>;
}
