// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Allwinner (sunxi) SoCs with a single cluster of four Cortex-A cores.

mod native;
mod scpi;

pub use native::NativeOps;
pub use scpi::ScpiOps;

use core::ptr::NonNull;

use arm_psci::ErrorCode;
use arm_sysregs::{MpidrEl1, read_mpidr_el1};
use arrayvec::ArrayString;
use bootfix_device_tree::fdt_rw::FdtMut;
use log::{debug, info};
use safe_mmio::UniqueMmioPointer;
use safe_mmio::field;
use safe_mmio::fields::ReadPureWrite;
use spin::mutex::SpinMutex;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{CpuPowerControl, Delay, GicCpuInterface, Platform, ScpiChannel};
use crate::Error;
use crate::fixup::{
    add_cpus_node, add_psci_cpu_enable_methods, add_psci_node, add_reserved_memory, node_name,
};
use crate::psci::{CompositePowerState, PowerStateOps};
use crate::topology::CpuTopology;

const CLUSTER_COUNT: usize = 1;
const CPUS_PER_CLUSTER: usize = 4;

/// Base address of the CPU configuration block.
const CPUCFG_BASE_ADDRESS: *mut CpuCfgRegisters = 0x0170_0000 as _;
/// Base address of the watchdog in the R_ domain.
const R_WDOG_BASE_ADDRESS: *mut WatchdogRegisters = 0x01f0_1000 as _;

/// This firmware lives in the first MiB of DRAM.
const FIRMWARE_SIZE: u64 = 0x10_0000;

/// CPU configuration registers.
#[derive(FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C, align(4))]
pub struct CpuCfgRegisters {
    /// 0x00
    _reserved0: [u32; 40],
    /// 0xa0: reset vector base address of each core.
    pub rvbar: [RvbarRegisters; CLUSTER_COUNT * CPUS_PER_CLUSTER],
}

/// The reset vector base address of one core, split into two words.
#[derive(FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C, align(4))]
pub struct RvbarRegisters {
    pub lo: ReadPureWrite<u32>,
    pub hi: ReadPureWrite<u32>,
}

/// Watchdog registers.
#[derive(FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C, align(4))]
pub struct WatchdogRegisters {
    /// 0x00
    _reserved0: [u32; 4],
    /// 0x10
    pub ctrl: ReadPureWrite<u32>,
    /// 0x14
    pub cfg: ReadPureWrite<u32>,
    /// 0x18
    pub mode: ReadPureWrite<u32>,
}

/// The drivers the power state hooks call into.
#[derive(Clone, Copy)]
pub struct SunxiDrivers<'a> {
    pub gic: &'a dyn GicCpuInterface,
    pub power: &'a dyn CpuPowerControl,
    pub scpi: &'a dyn ScpiChannel,
    pub delay: &'a dyn Delay,
}

pub struct Sunxi<'a> {
    cpucfg: SpinMutex<UniqueMmioPointer<'a, CpuCfgRegisters>>,
    watchdog: SpinMutex<UniqueMmioPointer<'a, WatchdogRegisters>>,
    drivers: SunxiDrivers<'a>,
}

impl Sunxi<'static> {
    /// Creates an instance of the platform using the SoC's register blocks.
    ///
    /// # Safety
    ///
    /// This method must only be called once. Calling it multiple times would result in unsound
    /// mutable aliasing.
    pub unsafe fn create(drivers: SunxiDrivers<'static>) -> Self {
        // SAFETY: CPUCFG_BASE_ADDRESS is valid and mapped, and `create` is only called once so
        // there are no aliases.
        let cpucfg = unsafe {
            UniqueMmioPointer::new(
                NonNull::new(CPUCFG_BASE_ADDRESS).expect("CPUCFG_BASE_ADDRESS should not be null"),
            )
        };
        // SAFETY: R_WDOG_BASE_ADDRESS is valid and mapped, and `create` is only called once so
        // there are no aliases.
        let watchdog = unsafe {
            UniqueMmioPointer::new(
                NonNull::new(R_WDOG_BASE_ADDRESS).expect("R_WDOG_BASE_ADDRESS should not be null"),
            )
        };
        Self::new(cpucfg, watchdog, drivers)
    }
}

impl<'a> Sunxi<'a> {
    pub fn new(
        cpucfg: UniqueMmioPointer<'a, CpuCfgRegisters>,
        watchdog: UniqueMmioPointer<'a, WatchdogRegisters>,
        drivers: SunxiDrivers<'a>,
    ) -> Self {
        Self {
            cpucfg: SpinMutex::new(cpucfg),
            watchdog: SpinMutex::new(watchdog),
            drivers,
        }
    }

    /// Points the reset vector of every core at `sec_entrypoint`, then picks the native or the
    /// SCPI power state hooks depending on whether the power management coprocessor answers.
    pub fn setup_psci_ops<'s>(&'s self, sec_entrypoint: u64) -> SunxiPsciOps<'s, 'a> {
        self.set_reset_vectors(sec_entrypoint);

        if self.drivers.scpi.is_available() {
            info!("PSCI: System suspend is available via SCPI");
            SunxiPsciOps::Scpi(ScpiOps::new(self))
        } else {
            info!("PSCI: System suspend is unavailable");
            SunxiPsciOps::Native(NativeOps::new(self))
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_reset_vectors(&self, entrypoint: u64) {
        let mut cpucfg = self.cpucfg.lock();
        let mut rvbar = field!(cpucfg, rvbar);
        for mut core in rvbar.split() {
            field!(core, lo).write(entrypoint as u32);
            field!(core, hi).write((entrypoint >> 32) as u32);
        }
    }
}

impl CpuTopology for Sunxi<'_> {
    fn core_position(&self, mpidr: MpidrEl1) -> Option<usize> {
        if mpidr.aff3() != 0 || mpidr.aff2() != 0 {
            return None;
        }
        let cluster = usize::from(mpidr.aff1());
        let core = usize::from(mpidr.aff0());
        (cluster < CLUSTER_COUNT && core < CPUS_PER_CLUSTER)
            .then_some(cluster * CPUS_PER_CLUSTER + core)
    }

    fn current_mpidr(&self) -> MpidrEl1 {
        read_mpidr_el1()
    }
}

impl<'a> Platform for Sunxi<'a> {
    const MAX_CORES: usize = CLUSTER_COUNT * CPUS_PER_CLUSTER;
    const DRAM_BASE: u64 = 0x4000_0000;
    const RESERVED_REGION: Option<(u64, u64)> = Some((Self::DRAM_BASE, FIRMWARE_SIZE));

    type PsciOps<'s>
        = SunxiPsciOps<'s, 'a>
    where
        Self: 's;

    fn modify_dt(&self, fdt: &mut FdtMut<'_>) -> Result<(), Error> {
        if let Some((base, size)) = Self::RESERVED_REGION {
            let name: ArrayString<24> = node_name(format_args!("tf-a@{base:x}"))?;
            add_reserved_memory(fdt, &name, base, size)?;
        }

        // The cores of the only cluster are numbered at affinity level 0, which `add_cpus_node`
        // calls the thread level.
        #[allow(clippy::cast_possible_truncation)]
        match add_cpus_node(fdt, self, CPUS_PER_CLUSTER as u32, CLUSTER_COUNT as u32, 1) {
            Err(Error::AlreadyExists) => debug!("Keeping the existing /cpus node"),
            result => {
                result?;
            }
        }

        add_psci_node(fdt)?;
        add_psci_cpu_enable_methods(fdt)
    }

    fn psci_ops(&self, sec_entrypoint: u64) -> Self::PsciOps<'_> {
        self.setup_psci_ops(sec_entrypoint)
    }
}

/// The power state hooks chosen for this boot.
pub enum SunxiPsciOps<'s, 'a> {
    /// Cores and the board are powered on and off directly.
    Native(NativeOps<'s, 'a>),
    /// Power changes are requested from the power management coprocessor.
    Scpi(ScpiOps<'s, 'a>),
}

impl PowerStateOps for SunxiPsciOps<'_, '_> {
    fn power_domain_on(&self, mpidr: u64) -> Result<(), ErrorCode> {
        match self {
            Self::Native(ops) => ops.power_domain_on(mpidr),
            Self::Scpi(ops) => ops.power_domain_on(mpidr),
        }
    }

    fn power_domain_off(&self, target_state: &CompositePowerState) {
        match self {
            Self::Native(ops) => ops.power_domain_off(target_state),
            Self::Scpi(ops) => ops.power_domain_off(target_state),
        }
    }

    fn power_domain_on_finish(&self, previous_state: &CompositePowerState) {
        match self {
            Self::Native(ops) => ops.power_domain_on_finish(previous_state),
            Self::Scpi(ops) => ops.power_domain_on_finish(previous_state),
        }
    }

    fn power_domain_power_down_wfi(&self, target_state: &CompositePowerState) -> ! {
        match self {
            Self::Native(ops) => ops.power_domain_power_down_wfi(target_state),
            Self::Scpi(ops) => ops.power_domain_power_down_wfi(target_state),
        }
    }

    fn system_off(&self) -> ! {
        match self {
            Self::Native(ops) => ops.system_off(),
            Self::Scpi(ops) => ops.system_off(),
        }
    }

    fn system_reset(&self) -> ! {
        match self {
            Self::Native(ops) => ops.system_reset(),
            Self::Scpi(ops) => ops.system_reset(),
        }
    }

    fn validate_ns_entrypoint(&self, entrypoint: u64) -> Result<(), ErrorCode> {
        match self {
            Self::Native(ops) => ops.validate_ns_entrypoint(entrypoint),
            Self::Scpi(ops) => ops.validate_ns_entrypoint(entrypoint),
        }
    }
}

/// The non-secure entry point must be in DRAM.
fn validate_ns_entrypoint(entrypoint: u64) -> Result<(), ErrorCode> {
    if entrypoint < Sunxi::DRAM_BASE {
        Err(ErrorCode::InvalidAddress)
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::platform::SystemPowerRequest;
    use arm_sysregs::fake::SYSREGS;
    use bootfix_device_tree::fdt::{Fdt, NodeOffset};
    use std::cell::RefCell;
    use zerocopy::FromZeros;

    /// The MPIDR every test runs on, the third core.
    pub(crate) const CURRENT_MPIDR: u64 = 0x2;

    pub(crate) fn set_current_core() {
        SYSREGS.lock().unwrap().mpidr_el1 = MpidrEl1::from_bits_retain(CURRENT_MPIDR);
    }

    /// Records every driver call.
    #[derive(Default)]
    pub(crate) struct FakeDrivers {
        pub(crate) scpi_available: bool,
        pub(crate) scpi_status: Option<u32>,
        pub(crate) calls: RefCell<Vec<String>>,
    }

    impl FakeDrivers {
        pub(crate) fn drivers(&self) -> SunxiDrivers<'_> {
            SunxiDrivers {
                gic: self,
                power: self,
                scpi: self,
                delay: self,
            }
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        pub(crate) fn take_calls(&self) -> Vec<String> {
            self.calls.take()
        }
    }

    impl GicCpuInterface for FakeDrivers {
        fn cpuif_enable(&self) {
            self.record("cpuif_enable".to_owned());
        }

        fn cpuif_disable(&self) {
            self.record("cpuif_disable".to_owned());
        }

        fn pcpu_distif_init(&self) {
            self.record("pcpu_distif_init".to_owned());
        }

        fn distif_init(&self) {
            self.record("distif_init".to_owned());
        }
    }

    impl CpuPowerControl for FakeDrivers {
        fn cpu_on(&self, mpidr: u64) {
            self.record(format!("cpu_on({mpidr:#x})"));
        }

        fn cpu_off(&self, mpidr: u64) {
            self.record(format!("cpu_off({mpidr:#x})"));
        }

        fn power_down(&self) {
            self.record("power_down".to_owned());
        }

        fn disable_secondary_cpus(&self, primary: u64) {
            self.record(format!("disable_secondary_cpus({primary:#x})"));
        }
    }

    impl ScpiChannel for FakeDrivers {
        fn is_available(&self) -> bool {
            self.scpi_available
        }

        fn set_css_power_state(
            &self,
            mpidr: u64,
            cpu_state: u32,
            cluster_state: u32,
            system_state: u32,
        ) {
            self.record(format!(
                "set_css_power_state({mpidr:#x}, {cpu_state}, {cluster_state}, {system_state})"
            ));
        }

        fn sys_power_state(&self, request: SystemPowerRequest) -> Result<(), u32> {
            self.record(format!("sys_power_state({request:?})"));
            self.scpi_status.map_or(Ok(()), Err)
        }
    }

    impl Delay for FakeDrivers {
        fn delay_ms(&self, ms: u32) {
            self.record(format!("delay_ms({ms})"));
        }
    }

    /// Fake register blocks.
    pub(crate) struct FakeRegisters {
        pub(crate) cpucfg: CpuCfgRegisters,
        pub(crate) watchdog: WatchdogRegisters,
    }

    impl FakeRegisters {
        pub(crate) fn new() -> Self {
            Self {
                cpucfg: CpuCfgRegisters::new_zeroed(),
                watchdog: WatchdogRegisters::new_zeroed(),
            }
        }

        pub(crate) fn sunxi<'a>(&'a mut self, drivers: &'a FakeDrivers) -> Sunxi<'a> {
            Sunxi::new(
                UniqueMmioPointer::from(&mut self.cpucfg),
                UniqueMmioPointer::from(&mut self.watchdog),
                drivers.drivers(),
            )
        }
    }

    #[test]
    fn reset_vectors_are_always_written() {
        for scpi_available in [false, true] {
            let mut regs = FakeRegisters::new();
            let drivers = FakeDrivers {
                scpi_available,
                ..Default::default()
            };
            {
                let sunxi = regs.sunxi(&drivers);
                let ops = sunxi.setup_psci_ops(0x1_4000_0800);
                assert_eq!(matches!(ops, SunxiPsciOps::Scpi(_)), scpi_available);
            }
            for core in &regs.cpucfg.rvbar {
                assert_eq!(core.lo.0, 0x4000_0800);
                assert_eq!(core.hi.0, 0x1);
            }
        }
    }

    #[test]
    fn topology() {
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let position = |bits| sunxi.core_position(MpidrEl1::from_bits_retain(bits));

        assert_eq!(position(0x0), Some(0));
        assert_eq!(position(0x3), Some(3));
        assert_eq!(position(0x4), None);
        assert_eq!(position(0x100), None);
        assert_eq!(position(0x1_0000), None);
        assert_eq!(position(0x1_0000_0000), None);
        // The MT bit is not part of the core's identity.
        assert_eq!(position(0x100_0001), Some(1));
    }

    #[test]
    fn current_core() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        assert_eq!(regs.sunxi(&drivers).current_mpidr().bits(), CURRENT_MPIDR);
    }

    #[test]
    fn modify_empty_tree() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let mut buf = [0u8; 4096];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();

        sunxi.modify_dt(&mut fdt).unwrap();

        let view = Fdt::new(fdt.as_bytes()).unwrap();
        let names: Vec<&str> = view
            .find_node("/cpus")
            .unwrap()
            .unwrap()
            .children()
            .map(|cpu| cpu.unwrap().name().unwrap())
            .collect();
        assert_eq!(names, ["cpu@0", "cpu@1", "cpu@2", "cpu@3"]);
        assert!(view.find_node("/psci").is_some());
        let region = view
            .find_node("/reserved-memory/tf-a@40000000")
            .unwrap()
            .unwrap();
        assert!(region.property("no-map").unwrap().is_some());
    }

    #[test]
    fn modify_tree_with_cpus() {
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let mut buf = [0u8; 4096];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        let cpus = fdt.add_subnode(NodeOffset::ROOT, "cpus").unwrap();
        let cpu = fdt.add_subnode(cpus, "cpu@0").unwrap();
        fdt.setprop_string(cpu, "device_type", "cpu").unwrap();
        fdt.setprop_string(cpu, "enable-method", "spin-table").unwrap();

        sunxi.modify_dt(&mut fdt).unwrap();

        let cpus = fdt.path_offset("/cpus").unwrap();
        let cpu = fdt.path_offset("/cpus/cpu@0").unwrap();
        assert_eq!(fdt.getprop(cpu, "enable-method").unwrap(), Some(&b"psci\0"[..]));
        assert_eq!(fdt.first_subnode(cpus).unwrap(), Some(cpu));
        assert_eq!(fdt.next_subnode(cpu).unwrap(), None);
    }

    #[test]
    fn entrypoint_must_be_in_dram() {
        assert_eq!(
            validate_ns_entrypoint(0x3fff_ffff),
            Err(ErrorCode::InvalidAddress)
        );
        assert_eq!(validate_ns_entrypoint(0x4000_0000), Ok(()));
    }
}
