// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use arm_psci::ErrorCode;
use log::error;
use safe_mmio::field;

use super::Sunxi;
use crate::arch::{wfi, wfi_forever};
use crate::psci::{CompositePowerState, PowerStateOps};
use crate::topology::CpuTopology;

/// Reset the whole system, not just the cores, when the watchdog fires.
const WDOG_CFG_SYSTEM_RESET: u32 = 1;
const WDOG_MODE_ENABLE: u32 = 1 << 0;
const WDOG_MODE_INTERVAL_SHIFT: u32 = 4;
/// Shortest watchdog interval, 0.5 seconds.
const WDOG_INTERVAL_0_5S: u32 = 0;
/// Twice the watchdog interval.
const RESET_TIMEOUT_MS: u32 = 1000;

/// Power state hooks that drive the cores, the board and the watchdog directly.
pub struct NativeOps<'s, 'a> {
    sunxi: &'s Sunxi<'a>,
}

impl<'s, 'a> NativeOps<'s, 'a> {
    pub(super) fn new(sunxi: &'s Sunxi<'a>) -> Self {
        Self { sunxi }
    }
}

impl PowerStateOps for NativeOps<'_, '_> {
    fn power_domain_on(&self, mpidr: u64) -> Result<(), ErrorCode> {
        self.sunxi.drivers.power.cpu_on(mpidr);
        Ok(())
    }

    fn power_domain_off(&self, _target_state: &CompositePowerState) {
        self.sunxi.drivers.gic.cpuif_disable();
    }

    fn power_domain_on_finish(&self, _previous_state: &CompositePowerState) {
        self.sunxi.drivers.gic.pcpu_distif_init();
        self.sunxi.drivers.gic.cpuif_enable();
    }

    fn power_domain_power_down_wfi(&self, _target_state: &CompositePowerState) -> ! {
        self.sunxi.drivers.power.cpu_off(self.sunxi.current_mpidr().bits());
        wfi_forever()
    }

    fn system_off(&self) -> ! {
        let mpidr = self.sunxi.current_mpidr().bits();
        let drivers = &self.sunxi.drivers;

        drivers.gic.cpuif_disable();
        // May not return.
        drivers.power.power_down();

        drivers.power.disable_secondary_cpus(mpidr);
        drivers.power.cpu_off(mpidr);
        wfi();

        error!("PSCI: Cannot turn off system, halting");
        panic!("Cannot turn off system, halting");
    }

    fn system_reset(&self) -> ! {
        self.sunxi.drivers.gic.cpuif_disable();

        {
            let mut watchdog = self.sunxi.watchdog.lock();
            field!(watchdog, cfg).write(WDOG_CFG_SYSTEM_RESET);
            field!(watchdog, mode)
                .write((WDOG_INTERVAL_0_5S << WDOG_MODE_INTERVAL_SHIFT) | WDOG_MODE_ENABLE);
        }
        self.sunxi.drivers.delay.delay_ms(RESET_TIMEOUT_MS);

        error!("PSCI: System reset failed");
        panic!("System reset failed");
    }

    fn validate_ns_entrypoint(&self, entrypoint: u64) -> Result<(), ErrorCode> {
        super::validate_ns_entrypoint(entrypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sunxi::SunxiPsciOps;
    use crate::platform::sunxi::tests::{CURRENT_MPIDR, FakeDrivers, FakeRegisters, set_current_core};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn power_on_and_off() {
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);
        assert!(matches!(ops, SunxiPsciOps::Native(_)));

        assert_eq!(ops.power_domain_on(0x3), Ok(()));
        ops.power_domain_off(&CompositePowerState::OFF);
        ops.power_domain_on_finish(&CompositePowerState::OFF);
        assert_eq!(
            drivers.take_calls(),
            ["cpu_on(0x3)", "cpuif_disable", "pcpu_distif_init", "cpuif_enable"]
        );
    }

    #[test]
    fn system_reset_arms_the_watchdog() {
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        {
            let sunxi = regs.sunxi(&drivers);
            let ops = sunxi.setup_psci_ops(0x4000_0000);
            let result = catch_unwind(AssertUnwindSafe(|| ops.system_reset()));
            assert!(result.is_err());
        }
        assert_eq!(regs.watchdog.cfg.0, 1);
        assert_eq!(regs.watchdog.mode.0, 1);
        assert_eq!(regs.watchdog.ctrl.0, 0);
        assert_eq!(drivers.take_calls(), ["cpuif_disable", "delay_ms(1000)"]);
    }

    #[test]
    #[should_panic(expected = "Cannot turn off system, halting")]
    fn system_off_halts_if_still_running() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        sunxi.setup_psci_ops(0x4000_0000).system_off();
    }

    #[test]
    fn system_off_sequence() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);
        let result = catch_unwind(AssertUnwindSafe(|| ops.system_off()));
        assert!(result.is_err());
        assert_eq!(
            drivers.take_calls(),
            [
                "cpuif_disable".to_owned(),
                "power_down".to_owned(),
                format!("disable_secondary_cpus({CURRENT_MPIDR:#x})"),
                format!("cpu_off({CURRENT_MPIDR:#x})"),
            ]
        );
    }

    #[test]
    fn entrypoint() {
        let mut regs = FakeRegisters::new();
        let drivers = FakeDrivers::default();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);
        assert_eq!(
            ops.validate_ns_entrypoint(0x1000),
            Err(ErrorCode::InvalidAddress)
        );
        assert_eq!(ops.validate_ns_entrypoint(0x8008_0000), Ok(()));
    }
}
