// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use arm_psci::ErrorCode;
use log::error;

use super::Sunxi;
use crate::arch::wfi_forever;
use crate::platform::SystemPowerRequest;
use crate::psci::{CompositePowerState, LocalState, PowerLevel, PowerStateOps};
use crate::topology::CpuTopology;

const SCPI_POWER_ON: u32 = 0;
const SCPI_POWER_RETENTION: u32 = 1;
const SCPI_POWER_OFF: u32 = 3;

/// Maps a local power state to the SCPI power state of the same meaning.
fn scpi_state(state: LocalState) -> u32 {
    match state {
        LocalState::Run => SCPI_POWER_ON,
        LocalState::Retention => SCPI_POWER_RETENTION,
        LocalState::Off => SCPI_POWER_OFF,
    }
}

/// Power state hooks that ask the power management coprocessor to do the work.
pub struct ScpiOps<'s, 'a> {
    sunxi: &'s Sunxi<'a>,
}

impl<'s, 'a> ScpiOps<'s, 'a> {
    pub(super) fn new(sunxi: &'s Sunxi<'a>) -> Self {
        Self { sunxi }
    }

    fn request_system_state(&self, request: SystemPowerRequest) -> ! {
        self.sunxi.drivers.gic.cpuif_disable();

        if let Err(status) = self.sunxi.drivers.scpi.sys_power_state(request) {
            error!("PSCI: SCPI {request:?} request failed: {status}");
        }
        wfi_forever()
    }
}

impl PowerStateOps for ScpiOps<'_, '_> {
    fn power_domain_on(&self, mpidr: u64) -> Result<(), ErrorCode> {
        self.sunxi
            .drivers
            .scpi
            .set_css_power_state(mpidr, SCPI_POWER_ON, SCPI_POWER_ON, SCPI_POWER_ON);
        Ok(())
    }

    fn power_domain_off(&self, target_state: &CompositePowerState) {
        if target_state.is_off(PowerLevel::Cpu) {
            self.sunxi.drivers.gic.cpuif_disable();
        }

        self.sunxi.drivers.scpi.set_css_power_state(
            self.sunxi.current_mpidr().bits(),
            scpi_state(target_state.level(PowerLevel::Cpu)),
            scpi_state(target_state.level(PowerLevel::Cluster)),
            scpi_state(target_state.level(PowerLevel::System)),
        );
    }

    fn power_domain_on_finish(&self, previous_state: &CompositePowerState) {
        let gic = self.sunxi.drivers.gic;
        if previous_state.is_off(PowerLevel::System) {
            gic.distif_init();
        }
        if previous_state.is_off(PowerLevel::Cpu) {
            gic.pcpu_distif_init();
            gic.cpuif_enable();
        }
    }

    fn power_domain_power_down_wfi(&self, _target_state: &CompositePowerState) -> ! {
        // The coprocessor removes power once the core is in WFI.
        wfi_forever()
    }

    fn system_off(&self) -> ! {
        self.request_system_state(SystemPowerRequest::Shutdown)
    }

    fn system_reset(&self) -> ! {
        self.request_system_state(SystemPowerRequest::Reboot)
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

    fn scpi_drivers() -> FakeDrivers {
        FakeDrivers {
            scpi_available: true,
            ..Default::default()
        }
    }

    #[test]
    fn state_mapping() {
        assert_eq!(scpi_state(LocalState::Run), 0);
        assert_eq!(scpi_state(LocalState::Retention), 1);
        assert_eq!(scpi_state(LocalState::Off), 3);
    }

    #[test]
    fn power_on() {
        let mut regs = FakeRegisters::new();
        let drivers = scpi_drivers();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);
        assert!(matches!(ops, SunxiPsciOps::Scpi(_)));

        assert_eq!(ops.power_domain_on(0x1), Ok(()));
        assert_eq!(drivers.take_calls(), ["set_css_power_state(0x1, 0, 0, 0)"]);
    }

    #[test]
    fn power_off_cpu_only() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = scpi_drivers();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);

        let target = CompositePowerState::new(LocalState::Off, LocalState::Retention, LocalState::Run);
        ops.power_domain_off(&target);
        assert_eq!(
            drivers.take_calls(),
            [
                "cpuif_disable".to_owned(),
                format!("set_css_power_state({CURRENT_MPIDR:#x}, 3, 1, 0)"),
            ]
        );
    }

    #[test]
    fn retention_keeps_the_cpu_interface() {
        set_current_core();
        let mut regs = FakeRegisters::new();
        let drivers = scpi_drivers();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);

        let target =
            CompositePowerState::new(LocalState::Retention, LocalState::Run, LocalState::Run);
        ops.power_domain_off(&target);
        assert_eq!(
            drivers.take_calls(),
            [format!("set_css_power_state({CURRENT_MPIDR:#x}, 1, 0, 0)")]
        );
    }

    #[test]
    fn on_finish() {
        let mut regs = FakeRegisters::new();
        let drivers = scpi_drivers();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);

        ops.power_domain_on_finish(&CompositePowerState::OFF);
        assert_eq!(
            drivers.take_calls(),
            ["distif_init", "pcpu_distif_init", "cpuif_enable"]
        );

        let cpu_only = CompositePowerState::new(LocalState::Off, LocalState::Off, LocalState::Run);
        ops.power_domain_on_finish(&cpu_only);
        assert_eq!(drivers.take_calls(), ["pcpu_distif_init", "cpuif_enable"]);

        ops.power_domain_on_finish(&CompositePowerState::RUN);
        assert!(drivers.take_calls().is_empty());
    }

    #[test]
    fn entrypoint() {
        let mut regs = FakeRegisters::new();
        let drivers = scpi_drivers();
        let sunxi = regs.sunxi(&drivers);
        let ops = sunxi.setup_psci_ops(0x4000_0000);
        assert_eq!(
            ops.validate_ns_entrypoint(0x3fff_f000),
            Err(ErrorCode::InvalidAddress)
        );
        assert_eq!(ops.validate_ns_entrypoint(0x4000_0000), Ok(()));
    }
}
