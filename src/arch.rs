// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Architecture-specific code.

#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Data Synchronization Barrier.
pub fn dsb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: Data Synchronization Barrier is always safe.
    unsafe {
        asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// Wait For Interrupt.
pub fn wfi() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: `wfi` only suspends execution until the next interrupt or event.
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::hint::spin_loop();
}

/// Waits for interrupts forever, for a core that is about to be powered down
/// by an external agent.
pub fn wfi_forever() -> ! {
    loop {
        dsb();
        wfi();
    }
}
