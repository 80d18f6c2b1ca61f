// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CPU topology: which cores a platform actually has, and how to list them.

use arm_sysregs::MpidrEl1;

/// Mask of the bits of an MPIDR value that identify a core.
pub const MPID_MASK: u64 = 0xff_00ff_ffff;

/// Number of distinct values of a single affinity field.
const AFFINITY_VALUES: u32 = 1 << MpidrEl1::AFFINITY_BITS;

/// Returns the value that identifies the core `mpidr` in the device tree: the
/// affinity fields without the MT bit. This is both the `reg` value and the
/// unit address of a `cpu` node.
#[must_use]
pub const fn cpu_reg(mpidr: MpidrEl1) -> u64 {
    mpidr.bits() & MPID_MASK & !MpidrEl1::MT.bits()
}

/// Knowledge of which cores exist on a platform.
pub trait CpuTopology {
    /// Returns the linear index of the core identified by `mpidr`, or `None`
    /// if there is no such core.
    fn core_position(&self, mpidr: MpidrEl1) -> Option<usize>;

    /// Returns the MPIDR of the calling core.
    fn current_mpidr(&self) -> MpidrEl1;
}

/// Returns the MPIDRs of all cores accepted by `topology` within the given
/// bounds.
///
/// Clusters map to affinity level 2, cores to level 1 and threads to level 0.
/// The MT bit of every result is copied from the calling core. Values are
/// produced in descending order at every level, so that prepending a node per
/// core leaves them in ascending order. Bounds above 256 are clamped.
pub fn enumerate_cores<'a, T: CpuTopology + ?Sized>(
    topology: &'a T,
    max_threads: u32,
    max_cores_per_cluster: u32,
    max_clusters: u32,
) -> impl Iterator<Item = MpidrEl1> + 'a {
    let mt = topology.current_mpidr() & MpidrEl1::MT;
    descending(max_clusters)
        .flat_map(move |cluster| {
            descending(max_cores_per_cluster).flat_map(move |core| {
                descending(max_threads).map(move |thread| {
                    let affinities = cluster << MpidrEl1::AFF2_SHIFT
                        | core << MpidrEl1::AFF1_SHIFT
                        | thread << MpidrEl1::AFF0_SHIFT;
                    MpidrEl1::from_bits_retain(affinities) | mt
                })
            })
        })
        .filter(|&mpidr| topology.core_position(mpidr).is_some())
}

fn descending(bound: u32) -> impl Iterator<Item = u64> {
    (0..bound.min(AFFINITY_VALUES)).rev().map(u64::from)
}
