// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use arm_sysregs::MpidrEl1;
use arrayvec::ArrayString;
use bootfix_device_tree::fdt::NodeOffset;
use bootfix_device_tree::fdt_rw::FdtMut;
use log::error;

use super::{find_node, node_name};
use crate::Error;
use crate::topology::{CpuTopology, cpu_reg, enumerate_cores};

/// Longest node name is `cpu@` followed by the 10 hex digits of `MPID_MASK`.
type CpuNodeName = ArrayString<16>;

/// Creates a `/cpus` node with one `cpu` child for every core within the
/// given bounds that `topology` knows about.
///
/// Clusters map to affinity level 2, cores to level 1 and threads to level 0.
/// Returns the offset of the `/cpus` node.
///
/// # Errors
///
/// Returns [`Error::AlreadyExists`] if there already is a `/cpus` node. Other
/// errors are logged and leave the nodes added so far in place.
pub fn add_cpus_node<T: CpuTopology + ?Sized>(
    fdt: &mut FdtMut<'_>,
    topology: &T,
    max_threads: u32,
    max_cores_per_cluster: u32,
    max_clusters: u32,
) -> Result<NodeOffset, Error> {
    if find_node(fdt, "/cpus")?.is_some() {
        return Err(Error::AlreadyExists);
    }

    let cpus = fdt
        .add_subnode(NodeOffset::ROOT, "cpus")
        .inspect_err(|e| error!("FDT: add subnode \"cpus\" node to parent node failed: {e}"))?;
    set_u32(fdt, cpus, "#address-cells", 2)?;
    set_u32(fdt, cpus, "#size-cells", 0)?;

    // CPU nodes are prepended, so the descending enumeration leaves them in
    // ascending order.
    for mpidr in enumerate_cores(topology, max_threads, max_cores_per_cluster, max_clusters) {
        add_cpu(fdt, cpus, mpidr)
            .inspect_err(|e| error!("FDT: error adding CPU {:#010x}: {e}", mpidr.bits()))?;
    }

    Ok(fdt.path_offset("/cpus")?)
}

fn add_cpu(fdt: &mut FdtMut<'_>, cpus: NodeOffset, mpidr: MpidrEl1) -> Result<(), Error> {
    let reg = cpu_reg(mpidr);
    let name: CpuNodeName = node_name(format_args!("cpu@{reg:x}"))?;

    let cpu = fdt
        .add_subnode(cpus, &name)
        .inspect_err(|e| error!("FDT: add subnode \"{name}\" failed: {e}"))?;
    set_string(fdt, cpu, "compatible", "arm,armv8")?;
    fdt.setprop_u64(cpu, "reg", reg)
        .inspect_err(|e| log_write_failure("reg", cpu, e))?;
    set_string(fdt, cpu, "device_type", "cpu")?;
    set_string(fdt, cpu, "enable-method", "psci")?;
    Ok(())
}

fn set_u32(fdt: &mut FdtMut<'_>, node: NodeOffset, name: &str, value: u32) -> Result<(), Error> {
    fdt.setprop_u32(node, name, value)
        .inspect_err(|e| log_write_failure(name, node, e))?;
    Ok(())
}

fn set_string(fdt: &mut FdtMut<'_>, node: NodeOffset, name: &str, value: &str) -> Result<(), Error> {
    fdt.setprop_string(node, name, value)
        .inspect_err(|e| log_write_failure(name, node, e))?;
    Ok(())
}

fn log_write_failure(property: &str, node: NodeOffset, e: &bootfix_device_tree::Error) {
    error!("FDT: write to \"{property}\" property of node at offset {node} failed: {e}");
}
