// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bootfix_device_tree::fdt::NodeOffset;
use bootfix_device_tree::fdt_rw::FdtMut;
use log::{debug, warn};

use super::find_node;
use crate::Error;
use crate::psci::ExecutionState;

const PSCI_COMPATIBLE: [&str; 3] = ["arm,psci-1.0", "arm,psci-0.2", "arm,psci"];

/// Adds a `/psci` node describing the PSCI implementation of this firmware.
///
/// Does nothing, apart from logging a warning, if the node already exists.
pub fn add_psci_node(fdt: &mut FdtMut<'_>) -> Result<(), Error> {
    add_psci_node_for(fdt, ExecutionState::CURRENT)
}

/// Like [`add_psci_node`], advertising the function IDs of the given
/// execution state.
pub fn add_psci_node_for(fdt: &mut FdtMut<'_>, state: ExecutionState) -> Result<(), Error> {
    if find_node(fdt, "/psci")?.is_some() {
        warn!("PSCI Device Tree node already exists!");
        return Ok(());
    }

    let psci = fdt.add_subnode(NodeOffset::ROOT, "psci")?;
    for compatible in PSCI_COMPATIBLE {
        fdt.appendprop_string(psci, "compatible", compatible)?;
    }
    fdt.setprop_string(psci, "method", "smc")?;
    fdt.setprop_u32(psci, "cpu_suspend", state.cpu_suspend())?;
    fdt.setprop_u32(psci, "cpu_off", state.cpu_off())?;
    fdt.setprop_u32(psci, "cpu_on", state.cpu_on())?;
    Ok(())
}

/// Sets `enable-method = "psci"` on every `cpu` node under `/cpus` that does
/// not have it yet.
///
/// # Errors
///
/// Returns [`Error::NotFound`] without touching the blob if there is no
/// `/cpus` node.
pub fn add_psci_cpu_enable_methods(fdt: &mut FdtMut<'_>) -> Result<(), Error> {
    patch_enable_methods(fdt).map(|_| ())
}

/// Returns the number of nodes patched.
///
/// Patching a node moves everything after it, so the scan starts over from
/// the first child after each edit.
fn patch_enable_methods(fdt: &mut FdtMut<'_>) -> Result<usize, Error> {
    let mut patched = 0;
    while let Some(cpu) = next_cpu_without_psci(fdt)? {
        fdt.setprop_string(cpu, "enable-method", "psci")?;
        debug!("Enabled PSCI for CPU node at offset {cpu}");
        patched += 1;
    }
    Ok(patched)
}

fn next_cpu_without_psci(fdt: &FdtMut<'_>) -> Result<Option<NodeOffset>, Error> {
    let Some(cpus) = find_node(fdt, "/cpus")? else {
        return Err(Error::NotFound);
    };
    let mut child = fdt.first_subnode(cpus)?;
    while let Some(node) = child {
        let is_cpu = fdt.getprop(node, "device_type")? == Some(b"cpu\0".as_slice());
        let uses_psci = fdt.getprop(node, "enable-method")? == Some(b"psci\0".as_slice());
        if is_cpu && !uses_psci {
            return Ok(Some(node));
        }
        child = fdt.next_subnode(node)?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootfix_device_tree::fdt::Fdt;
    use log::{LevelFilter, Log, Metadata, Record};

    /// Formats and drops every record.
    struct DiscardLogger;

    impl Log for DiscardLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let _ = record.args().to_string();
        }

        fn flush(&self) {}
    }

    static LOGGER: DiscardLogger = DiscardLogger;

    fn enable_debug_logs() {
        // Fails harmlessly if another test got there first.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Debug);
    }

    /// Absolute offset of the node at `node` within the blob.
    fn absolute(fdt: &FdtMut<'_>, node: NodeOffset) -> usize {
        let off_dt_struct = u32::from_be_bytes(fdt.as_bytes()[8..12].try_into().unwrap());
        off_dt_struct as usize + node.get()
    }

    /// The bytes of the `/cpus` child at `path`, up to its next sibling.
    fn node_bytes(fdt: &FdtMut<'_>, path: &str) -> Vec<u8> {
        let node = fdt.path_offset(path).unwrap();
        let next = fdt.next_subnode(node).unwrap().unwrap();
        fdt.as_bytes()[absolute(fdt, node)..absolute(fdt, next)].to_vec()
    }

    fn cpu_node(fdt: &mut FdtMut<'_>, name: &str, device_type: &[u8], method: Option<&str>) {
        let cpus = fdt.path_offset("/cpus").unwrap();
        let node = fdt.add_subnode(cpus, name).unwrap();
        fdt.setprop(node, "device_type", device_type).unwrap();
        if let Some(method) = method {
            fdt.setprop_string(node, "enable-method", method).unwrap();
        }
    }

    #[test]
    fn psci_node_contents() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        add_psci_node_for(&mut fdt, ExecutionState::AArch32).unwrap();

        let view = Fdt::new(fdt.as_bytes()).unwrap();
        let psci = view.find_node("/psci").unwrap().unwrap();
        let compatible: Vec<&str> = psci
            .property("compatible")
            .unwrap()
            .unwrap()
            .as_str_list()
            .collect();
        assert_eq!(compatible, PSCI_COMPATIBLE);
        let prop = |name| psci.property(name).unwrap().unwrap();
        assert_eq!(prop("method").as_str().unwrap(), "smc");
        assert_eq!(prop("cpu_suspend").as_u32().unwrap(), 0x8400_0001);
        assert_eq!(prop("cpu_off").as_u32().unwrap(), 0x8400_0002);
        assert_eq!(prop("cpu_on").as_u32().unwrap(), 0x8400_0003);
    }

    #[test]
    fn existing_psci_node_is_kept() {
        let mut buf = [0u8; 1024];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        let psci = fdt.add_subnode(NodeOffset::ROOT, "psci").unwrap();
        fdt.setprop_string(psci, "method", "hvc").unwrap();
        let before = fdt.as_bytes().to_vec();

        add_psci_node(&mut fdt).unwrap();
        assert_eq!(fdt.as_bytes(), before);
    }

    #[test]
    fn restarts_once_per_candidate() {
        let mut buf = [0u8; 2048];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        fdt.add_subnode(NodeOffset::ROOT, "cpus").unwrap();
        cpu_node(&mut fdt, "cpu@3", b"cpu\0", Some("spin-table"));
        cpu_node(&mut fdt, "cpu@2", b"cpu\0", Some("psci"));
        cpu_node(&mut fdt, "l2-cache", b"cache\0", None);
        cpu_node(&mut fdt, "cpu@1", b"cpu\0", None);
        cpu_node(&mut fdt, "cpu@0", b"cpus\0", None);
        let already_psci = node_bytes(&fdt, "/cpus/cpu@2");

        assert_eq!(patch_enable_methods(&mut fdt).unwrap(), 2);
        // Moved by the edit to cpu@1, but otherwise untouched.
        assert_eq!(node_bytes(&fdt, "/cpus/cpu@2"), already_psci);
        assert_eq!(patch_enable_methods(&mut fdt).unwrap(), 0);

        let method = |fdt: &FdtMut<'_>, path| {
            let node = fdt.path_offset(path).unwrap();
            fdt.getprop(node, "enable-method").unwrap().map(<[u8]>::to_vec)
        };
        assert_eq!(method(&fdt, "/cpus/cpu@1"), Some(b"psci\0".to_vec()));
        assert_eq!(method(&fdt, "/cpus/cpu@3"), Some(b"psci\0".to_vec()));
        assert_eq!(method(&fdt, "/cpus/cpu@0"), None);
        assert_eq!(method(&fdt, "/cpus/l2-cache"), None);
    }

    #[test]
    fn undecodable_cpu_name_with_debug_logs() {
        enable_debug_logs();
        let mut buf = [0u8; 1024];
        let name = {
            let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
            fdt.add_subnode(NodeOffset::ROOT, "cpus").unwrap();
            cpu_node(&mut fdt, "cpu@0", b"cpu\0", None);
            let cpu = fdt.path_offset("/cpus/cpu@0").unwrap();
            // The name follows the FDT_BEGIN_NODE tag.
            absolute(&fdt, cpu) + 4
        };
        buf[name] = 0xff;

        let mut fdt = FdtMut::new(&mut buf).unwrap();
        add_psci_cpu_enable_methods(&mut fdt).unwrap();

        let cpus = fdt.path_offset("/cpus").unwrap();
        let cpu = fdt.first_subnode(cpus).unwrap().unwrap();
        assert_eq!(fdt.getprop(cpu, "enable-method").unwrap(), Some(&b"psci\0"[..]));
    }

    #[test]
    fn missing_cpus_node() {
        let mut buf = [0u8; 256];
        let mut fdt = FdtMut::create_empty_tree(&mut buf).unwrap();
        let before = fdt.as_bytes().to_vec();
        assert_eq!(add_psci_cpu_enable_methods(&mut fdt), Err(Error::NotFound));
        assert_eq!(fdt.as_bytes(), before);
    }
}
