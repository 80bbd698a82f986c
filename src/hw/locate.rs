// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Local hierarchy locator
//!
//! Resolves a process's binding set against the hardware snapshot into a
//! grouping color: the logical index of the matched processor object, or a
//! combined sub-kind + index encoding for devices. Every failure here is
//! `NoMatchingObject`; callers absorb it into coarse grouping and never
//! abort a collective operation over it.

use log::debug;

use crate::error::{WeftError, WeftResult};
use crate::hw::{CpuSet, HwTopology, ObjectType, OsDevKind};

/// Color for a selected device: sub-kind in the upper half, logical index
/// in the lower half, so two device kinds at the same logical index never
/// alias.
pub fn device_color_value(kind: OsDevKind, logical_index: u32) -> i32 {
    ((kind.code() as i32) << 16) | logical_index as i32
}

/// Color of the nearest hierarchy object of `target` type covering the
/// binding set.
pub fn processor_color(
    hw: &HwTopology,
    bindset: &CpuSet,
    target: ObjectType,
) -> WeftResult<i32> {
    let covering = hw.covering_object(bindset).ok_or_else(|| {
        WeftError::NoMatchingObject("binding set has no covering object".to_string())
    })?;
    if covering.object_type == target {
        return Ok(covering.logical_index as i32);
    }
    hw.ancestor_by_type(covering.id, target)
        .map(|obj| obj.logical_index as i32)
        .ok_or_else(|| {
            WeftError::NoMatchingObject(format!(
                "no {:?} ancestor above the covering object",
                target
            ))
        })
}

/// Color for an explicitly named PCI device: the logical index of its
/// nearest non-I/O ancestor, provided the process's covering object lies
/// under that ancestor.
pub fn pci_device_color(hw: &HwTopology, bindset: &CpuSet, busid: &str) -> WeftResult<i32> {
    let covering = hw.covering_object(bindset).ok_or_else(|| {
        WeftError::NoMatchingObject("binding set has no covering object".to_string())
    })?;
    let device = hw
        .pci_device_by_id(busid)
        .ok_or_else(|| WeftError::NoMatchingObject(format!("no PCI device {}", busid)))?;
    let ancestor = hw.non_io_ancestor(device.id).ok_or_else(|| {
        WeftError::NoMatchingObject(format!("PCI device {} has no non-I/O ancestor", busid))
    })?;
    if hw.is_in_subtree(ancestor.id, covering.id) {
        Ok(ancestor.logical_index as i32)
    } else {
        Err(WeftError::NoMatchingObject(format!(
            "PCI device {} is not local to the binding set",
            busid
        )))
    }
}

/// Color for an OS device of `kind`.
///
/// With an explicit identifier the device is resolved directly and colored
/// by its nearest non-I/O ancestor, like a PCI device. Without one, all
/// devices of the sub-kind are scanned and the first whose locality set is
/// covered inside the process's covering subtree is selected.
pub fn os_device_color(
    hw: &HwTopology,
    bindset: &CpuSet,
    kind: OsDevKind,
    device_id: Option<&str>,
) -> WeftResult<i32> {
    let covering = hw.covering_object(bindset).ok_or_else(|| {
        WeftError::NoMatchingObject("binding set has no covering object".to_string())
    })?;

    if let Some(id) = device_id {
        let device = hw.os_device_by_id(kind, id).ok_or_else(|| {
            WeftError::NoMatchingObject(format!("no {:?} device {}", kind, id))
        })?;
        let ancestor = hw.non_io_ancestor(device.id).ok_or_else(|| {
            WeftError::NoMatchingObject(format!("device {} has no non-I/O ancestor", id))
        })?;
        return if hw.is_in_subtree(ancestor.id, covering.id) {
            Ok(ancestor.logical_index as i32)
        } else {
            Err(WeftError::NoMatchingObject(format!(
                "device {} is not local to the binding set",
                id
            )))
        };
    }

    for device in hw.os_devices(kind) {
        let device_covering = match hw.covering_object(&device.cpuset) {
            Some(obj) => obj,
            None => continue,
        };
        if hw.is_in_subtree(covering.id, device_covering.id) {
            debug!(
                "selected {:?} device index {} for the binding set",
                kind, device.logical_index
            );
            return Ok(device_color_value(kind, device.logical_index));
        }
    }
    Err(WeftError::NoMatchingObject(format!(
        "no {:?} device is covered by the binding set",
        kind
    )))
}
