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

//! Group agreement protocol
//!
//! Every rank derives a [`GroupingHint`] from its local view and the group
//! reduces the hints into one [`AgreedDecision`] that is identical on every
//! rank. Enum fields reduce by bitwise AND over an all-bits-set "unset"
//! sentinel, so a single rank requesting nothing collapses the result
//! toward "unset" instead of an arbitrary subset's value; a group-wide
//! minimum of the per-rank "my hint equals the reduced hint" flag then
//! decides between proceeding and falling back. Disagreement is a data
//! outcome, never an error: aborting a distributed group over a mismatched
//! optional hint would be worse than reverting to coarser grouping.

use log::debug;

use crate::error::WeftResult;
use crate::hw::{CpuSet, HwTopology, ObjectType, OsDevKind, OBJECT_TYPE_UNSET, OSDEV_KIND_UNSET};
use crate::net::{Communicator, ReduceOp};

/// Width of the device identifier field in the reduction record
pub const DEVICE_ID_BYTES: usize = 64;

const UNSET_BYTE: u8 = 0xff;

/// Per-rank grouping request, encoded as a fixed-width reducible record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingHint {
    object_type: u32,
    os_dev_kind: u32,
    device_id: [u8; DEVICE_ID_BYTES],
}

impl GroupingHint {
    /// The empty hint: requests nothing
    pub fn unset() -> GroupingHint {
        GroupingHint {
            object_type: OBJECT_TYPE_UNSET,
            os_dev_kind: OSDEV_KIND_UNSET,
            device_id: [UNSET_BYTE; DEVICE_ID_BYTES],
        }
    }

    pub fn is_unset(&self) -> bool {
        self.object_type == OBJECT_TYPE_UNSET
    }

    /// Parse an attribute request value.
    ///
    /// Accepted forms: a processor object name (`"numa"`, `"l3cache"`, ...),
    /// `pci:<busid>`, `gpu[:<id>]`, or `ib[:<id>]`. Anything unrecognized
    /// yields the unset hint, which downgrades the whole group to coarse
    /// grouping through the agreement protocol.
    pub fn parse(value: &str) -> GroupingHint {
        if let Ok(object_type) = value.parse::<ObjectType>() {
            return GroupingHint::processor(object_type);
        }
        if let Some(busid) = value.strip_prefix("pci:") {
            return GroupingHint::device(ObjectType::PciDevice, None, Some(busid));
        }
        if let Some(rest) = value.strip_prefix("gpu") {
            return GroupingHint::os_device(OsDevKind::Coproc, rest);
        }
        if let Some(rest) = value.strip_prefix("ib") {
            return GroupingHint::os_device(OsDevKind::OpenFabrics, rest);
        }
        debug!("unrecognized attribute request {:?}", value);
        GroupingHint::unset()
    }

    fn processor(object_type: ObjectType) -> GroupingHint {
        GroupingHint {
            object_type: object_type.code(),
            ..GroupingHint::unset()
        }
    }

    fn os_device(kind: OsDevKind, rest: &str) -> GroupingHint {
        if rest.is_empty() {
            GroupingHint::device(ObjectType::OsDevice, Some(kind), None)
        } else if let Some(id) = rest.strip_prefix(':') {
            GroupingHint::device(ObjectType::OsDevice, Some(kind), Some(id))
        } else {
            GroupingHint::unset()
        }
    }

    fn device(object_type: ObjectType, kind: Option<OsDevKind>, id: Option<&str>) -> GroupingHint {
        let mut hint = GroupingHint {
            object_type: object_type.code(),
            os_dev_kind: kind.map_or(OSDEV_KIND_UNSET, OsDevKind::code),
            device_id: [UNSET_BYTE; DEVICE_ID_BYTES],
        };
        if let Some(id) = id {
            let bytes = id.as_bytes();
            let n = bytes.len().min(DEVICE_ID_BYTES);
            hint.device_id[..n].copy_from_slice(&bytes[..n]);
        }
        hint
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_code(self.object_type)
    }

    pub fn os_dev_kind(&self) -> Option<OsDevKind> {
        OsDevKind::from_code(self.os_dev_kind)
    }

    pub fn device_id(&self) -> Option<String> {
        decode_device_id(&self.device_id)
    }

    /// Check the hint against the local hardware view, withdrawing it when
    /// it cannot be satisfied here.
    ///
    /// A missing snapshot, an uncoverable binding set, or a device-scan
    /// request for a sub-kind with no local devices all degrade to the
    /// unset hint, so the failure surfaces as a group-wide fallback in the
    /// agreement step instead of an unbalanced local error.
    pub fn validated(self, hw: Option<&HwTopology>, bindset: Option<&CpuSet>) -> GroupingHint {
        if self.is_unset() {
            return self;
        }
        let (hw, bindset) = match (hw, bindset) {
            (Some(hw), Some(bindset)) => (hw, bindset),
            _ => {
                debug!("hardware snapshot unavailable, withdrawing grouping hint");
                return GroupingHint::unset();
            }
        };
        if hw.covering_object(bindset).is_none() {
            debug!("binding set has no covering object, withdrawing grouping hint");
            return GroupingHint::unset();
        }
        if self.object_type == ObjectType::OsDevice.code() && self.device_id().is_none() {
            if let Some(kind) = self.os_dev_kind() {
                if hw.os_devices(kind).is_empty() {
                    debug!("no local {:?} device, withdrawing grouping hint", kind);
                    return GroupingHint::unset();
                }
            }
        }
        self
    }
}

fn decode_device_id(bytes: &[u8; DEVICE_ID_BYTES]) -> Option<String> {
    let end = bytes
        .iter()
        .position(|&b| b == UNSET_BYTE)
        .unwrap_or(DEVICE_ID_BYTES);
    if end == 0 {
        return None;
    }
    String::from_utf8(bytes[..end].to_vec()).ok()
}

/// The single group-wide outcome of the agreement protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreedDecision {
    /// Revert to coarse node-level grouping
    Fallback,
    /// Apply the agreed locality request on every rank
    Proceed {
        object_type: ObjectType,
        os_dev_kind: Option<OsDevKind>,
        device_id: Option<String>,
    },
}

/// Reconcile the hints of every rank in the group into one decision.
///
/// Collective over `comm`; the result is a deterministic function of the
/// multiset of hints, independent of arrival order, because every reduction
/// used is commutative and associative.
pub fn agree(comm: &dyn Communicator, hint: &GroupingHint) -> WeftResult<AgreedDecision> {
    let local_codes = [hint.object_type, hint.os_dev_kind];
    let mut global_codes = [0u32; 2];
    comm.allreduce_u32(&local_codes, &mut global_codes, ReduceOp::Band)?;

    let mut global_id = [0u8; DEVICE_ID_BYTES];
    comm.allreduce_bytes(&hint.device_id, &mut global_id, ReduceOp::Band)?;

    let equal = (local_codes == global_codes && hint.device_id == global_id) as i32;
    let all_equal = comm.allreduce_i32(equal, ReduceOp::Min)?;
    if all_equal == 0 {
        debug!("grouping hints differ across ranks, falling back to node grouping");
        return Ok(AgreedDecision::Fallback);
    }

    let object_type = match ObjectType::from_code(global_codes[0]) {
        Some(object_type) => object_type,
        // unset or unrecognized after reduction
        None => return Ok(AgreedDecision::Fallback),
    };
    Ok(AgreedDecision::Proceed {
        object_type,
        os_dev_kind: OsDevKind::from_code(global_codes[1]),
        device_id: decode_device_id(&global_id),
    })
}
