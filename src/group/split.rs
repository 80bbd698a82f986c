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

//! Two-phase topology-aware group splitter
//!
//! Phase 1 separates out excluded members and groups the rest by coarse
//! node identifier; phase 2 refines each member's color from the locator
//! when the agreement protocol decided to proceed. Intermediate groups are
//! released as their handles are dropped.

use std::sync::Arc;

use log::debug;

use crate::ctx::WeftContext;
use crate::error::{WeftError, WeftResult};
use crate::group::agreement::{agree, AgreedDecision, GroupingHint};
use crate::group::SplitCategory;
use crate::hw::{locate, ObjectType, OsDevKind};
use crate::net::Communicator;

/// Split the calling process group by locality.
///
/// Collective: every rank of the context's group must call this, whatever
/// its `category` or `hint`. Returns the caller's new group, or `None` for
/// excluded and unmatched members. Local resolution failures never abort
/// the collective; they degrade the member (or the whole group, through the
/// agreement protocol) to coarse node grouping.
///
/// # Arguments
/// * `category` - Participate in the split or receive no group
/// * `key` - Tie-break rank ordering within each new group
/// * `hint` - Optional attribute request, e.g. `"numa"`, `"pci:<busid>"`,
///   `"gpu[:<id>]"`, `"ib[:<id>]"`
pub fn split_group(
    ctx: &WeftContext,
    category: SplitCategory,
    key: i32,
    hint: Option<&str>,
) -> WeftResult<Option<Arc<dyn Communicator>>> {
    let comm = ctx
        .get_communicator()
        .ok_or_else(|| WeftError::Invalid("split_group requires a communicator".to_string()))?;

    // phase 1a: split out the excluded members
    let color = match category {
        SplitCategory::Exclude => None,
        SplitCategory::Participate => Some(0),
    };
    let base = match comm.split(color, key)? {
        Some(group) => group,
        None => return Ok(None),
    };

    // the agreement runs over every participating rank, before any
    // node-scoped split, so the decision is fabric-wide
    let parsed = match hint {
        Some(value) => GroupingHint::parse(value),
        None => GroupingHint::unset(),
    };
    let hw = ctx.get_hw_topology();
    let local_hint = parsed.validated(hw.as_deref(), ctx.get_bindset());
    let decision = agree(base.as_ref(), &local_hint)?;

    // phase 1b: coarse node grouping
    let node_group = base
        .split(Some(base.get_node_id()), key)?
        .ok_or_else(|| WeftError::Communication("node-level split returned no group".to_string()))?;
    drop(base);

    let fine = match &decision {
        AgreedDecision::Fallback => {
            debug!("split falls back to coarse node grouping");
            return Ok(Some(node_group));
        }
        AgreedDecision::Proceed {
            object_type,
            os_dev_kind,
            device_id,
        } => fine_color(
            ctx,
            node_group.get_node_id(),
            *object_type,
            *os_dev_kind,
            device_id.as_deref(),
        ),
    };

    let result = node_group.split(fine, key)?;
    drop(node_group);
    Ok(result)
}

/// Phase-2 color of this member under the agreed decision.
///
/// `Some(coarse)` keeps the member in its node group when the locator has
/// no finer answer; `None` removes it from every output group (only for a
/// device scan that matches nothing, so the member set stays consistent).
fn fine_color(
    ctx: &WeftContext,
    coarse: i32,
    object_type: ObjectType,
    os_dev_kind: Option<OsDevKind>,
    device_id: Option<&str>,
) -> Option<i32> {
    let hw = match ctx.get_hw_topology() {
        Some(hw) => hw,
        None => return Some(coarse),
    };
    let bindset = match ctx.get_bindset() {
        Some(bindset) => bindset,
        None => return Some(coarse),
    };
    match object_type {
        ObjectType::PciDevice => {
            let busid = match device_id {
                Some(busid) => busid,
                None => return Some(coarse),
            };
            match locate::pci_device_color(&hw, bindset, busid) {
                Ok(color) => Some(color),
                Err(err) => {
                    debug!("{}; keeping node color", err);
                    Some(coarse)
                }
            }
        }
        ObjectType::OsDevice => {
            let kind = match os_dev_kind {
                Some(kind) => kind,
                None => return Some(coarse),
            };
            match locate::os_device_color(&hw, bindset, kind, device_id) {
                Ok(color) => Some(color),
                Err(err) if device_id.is_some() => {
                    debug!("{}; keeping node color", err);
                    Some(coarse)
                }
                Err(err) => {
                    // device scan matched nothing: empty output group
                    debug!("{}; member receives no group", err);
                    None
                }
            }
        }
        _ => match locate::processor_color(&hw, bindset, object_type) {
            Ok(color) => Some(color),
            Err(err) => {
                debug!("{}; keeping node color", err);
                Some(coarse)
            }
        },
    }
}
