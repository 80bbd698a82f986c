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

//! Level assignment for fat-tree fabrics
//!
//! Multi-source breadth-first layering: every host starts at level 0, its
//! switch neighbors at level 1, and each further node at one more than the
//! level it was reached from. A node's level is the minimum over all
//! proposals; a strictly smaller late proposal re-enqueues the node.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::error::{WeftError, WeftResult};
use crate::fabric::FabricTopology;

/// Sentinel level for nodes unreachable from any host
pub const LEVEL_UNASSIGNED: i32 = -1;

/// Compute per-node levels, indexed by node id.
///
/// Unreachable nodes keep [`LEVEL_UNASSIGNED`] and are reported, never
/// silently treated as level 0. On consistent input every node is visited
/// at most once per improvement; the total re-enqueue count is bounded by
/// the node count, and exceeding that bound fails with
/// `WeftError::TopologyInconsistent`.
pub fn assign_levels(topology: &FabricTopology) -> WeftResult<Vec<i32>> {
    let n = topology.num_nodes();
    let mut levels = vec![LEVEL_UNASSIGNED; n];
    let mut queue: VecDeque<usize> = VecDeque::new();

    for host in topology.host_nodes() {
        levels[host.id] = 0;
    }
    for host in topology.host_nodes() {
        for &e in topology.edges_of(host.id) {
            let neighbor = topology.edge(e).other(host.id);
            if levels[neighbor] < 0 {
                levels[neighbor] = 1;
                queue.push_back(neighbor);
            }
        }
    }

    let mut requeues = 0usize;
    while let Some(node) = queue.pop_front() {
        let proposed = levels[node] + 1;
        for &e in topology.edges_of(node) {
            let neighbor = topology.edge(e).other(node);
            if levels[neighbor] < 0 {
                levels[neighbor] = proposed;
                queue.push_back(neighbor);
            } else if proposed < levels[neighbor] {
                levels[neighbor] = proposed;
                requeues += 1;
                if requeues > n {
                    return Err(WeftError::TopologyInconsistent(
                        "level assignment did not converge".to_string(),
                    ));
                }
                queue.push_back(neighbor);
            }
        }
    }

    let unreachable = levels.iter().filter(|&&l| l < 0).count();
    if unreachable > 0 {
        warn!(
            "{} fabric node(s) unreachable from any host, left unassigned",
            unreachable
        );
    }
    debug!(
        "assigned levels to {} of {} fabric nodes",
        n - unreachable,
        n
    );
    Ok(levels)
}
