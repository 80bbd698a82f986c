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

//! Interconnection-fabric topology graph
//!
//! Hosts, switches and links are held in an arena indexed by stable integer
//! ids, with adjacency built once at load time. The topology is immutable
//! after construction; all other components hold read-only references.

pub mod classify;
pub mod levels;

pub use classify::{parse_topology, NetworkAttributes, NetworkType};
pub use levels::assign_levels;

use crate::error::{WeftError, WeftResult};
use crate::hw::{HwTopology, OsDevKind};

pub type NodeId = usize;
pub type EdgeId = usize;

/// Fabric vertex kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Host,
    Switch,
}

/// A host or switch vertex of the fabric graph
#[derive(Debug, Clone)]
pub struct FabricNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Physical address, cross-referenced against local device identifiers
    pub physical_id: String,
}

/// Bidirectional link between two fabric nodes
#[derive(Debug, Clone, Copy)]
pub struct FabricEdge {
    pub id: EdgeId,
    pub endpoints: (NodeId, NodeId),
}

impl FabricEdge {
    /// The endpoint opposite `node`
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.endpoints.0 == node {
            self.endpoints.1
        } else {
            self.endpoints.0
        }
    }
}

/// External fabric-topology service boundary
///
/// Implementations report `WeftError::TopologyLoad` when the backing
/// service cannot produce a topology; callers then treat classification as
/// INVALID.
pub trait FabricSource {
    fn nodes(&self) -> WeftResult<Vec<(NodeKind, String)>>;
    fn links(&self) -> WeftResult<Vec<(NodeId, NodeId)>>;
}

/// The fabric graph store, loaded once and immutable afterwards
#[derive(Debug)]
pub struct FabricTopology {
    nodes: Vec<FabricNode>,
    edges: Vec<FabricEdge>,
    adjacency: Vec<Vec<EdgeId>>,
}

impl FabricTopology {
    /// Load the topology from an external service
    pub fn load(source: &dyn FabricSource) -> WeftResult<FabricTopology> {
        let nodes = source.nodes()?;
        let links = source.links()?;
        Self::from_parts(nodes, &links)
    }

    /// Build the arena directly from node and link descriptions
    pub fn from_parts(
        nodes: Vec<(NodeKind, String)>,
        links: &[(NodeId, NodeId)],
    ) -> WeftResult<FabricTopology> {
        if nodes.is_empty() {
            return Err(WeftError::TopologyLoad(
                "fabric service returned no nodes".to_string(),
            ));
        }
        let nodes: Vec<FabricNode> = nodes
            .into_iter()
            .enumerate()
            .map(|(id, (kind, physical_id))| FabricNode {
                id,
                kind,
                physical_id,
            })
            .collect();
        let mut edges = Vec::with_capacity(links.len());
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for (id, &(a, b)) in links.iter().enumerate() {
            if a >= nodes.len() || b >= nodes.len() {
                return Err(WeftError::TopologyInconsistent(format!(
                    "link ({}, {}) references an unknown node",
                    a, b
                )));
            }
            edges.push(FabricEdge {
                id,
                endpoints: (a, b),
            });
            adjacency[a].push(id);
            if b != a {
                adjacency[b].push(id);
            }
        }
        Ok(FabricTopology {
            nodes,
            edges,
            adjacency,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: NodeId) -> &FabricNode {
        &self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &FabricEdge {
        &self.edges[id]
    }

    pub fn nodes(&self) -> &[FabricNode] {
        &self.nodes
    }

    pub fn host_nodes(&self) -> impl Iterator<Item = &FabricNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Host)
    }

    pub fn switch_nodes(&self) -> impl Iterator<Item = &FabricNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Switch)
    }

    /// Ids of all edges incident to `node`
    pub fn edges_of(&self, node: NodeId) -> &[EdgeId] {
        &self.adjacency[node]
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node].len()
    }

    /// Index of a host node within the enumeration order of all host nodes
    pub fn host_index(&self, node: NodeId) -> Option<usize> {
        self.host_nodes().position(|h| h.id == node)
    }

    /// The fabric host node this process is attached to: the host whose
    /// physical address matches one of the local network-adapter device
    /// identifiers.
    pub fn end_point_for(&self, hw: &HwTopology) -> Option<&FabricNode> {
        let adapters = hw.os_devices(OsDevKind::OpenFabrics);
        self.host_nodes().find(|host| {
            adapters
                .iter()
                .any(|dev| dev.device_id.as_deref() == Some(host.physical_id.as_str()))
        })
    }
}
