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

//! Tests for fabric classification and level assignment

use weft::error::{Code, WeftError, WeftResult};
use weft::fabric::{
    assign_levels, parse_topology, FabricSource, FabricTopology, NetworkType, NodeKind,
};

fn hosts_and_switches(hosts: usize, switches: usize) -> Vec<(NodeKind, String)> {
    let mut nodes = Vec::new();
    for i in 0..hosts {
        nodes.push((NodeKind::Host, format!("host{}", i)));
    }
    for i in 0..switches {
        nodes.push((NodeKind::Switch, format!("switch{}", i)));
    }
    nodes
}

#[test]
fn test_two_level_tree() {
    // 8 hosts, two leaf switches with 4 hosts each, one root switch
    let links: Vec<(usize, usize)> = (0..4)
        .map(|h| (h, 8))
        .chain((4..8).map(|h| (h, 9)))
        .chain([(8, 10), (9, 10)])
        .collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(8, 3), &links).unwrap();

    let attrs = parse_topology(&topology);
    assert_eq!(attrs.network_type(), NetworkType::FatTree);
    for h in 0..8 {
        assert_eq!(attrs.node_level(h), Some(0));
    }
    assert_eq!(attrs.node_level(8), Some(1));
    assert_eq!(attrs.node_level(9), Some(1));
    assert_eq!(attrs.node_level(10), Some(2));

    let leaf: Vec<usize> = attrs
        .switches_at_level(&topology, 1)
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(leaf, vec![8, 9]);
    let root: Vec<usize> = attrs
        .switches_at_level(&topology, 2)
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(root, vec![10]);
    assert!(attrs.unassigned_nodes().is_empty());
}

#[test]
fn test_single_switch_star() {
    let links: Vec<(usize, usize)> = (0..4).map(|h| (h, 4)).collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(4, 1), &links).unwrap();

    let attrs = parse_topology(&topology);
    assert_eq!(attrs.network_type(), NetworkType::FatTree);
    assert_eq!(attrs.node_level(4), Some(1));
}

#[test]
fn test_classification_is_idempotent() {
    let links: Vec<(usize, usize)> = (0..4)
        .map(|h| (h, 4))
        .chain([(4, 5)])
        .collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(4, 2), &links).unwrap();

    let first = parse_topology(&topology);
    let second = parse_topology(&topology);
    assert_eq!(first, second);
}

#[test]
fn test_ring_of_hosts_is_torus() {
    // 4-node ring: every node degree 2, all the same type
    let links = [(0, 1), (1, 2), (2, 3), (3, 0)];
    let topology = FabricTopology::from_parts(hosts_and_switches(4, 0), &links).unwrap();

    let attrs = parse_topology(&topology);
    assert_eq!(attrs.network_type(), NetworkType::Torus);
    // geometry extraction is unresolved
    assert!(matches!(
        attrs,
        weft::NetworkAttributes::Torus { dimension: 0, ref geometry } if geometry.is_empty()
    ));
}

#[test]
fn test_host_uplinks_to_distinct_switches_rejected() {
    // host 0 uplinks to two different switches: not a fat-tree candidate,
    // and the degrees are not uniform either
    let links = [(0, 2), (0, 3), (1, 2)];
    let topology = FabricTopology::from_parts(hosts_and_switches(2, 2), &links).unwrap();

    assert_eq!(parse_topology(&topology).network_type(), NetworkType::Invalid);
}

#[test]
fn test_switch_cycle_rejected() {
    // triangle of switches, one host per switch: candidacy holds but the
    // traversal finds a cycle, and degrees are not uniform
    let links = [(0, 3), (1, 4), (2, 5), (3, 4), (4, 5), (5, 3)];
    let topology = FabricTopology::from_parts(hosts_and_switches(3, 3), &links).unwrap();

    assert_eq!(parse_topology(&topology).network_type(), NetworkType::Invalid);
}

#[test]
fn test_unreachable_switch_reported() {
    // switch 5 has no link at all; it must stay unassigned, not level 0
    let links: Vec<(usize, usize)> = (0..4).map(|h| (h, 4)).collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(4, 2), &links).unwrap();

    let attrs = parse_topology(&topology);
    assert_eq!(attrs.network_type(), NetworkType::FatTree);
    assert_eq!(attrs.node_level(5), Some(-1));
    assert_eq!(attrs.unassigned_nodes(), vec![5]);
}

#[test]
fn test_level_assignment_idempotent() {
    let links: Vec<(usize, usize)> = (0..4)
        .map(|h| (h, 4))
        .chain([(4, 5)])
        .collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(4, 2), &links).unwrap();

    let first = assign_levels(&topology).unwrap();
    let second = assign_levels(&topology).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[4], 1);
    assert_eq!(first[5], 2);
}

struct UnreachableService;

impl FabricSource for UnreachableService {
    fn nodes(&self) -> WeftResult<Vec<(NodeKind, String)>> {
        Err(WeftError::TopologyLoad(
            "fabric service unreachable".to_string(),
        ))
    }

    fn links(&self) -> WeftResult<Vec<(usize, usize)>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_load_failure_propagates() {
    let err = FabricTopology::load(&UnreachableService).unwrap_err();
    assert_eq!(err.code(), Code::TopologyLoad);
}

#[test]
fn test_empty_topology_is_load_error() {
    let err = FabricTopology::from_parts(Vec::new(), &[]).unwrap_err();
    assert_eq!(err.code(), Code::TopologyLoad);
}

#[test]
fn test_dangling_link_is_inconsistent() {
    let err = FabricTopology::from_parts(hosts_and_switches(1, 1), &[(0, 7)]).unwrap_err();
    assert_eq!(err.code(), Code::TopologyInconsistent);
}

#[test]
fn test_host_enumeration_and_index() {
    let links: Vec<(usize, usize)> = (0..3).map(|h| (h, 3)).collect();
    let topology = FabricTopology::from_parts(hosts_and_switches(3, 1), &links).unwrap();

    assert_eq!(topology.num_nodes(), 4);
    assert_eq!(topology.num_edges(), 3);
    assert_eq!(topology.host_nodes().count(), 3);
    assert_eq!(topology.switch_nodes().count(), 1);
    assert_eq!(topology.host_index(1), Some(1));
    assert_eq!(topology.host_index(3), None);
    assert_eq!(topology.edges_of(3).len(), 3);
}
